use dialoguer::Select;
use shelf::bundle::BundleFile;
use shelf::core::{ShelfError, ShelfResult};
use shelf::di::ServiceContainer;
use shelf::install::ConflictResolution;
use std::path::{Path, PathBuf};

// Trait for the conflict question (for dependency injection in tests)
pub trait ConflictPrompt {
    fn choose(&self, name: &str, existing: &Path) -> ShelfResult<Option<ConflictResolution>>;
}

// Real implementation using dialoguer
pub struct DialoguerPrompt;

impl ConflictPrompt for DialoguerPrompt {
    fn choose(&self, name: &str, existing: &Path) -> ShelfResult<Option<ConflictResolution>> {
        let items = [
            format!("Replace {}", existing.display()),
            "Keep both".to_string(),
        ];
        let selection = Select::new()
            .with_prompt(format!("A bundle named '{}' is already integrated", name))
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| {
                ShelfError::InvalidArgument(format!(
                    "Cannot ask how to resolve the name conflict ({}); pass --replace or --yes",
                    e
                ))
            })?;

        Ok(selection.map(|index| match index {
            0 => ConflictResolution::Replace,
            _ => ConflictResolution::KeepBoth,
        }))
    }
}

/// How to resolve a name conflict, before any prompt
fn preset_policy(yes: bool, replace: bool) -> Option<ConflictResolution> {
    if replace {
        Some(ConflictResolution::Replace)
    } else if yes {
        Some(ConflictResolution::KeepBoth)
    } else {
        None
    }
}

pub async fn run(file: PathBuf, yes: bool, replace: bool) -> ShelfResult<()> {
    run_with_prompt(file, yes, replace, &DialoguerPrompt).await
}

pub async fn run_with_prompt(
    file: PathBuf,
    yes: bool,
    replace: bool,
    prompt: &dyn ConflictPrompt,
) -> ShelfResult<()> {
    let bundle = BundleFile::open(&file)?;
    let container = ServiceContainer::new()?;
    let pipeline = container.pipeline()?;

    let mut record = pipeline.inspect(&bundle).await?;
    if record.status.is_installed() {
        println!(
            "✓ {} is already integrated ({})",
            record.name,
            record.path.display()
        );
        return Ok(());
    }
    record.settings = container.bundle_configs()?.get(&record.name);

    let mut policy = None;
    if let Some(existing) = pipeline.find_by_name(&record.name)? {
        policy = match preset_policy(yes, replace) {
            Some(policy) => Some(policy),
            None => match prompt.choose(&record.name, &existing.path)? {
                Some(choice) => Some(choice),
                None => {
                    println!("Integration cancelled.");
                    return Ok(());
                }
            },
        };
    }

    pipeline.install(&mut record, &bundle, policy).await?;

    println!(
        "✓ Integrated {} {}",
        record.name,
        record.version.as_deref().unwrap_or_default()
    );
    println!("  Bundle:   {}", record.path.display());
    if let Some(manifest) = &record.manifest {
        println!("  Manifest: {}", manifest.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_policy() {
        assert_eq!(preset_policy(false, false), None);
        assert_eq!(preset_policy(true, false), Some(ConflictResolution::KeepBoth));
        assert_eq!(preset_policy(false, true), Some(ConflictResolution::Replace));
        assert_eq!(preset_policy(true, true), Some(ConflictResolution::Replace));
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_argument() {
        struct NeverAsked;
        impl ConflictPrompt for NeverAsked {
            fn choose(&self, _: &str, _: &Path) -> ShelfResult<Option<ConflictResolution>> {
                panic!("prompted for a missing file");
            }
        }

        let result =
            run_with_prompt(PathBuf::from("/nonexistent/foo.AppImage"), false, false, &NeverAsked)
                .await;
        assert!(matches!(result, Err(ShelfError::InvalidArgument(_))));
    }
}
