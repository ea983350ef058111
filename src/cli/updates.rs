use super::download_bar;
use shelf::bundle::{BundleFile, BundleRecord};
use shelf::config::BundleConfigStore;
use shelf::core::{ShelfError, ShelfResult};
use shelf::di::ServiceContainer;
use shelf::install::InstallationPipeline;
use shelf::update::{ReleaseResolver, UpdateResolutionDispatcher};
use tracing::debug;

/// An installed bundle with a newer release, and the resolver that found it
struct Pending {
    record: BundleRecord,
    resolver: Box<dyn ReleaseResolver>,
}

/// Ask each installed bundle's resolver for updates. Bundles without an
/// update source are skipped; failed checks are reported and skipped.
async fn check_all(
    pipeline: &InstallationPipeline,
    dispatcher: &UpdateResolutionDispatcher,
    store: &BundleConfigStore,
) -> ShelfResult<Vec<Pending>> {
    let mut pending = Vec::new();

    for mut record in pipeline.installed()? {
        record.settings = store.get(&record.name);
        let bundle = BundleFile::open(&record.path).ok();
        let resolver = match dispatcher.for_bundle(&record.settings, bundle.as_ref()) {
            Ok(Some(resolver)) => resolver,
            Ok(None) => {
                debug!("{} has no update source", record.name);
                continue;
            }
            Err(e) => {
                eprintln!("⚠️  {}: {}", record.name, e);
                continue;
            }
        };

        let checked = pipeline.check_update(&mut record, resolver.as_ref()).await;
        match checked {
            Ok(true) => pending.push(Pending { record, resolver }),
            Ok(false) => resolver.dispose(),
            Err(e) => {
                eprintln!("⚠️  Could not check {}: {}", record.name, e);
                resolver.dispose();
            }
        }
    }
    Ok(pending)
}

pub async fn list() -> ShelfResult<()> {
    let container = ServiceContainer::new()?;
    let pipeline = container.pipeline()?;
    let pending = check_all(&pipeline, &container.dispatcher()?, &container.bundle_configs()?).await?;

    if pending.is_empty() {
        println!("All bundles are up to date.");
        return Ok(());
    }

    println!("Updates available:");
    for item in &pending {
        println!(
            "  {} {} ({})",
            item.record.name,
            item.record.version.as_deref().unwrap_or_default(),
            item.resolver.kind()
        );
        item.resolver.dispose();
    }
    Ok(())
}

pub async fn fetch() -> ShelfResult<()> {
    let container = ServiceContainer::new()?;
    let pipeline = container.pipeline()?;
    let pending = check_all(&pipeline, &container.dispatcher()?, &container.bundle_configs()?).await?;

    if pending.is_empty() {
        println!("All bundles are up to date.");
        return Ok(());
    }

    let mut failed = 0;
    for Pending { mut record, resolver } in pending {
        let (bar, progress) = download_bar(&record.name);
        let result = pipeline.update(&mut record, resolver.as_ref(), Some(progress)).await;
        bar.finish_and_clear();

        match result {
            Ok(()) => println!(
                "✓ Updated {} to {}",
                record.name,
                record.version.as_deref().unwrap_or_default()
            ),
            Err(e) if e.is_cancellation() => println!("Update of {} cancelled", record.name),
            Err(e) => {
                failed += 1;
                eprintln!("❌ Failed to update {}: {}", record.name, e);
            }
        }
    }

    if failed > 0 {
        return Err(ShelfError::Installation(format!(
            "{} update(s) failed",
            failed
        )));
    }
    Ok(())
}
