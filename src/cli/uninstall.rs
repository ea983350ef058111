use shelf::core::{ShelfError, ShelfResult};
use shelf::di::ServiceContainer;
use std::path::PathBuf;

pub async fn run(file: PathBuf, delete: bool) -> ShelfResult<()> {
    if !file.is_file() {
        return Err(ShelfError::InvalidArgument(format!(
            "No such bundle file: {}",
            file.display()
        )));
    }

    let container = ServiceContainer::new()?;
    let pipeline = container.pipeline()?;
    let mut record = pipeline.find_installed(&file)?.ok_or_else(|| {
        ShelfError::InvalidArgument(format!("{} is not integrated", file.display()))
    })?;

    pipeline.uninstall(&mut record).await?;
    println!("✓ Removed {} from the application menu", record.name);

    if delete {
        let mut store = container.bundle_configs()?;
        if store.remove(&record.name).is_some() {
            store.save()?;
            println!("✓ Removed settings for {}", record.name);
        }
    }
    Ok(())
}
