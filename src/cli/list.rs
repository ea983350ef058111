use shelf::core::ShelfResult;
use shelf::di::ServiceContainer;

pub fn run() -> ShelfResult<()> {
    let container = ServiceContainer::new()?;
    let records = container.pipeline()?.installed()?;

    if records.is_empty() {
        println!("No bundles integrated.");
        return Ok(());
    }

    println!("Integrated bundles:");
    for record in records {
        match &record.version {
            Some(version) => println!("  {} {}", record.name, version),
            None => println!("  {}", record.name),
        }
        println!("    {}", record.path.display());
    }
    Ok(())
}
