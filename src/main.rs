use clap::{ArgGroup, Parser};
use shelf::core::format_error_with_help;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Integrate, update and remove self-contained application bundles")]
#[command(version)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["integrate", "uninstall", "list_installed", "list_updates", "fetch_updates"])
))]
struct Cli {
    /// Integrate a bundle into the application menu
    #[arg(long, value_name = "FILE")]
    integrate: Option<PathBuf>,

    /// Don't prompt; keep both bundles on a name conflict
    #[arg(short = 'y', long, requires = "integrate")]
    yes: bool,

    /// Replace an integrated bundle with the same name
    #[arg(long, requires = "integrate")]
    replace: bool,

    /// Remove an integrated bundle from the application menu
    #[arg(long, value_name = "FILE")]
    uninstall: Option<PathBuf>,

    /// Also forget the bundle's stored settings
    #[arg(long, requires = "uninstall")]
    delete: bool,

    /// List integrated bundles
    #[arg(long)]
    list_installed: bool,

    /// List integrated bundles with an update available
    #[arg(long)]
    list_updates: bool,

    /// Download and apply all available updates
    #[arg(long)]
    fetch_updates: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = if let Some(file) = cli.integrate {
        cli::integrate::run(file, cli.yes, cli.replace).await
    } else if let Some(file) = cli.uninstall {
        cli::uninstall::run(file, cli.delete).await
    } else if cli.list_installed {
        cli::list::run()
    } else if cli.list_updates {
        cli::updates::list().await
    } else {
        cli::updates::fetch().await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancellation() => {
            eprintln!("Cancelled.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("\n{}", format_error_with_help(&e));
            ExitCode::FAILURE
        }
    }
}
