use clap::Parser;
use gce_bootstrap::cli::Cli;
use gce_bootstrap::error::BootstrapError;

/// Conventional exit status for a run stopped by a signal
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Merge defaults, config file, environment and flags
    let settings = cli.settings()?;

    cli.init_logging(&settings)?;

    if let Err(e) = cli.execute(settings).await {
        if let Some(BootstrapError::Interrupted(_)) = e.downcast_ref::<BootstrapError>() {
            // Runtime shutdown would wait on an abandoned blocking SSH call
            eprintln!("Error: {:#}", e);
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        return Err(e);
    }

    Ok(())
}
