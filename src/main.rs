mod cli;
mod config;
mod settings;
mod errors;
mod downloader;
mod utils;
mod workspace;
mod csv_import;

use cli::Cli;
use errors::Result;
use tracing::Level;
use utils::logger::Logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        Logger::init_with_level(Level::DEBUG)?;
    } else {
        Logger::init()?;
    }

    // Execute the command
    cli.execute().await?;

    Ok(())
}
