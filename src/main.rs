use anyhow::Result;
use clap::Parser;

use ai_cli::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = ai_cli::logging::init(cli.verbose);

    ai_cli::run(cli).await
}
