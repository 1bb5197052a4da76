pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod loader;
pub mod logging;
pub mod model;
pub mod prompts;
pub mod providers;
pub mod repl;
pub mod session;

use anyhow::Result;
use tracing::info;

use cli::Cli;
use config::Config;

pub async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::from_env();
    info!(
        version = cfg.version,
        ollama_url = %cfg.ollama_url,
        openai_url = %cfg.openai_url,
        request_timeout_secs = cfg.request_timeout_secs,
        config_dir = %cfg.config_dir.display(),
        "loaded runtime configuration"
    );

    cli::dispatch(cli, &cfg).await
}
