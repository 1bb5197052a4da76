use std::env;
use std::path::PathBuf;

use crate::providers::{DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_URL, ProviderKind};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const CONFIG_DIR_NAME: &str = "ai-cli";

/// Runtime settings, resolved once at startup and passed down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub version: &'static str,
    pub ollama_url: String,
    pub openai_url: String,
    pub request_timeout_secs: u64,
    pub config_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            ollama_url: parse_url(get_var("AI_CLI_OLLAMA_URL").as_deref(), DEFAULT_OLLAMA_URL),
            openai_url: parse_url(get_var("AI_CLI_OPENAI_URL").as_deref(), DEFAULT_OPENAI_URL),
            request_timeout_secs: parse_request_timeout_secs(
                get_var("AI_CLI_TIMEOUT_SECS").as_deref(),
            ),
            config_dir: parse_config_dir(get_var("AI_CLI_CONFIG_DIR").as_deref()),
        }
    }

    pub fn base_url_for(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Ollama => &self.ollama_url,
            ProviderKind::OpenAi => &self.openai_url,
        }
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_request_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn parse_url(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn parse_config_dir(raw: Option<&str>) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR_NAME)
        })
}
