pub mod http_errors;
pub mod ollama;
pub mod openai;
pub mod stream;
pub mod transport;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use tracing::debug;

use crate::error::ProviderError;
use crate::model::{CompletionOptions, Message, ModelInfo};

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "http://localhost:8080";
pub const DEFAULT_OLLAMA_MODEL: &str = "deepseek-r1:1.5b";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a>>;

/// Callback receiving decoded text deltas in stream order.
pub type DeltaSink<'a> = &'a mut dyn FnMut(&str);

/// Capability set shared by every backend.
pub trait Provider {
    /// Sends `messages` and forwards every decoded delta to `on_delta`.
    fn stream_completion<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a CompletionOptions,
        on_delta: DeltaSink<'a>,
    ) -> ProviderFuture<'a, ()>;

    /// Buffered form of [`Provider::stream_completion`]: the reply is the
    /// concatenation of the streamed deltas.
    fn create_completion<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a CompletionOptions,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let mut reply = String::new();
            self.stream_completion(messages, options, &mut |delta: &str| {
                reply.push_str(delta)
            })
            .await?;
            Ok(reply)
        })
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Vec<ModelInfo>>;

    fn default_model(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Ollama, ProviderKind::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAi => "OpenAI-compatible",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ollama => "Run large language models locally",
            Self::OpenAi => {
                "Self-hosted model server compatible with OpenAI's API (LocalAI, vLLM, llama.cpp)"
            }
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_URL,
            Self::OpenAi => DEFAULT_OPENAI_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "localai" => Ok(Self::OpenAi),
            other => Err(ProviderError::InvalidInput(format!(
                "unknown provider '{other}'. Supported providers: ollama, openai (alias: localai)."
            ))),
        }
    }
}

/// Which backend to talk to and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub kind: ProviderKind,
    pub base_url: String,
    pub default_model: String,
}

impl ProviderIdentity {
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            default_model: kind.default_model().to_string(),
        }
    }
}

/// Constructs the adapter for `identity`.
pub fn build_provider(
    identity: &ProviderIdentity,
    timeout_secs: u64,
) -> Result<Box<dyn Provider>, ProviderError> {
    debug!(
        provider = %identity.kind,
        base_url = %identity.base_url,
        timeout_secs,
        "constructing provider"
    );

    match identity.kind {
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(
            &identity.base_url,
            timeout_secs,
        )?)),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(
            &identity.base_url,
            timeout_secs,
        )?)),
    }
}
