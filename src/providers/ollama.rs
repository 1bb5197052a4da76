use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::model::{CompletionOptions, Message, ModelInfo, Role};
use crate::providers::stream;
use crate::providers::transport::{HttpTransport, ensure_success};
use crate::providers::{DeltaSink, Provider, ProviderFuture, ProviderKind};

const GENERATE_PATH: &str = "api/generate";
const TAGS_PATH: &str = "api/tags";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    stream: bool,
}

impl<'a> GenerateRequest<'a> {
    /// The generate endpoint is single-turn: only the latest user message
    /// and the latest system message are sent.
    fn from_messages(messages: &'a [Message], options: &'a CompletionOptions) -> Self {
        let last_with_role = move |role: Role| {
            messages
                .iter()
                .rev()
                .find(|msg| msg.role == role)
                .map(|msg| msg.content.as_str())
        };

        Self {
            model: &options.model,
            prompt: last_with_role(Role::User).unwrap_or_default(),
            system: last_with_role(Role::System),
            temperature: options.temperature,
            stream: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default, alias = "modified")]
    modified_at: String,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: String,
}

impl From<TagEntry> for ModelInfo {
    fn from(entry: TagEntry) -> Self {
        Self {
            name: entry.name,
            size: entry.size,
            family: entry.details.family,
            modified: entry.modified_at,
            description: String::new(),
        }
    }
}

fn pull_hint(model: &str) -> String {
    format!("try running: ollama pull {model}")
}

/// Adapter for Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    transport: HttpTransport,
}

impl OllamaProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(Self {
            transport: HttpTransport::new(base_url, timeout_secs)?,
        })
    }
}

impl Provider for OllamaProvider {
    fn stream_completion<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a CompletionOptions,
        on_delta: DeltaSink<'a>,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            if messages.is_empty() {
                return Err(ProviderError::InvalidInput(
                    "no messages provided".to_string(),
                ));
            }

            let body = GenerateRequest::from_messages(messages, options);
            let omitted_turns = messages
                .iter()
                .filter(|msg| msg.role != Role::System)
                .count()
                .saturating_sub(1);
            debug!(
                provider = "ollama",
                model = %options.model,
                message_count = messages.len(),
                omitted_turns,
                has_system = body.system.is_some(),
                "dispatching generate request"
            );

            let response = self.transport.post_json(GENERATE_PATH, &body).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(ProviderError::model_not_found(
                    &options.model,
                    pull_hint(&options.model),
                ));
            }
            let response = ensure_success(response).await?;

            stream::decode(self.transport.body_stream(response), on_delta).await
        })
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Vec<ModelInfo>> {
        Box::pin(async move {
            let response = ensure_success(self.transport.get(TAGS_PATH).await?).await?;
            let body = response.bytes().await.map_err(|err| {
                ProviderError::Transport(format!("Failed to read model listing: {err}"))
            })?;
            let parsed: TagsResponse = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::Decode(err.to_string()))?;

            debug!(
                provider = "ollama",
                model_count = parsed.models.len(),
                "received model listing"
            );
            Ok(parsed.models.into_iter().map(ModelInfo::from).collect())
        })
    }

    fn default_model(&self) -> &'static str {
        ProviderKind::Ollama.default_model()
    }

    fn name(&self) -> &'static str {
        ProviderKind::Ollama.display_name()
    }

    fn description(&self) -> &'static str {
        ProviderKind::Ollama.description()
    }
}
