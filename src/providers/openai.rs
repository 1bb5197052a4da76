use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::model::{CompletionOptions, Message, ModelInfo};
use crate::providers::stream;
use crate::providers::transport::{HttpTransport, ensure_success};
use crate::providers::{DeltaSink, Provider, ProviderFuture, ProviderKind};

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
const MODELS_PATH: &str = "v1/models";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    description: String,
}

impl From<ModelEntry> for ModelInfo {
    fn from(entry: ModelEntry) -> Self {
        Self {
            name: entry.id,
            size: 0,
            family: entry.object,
            modified: String::new(),
            description: entry.description,
        }
    }
}

/// Accepts `{"data": [...]}`, or a bare array as served by some
/// OpenAI-compatible servers.
fn parse_model_listing(body: &[u8]) -> Result<Vec<ModelEntry>, ProviderError> {
    match serde_json::from_slice::<ModelsResponse>(body) {
        Ok(parsed) => Ok(parsed.data),
        Err(object_err) => serde_json::from_slice::<Vec<ModelEntry>>(body).map_err(|_| {
            warn!(error = %object_err, "model listing matched no known envelope");
            ProviderError::Decode(object_err.to_string())
        }),
    }
}

fn listing_hint() -> &'static str {
    "check the models served by the provider with --list-models"
}

/// Adapter for OpenAI-compatible `/v1/chat/completions` servers.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    transport: HttpTransport,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(Self {
            transport: HttpTransport::new(base_url, timeout_secs)?,
        })
    }
}

impl Provider for OpenAiProvider {
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

            let body = ChatCompletionRequest {
                model: &options.model,
                messages,
                temperature: options.temperature,
                stream: true,
            };
            debug!(
                provider = "openai",
                model = %options.model,
                message_count = messages.len(),
                "dispatching chat completion request"
            );

            let response = self
                .transport
                .post_json(CHAT_COMPLETIONS_PATH, &body)
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(ProviderError::model_not_found(
                    &options.model,
                    listing_hint(),
                ));
            }
            let response = ensure_success(response).await?;

            stream::decode(self.transport.body_stream(response), on_delta).await
        })
    }

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Vec<ModelInfo>> {
        Box::pin(async move {
            let response = ensure_success(self.transport.get(MODELS_PATH).await?).await?;
            let body = response.bytes().await.map_err(|err| {
                ProviderError::Transport(format!("Failed to read model listing: {err}"))
            })?;
            let entries = parse_model_listing(&body)?;

            debug!(
                provider = "openai",
                model_count = entries.len(),
                "received model listing"
            );
            Ok(entries.into_iter().map(ModelInfo::from).collect())
        })
    }

    fn default_model(&self) -> &'static str {
        ProviderKind::OpenAi.default_model()
    }

    fn name(&self) -> &'static str {
        ProviderKind::OpenAi.display_name()
    }

    fn description(&self) -> &'static str {
        ProviderKind::OpenAi.description()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::OpenAiProvider;
    use crate::error::ProviderError;
    use crate::model::{CompletionOptions, Message};
    use crate::providers::Provider;

    fn options() -> CompletionOptions {
        CompletionOptions::new("gpt-3.5-turbo", 0.25)
    }

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(&server.uri(), 5).expect("provider should build")
    }

    async fn mount_models(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn sends_full_history_and_decodes_sse_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "again"}
                ],
                "temperature": 0.25,
                "stream": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
                ": keep-alive\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
                "data: [DONE]\n\n",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ];
        let mut seen = Vec::new();
        provider
            .stream_completion(&messages, &options(), &mut |delta: &str| {
                seen.push(delta.to_string())
            })
            .await
            .expect("stream should succeed");

        assert_eq!(seen, vec!["Hi ", "there"]);
    }

    #[tokio::test]
    async fn accepts_non_streaming_completion_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "whole reply"}
                }]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let reply = provider
            .create_completion(&[Message::user("hi")], &options())
            .await
            .expect("completion should succeed");

        assert_eq!(reply, "whole reply");
    }

    #[tokio::test]
    async fn not_found_maps_to_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .create_completion(&[Message::user("hi")], &options())
            .await
            .expect_err("404 should fail");

        assert!(matches!(err, ProviderError::ModelNotFound { .. }));
        assert!(err.to_string().contains("gpt-3.5-turbo"));
    }

    #[tokio::test]
    async fn bad_request_maps_to_request_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad temperature"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .create_completion(&[Message::user("hi")], &options())
            .await
            .expect_err("400 should fail");

        match err {
            ProviderError::RequestFailed { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad temperature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_messages_fail_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .create_completion(&[], &options())
            .await
            .expect_err("empty input should fail");

        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn bare_array_listing_matches_object_listing() {
        let entries = json!([
            {"id": "gpt-3.5-turbo", "object": "model", "description": "chat"},
            {"id": "phi-2", "object": "model"}
        ]);

        let object_server = MockServer::start().await;
        mount_models(&object_server, json!({"object": "list", "data": entries.clone()})).await;
        let array_server = MockServer::start().await;
        mount_models(&array_server, entries).await;

        let from_object = provider_for(&object_server)
            .list_models()
            .await
            .expect("object listing should succeed");
        let from_array = provider_for(&array_server)
            .list_models()
            .await
            .expect("array listing should succeed");

        assert_eq!(from_object, from_array);
        assert_eq!(from_object.len(), 2);
        assert_eq!(from_object[0].name, "gpt-3.5-turbo");
        assert_eq!(from_object[0].family, "model");
        assert_eq!(from_object[0].description, "chat");
        assert_eq!(from_object[1].description, "");
        assert_eq!(from_object[1].size, 0);
    }

    #[tokio::test]
    async fn listing_in_unknown_shape_is_a_decode_error() {
        let server = MockServer::start().await;
        mount_models(&server, json!({"models": "nope"})).await;

        let err = provider_for(&server)
            .list_models()
            .await
            .expect_err("unknown shape should fail");

        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
