use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::providers::http_errors::{request_error, stream_read_error};

/// Thin HTTP layer shared by the adapters: joins paths onto the base URL,
/// sends requests and hands back raw responses.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|err| {
                ProviderError::Transport(format!("Failed to initialize HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Response, ProviderError> {
        let api_url = self.url(path);
        debug!(api_url = %api_url, "sending GET request");

        self.client.get(&api_url).send().await.map_err(|err| {
            warn!(api_url = %api_url, error = %err, "GET request failed");
            request_error(err, &api_url, self.timeout_secs)
        })
    }

    pub async fn post_json<T>(&self, path: &str, body: &T) -> Result<Response, ProviderError>
    where
        T: Serialize + ?Sized,
    {
        let api_url = self.url(path);
        debug!(api_url = %api_url, "sending POST request");

        self.client
            .post(&api_url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %api_url, error = %err, "POST request failed");
                request_error(err, &api_url, self.timeout_secs)
            })
    }

    /// Exposes a response body as raw chunks; read failures become
    /// `ProviderError::Transport`.
    pub fn body_stream(
        &self,
        response: Response,
    ) -> impl Stream<Item = Result<Vec<u8>, ProviderError>> + use<> {
        let api_url = response.url().to_string();
        let timeout_secs = self.timeout_secs;
        response.bytes_stream().map(move |chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| stream_read_error(err, &api_url, timeout_secs))
        })
    }
}

/// Turns any non-2xx response into `RequestFailed`, consuming the body.
pub async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let api_url = response.url().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        api_url = %api_url,
        status = %status,
        response_body_len = body.len(),
        "provider returned non-success status"
    );
    Err(ProviderError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}
