use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::error::ProviderError;

/// True when `err` or any of its sources has `kind` or mentions `needle`.
fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        let kind_matches = source
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind);
        if kind_matches || source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

/// Maps a failed send into an actionable transport error.
pub(crate) fn request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> ProviderError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return ProviderError::Transport(format!(
            "Request timed out after {timeout_secs}s while calling '{api_url}'. \
             Increase AI_CLI_TIMEOUT_SECS or check model responsiveness."
        ));
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return ProviderError::Transport(format!(
                "Connection refused by provider at '{api_url}'. \
                 Ensure the provider is running and --url is correct."
            ));
        }

        return ProviderError::Transport(format!(
            "Failed to connect to provider at '{api_url}'. \
             Check --url and network connectivity."
        ));
    }

    ProviderError::Transport(format!("Failed to call provider at '{api_url}': {err}"))
}

/// Maps a failure while reading an already-open response body.
pub(crate) fn stream_read_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> ProviderError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return ProviderError::Transport(format!(
            "Stream from '{api_url}' stalled for more than {timeout_secs}s. \
             Increase AI_CLI_TIMEOUT_SECS or check model responsiveness."
        ));
    }

    ProviderError::Transport(format!("Error reading stream from '{api_url}': {err}"))
}
