use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Failures from a chat completion request.
///
/// `Api` carries the upstream status and body verbatim so callers can
/// tell a rate limit from a bad request without another variant per
/// status code. `Network` and `Parse` wrap transport and decoding
/// failures respectively.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing API key or unrecognized provider name.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider returned an error: {0}")]
    Api(String),

    #[error("unexpected response body: {0}")]
    Parse(String),
}
