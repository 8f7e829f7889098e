use thiserror::Error;

/// Errors surfaced by connection/session transports.
///
/// `StreamProcessor::process_chunk` itself never returns a `Result` —
/// protocol violations are recovered locally and logged, not propagated.
/// This type covers only the layer below the processor: the adapter
/// contract itself (transport failures, aborted reads).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request aborted")]
    Aborted,
}

/// `reqwest::Error` isn't `Clone`, so this flattens it to a message —
/// only needed by test fakes (`transport::mock`) that replay a fixed
/// script of results across multiple `connect()` calls.
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Http(err) => TransportError::Protocol(err.to_string()),
            TransportError::Protocol(message) => TransportError::Protocol(message.clone()),
            TransportError::Aborted => TransportError::Aborted,
        }
    }
}
