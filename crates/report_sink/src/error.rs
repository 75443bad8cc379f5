use thiserror::Error;

/// Errors raised while building a [`crate::Sink`].
///
/// The capture path itself never returns errors; these only surface from
/// construction and DSN parsing.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid DSN `{dsn}`: {reason}")]
    InvalidDsn { dsn: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("failed to spawn delivery worker: {0}")]
    Worker(#[source] std::io::Error),
    #[error("failed to build delivery runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl SinkError {
    pub(crate) fn invalid_dsn(dsn: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDsn {
            dsn: dsn.to_string(),
            reason: reason.into(),
        }
    }
}

/// A failed attempt to deliver one event to the collector.
///
/// Every delivery error is an "own request" failure: converting it into an
/// [`crate::ErrorValue`] sets the own-request marker so that feeding it back
/// through the global hooks never produces another event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request to collector failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("collector rejected event with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Request { .. } => "DeliveryRequestError",
            DeliveryError::Status { .. } => "DeliveryStatusError",
            DeliveryError::Serialize(_) => "DeliverySerializeError",
            DeliveryError::Transport(_) => "DeliveryTransportError",
        }
    }
}
