use std::{future::Future, pin::Pin};

use tracing::debug;

use crate::{DeliveryError, Dsn, Event, SinkError, SinkOptions};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Moves one finished event to the collector.
///
/// Implementations run on the sink's delivery worker; `send` is awaited there
/// and never by the code that captured the event.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, event: Event) -> BoxFuture<'_, Result<(), DeliveryError>>;
}

/// JSON-over-HTTP transport posting to the DSN's store endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    store_url: String,
    auth_header: String,
}

impl HttpTransport {
    pub fn new(dsn: &Dsn, options: &SinkOptions) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(SinkError::HttpClient)?;
        Ok(Self {
            client,
            store_url: dsn.store_url(),
            auth_header: dsn.auth_header(),
        })
    }

    pub fn store_url(&self) -> &str {
        &self.store_url
    }
}

impl Transport for HttpTransport {
    fn send(&self, event: Event) -> BoxFuture<'_, Result<(), DeliveryError>> {
        Box::pin(async move {
            let body = serde_json::to_vec(&event)?;
            debug!(url = %self.store_url, bytes = body.len(), "posting event to collector");

            let response = self
                .client
                .post(&self.store_url)
                .header("Content-Type", "application/json")
                .header("X-Sentry-Auth", &self.auth_header)
                .body(body)
                .send()
                .await
                .map_err(|source| DeliveryError::Request { source })?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            })
        })
    }
}
