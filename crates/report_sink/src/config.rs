use std::{env, fmt, sync::Arc, time::Duration};

use crate::{Event, EventHint};

pub(crate) const RELEASE_ENV: &str = "REPORT_SINK_RELEASE";
pub(crate) const ENVIRONMENT_ENV: &str = "REPORT_SINK_ENVIRONMENT";
pub(crate) const DEFAULT_MAX_VALUE_LENGTH: usize = 250;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Last chance to edit or drop an event before it is queued.
pub type BeforeSend = Arc<dyn Fn(Event, &EventHint) -> Option<Event> + Send + Sync>;

/// Sink configuration. Fixed once the sink is built.
#[derive(Clone)]
pub struct SinkOptions {
    pub release: Option<String>,
    pub environment: Option<String>,
    /// Longest string kept in messages and exception values.
    pub max_value_length: usize,
    /// Per-request timeout of the HTTP transport.
    pub timeout: Duration,
    pub before_send: Option<BeforeSend>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            release: None,
            environment: None,
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
            timeout: DEFAULT_TIMEOUT,
            before_send: None,
        }
    }
}

impl SinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `release` and `environment` taken from
    /// `REPORT_SINK_RELEASE` / `REPORT_SINK_ENVIRONMENT` when present.
    pub fn from_env() -> Self {
        Self {
            release: non_empty_env(RELEASE_ENV),
            environment: non_empty_env(ENVIRONMENT_ENV),
            ..Self::default()
        }
    }

    pub fn release(mut self, release: impl Into<String>) -> Self {
        let release = release.into();
        self.release = (!release.trim().is_empty()).then_some(release);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        let environment = environment.into();
        self.environment = (!environment.trim().is_empty()).then_some(environment);
        self
    }

    /// Sets the truncation length. `0` keeps strings whole.
    pub fn max_value_length(mut self, max: usize) -> Self {
        self.max_value_length = max;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event, &EventHint) -> Option<Event> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOptions")
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("max_value_length", &self.max_value_length)
            .field("timeout", &self.timeout)
            .field("before_send", &self.before_send.is_some())
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
