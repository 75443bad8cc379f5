//! Process-wide reporting entry points for application code.

use std::error::Error;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use report_sink::{dsn_from_env, Sink, SinkError, SinkOptions};
use tracing::{debug, info};

use crate::handlers;
use crate::options::InstallOptions;

fn current() -> &'static RwLock<Option<Arc<Sink>>> {
    static CURRENT: OnceLock<RwLock<Option<Arc<Sink>>>> = OnceLock::new();
    CURRENT.get_or_init(|| RwLock::new(None))
}

/// Builds a sink for `dsn`, makes it current and installs the default
/// global handlers against it.
///
/// Calling `init` again replaces the current sink and installs another set
/// of handlers.
pub fn init(
    dsn: &str,
    release: Option<&str>,
    environment: Option<&str>,
) -> Result<Arc<Sink>, SinkError> {
    let mut options = SinkOptions::from_env();
    if let Some(release) = release {
        options = options.release(release);
    }
    if let Some(environment) = environment {
        options = options.environment(environment);
    }
    let sink = Arc::new(Sink::new(dsn, options)?);
    init_with_sink(sink.clone());
    Ok(sink)
}

/// Like [`init`] with the DSN from `REPORT_SINK_DSN`. Returns `Ok(None)`
/// when the variable is unset.
pub fn init_from_env() -> Result<Option<Arc<Sink>>, SinkError> {
    match dsn_from_env() {
        Some(dsn) => init(&dsn, None, None).map(Some),
        None => {
            debug!("REPORT_SINK_DSN not set; error reporting disabled");
            Ok(None)
        }
    }
}

/// Makes `sink` current and installs the default global handlers for it.
pub fn init_with_sink(sink: Arc<Sink>) {
    *current().write().unwrap_or_else(PoisonError::into_inner) = Some(sink.clone());
    handlers::install(InstallOptions::default(), sink);
    info!("error reporting initialized");
}

pub fn current_sink() -> Option<Arc<Sink>> {
    current()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Reports an error the caller already handled through the current sink.
///
/// Returns `false`, dropping the error, when nothing was initialized.
pub fn log<E: Error + ?Sized>(err: &E) -> bool {
    match current_sink() {
        Some(sink) => {
            sink.capture_manual(err);
            true
        }
        None => {
            debug!(error = %err, "error not reported: no sink initialized");
            false
        }
    }
}

/// Forgets the current sink. Handlers already installed stay in place until
/// [`crate::uninstall`].
pub fn reset() {
    current()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}
