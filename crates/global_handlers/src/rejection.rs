use std::error::Error;
use std::future::Future;

use report_sink::ErrorValue;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry;
use crate::stacktrace::RawStackTrace;

/// Forwards a failure nobody handled to the installed handlers.
///
/// Returns `false` when rejection forwarding is not installed or nobody is
/// subscribed. A `true` result only means subscribers were called; they may
/// still suppress the value.
pub fn report_unhandled_rejection(reason: impl Into<ErrorValue>) -> bool {
    if !registry::unhandled_rejection_handler_installed() {
        debug!("unhandled rejection dropped: handler not installed");
        return false;
    }
    let reason = reason.into();
    let trace = RawStackTrace::from_rejection(&reason);
    registry::notify(&trace, &reason) > 0
}

/// Spawns `future` on the current tokio runtime and reports its `Err`
/// output as an unhandled rejection.
///
/// The handle resolves to `Some(value)` on success and `None` once the
/// error has been reported. Panics inside the task reach the panic hook.
pub fn spawn_reported<F, T, E>(future: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Error + Send + 'static,
{
    tokio::spawn(async move {
        match future.await {
            Ok(value) => Some(value),
            Err(err) => {
                report_unhandled_rejection(ErrorValue::from_error(&err));
                None
            }
        }
    })
}
