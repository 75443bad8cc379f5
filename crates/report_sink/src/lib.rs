#![forbid(unsafe_code)]
//! Reporting sink for captured errors.
//!
//! This crate owns the event wire shape and everything needed to get an
//! event to a remote collector:
//! - DSN parsing and collector authentication.
//! - Immutable sink configuration (release, environment, value limits).
//! - Payload normalization so captured values stay bounded.
//! - A fire-and-forget [`Sink`] backed by a background delivery worker.
//!
//! Delivery failures are marked as "own request" failures (see
//! [`OWN_REQUEST_MARKER`]) so that a capture pipeline observing them can skip
//! reporting the sink's own failures.

mod config;
mod dsn;
mod error;
mod event;
pub mod normalize;
mod sink;
mod transport;
mod value;

pub use config::{BeforeSend, SinkOptions};
pub use dsn::{dsn_from_env, Dsn};
pub use error::{DeliveryError, SinkError};
pub use event::{Event, EventHint, Exception, ExceptionValues, Frame, Level, Mechanism, Stacktrace};
pub use sink::{DeliveryFailureListener, Sink};
pub use transport::{BoxFuture, HttpTransport, Transport};
pub use value::{ErrorLike, ErrorValue, OWN_REQUEST_MARKER};
