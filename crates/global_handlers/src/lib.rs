#![forbid(unsafe_code)]
//! Process-wide capture of panics and unobserved task failures.
//!
//! Two low-level hooks feed a subscription registry:
//! - the process panic hook, for panics on any thread;
//! - [`report_unhandled_rejection`] / [`spawn_reported`], for failures that
//!   no caller observed.
//!
//! [`install`] subscribes a [`GlobalHandlers`] instance that turns each
//! captured error into a [`report_sink::Event`] and hands it to a
//! [`report_sink::Sink`]. Failed deliveries come back through the rejection
//! hook marked as the sink's own request and are dropped there.
//!
//! Most applications only need [`init`] and [`log`].

mod handlers;
mod options;
mod parsers;
mod rejection;
pub mod registry;
mod service;
mod stacktrace;
mod suppress;

pub use handlers::{install, GlobalHandlers};
pub use options::InstallOptions;
pub use parsers::{
    event_from_stacktrace, exception_from_stacktrace, prepare_frames, STACKTRACE_LIMIT,
};
pub use registry::{uninstall, SubscriptionId};
pub use rejection::{report_unhandled_rejection, spawn_reported};
pub use service::{current_sink, init, init_from_env, init_with_sink, log, reset};
pub use stacktrace::{
    parse_backtrace, set_stack_trace_limit, stack_trace_limit, MechanismKind, RawStackTrace,
    StackFrame, TraceMessage, TraceMode, DEFAULT_STACK_TRACE_LIMIT, INSTALLED_STACK_TRACE_LIMIT,
};
pub use suppress::{ignore_on_error, should_ignore_on_error, without_capture, IgnoreOnErrorGuard};
