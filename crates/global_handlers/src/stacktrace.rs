use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
};

use regex::Regex;
use report_sink::ErrorValue;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_STACK_TRACE_LIMIT: usize = 10;
/// Retained frame depth once handlers are installed.
pub const INSTALLED_STACK_TRACE_LIMIT: usize = 50;

static STACK_TRACE_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_STACK_TRACE_LIMIT);

pub fn stack_trace_limit() -> usize {
    STACK_TRACE_LIMIT.load(Ordering::Relaxed)
}

pub fn set_stack_trace_limit(limit: usize) {
    STACK_TRACE_LIMIT.store(limit, Ordering::Relaxed);
}

/// How the frames of a trace were obtained.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Parsed from a captured backtrace.
    Stack,
    /// Only the panic location was available.
    OnError,
    /// Nothing usable could be computed.
    Failed,
}

impl TraceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceMode::Stack => "stack",
            TraceMode::OnError => "onerror",
            TraceMode::Failed => "failed",
        }
    }
}

/// Which hook observed the error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MechanismKind {
    OnError,
    OnUnhandledRejection,
}

impl MechanismKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MechanismKind::OnError => "onerror",
            MechanismKind::OnUnhandledRejection => "onunhandledrejection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceMessage {
    Text(String),
    /// A non-string payload, e.g. a JSON value passed to `panic_any`.
    Structured(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StackFrame {
    pub url: Option<String>,
    pub func: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Intermediate trace built for one captured error and consumed by the
/// handlers to produce an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawStackTrace {
    pub message: Option<TraceMessage>,
    pub name: Option<String>,
    pub mode: TraceMode,
    pub mechanism: MechanismKind,
    pub incomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<Value>,
    pub stack: Vec<StackFrame>,
}

impl RawStackTrace {
    pub fn new(mechanism: MechanismKind, mode: TraceMode) -> Self {
        Self {
            message: None,
            name: None,
            mode,
            mechanism,
            incomplete: false,
            original: None,
            stack: Vec::new(),
        }
    }

    /// Trace for a panic observed by the process panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>, backtrace: &Backtrace) -> Self {
        let mut trace = Self::new(MechanismKind::OnError, TraceMode::Stack);
        trace.name = Some("panic".to_string());
        trace.message = Some(panic_message(info));

        if backtrace.status() == BacktraceStatus::Captured {
            trace.stack = parse_backtrace(&backtrace.to_string());
        }
        if trace.stack.is_empty() {
            trace.mode = TraceMode::OnError;
            trace.stack = info
                .location()
                .map(|location| StackFrame {
                    url: Some(location.file().to_string()),
                    func: None,
                    line: Some(location.line()),
                    column: Some(location.column()),
                })
                .into_iter()
                .collect();
        }
        trace
    }

    /// Trace for a rejected value nobody observed.
    ///
    /// Error-shaped values keep their name, message and parsed stack. Any
    /// other value yields an incomplete trace in `failed` mode.
    pub fn from_rejection(reason: &ErrorValue) -> Self {
        match reason {
            ErrorValue::ErrorLike(error) => {
                let mut trace = Self::new(MechanismKind::OnUnhandledRejection, TraceMode::Stack);
                trace.name = Some(error.name.clone());
                trace.message = Some(TraceMessage::Text(error.message.clone()));
                trace.stack = error.stack.as_deref().map(parse_backtrace).unwrap_or_default();
                trace.original = Some(reason.to_json());
                trace
            }
            ErrorValue::Primitive(_) | ErrorValue::PlainObject(_) | ErrorValue::Array(_) => {
                let mut trace =
                    Self::new(MechanismKind::OnUnhandledRejection, TraceMode::Failed);
                trace.incomplete = true;
                trace.original = Some(reason.to_json());
                trace
            }
        }
    }

    pub fn message_text(&self) -> Option<&str> {
        match &self.message {
            Some(TraceMessage::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// The error value handed to subscribers alongside a panic trace.
pub(crate) fn panic_error_value(trace: &RawStackTrace, backtrace: &Backtrace) -> ErrorValue {
    if let Some(TraceMessage::Structured(value)) = &trace.message {
        return ErrorValue::from_json(value.clone());
    }
    let mut error = report_sink::ErrorLike::new("panic", trace.message_text().unwrap_or_default());
    if backtrace.status() == BacktraceStatus::Captured {
        error.stack = Some(backtrace.to_string());
    }
    ErrorValue::ErrorLike(error)
}

fn panic_message(info: &PanicHookInfo<'_>) -> TraceMessage {
    let payload = info.payload();
    if let Some(text) = payload.downcast_ref::<&str>() {
        TraceMessage::Text((*text).to_string())
    } else if let Some(text) = payload.downcast_ref::<String>() {
        TraceMessage::Text(text.clone())
    } else if let Some(value) = payload.downcast_ref::<Value>() {
        TraceMessage::Structured(value.clone())
    } else {
        TraceMessage::Structured(Value::Null)
    }
}

fn frame_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+:\s+(?:0x[0-9a-f]+ - )?(.+?)\s*$").expect("valid regex"))
}

fn location_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(.+?):(\d+)(?::(\d+))?\s*$").expect("valid regex"))
}

/// Parses the text form of a std backtrace into frames, innermost first,
/// keeping at most [`stack_trace_limit`] frames.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    let limit = stack_trace_limit();
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = location_line().captures(line) {
            if let Some(frame) = frames.last_mut().filter(|frame| frame.url.is_none()) {
                frame.url = Some(caps[1].to_string());
                frame.line = caps[2].parse().ok();
                frame.column = caps.get(3).and_then(|col| col.as_str().parse().ok());
            }
            continue;
        }
        if let Some(caps) = frame_line().captures(line) {
            if frames.len() == limit {
                break;
            }
            frames.push(StackFrame {
                func: Some(caps[1].to_string()),
                ..StackFrame::default()
            });
        }
    }

    frames
}
