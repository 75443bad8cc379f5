use report_sink::{Event, Exception, ExceptionValues, Frame, Stacktrace};

use crate::stacktrace::{RawStackTrace, StackFrame};

/// Upper bound on frames attached to an exception.
pub const STACKTRACE_LIMIT: usize = 50;

pub(crate) const UNRECOVERABLE_ERROR: &str = "Unrecoverable error caught";

/// Frames added by the hook and backtrace capture itself.
const CAPTURE_MACHINERY: &[&str] = &[
    "std::backtrace",
    "global_handlers::",
    "PanicHookInfo",
];

/// Frames between the panicking call and the panic hook.
const PANIC_ENTRY: &[&str] = &[
    "core::panicking::",
    "rust_begin_unwind",
    "std::panicking::begin_panic",
    "std::panicking::panic_",
    "std::panicking::rust_panic",
    "__rust_end_short_backtrace",
];

/// Frames below which only runtime or thread bootstrap remains.
const RUNTIME_ENTRY: &[&str] = &["__rust_begin_short_backtrace", "std::rt::lang_start"];

const RUNTIME_ENTRY_SYMBOLS: &[&str] = &[
    "main",
    "_start",
    "__libc_start_main",
    "__libc_start_call_main",
];

const LIBRARY_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "tokio::",
    "<std::",
    "<core::",
    "<alloc::",
    "<unknown>",
    "__rust_try",
    "__rustc::",
];

pub fn event_from_stacktrace(trace: &RawStackTrace) -> Event {
    Event {
        exception: Some(ExceptionValues {
            values: vec![exception_from_stacktrace(trace)],
        }),
        ..Event::default()
    }
}

pub fn exception_from_stacktrace(trace: &RawStackTrace) -> Exception {
    let frames = prepare_frames(&trace.stack);
    let mut exception = Exception {
        ty: trace.name.clone().filter(|name| !name.is_empty()),
        value: Some(trace.message_text().unwrap_or_default().to_string()),
        mechanism: None,
        stacktrace: (!frames.is_empty()).then_some(Stacktrace { frames }),
    };
    if exception.ty.is_none() && exception.value.as_deref() == Some("") {
        exception.value = Some(UNRECOVERABLE_ERROR.to_string());
    }
    exception
}

/// Turns innermost-first trace frames into event frames, oldest first.
///
/// Everything up to the innermost panic entry frame is dropped from the top
/// (or, without one, the leading capture frames). The bottom is cut at the
/// first runtime entry frame.
pub fn prepare_frames(stack: &[StackFrame]) -> Vec<Frame> {
    let func = |frame: &StackFrame| frame.func.clone().unwrap_or_default();

    let start = match stack
        .iter()
        .rposition(|frame| matches_any(&func(frame), PANIC_ENTRY))
    {
        Some(idx) => idx + 1,
        None => stack
            .iter()
            .position(|frame| !matches_any(&func(frame), CAPTURE_MACHINERY))
            .unwrap_or(stack.len()),
    };
    let end = stack[start..]
        .iter()
        .position(|frame| is_runtime_entry(&func(frame)))
        .map_or(stack.len(), |idx| start + idx);
    let local = &stack[start..end];

    let fallback_url = local.first().and_then(|frame| frame.url.clone());
    let mut frames: Vec<Frame> = local
        .iter()
        .take(STACKTRACE_LIMIT)
        .map(|frame| {
            let function = frame
                .func
                .clone()
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "?".to_string());
            Frame {
                filename: frame.url.clone().or_else(|| fallback_url.clone()),
                in_app: !matches_prefix(&function, LIBRARY_PREFIXES),
                function,
                lineno: frame.line,
                colno: frame.column,
            }
        })
        .collect();
    frames.reverse();
    frames
}

fn matches_any(func: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| func.contains(needle))
}

fn matches_prefix(func: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| func.starts_with(prefix))
}

fn is_runtime_entry(func: &str) -> bool {
    RUNTIME_ENTRY_SYMBOLS.contains(&func) || matches_any(func, RUNTIME_ENTRY)
}
