use std::sync::Arc;

use report_sink::normalize::{
    keys_to_event_message, normalize, normalize_to_size, truncate, DEFAULT_MAX_KEYS_LENGTH,
    DEFAULT_MAX_SERIALIZED_BYTES, DEFAULT_NORMALIZE_DEPTH,
};
use report_sink::{
    ErrorValue, Event, EventHint, Exception, ExceptionValues, Level, Mechanism, Sink,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::options::InstallOptions;
use crate::parsers::event_from_stacktrace;
use crate::registry::{self, SubscriptionId};
use crate::rejection::report_unhandled_rejection;
use crate::stacktrace::{
    set_stack_trace_limit, MechanismKind, RawStackTrace, TraceMessage, TraceMode,
    INSTALLED_STACK_TRACE_LIMIT,
};
use crate::suppress::should_ignore_on_error;

pub(crate) const NO_ERROR_MESSAGE: &str = "No error message";
const UNHANDLED_REJECTION: &str = "UnhandledRejection";
const PRIMITIVE_REJECTION_PREFIX: &str = "Non-Error promise rejection captured with value: ";
const OBJECT_REJECTION_PREFIX: &str = "Non-Error promise rejection captured with keys: ";
const SERIALIZED_KEY: &str = "__serialized__";

/// Turns errors observed by the global hooks into events for a [`Sink`].
#[derive(Debug)]
pub struct GlobalHandlers {
    options: InstallOptions,
    sink: Arc<Sink>,
}

impl GlobalHandlers {
    pub const ID: &'static str = "GlobalHandlers";

    pub fn new(options: InstallOptions, sink: Arc<Sink>) -> Arc<Self> {
        Arc::new(Self { options, sink })
    }

    pub fn options(&self) -> InstallOptions {
        self.options
    }

    /// Subscribes to the registry and attaches the enabled hooks.
    ///
    /// Not idempotent: each call adds one more subscriber, so errors are
    /// reported once per call.
    pub fn setup_once(self: &Arc<Self>) -> SubscriptionId {
        set_stack_trace_limit(INSTALLED_STACK_TRACE_LIMIT);

        let handlers = Arc::clone(self);
        let id = registry::subscribe(move |trace, error| {
            handlers.on_captured_error(trace.clone(), error);
        });

        self.sink.set_delivery_failure_listener(|failure| {
            report_unhandled_rejection(ErrorValue::from(failure));
        });

        if self.options.onerror {
            debug!("global handler attached: onerror");
            registry::install_global_handler();
        }
        if self.options.onunhandledrejection {
            debug!("global handler attached: onunhandledrejection");
            registry::install_unhandled_rejection_handler();
        }
        id
    }

    /// Builds an event for one captured error and hands it to the sink.
    ///
    /// Returns `false` when the capture was suppressed, either because the
    /// current thread asked to ignore errors or because `error` carries the
    /// own-request marker.
    pub fn on_captured_error(&self, mut trace: RawStackTrace, error: &ErrorValue) -> bool {
        if should_ignore_on_error() || error.is_own_request() {
            debug!(
                mechanism = trace.mechanism.as_str(),
                "suppressed capture of ignored or own-request error"
            );
            return false;
        }

        let event = self.event_from_global_handler(&mut trace, error);
        let hint = EventHint {
            data: serde_json::to_value(&trace)
                .ok()
                .map(|stack| json!({ "stack": stack })),
            original_exception: Some(error.clone()),
        };
        self.sink.capture(event, hint);
        true
    }

    pub(crate) fn event_from_global_handler(
        &self,
        trace: &mut RawStackTrace,
        error: &ErrorValue,
    ) -> Event {
        let rejection = trace.mechanism == MechanismKind::OnUnhandledRejection;

        if !rejection && trace.message_text().is_none() {
            trace.message = Some(TraceMessage::Text(recover_message(trace.message.as_ref())));
        }

        if rejection && (trace.incomplete || trace.mode == TraceMode::Failed) {
            return event_from_incomplete_rejection(trace, error);
        }

        let mut event = event_from_stacktrace(trace);

        let mut data = Map::new();
        data.insert("mode".to_string(), Value::from(trace.mode.as_str()));
        insert_present(&mut data, trace);

        let max_value_length = self.sink.options().max_value_length;
        let fallback_value = trace
            .original
            .as_ref()
            .and_then(|original| serde_json::to_string(&normalize(original, usize::MAX)).ok())
            .map(|serialized| truncate(&serialized, max_value_length))
            .unwrap_or_default();
        let fallback_type = if rejection { UNHANDLED_REJECTION } else { "Error" };

        event.add_exception_type_value(
            &fallback_value,
            fallback_type,
            Some(Mechanism {
                ty: trace.mechanism.as_str().to_string(),
                handled: false,
                data,
            }),
        );
        ensure_value(&mut event);
        event
    }
}

/// Event for a rejection whose value could not be turned into a full trace.
pub(crate) fn event_from_incomplete_rejection(trace: &RawStackTrace, error: &ErrorValue) -> Event {
    let (value, extra) = match error {
        ErrorValue::Primitive(_) => (
            format!("{PRIMITIVE_REJECTION_PREFIX}{}", error.display_primitive()),
            None,
        ),
        ErrorValue::PlainObject(_) | ErrorValue::Array(_) | ErrorValue::ErrorLike(_) => {
            let keys = keys_to_event_message(&error.sorted_keys(), DEFAULT_MAX_KEYS_LENGTH);
            let serialized = normalize_to_size(
                &error.to_json(),
                DEFAULT_NORMALIZE_DEPTH,
                DEFAULT_MAX_SERIALIZED_BYTES,
            );
            let mut extra = Map::new();
            extra.insert(SERIALIZED_KEY.to_string(), serialized);
            (format!("{OBJECT_REJECTION_PREFIX}{keys}"), Some(extra))
        }
    };

    let mut data = Map::new();
    data.insert("mode".to_string(), Value::from(trace.mode.as_str()));
    if trace.incomplete {
        data.insert("incomplete".to_string(), Value::Bool(true));
    }
    insert_present(&mut data, trace);

    Event {
        level: Some(Level::Error),
        exception: Some(ExceptionValues {
            values: vec![Exception {
                ty: Some(UNHANDLED_REJECTION.to_string()),
                value: Some(value),
                mechanism: Some(Mechanism {
                    ty: trace.mechanism.as_str().to_string(),
                    handled: false,
                    data,
                }),
                stacktrace: None,
            }],
        }),
        extra,
        ..Event::default()
    }
}

/// Pulls `error.message` out of a structured payload.
fn recover_message(message: Option<&TraceMessage>) -> String {
    match message {
        Some(TraceMessage::Structured(value)) => value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(NO_ERROR_MESSAGE)
            .to_string(),
        Some(TraceMessage::Text(text)) => text.clone(),
        None => NO_ERROR_MESSAGE.to_string(),
    }
}

fn insert_present(data: &mut Map<String, Value>, trace: &RawStackTrace) {
    match &trace.message {
        Some(TraceMessage::Text(text)) if !text.is_empty() => {
            data.insert("message".to_string(), Value::from(text.as_str()));
        }
        Some(TraceMessage::Structured(value)) if !value.is_null() => {
            data.insert("message".to_string(), value.clone());
        }
        _ => {}
    }
    if let Some(name) = trace.name.as_deref().filter(|name| !name.is_empty()) {
        data.insert("name".to_string(), Value::from(name));
    }
}

fn ensure_value(event: &mut Event) {
    if let Some(first) = event
        .exception
        .as_mut()
        .and_then(|exception| exception.values.first_mut())
    {
        if first.value.as_deref().map_or(true, str::is_empty) {
            first.value = Some(NO_ERROR_MESSAGE.to_string());
        }
    }
}

/// Builds [`GlobalHandlers`] for `sink` and runs [`GlobalHandlers::setup_once`].
pub fn install(options: InstallOptions, sink: Arc<Sink>) -> SubscriptionId {
    GlobalHandlers::new(options, sink).setup_once()
}
