use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ErrorValue;

/// Severity attached to an event.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Error,
    Warning,
    Info,
}

/// Describes how an exception was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mechanism {
    #[serde(rename = "type")]
    pub ty: String,
    pub handled: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    pub in_app: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
    pub frames: Vec<Frame>,
}

/// One entry of an event's exception list.
///
/// `ty` and `value` are optional while the event is being assembled; a
/// finalized pipeline event always carries both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionValues {
    pub values: Vec<Exception>,
}

/// A captured error event in its wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Event {
    pub fn exceptions(&self) -> &[Exception] {
        self.exception
            .as_ref()
            .map(|exception| exception.values.as_slice())
            .unwrap_or_default()
    }

    pub fn first_exception(&self) -> Option<&Exception> {
        self.exceptions().first()
    }

    /// Makes sure the first exception entry carries a type, a value and a
    /// mechanism, filling only the parts that are missing or empty.
    pub fn add_exception_type_value(
        &mut self,
        value: &str,
        ty: &str,
        mechanism: Option<Mechanism>,
    ) {
        let values = &mut self.exception.get_or_insert_with(Default::default).values;
        if values.is_empty() {
            values.push(Exception::default());
        }
        let first = &mut values[0];

        if first.value.as_deref().map_or(true, str::is_empty) {
            first.value = Some(value.to_string());
        }
        if first.ty.as_deref().map_or(true, str::is_empty) {
            first.ty = Some(if ty.is_empty() { "Error" } else { ty }.to_string());
        }
        if first.mechanism.is_none() {
            first.mechanism = mechanism;
        }
    }
}

/// Side information passed alongside an event to [`crate::Sink::capture`].
#[derive(Debug, Clone, Default)]
pub struct EventHint {
    pub data: Option<Value>,
    pub original_exception: Option<ErrorValue>,
}
