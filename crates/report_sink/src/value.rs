use std::error::Error;

use serde_json::{Map, Value};

use crate::DeliveryError;

/// Key carried by values that originate from the sink's own failed delivery.
pub const OWN_REQUEST_MARKER: &str = "__own_request__";

/// An error-shaped value: a name, a message and optionally a stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLike {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub fields: Map<String, Value>,
    pub own_request: bool,
}

impl ErrorLike {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(stack) = &self.stack {
            map.insert("stack".to_string(), Value::String(stack.clone()));
        }
        if self.own_request {
            map.insert(OWN_REQUEST_MARKER.to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

/// The shape of a captured value, decided once when it is captured.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorValue {
    /// Strings, numbers, booleans and null.
    Primitive(Value),
    /// Any object without an error shape.
    PlainObject(Map<String, Value>),
    /// An array; object-like, keyed by index.
    Array(Vec<Value>),
    ErrorLike(ErrorLike),
}

impl ErrorValue {
    /// Classifies an arbitrary JSON value.
    ///
    /// Objects with a string `message` plus a string `name` or `stack` are
    /// treated as errors.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) if looks_like_error(&map) => {
                let mut fields = map;
                let name = take_string(&mut fields, "name").unwrap_or_else(|| "Error".to_string());
                let message = take_string(&mut fields, "message").unwrap_or_default();
                let stack = take_string(&mut fields, "stack");
                let own_request = fields
                    .remove(OWN_REQUEST_MARKER)
                    .is_some_and(|marker| marker == Value::Bool(true));
                ErrorValue::ErrorLike(ErrorLike {
                    name,
                    message,
                    stack,
                    fields,
                    own_request,
                })
            }
            Value::Object(map) => ErrorValue::PlainObject(map),
            Value::Array(items) => ErrorValue::Array(items),
            primitive => ErrorValue::Primitive(primitive),
        }
    }

    /// Builds an error-shaped value from a Rust error and its `source()` chain.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let mut error = ErrorLike::new(short_type_name::<E>(), err.to_string());
        let causes: Vec<Value> = std::iter::successors(err.source(), |&cause| cause.source())
            .map(|cause| Value::String(cause.to_string()))
            .collect();
        if !causes.is_empty() {
            error.fields.insert("causes".to_string(), Value::Array(causes));
        }
        ErrorValue::ErrorLike(error)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ErrorValue::Primitive(_))
    }

    /// True when the value is marked as coming from the sink's own delivery.
    pub fn is_own_request(&self) -> bool {
        match self {
            ErrorValue::Primitive(_) | ErrorValue::Array(_) => false,
            ErrorValue::PlainObject(map) => map.get(OWN_REQUEST_MARKER) == Some(&Value::Bool(true)),
            ErrorValue::ErrorLike(error) => error.own_request,
        }
    }

    /// Own keys of an object-like value, sorted ascending.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self {
            ErrorValue::Primitive(_) => Vec::new(),
            ErrorValue::PlainObject(map) => map.keys().cloned().collect(),
            ErrorValue::Array(items) => (0..items.len()).map(|idx| idx.to_string()).collect(),
            ErrorValue::ErrorLike(error) => error.fields.keys().cloned().collect(),
        };
        keys.sort();
        keys
    }

    /// String form used in "captured with value" messages.
    pub fn display_primitive(&self) -> String {
        match self {
            ErrorValue::Primitive(value) => display_scalar(value),
            ErrorValue::PlainObject(_) => "[object Object]".to_string(),
            ErrorValue::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    Value::Object(_) => "[object Object]".to_string(),
                    other => display_scalar(other),
                })
                .collect::<Vec<_>>()
                .join(","),
            ErrorValue::ErrorLike(error) => format!("{}: {}", error.name, error.message),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ErrorValue::Primitive(value) => value.clone(),
            ErrorValue::PlainObject(map) => Value::Object(map.clone()),
            ErrorValue::Array(items) => Value::Array(items.clone()),
            ErrorValue::ErrorLike(error) => error.to_json(),
        }
    }
}

impl From<Value> for ErrorValue {
    fn from(value: Value) -> Self {
        ErrorValue::from_json(value)
    }
}

impl From<&DeliveryError> for ErrorValue {
    fn from(err: &DeliveryError) -> Self {
        let mut error = ErrorLike::new(err.kind(), err.to_string());
        if let DeliveryError::Status { status, .. } = err {
            error.fields.insert("status".to_string(), Value::from(*status));
        }
        error.own_request = true;
        ErrorValue::ErrorLike(error)
    }
}

/// Integral floats print without a fraction, as `1` rather than `1.0`.
fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() && is_integral(float) => format!("{:.0}", float + 0.0),
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}

fn is_integral(float: f64) -> bool {
    float.is_finite() && float.fract() == 0.0 && float.abs() < 1e21
}

fn looks_like_error(map: &Map<String, Value>) -> bool {
    map.get("message").is_some_and(Value::is_string)
        && (map.get("name").is_some_and(Value::is_string)
            || map.get("stack").is_some_and(Value::is_string))
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(text)) => Some(text),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

pub(crate) fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
