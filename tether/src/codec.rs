//! Value codec shared by both endpoints
//!
//! Plain data crosses the channel as JSON. Error values are not plain data,
//! so they travel as a tagged record:
//!
//! ```json
//! {"type": "tether:error", "name": "TypeError", "message": "...", "stack": "..."}
//! ```
//!
//! Decoding restores the error with its kind, message and stack. A name
//! outside the known set comes back as a generic `Error`.

use crate::error::{ErrorKind, RemoteError};
use serde_json::{json, Value as Json};
use tether_types::TAG_ERROR;

/// A value as seen by the dispatching side
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Data(Json),
    Error(RemoteError),
}

impl Value {
    pub fn null() -> Self {
        Value::Data(Json::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Data(Json::Null))
    }

    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Value::Data(json) => Some(json),
            Value::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&RemoteError> {
        match self {
            Value::Error(err) => Some(err),
            Value::Data(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(Json::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_data().and_then(Json::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Json::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(Json::as_bool)
    }

    pub fn into_data(self) -> Option<Json> {
        match self {
            Value::Data(json) => Some(json),
            Value::Error(_) => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::Data(json)
    }
}

impl From<RemoteError> for Value {
    fn from(err: RemoteError) -> Self {
        Value::Error(err)
    }
}

macro_rules! value_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Data(Json::from(v))
                }
            }
        )*
    };
}

value_from_primitive!(bool, i32, i64, u32, u64, f64, &str, String);

/// Encode a value for the wire
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Data(json) => json.clone(),
        Value::Error(err) => encode_error(err),
    }
}

/// Decode a wire value, restoring tagged errors
pub fn decode(json: Json) -> Value {
    match decode_error(&json) {
        Some(err) => Value::Error(err),
        None => Value::Data(json),
    }
}

pub fn encode_error(err: &RemoteError) -> Json {
    json!({
        "type": TAG_ERROR,
        "name": err.kind.name(),
        "message": err.message,
        "stack": err.stack,
    })
}

pub fn is_serialized_error(json: &Json) -> bool {
    json.get("type").and_then(Json::as_str) == Some(TAG_ERROR)
}

/// Restore a serialized error; `None` when `json` is not one
pub fn decode_error(json: &Json) -> Option<RemoteError> {
    if !is_serialized_error(json) {
        return None;
    }

    let kind = json
        .get("name")
        .and_then(Json::as_str)
        .and_then(ErrorKind::from_name)
        .unwrap_or(ErrorKind::Error);
    let message = json
        .get("message")
        .and_then(Json::as_str)
        .unwrap_or_default();
    let stack = json.get("stack").and_then(Json::as_str).map(str::to_string);

    Some(RemoteError {
        kind,
        message: message.to_string(),
        stack,
    })
}

/// Error carried by a failure reply
///
/// Peers that put something other than a serialized error in the `error`
/// field still produce a rejection, with the raw payload as its message.
pub fn decode_failure(json: &Json) -> RemoteError {
    match decode_error(json) {
        Some(err) => err,
        None => match json.as_str() {
            Some(message) => RemoteError::error(message),
            None => RemoteError::error(json.to_string()),
        },
    }
}
