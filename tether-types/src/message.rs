//! Message envelopes exchanged over a tether channel
//!
//! Client to remote: `Operation`, `Dispose`.
//! Remote to client: `Success`, `Failure`, `Callback`.

use crate::action::ActionChain;
use crate::{CallbackRef, CorrelationId, TAG_FUNCTION, TAG_OPERATION, TAG_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Replay `data` against the remote target
    #[serde(rename = "tether:operation")]
    Operation { id: CorrelationId, data: ActionChain },

    /// A persisted callback was disposed on the client
    #[serde(rename = "tether:dispose")]
    Dispose {
        #[serde(rename = "ref")]
        callback: CallbackRef,
    },

    /// The operation produced a value
    #[serde(rename = "tether:success")]
    Success {
        id: CorrelationId,
        #[serde(default)]
        result: Json,
    },

    /// The operation faulted; `error` is a serialized error
    #[serde(rename = "tether:failure")]
    Failure {
        id: CorrelationId,
        #[serde(default)]
        error: Json,
    },

    /// The remote side invoked a callback argument
    #[serde(rename = "tether:callback")]
    Callback {
        id: CorrelationId,
        func: CallbackInvocation,
    },
}

/// Callback firing carried by `Message::Callback`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackInvocation {
    #[serde(rename = "ref")]
    pub callback: CallbackRef,
    #[serde(default)]
    pub args: Vec<Json>,
}

impl Message {
    /// Parse a channel payload, ignoring anything that is not tether traffic
    pub fn parse(payload: &Json) -> Option<Message> {
        let tag = payload.get("type")?.as_str()?;
        if !tag.starts_with(TAG_PREFIX) {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }

    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Correlation id of an operation payload, whether or not its actions
    /// are well formed
    pub fn operation_id(payload: &Json) -> Option<CorrelationId> {
        if payload.get("type")?.as_str()? != TAG_OPERATION {
            return None;
        }
        Some(CorrelationId::new(payload.get("id")?.as_str()?))
    }

    /// Correlation id, if the message belongs to one operation
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Message::Operation { id, .. }
            | Message::Success { id, .. }
            | Message::Failure { id, .. }
            | Message::Callback { id, .. } => Some(id),
            Message::Dispose { .. } => None,
        }
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            Message::Operation { .. } => "operation",
            Message::Dispose { .. } => "dispose",
            Message::Success { .. } => "success",
            Message::Failure { .. } => "failure",
            Message::Callback { .. } => "callback",
        }
    }
}

/// Placeholder that replaces a function argument on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub callback: CallbackRef,
    pub persisted: bool,
}

impl FunctionRef {
    pub fn new(callback: CallbackRef, persisted: bool) -> Self {
        Self {
            callback,
            persisted,
        }
    }

    pub fn to_json(&self) -> Json {
        let mut value = json!({
            "type": TAG_FUNCTION,
            "ref": self.callback.as_str(),
        });
        if self.persisted {
            value["persisted"] = Json::Bool(true);
        }
        value
    }

    /// Recognize a callback placeholder inside an argument list
    pub fn from_json(value: &Json) -> Option<Self> {
        if value.get("type")?.as_str()? != TAG_FUNCTION {
            return None;
        }
        let callback = CallbackRef::new(value.get("ref")?.as_str()?);
        let persisted = value
            .get("persisted")
            .and_then(Json::as_bool)
            .unwrap_or(false);
        Some(Self {
            callback,
            persisted,
        })
    }
}
