//! Recorded operations against a remote value
//!
//! A chain is zero or more `Get` actions followed by a single terminal action.
//! The executor replays it left to right starting from its target object.

use crate::Key;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Ordered path from the root stand-in to one requested operation
pub type ActionChain = Vec<Action>;

/// One recorded member operation
///
/// Unknown tags and actions missing their key decode to `Unsupported`
/// instead of failing the whole message, so the executor can reject them
/// through the normal error reply. Actions whose fields have the wrong
/// shape still fail the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAction", into = "RawAction")]
pub enum Action {
    /// Property read
    Get { key: Key },
    /// Property write
    Set { key: Key, value: Json },
    /// Method call
    Apply { key: Key, args: Vec<Json> },
    /// Construction through a constructor-valued member
    Construct { key: Key, args: Vec<Json> },
    /// Anything the protocol does not know how to replay
    Unsupported { kind: String },
}

impl Action {
    pub fn get(key: impl Into<Key>) -> Self {
        Action::Get { key: key.into() }
    }

    /// Wire tag of this action
    pub fn kind(&self) -> &str {
        match self {
            Action::Get { .. } => "get",
            Action::Set { .. } => "set",
            Action::Apply { .. } => "apply",
            Action::Construct { .. } => "construct",
            Action::Unsupported { kind } => kind,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Action::Get { key }
            | Action::Set { key, .. }
            | Action::Apply { key, .. }
            | Action::Construct { key, .. } => Some(key),
            Action::Unsupported { .. } => None,
        }
    }

    pub fn is_get(&self) -> bool {
        matches!(self, Action::Get { .. })
    }
}

/// Render a chain as a dotted path for logs, e.g. `user.greet()`
pub fn describe(chain: &[Action]) -> String {
    if chain.is_empty() {
        return "<root>".to_string();
    }

    chain
        .iter()
        .map(|action| match action {
            Action::Get { key } => key.to_string(),
            Action::Set { key, .. } => format!("{} =", key),
            Action::Apply { key, args } => format!("{}({})", key, args.len()),
            Action::Construct { key, args } => format!("new {}({})", key, args.len()),
            Action::Unsupported { kind } => format!("<{}>", kind),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Json>>,
}

impl From<RawAction> for Action {
    fn from(raw: RawAction) -> Self {
        let RawAction {
            kind,
            key,
            value,
            args,
        } = raw;

        match (kind.as_str(), key) {
            ("get", Some(key)) => Action::Get { key },
            ("set", Some(key)) => Action::Set {
                key,
                value: value.unwrap_or(Json::Null),
            },
            ("apply", Some(key)) => Action::Apply {
                key,
                args: args.unwrap_or_default(),
            },
            ("construct", Some(key)) => Action::Construct {
                key,
                args: args.unwrap_or_default(),
            },
            _ => Action::Unsupported { kind },
        }
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let kind = action.kind().to_string();
        match action {
            Action::Get { key } => RawAction {
                kind,
                key: Some(key),
                value: None,
                args: None,
            },
            Action::Set { key, value } => RawAction {
                kind,
                key: Some(key),
                value: Some(value),
                args: None,
            },
            Action::Apply { key, args } | Action::Construct { key, args } => RawAction {
                kind,
                key: Some(key),
                value: None,
                args: Some(args),
            },
            Action::Unsupported { .. } => RawAction {
                kind,
                key: None,
                value: None,
                args: None,
            },
        }
    }
}
