//! Shared wire types for tether
//!
//! This crate provides the plain-data vocabulary spoken on a tether channel:
//! member keys, recorded actions, correlation and callback identifiers, and
//! the message envelopes exchanged between a dispatcher and an executor.

pub mod action;
pub mod message;

pub use action::{Action, ActionChain};
pub use message::{CallbackInvocation, FunctionRef, Message};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every `type` tag tether puts on the wire
///
/// Channels may carry unrelated traffic; anything not tagged with this
/// prefix is ignored by both endpoints.
pub const TAG_PREFIX: &str = "tether:";

/// Tag of an operation request
pub const TAG_OPERATION: &str = "tether:operation";

/// Tag of a serialized error value
pub const TAG_ERROR: &str = "tether:error";

/// Tag of a callback reference inside an argument list
pub const TAG_FUNCTION: &str = "tether:function";

/// Message raised when a disposed callback is invoked
pub const MESSAGE_DISPOSED: &str = "The function has been disposed and is no longer available.";

/// Property name or index addressing a member of a remote value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(u64),
    Name(String),
}

impl Key {
    pub fn name(name: impl Into<String>) -> Self {
        Key::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<u64> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{}", i),
            Key::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<u64> for Key {
    fn from(index: u64) -> Self {
        Key::Index(index)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index as u64)
    }
}

/// Correlation id pairing an operation with its replies
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a callback living on the dispatching side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackRef(pub String);

impl CallbackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
