//! Error types for tether
//!
//! `RemoteError` is the value-level error that crosses the channel; it is what
//! a remote member raises and what a dispatcher rejects with. `TetherError`
//! covers everything that can go wrong locally around it.

use crate::channel::ChannelId;
use tether_types::{Key, MESSAGE_DISPOSED};
use thiserror::Error;

/// Error category carried by name on the wire
///
/// The set is closed. A serialized error whose name is not listed here
/// decodes as [`ErrorKind::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    EvalError,
    UriError,
    DataCloneError,
    NotAFunction,
    UnsupportedOperation,
    DisposedCallback,
}

impl ErrorKind {
    /// Every known kind, in wire order
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::EvalError,
        ErrorKind::UriError,
        ErrorKind::DataCloneError,
        ErrorKind::NotAFunction,
        ErrorKind::UnsupportedOperation,
        ErrorKind::DisposedCallback,
    ];

    /// Name used in the `name` field of a serialized error
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::UriError => "URIError",
            ErrorKind::DataCloneError => "DataCloneError",
            ErrorKind::NotAFunction => "NotAFunctionError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperationError",
            ErrorKind::DisposedCallback => "DisposedCallbackError",
        }
    }

    pub fn from_name(name: &str) -> Option<ErrorKind> {
        ErrorKind::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error value raised by a remote member or reconstructed from the wire
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {}", .kind.name(), .message)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    pub fn data_clone(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataCloneError, message)
    }

    /// Apply or construct addressed a member that cannot be called
    pub fn not_a_function(key: &Key) -> Self {
        Self::new(ErrorKind::NotAFunction, format!("{} is not a function", key))
    }

    pub fn unsupported(kind: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedOperation,
            format!("Unsupported operation \"{}\"", kind),
        )
    }

    /// A callback stub was invoked after its reference was released
    pub fn disposed() -> Self {
        Self::new(ErrorKind::DisposedCallback, MESSAGE_DISPOSED)
    }
}

/// Errors surfaced by the tether runtime
///
/// The type is `Clone` so that one memoized resolution can hand the same
/// outcome to every awaiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TetherError {
    /// The channel already has a live executor
    #[error("channel {0} already has an executor attached; dispose the previous attachment first")]
    AlreadyAttached(ChannelId),

    /// Executors and local channels spawn work onto the ambient tokio runtime
    #[error("no tokio runtime is available on this thread")]
    NoRuntime,

    /// The remote side faulted
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A persisted callback was used after dispose
    #[error("{}", MESSAGE_DISPOSED)]
    Disposed,

    /// The channel refused a message
    #[error("Channel error: {0}")]
    Channel(String),

    /// A message could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The chain cannot express the requested operation
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    /// The reply sender went away before the operation settled
    #[error("request dropped before a reply arrived")]
    Dropped,
}

impl TetherError {
    /// Remote error carried by this failure, if any
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            TetherError::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Error kind as a remote caller would see it
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TetherError::Remote(err) => Some(err.kind),
            TetherError::Disposed => Some(ErrorKind::DisposedCallback),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Serialization(err.to_string())
    }
}

/// Result type using TetherError
pub type Result<T> = std::result::Result<T, TetherError>;
