//! Local callbacks handed to remote members
//!
//! A plain [`Callback`] may be fired once by the remote side; its reference
//! is released as soon as that happens. A [`Persisted`] callback stays
//! callable until someone disposes it.

use crate::codec::Value;
use crate::error::{Result, TetherError};
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

type CallbackFn = Arc<dyn Fn(Vec<Value>) + Send + Sync>;
type DisposeListener = Box<dyn FnOnce() + Send>;

/// Function argument that may be invoked at most once
#[derive(Clone)]
pub struct Callback {
    func: CallbackFn,
}

impl Callback {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    pub fn invoke(&self, args: Vec<Value>) {
        (self.func)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Long-lived callback wrapper
///
/// Clones share state: disposing one clone disposes them all.
#[derive(Clone)]
pub struct Persisted {
    inner: Arc<PersistedInner>,
}

struct PersistedInner {
    func: CallbackFn,
    state: Mutex<DisposeState>,
}

#[derive(Default)]
struct DisposeState {
    disposing: bool,
    disposed: bool,
    listeners: Vec<DisposeListener>,
}

impl Persisted {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PersistedInner {
                func: Arc::new(func),
                state: Mutex::new(DisposeState::default()),
            }),
        }
    }

    /// Invoke the wrapped function
    pub fn apply(&self, args: Vec<Value>) -> Result<()> {
        if self.is_disposed() {
            return Err(TetherError::Disposed);
        }
        (self.inner.func)(args);
        Ok(())
    }

    /// Run every dispose listener, then refuse further calls
    ///
    /// Listeners registered while this runs are drained too. Calling this
    /// again is a no-op.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.disposing {
                return;
            }
            state.disposing = true;
        }

        loop {
            let listeners = {
                let mut state = self.inner.state.lock();
                if state.listeners.is_empty() {
                    state.disposed = true;
                    return;
                }
                std::mem::take(&mut state.listeners)
            };
            for listener in listeners {
                listener();
            }
        }
    }

    /// Register a listener for dispose; runs immediately if already disposed
    pub fn on_dispose<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if !state.disposed {
                state.listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl fmt::Debug for Persisted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persisted")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Empty argument list, for calls that take nothing
pub const NO_ARGS: [Arg; 0] = [];

/// Argument to a remote call
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Callback(Callback),
    Persisted(Persisted),
}

impl Arg {
    pub fn callback<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Arg::Callback(Callback::new(func))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Callback> for Arg {
    fn from(callback: Callback) -> Self {
        Arg::Callback(callback)
    }
}

impl From<Persisted> for Arg {
    fn from(persisted: Persisted) -> Self {
        Arg::Persisted(persisted)
    }
}

impl From<&Persisted> for Arg {
    fn from(persisted: &Persisted) -> Self {
        Arg::Persisted(persisted.clone())
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(Value::from(v))
                }
            }
        )*
    };
}

arg_from_value!(Json, crate::error::RemoteError, bool, i32, i64, u32, u64, f64, &str, String);
