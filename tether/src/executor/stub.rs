//! Remote stand-ins for client callbacks

use super::member::{self, Member, RemoteFunction};
use crate::channel::Channel;
use crate::error::RemoteError;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tether_types::{CallbackInvocation, CallbackRef, CorrelationId, Message};
use tracing::{debug, warn};

/// Persisted refs the client has not disposed yet
#[derive(Debug, Default)]
pub(crate) struct LiveCallbacks {
    refs: Mutex<HashSet<CallbackRef>>,
}

impl LiveCallbacks {
    pub(crate) fn insert(&self, callback: CallbackRef) {
        self.refs.lock().insert(callback);
    }

    pub(crate) fn remove(&self, callback: &CallbackRef) -> bool {
        self.refs.lock().remove(callback)
    }

    pub(crate) fn contains(&self, callback: &CallbackRef) -> bool {
        self.refs.lock().contains(callback)
    }

    pub(crate) fn len(&self) -> usize {
        self.refs.lock().len()
    }
}

/// Function handed to the target in place of a client callback
///
/// Invoking it posts a callback message under the originating operation's
/// id. A one-shot stub works once; a persisted stub works until the client
/// disposes its ref.
pub(crate) struct CallbackStub {
    id: CorrelationId,
    callback: CallbackRef,
    called: Mutex<bool>,
    live: Arc<LiveCallbacks>,
    channel: Arc<dyn Channel>,
}

impl CallbackStub {
    pub(crate) fn new(
        id: CorrelationId,
        callback: CallbackRef,
        persisted: bool,
        live: Arc<LiveCallbacks>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        if persisted {
            live.insert(callback.clone());
        }
        Self {
            id,
            callback,
            called: Mutex::new(false),
            live,
            channel,
        }
    }
}

impl RemoteFunction for CallbackStub {
    fn call(&self, args: Vec<Member>) -> Result<Member, RemoteError> {
        // Held until the post lands so a failed call does not spend the ref
        let mut called = self.called.lock();
        if *called && !self.live.contains(&self.callback) {
            warn!(callback = %self.callback, "disposed callback invoked");
            return Err(RemoteError::disposed());
        }

        let args = args
            .iter()
            .map(member::encode)
            .collect::<Result<Vec<_>, _>>()?;
        let message = Message::Callback {
            id: self.id.clone(),
            func: CallbackInvocation {
                callback: self.callback.clone(),
                args,
            },
        };
        let payload = message
            .to_json()
            .map_err(|e| RemoteError::data_clone(e.to_string()))?;

        debug!(id = %self.id, callback = %self.callback, "posting callback");
        self.channel
            .post(payload)
            .map_err(|e| RemoteError::error(e.to_string()))?;
        *called = true;
        Ok(Member::Absent)
    }
}
