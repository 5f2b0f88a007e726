//! Dispatching side of a tether channel
//!
//! The dispatcher turns a recorded chain into an operation message, then
//! listens for replies carrying the operation's correlation id. Each
//! operation keeps its own listener until it is both settled and holds no
//! more callbacks that the remote side could still fire.

use crate::callback::{Arg, Callback, Persisted};
use crate::chain::Chain;
use crate::channel::{Channel, ListenerId, ListenerSet};
use crate::codec::{self, Value};
use crate::error::{Result, TetherError};
use crate::ids::{CorrelationIds, RandomIds};
use futures::channel::oneshot;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tether_types::{Action, CallbackRef, CorrelationId, FunctionRef, Key, Message};
use tracing::{debug, trace, warn};

/// One step of a recorded chain, before arguments are encoded
#[derive(Debug, Clone)]
pub enum Op {
    Get(Key),
    Set(Key, Value),
    Apply(Key, Vec<Arg>),
    Construct(Key, Vec<Arg>),
}

/// Sends operations over a channel and routes their replies
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    ids: Arc<dyn CorrelationIds>,
}

enum LocalCallback {
    Once(Callback),
    Persisted(Persisted),
}

struct PendingRequest {
    id: CorrelationId,
    state: Mutex<RequestState>,
}

#[derive(Default)]
struct RequestState {
    responder: Option<oneshot::Sender<Result<Value>>>,
    callbacks: HashMap<CallbackRef, LocalCallback>,
    fulfilled: bool,
    listener: Option<ListenerId>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_ids(channel, Arc::new(RandomIds))
    }

    /// Use a custom id source for correlation ids and callback refs
    pub fn with_ids(channel: Arc<dyn Channel>, ids: Arc<dyn CorrelationIds>) -> Self {
        Self { channel, ids }
    }

    /// Stand-in for the remote target
    pub fn root(&self) -> Chain {
        Chain::root(self.clone())
    }

    /// Post one operation and wait for its reply
    pub fn send(&self, ops: Vec<Op>) -> Reply {
        let id = CorrelationId::new(self.ids.next_id());
        let request = Arc::new(PendingRequest {
            id: id.clone(),
            state: Mutex::new(RequestState::default()),
        });

        let (tx, rx) = oneshot::channel();
        request.state.lock().responder = Some(tx);

        let actions = match self.encode_ops(&request, ops) {
            Ok(actions) => actions,
            Err(err) => return Reply::failed(err),
        };
        let payload = match (Message::Operation { id: id.clone(), data: actions }).to_json() {
            Ok(payload) => payload,
            Err(err) => return Reply::failed(err.into()),
        };

        let listeners = Arc::downgrade(self.channel.listeners());
        let handler = request.clone();
        let listener = self.channel.add_listener(Arc::new(move |payload: &Json| {
            on_reply(&handler, &listeners, payload);
        }));
        request.state.lock().listener = Some(listener);

        trace!(%id, "posting operation");
        if let Err(err) = self.channel.post(payload) {
            request.state.lock().listener = None;
            self.channel.remove_listener(listener);
            return Reply::failed(err);
        }

        Reply::pending(rx)
    }

    fn encode_ops(&self, request: &Arc<PendingRequest>, ops: Vec<Op>) -> Result<Vec<Action>> {
        ops.into_iter()
            .map(|op| -> Result<Action> {
                Ok(match op {
                    Op::Get(key) => Action::Get { key },
                    Op::Set(key, value) => Action::Set {
                        key,
                        value: codec::encode(&value),
                    },
                    Op::Apply(key, args) => Action::Apply {
                        key,
                        args: self.encode_args(request, args)?,
                    },
                    Op::Construct(key, args) => Action::Construct {
                        key,
                        args: self.encode_args(request, args)?,
                    },
                })
            })
            .collect()
    }

    /// Encode arguments, registering callbacks under fresh refs
    fn encode_args(&self, request: &Arc<PendingRequest>, args: Vec<Arg>) -> Result<Vec<Json>> {
        args.into_iter()
            .map(|arg| match arg {
                Arg::Value(value) => Ok(codec::encode(&value)),
                Arg::Callback(callback) => {
                    let callback_ref = CallbackRef::new(self.ids.next_id());
                    request
                        .state
                        .lock()
                        .callbacks
                        .insert(callback_ref.clone(), LocalCallback::Once(callback));
                    Ok(FunctionRef::new(callback_ref, false).to_json())
                }
                Arg::Persisted(persisted) => {
                    if persisted.is_disposed() {
                        return Err(TetherError::Disposed);
                    }
                    let callback_ref = CallbackRef::new(self.ids.next_id());
                    request.state.lock().callbacks.insert(
                        callback_ref.clone(),
                        LocalCallback::Persisted(persisted.clone()),
                    );
                    persisted.on_dispose(self.dispose_hook(request, callback_ref.clone()));
                    Ok(FunctionRef::new(callback_ref, true).to_json())
                }
            })
            .collect()
    }

    /// Drop the ref locally and tell the executor to stop honouring it
    fn dispose_hook(
        &self,
        request: &Arc<PendingRequest>,
        callback_ref: CallbackRef,
    ) -> impl FnOnce() + Send + 'static {
        let request = Arc::downgrade(request);
        let channel = self.channel.clone();
        move || {
            if let Some(request) = request.upgrade() {
                request.state.lock().callbacks.remove(&callback_ref);
                release_if_done(&request, channel.listeners());
            }

            debug!(callback = %callback_ref, "disposing persisted callback");
            let message = Message::Dispose {
                callback: callback_ref,
            };
            match message.to_json() {
                Ok(payload) => {
                    if let Err(err) = channel.post(payload) {
                        warn!(?err, "failed to post dispose");
                    }
                }
                Err(err) => warn!(?err, "failed to encode dispose"),
            }
        }
    }
}

fn on_reply(request: &PendingRequest, listeners: &Weak<ListenerSet>, payload: &Json) {
    let Some(message) = Message::parse(payload) else {
        return;
    };
    if message.id() != Some(&request.id) {
        return;
    }

    match message {
        Message::Success { result, .. } => {
            settle(request, listeners, Ok(codec::decode(result)));
        }
        Message::Failure { error, .. } => {
            let err = codec::decode_failure(&error);
            settle(request, listeners, Err(TetherError::Remote(err)));
        }
        Message::Callback { func, .. } => {
            let callback = {
                let mut state = request.state.lock();
                let persisted = match state.callbacks.get(&func.callback) {
                    Some(LocalCallback::Persisted(persisted)) => Some(persisted.clone()),
                    _ => None,
                };
                match persisted {
                    Some(persisted) => Some(LocalCallback::Persisted(persisted)),
                    // One-shot refs are spent by their first invocation
                    None => state.callbacks.remove(&func.callback),
                }
            };

            let args: Vec<Value> = func.args.into_iter().map(codec::decode).collect();
            match callback {
                Some(LocalCallback::Once(callback)) => callback.invoke(args),
                Some(LocalCallback::Persisted(persisted)) => {
                    if let Err(err) = persisted.apply(args) {
                        debug!(callback = %func.callback, %err, "persisted callback refused");
                    }
                }
                None => debug!(callback = %func.callback, "callback no longer registered"),
            }

            if let Some(listeners) = listeners.upgrade() {
                release_if_done(request, &listeners);
            }
        }
        Message::Operation { .. } | Message::Dispose { .. } => {}
    }
}

fn settle(request: &PendingRequest, listeners: &Weak<ListenerSet>, outcome: Result<Value>) {
    let responder = {
        let mut state = request.state.lock();
        state.fulfilled = true;
        state.responder.take()
    };

    if let Some(listeners) = listeners.upgrade() {
        release_if_done(request, &listeners);
    }
    if let Some(responder) = responder {
        let _ = responder.send(outcome);
    }
}

/// Stop listening once nothing more can arrive for this request
fn release_if_done(request: &PendingRequest, listeners: &ListenerSet) {
    let listener = {
        let mut state = request.state.lock();
        if state.fulfilled && state.callbacks.is_empty() {
            state.listener.take()
        } else {
            None
        }
    };

    if let Some(listener) = listener {
        listeners.remove(listener);
        trace!(id = %request.id, "request released");
    }
}

/// Future resolving to the outcome of one operation
pub struct Reply {
    state: ReplyState,
}

enum ReplyState {
    Pending(oneshot::Receiver<Result<Value>>),
    Failed(Option<TetherError>),
}

impl Reply {
    fn pending(rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            state: ReplyState::Pending(rx),
        }
    }

    pub(crate) fn failed(err: TetherError) -> Self {
        Self {
            state: ReplyState::Failed(Some(err)),
        }
    }
}

impl Future for Reply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            ReplyState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(TetherError::Dropped)),
                Poll::Pending => Poll::Pending,
            },
            ReplyState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(TetherError::Dropped))),
        }
    }
}

/// Reply to a property write: whether the target accepted it
pub struct SetReply(Reply);

impl SetReply {
    pub(crate) fn new(reply: Reply) -> Self {
        Self(reply)
    }
}

impl Future for SetReply {
    type Output = Result<bool>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map_ok(|value| value.as_bool().unwrap_or(false))
    }
}
