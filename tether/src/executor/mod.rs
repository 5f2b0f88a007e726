//! Executing side of a tether channel
//!
//! An [`Executor`] listens on a channel endpoint, replays incoming operation
//! chains against its target object and posts exactly one success or failure
//! reply per operation. Callback placeholders in argument lists become
//! [`CallbackStub`]s that fire callback messages back to the client.
//!
//! At most one executor serves a channel at a time; see [`registry`].

pub mod member;
pub mod object;
pub mod registry;
mod stub;

pub use member::{Args, Member, PendingMember, RemoteFunction, RemoteObject};
pub use object::{DynObject, NativeFn};

use crate::channel::{Channel, ChannelId, ListenerId};
use crate::codec;
use crate::error::{ErrorKind, RemoteError, Result, TetherError};
use futures::FutureExt;
use serde_json::Value as Json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use stub::{CallbackStub, LiveCallbacks};
use tether_types::action::describe;
use tether_types::{Action, ActionChain, CorrelationId, FunctionRef, Key, Message};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Replays operations against one target object
pub struct Executor {
    target: Arc<dyn RemoteObject>,
    channel: Arc<dyn Channel>,
    live: Arc<LiveCallbacks>,
    runtime: Handle,
}

impl Executor {
    /// Serve `target` on `channel`
    ///
    /// Fails if another executor is already attached to the same channel, or
    /// if called outside a tokio runtime.
    pub fn attach(target: Arc<dyn RemoteObject>, channel: Arc<dyn Channel>) -> Result<Attachment> {
        let runtime = Handle::try_current().map_err(|_| TetherError::NoRuntime)?;
        let channel_id = channel.id();
        if !registry::claim(channel_id) {
            return Err(TetherError::AlreadyAttached(channel_id));
        }

        let executor = Arc::new(Executor {
            target,
            channel: channel.clone(),
            live: Arc::new(LiveCallbacks::default()),
            runtime,
        });

        let handler = executor.clone();
        let listener = channel.add_listener(Arc::new(move |payload: &Json| {
            handler.handle(payload);
        }));

        info!(channel = %channel_id, "executor attached");
        Ok(Attachment {
            channel,
            channel_id,
            listener: Some(listener),
            executor,
        })
    }

    fn handle(self: &Arc<Self>, payload: &Json) {
        let Some(message) = Message::parse(payload) else {
            // An operation we cannot read still owes its caller a reply
            if let Some(id) = Message::operation_id(payload) {
                warn!(%id, "malformed operation");
                self.reply(
                    id,
                    Err(RemoteError::new(
                        ErrorKind::UnsupportedOperation,
                        "Malformed operation",
                    )),
                );
            }
            return;
        };

        match message {
            Message::Operation { id, data } => self.operate(id, data),
            Message::Dispose { callback } => {
                if self.live.remove(&callback) {
                    debug!(%callback, "persisted callback released");
                }
            }
            // Replies flow the other way
            Message::Success { .. } | Message::Failure { .. } | Message::Callback { .. } => {}
        }
    }

    fn operate(self: &Arc<Self>, id: CorrelationId, actions: ActionChain) {
        debug!(%id, chain = %describe(&actions), "replaying operation");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.replay(&id, actions)))
            .unwrap_or_else(|payload| Err(panicked(&id, payload)));

        match outcome {
            Ok(Member::Pending(pending)) => {
                let executor = self.clone();
                self.runtime.spawn(async move {
                    let outcome = AssertUnwindSafe(settle(pending))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panicked(&id, payload)));
                    executor.reply(id, outcome);
                });
            }
            outcome => self.reply(id, outcome),
        }
    }

    fn replay(&self, id: &CorrelationId, actions: ActionChain) -> std::result::Result<Member, RemoteError> {
        let mut result = Member::Object(self.target.clone());

        for action in actions {
            result = match action {
                Action::Get { key } => result.get(&key)?,
                Action::Set { key, value } => {
                    let accepted = result.set(&key, member::decode(value))?;
                    Member::Value(Json::Bool(accepted))
                }
                Action::Apply { key, args } => {
                    let function = callee(&result, &key)?;
                    function.call(self.map_args(id, args))?
                }
                Action::Construct { key, args } => {
                    let function = callee(&result, &key)?;
                    function.construct(self.map_args(id, args))?
                }
                Action::Unsupported { kind } => return Err(RemoteError::unsupported(&kind)),
            };
        }

        Ok(result)
    }

    /// Swap callback placeholders for stubs bound to operation `id`
    fn map_args(&self, id: &CorrelationId, args: Vec<Json>) -> Vec<Member> {
        args.into_iter()
            .map(|arg| match FunctionRef::from_json(&arg) {
                Some(func) => Member::function(CallbackStub::new(
                    id.clone(),
                    func.callback,
                    func.persisted,
                    self.live.clone(),
                    self.channel.clone(),
                )),
                None => member::decode(arg),
            })
            .collect()
    }

    fn reply(&self, id: CorrelationId, outcome: std::result::Result<Member, RemoteError>) {
        let message = match outcome.and_then(|result| member::encode(&result)) {
            Ok(result) => Message::Success { id, result },
            Err(err) => {
                debug!(%id, error = %err, "operation failed");
                Message::Failure {
                    id,
                    error: codec::encode_error(&err),
                }
            }
        };

        match message.to_json() {
            Ok(payload) => {
                if let Err(err) = self.channel.post(payload) {
                    warn!(?err, "failed to post reply");
                }
            }
            Err(err) => warn!(?err, "failed to encode reply"),
        }
    }
}

fn callee(owner: &Member, key: &Key) -> std::result::Result<Arc<dyn RemoteFunction>, RemoteError> {
    match owner.get(key)? {
        Member::Function(function) => Ok(function),
        _ => Err(RemoteError::not_a_function(key)),
    }
}

/// Turn a member's panic into an ordinary fault for the caller
fn panicked(id: &CorrelationId, payload: Box<dyn Any + Send>) -> RemoteError {
    let message = match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "member panicked".to_string(),
        },
    };
    warn!(%id, %message, "member panicked during operation");
    RemoteError::error(message)
}

/// Wait until a pending member yields a settled one
async fn settle(mut pending: PendingMember) -> std::result::Result<Member, RemoteError> {
    loop {
        match pending.await? {
            Member::Pending(next) => pending = next,
            settled => return Ok(settled),
        }
    }
}

/// Live binding between an executor and its channel
///
/// Disposing (or dropping) the attachment stops the executor listening and
/// frees the channel for another executor.
pub struct Attachment {
    channel: Arc<dyn Channel>,
    channel_id: ChannelId,
    listener: Option<ListenerId>,
    executor: Arc<Executor>,
}

impl Attachment {
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Persisted callback refs the executor still honours
    pub fn live_callbacks(&self) -> usize {
        self.executor.live.len()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.channel.remove_listener(listener);
            registry::release(self.channel_id);
            info!(channel = %self.channel_id, "executor detached");
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.release();
    }
}
