//! Tether - call an object that lives on the other end of a message channel
//!
//! One side exposes a target object through an [`Executor`]. The other side
//! gets a [`Chain`] rooted at a [`Dispatcher`] and uses it as a stand-in for
//! that target: property reads are recorded, and terminal operations are
//! shipped across the channel and replayed remotely.
//!
//! ```text
//!   client                          channel                        remote
//!  ┌──────────────┐                                          ┌──────────────┐
//!  │ Chain        │  tether:operation {id, data: [actions]}  │ Executor     │
//!  │  .get("user")│ ───────────────────────────────────────▶ │  replay on   │
//!  │  .call(..)   │                                          │  target      │
//!  │              │ ◀─────────────────────────────────────── │              │
//!  │ Dispatcher   │  tether:success / tether:failure         │ CallbackStub │
//!  │  callbacks   │ ◀─────────────────────────────────────── │  (per arg)   │
//!  └──────────────┘  tether:callback {id, func}              └──────────────┘
//!                    tether:dispose {ref}  ───────────────▶
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::{DynObject, LocalChannel, Member};
//!
//! # async fn demo() -> tether::Result<()> {
//! let (client, remote) = LocalChannel::pair()?;
//! let target = DynObject::new()
//!     .with("name", "tether")
//!     .with_method("add", |args| Ok(Member::from(args.i64(0)? + args.i64(1)?)));
//! let _attachment = tether::proxy(Arc::new(target), Arc::new(remote))?;
//!
//! let root = tether::create(Arc::new(client));
//! assert_eq!(root.call("add", [3, 4]).await?.as_i64(), Some(7));
//! assert_eq!(root.get("name").await?.as_str(), Some("tether"));
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod chain;
pub mod channel;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod ids;

pub use callback::{Arg, Callback, Persisted, NO_ARGS};
pub use chain::{Chain, Resolution};
pub use channel::{Channel, ChannelId, ListenerId, LocalChannel};
pub use codec::Value;
pub use dispatcher::{Dispatcher, Op, Reply, SetReply};
pub use error::{ErrorKind, RemoteError, Result, TetherError};
pub use executor::{Args, Attachment, DynObject, Executor, Member, NativeFn, RemoteFunction, RemoteObject};
pub use ids::{CorrelationIds, RandomIds, SequentialIds};
pub use tether_types::{Key, MESSAGE_DISPOSED};

use std::sync::Arc;

/// Root stand-in for the target served on the other end of `channel`
pub fn create(channel: Arc<dyn Channel>) -> Chain {
    Dispatcher::new(channel).root()
}

/// Serve `target` to whoever dispatches on the other end of `channel`
pub fn proxy(target: Arc<dyn RemoteObject>, channel: Arc<dyn Channel>) -> Result<Attachment> {
    Executor::attach(target, channel)
}

/// Wrap `func` so that it can be invoked remotely until disposed
pub fn persist<F>(func: F) -> Persisted
where
    F: Fn(Vec<Value>) + Send + Sync + 'static,
{
    Persisted::new(func)
}
