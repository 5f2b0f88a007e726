//! Recorded access paths into a remote target
//!
//! A [`Chain`] records property reads without touching the channel. Terminal
//! operations (`set`, `call`, `construct`, `apply`, `new_instance`) dispatch
//! immediately. Awaiting the chain itself requests the value at its path;
//! that request is sent once per chain and shared by every await.

use crate::callback::Arg;
use crate::codec::Value;
use crate::dispatcher::{Dispatcher, Op, Reply, SetReply};
use crate::error::{Result, TetherError};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::future::IntoFuture;
use tether_types::Key;

/// Memoized outcome of awaiting a chain
pub type Resolution = Shared<BoxFuture<'static, Result<Value>>>;

/// Stand-in for a value reachable from the remote target
///
/// Every `get` yields a fresh chain with its own memo. Chains are
/// deliberately not `Clone`: a copy would be a different node.
pub struct Chain {
    dispatcher: Dispatcher,
    path: Vec<Key>,
    memo: Mutex<Option<Resolution>>,
}

impl Chain {
    pub(crate) fn root(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            path: Vec::new(),
            memo: Mutex::new(None),
        }
    }

    /// Record a property read
    pub fn get(&self, key: impl Into<Key>) -> Chain {
        let mut path = self.path.clone();
        path.push(key.into());
        Chain {
            dispatcher: self.dispatcher.clone(),
            path,
            memo: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &[Key] {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Assign `key` on the value at this path
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> SetReply {
        SetReply::new(self.dispatch(Op::Set(key.into(), value.into())))
    }

    /// Call the method `key` on the value at this path
    pub fn call<I>(&self, key: impl Into<Key>, args: I) -> Reply
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.dispatch(Op::Apply(key.into(), collect_args(args)))
    }

    /// Construct through the constructor `key` on the value at this path
    pub fn construct<I>(&self, key: impl Into<Key>, args: I) -> Reply
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.dispatch(Op::Construct(key.into(), collect_args(args)))
    }

    /// Call the value at this path, using its last key as the method name
    pub fn apply<I>(&self, args: I) -> Reply
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        match self.split_last() {
            Ok((parent, key)) => {
                self.dispatch_from(parent, Op::Apply(key.clone(), collect_args(args)))
            }
            Err(err) => Reply::failed(err),
        }
    }

    /// Construct from the value at this path, using its last key as the
    /// constructor name
    pub fn new_instance<I>(&self, args: I) -> Reply
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        match self.split_last() {
            Ok((parent, key)) => {
                self.dispatch_from(parent, Op::Construct(key.clone(), collect_args(args)))
            }
            Err(err) => Reply::failed(err),
        }
    }

    /// Request the value at this path
    ///
    /// The first call dispatches; later calls return the same shared future.
    pub fn resolve(&self) -> Resolution {
        let mut memo = self.memo.lock();
        memo.get_or_insert_with(|| {
            let ops = self.path.iter().cloned().map(Op::Get).collect();
            self.dispatcher.send(ops).boxed().shared()
        })
        .clone()
    }

    fn dispatch(&self, terminal: Op) -> Reply {
        self.dispatch_from(&self.path, terminal)
    }

    fn dispatch_from(&self, path: &[Key], terminal: Op) -> Reply {
        let mut ops: Vec<Op> = path.iter().cloned().map(Op::Get).collect();
        ops.push(terminal);
        self.dispatcher.send(ops)
    }

    fn split_last(&self) -> Result<(&[Key], &Key)> {
        match self.path.split_last() {
            Some((key, parent)) => Ok((parent, key)),
            None => Err(TetherError::InvalidChain(
                "the root stand-in cannot be called".to_string(),
            )),
        }
    }
}

fn collect_args<I>(args: I) -> Vec<Arg>
where
    I: IntoIterator,
    I::Item: Into<Arg>,
{
    args.into_iter().map(Into::into).collect()
}

impl<'a> IntoFuture for &'a Chain {
    type Output = Result<Value>;
    type IntoFuture = Resolution;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve()
    }
}

impl IntoFuture for Chain {
    type Output = Result<Value>;
    type IntoFuture = Resolution;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("path", &self.path)
            .field("resolved", &self.memo.lock().is_some())
            .finish()
    }
}
