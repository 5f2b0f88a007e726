//! Dynamic objects and native functions
//!
//! [`DynObject`] is a keyed table of members built with a small builder API.
//! It is the usual way to expose state and methods through an executor.

use super::member::{Args, Member, RemoteFunction, RemoteObject};
use crate::error::RemoteError;
use parking_lot::RwLock;
use serde_json::{Map, Value as Json};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tether_types::Key;

type NativeCall = Box<dyn Fn(Args) -> Result<Member, RemoteError> + Send + Sync>;

/// Function backed by Rust closures
pub struct NativeFn {
    call: Option<NativeCall>,
    construct: Option<NativeCall>,
}

impl NativeFn {
    /// Plain function: callable, not constructible
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Args) -> Result<Member, RemoteError> + Send + Sync + 'static,
    {
        Self {
            call: Some(Box::new(func)),
            construct: None,
        }
    }

    /// Constructor: constructible, refuses plain calls
    pub fn constructor<F>(func: F) -> Self
    where
        F: Fn(Args) -> Result<Member, RemoteError> + Send + Sync + 'static,
    {
        Self {
            call: None,
            construct: Some(Box::new(func)),
        }
    }
}

impl RemoteFunction for NativeFn {
    fn call(&self, args: Vec<Member>) -> Result<Member, RemoteError> {
        match &self.call {
            Some(call) => call(Args::new(args)),
            None => Err(RemoteError::type_error(
                "Class constructor cannot be invoked without 'new'",
            )),
        }
    }

    fn construct(&self, args: Vec<Member>) -> Result<Member, RemoteError> {
        match &self.construct {
            Some(construct) => construct(Args::new(args)),
            None => Err(RemoteError::type_error("function is not a constructor")),
        }
    }
}

struct Slot {
    member: Member,
    writable: bool,
}

/// Mutable keyed object
#[derive(Default)]
pub struct DynObject {
    slots: RwLock<HashMap<String, Slot>>,
}

impl DynObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a writable member
    pub fn with(self, key: impl Into<String>, member: impl Into<Member>) -> Self {
        self.put(key.into(), member.into(), true);
        self
    }

    /// Add a member that refuses writes
    pub fn with_readonly(self, key: impl Into<String>, member: impl Into<Member>) -> Self {
        self.put(key.into(), member.into(), false);
        self
    }

    pub fn with_object(self, key: impl Into<String>, object: DynObject) -> Self {
        self.with(key, Member::object(object))
    }

    pub fn with_method<F>(self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(Args) -> Result<Member, RemoteError> + Send + Sync + 'static,
    {
        self.with(key, Member::function(NativeFn::new(func)))
    }

    /// Method returning a future; callers receive the settled value
    pub fn with_async_method<F, Fut>(self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Member, RemoteError>> + Send + 'static,
    {
        self.with_method(key, move |args| Ok(Member::pending(func(args))))
    }

    pub fn with_constructor<F>(self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(Args) -> Result<Member, RemoteError> + Send + Sync + 'static,
    {
        self.with(key, Member::function(NativeFn::constructor(func)))
    }

    /// Replace or add a member at runtime
    pub fn insert(&self, key: impl Into<String>, member: impl Into<Member>) {
        self.put(key.into(), member.into(), true);
    }

    /// Current member under `key`
    pub fn read(&self, key: &str) -> Member {
        self.slots
            .read()
            .get(key)
            .map(|slot| slot.member.clone())
            .unwrap_or(Member::Absent)
    }

    fn put(&self, key: String, member: Member, writable: bool) {
        self.slots.write().insert(key, Slot { member, writable });
    }
}

impl RemoteObject for DynObject {
    fn get(&self, key: &Key) -> Member {
        self.read(&key.to_string())
    }

    fn set(&self, key: &Key, value: Member) -> bool {
        let mut slots = self.slots.write();
        match slots.entry(key.to_string()) {
            Entry::Occupied(entry) if !entry.get().writable => false,
            Entry::Occupied(mut entry) => {
                entry.get_mut().member = value;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    member: value,
                    writable: true,
                });
                true
            }
        }
    }

    fn snapshot(&self) -> Result<Json, RemoteError> {
        let members: Vec<(String, Member)> = self
            .slots
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.member.clone()))
            .collect();

        let mut map = Map::new();
        for (key, member) in members {
            map.insert(key, super::member::encode(&member)?);
        }
        Ok(Json::Object(map))
    }
}

impl RemoteObject for Arc<DynObject> {
    fn get(&self, key: &Key) -> Member {
        self.as_ref().get(key)
    }

    fn set(&self, key: &Key, value: Member) -> bool {
        self.as_ref().set(key, value)
    }

    fn snapshot(&self) -> Result<Json, RemoteError> {
        self.as_ref().snapshot()
    }
}
