//! Values as seen by the executing side
//!
//! Everything reachable from an executor's target is a [`Member`]: plain
//! data, an error value, a nested object, a callable, or a value that is
//! still being computed.

use crate::codec;
use crate::error::RemoteError;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value as Json;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tether_types::Key;

/// Result of a member that settles later
pub type PendingMember = Shared<BoxFuture<'static, Result<Member, RemoteError>>>;

/// A value reachable from an executor's target
#[derive(Clone)]
pub enum Member {
    /// Missing key; encodes as `null`
    Absent,
    Value(Json),
    Error(RemoteError),
    Object(Arc<dyn RemoteObject>),
    Function(Arc<dyn RemoteFunction>),
    Pending(PendingMember),
}

/// An object whose members can be read and written by key
pub trait RemoteObject: Send + Sync {
    fn get(&self, key: &Key) -> Member;

    /// Returns false if the write was refused
    fn set(&self, _key: &Key, _value: Member) -> bool {
        false
    }

    /// Plain-data copy of the object, used when it is an operation's result
    fn snapshot(&self) -> Result<Json, RemoteError> {
        Err(RemoteError::data_clone("object could not be cloned"))
    }
}

/// A callable member
pub trait RemoteFunction: Send + Sync {
    fn call(&self, args: Vec<Member>) -> Result<Member, RemoteError>;

    fn construct(&self, _args: Vec<Member>) -> Result<Member, RemoteError> {
        Err(RemoteError::type_error("function is not a constructor"))
    }
}

impl Member {
    pub fn object<O: RemoteObject + 'static>(object: O) -> Self {
        Member::Object(Arc::new(object))
    }

    pub fn function<F: RemoteFunction + 'static>(function: F) -> Self {
        Member::Function(Arc::new(function))
    }

    /// Wrap a future; the executor waits for it before replying
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Member, RemoteError>> + Send + 'static,
    {
        Member::Pending(future.boxed().shared())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Member::Absent)
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Member::Value(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Json::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(Json::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Json::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Json::as_bool)
    }

    /// Read a member
    ///
    /// Reading from an absent or null value faults; reading a key that is
    /// not there yields [`Member::Absent`].
    pub fn get(&self, key: &Key) -> Result<Member, RemoteError> {
        match self {
            Member::Absent => Err(RemoteError::type_error(format!(
                "Cannot read properties of undefined (reading '{}')",
                key
            ))),
            Member::Value(Json::Null) => Err(RemoteError::type_error(format!(
                "Cannot read properties of null (reading '{}')",
                key
            ))),
            Member::Value(json) => Ok(json_member(json, key)),
            Member::Error(err) => Ok(match key.as_name() {
                Some("name") => Member::Value(Json::from(err.kind.name())),
                Some("message") => Member::Value(Json::from(err.message.clone())),
                Some("stack") => err
                    .stack
                    .clone()
                    .map(|stack| Member::Value(Json::from(stack)))
                    .unwrap_or(Member::Absent),
                _ => Member::Absent,
            }),
            Member::Object(object) => Ok(object.get(key)),
            Member::Function(_) | Member::Pending(_) => Ok(Member::Absent),
        }
    }

    /// Write a member; only objects accept writes
    pub fn set(&self, key: &Key, value: Member) -> Result<bool, RemoteError> {
        match self {
            Member::Absent | Member::Value(Json::Null) => Err(RemoteError::type_error(format!(
                "Cannot set properties of undefined (setting '{}')",
                key
            ))),
            Member::Object(object) => Ok(object.set(key, value)),
            _ => Ok(false),
        }
    }

    /// Call this member as a function
    pub fn call(&self, args: Vec<Member>) -> Result<Member, RemoteError> {
        match self {
            Member::Function(function) => function.call(args),
            _ => Err(RemoteError::type_error("value is not a function")),
        }
    }
}

fn json_member(json: &Json, key: &Key) -> Member {
    let found = match json {
        Json::Object(map) => map.get(&key.to_string()),
        Json::Array(items) => {
            if key.as_name() == Some("length") {
                return Member::Value(Json::from(items.len()));
            }
            key.as_index().and_then(|i| items.get(i as usize))
        }
        Json::String(s) if key.as_name() == Some("length") => {
            return Member::Value(Json::from(s.chars().count()));
        }
        _ => None,
    };
    found.cloned().map(Member::Value).unwrap_or(Member::Absent)
}

/// Encode a settled member for the wire
///
/// Functions and unsettled values are not plain data and fail to clone.
pub fn encode(member: &Member) -> Result<Json, RemoteError> {
    match member {
        Member::Absent => Ok(Json::Null),
        Member::Value(json) => Ok(json.clone()),
        Member::Error(err) => Ok(codec::encode_error(err)),
        Member::Object(object) => object.snapshot(),
        Member::Function(_) => Err(RemoteError::data_clone("function could not be cloned")),
        Member::Pending(_) => Err(RemoteError::data_clone("pending value could not be cloned")),
    }
}

/// Decode a wire value into a member, restoring tagged errors
pub fn decode(json: Json) -> Member {
    match codec::decode_error(&json) {
        Some(err) => Member::Error(err),
        None => Member::Value(json),
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Absent => write!(f, "Absent"),
            Member::Value(json) => f.debug_tuple("Value").field(json).finish(),
            Member::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Member::Object(_) => write!(f, "Object(..)"),
            Member::Function(_) => write!(f, "Function(..)"),
            Member::Pending(_) => write!(f, "Pending(..)"),
        }
    }
}

impl Default for Member {
    fn default() -> Self {
        Member::Absent
    }
}

impl From<Json> for Member {
    fn from(json: Json) -> Self {
        Member::Value(json)
    }
}

impl From<RemoteError> for Member {
    fn from(err: RemoteError) -> Self {
        Member::Error(err)
    }
}

macro_rules! member_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Member {
                fn from(v: $ty) -> Self {
                    Member::Value(Json::from(v))
                }
            }
        )*
    };
}

member_from_primitive!(bool, i32, i64, u32, u64, f64, &str, String);

/// Positional arguments handed to a native function
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Member>);

impl Args {
    pub fn new(args: Vec<Member>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Argument at `index`, absent if not supplied
    pub fn get(&self, index: usize) -> Member {
        self.0.get(index).cloned().unwrap_or(Member::Absent)
    }

    pub fn i64(&self, index: usize) -> Result<i64, RemoteError> {
        self.get(index).as_i64().ok_or_else(|| {
            RemoteError::type_error(format!("argument {} must be an integer", index))
        })
    }

    pub fn f64(&self, index: usize) -> Result<f64, RemoteError> {
        self.get(index).as_f64().ok_or_else(|| {
            RemoteError::type_error(format!("argument {} must be a number", index))
        })
    }

    pub fn string(&self, index: usize) -> Result<String, RemoteError> {
        self.get(index)
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::type_error(format!("argument {} must be a string", index)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Member> {
        self.0
    }
}

impl From<Vec<Member>> for Args {
    fn from(args: Vec<Member>) -> Self {
        Self(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_get_on_plain_data() {
        let member = Member::from(json!({"a": {"b": [10, 20]}}));
        let b = member
            .get(&Key::name("a"))
            .unwrap()
            .get(&Key::name("b"))
            .unwrap();
        assert_eq!(b.get(&Key::Index(1)).unwrap().as_i64(), Some(20));
        assert_eq!(b.get(&Key::name("length")).unwrap().as_i64(), Some(2));
        assert!(member.get(&Key::name("missing")).unwrap().is_absent());
    }

    #[test]
    fn test_get_through_absent_faults() {
        let err = Member::Absent.get(&Key::name("x")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert!(err.message.contains("reading 'x'"));
        assert!(Member::Value(Json::Null).get(&Key::name("x")).is_err());
    }

    #[test]
    fn test_set_on_plain_data_is_refused() {
        assert_eq!(Member::from(3).set(&Key::name("x"), Member::from(1)), Ok(false));
        assert!(Member::Absent.set(&Key::name("x"), Member::from(1)).is_err());
    }

    #[test]
    fn test_error_members_expose_fields() {
        let member = Member::from(RemoteError::range_error("too big"));
        assert_eq!(
            member.get(&Key::name("name")).unwrap().as_str(),
            Some("RangeError")
        );
        assert_eq!(
            member.get(&Key::name("message")).unwrap().as_str(),
            Some("too big")
        );
    }

    #[test]
    fn test_encode_rejects_functions() {
        struct Noop;
        impl RemoteFunction for Noop {
            fn call(&self, _args: Vec<Member>) -> Result<Member, RemoteError> {
                Ok(Member::Absent)
            }
        }

        let err = encode(&Member::function(Noop)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataCloneError);
        assert_eq!(encode(&Member::Absent), Ok(Json::Null));
    }

    #[test]
    fn test_args_accessors() {
        let args = Args::new(vec![Member::from(3), Member::from("x")]);
        assert_eq!(args.i64(0), Ok(3));
        assert_eq!(args.string(1), Ok("x".to_string()));
        assert!(args.i64(1).is_err());
        assert!(args.get(5).is_absent());
    }
}
