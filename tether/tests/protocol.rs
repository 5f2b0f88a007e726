//! End-to-end tests over an in-process channel pair

use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::{
    Arg, Attachment, Chain, Channel, Dispatcher, DynObject, ErrorKind, Executor, LocalChannel,
    Member, RemoteError, RemoteObject, SequentialIds, TetherError, Value, NO_ARGS,
};
use tether_types::Key;
use tokio::sync::mpsc;

struct Session {
    root: Chain,
    client: Arc<LocalChannel>,
    remote: Arc<LocalChannel>,
    attachment: Attachment,
}

fn connect<T: RemoteObject + 'static>(target: T) -> Session {
    let (client, remote) = LocalChannel::pair().unwrap();
    let client = Arc::new(client);
    let remote = Arc::new(remote);
    let attachment = Executor::attach(Arc::new(target), remote.clone()).unwrap();
    let root = Dispatcher::new(client.clone()).root();
    Session {
        root,
        client,
        remote,
        attachment,
    }
}

fn remote_err(result: tether::Result<Value>) -> RemoteError {
    match result {
        Err(TetherError::Remote(err)) => err,
        other => panic!("expected a remote error, got {:?}", other),
    }
}

/// Count operation messages arriving at the remote endpoint
fn count_operations(remote: &LocalChannel) -> Arc<AtomicUsize> {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    remote.add_listener(Arc::new(move |payload: &Json| {
        if payload["type"] == "tether:operation" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));
    seen
}

#[tokio::test]
async fn test_nested_read() {
    let session = connect(
        DynObject::new().with_object("user", DynObject::new().with("name", "Ada")),
    );

    let name = session.root.get("user").get("name").await.unwrap();
    assert_eq!(name.as_str(), Some("Ada"));

    // Missing keys come back as null, reads through them fault
    let missing = session.root.get("nobody").await.unwrap();
    assert!(missing.is_null());
    let err = remote_err(session.root.get("nobody").get("name").await);
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[tokio::test]
async fn test_then_is_an_ordinary_key() {
    let session = connect(DynObject::new().with("then", "not a promise"));
    let value = session.root.get("then").await.unwrap();
    assert_eq!(value.as_str(), Some("not a promise"));
}

#[tokio::test]
async fn test_root_resolves_to_snapshot() {
    let session = connect(DynObject::new().with("a", 1).with("b", json!([1, 2])));
    let snapshot = (&session.root).await.unwrap();
    assert_eq!(snapshot, Value::Data(json!({"a": 1, "b": [1, 2]})));

    let session = connect(DynObject::new().with_method("f", |_| Ok(Member::Absent)));
    let err = remote_err((&session.root).await);
    assert_eq!(err.kind, ErrorKind::DataCloneError);
}

struct Turnstile {
    turns: AtomicI64,
}

impl RemoteObject for Turnstile {
    fn get(&self, key: &Key) -> Member {
        match key.as_name() {
            Some("ticket") => Member::from(self.turns.fetch_add(1, Ordering::SeqCst)),
            _ => Member::Absent,
        }
    }
}

#[tokio::test]
async fn test_resolution_is_memoized_per_node() {
    let session = connect(Turnstile {
        turns: AtomicI64::new(0),
    });
    let operations = count_operations(&session.remote);

    let ticket = session.root.get("ticket");
    assert_eq!((&ticket).await.unwrap().as_i64(), Some(0));
    assert_eq!((&ticket).await.unwrap().as_i64(), Some(0));
    assert_eq!(operations.load(Ordering::SeqCst), 1);

    // Same keys, different node
    assert_eq!(session.root.get("ticket").await.unwrap().as_i64(), Some(1));
    assert_eq!(operations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_calls_dispatch_every_time() {
    let counter = Arc::new(AtomicI64::new(0));
    let next = counter.clone();
    let session = connect(
        DynObject::new()
            .with_method("next", move |_| Ok(Member::from(next.fetch_add(1, Ordering::SeqCst))))
            .with_method("add", |args| Ok(Member::from(args.i64(0)? + args.i64(1)?))),
    );

    assert_eq!(session.root.call("next", NO_ARGS).await.unwrap().as_i64(), Some(0));
    assert_eq!(session.root.call("next", NO_ARGS).await.unwrap().as_i64(), Some(1));
    assert_eq!(session.root.call("add", [3, 4]).await.unwrap().as_i64(), Some(7));
    assert_eq!(
        session.root.get("add").apply([10, 5]).await.unwrap().as_i64(),
        Some(15)
    );
}

#[tokio::test]
async fn test_thrown_errors_reject() {
    let session = connect(
        DynObject::new()
            .with("name", "tether")
            .with_method("fail", |_| Err(RemoteError::range_error("bad"))),
    );

    let err = remote_err(session.root.call("fail", NO_ARGS).await);
    assert_eq!(err.kind, ErrorKind::RangeError);
    assert_eq!(err.message, "bad");

    let err = remote_err(session.root.call("missing", NO_ARGS).await);
    assert_eq!(err.kind, ErrorKind::NotAFunction);
    assert_eq!(err.message, "missing is not a function");

    let err = remote_err(session.root.call("name", NO_ARGS).await);
    assert_eq!(err.message, "name is not a function");
}

#[tokio::test]
async fn test_returned_errors_resolve_with_stack() {
    let session = connect(DynObject::new().with_method("make", |_| {
        Ok(Member::Error(
            RemoteError::type_error("This is not right").with_stack("TypeError: at make"),
        ))
    }));

    let value = session.root.call("make", NO_ARGS).await.unwrap();
    let err = value.as_error().unwrap();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "This is not right");
    assert_eq!(err.stack.as_deref(), Some("TypeError: at make"));
}

#[tokio::test]
async fn test_one_shot_callback_fires_once() {
    let second_call: Arc<Mutex<Option<Result<Member, RemoteError>>>> = Arc::new(Mutex::new(None));
    let slot = second_call.clone();
    let session = connect(DynObject::new().with_method("twice", move |args| {
        let callback = args.get(0);
        callback.call(vec![Member::from("first")])?;
        *slot.lock() = Some(callback.call(vec![Member::from("second")]));
        Ok(Member::from(true))
    }));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reply = session
        .root
        .call(
            "twice",
            [Arg::callback(move |args| {
                let _ = tx.send(args);
            })],
        )
        .await
        .unwrap();
    assert_eq!(reply.as_bool(), Some(true));

    assert_eq!(rx.recv().await, Some(vec![Value::from("first")]));
    assert!(rx.try_recv().is_err());

    let second = second_call.lock().take().unwrap();
    assert_eq!(second.unwrap_err().kind, ErrorKind::DisposedCallback);

    // Request is settled and its callback consumed
    assert_eq!(session.client.listener_count(), 0);
}

#[tokio::test]
async fn test_persisted_callback_until_dispose() {
    let stored: Arc<Mutex<Member>> = Arc::new(Mutex::new(Member::Absent));
    let store = stored.clone();
    let emitter = stored.clone();
    let session = connect(
        DynObject::new()
            .with_method("subscribe", move |args| {
                *store.lock() = args.get(0);
                Ok(Member::from("ok"))
            })
            .with_method("emit", move |args| {
                let listener = emitter.lock().clone();
                listener.call(vec![args.get(0)])?;
                Ok(Member::from(true))
            }),
    );

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let listener = tether::persist(move |args| {
        sink.lock().extend(args);
    });

    session
        .root
        .call("subscribe", [Arg::from(&listener)])
        .await
        .unwrap();
    assert_eq!(session.attachment.live_callbacks(), 1);
    assert_eq!(session.client.listener_count(), 1);

    session.root.call("emit", [1]).await.unwrap();
    session.root.call("emit", [2]).await.unwrap();
    assert_eq!(*received.lock(), vec![Value::from(1), Value::from(2)]);

    listener.dispose();
    assert_eq!(session.client.listener_count(), 0);
    let err = listener.apply(vec![]).unwrap_err();
    assert_eq!(err, TetherError::Disposed);
    assert_eq!(err.kind(), Some(ErrorKind::DisposedCallback));

    // The dispose message is ahead of this operation on the channel
    let err = remote_err(session.root.call("emit", [3]).await);
    assert_eq!(err.kind, ErrorKind::DisposedCallback);
    assert_eq!(session.attachment.live_callbacks(), 0);
    assert_eq!(received.lock().len(), 2);

    // A disposed wrapper cannot be sent again
    let err = session
        .root
        .call("subscribe", [Arg::from(&listener)])
        .await
        .unwrap_err();
    assert_eq!(err, TetherError::Disposed);
}

#[tokio::test]
async fn test_set_then_read() {
    let target = Arc::new(
        DynObject::new()
            .with_readonly("id", 7)
            .with("count", 3)
            .with_object("user", DynObject::new()),
    );
    let session = connect(target.clone());

    assert!(session.root.set("foo", 42).await.unwrap());
    assert_eq!(session.root.get("foo").await.unwrap().as_i64(), Some(42));
    assert_eq!(target.read("foo").as_i64(), Some(42));

    assert!(!session.root.set("id", 8).await.unwrap());
    assert_eq!(session.root.get("id").await.unwrap().as_i64(), Some(7));

    // Plain data refuses writes without rejecting
    assert!(!session.root.get("count").set("x", 1).await.unwrap());

    assert!(session.root.get("user").set("name", "Grace").await.unwrap());
    assert_eq!(
        session.root.get("user").get("name").await.unwrap().as_str(),
        Some("Grace")
    );
}

#[tokio::test]
async fn test_errors_set_through_the_wire_stay_errors() {
    let target = Arc::new(DynObject::new());
    let session = connect(target.clone());

    assert!(session
        .root
        .set("last", RemoteError::range_error("too far"))
        .await
        .unwrap());
    let Member::Error(err) = target.read("last") else {
        panic!("expected an error member");
    };
    assert_eq!(err.kind, ErrorKind::RangeError);
}

#[tokio::test]
async fn test_attach_is_exclusive() {
    let (_client, remote) = LocalChannel::pair().unwrap();
    let remote: Arc<dyn Channel> = Arc::new(remote);

    let first = Executor::attach(Arc::new(DynObject::new()), remote.clone()).unwrap();
    let err = Executor::attach(Arc::new(DynObject::new()), remote.clone())
        .err()
        .unwrap();
    assert!(matches!(err, TetherError::AlreadyAttached(id) if id == remote.id()));

    first.dispose();
    assert!(Executor::attach(Arc::new(DynObject::new()), remote).is_ok());
}

#[tokio::test]
async fn test_unsupported_action_is_rejected() {
    let session = connect(DynObject::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.client.add_listener(Arc::new(move |payload: &Json| {
        let _ = tx.send(payload.clone());
    }));

    session
        .client
        .post(json!({
            "type": "tether:operation",
            "id": "raw-1",
            "data": [{"type": "delete", "key": "x"}],
        }))
        .unwrap();

    let reply = rx.recv().await.unwrap();
    assert_eq!(reply["type"], "tether:failure");
    assert_eq!(reply["id"], "raw-1");
    assert_eq!(reply["error"]["name"], "UnsupportedOperationError");
    assert_eq!(reply["error"]["message"], "Unsupported operation \"delete\"");
}

#[tokio::test]
async fn test_malformed_operations_are_rejected() {
    let session = connect(DynObject::new().with("name", "tether"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.client.add_listener(Arc::new(move |payload: &Json| {
        let _ = tx.send(payload.clone());
    }));

    let malformed = [
        ("neg", json!([{"type": "get", "key": -1}])),
        ("float", json!([{"type": "get", "key": 1.5}])),
        ("bool", json!([{"type": "get", "key": true}])),
        ("nonobj", json!([5])),
    ];
    for (id, data) in &malformed {
        session
            .client
            .post(json!({"type": "tether:operation", "id": id, "data": data}))
            .unwrap();
    }
    session
        .client
        .post(json!({"type": "tether:operation", "id": "ok", "data": [{"type": "get", "key": "name"}]}))
        .unwrap();

    for (id, _) in &malformed {
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply["type"], "tether:failure");
        assert_eq!(reply["id"], *id);
        assert_eq!(reply["error"]["name"], "UnsupportedOperationError");
    }
    let reply = rx.recv().await.unwrap();
    assert_eq!(reply["type"], "tether:success");
    assert_eq!(reply["id"], "ok");
    assert_eq!(reply["result"], "tether");
}

#[tokio::test]
async fn test_panicking_members_fail_without_breaking_the_channel() {
    let session = connect(
        DynObject::new()
            .with("name", "tether")
            .with_method("boom", |_| {
                let empty: Vec<i64> = Vec::new();
                Ok(Member::from(empty[0]))
            })
            .with_async_method("later", |_| async {
                let empty: Vec<i64> = Vec::new();
                Ok(Member::from(empty[0]))
            }),
    );

    let err = remote_err(session.root.call("boom", NO_ARGS).await);
    assert_eq!(err.kind, ErrorKind::Error);
    assert!(err.message.contains("index out of bounds"));

    let err = remote_err(session.root.call("later", NO_ARGS).await);
    assert_eq!(err.kind, ErrorKind::Error);

    assert_eq!(
        session.root.get("name").await.unwrap().as_str(),
        Some("tether")
    );
    assert_eq!(session.client.listener_count(), 0);
}

#[tokio::test]
async fn test_pending_results_are_awaited() {
    let session = connect(
        DynObject::new()
            .with_async_method("timeout", |args| {
                let ms = args.i64(0);
                async move {
                    tokio::time::sleep(Duration::from_millis(ms? as u64)).await;
                    Ok(Member::from("Hello there"))
                }
            })
            .with_async_method("reject", |_| async {
                Err(RemoteError::type_error("later"))
            })
            .with("later", Member::pending(async { Ok(Member::from(5)) })),
    );

    let value = session.root.call("timeout", [5]).await.unwrap();
    assert_eq!(value.as_str(), Some("Hello there"));

    let err = remote_err(session.root.call("reject", NO_ARGS).await);
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "later");

    assert_eq!(session.root.get("later").await.unwrap().as_i64(), Some(5));
}

#[tokio::test]
async fn test_construct() {
    let session = connect(DynObject::new().with_object(
        "shapes",
        DynObject::new().with_constructor("Point", |args| {
            Ok(Member::object(
                DynObject::new().with("x", args.get(0)).with("y", args.get(1)),
            ))
        }),
    ));

    let shapes = session.root.get("shapes");
    let point = shapes.construct("Point", [1, 2]).await.unwrap();
    assert_eq!(point, Value::Data(json!({"x": 1, "y": 2})));

    let point = shapes.get("Point").new_instance([3, 4]).await.unwrap();
    assert_eq!(point, Value::Data(json!({"x": 3, "y": 4})));

    let err = remote_err(shapes.call("Point", [0, 0]).await);
    assert_eq!(err.kind, ErrorKind::TypeError);

    let err = session.root.new_instance(NO_ARGS).await.unwrap_err();
    assert!(matches!(err, TetherError::InvalidChain(_)));
}

#[tokio::test]
async fn test_foreign_traffic_is_ignored() {
    let session = connect(DynObject::new().with("name", "tether"));

    session.client.post(json!({"type": "ping"})).unwrap();
    session.client.post(json!("raw string")).unwrap();
    session
        .remote
        .post(json!({"type": "tether:success", "id": "nobody", "result": 1}))
        .unwrap();
    session.remote.post(json!({"hello": "world"})).unwrap();

    assert_eq!(
        session.root.get("name").await.unwrap().as_str(),
        Some("tether")
    );
}

#[tokio::test]
async fn test_listener_released_after_reply() {
    let session = connect(DynObject::new().with("name", "tether"));
    assert_eq!(session.client.listener_count(), 0);

    session.root.get("name").await.unwrap();
    assert_eq!(session.client.listener_count(), 0);

    // An ignored callback argument keeps the request open
    session
        .root
        .call("name", [Arg::callback(|_| {})])
        .await
        .unwrap_err();
    assert_eq!(session.client.listener_count(), 1);
}

#[tokio::test]
async fn test_reply_releases_listener_after_handles_drop() {
    let (client, remote) = LocalChannel::pair().unwrap();
    let inbound = client.listeners().clone();
    let client: Arc<dyn Channel> = Arc::new(client);
    let _attachment = Executor::attach(
        Arc::new(DynObject::new().with_async_method("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Member::from("done"))
        })),
        Arc::new(remote),
    )
    .unwrap();

    // The chain and the only client handle are gone before the reply lands
    let reply = {
        let root = tether::create(client);
        root.call("slow", NO_ARGS)
    };
    assert_eq!(inbound.len(), 1);

    assert_eq!(reply.await.unwrap().as_str(), Some("done"));
    assert!(inbound.is_empty());
}

#[tokio::test]
async fn test_callback_for_unknown_ref_is_ignored() {
    let (client, remote) = LocalChannel::pair().unwrap();
    let client = Arc::new(client);
    let remote = Arc::new(remote);
    let _attachment = Executor::attach(
        Arc::new(DynObject::new().with_async_method("slow", |args| {
            let callback = args.get(0);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                callback.call(vec![Member::from("real")])?;
                Ok(Member::from(true))
            }
        })),
        remote.clone(),
    )
    .unwrap();

    let root = Dispatcher::with_ids(client.clone(), Arc::new(SequentialIds::new("op-"))).root();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reply = root.call(
        "slow",
        [Arg::callback(move |args| {
            let _ = tx.send(args);
        })],
    );

    // op-1 is the call above, op-2 its callback ref
    remote
        .post(json!({
            "type": "tether:callback",
            "id": "op-1",
            "func": {"ref": "ghost", "args": ["fake"]},
        }))
        .unwrap();

    assert_eq!(reply.await.unwrap().as_bool(), Some(true));
    assert_eq!(rx.recv().await, Some(vec![Value::from("real")]));
    assert!(rx.try_recv().is_err());
    assert_eq!(client.listener_count(), 0);
}
