//! Demo session and wire dump

use crate::config::DemoConfig;
use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::sync::Arc;
use tether::channel::ListenerSet;
use tether::{
    Arg, Channel, ChannelId, Dispatcher, DynObject, LocalChannel, Member,
    RemoteError, SequentialIds, Value, NO_ARGS,
};
use tracing::{debug, info};

/// Object served by the demo executor
pub fn build_target(config: &DemoConfig) -> DynObject {
    DynObject::new()
        .with_readonly("name", config.name.as_str())
        .with("quote", "")
        .with_method("add", |args| Ok(Member::from(args.i64(0)? + args.i64(1)?)))
        .with_async_method("timeout", |args| {
            let ms = args.i64(0);
            async move {
                let ms = u64::try_from(ms?)
                    .map_err(|_| RemoteError::range_error("timeout must not be negative"))?;
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(Member::from("Hello there"))
            }
        })
        .with_method("error", |_| Err(RemoteError::type_error("This is not right")))
        .with_method("countdown", |args| {
            let n = args.i64(0)?;
            let tick = args.get(1);
            for i in (1..=n).rev() {
                tick.call(vec![Member::from(i)])?;
            }
            Ok(Member::from(n))
        })
}

/// Run every demo call against a local executor, one output line per step
pub async fn run_demo(config: &DemoConfig) -> Result<Vec<String>> {
    let (client, remote) = LocalChannel::pair()?;
    let attachment = tether::proxy(Arc::new(build_target(config)), Arc::new(remote))?;
    let root = tether::create(Arc::new(client));
    info!(channel = %attachment.channel_id(), "demo executor ready");

    let mut lines = Vec::new();

    let name = root.get("name").await?;
    lines.push(format!("name: {}", display(&name)));

    let sum = root.call("add", [3, 4]).await?;
    lines.push(format!("add(3, 4) = {}", display(&sum)));

    let accepted = root.set("quote", config.quote.as_str()).await?;
    lines.push(format!("set quote: {}", accepted));
    let quote = root.get("quote").await?;
    lines.push(format!("quote: {}", display(&quote)));

    let greeting = root.call("timeout", [config.delay_ms]).await?;
    lines.push(format!("timeout({}): {}", config.delay_ms, display(&greeting)));

    match root.call("error", NO_ARGS).await {
        Ok(value) => lines.push(format!("error(): resolved to {}", display(&value))),
        Err(err) => {
            let shown = err
                .remote()
                .map(ToString::to_string)
                .unwrap_or_else(|| err.to_string());
            lines.push(format!("error(): {}", shown));
        }
    }

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = ticks.clone();
    let listener = tether::persist(move |args| {
        sink.lock().extend(args.iter().map(display));
    });
    root.call(
        "countdown",
        [Arg::from(u64::from(config.countdown)), Arg::from(&listener)],
    )
    .await?;
    listener.dispose();
    lines.push(format!("countdown: {}", ticks.lock().join(" ")));

    attachment.dispose();
    Ok(lines)
}

fn display(value: &Value) -> String {
    match value {
        Value::Data(Json::String(s)) => s.clone(),
        Value::Data(json) => json.to_string(),
        Value::Error(err) => err.to_string(),
    }
}

/// Channel endpoint that keeps everything posted to it
struct RecordingChannel {
    id: ChannelId,
    posted: Mutex<Vec<Json>>,
    listeners: Arc<ListenerSet>,
}

impl RecordingChannel {
    fn new() -> Self {
        Self {
            id: ChannelId::new(),
            posted: Mutex::new(Vec::new()),
            listeners: Arc::new(ListenerSet::new()),
        }
    }
}

impl Channel for RecordingChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn post(&self, message: Json) -> tether::Result<()> {
        debug!(kind = ?message.get("type"), "recorded message");
        self.posted.lock().push(message);
        Ok(())
    }

    fn listeners(&self) -> &Arc<ListenerSet> {
        &self.listeners
    }
}

/// Messages a client posts for a few representative operations
pub fn sample_messages() -> Vec<Json> {
    let channel = Arc::new(RecordingChannel::new());
    let dispatcher = Dispatcher::with_ids(channel.clone(), Arc::new(SequentialIds::new("id-")));
    let root = dispatcher.root();

    // Nothing answers on this channel; the replies are dropped unresolved
    drop(root.get("user").get("name").resolve());
    drop(root.set("quote", "hello"));
    drop(root.get("user").call("greet", [Arg::from("hi"), Arg::callback(|_| {})]));

    let listener = tether::persist(|_| {});
    drop(root.call("subscribe", [Arg::from(&listener)]));
    listener.dispose();

    let posted = channel.posted.lock().clone();
    posted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_transcript() {
        let config = DemoConfig {
            delay_ms: 1,
            ..DemoConfig::default()
        };
        let lines = run_demo(&config).await.unwrap();
        assert_eq!(
            lines,
            vec![
                "name: tether".to_string(),
                "add(3, 4) = 7".to_string(),
                "set quote: true".to_string(),
                "quote: Hello from the other side".to_string(),
                "timeout(1): Hello there".to_string(),
                "error(): TypeError: This is not right".to_string(),
                "countdown: 3 2 1".to_string(),
            ]
        );
    }

    #[test]
    fn test_sample_messages() {
        let messages = sample_messages();
        let kinds: Vec<&str> = messages
            .iter()
            .filter_map(|m| m["type"].as_str())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "tether:operation",
                "tether:operation",
                "tether:operation",
                "tether:operation",
                "tether:dispose",
            ]
        );
        assert_eq!(messages[0]["id"], "id-1");
        assert_eq!(
            messages[2]["data"][1]["args"][1],
            serde_json::json!({"type": "tether:function", "ref": "id-4"})
        );
    }
}
