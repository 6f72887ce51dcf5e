use std::sync::atomic::{AtomicUsize, Ordering};

use kf_protocol::DisconnectReason;
use serde_json::json;

use super::*;
use crate::transport::{MemoryServer, MemoryTransport};

fn memory_channel() -> (Arc<ChannelHandle>, MemoryServer) {
	let (parts, server) = MemoryTransport::pair();
	(Arc::new(ChannelHandle::new("shoots", parts)), server)
}

fn spawn_pump(channel: &Arc<ChannelHandle>) -> tokio::task::JoinHandle<Result<()>> {
	let channel = Arc::clone(channel);
	tokio::spawn(async move { channel.run().await })
}

/// Lets the pump drain everything queued so far.
async fn settle() {
	for _ in 0..8 {
		tokio::task::yield_now().await;
	}
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value) + Send + Sync + 'static) {
	let hits = Arc::new(AtomicUsize::new(0));
	let clone = Arc::clone(&hits);
	(hits, move |_: &Value| {
		clone.fetch_add(1, Ordering::SeqCst);
	})
}

#[tokio::test]
async fn connect_is_idempotent() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);

	channel.connect().unwrap();
	channel.connect().unwrap();
	assert_eq!(channel.state(), ConnectionState::Connecting);
	settle().await;

	assert!(channel.is_connected());
	channel.connect().unwrap();
	assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn emit_before_connect_is_dropped() {
	let (channel, mut server) = memory_channel();
	let _pump = spawn_pump(&channel);

	assert!(!channel.emit("subscribeIssues", Value::Null));
	channel.connect().unwrap();
	assert!(!channel.emit("subscribeIssues", Value::Null));
	settle().await;

	assert!(channel.emit("subscribeIssues", Value::Null));
	let sent: Vec<String> = server.drain().into_iter().map(|f| f.event).collect();
	assert_eq!(sent, ["subscribeIssues"]);
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let seen = Arc::new(Mutex::new(Vec::new()));

	let mut subs = Vec::new();
	for tag in [1, 2, 3] {
		let seen = Arc::clone(&seen);
		subs.push(channel.on("events", move |data: &Value| {
			seen.lock().push((tag, data.clone()));
		}));
	}

	server.push("events", json!({"kind": "shoots"}));
	settle().await;

	let seen = seen.lock();
	let tags: Vec<i32> = seen.iter().map(|(tag, _)| *tag).collect();
	assert_eq!(tags, [1, 2, 3]);
	assert!(seen.iter().all(|(_, data)| data["kind"] == "shoots"));
}

#[tokio::test]
async fn once_fires_a_single_time() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let (hits, handler) = counter();
	let _sub = channel.once("authenticated", handler);

	server.authenticate();
	server.authenticate();
	settle().await;

	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert_eq!(channel.handler_count("authenticated"), 0);
}

#[tokio::test]
async fn dropping_subscription_detaches_one_handler() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let (first_hits, first) = counter();
	let (second_hits, second) = counter();

	let first_sub = channel.on("events", first);
	let _second_sub = channel.on("events", second);
	drop(first_sub);

	server.push("events", Value::Null);
	settle().await;

	assert_eq!(first_hits.load(Ordering::SeqCst), 0);
	assert_eq!(second_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn off_removes_every_handler_for_the_name() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let (hits, handler) = counter();
	let sub_a = channel.on("events", handler);
	let sub_b = channel.on("events", |_: &Value| {});
	let _other = channel.on("namespacedEvents", |_: &Value| {});

	assert_eq!(channel.off("events"), 2);
	server.push("events", Value::Null);
	settle().await;

	assert_eq!(hits.load(Ordering::SeqCst), 0);
	assert_eq!(channel.handler_count("namespacedEvents"), 1);
	drop(sub_a);
	drop(sub_b);
}

#[tokio::test]
async fn handler_may_register_handlers() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let (hits, handler) = counter();
	let handler = Arc::new(handler);
	let inner = Arc::new(Mutex::new(None));

	let _outer = {
		let weak = Arc::downgrade(&channel);
		let inner = Arc::clone(&inner);
		channel.on("authenticated", move |_: &Value| {
			if let Some(channel) = weak.upgrade() {
				let handler = Arc::clone(&handler);
				*inner.lock() = Some(channel.on("events", move |v: &Value| handler(v)));
			}
		})
	};

	server.authenticate();
	server.push("events", Value::Null);
	settle().await;

	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_is_immediate_and_notified() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	let reasons = Arc::new(Mutex::new(Vec::new()));
	let _sub = {
		let reasons = Arc::clone(&reasons);
		channel.on("disconnect", move |data: &Value| {
			reasons.lock().push(data.as_str().map(DisconnectReason::parse));
		})
	};

	channel.connect().unwrap();
	settle().await;
	channel.disconnect().unwrap();
	assert_eq!(channel.state(), ConnectionState::Disconnected);
	settle().await;

	assert_eq!(*reasons.lock(), [Some(DisconnectReason::ClientDisconnect)]);
	assert!(!server.is_open());
	channel.disconnect().unwrap();
}

#[tokio::test]
async fn server_drop_and_restore_track_state() {
	let (channel, server) = memory_channel();
	let _pump = spawn_pump(&channel);
	channel.connect().unwrap();
	settle().await;

	server.drop_connection(DisconnectReason::PingTimeout);
	settle().await;
	assert_eq!(channel.state(), ConnectionState::Disconnected);

	server.restore();
	settle().await;
	assert!(channel.is_connected());
}

#[tokio::test]
async fn run_twice_is_an_error() {
	let (channel, _server) = memory_channel();
	let _pump = spawn_pump(&channel);
	settle().await;
	let err = channel.run().await.unwrap_err();
	assert!(matches!(err, Error::AlreadyRunning(ref topic) if topic == "shoots"));
}
