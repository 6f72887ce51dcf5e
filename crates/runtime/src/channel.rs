//! Channel handle: one topic's transport plus its named-event handlers.

use std::sync::Arc;

use indexmap::IndexMap;
use kf_protocol::{DisconnectReason, names};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handlers::{self, HandlerFn, HandlerMap, Subscription};
use crate::transport::{Frame, NotificationReceiver, Transport, TransportParts};

/// Connection state as seen through transport notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Handle over one auto-reconnecting connection to an event topic.
///
/// Control calls never block: they are forwarded to the transport, whose
/// outcome arrives later as a notification. [`run`](Self::run) drains those
/// notifications and dispatches them to the registered handlers.
pub struct ChannelHandle {
	topic: String,
	transport: Box<dyn Transport>,
	notifications: Mutex<Option<NotificationReceiver>>,
	handlers: HandlerMap,
	state: Mutex<ConnectionState>,
}

impl ChannelHandle {
	pub fn new(topic: impl Into<String>, parts: TransportParts) -> Self {
		Self {
			topic: topic.into(),
			transport: parts.transport,
			notifications: Mutex::new(Some(parts.notifications)),
			handlers: Arc::new(Mutex::new(IndexMap::new())),
			state: Mutex::new(ConnectionState::Disconnected),
		}
	}

	pub fn topic(&self) -> &str {
		&self.topic
	}

	pub fn state(&self) -> ConnectionState {
		*self.state.lock()
	}

	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Connected
	}

	/// Starts connecting. A no-op while connecting or connected.
	pub fn connect(&self) -> Result<()> {
		{
			let mut state = self.state.lock();
			if *state != ConnectionState::Disconnected {
				debug!(target = "kf.channel", topic = %self.topic, state = ?*state, "connect ignored");
				return Ok(());
			}
			*state = ConnectionState::Connecting;
		}
		debug!(target = "kf.channel", topic = %self.topic, "connecting");
		self.transport.open().inspect_err(|_| {
			*self.state.lock() = ConnectionState::Disconnected;
		})
	}

	/// Closes the connection and stops automatic reconnection.
	///
	/// The state flips to `Disconnected` immediately; the transport's own
	/// `disconnect` notification follows asynchronously.
	pub fn disconnect(&self) -> Result<()> {
		let previous = std::mem::replace(&mut *self.state.lock(), ConnectionState::Disconnected);
		debug!(target = "kf.channel", topic = %self.topic, ?previous, "disconnecting");
		self.transport.close()
	}

	/// Sends a named event. Returns false if it was dropped.
	///
	/// Nothing is queued: an emit while not connected is lost.
	pub fn emit(&self, event: &str, payload: Value) -> bool {
		if !self.is_connected() {
			debug!(target = "kf.channel", topic = %self.topic, event, "emit before connect dropped");
			return false;
		}
		match self.transport.send(Frame::new(event, payload)) {
			Ok(()) => true,
			Err(e) => {
				warn!(target = "kf.channel", topic = %self.topic, event, error = %e, "emit failed");
				false
			}
		}
	}

	/// Registers `handler` for every `event` notification.
	pub fn on<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.register(event, false, Arc::new(handler))
	}

	/// Registers `handler` for the next `event` notification only.
	pub fn once<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.register(event, true, Arc::new(handler))
	}

	/// Removes every handler for `event`.
	///
	/// Outstanding [`Subscription`]s for those handlers become no-ops.
	pub fn off(&self, event: &str) -> usize {
		handlers::remove_event(&self.handlers, event)
	}

	pub fn handler_count(&self, event: &str) -> usize {
		self.handlers
			.lock()
			.values()
			.filter(|entry| entry.event == event)
			.count()
	}

	fn register(&self, event: &str, once: bool, handler: HandlerFn) -> Subscription {
		let id = handlers::register(&self.handlers, event, once, handler);
		Subscription::new(id, &self.handlers)
	}

	/// Runs the dispatch loop until the transport goes away.
	///
	/// Notifications are handled one at a time, in arrival order.
	pub async fn run(&self) -> Result<()> {
		let mut notifications = self
			.notifications
			.lock()
			.take()
			.ok_or_else(|| Error::AlreadyRunning(self.topic.clone()))?;

		while let Some(frame) = notifications.recv().await {
			self.dispatch(&frame);
		}

		debug!(target = "kf.channel", topic = %self.topic, "notification stream closed");
		*self.state.lock() = ConnectionState::Disconnected;
		Ok(())
	}

	/// Applies one notification: tracks state, then calls the handlers.
	///
	/// Handlers run outside the registry lock, so they may register or drop
	/// handlers themselves.
	pub fn dispatch(&self, frame: &Frame) {
		self.track(frame);

		let handlers = handlers::take_for_event(&self.handlers, &frame.event);
		if handlers.is_empty() && !names::is_lifecycle(&frame.event) {
			debug!(target = "kf.channel", topic = %self.topic, event = %frame.event, "no handler");
		}
		for handler in handlers {
			handler(&frame.data);
		}
	}

	fn track(&self, frame: &Frame) {
		let mut state = self.state.lock();
		match frame.event.as_str() {
			names::CONNECT | names::RECONNECT => {
				if *state == ConnectionState::Disconnected {
					debug!(target = "kf.channel", topic = %self.topic, event = %frame.event, "stale connect after disconnect");
				}
				*state = ConnectionState::Connected;
			}
			names::RECONNECT_ATTEMPT | names::RECONNECTING => {
				*state = ConnectionState::Connecting;
			}
			names::DISCONNECT => {
				*state = ConnectionState::Disconnected;
				let reason = frame.data.as_str().map(DisconnectReason::parse);
				debug!(target = "kf.channel", topic = %self.topic, reason = ?reason, "disconnected");
			}
			names::RECONNECT_FAILED => {
				*state = ConnectionState::Disconnected;
				warn!(target = "kf.channel", topic = %self.topic, "reconnection gave up");
			}
			names::CONNECT_ERROR | names::CONNECT_TIMEOUT | names::RECONNECT_ERROR | names::ERROR => {
				warn!(target = "kf.channel", topic = %self.topic, event = %frame.event, detail = %frame.data, "transport problem");
			}
			_ => {}
		}
	}
}

impl std::fmt::Debug for ChannelHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelHandle")
			.field("topic", &self.topic)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
