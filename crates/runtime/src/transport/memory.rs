//! In-process transport with a scriptable server end.

use std::sync::Arc;

use kf_protocol::{ClientMessage, DisconnectReason, names};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{Frame, NotificationSender, Transport, TransportParts};
use crate::error::{Error, Result};

#[derive(Debug)]
struct MemoryState {
	open: bool,
	pending_open: bool,
	connected_before: bool,
	auto_accept: bool,
	report_close: bool,
	opens: usize,
	closes: usize,
	reconnects: u64,
}

/// Transport that connects to a [`MemoryServer`] in the same process.
///
/// `open()` is accepted immediately unless auto-accept was turned off, in
/// which case the connection stays pending until [`MemoryServer::accept`].
pub struct MemoryTransport {
	state: Arc<Mutex<MemoryState>>,
	notify: NotificationSender,
	outbound: mpsc::UnboundedSender<Frame>,
}

impl MemoryTransport {
	/// Creates a transport and the server end that observes it.
	pub fn pair() -> (TransportParts, MemoryServer) {
		let (notify, notifications) = mpsc::unbounded_channel();
		let (outbound, inbound) = mpsc::unbounded_channel();
		let state = Arc::new(Mutex::new(MemoryState {
			open: false,
			pending_open: false,
			connected_before: false,
			auto_accept: true,
			report_close: true,
			opens: 0,
			closes: 0,
			reconnects: 0,
		}));

		let transport = Self {
			state: Arc::clone(&state),
			notify: notify.clone(),
			outbound,
		};
		let server = MemoryServer {
			state,
			notify,
			inbound,
		};
		let parts = TransportParts {
			transport: Box::new(transport),
			notifications,
		};
		(parts, server)
	}
}

/// Marks the connection open and returns the notification announcing it.
fn establish(state: &mut MemoryState) -> Frame {
	state.open = true;
	state.pending_open = false;
	if state.connected_before {
		state.reconnects += 1;
		Frame::new(names::RECONNECT, Value::from(state.reconnects))
	} else {
		state.connected_before = true;
		Frame::bare(names::CONNECT)
	}
}

impl Transport for MemoryTransport {
	fn open(&self) -> Result<()> {
		let frame = {
			let mut state = self.state.lock();
			state.opens += 1;
			if state.open {
				return Ok(());
			}
			if !state.auto_accept {
				state.pending_open = true;
				return Ok(());
			}
			establish(&mut state)
		};
		self.notify.send(frame).map_err(|_| Error::ChannelClosed)
	}

	fn close(&self) -> Result<()> {
		let report = {
			let mut state = self.state.lock();
			state.closes += 1;
			state.pending_open = false;
			let was_open = std::mem::replace(&mut state.open, false);
			was_open && state.report_close
		};
		if report {
			let reason = DisconnectReason::ClientDisconnect;
			self.notify
				.send(Frame::new(names::DISCONNECT, Value::from(reason.as_str())))
				.map_err(|_| Error::ChannelClosed)?;
		}
		Ok(())
	}

	fn send(&self, frame: Frame) -> Result<()> {
		if !self.state.lock().open {
			return Err(Error::NotConnected);
		}
		trace!(target = "kf.transport", event = %frame.event, "memory send");
		self.outbound.send(frame).map_err(|_| Error::ChannelClosed)
	}
}

/// Server end of a [`MemoryTransport`].
///
/// Records what the client sent and injects notifications as if they came
/// from the network.
pub struct MemoryServer {
	state: Arc<Mutex<MemoryState>>,
	notify: NotificationSender,
	inbound: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryServer {
	/// Waits for the next frame the client sends.
	pub async fn next_frame(&mut self) -> Option<Frame> {
		self.inbound.recv().await
	}

	/// Returns the next already-sent frame, if any.
	pub fn try_next_frame(&mut self) -> Option<Frame> {
		self.inbound.try_recv().ok()
	}

	/// Takes every frame sent so far.
	pub fn drain(&mut self) -> Vec<Frame> {
		std::iter::from_fn(|| self.try_next_frame()).collect()
	}

	/// Takes every frame sent so far, decoded as client messages.
	///
	/// Frames that are not client messages are skipped.
	pub fn drain_messages(&mut self) -> Vec<ClientMessage> {
		self.drain()
			.into_iter()
			.filter_map(|frame| ClientMessage::decode(&frame.event, &frame.data).ok().flatten())
			.collect()
	}

	/// Delivers a named event to the client.
	pub fn push(&self, event: &str, data: Value) {
		let _ = self.notify.send(Frame::new(event, data));
	}

	/// Completes the authentication handshake.
	pub fn authenticate(&self) {
		self.push(names::AUTHENTICATED, Value::Null);
	}

	/// Completes a pending `open()`.
	pub fn accept(&self) {
		let frame = {
			let mut state = self.state.lock();
			if state.open || !state.pending_open {
				return;
			}
			establish(&mut state)
		};
		let _ = self.notify.send(frame);
	}

	/// Drops the connection from the server side.
	pub fn drop_connection(&self, reason: DisconnectReason) {
		self.state.lock().open = false;
		self.push(names::DISCONNECT, Value::from(reason.as_str()));
	}

	/// Re-establishes a dropped connection, as an automatic retry would.
	pub fn restore(&self) {
		let frame = {
			let mut state = self.state.lock();
			if state.open {
				return;
			}
			state.connected_before = true;
			establish(&mut state)
		};
		let _ = self.notify.send(frame);
	}

	/// Controls whether `open()` completes on its own.
	pub fn set_auto_accept(&self, enabled: bool) {
		self.state.lock().auto_accept = enabled;
	}

	/// Controls whether `close()` reports a client disconnect.
	pub fn set_report_close(&self, enabled: bool) {
		self.state.lock().report_close = enabled;
	}

	pub fn is_open(&self) -> bool {
		self.state.lock().open
	}

	/// Number of `open()` calls, including no-op ones.
	pub fn opens(&self) -> usize {
		self.state.lock().opens
	}

	/// Number of `close()` calls, including no-op ones.
	pub fn closes(&self) -> usize {
		self.state.lock().closes
	}
}

impl std::fmt::Debug for MemoryServer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryServer")
			.field("state", &*self.state.lock())
			.finish_non_exhaustive()
	}
}
