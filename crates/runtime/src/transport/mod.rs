//! Transport layer: a bidirectional named-event pipe to one topic.
//!
//! A transport owns the socket and its reconnection policy. Everything it
//! observes (server events as well as lifecycle changes) is reported as a
//! [`Frame`] on the notification channel handed out in [`TransportParts`];
//! the [`ChannelHandle`](crate::ChannelHandle) consumes that channel.

mod memory;
mod websocket;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use memory::{MemoryServer, MemoryTransport};
pub use websocket::{WebSocketOptions, WebSocketTransport, endpoint_url};

use crate::error::Result;

/// One named event with its payload, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	pub event: String,
	#[serde(default)]
	pub data: Value,
}

impl Frame {
	pub fn new(event: impl Into<String>, data: Value) -> Self {
		Self {
			event: event.into(),
			data,
		}
	}

	/// Frame without payload.
	pub fn bare(event: impl Into<String>) -> Self {
		Self::new(event, Value::Null)
	}

	/// Encodes the frame as socket text.
	pub fn encode(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	/// Decodes socket text into a frame.
	pub fn decode(text: &str) -> Result<Self> {
		Ok(serde_json::from_str(text)?)
	}
}

/// Control surface of a transport.
///
/// All methods return without waiting for the network; outcomes are
/// reported asynchronously as notifications.
pub trait Transport: Send + Sync {
	/// Starts connecting. Reconnection is enabled until [`close`](Self::close).
	fn open(&self) -> Result<()>;

	/// Closes the connection and stops reconnecting.
	fn close(&self) -> Result<()>;

	/// Sends one frame to the server.
	fn send(&self, frame: Frame) -> Result<()>;
}

/// Sender half of a notification channel.
pub type NotificationSender = mpsc::UnboundedSender<Frame>;

/// Receiver half of a notification channel.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Frame>;

/// A transport split into its control surface and its notification stream.
pub struct TransportParts {
	pub transport: Box<dyn Transport>,
	pub notifications: NotificationReceiver,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}
