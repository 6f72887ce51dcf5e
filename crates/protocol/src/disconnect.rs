//! Disconnect reasons reported by the transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a connection was closed.
///
/// The string forms match what event-socket servers and clients report, so a
/// reason read off the wire round-trips through [`parse`](Self::parse).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisconnectReason {
	/// The local caller asked for the disconnect.
	ClientDisconnect,
	/// The server closed the connection.
	ServerDisconnect,
	/// The underlying stream ended without a close handshake.
	TransportClose,
	/// The underlying stream failed.
	TransportError,
	/// The peer stopped answering heartbeats.
	PingTimeout,
	/// Any other reason, kept verbatim.
	Other(String),
}

impl DisconnectReason {
	const CLIENT: &'static str = "io client disconnect";
	const SERVER: &'static str = "io server disconnect";
	const CLOSE: &'static str = "transport close";
	const ERROR: &'static str = "transport error";
	const PING: &'static str = "ping timeout";

	pub fn parse(reason: &str) -> Self {
		match reason {
			Self::CLIENT => Self::ClientDisconnect,
			Self::SERVER => Self::ServerDisconnect,
			Self::CLOSE => Self::TransportClose,
			Self::ERROR => Self::TransportError,
			Self::PING => Self::PingTimeout,
			other => Self::Other(other.to_string()),
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			Self::ClientDisconnect => Self::CLIENT,
			Self::ServerDisconnect => Self::SERVER,
			Self::TransportClose => Self::CLOSE,
			Self::TransportError => Self::ERROR,
			Self::PingTimeout => Self::PING,
			Self::Other(reason) => reason,
		}
	}

	/// Returns true when the disconnect completed a local `disconnect()` call.
	pub fn is_client_initiated(&self) -> bool {
		matches!(self, Self::ClientDisconnect)
	}
}

impl fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<String> for DisconnectReason {
	fn from(reason: String) -> Self {
		Self::parse(&reason)
	}
}

impl From<DisconnectReason> for String {
	fn from(reason: DisconnectReason) -> Self {
		reason.as_str().to_string()
	}
}
