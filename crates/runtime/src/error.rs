//! Error types for channel handles and transports.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the runtime.
///
/// Handler-facing failures never surface here: connection problems are
/// reported as lifecycle notifications on the channel instead.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish a connection with the event server.
	#[error("Failed to connect to event server: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (socket I/O, framing).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// The server refused the WebSocket upgrade.
	#[error("Server rejected connection with HTTP {status}")]
	Rejected { status: u16 },

	/// Endpoint could not be turned into a socket URL.
	#[error("Invalid endpoint URL '{url}': {reason}")]
	InvalidUrl { url: String, reason: String },

	/// Operation requires an open connection.
	#[error("Not connected")]
	NotConnected,

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// The notification pump was started twice.
	#[error("Channel '{0}' is already running")]
	AlreadyRunning(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// WebSocket library error.
	#[error("WebSocket error: {0}")]
	WebSocket(String),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the failure is worth retrying on a fresh connection.
	///
	/// Upgrade rejections only count when the server is overloaded or
	/// failing; an auth or routing answer will not change on retry.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::ConnectionFailed(_)
			| Error::TransportError(_)
			| Error::Timeout(_)
			| Error::Io(_)
			| Error::WebSocket(_) => true,
			Error::Rejected { status } => *status == 429 || *status >= 500,
			_ => false,
		}
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		use tokio_tungstenite::tungstenite::Error as WsError;

		match err {
			WsError::Io(e) => Error::Io(e),
			WsError::Http(response) => Error::Rejected {
				status: response.status().as_u16(),
			},
			WsError::Url(e) => Error::ConnectionFailed(e.to_string()),
			other => Error::WebSocket(other.to_string()),
		}
	}
}
