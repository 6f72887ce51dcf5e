//! Error types for sessions, the registry, and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the client.
///
/// Connection trouble is not an error at this level: it is absorbed by the
/// transport and surfaced as [`SessionEvent`](crate::SessionEvent)s.
#[derive(Debug, Error)]
pub enum Error {
	/// Runtime error from a channel or transport.
	#[error(transparent)]
	Runtime(#[from] kf_runtime::Error),

	/// Configuration file could not be read.
	#[error("Failed to read config {}: {source}", path.display())]
	ConfigRead {
		path: PathBuf,
		source: std::io::Error,
	},

	/// Configuration file is not valid JSON for [`ClientConfig`](crate::ClientConfig).
	#[error("Failed to parse config {}: {source}", path.display())]
	ConfigParse {
		path: PathBuf,
		source: serde_json::Error,
	},

	/// Configuration values are inconsistent.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// No session is registered for the topic.
	#[error("Unknown topic '{0}'")]
	UnknownTopic(String),

	/// Timeout waiting for a session event.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Event source went away while waiting.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Runtime(inner) => inner.is_timeout(),
			_ => false,
		}
	}
}
