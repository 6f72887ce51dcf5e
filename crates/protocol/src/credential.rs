//! Bearer credential presented to the event server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque bearer token.
///
/// The session layer only compares credentials for equality and presence;
/// the token itself is never inspected. `Debug` output is redacted so a
/// credential can be logged as part of larger structures.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
	/// Wraps a raw token.
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}

	/// Returns `None` for a missing or empty token.
	///
	/// Identity providers hand out empty strings for signed-out users; those
	/// are treated the same as no credential at all.
	pub fn from_token(token: Option<impl Into<String>>) -> Option<Self> {
		token.map(Into::into).filter(|t: &String| !t.is_empty()).map(Self)
	}

	/// An empty token carries no identity and counts as no credential.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the raw token for putting on the wire.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Credential(***)")
	}
}

impl From<&str> for Credential {
	fn from(token: &str) -> Self {
		Self::new(token)
	}
}

impl From<String> for Credential {
	fn from(token: String) -> Self {
		Self(token)
	}
}
