use std::sync::Arc;
use std::time::Duration;

use kf_protocol::{Credential, ItemRef, Kind, Scope, SubscriptionTarget};
use kf_runtime::{ConnectionState, TransportParts};

use super::{EventSession, SessionCore, SessionOptions, SessionPhase, Variant};
use crate::dispatch::Collaborators;
use crate::error::Result;
use crate::events::{EventStream, EventWaiter, SessionEvent};

/// Session for the issue topic, open to privileged callers only.
///
/// The privilege predicate is checked on every
/// [`set_credential`](EventSession::set_credential). For an unprivileged
/// caller the credential is ignored, so the session never connects or
/// authenticates, and every subscription operation is a no-op.
///
/// Besides the issue feed, which is requested on every authentication, the
/// session carries a secondary comment feed for one item at a time.
#[derive(Clone, Debug)]
pub struct PrivilegedSession {
	core: Arc<SessionCore>,
}

impl PrivilegedSession {
	/// Creates the session over `parts` and starts its dispatch loop.
	///
	/// Must be called from within a tokio runtime.
	pub fn new(
		topic: impl Into<String>,
		parts: TransportParts,
		collaborators: Collaborators,
		options: &SessionOptions,
	) -> Self {
		Self {
			core: SessionCore::start(topic.into(), Variant::Privileged, parts, collaborators, options),
		}
	}

	pub fn kind(&self) -> &Kind {
		self.core.kind()
	}

	/// Result of the most recent privilege check.
	pub fn is_privileged(&self) -> bool {
		self.core.is_privileged()
	}

	pub fn credential(&self) -> Option<Credential> {
		self.core.credential()
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.core.channel_state()
	}

	/// Follows the comments of one item.
	///
	/// Repeating the call for the same item sends nothing. The subscription
	/// is re-issued after every reauthentication.
	pub fn subscribe_comments(&self, name: impl Into<String>, namespace: impl Into<Scope>) {
		self.core.subscribe_comments(ItemRef::new(name, namespace));
	}

	/// Stops following comments. Sends nothing unless subscribed.
	pub fn unsubscribe_comments(&self) {
		self.core.unsubscribe_comments();
	}

	/// Item whose comments are currently followed.
	pub fn comments(&self) -> Option<ItemRef> {
		self.core.comments()
	}

	pub fn wait_for<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<SessionEvent>
	where
		F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
	{
		self.core.wait_for(predicate, timeout)
	}
}

impl EventSession for PrivilegedSession {
	fn topic(&self) -> &str {
		self.core.topic()
	}

	fn connect(&self) -> Result<()> {
		if !self.core.is_privileged() {
			return Ok(());
		}
		self.core.connect()
	}

	fn set_credential(&self, credential: Option<Credential>) {
		self.core.set_credential(credential);
	}

	fn set_target(&self, target: SubscriptionTarget) {
		self.core.set_target(target);
	}

	fn subscribe_events(&self) -> EventStream<SessionEvent> {
		self.core.subscribe_events()
	}

	fn is_authenticated(&self) -> bool {
		self.core.phase() == SessionPhase::Authenticated
	}

	fn phase(&self) -> SessionPhase {
		self.core.phase()
	}
}
