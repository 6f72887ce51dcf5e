use std::sync::Arc;
use std::time::Duration;

use kf_protocol::{Credential, Kind, SubscriptionTarget};
use kf_runtime::{ConnectionState, TransportParts};

use super::{EventSession, SessionCore, SessionOptions, SessionPhase, Variant};
use crate::dispatch::Collaborators;
use crate::error::Result;
use crate::events::{EventStream, EventWaiter, SessionEvent};

/// Session for a namespace-scoped entity topic.
///
/// Its subscribe intent lists one `{namespace, filter}` entry per selected
/// namespace; an all-namespaces target is expanded against the namespace
/// provider each time the intent is sent. Namespaced events are coalesced
/// per scope before they reach the dispatch surface.
#[derive(Clone, Debug)]
pub struct NamespacedSession {
	core: Arc<SessionCore>,
}

impl NamespacedSession {
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
			core: SessionCore::start(topic.into(), Variant::Namespaced, parts, collaborators, options),
		}
	}

	/// Entity kind this session subscribes to.
	pub fn kind(&self) -> &Kind {
		self.core.kind()
	}

	pub fn credential(&self) -> Option<Credential> {
		self.core.credential()
	}

	pub fn target(&self) -> SubscriptionTarget {
		self.core.target()
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.core.channel_state()
	}

	/// Waits for the first event matching `predicate` from now on.
	pub fn wait_for<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<SessionEvent>
	where
		F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
	{
		self.core.wait_for(predicate, timeout)
	}
}

impl EventSession for NamespacedSession {
	fn topic(&self) -> &str {
		self.core.topic()
	}

	fn connect(&self) -> Result<()> {
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
