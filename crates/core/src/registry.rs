//! The set of live sessions, one per topic.

use std::sync::Arc;

use kf_protocol::Credential;
use kf_runtime::{TransportParts, WebSocketTransport};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::dispatch::Collaborators;
use crate::error::{Error, Result};
use crate::session::{EventSession, NamespacedSession, PrivilegedSession};

/// Holds every session of the process and fans identity changes out to them.
///
/// Sessions are added while building and never removed.
pub struct SessionRegistry {
	sessions: Vec<Arc<dyn EventSession>>,
	entities: Option<NamespacedSession>,
	issues: Option<PrivilegedSession>,
}

impl SessionRegistry {
	pub fn builder() -> RegistryBuilder {
		RegistryBuilder::default()
	}

	/// Builds both built-in sessions over WebSocket transports.
	///
	/// Nothing connects yet: the entity session connects on the first
	/// credential, or on [`connect_all`](Self::connect_all). Must be called
	/// from within a tokio runtime.
	pub fn connect(config: &ClientConfig, collaborators: Collaborators) -> Result<Self> {
		config.validate()?;
		let options = config.session_options();

		let parts = |topic: &str| -> Result<TransportParts> {
			let url = config.endpoint(topic)?;
			debug!(target = "kf.registry", topic, %url, "creating transport");
			Ok(WebSocketTransport::spawn(url, config.websocket_options())?)
		};

		let entities = NamespacedSession::new(
			config.topics.entities.as_str(),
			parts(&config.topics.entities)?,
			collaborators.clone(),
			&options,
		);
		let issues = PrivilegedSession::new(
			config.topics.issues.as_str(),
			parts(&config.topics.issues)?,
			collaborators,
			&options,
		);

		Self::builder().entities(entities).issues(issues).build()
	}

	/// Applies `credential` to every session, in registration order.
	pub fn set_credential(&self, credential: Option<Credential>) {
		info!(
			target = "kf.registry",
			sessions = self.sessions.len(),
			present = credential.is_some(),
			"credential changed"
		);
		for session in &self.sessions {
			session.set_credential(credential.clone());
		}
	}

	/// Asks every session to connect.
	pub fn connect_all(&self) -> Result<()> {
		for session in &self.sessions {
			session.connect()?;
		}
		Ok(())
	}

	pub fn session(&self, topic: &str) -> Option<&Arc<dyn EventSession>> {
		self.sessions.iter().find(|s| s.topic() == topic)
	}

	/// Like [`session`](Self::session), but unknown topics are an error.
	pub fn try_session(&self, topic: &str) -> Result<&Arc<dyn EventSession>> {
		self.session(topic)
			.ok_or_else(|| Error::UnknownTopic(topic.to_string()))
	}

	/// The namespaced entity session, if registered.
	pub fn entities(&self) -> Option<&NamespacedSession> {
		self.entities.as_ref()
	}

	/// The privileged issue session, if registered.
	pub fn issues(&self) -> Option<&PrivilegedSession> {
		self.issues.as_ref()
	}

	pub fn topics(&self) -> impl Iterator<Item = &str> {
		self.sessions.iter().map(|s| s.topic())
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

impl std::fmt::Debug for SessionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionRegistry")
			.field("topics", &self.topics().collect::<Vec<_>>())
			.finish()
	}
}

/// Collects sessions for a [`SessionRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
	sessions: Vec<Arc<dyn EventSession>>,
	entities: Option<NamespacedSession>,
	issues: Option<PrivilegedSession>,
}

impl RegistryBuilder {
	/// Registers the namespaced entity session.
	pub fn entities(mut self, session: NamespacedSession) -> Self {
		self.sessions.push(Arc::new(session.clone()));
		self.entities = Some(session);
		self
	}

	/// Registers the privileged issue session.
	pub fn issues(mut self, session: PrivilegedSession) -> Self {
		self.sessions.push(Arc::new(session.clone()));
		self.issues = Some(session);
		self
	}

	/// Registers any other session.
	pub fn session(mut self, session: Arc<dyn EventSession>) -> Self {
		self.sessions.push(session);
		self
	}

	/// Fails if two sessions share a topic.
	pub fn build(self) -> Result<SessionRegistry> {
		for (i, session) in self.sessions.iter().enumerate() {
			let topic = session.topic();
			if self.sessions[..i].iter().any(|other| other.topic() == topic) {
				return Err(Error::InvalidConfig(format!("topic '{topic}' registered twice")));
			}
		}
		Ok(SessionRegistry {
			sessions: self.sessions,
			entities: self.entities,
			issues: self.issues,
		})
	}
}
