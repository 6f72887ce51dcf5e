// Credential fan-out across the sessions of a registry.

mod common;

use std::sync::Arc;

use common::{auth, collaborators, settle, token};
use kf::testing::RecordingDispatch;
use kf::{
	EventSession, NamespacedSession, PrivilegedSession, SessionOptions, SessionPhase,
	SessionRegistry, StaticNamespaces,
};
use kf_runtime::{MemoryServer, MemoryTransport};

struct Fixture {
	registry: SessionRegistry,
	shoots: MemoryServer,
	journals: MemoryServer,
}

fn fixture(is_admin: bool) -> Fixture {
	let dispatch = RecordingDispatch::new();
	let namespaces = Arc::new(StaticNamespaces::new(["team-a"]));
	let options = SessionOptions::default();

	let (parts, shoots) = MemoryTransport::pair();
	let entities = NamespacedSession::new(
		"shoots",
		parts,
		collaborators(&dispatch, &namespaces, is_admin),
		&options,
	);
	let (parts, journals) = MemoryTransport::pair();
	let issues = PrivilegedSession::new(
		"journals",
		parts,
		collaborators(&dispatch, &namespaces, is_admin),
		&options,
	);

	let registry = SessionRegistry::builder()
		.entities(entities)
		.issues(issues)
		.build()
		.unwrap();
	Fixture {
		registry,
		shoots,
		journals,
	}
}

#[tokio::test(start_paused = true)]
async fn credential_reaches_every_session() {
	let mut f = fixture(true);
	f.registry.set_credential(Some(token("c1")));
	settle().await;

	assert_eq!(f.shoots.drain_messages(), [auth("c1")]);
	assert_eq!(f.journals.drain_messages(), [auth("c1")]);
	assert_eq!(f.registry.topics().collect::<Vec<_>>(), ["shoots", "journals"]);
}

#[tokio::test(start_paused = true)]
async fn unprivileged_caller_only_reaches_the_entity_session() {
	let mut f = fixture(false);
	f.registry.set_credential(Some(token("c1")));
	settle().await;

	assert_eq!(f.shoots.drain_messages(), [auth("c1")]);
	assert_eq!(f.journals.opens(), 0);
	assert_eq!(
		f.registry.issues().unwrap().phase(),
		SessionPhase::Disconnected
	);
}

#[tokio::test(start_paused = true)]
async fn credential_change_reauthenticates_each_session() {
	let mut f = fixture(true);
	f.registry.set_credential(Some(token("c1")));
	settle().await;
	f.shoots.authenticate();
	f.journals.authenticate();
	settle().await;
	f.shoots.drain();
	f.journals.drain();

	f.registry.set_credential(Some(token("c2")));
	settle().await;
	assert_eq!(f.shoots.drain_messages(), [auth("c2")]);
	assert_eq!(f.journals.drain_messages(), [auth("c2")]);
	assert_eq!(f.shoots.closes(), 1);
	assert_eq!(f.journals.closes(), 1);

	f.registry.set_credential(None);
	settle().await;
	assert!(!f.shoots.is_open());
	assert!(!f.journals.is_open());
	for topic in ["shoots", "journals"] {
		assert!(!f.registry.try_session(topic).unwrap().is_authenticated());
	}
}

#[tokio::test(start_paused = true)]
async fn connect_all_skips_unprivileged_sessions() {
	let f = fixture(false);
	f.registry.connect_all().unwrap();
	settle().await;

	assert_eq!(f.shoots.opens(), 1);
	assert_eq!(f.journals.opens(), 0);
	assert_eq!(
		f.registry.entities().unwrap().phase(),
		SessionPhase::Connected
	);
}
