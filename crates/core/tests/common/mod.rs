// Shared harness for session scenarios over the in-memory transport.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use kf::testing::RecordingDispatch;
use kf::{Collaborators, NamespacedSession, PrivilegedSession, SessionOptions, StaticNamespaces};
use kf_protocol::{ClientMessage, Credential};
use kf_runtime::{MemoryServer, MemoryTransport};

pub const WINDOW: Duration = Duration::from_millis(1000);

pub struct Harness<S> {
	pub session: S,
	pub server: MemoryServer,
	pub dispatch: RecordingDispatch,
	pub namespaces: Arc<StaticNamespaces>,
}

pub fn collaborators(
	dispatch: &RecordingDispatch,
	namespaces: &Arc<StaticNamespaces>,
	privileged: bool,
) -> Collaborators {
	Collaborators::new(Arc::new(dispatch.clone()), namespaces.clone())
		.with_privilege(move || privileged)
}

pub fn namespaced() -> Harness<NamespacedSession> {
	let dispatch = RecordingDispatch::new();
	let namespaces = Arc::new(StaticNamespaces::new(["team-a", "team-b"]));
	let (parts, server) = MemoryTransport::pair();
	let session = NamespacedSession::new(
		"shoots",
		parts,
		collaborators(&dispatch, &namespaces, false),
		&SessionOptions::default(),
	);
	Harness {
		session,
		server,
		dispatch,
		namespaces,
	}
}

pub fn privileged(is_admin: bool) -> Harness<PrivilegedSession> {
	let dispatch = RecordingDispatch::new();
	let namespaces = Arc::new(StaticNamespaces::default());
	let (parts, server) = MemoryTransport::pair();
	let session = PrivilegedSession::new(
		"journals",
		parts,
		collaborators(&dispatch, &namespaces, is_admin),
		&SessionOptions::default(),
	);
	Harness {
		session,
		server,
		dispatch,
		namespaces,
	}
}

/// Lets the dispatch loop drain everything queued so far.
pub async fn settle() {
	for _ in 0..32 {
		tokio::task::yield_now().await;
	}
}

/// Settles, advances the paused clock, then settles again.
///
/// Settling first makes timers armed by queued notifications start from
/// the current instant.
pub async fn advance(by: Duration) {
	settle().await;
	tokio::time::advance(by).await;
	settle().await;
}

pub fn token(value: &str) -> Credential {
	Credential::new(value)
}

pub fn auth(value: &str) -> ClientMessage {
	ClientMessage::Authentication {
		bearer: token(value),
	}
}
