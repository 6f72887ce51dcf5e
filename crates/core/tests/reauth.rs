// Identity changes on a live session: drop, reconnect and authenticate again.

mod common;

use std::time::Duration;

use common::{WINDOW, advance, auth, namespaced, settle, token};
use kf::{EventSession, SessionEvent, SessionPhase, SubscriptionTarget};
use kf_protocol::{ClientMessage, DisconnectReason, NamespaceTarget, Scope};
use kf_runtime::ConnectionState;

async fn live(h: &mut common::Harness<kf::NamespacedSession>) {
	h.session.set_credential(Some(token("c1")));
	h.session.set_target(SubscriptionTarget::new("team-a"));
	settle().await;
	h.server.authenticate();
	settle().await;
	h.server.drain();
	assert_eq!(h.server.opens(), 1);
}

fn subscribe_team_a() -> ClientMessage {
	ClientMessage::Subscribe {
		namespaces: vec![NamespaceTarget {
			namespace: Scope::new("team-a"),
			filter: None,
		}],
	}
}

#[tokio::test(start_paused = true)]
async fn same_credential_twice_is_a_no_op() {
	let mut h = namespaced();
	live(&mut h).await;

	h.session.set_credential(Some(token("c1")));
	h.session.set_credential(Some(token("c1")));
	advance(WINDOW * 2).await;

	assert_eq!(h.server.closes(), 0);
	assert_eq!(h.server.opens(), 1);
	assert!(h.session.is_authenticated());
	assert!(h.server.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn new_credential_reconnects_once_and_uses_it() {
	let mut h = namespaced();
	live(&mut h).await;
	let mut events = h.session.subscribe_events();

	h.session.set_credential(Some(token("c2")));
	settle().await;

	// The client-initiated disconnect completes at once, no guard wait.
	assert_eq!(h.server.closes(), 1);
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.session.phase(), SessionPhase::Connected);
	assert_eq!(h.server.drain_messages(), [auth("c2")]);

	h.server.authenticate();
	settle().await;
	assert!(h.session.is_authenticated());
	assert_eq!(h.session.credential(), Some(token("c2")));
	assert_eq!(h.server.drain_messages(), [subscribe_team_a()]);
	assert_eq!(
		events.drain(),
		[
			SessionEvent::Disconnected {
				reason: DisconnectReason::ClientDisconnect,
			},
			SessionEvent::Authenticated,
		]
	);

	// The guard was cancelled: a later drop is left to the transport.
	h.server.drop_connection(DisconnectReason::PingTimeout);
	advance(WINDOW * 3).await;
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.server.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn guard_reconnects_when_disconnect_is_never_reported() {
	let mut h = namespaced();
	live(&mut h).await;
	h.server.set_report_close(false);

	h.session.set_credential(Some(token("c2")));
	settle().await;
	assert_eq!(h.server.closes(), 1);
	assert_eq!(h.server.opens(), 1);

	advance(WINDOW - Duration::from_millis(1)).await;
	assert_eq!(h.server.opens(), 1);
	assert!(h.server.drain().is_empty());

	advance(Duration::from_millis(1)).await;
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.server.drain_messages(), [auth("c2")]);

	h.server.authenticate();
	settle().await;
	assert_eq!(h.server.drain_messages(), [subscribe_team_a()]);
}

#[tokio::test(start_paused = true)]
async fn server_side_disconnect_does_not_short_circuit_the_guard() {
	let mut h = namespaced();
	live(&mut h).await;
	h.server.set_report_close(false);

	h.session.set_credential(Some(token("c2")));
	settle().await;
	// Some other disconnect arrives inside the window.
	h.server.drop_connection(DisconnectReason::ServerDisconnect);
	advance(Duration::from_millis(200)).await;
	assert_eq!(h.server.opens(), 1);

	advance(Duration::from_millis(800)).await;
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.server.drain_messages(), [auth("c2")]);
}

#[tokio::test(start_paused = true)]
async fn credential_change_while_disconnected_just_connects() {
	let mut h = namespaced();
	live(&mut h).await;
	h.server.set_report_close(false);

	h.session.set_credential(Some(token("c2")));
	settle().await;
	advance(Duration::from_millis(600)).await;
	// Not connected any more, so this one just records and connects.
	h.session.set_credential(Some(token("c3")));
	settle().await;
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.server.drain_messages(), [auth("c3")]);

	// Guard from the first change expires; connect is already in place.
	advance(WINDOW).await;
	assert_eq!(h.server.opens(), 2);
	assert_eq!(h.session.credential(), Some(token("c3")));
}

#[tokio::test(start_paused = true)]
async fn clearing_credential_cancels_a_pending_reauth() {
	let mut h = namespaced();
	live(&mut h).await;
	h.server.set_report_close(false);

	h.session.set_credential(Some(token("c2")));
	settle().await;
	h.session.set_credential(None);
	advance(WINDOW * 2).await;

	assert_eq!(h.server.opens(), 1);
	assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
	assert_eq!(h.session.credential(), None);
}
