//! Event names used on the wire.
//!
//! Lifecycle names are produced by the transport itself; the rest are sent
//! or received as named events.

// Transport lifecycle notifications.
pub const CONNECT: &str = "connect";
pub const RECONNECT: &str = "reconnect";
pub const DISCONNECT: &str = "disconnect";
pub const CONNECT_ERROR: &str = "connect_error";
pub const CONNECT_TIMEOUT: &str = "connect_timeout";
pub const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
pub const RECONNECTING: &str = "reconnecting";
pub const RECONNECT_ERROR: &str = "reconnect_error";
pub const RECONNECT_FAILED: &str = "reconnect_failed";
pub const ERROR: &str = "error";

// Server to client.
pub const AUTHENTICATED: &str = "authenticated";
pub const EVENTS: &str = "events";
pub const NAMESPACED_EVENTS: &str = "namespacedEvents";
pub const BATCH_NAMESPACED_EVENTS_DONE: &str = "batchNamespacedEventsDone";

// Client to server.
pub const AUTHENTICATION: &str = "authentication";
pub const SUBSCRIBE: &str = "subscribe";
pub const SUBSCRIBE_ISSUES: &str = "subscribeIssues";
pub const SUBSCRIBE_COMMENTS: &str = "subscribeComments";
pub const UNSUBSCRIBE_COMMENTS: &str = "unsubscribeComments";

/// Returns true for names the transport raises about its own lifecycle.
pub fn is_lifecycle(event: &str) -> bool {
	matches!(
		event,
		CONNECT
			| RECONNECT
			| DISCONNECT
			| CONNECT_ERROR
			| CONNECT_TIMEOUT
			| RECONNECT_ATTEMPT
			| RECONNECTING
			| RECONNECT_ERROR
			| RECONNECT_FAILED
			| ERROR
	)
}
