//! Outbound intents and inbound payloads.
//!
//! Every message travels as a named event with a JSON payload. Outbound
//! messages are modelled as [`ClientMessage`]; inbound data events are
//! decoded into the payload structs on demand by whoever handles the name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::credential::Credential;
use crate::names;
use crate::target::{Kind, NamespaceTarget, Scope};

/// An item addressed by name within a namespace, e.g. the subject of a
/// comment feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
	pub name: String,
	pub namespace: Scope,
}

impl ItemRef {
	pub fn new(name: impl Into<String>, namespace: impl Into<Scope>) -> Self {
		Self {
			name: name.into(),
			namespace: namespace.into(),
		}
	}
}

/// Messages the client sends to the event server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
	/// Presents the bearer credential for this connection.
	Authentication { bearer: Credential },
	/// Replaces the server-side namespace subscription.
	Subscribe { namespaces: Vec<NamespaceTarget> },
	/// Subscribes to the issue feed.
	SubscribeIssues,
	/// Subscribes to comments of one item.
	SubscribeComments(ItemRef),
	/// Drops the comment subscription.
	UnsubscribeComments,
}

impl ClientMessage {
	pub fn event_name(&self) -> &'static str {
		match self {
			Self::Authentication { .. } => names::AUTHENTICATION,
			Self::Subscribe { .. } => names::SUBSCRIBE,
			Self::SubscribeIssues => names::SUBSCRIBE_ISSUES,
			Self::SubscribeComments(_) => names::SUBSCRIBE_COMMENTS,
			Self::UnsubscribeComments => names::UNSUBSCRIBE_COMMENTS,
		}
	}

	pub fn payload(&self) -> Value {
		match self {
			Self::Authentication { bearer } => json!({ "bearer": bearer.expose() }),
			Self::Subscribe { namespaces } => json!({ "namespaces": namespaces }),
			Self::SubscribeIssues | Self::UnsubscribeComments => Value::Null,
			Self::SubscribeComments(item) => json!({
				"name": item.name,
				"namespace": item.namespace,
			}),
		}
	}

	/// Decodes a named event back into a message.
	///
	/// Returns `Ok(None)` for names that are not client messages.
	pub fn decode(event: &str, payload: &Value) -> serde_json::Result<Option<Self>> {
		#[derive(Deserialize)]
		struct Auth {
			bearer: Credential,
		}

		#[derive(Deserialize)]
		struct Subscribe {
			#[serde(default)]
			namespaces: Vec<NamespaceTarget>,
		}

		let message = match event {
			names::AUTHENTICATION => {
				let Auth { bearer } = Auth::deserialize(payload)?;
				Self::Authentication { bearer }
			}
			names::SUBSCRIBE => {
				let Subscribe { namespaces } = Subscribe::deserialize(payload)?;
				Self::Subscribe { namespaces }
			}
			names::SUBSCRIBE_ISSUES => Self::SubscribeIssues,
			names::SUBSCRIBE_COMMENTS => Self::SubscribeComments(ItemRef::deserialize(payload)?),
			names::UNSUBSCRIBE_COMMENTS => Self::UnsubscribeComments,
			_ => return Ok(None),
		};
		Ok(Some(message))
	}
}

/// `events`: individual items of one kind, delivered as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsPayload {
	pub kind: Kind,
	#[serde(default)]
	pub events: Vec<Value>,
}

/// `namespacedEvents`: items of one kind grouped by namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespacedEventsPayload {
	pub kind: Kind,
	#[serde(default)]
	pub namespaces: BTreeMap<Scope, Vec<Value>>,
}

/// `batchNamespacedEventsDone`: the initial load of these namespaces is
/// complete for `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDonePayload {
	pub kind: Kind,
	#[serde(default)]
	pub namespaces: Vec<Scope>,
}
