//! Wire types for the dashboard event stream.
//!
//! The event server speaks a small named-event protocol over one socket per
//! topic. This crate holds the vocabulary shared by the runtime and the
//! session layer:
//!
//! - [`Credential`] - opaque bearer token, redacted in `Debug`
//! - [`Kind`], [`Scope`], [`NamespaceSelector`], [`SubscriptionTarget`] - what to subscribe to
//! - [`ClientMessage`] - outbound intents (authentication, subscribe, secondary feeds)
//! - [`EventsPayload`], [`NamespacedEventsPayload`], [`BatchDonePayload`] - inbound data
//! - [`DisconnectReason`] - why a connection went away
//! - [`names`] - event name constants for both directions

pub mod credential;
pub mod disconnect;
pub mod messages;
pub mod names;
pub mod target;

pub use credential::Credential;
pub use disconnect::DisconnectReason;
pub use messages::{
	BatchDonePayload, ClientMessage, EventsPayload, ItemRef, NamespacedEventsPayload,
};
pub use target::{ALL_NAMESPACES, Kind, NamespaceSelector, NamespaceTarget, Scope, SubscriptionTarget};
