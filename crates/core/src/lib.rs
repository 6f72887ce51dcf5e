//! kf: real-time event subscription client for the dashboard event stream.
//!
//! Each topic gets a long-lived session that connects, authenticates with
//! the caller's bearer token, subscribes to what the consumer selected and
//! turns bursts of namespaced updates into one batch per namespace.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use kf::{ClientConfig, Collaborators, Credential, SessionRegistry, StaticNamespaces};
//! use kf::{EventSession, SubscriptionTarget};
//!
//! #[tokio::main]
//! async fn main() -> kf::Result<()> {
//!     let config = ClientConfig::load(None)?;
//!     let store = Arc::new(MyStore::default()); // implements kf::Dispatch
//!     let namespaces = Arc::new(StaticNamespaces::new(["garden-dev", "garden-prod"]));
//!     let collaborators = Collaborators::new(store, namespaces).with_privilege(|| true);
//!
//!     let registry = SessionRegistry::connect(&config, collaborators)?;
//!     registry.set_credential(Some(Credential::new(token)));
//!
//!     let shoots = registry.entities().expect("entity session");
//!     shoots.set_target(SubscriptionTarget::new("garden-dev"));
//!
//!     let mut events = shoots.subscribe_events();
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event.name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod coalescer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;
pub mod testing;

pub use coalescer::{Batch, BatchSink, Coalescer, DeliveryGate};
pub use config::{ClientConfig, ConfigOverrides, ReconnectConfig, TopicsConfig};
pub use dispatch::{Collaborators, Dispatch, NamespaceProvider, PrivilegeCheck, StaticNamespaces};
pub use error::{Error, Result};
pub use events::{EventStream, EventWaiter, SessionEvent};
pub use kf_protocol::{
	Credential, DisconnectReason, ItemRef, Kind, NamespaceSelector, Scope, SubscriptionTarget,
};
pub use registry::{RegistryBuilder, SessionRegistry};
pub use session::{
	EventSession, GuardAction, NamespacedSession, PrivilegedSession, ReauthGuard, SessionOptions,
	SessionPhase,
};
