//! Collaborator seams: the downstream dispatch surface, the namespace
//! provider, and the privilege predicate.

use std::fmt;
use std::sync::Arc;

use kf_protocol::{Kind, NamespaceSelector, Scope};
use parking_lot::RwLock;
use serde_json::Value;

/// Downstream surface that sessions feed (typically a UI store).
///
/// Calls arrive from the session's dispatch loop, coalescer timers, or
/// consumer calls, always inside one session transition at a time. No
/// session state lock is held, so implementations may call back into the
/// session.
pub trait Dispatch: Send + Sync {
	/// Drop everything held for `kind`; a new target is about to load.
	fn clear_scope(&self, kind: &Kind);

	/// A subscription for `selector` was just requested.
	fn mark_loading(&self, kind: &Kind, selector: &NamespaceSelector);

	/// The initial load for `scopes` completed.
	fn mark_loading_done(&self, kind: &Kind, scopes: &[Scope]);

	/// Apply a coalesced batch for one scope, in arrival order.
	fn apply_batch(&self, kind: &Kind, scope: &Scope, items: Vec<Value>);

	/// Apply one uncoalesced item.
	fn apply_single(&self, kind: &Kind, item: Value);
}

/// Source of "all known namespaces", consulted when an `All` selector is sent.
pub trait NamespaceProvider: Send + Sync {
	fn namespaces(&self) -> Vec<Scope>;
}

impl<F> NamespaceProvider for F
where
	F: Fn() -> Vec<Scope> + Send + Sync,
{
	fn namespaces(&self) -> Vec<Scope> {
		self()
	}
}

/// A namespace list that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct StaticNamespaces {
	scopes: RwLock<Vec<Scope>>,
}

impl StaticNamespaces {
	pub fn new<I, S>(scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<Scope>,
	{
		Self {
			scopes: RwLock::new(scopes.into_iter().map(Into::into).collect()),
		}
	}

	pub fn replace<I, S>(&self, scopes: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<Scope>,
	{
		*self.scopes.write() = scopes.into_iter().map(Into::into).collect();
	}
}

impl NamespaceProvider for StaticNamespaces {
	fn namespaces(&self) -> Vec<Scope> {
		self.scopes.read().clone()
	}
}

/// Whether the current caller may use privileged topics.
pub type PrivilegeCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
	pub dispatch: Arc<dyn Dispatch>,
	pub namespaces: Arc<dyn NamespaceProvider>,
	pub privileged: PrivilegeCheck,
}

impl Collaborators {
	/// Collaborators for an unprivileged caller.
	pub fn new(dispatch: Arc<dyn Dispatch>, namespaces: Arc<dyn NamespaceProvider>) -> Self {
		Self {
			dispatch,
			namespaces,
			privileged: Arc::new(|| false),
		}
	}

	pub fn with_privilege<F>(mut self, check: F) -> Self
	where
		F: Fn() -> bool + Send + Sync + 'static,
	{
		self.privileged = Arc::new(check);
		self
	}
}

impl fmt::Debug for Collaborators {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Collaborators").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn static_namespaces_can_be_replaced() {
		let provider = StaticNamespaces::new(["team-a", "team-b"]);
		assert_eq!(provider.namespaces().len(), 2);
		provider.replace(["garden"]);
		assert_eq!(provider.namespaces(), vec![Scope::new("garden")]);
	}

	#[test]
	fn closures_are_providers() {
		let provider = || vec![Scope::new("x")];
		assert_eq!(NamespaceProvider::namespaces(&provider), vec![Scope::new("x")]);
	}
}
