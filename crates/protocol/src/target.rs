//! Subscription addressing: entity kinds, namespace scopes and targets.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire sentinel selecting every namespace the caller can see.
pub const ALL_NAMESPACES: &str = "_all";

macro_rules! string_newtype {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self::new(value)
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(value)
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
	};
}

string_newtype!(
	/// Entity kind carried by an event, e.g. `shoots` or `issues`.
	Kind
);

string_newtype!(
	/// A namespace, the unit of subscription and coalescing.
	Scope
);

impl Kind {
	pub const SHOOTS: &'static str = "shoots";
	pub const ISSUES: &'static str = "issues";
	pub const COMMENTS: &'static str = "comments";
}

/// Which namespaces a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NamespaceSelector {
	/// Every namespace known to the caller, expanded at send time.
	All,
	/// One namespace.
	Namespace(Scope),
}

impl NamespaceSelector {
	pub fn parse(value: &str) -> Self {
		if value == ALL_NAMESPACES {
			Self::All
		} else {
			Self::Namespace(Scope::new(value))
		}
	}

	pub fn as_str(&self) -> &str {
		match self {
			Self::All => ALL_NAMESPACES,
			Self::Namespace(scope) => scope.as_str(),
		}
	}

	pub fn is_all(&self) -> bool {
		matches!(self, Self::All)
	}

	/// Resolves the selector into concrete namespaces.
	///
	/// `known` is only consulted for [`All`](Self::All), so callers can pass a
	/// lookup that hits an external store.
	pub fn expand(&self, known: impl FnOnce() -> Vec<Scope>) -> Vec<Scope> {
		match self {
			Self::All => known(),
			Self::Namespace(scope) => vec![scope.clone()],
		}
	}
}

impl fmt::Display for NamespaceSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<String> for NamespaceSelector {
	fn from(value: String) -> Self {
		Self::parse(&value)
	}
}

impl From<&str> for NamespaceSelector {
	fn from(value: &str) -> Self {
		Self::parse(value)
	}
}

impl From<NamespaceSelector> for String {
	fn from(selector: NamespaceSelector) -> Self {
		selector.as_str().to_string()
	}
}

/// One `{namespace, filter}` entry of a subscribe intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTarget {
	pub namespace: Scope,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter: Option<String>,
}

/// What a session wants to receive: a namespace selection plus an optional
/// server-side filter expression.
///
/// A target without a scope is valid; it records "nothing selected yet" and
/// never produces a subscribe intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTarget {
	pub scope: Option<NamespaceSelector>,
	pub filter: Option<String>,
}

impl SubscriptionTarget {
	pub fn new(scope: impl Into<NamespaceSelector>) -> Self {
		Self {
			scope: Some(scope.into()),
			filter: None,
		}
	}

	pub fn all_namespaces() -> Self {
		Self::new(NamespaceSelector::All)
	}

	pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
		self.filter = Some(filter.into());
		self
	}

	pub fn has_scope(&self) -> bool {
		self.scope.is_some()
	}

	/// Expands the target into wire entries, one per namespace.
	pub fn expand(&self, known: impl FnOnce() -> Vec<Scope>) -> Vec<NamespaceTarget> {
		let Some(scope) = &self.scope else {
			return Vec::new();
		};
		scope
			.expand(known)
			.into_iter()
			.map(|namespace| NamespaceTarget {
				namespace,
				filter: self.filter.clone(),
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sentinel_parses_to_all() {
		assert_eq!(NamespaceSelector::parse("_all"), NamespaceSelector::All);
		assert_eq!(
			NamespaceSelector::parse("garden-dev"),
			NamespaceSelector::Namespace(Scope::new("garden-dev"))
		);
		assert_eq!(NamespaceSelector::All.as_str(), "_all");
	}

	#[test]
	fn single_namespace_never_asks_provider() {
		let target = SubscriptionTarget::new("team-a");
		let expanded = target.expand(|| panic!("provider must not be consulted"));
		assert_eq!(
			expanded,
			vec![NamespaceTarget {
				namespace: Scope::new("team-a"),
				filter: None,
			}]
		);
	}

	#[test]
	fn all_namespaces_expands_with_filter() {
		let target = SubscriptionTarget::all_namespaces().with_filter("healthy");
		let expanded = target.expand(|| vec![Scope::new("a"), Scope::new("b")]);
		assert_eq!(expanded.len(), 2);
		assert!(expanded.iter().all(|t| t.filter.as_deref() == Some("healthy")));
		assert_eq!(expanded[1].namespace.as_str(), "b");
	}

	#[test]
	fn unscoped_target_expands_to_nothing() {
		assert!(SubscriptionTarget::default().expand(Vec::new).is_empty());
	}

	#[test]
	fn namespace_target_omits_missing_filter() {
		let entry = NamespaceTarget {
			namespace: Scope::new("team-a"),
			filter: None,
		};
		assert_eq!(
			serde_json::to_value(entry).unwrap(),
			serde_json::json!({"namespace": "team-a"})
		);
	}
}
