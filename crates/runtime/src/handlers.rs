//! Named-event handler registry.
//!
//! Handlers live in an [`IndexMap`] keyed by [`HandlerId`], which gives O(1)
//! removal while preserving registration order for dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

fn next_handler_id() -> HandlerId {
	static NEXT: AtomicU64 = AtomicU64::new(1);
	NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Handler callback, invoked with the event payload.
pub type HandlerFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// A registered handler.
#[derive(Clone)]
pub struct HandlerEntry {
	pub id: HandlerId,
	pub event: String,
	/// Removed before its first invocation.
	pub once: bool,
	pub handler: HandlerFn,
}

/// Handler storage shared between a channel and its subscriptions.
pub type HandlerMap = Arc<Mutex<IndexMap<HandlerId, HandlerEntry>>>;

/// Registers `handler` for `event` and returns its id.
pub fn register(map: &HandlerMap, event: &str, once: bool, handler: HandlerFn) -> HandlerId {
	let id = next_handler_id();
	map.lock().insert(
		id,
		HandlerEntry {
			id,
			event: event.to_string(),
			once,
			handler,
		},
	);
	id
}

/// Snapshots the handlers for `event` in registration order.
///
/// One-shot entries are removed from the map as part of the snapshot, so a
/// handler that re-enters the channel cannot observe them twice.
pub fn take_for_event(map: &HandlerMap, event: &str) -> Vec<HandlerFn> {
	let mut map = map.lock();
	let matching: Vec<(HandlerId, bool, HandlerFn)> = map
		.values()
		.filter(|entry| entry.event == event)
		.map(|entry| (entry.id, entry.once, Arc::clone(&entry.handler)))
		.collect();

	matching
		.into_iter()
		.map(|(id, once, handler)| {
			if once {
				map.shift_remove(&id);
			}
			handler
		})
		.collect()
}

/// Removes every handler registered for `event`. Returns how many went away.
pub fn remove_event(map: &HandlerMap, event: &str) -> usize {
	let mut map = map.lock();
	let before = map.len();
	map.retain(|_, entry| entry.event != event);
	before - map.len()
}

/// Keeps a handler registered for as long as it is alive.
///
/// Only a weak reference to the handler map is held, so a subscription may
/// outlive its channel; dropping it then does nothing.
pub struct Subscription {
	id: HandlerId,
	handlers: Weak<Mutex<IndexMap<HandlerId, HandlerEntry>>>,
}

impl Subscription {
	pub(crate) fn new(id: HandlerId, handlers: &HandlerMap) -> Self {
		Self {
			id,
			handlers: Arc::downgrade(handlers),
		}
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Same as dropping, spelled out.
	pub fn unsubscribe(self) {}

	fn is_registered(&self) -> bool {
		self.handlers
			.upgrade()
			.is_some_and(|map| map.lock().contains_key(&self.id))
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(map) = self.handlers.upgrade() {
			map.lock().shift_remove(&self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("registered", &self.is_registered())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	fn empty_map() -> HandlerMap {
		Arc::new(Mutex::new(IndexMap::new()))
	}

	fn counting(counter: &Arc<AtomicUsize>) -> HandlerFn {
		let counter = Arc::clone(counter);
		Arc::new(move |_: &Value| {
			counter.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[test]
	fn ids_are_never_reused() {
		let map = empty_map();
		let hits = Arc::new(AtomicUsize::new(0));
		let a = register(&map, "events", false, counting(&hits));
		drop(Subscription::new(a, &map));
		let b = register(&map, "events", false, counting(&hits));
		assert_ne!(a, b);
	}

	#[test]
	fn once_entries_leave_on_snapshot() {
		let map = empty_map();
		let hits = Arc::new(AtomicUsize::new(0));
		register(&map, "connect", true, counting(&hits));
		register(&map, "connect", false, counting(&hits));
		register(&map, "disconnect", false, counting(&hits));

		let first = take_for_event(&map, "connect");
		assert_eq!(first.len(), 2);
		assert_eq!(map.lock().len(), 2);

		let second = take_for_event(&map, "connect");
		assert_eq!(second.len(), 1);
	}

	#[test]
	fn snapshot_keeps_registration_order() {
		let map = empty_map();
		let order = Arc::new(Mutex::new(Vec::new()));
		for tag in ["a", "b", "c"] {
			let order = Arc::clone(&order);
			register(
				&map,
				"events",
				false,
				Arc::new(move |_: &Value| order.lock().push(tag)),
			);
		}
		for handler in take_for_event(&map, "events") {
			handler(&Value::Null);
		}
		assert_eq!(*order.lock(), ["a", "b", "c"]);
	}

	#[test]
	fn remove_event_only_touches_that_name() {
		let map = empty_map();
		let hits = Arc::new(AtomicUsize::new(0));
		register(&map, "events", false, counting(&hits));
		register(&map, "events", true, counting(&hits));
		register(&map, "connect", false, counting(&hits));
		assert_eq!(remove_event(&map, "events"), 2);
		assert_eq!(map.lock().len(), 1);
	}

	#[test]
	fn subscription_drop_unregisters() {
		let map = empty_map();
		let hits = Arc::new(AtomicUsize::new(0));
		let id = register(&map, "events", false, counting(&hits));
		let sub = Subscription::new(id, &map);
		assert!(format!("{sub:?}").contains("registered: true"));
		sub.unsubscribe();
		assert!(map.lock().is_empty());
	}

	#[test]
	fn subscription_outlives_map() {
		let map = empty_map();
		let hits = Arc::new(AtomicUsize::new(0));
		let id = register(&map, "events", false, counting(&hits));
		let sub = Subscription::new(id, &map);
		drop(map);
		assert!(!sub.is_registered());
		drop(sub);
	}
}
