//! Throttled batch coalescer.
//!
//! Items are grouped per `(kind, scope)`. The first item into an empty group
//! arms a timer; when it fires, the whole group is delivered as one
//! [`Batch`]. Flushing delivers right away and cancels the timer.
//!
//! Each armed group carries a generation number. A timer only delivers if its
//! group still has the generation it was armed with, so a timer that lost the
//! race against a flush delivers nothing.
//!
//! Every delivery and discard runs under a [`DeliveryGate`]. An owner that
//! shares the gate can hold it across its own transitions, so no batch taken
//! out before such a transition reaches the sink after it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use kf_protocol::{Kind, Scope};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::trace;

/// Coalesced items for one `(kind, scope)`, in push order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
	pub kind: Kind,
	pub scope: Scope,
	pub items: Vec<Value>,
}

/// Receives batches. Called with the gate held but no coalescer lock.
pub type BatchSink = Arc<dyn Fn(Batch) + Send + Sync>;

/// Re-entrant lock shared between a coalescer and its owner.
pub type DeliveryGate = Arc<ReentrantMutex<()>>;

type Key = (Kind, Scope);

struct Slot {
	items: Vec<Value>,
	generation: u64,
	timer: JoinHandle<()>,
}

impl Drop for Slot {
	fn drop(&mut self) {
		self.timer.abort();
	}
}

#[derive(Default)]
struct Slots {
	groups: BTreeMap<Key, Slot>,
	next_generation: u64,
}

struct Inner {
	window: Duration,
	sink: BatchSink,
	gate: DeliveryGate,
	slots: Mutex<Slots>,
}

impl Inner {
	/// Timer expiry for `key`, armed at `generation`.
	fn expire(&self, key: &Key, generation: u64) {
		let _gate = self.gate.lock();
		let slot = {
			let mut slots = self.slots.lock();
			match slots.groups.get(key) {
				Some(slot) if slot.generation == generation => slots.groups.remove(key),
				_ => None,
			}
		};
		if let Some(slot) = slot {
			self.deliver(key.clone(), slot);
		}
	}

	fn deliver(&self, (kind, scope): Key, mut slot: Slot) {
		let items = std::mem::take(&mut slot.items);
		drop(slot);
		trace!(target = "kf.coalescer", %kind, %scope, count = items.len(), "deliver");
		(self.sink)(Batch { kind, scope, items });
	}
}

/// Groups pushed items per `(kind, scope)` over a fixed window.
///
/// Timers are tokio tasks, so [`push`](Self::push) must run inside a tokio
/// runtime. Dropping the coalescer cancels every pending timer without
/// delivering.
pub struct Coalescer {
	inner: Arc<Inner>,
}

impl Coalescer {
	pub fn new(window: Duration, sink: BatchSink) -> Self {
		Self::with_gate(window, Arc::new(ReentrantMutex::new(())), sink)
	}

	/// Like [`new`](Self::new), delivering under a gate the caller also holds.
	pub fn with_gate(window: Duration, gate: DeliveryGate, sink: BatchSink) -> Self {
		Self {
			inner: Arc::new(Inner {
				window,
				sink,
				gate,
				slots: Mutex::new(Slots::default()),
			}),
		}
	}

	pub fn window(&self) -> Duration {
		self.inner.window
	}

	/// Adds `item` to its group, arming the group's timer if it was empty.
	pub fn push(&self, kind: Kind, scope: Scope, item: Value) {
		let mut slots = self.inner.slots.lock();
		let key = (kind, scope);
		if let Some(slot) = slots.groups.get_mut(&key) {
			slot.items.push(item);
			return;
		}

		slots.next_generation += 1;
		let generation = slots.next_generation;
		let timer = spawn_timer(Arc::downgrade(&self.inner), key.clone(), generation, self.inner.window);
		trace!(target = "kf.coalescer", kind = %key.0, scope = %key.1, generation, "armed");
		slots.groups.insert(
			key,
			Slot {
				items: vec![item],
				generation,
				timer,
			},
		);
	}

	/// Delivers and clears one group now.
	pub fn flush(&self, kind: &Kind, scope: &Scope) {
		let _gate = self.inner.gate.lock();
		let key = (kind.clone(), scope.clone());
		let slot = self.inner.slots.lock().groups.remove(&key);
		if let Some(slot) = slot {
			self.inner.deliver(key, slot);
		}
	}

	/// Delivers and clears every group of `kind` now, in scope order.
	pub fn flush_kind(&self, kind: &Kind) {
		let _gate = self.inner.gate.lock();
		for (key, slot) in self.take_where(|k| k == kind) {
			self.inner.deliver(key, slot);
		}
	}

	/// Delivers and clears every group now.
	pub fn flush_all(&self) {
		let _gate = self.inner.gate.lock();
		for (key, slot) in self.take_where(|_| true) {
			self.inner.deliver(key, slot);
		}
	}

	/// Drops every group of `kind` without delivering. Returns the number of
	/// discarded items.
	pub fn discard_kind(&self, kind: &Kind) -> usize {
		let _gate = self.inner.gate.lock();
		self.take_where(|k| k == kind)
			.into_iter()
			.map(|(_, slot)| slot.items.len())
			.sum()
	}

	/// Number of items waiting in one group.
	pub fn pending(&self, kind: &Kind, scope: &Scope) -> usize {
		let key = (kind.clone(), scope.clone());
		self.inner
			.slots
			.lock()
			.groups
			.get(&key)
			.map_or(0, |slot| slot.items.len())
	}

	/// Number of armed timers, one per non-empty group.
	pub fn armed(&self) -> usize {
		self.inner.slots.lock().groups.len()
	}

	fn take_where(&self, matches: impl Fn(&Kind) -> bool) -> Vec<(Key, Slot)> {
		let mut slots = self.inner.slots.lock();
		let keys: Vec<Key> = slots
			.groups
			.keys()
			.filter(|(kind, _)| matches(kind))
			.cloned()
			.collect();
		keys.into_iter()
			.filter_map(|key| slots.groups.remove(&key).map(|slot| (key, slot)))
			.collect()
	}
}

fn spawn_timer(inner: Weak<Inner>, key: Key, generation: u64, window: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		tokio::time::sleep(window).await;
		if let Some(inner) = inner.upgrade() {
			inner.expire(&key, generation);
		}
	})
}

impl fmt::Debug for Coalescer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Coalescer")
			.field("window", &self.inner.window)
			.field("armed", &self.armed())
			.finish()
	}
}
