//! Test doubles for the collaborator seams.

use std::sync::Arc;

use kf_protocol::{Kind, NamespaceSelector, Scope};
use parking_lot::Mutex;
use serde_json::Value;

use crate::dispatch::Dispatch;

/// One call made on a [`RecordingDispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchCall {
	ClearScope(Kind),
	MarkLoading(Kind, NamespaceSelector),
	MarkLoadingDone(Kind, Vec<Scope>),
	ApplyBatch(Kind, Scope, Vec<Value>),
	ApplySingle(Kind, Value),
}

/// [`Dispatch`] that records every call in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingDispatch {
	calls: Arc<Mutex<Vec<DispatchCall>>>,
}

impl RecordingDispatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn calls(&self) -> Vec<DispatchCall> {
		self.calls.lock().clone()
	}

	/// Takes the calls recorded so far.
	pub fn take(&self) -> Vec<DispatchCall> {
		std::mem::take(&mut *self.calls.lock())
	}

	/// Only the `apply_batch` calls, as `(scope, items)`.
	pub fn batches(&self) -> Vec<(Scope, Vec<Value>)> {
		self.calls
			.lock()
			.iter()
			.filter_map(|call| match call {
				DispatchCall::ApplyBatch(_, scope, items) => Some((scope.clone(), items.clone())),
				_ => None,
			})
			.collect()
	}

	fn record(&self, call: DispatchCall) {
		self.calls.lock().push(call);
	}
}

impl Dispatch for RecordingDispatch {
	fn clear_scope(&self, kind: &Kind) {
		self.record(DispatchCall::ClearScope(kind.clone()));
	}

	fn mark_loading(&self, kind: &Kind, selector: &NamespaceSelector) {
		self.record(DispatchCall::MarkLoading(kind.clone(), selector.clone()));
	}

	fn mark_loading_done(&self, kind: &Kind, scopes: &[Scope]) {
		self.record(DispatchCall::MarkLoadingDone(kind.clone(), scopes.to_vec()));
	}

	fn apply_batch(&self, kind: &Kind, scope: &Scope, items: Vec<Value>) {
		self.record(DispatchCall::ApplyBatch(kind.clone(), scope.clone(), items));
	}

	fn apply_single(&self, kind: &Kind, item: Value) {
		self.record(DispatchCall::ApplySingle(kind.clone(), item));
	}
}
