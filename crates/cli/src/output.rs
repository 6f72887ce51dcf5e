//! NDJSON rendering of dispatch calls.
//!
//! Each call becomes one line on stdout:
//!
//! ```json
//! {"op":"applyBatch","kind":"shoots","scope":"garden-dev","items":[...]}
//! ```

use std::io::{self, Write};

use kf::{Dispatch, Kind, NamespaceSelector, Scope};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Record<'a> {
	ClearScope {
		kind: &'a Kind,
	},
	MarkLoading {
		kind: &'a Kind,
		selector: &'a str,
	},
	MarkLoadingDone {
		kind: &'a Kind,
		scopes: &'a [Scope],
	},
	ApplyBatch {
		kind: &'a Kind,
		scope: &'a Scope,
		items: &'a [Value],
	},
	ApplySingle {
		kind: &'a Kind,
		item: &'a Value,
	},
}

/// [`Dispatch`] that writes every call as a JSON line.
pub struct NdjsonDispatch<W> {
	out: Mutex<W>,
}

impl NdjsonDispatch<io::Stdout> {
	pub fn stdout() -> Self {
		Self::new(io::stdout())
	}
}

impl<W: Write> NdjsonDispatch<W> {
	pub fn new(out: W) -> Self {
		Self {
			out: Mutex::new(out),
		}
	}

	pub fn into_inner(self) -> W {
		self.out.into_inner()
	}

	fn write(&self, record: &Record<'_>) {
		let mut out = self.out.lock();
		let result = serde_json::to_writer(&mut *out, record)
			.map_err(io::Error::from)
			.and_then(|()| out.write_all(b"\n"))
			.and_then(|()| out.flush());
		if let Err(e) = result {
			tracing::warn!(error = %e, "failed to write record");
		}
	}
}

impl<W: Write + Send> Dispatch for NdjsonDispatch<W> {
	fn clear_scope(&self, kind: &Kind) {
		self.write(&Record::ClearScope { kind });
	}

	fn mark_loading(&self, kind: &Kind, selector: &NamespaceSelector) {
		self.write(&Record::MarkLoading {
			kind,
			selector: selector.as_str(),
		});
	}

	fn mark_loading_done(&self, kind: &Kind, scopes: &[Scope]) {
		self.write(&Record::MarkLoadingDone { kind, scopes });
	}

	fn apply_batch(&self, kind: &Kind, scope: &Scope, items: Vec<Value>) {
		self.write(&Record::ApplyBatch {
			kind,
			scope,
			items: &items,
		});
	}

	fn apply_single(&self, kind: &Kind, item: Value) {
		self.write(&Record::ApplySingle { kind, item: &item });
	}
}
