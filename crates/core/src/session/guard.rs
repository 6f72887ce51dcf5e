//! Reauthentication guard.
//!
//! A credential change on a live connection is realized as
//! disconnect-then-reconnect. The reconnect is triggered either by the
//! disconnect completion for the local request or, if that never shows up,
//! by the guard window running out.

use std::time::Duration;

use kf_protocol::DisconnectReason;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What a pending reauthentication should do now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
	/// Keep waiting for the disconnect to complete.
	Wait,
	/// Connect again right away.
	ReconnectNow,
}

/// Decision rule for a pending drop-and-reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReauthGuard {
	window: Duration,
}

impl ReauthGuard {
	pub fn new(window: Duration) -> Self {
		Self { window }
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	/// Decides at `elapsed` since the disconnect was requested.
	///
	/// `reason` is the disconnect just observed, or `None` when the guard
	/// timer is asking. Only the client-initiated sentinel short-circuits the
	/// window; any other reason keeps waiting for the timer.
	pub fn action(&self, elapsed: Duration, reason: Option<&DisconnectReason>) -> GuardAction {
		if elapsed >= self.window {
			return GuardAction::ReconnectNow;
		}
		match reason {
			Some(reason) if reason.is_client_initiated() => GuardAction::ReconnectNow,
			_ => GuardAction::Wait,
		}
	}
}

/// An armed guard. Dropping it cancels the timer.
pub(crate) struct PendingReauth {
	pub id: u64,
	pub requested_at: Instant,
	timer: JoinHandle<()>,
}

impl PendingReauth {
	pub fn new(id: u64, timer: JoinHandle<()>) -> Self {
		Self {
			id,
			requested_at: Instant::now(),
			timer,
		}
	}
}

impl Drop for PendingReauth {
	fn drop(&mut self) {
		self.timer.abort();
	}
}
