//! Public event surface of a session.
//!
//! - [`SessionEvent`] - what a session publishes
//! - [`EventBus`] - broadcast channel plus predicate waiters
//! - [`EventStream`] - lag-tolerant wrapper around a broadcast receiver
//! - [`EventWaiter`] - one-shot capture with timeout
//!
//! Waiters are served before the broadcast, so `wait_for` cannot miss an
//! event because a stream subscriber lagged.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use kf_protocol::{DisconnectReason, Kind, Scope};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::error::{Error, Result};

/// Something a session reports to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// The server accepted the credential.
	Authenticated,
	/// The connection was lost. Always recoverable.
	Disconnected { reason: DisconnectReason },
	/// Single items, re-emitted as received.
	Items { kind: Kind, items: Vec<Value> },
	/// Coalesced items for one scope.
	Batch {
		kind: Kind,
		scope: Scope,
		items: Vec<Value>,
	},
	/// The initial load of these scopes completed.
	Loaded { kind: Kind, scopes: Vec<Scope> },
	/// Everything previously delivered for `kind` is stale.
	Cleared { kind: Kind },
}

impl SessionEvent {
	/// Entity kind the event carries data for, if any.
	pub fn kind(&self) -> Option<&Kind> {
		match self {
			Self::Items { kind, .. }
			| Self::Batch { kind, .. }
			| Self::Loaded { kind, .. }
			| Self::Cleared { kind } => Some(kind),
			Self::Authenticated | Self::Disconnected { .. } => None,
		}
	}

	/// Event name on the public surface: `authenticated`, `disconnect`, or
	/// the entity kind.
	pub fn name(&self) -> &str {
		match self {
			Self::Authenticated => "authenticated",
			Self::Disconnected { .. } => "disconnect",
			Self::Items { kind, .. } | Self::Batch { kind, .. } => kind.as_str(),
			Self::Loaded { .. } => "loaded",
			Self::Cleared { .. } => "cleared",
		}
	}
}

type Matcher<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Fan-out point of a session: every subscriber stream sees every event,
/// and each pending waiter is completed by the first event it matches.
pub(crate) struct EventBus<E: Clone + Send + 'static> {
	streams: broadcast::Sender<E>,
	pending: Mutex<Vec<(Matcher<E>, oneshot::Sender<E>)>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
	pub fn new(capacity: usize) -> Self {
		Self {
			streams: broadcast::channel(capacity).0,
			pending: Mutex::new(Vec::new()),
		}
	}

	/// Completes matching waiters, then broadcasts. Waiters whose receiver
	/// was dropped are forgotten on the way.
	pub fn emit(&self, event: E) {
		let matched: Vec<_> = {
			let mut pending = self.pending.lock();
			let (matched, rest) = std::mem::take(&mut *pending)
				.into_iter()
				.filter(|(_, reply)| !reply.is_closed())
				.partition(|(matches, _)| matches(&event));
			*pending = rest;
			matched
		};
		for (_, reply) in matched {
			let _ = reply.send(event.clone());
		}
		// No subscribers is fine.
		let _ = self.streams.send(event);
	}

	/// Events emitted before subscribing are not received.
	pub fn subscribe(&self) -> broadcast::Receiver<E> {
		self.streams.subscribe()
	}

	pub fn register_waiter<F>(&self, matches: F) -> oneshot::Receiver<E>
	where
		F: Fn(&E) -> bool + Send + Sync + 'static,
	{
		let (reply, rx) = oneshot::channel();
		self.pending.lock().push((Box::new(matches), reply));
		rx
	}

	#[cfg(test)]
	pub fn waiter_count(&self) -> usize {
		self.pending.lock().len()
	}
}

/// Subscriber end of a session's events.
///
/// A subscriber that falls more than the bus capacity behind loses the
/// oldest events; the loss is logged and the stream carries on.
pub struct EventStream<E: Clone + Send + 'static> {
	rx: broadcast::Receiver<E>,
}

fn report_lag(skipped: u64) {
	tracing::warn!(target = "kf.events", skipped, "slow subscriber, events skipped");
}

impl<E: Clone + Send + 'static> EventStream<E> {
	pub(crate) fn new(rx: broadcast::Receiver<E>) -> Self {
		Self { rx }
	}

	/// Next event, or `None` once the session is gone.
	pub async fn recv(&mut self) -> Option<E> {
		use broadcast::error::RecvError;
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(RecvError::Lagged(skipped)) => report_lag(skipped),
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Next event if one is already queued.
	pub fn try_recv(&mut self) -> Option<E> {
		use broadcast::error::TryRecvError;
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(TryRecvError::Lagged(skipped)) => report_lag(skipped),
				Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
			}
		}
	}

	/// Takes every event queued so far.
	pub fn drain(&mut self) -> Vec<E> {
		std::iter::from_fn(|| self.try_recv()).collect()
	}
}

/// Resolves with the first event matching a predicate.
///
/// Use [`wait`](Self::wait) for a bounded wait; `.await` on the waiter
/// itself has no deadline.
pub struct EventWaiter<E> {
	rx: oneshot::Receiver<E>,
	timeout: Duration,
}

impl<E: Send + 'static> EventWaiter<E> {
	pub(crate) fn new(rx: oneshot::Receiver<E>, timeout: Duration) -> Self {
		Self { rx, timeout }
	}

	/// Fails with [`Error::Timeout`] after the deadline, or with
	/// [`Error::ChannelClosed`] if the session went away first.
	pub async fn wait(self) -> Result<E> {
		let timeout = self.timeout;
		match tokio::time::timeout(timeout, self.rx).await {
			Ok(Ok(event)) => Ok(event),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => Err(Error::Timeout(format!("no matching session event within {timeout:?}"))),
		}
	}
}

impl<E: Send + 'static> Future for EventWaiter<E> {
	type Output = Result<E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|received| received.map_err(|_| Error::ChannelClosed))
	}
}
