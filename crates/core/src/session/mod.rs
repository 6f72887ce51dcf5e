//! Subscription sessions.
//!
//! A session owns one [`ChannelHandle`] and runs the connection and
//! authentication state machine on top of it:
//!
//! ```text
//! Disconnected ──connect/reconnect──▶ Connected ──authenticated──▶ Authenticated
//!      ▲                                  │                              │
//!      └──────────────disconnect──────────┴──────────────────────────────┘
//! ```
//!
//! Transitions come from the channel's dispatch loop, from timers, and from
//! consumer calls on any thread. Each one runs start to finish under the
//! session's transition gate, which the coalescer shares for its deliveries,
//! so transitions of one session never interleave. The gate is re-entrant:
//! a collaborator called from inside a transition may call back in.
//!
//! The two topic variants, [`NamespacedSession`] and [`PrivilegedSession`],
//! share [`SessionCore`] and differ only in their subscribe intent and gating.

mod guard;
mod namespaced;
mod privileged;

use std::sync::{Arc, Weak};
use std::time::Duration;

use kf_protocol::{
	BatchDonePayload, ClientMessage, Credential, DisconnectReason, EventsPayload, ItemRef, Kind,
	NamespaceSelector, NamespacedEventsPayload, SubscriptionTarget, names,
};
use kf_runtime::{ChannelHandle, ConnectionState, Subscription, TransportParts};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use guard::{GuardAction, ReauthGuard};
pub use namespaced::NamespacedSession;
pub use privileged::PrivilegedSession;

use crate::coalescer::{Batch, Coalescer, DeliveryGate};
use crate::dispatch::Collaborators;
use crate::error::Result;
use crate::events::{EventBus, EventStream, EventWaiter, SessionEvent};
use guard::PendingReauth;

/// Where a session stands in the connection/authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
	Disconnected,
	/// Connected, not (yet) authenticated.
	Connected,
	Authenticated,
}

/// Timing knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
	/// Coalescing window for namespaced events.
	pub coalesce_window: Duration,
	/// How long a reauthentication waits for its disconnect to complete.
	pub reauth_guard: Duration,
	/// Capacity of the public event broadcast.
	pub event_capacity: usize,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			coalesce_window: Duration::from_millis(1000),
			reauth_guard: Duration::from_millis(1000),
			event_capacity: 256,
		}
	}
}

/// Capabilities shared by every session variant.
pub trait EventSession: Send + Sync {
	/// Topic this session is connected to.
	fn topic(&self) -> &str;

	/// Starts connecting. Idempotent.
	fn connect(&self) -> Result<()>;

	/// Applies a caller identity change.
	fn set_credential(&self, credential: Option<Credential>);

	/// Replaces the subscription target.
	fn set_target(&self, target: SubscriptionTarget);

	/// Stream of everything this session publishes from now on.
	fn subscribe_events(&self) -> EventStream<SessionEvent>;

	fn is_authenticated(&self) -> bool;

	fn phase(&self) -> SessionPhase;
}

/// Closed set of topic behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variant {
	/// Namespace-scoped subscribe intent.
	Namespaced,
	/// Gated on the privilege predicate; subscribes to the issue feed.
	Privileged,
}

impl Variant {
	fn primary_kind(self) -> Kind {
		match self {
			Variant::Namespaced => Kind::new(Kind::SHOOTS),
			Variant::Privileged => Kind::new(Kind::ISSUES),
		}
	}
}

struct SessionState {
	phase: SessionPhase,
	credential: Option<Credential>,
	/// Result of the last privilege check.
	privileged: bool,
	target: SubscriptionTarget,
	/// Feed handlers of the current authentication.
	feeds: Vec<Subscription>,
	reauth: Option<PendingReauth>,
	next_guard_id: u64,
	/// Secondary feed item, kept for re-issue after reauthentication.
	comments: Option<ItemRef>,
}

/// State machine shared by the session variants.
pub(crate) struct SessionCore {
	topic: String,
	kind: Kind,
	variant: Variant,
	channel: Arc<ChannelHandle>,
	coalescer: Coalescer,
	gate: DeliveryGate,
	bus: Arc<EventBus<SessionEvent>>,
	collaborators: Collaborators,
	guard: ReauthGuard,
	state: Mutex<SessionState>,
	lifecycle: Mutex<Vec<Subscription>>,
	pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCore {
	/// Builds the session and spawns its dispatch loop.
	///
	/// Must be called from within a tokio runtime.
	pub(crate) fn start(
		topic: String,
		variant: Variant,
		parts: TransportParts,
		collaborators: Collaborators,
		options: &SessionOptions,
	) -> Arc<Self> {
		let kind = variant.primary_kind();
		let bus = Arc::new(EventBus::new(options.event_capacity.max(1)));
		let channel = Arc::new(ChannelHandle::new(topic.clone(), parts));
		let gate: DeliveryGate = Arc::new(ReentrantMutex::new(()));

		let sink = {
			let dispatch = Arc::clone(&collaborators.dispatch);
			let bus = Arc::clone(&bus);
			Arc::new(move |batch: Batch| {
				dispatch.apply_batch(&batch.kind, &batch.scope, batch.items.clone());
				bus.emit(SessionEvent::Batch {
					kind: batch.kind,
					scope: batch.scope,
					items: batch.items,
				});
			})
		};

		let core = Arc::new(Self {
			topic,
			kind,
			variant,
			channel: Arc::clone(&channel),
			coalescer: Coalescer::with_gate(options.coalesce_window, Arc::clone(&gate), sink),
			gate,
			bus,
			collaborators,
			guard: ReauthGuard::new(options.reauth_guard),
			state: Mutex::new(SessionState {
				phase: SessionPhase::Disconnected,
				credential: None,
				privileged: false,
				target: SubscriptionTarget::default(),
				feeds: Vec::new(),
				reauth: None,
				next_guard_id: 0,
				comments: None,
			}),
			lifecycle: Mutex::new(Vec::new()),
			pump: Mutex::new(None),
		});

		let lifecycle = vec![
			core.hook(names::CONNECT, |core, data| core.on_connect(data)),
			core.hook(names::RECONNECT, |core, data| core.on_connect(data)),
			core.hook(names::AUTHENTICATED, |core, _| core.on_authenticated()),
			core.hook(names::DISCONNECT, |core, data| core.on_disconnect(data)),
		];
		*core.lifecycle.lock() = lifecycle;

		let topic = core.topic.clone();
		let pump = tokio::spawn(async move {
			if let Err(e) = channel.run().await {
				warn!(target = "kf.session", %topic, error = %e, "dispatch loop failed");
			}
		});
		*core.pump.lock() = Some(pump);

		debug!(target = "kf.session", topic = %core.topic, ?variant, "session started");
		core
	}

	/// Registers a channel handler that reaches the session through a weak
	/// reference and runs as one transition.
	fn hook<F>(self: &Arc<Self>, event: &str, handler: F) -> Subscription
	where
		F: Fn(&Arc<SessionCore>, &Value) + Send + Sync + 'static,
	{
		let weak: Weak<SessionCore> = Arc::downgrade(self);
		self.channel.on(event, move |data: &Value| {
			if let Some(core) = weak.upgrade() {
				let _transition = core.transition();
				handler(&core, data);
			}
		})
	}

	fn transition(&self) -> ReentrantMutexGuard<'_, ()> {
		self.gate.lock()
	}

	pub(crate) fn topic(&self) -> &str {
		&self.topic
	}

	pub(crate) fn kind(&self) -> &Kind {
		&self.kind
	}

	pub(crate) fn phase(&self) -> SessionPhase {
		self.state.lock().phase
	}

	pub(crate) fn credential(&self) -> Option<Credential> {
		self.state.lock().credential.clone()
	}

	pub(crate) fn target(&self) -> SubscriptionTarget {
		self.state.lock().target.clone()
	}

	pub(crate) fn channel_state(&self) -> ConnectionState {
		self.channel.state()
	}

	pub(crate) fn subscribe_events(&self) -> EventStream<SessionEvent> {
		EventStream::new(self.bus.subscribe())
	}

	pub(crate) fn wait_for<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<SessionEvent>
	where
		F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
	{
		EventWaiter::new(self.bus.register_waiter(predicate), timeout)
	}

	pub(crate) fn connect(&self) -> Result<()> {
		let _transition = self.transition();
		Ok(self.channel.connect()?)
	}

	pub(crate) fn is_privileged(&self) -> bool {
		self.state.lock().privileged
	}

	fn send(&self, message: &ClientMessage) -> bool {
		debug!(target = "kf.session", topic = %self.topic, event = message.event_name(), "emit");
		self.channel.emit(message.event_name(), message.payload())
	}

	// Consumer operations.

	pub(crate) fn set_credential(self: &Arc<Self>, credential: Option<Credential>) {
		let _transition = self.transition();
		let credential = credential.filter(|c| !c.is_empty());
		if self.variant == Variant::Privileged {
			let privileged = (self.collaborators.privileged)();
			self.state.lock().privileged = privileged;
			if !privileged {
				debug!(target = "kf.session", topic = %self.topic, "caller not privileged, credential ignored");
				return;
			}
		}

		let Some(credential) = credential else {
			let cancelled = {
				let mut state = self.state.lock();
				state.credential = None;
				state.reauth.take()
			};
			drop(cancelled);
			if self.channel.state() != ConnectionState::Disconnected {
				info!(target = "kf.session", topic = %self.topic, "credential cleared, disconnecting");
				self.disconnect_channel();
			}
			return;
		};

		if !self.channel.is_connected() {
			self.state.lock().credential = Some(credential);
			debug!(target = "kf.session", topic = %self.topic, "credential set, connecting");
			if let Err(e) = self.channel.connect() {
				warn!(target = "kf.session", topic = %self.topic, error = %e, "connect failed");
			}
			return;
		}

		{
			let mut state = self.state.lock();
			if state.credential.as_ref() == Some(&credential) {
				debug!(target = "kf.session", topic = %self.topic, "credential unchanged");
				return;
			}
			state.credential = Some(credential);
			state.next_guard_id += 1;
			let id = state.next_guard_id;
			let timer = self.spawn_guard(id);
			// Replacing a pending guard cancels its timer.
			state.reauth = Some(PendingReauth::new(id, timer));
		}

		info!(target = "kf.session", topic = %self.topic, "credential changed, reconnecting to reauthenticate");
		self.disconnect_channel();
	}

	pub(crate) fn set_target(&self, target: SubscriptionTarget) {
		let _transition = self.transition();
		if self.variant == Variant::Privileged && !self.is_privileged() {
			debug!(target = "kf.session", topic = %self.topic, "caller not privileged, target ignored");
			return;
		}

		let discarded = self.coalescer.discard_kind(&self.kind);
		if discarded > 0 {
			debug!(target = "kf.session", topic = %self.topic, kind = %self.kind, discarded, "dropped pending items");
		}
		self.collaborators.dispatch.clear_scope(&self.kind);
		self.bus.emit(SessionEvent::Cleared {
			kind: self.kind.clone(),
		});

		let authenticated = {
			let mut state = self.state.lock();
			state.target = target.clone();
			state.phase == SessionPhase::Authenticated
		};

		if authenticated {
			self.issue_subscription(&target, true);
		} else {
			debug!(target = "kf.session", topic = %self.topic, "target recorded until authenticated");
		}
	}

	/// Records and, if authenticated, requests the comment feed of `item`.
	pub(crate) fn subscribe_comments(&self, item: ItemRef) {
		let _transition = self.transition();
		let authenticated = {
			let mut state = self.state.lock();
			if !state.privileged {
				return;
			}
			if state.comments.as_ref() == Some(&item) {
				debug!(target = "kf.session", topic = %self.topic, name = %item.name, "comments already subscribed");
				return;
			}
			state.comments = Some(item.clone());
			state.phase == SessionPhase::Authenticated
		};
		if authenticated {
			self.send(&ClientMessage::SubscribeComments(item));
		}
	}

	pub(crate) fn unsubscribe_comments(&self) {
		let _transition = self.transition();
		let was_subscribed = {
			let mut state = self.state.lock();
			if !state.privileged {
				return;
			}
			state.comments.take().is_some()
		};
		if was_subscribed {
			self.send(&ClientMessage::UnsubscribeComments);
		}
	}

	pub(crate) fn comments(&self) -> Option<ItemRef> {
		self.state.lock().comments.clone()
	}

	fn disconnect_channel(&self) {
		if let Err(e) = self.channel.disconnect() {
			warn!(target = "kf.session", topic = %self.topic, error = %e, "disconnect failed");
		}
	}

	fn spawn_guard(self: &Arc<Self>, id: u64) -> JoinHandle<()> {
		let weak = Arc::downgrade(self);
		let deadline = tokio::time::Instant::now() + self.guard.window();
		tokio::spawn(async move {
			tokio::time::sleep_until(deadline).await;
			if let Some(core) = weak.upgrade() {
				core.on_guard_expired(id);
			}
		})
	}

	/// Sends the subscribe intent for `target`, if the variant has one.
	fn issue_subscription(&self, target: &SubscriptionTarget, loading: bool) -> bool {
		let dispatch = &self.collaborators.dispatch;
		let message = match self.variant {
			Variant::Namespaced => {
				let Some(selector) = &target.scope else {
					return false;
				};
				if loading {
					dispatch.mark_loading(&self.kind, selector);
				}
				let namespaces = target.expand(|| self.collaborators.namespaces.namespaces());
				debug!(target = "kf.session", topic = %self.topic, %selector, count = namespaces.len(), "subscribing");
				ClientMessage::Subscribe { namespaces }
			}
			Variant::Privileged => {
				if !self.is_privileged() {
					return false;
				}
				if loading {
					let selector = target.scope.clone().unwrap_or(NamespaceSelector::All);
					dispatch.mark_loading(&self.kind, &selector);
				}
				ClientMessage::SubscribeIssues
			}
		};
		self.send(&message)
	}

	// Transport notifications. All of these run on the dispatch loop, inside
	// the transition taken by `hook`.

	fn on_connect(&self, data: &Value) {
		let credential = {
			let mut state = self.state.lock();
			state.phase = SessionPhase::Connected;
			state.credential.clone()
		};

		match data.as_u64() {
			Some(attempt) => {
				info!(target = "kf.session", topic = %self.topic, attempt, "connection established after retry");
			}
			None => info!(target = "kf.session", topic = %self.topic, "connection established"),
		}

		match credential {
			Some(bearer) => {
				debug!(target = "kf.session", topic = %self.topic, "authenticating");
				self.send(&ClientMessage::Authentication { bearer });
			}
			None => {
				debug!(target = "kf.session", topic = %self.topic, "no credential, staying unauthenticated");
			}
		}
	}

	fn on_authenticated(self: &Arc<Self>) {
		let feeds = vec![
			self.hook(names::EVENTS, |core, data| core.on_events(data)),
			self.hook(names::NAMESPACED_EVENTS, |core, data| core.on_namespaced_events(data)),
			self.hook(names::BATCH_NAMESPACED_EVENTS_DONE, |core, data| core.on_batch_done(data)),
		];

		// Phase, feeds and the re-issued intent change together.
		let (stale, target, comments) = {
			let mut state = self.state.lock();
			state.phase = SessionPhase::Authenticated;
			let stale = std::mem::replace(&mut state.feeds, feeds);
			(stale, state.target.clone(), state.comments.clone())
		};
		drop(stale);

		info!(target = "kf.session", topic = %self.topic, "authenticated");
		self.bus.emit(SessionEvent::Authenticated);

		self.issue_subscription(&target, false);
		if let Some(item) = comments {
			self.send(&ClientMessage::SubscribeComments(item));
		}
	}

	fn on_disconnect(&self, data: &Value) {
		let reason = match data.as_str() {
			Some(reason) => DisconnectReason::parse(reason),
			None => DisconnectReason::Other(data.to_string()),
		};

		let (feeds, reconnect) = {
			let mut state = self.state.lock();
			state.phase = SessionPhase::Disconnected;
			let feeds = std::mem::take(&mut state.feeds);
			let action = state
				.reauth
				.as_ref()
				.map(|pending| self.guard.action(pending.requested_at.elapsed(), Some(&reason)));
			let reconnect = action == Some(GuardAction::ReconnectNow);
			if reconnect {
				state.reauth = None;
			}
			(feeds, reconnect)
		};
		drop(feeds);

		if reason.is_client_initiated() {
			info!(target = "kf.session", topic = %self.topic, %reason, "disconnected");
		} else {
			warn!(target = "kf.session", topic = %self.topic, %reason, "connection lost");
		}
		self.bus.emit(SessionEvent::Disconnected { reason });

		if reconnect {
			debug!(target = "kf.session", topic = %self.topic, "reconnecting with new credential");
			if let Err(e) = self.channel.connect() {
				warn!(target = "kf.session", topic = %self.topic, error = %e, "reconnect failed");
			}
		}
	}

	fn on_guard_expired(&self, id: u64) {
		let _transition = self.transition();
		let fire = {
			let mut state = self.state.lock();
			let action = match &state.reauth {
				Some(pending) if pending.id == id => {
					self.guard.action(pending.requested_at.elapsed(), None)
				}
				_ => return,
			};
			if action == GuardAction::ReconnectNow {
				state.reauth = None;
			}
			action == GuardAction::ReconnectNow
		};

		if fire {
			warn!(target = "kf.session", topic = %self.topic, "no disconnect completion, reconnecting anyway");
			if let Err(e) = self.channel.connect() {
				warn!(target = "kf.session", topic = %self.topic, error = %e, "reconnect failed");
			}
		}
	}

	// Feed handlers, registered on authentication.

	fn decode<T: DeserializeOwned>(&self, event: &str, data: &Value) -> Option<T> {
		match T::deserialize(data) {
			Ok(payload) => Some(payload),
			Err(e) => {
				warn!(target = "kf.session", topic = %self.topic, event, error = %e, "malformed payload dropped");
				None
			}
		}
	}

	fn on_events(&self, data: &Value) {
		let Some(EventsPayload { kind, events }) = self.decode::<EventsPayload>(names::EVENTS, data)
		else {
			return;
		};
		for item in &events {
			self.collaborators.dispatch.apply_single(&kind, item.clone());
		}
		self.bus.emit(SessionEvent::Items { kind, items: events });
	}

	fn on_namespaced_events(&self, data: &Value) {
		let Some(NamespacedEventsPayload { kind, namespaces }) =
			self.decode::<NamespacedEventsPayload>(names::NAMESPACED_EVENTS, data)
		else {
			return;
		};
		for (scope, items) in namespaces {
			for item in items {
				self.coalescer.push(kind.clone(), scope.clone(), item);
			}
		}
	}

	fn on_batch_done(&self, data: &Value) {
		let Some(BatchDonePayload { kind, namespaces }) =
			self.decode::<BatchDonePayload>(names::BATCH_NAMESPACED_EVENTS_DONE, data)
		else {
			return;
		};
		self.coalescer.flush_kind(&kind);
		debug!(target = "kf.session", topic = %self.topic, %kind, scopes = namespaces.len(), "initial load done");
		self.collaborators.dispatch.mark_loading_done(&kind, &namespaces);
		self.bus.emit(SessionEvent::Loaded {
			kind,
			scopes: namespaces,
		});
	}
}

impl Drop for SessionCore {
	fn drop(&mut self) {
		if let Some(pump) = self.pump.get_mut().take() {
			pump.abort();
		}
	}
}

impl std::fmt::Debug for SessionCore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionCore")
			.field("topic", &self.topic)
			.field("variant", &self.variant)
			.field("phase", &self.phase())
			.finish_non_exhaustive()
	}
}
