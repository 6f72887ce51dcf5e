//! WebSocket transport with automatic reconnection.
//!
//! A background task owns the socket. Control calls are queued to it as
//! commands; everything it observes is reported as notification frames:
//!
//! 1. `open()` connects and notifies `connect`
//! 2. Text frames are decoded as `{"event", "data"}` and forwarded
//! 3. A dropped connection notifies `disconnect` and, unless reconnection is
//!    disabled, retries with exponential backoff, notifying `reconnect` once
//!    a retry succeeds
//! 4. `close()` closes the socket, notifies `disconnect` with the client
//!    sentinel, and stops retrying until the next `open()`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kf_protocol::{DisconnectReason, names};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use super::{Frame, NotificationSender, Transport, TransportParts};
use crate::error::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnection and timeout policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketOptions {
	/// Retry automatically after a dropped connection or failed attempt.
	pub reconnection: bool,
	pub initial_delay: Duration,
	pub max_delay: Duration,
	/// Give up after this many retries. `None` retries forever.
	pub max_attempts: Option<u32>,
	pub connect_timeout: Duration,
}

impl Default for WebSocketOptions {
	fn default() -> Self {
		Self {
			reconnection: true,
			initial_delay: Duration::from_millis(1000),
			max_delay: Duration::from_millis(5000),
			max_attempts: None,
			connect_timeout: Duration::from_millis(20_000),
		}
	}
}

impl WebSocketOptions {
	/// Delay before retry number `attempt + 1`: `initial * 2^attempt`, capped.
	pub fn backoff_delay(&self, attempt: u32) -> Duration {
		let factor = 2u32.saturating_pow(attempt);
		self.initial_delay.saturating_mul(factor).min(self.max_delay)
	}

	fn exhausted(&self, attempt: u32) -> bool {
		self.max_attempts.is_some_and(|max| attempt > max)
	}
}

/// Builds the socket URL for `topic` below `path` on the server at `base`.
///
/// `http`/`https` map to `ws`/`wss`.
pub fn endpoint_url(base: &str, path: &str, topic: &str) -> Result<Url> {
	let invalid = |reason: String| Error::InvalidUrl {
		url: base.to_string(),
		reason,
	};

	let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
	let scheme = match url.scheme() {
		"http" | "ws" => "ws",
		"https" | "wss" => "wss",
		other => return Err(invalid(format!("unsupported scheme '{other}'"))),
	};
	url.set_scheme(scheme)
		.map_err(|()| invalid(format!("cannot switch to '{scheme}'")))?;

	let segments: Vec<&str> = path
		.split('/')
		.chain(std::iter::once(topic))
		.filter(|segment| !segment.is_empty())
		.collect();
	url.set_path(&format!("/{}", segments.join("/")));
	Ok(url)
}

#[derive(Debug)]
enum Command {
	Open,
	Close,
	Send(Frame),
}

/// Transport over one WebSocket connection per topic.
pub struct WebSocketTransport {
	commands: mpsc::UnboundedSender<Command>,
}

impl WebSocketTransport {
	/// Spawns the connection task. Nothing connects until `open()`.
	///
	/// Must be called from within a tokio runtime.
	pub fn spawn(url: Url, options: WebSocketOptions) -> Result<TransportParts> {
		let runtime = tokio::runtime::Handle::try_current()
			.map_err(|e| Error::TransportError(format!("no tokio runtime: {e}")))?;

		let (commands, command_rx) = mpsc::unbounded_channel();
		let (notify, notifications) = mpsc::unbounded_channel();

		let task = ConnectionTask {
			url,
			options,
			commands: command_rx,
			notify,
			wanted: false,
		};
		runtime.spawn(task.run());

		Ok(TransportParts {
			transport: Box::new(Self { commands }),
			notifications,
		})
	}

	fn command(&self, command: Command) -> Result<()> {
		self.commands.send(command).map_err(|_| Error::ChannelClosed)
	}
}

impl Transport for WebSocketTransport {
	fn open(&self) -> Result<()> {
		self.command(Command::Open)
	}

	fn close(&self) -> Result<()> {
		self.command(Command::Close)
	}

	fn send(&self, frame: Frame) -> Result<()> {
		self.command(Command::Send(frame))
	}
}

/// How a served connection ended.
enum Ended {
	/// `close()` was requested.
	Closed,
	/// The connection went away on its own.
	Dropped(DisconnectReason),
	/// The transport handle was dropped.
	Shutdown,
}

/// Why a connect attempt produced no socket.
enum Failed {
	Error(Error),
	TimedOut,
	/// `close()` arrived while connecting.
	Cancelled,
	Shutdown,
}

impl Failed {
	fn is_retryable(&self) -> bool {
		match self {
			Failed::Error(error) => error.is_retryable(),
			Failed::TimedOut => true,
			Failed::Cancelled | Failed::Shutdown => false,
		}
	}
}

struct ConnectionTask {
	url: Url,
	options: WebSocketOptions,
	commands: mpsc::UnboundedReceiver<Command>,
	notify: NotificationSender,
	/// Set by `open()`, cleared by `close()` or exhausted retries.
	wanted: bool,
}

impl ConnectionTask {
	async fn run(mut self) {
		// 0 means a fresh `open()`, otherwise the retry number.
		let mut attempt: u32 = 0;

		loop {
			if !self.wanted {
				if !self.idle().await {
					return;
				}
				attempt = 0;
				continue;
			}

			if attempt > 0 {
				if self.options.exhausted(attempt) {
					warn!(target = "kf.transport", url = %self.url, attempts = attempt - 1, "giving up reconnecting");
					self.notify(names::RECONNECT_FAILED, Value::Null);
					self.wanted = false;
					continue;
				}
				let delay = self.options.backoff_delay(attempt - 1);
				info!(target = "kf.transport", url = %self.url, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
				if !self.pause(delay).await {
					return;
				}
				if !self.wanted {
					continue;
				}
				self.notify(names::RECONNECT_ATTEMPT, Value::from(attempt));
				self.notify(names::RECONNECTING, Value::from(attempt));
			}

			let socket = match self.establish().await {
				Ok(socket) => socket,
				Err(Failed::Shutdown) => return,
				Err(Failed::Cancelled) => continue,
				Err(failure) => {
					let retryable = failure.is_retryable();
					self.report_failure(failure, attempt);
					if !self.options.reconnection {
						self.wanted = false;
					} else if retryable {
						attempt += 1;
					} else {
						warn!(target = "kf.transport", url = %self.url, "connect failure is permanent, not retrying");
						self.notify(names::RECONNECT_FAILED, Value::Null);
						self.wanted = false;
					}
					continue;
				}
			};

			if attempt > 0 {
				self.notify(names::RECONNECT, Value::from(attempt));
			} else {
				self.notify(names::CONNECT, Value::Null);
			}
			debug!(target = "kf.transport", url = %self.url, "connected");

			match self.serve(socket).await {
				Ended::Shutdown => return,
				Ended::Closed => attempt = 0,
				Ended::Dropped(reason) => {
					info!(target = "kf.transport", url = %self.url, %reason, "connection lost");
					self.notify(names::DISCONNECT, Value::from(reason.as_str()));
					if self.options.reconnection {
						attempt = 1;
					} else {
						self.wanted = false;
					}
				}
			}
		}
	}

	fn notify(&self, event: &str, data: Value) {
		let _ = self.notify.send(Frame::new(event, data));
	}

	fn report_failure(&self, failure: Failed, attempt: u32) {
		match failure {
			Failed::TimedOut => {
				let timeout_ms = self.options.connect_timeout.as_millis() as u64;
				warn!(target = "kf.transport", url = %self.url, timeout_ms, "connect timed out");
				self.notify(names::CONNECT_TIMEOUT, Value::from(timeout_ms));
			}
			Failed::Error(error) => {
				warn!(target = "kf.transport", url = %self.url, attempt, %error, "connect failed");
				let event = if attempt > 0 {
					names::RECONNECT_ERROR
				} else {
					names::CONNECT_ERROR
				};
				self.notify(event, Value::from(error.to_string()));
			}
			Failed::Cancelled | Failed::Shutdown => {}
		}
	}

	/// Handles a command that arrived while no socket is up.
	///
	/// Returns false once the transport handle is gone.
	fn handle_offline(&mut self, command: Option<Command>) -> bool {
		match command {
			Some(Command::Open) => self.wanted = true,
			Some(Command::Close) => self.wanted = false,
			Some(Command::Send(frame)) => {
				debug!(target = "kf.transport", event = %frame.event, "dropping frame while offline");
			}
			None => return false,
		}
		true
	}

	async fn idle(&mut self) -> bool {
		let command = self.commands.recv().await;
		self.handle_offline(command)
	}

	/// Sleeps for `delay` while still honoring commands.
	async fn pause(&mut self, delay: Duration) -> bool {
		let sleep = tokio::time::sleep(delay);
		tokio::pin!(sleep);

		loop {
			tokio::select! {
				biased;
				command = self.commands.recv() => {
					if !self.handle_offline(command) {
						return false;
					}
					if !self.wanted {
						return true;
					}
				}
				_ = &mut sleep => return true,
			}
		}
	}

	async fn establish(&mut self) -> std::result::Result<Socket, Failed> {
		let connect = tokio::time::timeout(
			self.options.connect_timeout,
			connect_async(self.url.to_string()),
		);
		tokio::pin!(connect);

		loop {
			tokio::select! {
				biased;
				command = self.commands.recv() => {
					if !self.handle_offline(command) {
						return Err(Failed::Shutdown);
					}
					if !self.wanted {
						return Err(Failed::Cancelled);
					}
				}
				result = &mut connect => {
					return match result {
						Ok(Ok((socket, _response))) => Ok(socket),
						Ok(Err(e)) => Err(Failed::Error(e.into())),
						Err(_) => Err(Failed::TimedOut),
					};
				}
			}
		}
	}

	async fn serve(&mut self, mut socket: Socket) -> Ended {
		loop {
			tokio::select! {
				command = self.commands.recv() => match command {
					Some(Command::Send(frame)) => {
						let text = match frame.encode() {
							Ok(text) => text,
							Err(e) => {
								warn!(target = "kf.transport", event = %frame.event, error = %e, "failed to encode frame");
								continue;
							}
						};
						if let Err(e) = socket.send(Message::Text(text)).await {
							debug!(target = "kf.transport", error = %e, "send failed");
							return Ended::Dropped(DisconnectReason::TransportError);
						}
					}
					Some(Command::Open) => {}
					Some(Command::Close) => {
						let _ = socket.close(None).await;
						self.wanted = false;
						let reason = DisconnectReason::ClientDisconnect;
						self.notify(names::DISCONNECT, Value::from(reason.as_str()));
						return Ended::Closed;
					}
					None => {
						let _ = socket.close(None).await;
						return Ended::Shutdown;
					}
				},
				message = socket.next() => match message {
					Some(Ok(Message::Text(text))) => self.forward(&text),
					Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
						Ok(text) => self.forward(text),
						Err(e) => warn!(target = "kf.transport", error = %e, "non-UTF-8 binary frame"),
					},
					Some(Ok(Message::Ping(payload))) => {
						let _ = socket.send(Message::Pong(payload)).await;
					}
					Some(Ok(Message::Close(_))) => return Ended::Dropped(DisconnectReason::ServerDisconnect),
					Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
					Some(Err(e)) => {
						debug!(target = "kf.transport", error = %e, "socket error");
						return Ended::Dropped(DisconnectReason::TransportError);
					}
					None => return Ended::Dropped(DisconnectReason::TransportClose),
				},
			}
		}
	}

	/// Forwards one inbound text frame as a notification.
	fn forward(&self, text: &str) {
		match Frame::decode(text) {
			Ok(frame) if names::is_lifecycle(&frame.event) => {
				warn!(target = "kf.transport", event = %frame.event, "server sent a reserved event name");
			}
			Ok(frame) => {
				let _ = self.notify.send(frame);
			}
			Err(e) => warn!(target = "kf.transport", error = %e, "malformed frame"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_until_capped() {
		let options = WebSocketOptions::default();
		assert_eq!(options.backoff_delay(0), Duration::from_millis(1000));
		assert_eq!(options.backoff_delay(1), Duration::from_millis(2000));
		assert_eq!(options.backoff_delay(2), Duration::from_millis(4000));
		assert_eq!(options.backoff_delay(3), Duration::from_millis(5000));
		assert_eq!(options.backoff_delay(40), Duration::from_millis(5000));
	}

	#[test]
	fn retries_are_bounded_only_when_configured() {
		let mut options = WebSocketOptions::default();
		assert!(!options.exhausted(1_000));
		options.max_attempts = Some(3);
		assert!(!options.exhausted(3));
		assert!(options.exhausted(4));
	}

	#[test]
	fn endpoint_maps_http_schemes() {
		let url = endpoint_url("https://dash.example.com", "/api/events", "shoots").unwrap();
		assert_eq!(url.as_str(), "wss://dash.example.com/api/events/shoots");

		let url = endpoint_url("http://localhost:3030/", "api/events/", "journals").unwrap();
		assert_eq!(url.as_str(), "ws://localhost:3030/api/events/journals");
	}

	#[test]
	fn endpoint_rejects_foreign_schemes() {
		let err = endpoint_url("ftp://example.com", "/api/events", "shoots").unwrap_err();
		assert!(matches!(err, Error::InvalidUrl { .. }));
		assert!(endpoint_url("not a url", "/", "shoots").is_err());
	}

	#[tokio::test]
	async fn offline_sends_are_dropped() {
		let url = endpoint_url("ws://127.0.0.1:9", "/api/events", "shoots").unwrap();
		let parts = WebSocketTransport::spawn(url, WebSocketOptions::default()).unwrap();
		parts.transport.send(Frame::bare("subscribeIssues")).unwrap();
		parts.transport.close().unwrap();
	}

	#[tokio::test]
	async fn refused_connection_without_retry_reports_error() {
		let url = endpoint_url("ws://127.0.0.1:9", "/api/events", "shoots").unwrap();
		let options = WebSocketOptions {
			reconnection: false,
			connect_timeout: Duration::from_secs(5),
			..WebSocketOptions::default()
		};
		let TransportParts {
			transport,
			mut notifications,
		} = WebSocketTransport::spawn(url, options).unwrap();
		transport.open().unwrap();

		let frame = notifications.recv().await.unwrap();
		assert!(
			frame.event == names::CONNECT_ERROR || frame.event == names::CONNECT_TIMEOUT,
			"unexpected {frame:?}"
		);
	}
}
