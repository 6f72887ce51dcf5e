//! Runtime for the dashboard event stream: channels and transports.
//!
//! - **Transport**: a named-event pipe to one topic, over WebSocket or in memory
//! - **Channel handle**: connection state tracking and handler dispatch on top
//!   of a transport
//! - **Handlers**: ordered handler registry with RAII [`Subscription`]s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    kf-rs     │  Sessions, coalescer, registry
//! └──────┬───────┘
//!        │ on / emit / connect
//! ┌──────▼───────┐
//! │  kf-runtime  │  This crate
//! │  ┌────────┐  │
//! │  │Channel │  │  state + handler dispatch
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket / memory
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod channel;
pub mod error;
pub mod handlers;
pub mod transport;

pub use channel::{ChannelHandle, ConnectionState};
pub use error::{Error, Result};
pub use handlers::{HandlerId, Subscription};
pub use transport::{
	Frame, MemoryServer, MemoryTransport, Transport, TransportParts, WebSocketOptions,
	WebSocketTransport, endpoint_url,
};
