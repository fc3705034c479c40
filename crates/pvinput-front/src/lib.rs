//! Frontend-side engine of a paravirtualized input-device channel.
//!
//! The engine establishes a shared-memory ring between a guest driver and
//! a backend device model in another domain, then turns backend-posted
//! input events into structured callbacks on a [`platform::EventSink`]:
//!
//! - [`ring::RingEngine::connect`] provisions a page grant, an
//!   inter-domain signal channel and a diagnostics registration, with full
//!   rollback on partial failure;
//! - [`ring::RingEngine::publish_connection_info`] writes the discovery
//!   keys the backend needs to attach;
//! - the channel's doorbell signals are coalesced into deferred drain
//!   passes that consume the ring in order and re-arm delivery.
//!
//! Everything platform-specific sits behind the capability traits in
//! [`platform`]; the wire format lives in the `pvinput-proto` crate.

pub mod error;
pub mod platform;
pub mod ring;
pub mod worker;

mod notify;

pub use error::{ChannelError, ConnectError, GrantError, ServiceError, StoreError};
pub use ring::{RingCounters, RingEngine, Services};
pub use worker::ThreadedWorkQueue;
