//! Wire model of the paravirtual input ring.
//!
//! A frontend (guest driver) and a backend (device model in another domain)
//! share a single 4 KiB page holding a pair of free-running cursors and a
//! fixed-capacity ring of tagged input-event records. The backend produces
//! events and advances `in_prod`; the frontend consumes them and advances
//! `in_cons`. No lock protects the ring: correctness rests on the
//! single-writer-per-cursor discipline and the acquire/release publish
//! protocol documented in [`page`].
//!
//! This crate is pure data model; the connection lifecycle, notification
//! handling and drain loop live in `pvinput-front`.

pub mod event;
pub mod page;

pub use event::InputEvent;
pub use page::{SharedPage, EVENT_SIZE, EVENT_WORDS, PAGE_SIZE, RING_CAPACITY};
