//! The shared ring page and its cursor publish protocol.
//!
//! Layout (one zero-initialized 4 KiB page):
//!
//! ```text
//! offset 0   in_cons: u32      consumer cursor, written only by the frontend
//! offset 4   in_prod: u32      producer cursor, written only by the backend
//! offset 8   ring: [[u32; 10]; 64]   40-byte tagged event records
//! ```
//!
//! Both cursors are free-running; a record lives at slot `cursor % capacity`
//! and the pending count is `in_prod.wrapping_sub(in_cons)`. The capacity is
//! a power of two so the slot sequence stays continuous when a cursor wraps
//! past `u32::MAX`; the page tail past the ring is unused. The consumer
//! must never read a slot before observing a producer cursor that covers it.
//!
//! Publish protocol:
//! 1) The producer writes the record words (Relaxed), then stores `in_prod`
//!    with Release.
//! 2) The consumer loads `in_prod` with Acquire; slots below it are then
//!    safe to read (Relaxed).
//! 3) The consumer stores `in_cons` with Release once the records it covers
//!    have been dispatched; the producer reads it with Acquire to gauge
//!    free space.

#[cfg(all(feature = "loom", test))]
use loom::sync::atomic::AtomicU32;
#[cfg(not(all(feature = "loom", test)))]
use std::sync::atomic::AtomicU32;

use std::sync::atomic::Ordering;

/// Size of the shared page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Bytes taken by the two cursors at the start of the page.
pub const CURSORS_SIZE: usize = 8;

/// Size of one tagged event record in bytes.
pub const EVENT_SIZE: usize = 40;

/// One record viewed as 32-bit words; word 0 is the tag.
pub const EVENT_WORDS: usize = EVENT_SIZE / 4;

/// Ring capacity in records: the largest power of two whose records fit in
/// the page after the cursors. With a non-power-of-two capacity the slot
/// mapping jumps at the numeric wrap of the cursor and two live cursors
/// within one lap can share a slot.
pub const RING_CAPACITY: usize = 64;

const _: () = assert!(RING_CAPACITY.is_power_of_two());
const _: () = assert!(CURSORS_SIZE + RING_CAPACITY * EVENT_SIZE <= PAGE_SIZE);
const _: () = assert!(CURSORS_SIZE + 2 * RING_CAPACITY * EVENT_SIZE > PAGE_SIZE);

/// Number of event records still unconsumed, wraparound-aware.
pub fn pending(in_cons: u32, in_prod: u32) -> u32 {
    in_prod.wrapping_sub(in_cons)
}

/// Slot index for a free-running cursor.
pub fn slot_index(cursor: u32) -> usize {
    cursor as usize % RING_CAPACITY
}

struct EventSlot([AtomicU32; EVENT_WORDS]);

/// The shared ring page.
///
/// Jointly owned: the frontend allocates and zeroes it at connect, the
/// backend writes records into it under a grant. All fields are atomic
/// words so cross-domain access is an explicit data-race-free protocol
/// rather than ordinary loads and stores on aliased memory.
#[repr(C)]
pub struct SharedPage {
    in_cons: AtomicU32,
    in_prod: AtomicU32,
    ring: [EventSlot; RING_CAPACITY],
}

impl SharedPage {
    /// A fresh, zeroed page. Zero cursors mean an empty ring.
    pub fn new() -> Self {
        Self {
            in_cons: AtomicU32::new(0),
            in_prod: AtomicU32::new(0),
            ring: std::array::from_fn(|_| EventSlot(std::array::from_fn(|_| AtomicU32::new(0)))),
        }
    }

    // Consumer side.

    /// Current consumer cursor. The caller is its sole writer, so a Relaxed
    /// load reads back the last value it stored.
    pub fn consumer_cursor(&self) -> u32 {
        self.in_cons.load(Ordering::Relaxed)
    }

    /// Snapshot of the producer cursor. Acquire: slots covered by the
    /// returned value are safe to read afterwards.
    pub fn producer_cursor(&self) -> u32 {
        self.in_prod.load(Ordering::Acquire)
    }

    /// Read the record at `cursor`'s slot. Only valid for cursors below an
    /// observed [`SharedPage::producer_cursor`].
    pub fn read_slot(&self, cursor: u32) -> [u32; EVENT_WORDS] {
        let slot = &self.ring[slot_index(cursor)];
        std::array::from_fn(|w| slot.0[w].load(Ordering::Relaxed))
    }

    /// Publish a new consumer cursor. Release: the producer may reuse the
    /// slots below it once it observes the store.
    pub fn advance_consumer(&self, cursor: u32) {
        self.in_cons.store(cursor, Ordering::Release);
    }

    // Producer side (the backend, or a test standing in for it).

    /// Producer's view of the consumer cursor.
    pub fn producer_observed_consumer(&self) -> u32 {
        self.in_cons.load(Ordering::Acquire)
    }

    /// Write the record words at `cursor`'s slot. Must happen before the
    /// producer cursor covering `cursor` is published.
    pub fn write_slot(&self, cursor: u32, words: [u32; EVENT_WORDS]) {
        let slot = &self.ring[slot_index(cursor)];
        for (w, word) in words.into_iter().enumerate() {
            slot.0[w].store(word, Ordering::Relaxed);
        }
    }

    /// Publish a new producer cursor, making all slots below it visible.
    pub fn publish_producer(&self, cursor: u32) {
        self.in_prod.store(cursor, Ordering::Release);
    }
}

impl Default for SharedPage {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(all(feature = "loom", test))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn slot_contents_visible_after_producer_publish() {
        loom::model(|| {
            let page = Arc::new(SharedPage::new());
            let producer = page.clone();

            let t = thread::spawn(move || {
                let mut words = [0u32; EVENT_WORDS];
                words[0] = 3;
                words[1] = 1;
                words[2] = 0x41;
                producer.write_slot(0, words);
                producer.publish_producer(1);
            });

            let in_prod = page.producer_cursor();
            if in_prod == 1 {
                let words = page.read_slot(0);
                assert_eq!(words[0], 3);
                assert_eq!(words[2], 0x41);
                page.advance_consumer(1);
            }

            t.join().unwrap();
        });
    }
}
