//! Lock-free single-producer single-consumer ring buffer
//!
//! Values move from exactly one producer to exactly one consumer without
//! either side ever blocking; a full ring rejects the push and hands the
//! value back. The single-producer single-consumer contract is enforced by
//! the handle types themselves: [`Producer`] and [`Consumer`] cannot be
//! cloned and their operations take `&mut self`, so a second concurrent
//! pusher or popper cannot be constructed in safe code.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Ring<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    /// Next write position; advanced only by the producer.
    head: AtomicUsize,
    /// Next read position; advanced only by the consumer.
    tail: AtomicUsize,
}

// Safety: a slot is written by the producer strictly before the release
// store that publishes it and read by the consumer strictly after the
// matching acquire load, so the two sides never touch a slot at the same
// time.
unsafe impl<T: Send> Sync for Ring<T> {}

/// Sending half of the channel.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

/// Receiving half of the channel.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

/// Create a bounded channel with at least `capacity` slots.
///
/// The capacity is rounded up to a power of two with a floor of two, so
/// index masking stays a single AND.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let cap = capacity.max(2).next_power_of_two();
    let slots = (0..cap)
        .map(|_| UnsafeCell::new(None))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let ring = Arc::new(Ring {
        slots,
        mask: cap - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        Producer {
            ring: Arc::clone(&ring),
        },
        Consumer { ring },
    )
}

impl<T> Producer<T> {
    /// Move `value` into the ring.
    ///
    /// Returns `Err(value)` without blocking when the ring is full; the
    /// value comes back so the caller decides whether to drop or retry.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= ring.slots.len() {
            return Err(value);
        }

        // Safety: the capacity check above proves the consumer has moved
        // past this slot, and it will not read it again until the release
        // store below publishes the new head.
        unsafe {
            *ring.slots[head & ring.mask].get() = Some(value);
        }
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}

impl<T> Consumer<T> {
    /// Take the oldest value, if any. Never blocks.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }

        // Safety: the acquire load of head orders this read after the
        // producer's release store for the slot, and the producer will not
        // reuse the slot until tail advances past it.
        let value = unsafe { (*ring.slots[tail & ring.mask].get()).take() };
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        value
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}
