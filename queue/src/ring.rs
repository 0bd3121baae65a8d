//! Fixed-capacity SPSC ring. One thread pushes, one thread pulls; the
//! indices are the only shared state. `Acquire` on the opposite index and
//! `Release` on your own publishes slot contents without a lock.

use std::cell::UnsafeCell;

use portable_atomic::{AtomicUsize, Ordering};

/// Byte cost of an element, for queue level accounting.
pub trait Cost {
    fn cost(&self) -> usize;
}

pub struct Ring<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    /// Next slot to read. Owned by the consumer.
    head: AtomicUsize,
    /// Next slot to write. Owned by the producer.
    tail: AtomicUsize,
    level: AtomicUsize,
}

// Safety: only one producer touches `tail`-owned slots and only one
// consumer touches `head`-owned slots; publication is ordered by the
// Release stores below.
unsafe impl<T: Send> Sync for Ring<T> {}
unsafe impl<T: Send> Send for Ring<T> {}

impl<T: Cost> Ring<T> {
    /// `capacity` usable entries (one slot is kept empty to distinguish
    /// full from empty).
    pub fn new(capacity: usize) -> Self {
        let n = capacity + 1;
        let mut slots = Vec::with_capacity(n);
        for _ in 0..n {
            slots.push(UnsafeCell::new(None));
        }
        Ring {
            slots: slots.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            level: AtomicUsize::new(0),
        }
    }

    fn next(&self, i: usize) -> usize {
        let n = i + 1;
        if n == self.slots.len() {
            0
        } else {
            n
        }
    }

    /// Producer side. Returns false when the ring is full; the caller
    /// retries later.
    pub fn push(&self, item: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = self.next(tail);
        if next == self.head.load(Ordering::Acquire) {
            return false;
        }
        let cost = item.cost();
        unsafe {
            *self.slots[tail].get() = Some(item);
        }
        self.level.fetch_add(cost, Ordering::Relaxed);
        self.tail.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns up to `max_n` items in FIFO order; empty
    /// vec when the ring is empty.
    pub fn pull(&self, max_n: usize) -> Vec<T> {
        let mut out = Vec::new();
        let mut head = self.head.load(Ordering::Relaxed);
        while out.len() < max_n {
            if head == self.tail.load(Ordering::Acquire) {
                break;
            }
            let item = unsafe { (*self.slots[head].get()).take() };
            let item = match item {
                Some(i) => i,
                None => break, // unreachable with a single consumer
            };
            self.level.fetch_sub(item.cost(), Ordering::Relaxed);
            head = self.next(head);
            self.head.store(head, Ordering::Release);
            out.push(item);
        }
        out
    }

    /// Consumer side, single element.
    pub fn pull_one(&self) -> Option<T> {
        self.pull(1).into_iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Bytes between the read and write pointers.
    pub fn level(&self) -> usize {
        self.level.load(Ordering::Relaxed)
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if tail >= head {
            tail - head
        } else {
            tail + self.slots.len() - head
        }
    }
}
