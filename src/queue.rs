//! `BoundedQueue`: an O(1) ring-buffer FIFO with a configurable overflow
//! policy (spec.md §4.2).

use crate::domain_types::QueueCapacity;
use crate::error::QueueError;

/// What happens when [`BoundedQueue::enqueue`] is called on a full queue.
///
/// spec.md §9 leaves a `block` policy as an open question — documented
/// upstream but never actually implemented as true blocking. This crate
/// preserves that: only the three policies that are actually exercised are
/// offered (see DESIGN.md "Open Question decisions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OverflowPolicy {
    /// Evict the oldest element to make room for the new one.
    DropOldest,
    /// Reject the new element, leaving the queue unchanged.
    DropNewest,
    /// Reject the new element and return [`QueueError::QueueFull`].
    Error,
}

/// A fixed-capacity ring buffer. All operations are O(1) and no allocation
/// occurs after construction — the backing `Vec` is sized once, up front.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    buffer: Vec<Option<T>>,
    capacity: usize,
    head: usize,
    tail: usize,
    size: usize,
    policy: OverflowPolicy,
    /// Incremented on every enqueue that lands on an already-full queue:
    /// an eviction under `DropOldest`, a rejection under `DropNewest`, or a
    /// raised error under `Error` (spec.md §4.2's `queueFull` callback
    /// contract, confirmed by the exact counts in spec.md §8 scenario 2).
    queue_full_events: u64,
}

impl<T> BoundedQueue<T> {
    /// Creates a new queue with the given capacity and overflow policy.
    #[must_use]
    pub fn new(capacity: QueueCapacity, policy: OverflowPolicy) -> Self {
        let capacity = capacity.as_usize();
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);
        Self {
            buffer,
            capacity,
            head: 0,
            tail: 0,
            size: 0,
            policy,
            queue_full_events: 0,
        }
    }

    /// The queue's fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of elements currently queued. Always `0 <= size <= capacity`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the queue holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the queue is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// The queue's overflow policy.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// How many times the `queueFull` condition has fired over this
    /// queue's lifetime (spec.md §4.2).
    #[must_use]
    pub fn queue_full_event_count(&self) -> u64 {
        self.queue_full_events
    }

    /// Inserts `item` at the tail, applying the overflow policy if the
    /// queue is already full.
    ///
    /// Returns `Ok(true)` if the item was enqueued, `Ok(false)` if it was
    /// silently rejected under `DropNewest`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::QueueFull`] under the `Error` policy when the
    /// queue is already full.
    pub fn enqueue(&mut self, item: T) -> Result<bool, QueueError> {
        if self.capacity == 0 {
            return Err(QueueError::QueueFull { capacity: 0 });
        }

        if self.size < self.capacity {
            self.buffer[self.tail] = Some(item);
            self.tail = (self.tail + 1) % self.capacity;
            self.size += 1;
            // Reaching capacity is not itself an overflow: `queueFull` only
            // fires when an enqueue actually has to evict or reject.
            return Ok(true);
        }

        match self.policy {
            OverflowPolicy::DropOldest => {
                // Already full: evict oldest, then write at tail.
                self.head = (self.head + 1) % self.capacity;
                self.buffer[self.tail] = Some(item);
                self.tail = (self.tail + 1) % self.capacity;
                self.queue_full_events += 1;
                Ok(true)
            }
            OverflowPolicy::DropNewest => {
                self.queue_full_events += 1;
                Ok(false)
            }
            OverflowPolicy::Error => {
                self.queue_full_events += 1;
                Err(QueueError::QueueFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Removes and returns the element at the head, or `None` if empty.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        let item = self.buffer[self.head].take();
        self.head = (self.head + 1) % self.capacity;
        self.size -= 1;
        item
    }

    /// Returns a reference to the head element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.size == 0 {
            None
        } else {
            self.buffer[self.head].as_ref()
        }
    }

    /// Iterates the queued elements oldest-first, without dequeuing.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.size).map(move |offset| {
            let idx = (self.head + offset) % self.capacity;
            self.buffer[idx]
                .as_ref()
                .expect("every slot within size must be occupied")
        })
    }
}
