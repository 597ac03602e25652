//! turbo_spsc - Bounded lock-free single-producer single-consumer ring buffer
//!
//! Two cursors, one writer each: the producer owns `tail`, the consumer owns
//! `head`. Each side reads its own cursor relaxed, acquires the other side's
//! cursor, and publishes its own with a release store after touching the slot.
//! One slot always stays empty so `head == tail` means empty and
//! `(tail + 1) & mask == head` means full.
//!
//! ```
//! let (tx, rx) = turbo_spsc::channel::<u32>(1000).unwrap();
//! assert_eq!(tx.capacity(), 1024);
//!
//! tx.push(1).unwrap();
//! tx.push(2).unwrap();
//! assert_eq!(rx.pop(), Some(1));
//! assert_eq!(rx.pop(), Some(2));
//! assert_eq!(rx.pop(), None);
//! ```
#![warn(missing_docs)]

mod error;
#[cfg(not(loom))]
pub mod harness;
mod sync;

pub use error::{CapacityError, PushError};

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};

use crossbeam_utils::CachePadded;

use crate::sync::{Arc, AtomicBool, AtomicUsize, Ordering, UnsafeCell};

/// Upper bound on slots for zero-sized `T`, where the byte limit never bites.
const MAX_ZST_CAPACITY: usize = 1 << 24;

/// Fixed-capacity SPSC queue.
///
/// Pushing and popping through a shared reference is `unsafe` because the
/// single-producer and single-consumer roles cannot be checked at runtime.
/// [`BoundedSpscQueue::split`] or [`channel`] hand out [`Producer`] and
/// [`Consumer`] handles that enforce the roles through the type system.
pub struct BoundedSpscQueue<T> {
    /// Next slot to read. Written only by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Next slot to write. Written only by the producer.
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    producer_dropped: AtomicBool,
    consumer_dropped: AtomicBool,
}

unsafe impl<T: Send> Send for BoundedSpscQueue<T> {}
unsafe impl<T: Send> Sync for BoundedSpscQueue<T> {}

impl<T> BoundedSpscQueue<T> {
    /// Creates a queue with `requested` rounded up to the next power of two.
    ///
    /// One slot is reserved, so the queue holds at most `capacity() - 1`
    /// values. A request of 1 therefore builds a queue that is always full.
    ///
    /// # Errors
    ///
    /// [`CapacityError::Zero`] for a request of 0, and
    /// [`CapacityError::TooLarge`] when the rounded capacity does not fit in
    /// memory addressable by a single allocation (or, for zero-sized `T`,
    /// exceeds 2^24 slots).
    pub fn new(requested: usize) -> Result<Self, CapacityError> {
        if requested == 0 {
            return Err(CapacityError::Zero);
        }

        let capacity = requested
            .checked_next_power_of_two()
            .ok_or(CapacityError::TooLarge { requested })?;
        let limit = match mem::size_of::<T>() {
            0 => MAX_ZST_CAPACITY,
            size => isize::MAX as usize / size,
        };
        if capacity > limit {
            return Err(CapacityError::TooLarge { requested });
        }

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer,
            mask: capacity - 1,
            producer_dropped: AtomicBool::new(false),
            consumer_dropped: AtomicBool::new(false),
        })
    }

    /// Moves `value` into the queue, or hands it back if the queue is full.
    ///
    /// # Errors
    ///
    /// `Err(PushError(value))` when `capacity() - 1` values are enqueued.
    ///
    /// # Safety
    ///
    /// At most one thread may ever push into a given queue.
    #[inline]
    pub unsafe fn push(&self, value: T) -> Result<(), PushError<T>> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & self.mask;

        if next == self.head.load(Ordering::Acquire) {
            return Err(PushError(value));
        }

        // SAFETY: the consumer released this slot before publishing a head
        // past it, and the acquire load above observed that publication.
        self.buffer[tail].with_mut(|slot| unsafe {
            (*slot).write(value);
        });
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Moves the oldest value out of the queue, or returns `None` if empty.
    ///
    /// # Safety
    ///
    /// At most one thread may ever pop from a given queue.
    #[inline]
    pub unsafe fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the producer initialized this slot before publishing a tail
        // past it, and the acquire load above observed that publication.
        let value = self.buffer[head].with(|slot| unsafe { (*slot).assume_init_read() });
        self.head.store((head + 1) & self.mask, Ordering::Release);
        Some(value)
    }

    /// Splits the queue into its producer and consumer handles.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let queue = Arc::new(self);
        (
            Producer {
                queue: Arc::clone(&queue),
                _not_sync: PhantomData,
            },
            Consumer {
                queue,
                _not_sync: PhantomData,
            },
        )
    }

    /// Number of slots, always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Largest number of values the queue can hold at once.
    #[inline]
    pub fn usable_capacity(&self) -> usize {
        self.mask
    }

    /// Number of enqueued values. A snapshot when the other side is active.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask
    }

    /// Returns `true` if nothing is enqueued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the next push would be rejected.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.mask
    }
}

impl<T> fmt::Debug for BoundedSpscQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSpscQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Drop for BoundedSpscQueue<T> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }

        let mut head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        while head != tail {
            // SAFETY: every slot in head..tail holds an initialized value.
            self.buffer[head].with_mut(|slot| unsafe { (*slot).assume_init_drop() });
            head = (head + 1) & self.mask;
        }
    }
}

/// Creates a queue and splits it into its two role handles.
///
/// # Errors
///
/// See [`BoundedSpscQueue::new`].
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    BoundedSpscQueue::new(capacity).map(BoundedSpscQueue::split)
}

/// The pushing half of a queue.
///
/// Can be moved to another thread but not shared or cloned, so only one
/// thread ever pushes.
pub struct Producer<T> {
    queue: Arc<BoundedSpscQueue<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Producer<T> {
    /// Moves `value` into the queue, or hands it back if the queue is full.
    ///
    /// Never blocks; retrying is up to the caller.
    ///
    /// # Errors
    ///
    /// `Err(PushError(value))` when the queue is full.
    #[inline]
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        // SAFETY: this handle is the queue's only producer and is not Sync.
        unsafe { self.queue.push(value) }
    }

    /// See [`BoundedSpscQueue::capacity`].
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// See [`BoundedSpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// See [`BoundedSpscQueue::is_empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// See [`BoundedSpscQueue::is_full`].
    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Returns `true` once the [`Consumer`] has been dropped. Nothing pushed
    /// after that point will ever be popped.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.queue.consumer_dropped.load(Ordering::Acquire)
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.queue.producer_dropped.store(true, Ordering::Release);
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Producer").field(&self.queue).finish()
    }
}

/// The popping half of a queue.
///
/// Can be moved to another thread but not shared or cloned, so only one
/// thread ever pops.
pub struct Consumer<T> {
    queue: Arc<BoundedSpscQueue<T>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T> Consumer<T> {
    /// Moves the oldest value out of the queue, or returns `None` if empty.
    ///
    /// Never blocks; retrying is up to the caller.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: this handle is the queue's only consumer and is not Sync.
        unsafe { self.queue.pop() }
    }

    /// See [`BoundedSpscQueue::capacity`].
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// See [`BoundedSpscQueue::len`].
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// See [`BoundedSpscQueue::is_empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns `true` once the [`Producer`] has been dropped.
    ///
    /// Every value it pushed is visible after this returns `true`, so a
    /// `None` from the next [`pop`](Self::pop) means the stream has ended.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.queue.producer_dropped.load(Ordering::Acquire)
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.queue.consumer_dropped.store(true, Ordering::Release);
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Consumer").field(&self.queue).finish()
    }
}
