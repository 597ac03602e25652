//! One-producer/one-consumer conformance driver.
//!
//! Pushes `0..count` through a queue from one thread and pops it on another,
//! folding every value into an order-sensitive [`RollingHash`] on both ends.
//! Equal hashes mean nothing was lost, duplicated or reordered. Retry policy
//! lives here, not in the queue: both sides snooze on a
//! [`crossbeam_utils::Backoff`] while the queue is full or empty, and give up
//! once the other handle has been dropped.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{channel, CapacityError, Consumer, Producer, PushError};

/// Order-sensitive digest: `digest = hash(value) ^ (digest << 1)`.
///
/// Values are hashed with a fixed-key hasher, so two instances fed the same
/// sequence agree across threads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollingHash {
    digest: u64,
}

impl RollingHash {
    /// Starts an empty digest.
    pub const fn new() -> Self {
        Self { digest: 0 }
    }

    /// Folds `value` into the digest.
    #[inline]
    pub fn update<V: Hash + ?Sized>(&mut self, value: &V) {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        self.digest = hasher.finish() ^ (self.digest << 1);
    }

    /// Current digest.
    pub const fn value(&self) -> u64 {
        self.digest
    }
}

/// Pushes `value`, snoozing while the queue is full.
///
/// # Errors
///
/// Hands `value` back if the consumer is dropped while the queue is full.
pub fn push_with_backoff<T>(producer: &Producer<T>, mut value: T) -> Result<(), PushError<T>> {
    let backoff = Backoff::new();
    loop {
        match producer.push(value) {
            Ok(()) => return Ok(()),
            Err(err) if producer.is_abandoned() => return Err(err),
            Err(PushError(rejected)) => {
                value = rejected;
                backoff.snooze();
            }
        }
    }
}

/// Pops the next value, snoozing while the queue is empty.
///
/// Returns `None` once the producer is dropped and the queue is drained.
pub fn pop_with_backoff<T>(consumer: &Consumer<T>) -> Option<T> {
    let backoff = Backoff::new();
    loop {
        if let Some(value) = consumer.pop() {
            return Some(value);
        }
        if consumer.is_abandoned() {
            // Everything pushed before the drop is visible now.
            return consumer.pop();
        }
        backoff.snooze();
    }
}

/// Errors from a transfer run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The queue could not be built.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    /// The queue reserves its only slot, so no value could ever pass.
    #[error("a queue of capacity {capacity} has no usable slot")]
    NoUsableSlot {
        /// Effective queue capacity.
        capacity: usize,
    },
    /// A worker thread could not be started.
    #[error("failed to spawn {role} thread")]
    Spawn {
        /// `"producer"` or `"consumer"`.
        role: &'static str,
        /// The OS error.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked.
    #[error("{role} thread panicked")]
    WorkerPanicked {
        /// `"producer"` or `"consumer"`.
        role: &'static str,
    },
    /// The consumer saw a different sequence than the producer sent.
    #[error("workers hash must be equal (producer {producer:#018x}, consumer {consumer:#018x})")]
    ChecksumMismatch {
        /// Digest of the pushed sequence.
        producer: u64,
        /// Digest of the popped sequence.
        consumer: u64,
    },
}

/// Parameters of one transfer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Requested queue capacity, rounded up to a power of two.
    pub capacity: usize,
    /// Number of values pushed, `0..count`.
    pub count: u64,
    /// CPU to pin the producer thread to.
    pub producer_cpu: Option<usize>,
    /// CPU to pin the consumer thread to.
    pub consumer_cpu: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            count: 10_000_000,
            producer_cpu: None,
            consumer_cpu: None,
        }
    }
}

/// Outcome of a run whose hashes matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Effective queue capacity.
    pub capacity: usize,
    /// Number of values transferred.
    pub count: u64,
    /// Digest of the pushed sequence.
    pub producer_hash: u64,
    /// Digest of the popped sequence.
    pub consumer_hash: u64,
    /// Time the producer spent pushing.
    pub producer_elapsed: Duration,
    /// Time the consumer spent popping.
    pub consumer_elapsed: Duration,
}

impl TransferReport {
    /// Wall time of the slower side.
    pub fn elapsed(&self) -> Duration {
        self.producer_elapsed.max(self.consumer_elapsed)
    }

    /// Values per second over [`elapsed`](Self::elapsed).
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.count as f64 / secs
    }

    /// Average nanoseconds per transferred value.
    pub fn nanos_per_op(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.elapsed().as_nanos() as f64 / self.count as f64
    }
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
            warn!(cpu = id, "failed to pin thread");
        }
    }
}

/// Runs one producer and one consumer over a fresh queue.
///
/// # Errors
///
/// See [`HarnessError`]. A hash mismatch is reported as
/// [`HarnessError::ChecksumMismatch`].
pub fn run_transfer(config: &TransferConfig) -> Result<TransferReport, HarnessError> {
    let (producer, consumer) = channel::<u64>(config.capacity)?;
    let capacity = producer.capacity();
    let count = config.count;
    if capacity < 2 && count > 0 {
        return Err(HarnessError::NoUsableSlot { capacity });
    }
    debug!(capacity, count, "starting transfer");

    let producer_cpu = config.producer_cpu;
    let consumer_cpu = config.consumer_cpu;

    let consumer_thread = thread::Builder::new()
        .name("spsc-consumer".into())
        .spawn(move || {
            pin_to_cpu(consumer_cpu);
            let mut hash = RollingHash::new();
            let started = Instant::now();
            for _ in 0..count {
                let Some(value) = pop_with_backoff(&consumer) else {
                    break;
                };
                hash.update(&value);
            }
            (hash.value(), started.elapsed())
        })
        .map_err(|source| HarnessError::Spawn { role: "consumer", source })?;

    let producer_thread = thread::Builder::new()
        .name("spsc-producer".into())
        .spawn(move || {
            pin_to_cpu(producer_cpu);
            let mut hash = RollingHash::new();
            let started = Instant::now();
            for i in 0..count {
                hash.update(&i);
                if push_with_backoff(&producer, i).is_err() {
                    break;
                }
            }
            (hash.value(), started.elapsed())
        })
        .map_err(|source| HarnessError::Spawn { role: "producer", source });
    let producer_thread = match producer_thread {
        Ok(handle) => handle,
        Err(err) => {
            // The unspawned closure dropped the producer, so the consumer
            // sees the queue abandoned and returns.
            let _ = consumer_thread.join();
            return Err(err);
        }
    };

    let producer_result = producer_thread.join();
    let consumer_result = consumer_thread.join();
    let (producer_hash, producer_elapsed) =
        producer_result.map_err(|_| HarnessError::WorkerPanicked { role: "producer" })?;
    let (consumer_hash, consumer_elapsed) =
        consumer_result.map_err(|_| HarnessError::WorkerPanicked { role: "consumer" })?;

    if producer_hash != consumer_hash {
        error!(producer_hash, consumer_hash, "hash mismatch");
        return Err(HarnessError::ChecksumMismatch {
            producer: producer_hash,
            consumer: consumer_hash,
        });
    }

    let report = TransferReport {
        capacity,
        count,
        producer_hash,
        consumer_hash,
        producer_elapsed,
        consumer_elapsed,
    };
    info!(
        producer_ms = producer_elapsed.as_millis() as u64,
        consumer_ms = consumer_elapsed.as_millis() as u64,
        "transfer finished"
    );
    Ok(report)
}

/// Repeats [`run_transfer`] `rounds` times, stopping at the first error.
///
/// # Errors
///
/// The first error any round returns.
pub fn run_rounds(config: &TransferConfig, rounds: usize) -> Result<Vec<TransferReport>, HarnessError> {
    (0..rounds)
        .map(|round| {
            let report = run_transfer(config)?;
            info!(
                round,
                throughput = report.throughput(),
                nanos_per_op = report.nanos_per_op(),
                "round finished"
            );
            Ok(report)
        })
        .collect()
}
