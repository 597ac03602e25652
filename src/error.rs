use core::fmt;
use thiserror::Error;

/// Returned when a queue cannot be built for the requested capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// A queue needs at least one slot.
    #[error("queue capacity must be at least 1")]
    Zero,
    /// The rounded capacity cannot be allocated as one buffer.
    #[error("requested capacity {requested} is too large")]
    TooLarge {
        /// The capacity that was asked for.
        requested: usize,
    },
}

/// The queue was full. Carries the rejected value back to the producer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
    /// Takes back the value that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> std::error::Error for PushError<T> {}
