//! Error types for queue construction and blocking operations.
//!
//! Protocol misuse (wrong element length, out-of-range queue index, unpaired
//! reserve/put) is a programmer error and panics instead of surfacing here.

use std::fmt;

use thiserror::Error;

/// Invalid queue configuration, reported before anything is allocated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A queue was configured with zero-byte elements.
    #[error("queue {queue}: element size must be non-zero")]
    ZeroElementSize {
        /// Index of the offending queue.
        queue: usize,
    },
    /// A queue was configured with no slots.
    #[error("queue {queue}: capacity must be non-zero")]
    ZeroCapacity {
        /// Index of the offending queue.
        queue: usize,
    },
    /// A queue was configured with a zero batch size.
    #[error("queue {queue}: batch size must be non-zero")]
    ZeroBatchSize {
        /// Index of the offending queue.
        queue: usize,
    },
    /// The slot layout does not fit in the address space.
    #[error("queue {queue}: buffer layout overflows ({capacity} slots of {slot_size} bytes)")]
    LayoutOverflow {
        /// Index of the offending queue.
        queue: usize,
        /// Requested slot count.
        capacity: usize,
        /// Requested bytes per slot.
        slot_size: usize,
    },
    /// The size and capacity arrays passed to an array-style init differ in length.
    #[error("{sizes} element sizes given for {capacities} capacities")]
    LengthMismatch {
        /// Length of the element size array.
        sizes: usize,
        /// Length of the capacity array.
        capacities: usize,
    },
    /// The size and batch size arrays passed to an array-style init differ in length.
    #[error("{sizes} element sizes given for {batch_sizes} batch sizes")]
    BatchLengthMismatch {
        /// Length of the element size array.
        sizes: usize,
        /// Length of the batch size array.
        batch_sizes: usize,
    },
}

/// Which end of a queue an operation or claim refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The writing end.
    Producer,
    /// The reading end.
    Consumer,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// Out-of-band control signal sent from producer to consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Downstream state reset.
    Reset,
    /// Drain barrier.
    Flush,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => f.write_str("reset"),
            Self::Flush => f.write_str("flush"),
        }
    }
}

/// Failure of a queue operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A blocking write hit its deadline before all elements were queued.
    #[error("timed out after queueing {transferred} element(s)")]
    TimedOut {
        /// Elements committed before the deadline.
        transferred: usize,
    },
    /// The consumer did not acknowledge a control signal before the deadline.
    #[error("timed out waiting for the consumer to acknowledge {signal}")]
    ControlTimedOut {
        /// The unacknowledged signal.
        signal: Signal,
    },
    /// The requested endpoint has already been handed out.
    #[error("{side} endpoint of queue {queue} already claimed")]
    AlreadyClaimed {
        /// Queue index.
        queue: usize,
        /// Which endpoint.
        side: Side,
    },
}
