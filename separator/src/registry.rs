//! Handle-addressed set of thread separators.
//!
//! A pipeline creates every queue it needs once at startup and then refers to
//! them by a zero-based integer id. The registry owns the queues; each
//! queue's [`Producer`] and [`Consumer`] are handed out exactly once and moved
//! to the threads that drive them.
//!
//! ```
//! use separator::config::QueueConfig;
//! use separator::registry::Registry;
//!
//! let registry = Registry::new(&QueueConfig::uniform(2, 4, 16))?;
//! let (mut tx, mut rx) = registry.endpoints(1)?;
//!
//! tx.put_value(42i32)?;
//! assert_eq!(rx.get_value::<i32>(), Some(42));
//! assert!(registry.producer(1).is_err());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Buffers are freed once the registry and both endpoints of a queue are
//! dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{self, QueueConfig};
use crate::error::{ConfigError, QueueError, Side};
use crate::spsc::ring::Ring;
use crate::sync::spsc::{Consumer, ConsumerStats, Producer, ProducerStats};
use crate::trace::{debug, info};

struct Entry {
    ring: Arc<Ring>,
    config: QueueConfig,
    producer_claimed: AtomicBool,
    consumer_claimed: AtomicBool,
}

impl Entry {
    fn claim(&self, queue: usize, side: Side) -> Result<(), QueueError> {
        let flag = match side {
            Side::Producer => &self.producer_claimed,
            Side::Consumer => &self.consumer_claimed,
        };
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueueError::AlreadyClaimed { queue, side })?;
        debug!(queue, %side, "endpoint claimed");
        Ok(())
    }
}

/// Fixed set of thread separators created at startup.
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// Allocates one queue per configuration; queue `i` is addressed by id `i`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the first invalid configuration. Nothing
    /// stays allocated on error.
    pub fn new(configs: &[QueueConfig]) -> Result<Self, ConfigError> {
        let entries = configs
            .iter()
            .enumerate()
            .map(|(queue, config)| {
                let ring = Ring::new(config, queue)?;
                debug!(
                    queue,
                    element_size = config.element_size,
                    batch_size = config.batch_size,
                    capacity = config.capacity,
                    "queue allocated"
                );
                Ok(Entry {
                    ring: Arc::new(ring),
                    config: *config,
                    producer_claimed: AtomicBool::new(false),
                    consumer_claimed: AtomicBool::new(false),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        info!(queues = entries.len(), "thread separator registry created");
        Ok(Self { entries })
    }

    /// Array-style construction: element sizes per queue, with optional
    /// per-queue capacities (default [`DEFAULT_CAPACITY`](config::DEFAULT_CAPACITY)).
    /// Every queue gets a batch size of one; see
    /// [`from_batched_sizes`](Self::from_batched_sizes).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LengthMismatch`] if both arrays are given with
    /// different lengths, or the first per-queue validation failure.
    pub fn from_sizes(sizes: &[usize], capacities: Option<&[usize]>) -> Result<Self, ConfigError> {
        Self::from_batched_sizes(sizes, capacities, None)
    }

    /// [`from_sizes`](Self::from_sizes) with optional per-queue batch sizes;
    /// queue `i` then moves `sizes[i] * batch_sizes[i]` bytes per slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LengthMismatch`] or
    /// [`ConfigError::BatchLengthMismatch`] if a given array's length differs
    /// from `sizes`, or the first per-queue validation failure.
    pub fn from_batched_sizes(
        sizes: &[usize],
        capacities: Option<&[usize]>,
        batch_sizes: Option<&[usize]>,
    ) -> Result<Self, ConfigError> {
        let pairs = config::zip_sizes(sizes, capacities)?;
        let configs: Vec<QueueConfig> = match batch_sizes {
            None => pairs
                .into_iter()
                .map(|(element_size, capacity)| QueueConfig::new(element_size, capacity))
                .collect(),
            Some(batches) if batches.len() == sizes.len() => pairs
                .into_iter()
                .zip(batches)
                .map(|((element_size, capacity), &batch)| {
                    QueueConfig::new(element_size, capacity).with_batch_size(batch)
                })
                .collect(),
            Some(batches) => {
                return Err(ConfigError::BatchLengthMismatch {
                    sizes: sizes.len(),
                    batch_sizes: batches.len(),
                });
            }
        };
        Self::new(&configs)
    }

    /// Number of queues.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[track_caller]
    fn entry(&self, queue: usize) -> &Entry {
        match self.entries.get(queue) {
            Some(entry) => entry,
            None => panic!(
                "queue index {queue} out of range: registry holds queues 0..{}",
                self.entries.len()
            ),
        }
    }

    /// Configuration queue `queue` was created with.
    ///
    /// # Panics
    ///
    /// Panics if `queue` is out of range.
    #[track_caller]
    pub fn config(&self, queue: usize) -> &QueueConfig {
        &self.entry(queue).config
    }

    /// Hands out the write end of queue `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyClaimed`] on every call after the first.
    ///
    /// # Panics
    ///
    /// Panics if `queue` is out of range.
    #[track_caller]
    pub fn producer(&self, queue: usize) -> Result<Producer, QueueError> {
        let entry = self.entry(queue);
        entry.claim(queue, Side::Producer)?;
        Ok(Producer::new(Arc::clone(&entry.ring), queue, &entry.config))
    }

    /// Hands out the read end of queue `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyClaimed`] on every call after the first.
    ///
    /// # Panics
    ///
    /// Panics if `queue` is out of range.
    #[track_caller]
    pub fn consumer(&self, queue: usize) -> Result<Consumer, QueueError> {
        let entry = self.entry(queue);
        entry.claim(queue, Side::Consumer)?;
        Ok(Consumer::new(Arc::clone(&entry.ring), queue, &entry.config))
    }

    /// Hands out both ends of queue `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyClaimed`] if either end was already
    /// handed out; a producer claimed by this call stays claimed.
    ///
    /// # Panics
    ///
    /// Panics if `queue` is out of range.
    #[track_caller]
    pub fn endpoints(&self, queue: usize) -> Result<(Producer, Consumer), QueueError> {
        Ok((self.producer(queue)?, self.consumer(queue)?))
    }

    /// Point-in-time check that the producer of `queue` would have to wait.
    #[track_caller]
    pub fn is_full(&self, queue: usize) -> bool {
        self.entry(queue).ring.is_full()
    }

    /// Point-in-time check that `queue` holds no readable element.
    #[track_caller]
    pub fn is_empty_queue(&self, queue: usize) -> bool {
        self.entry(queue).ring.is_empty()
    }

    /// Returns `true` once the producer of `queue` has raised end-of-stream.
    #[track_caller]
    pub fn is_finished(&self, queue: usize) -> bool {
        self.entry(queue).ring.is_finished()
    }

    #[track_caller]
    pub fn producer_stats(&self, queue: usize) -> ProducerStats {
        self.entry(queue).ring.producer_stats()
    }

    #[track_caller]
    pub fn consumer_stats(&self, queue: usize) -> ConsumerStats {
        self.entry(queue).ring.consumer_stats()
    }

    /// Discards everything in `queue`: all slots become free and every cursor
    /// moves to the read position.
    ///
    /// # Safety
    ///
    /// Neither endpoint of `queue` may be inside any queue operation, and no
    /// slice returned by `reserve` or `acquire` may still be alive.
    #[track_caller]
    pub unsafe fn clear(&self, queue: usize) {
        // SAFETY: forwarded to the caller.
        unsafe { self.entry(queue).ring.clear() };
        debug!(queue, "queue cleared");
    }

    /// Un-reads up to `n` elements of `queue`. See [`Consumer::rollback`].
    ///
    /// # Safety
    ///
    /// Neither endpoint of `queue` may be inside any queue operation.
    #[track_caller]
    pub unsafe fn rollback(&self, queue: usize, n: usize) -> usize {
        // SAFETY: forwarded to the caller.
        let restored = unsafe { self.entry(queue).ring.rollback(n) };
        debug!(queue, requested = n, restored, "registry rollback");
        restored
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("queues", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sizes_defaults_capacity() {
        let registry = Registry::from_sizes(&[4, 8], None).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.config(0).capacity, config::DEFAULT_CAPACITY);
        assert_eq!(registry.config(1).element_size, 8);
    }

    #[test]
    fn test_invalid_config_names_queue() {
        let configs = [QueueConfig::new(4, 8), QueueConfig::new(0, 8)];
        assert_eq!(
            Registry::new(&configs).err(),
            Some(ConfigError::ZeroElementSize { queue: 1 })
        );
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            Registry::from_sizes(&[4, 4], Some(&[8])).err(),
            Some(ConfigError::LengthMismatch {
                sizes: 2,
                capacities: 1
            })
        );
    }

    #[test]
    fn test_batched_sizes_widen_slots() {
        let registry = Registry::from_batched_sizes(&[4, 2], Some(&[8, 8]), Some(&[3, 1])).unwrap();
        assert_eq!(registry.config(0).slot_size(), 12);
        assert_eq!(registry.config(1).slot_size(), 2);

        let (mut tx, mut rx) = registry.endpoints(0).unwrap();
        assert_eq!(tx.slot_size(), 12);
        tx.put_value([1u32, 2, 3]).unwrap();
        assert_eq!(rx.get_value::<[u32; 3]>(), Some([1, 2, 3]));
    }

    #[test]
    fn test_batch_length_mismatch() {
        assert_eq!(
            Registry::from_batched_sizes(&[4, 4], None, Some(&[2])).err(),
            Some(ConfigError::BatchLengthMismatch {
                sizes: 2,
                batch_sizes: 1
            })
        );
        assert_eq!(
            Registry::from_batched_sizes(&[4], None, Some(&[0])).err(),
            Some(ConfigError::ZeroBatchSize { queue: 0 })
        );
    }

    #[test]
    fn test_endpoints_handed_out_once() {
        let registry = Registry::from_sizes(&[4], Some(&[4])).unwrap();
        let _tx = registry.producer(0).unwrap();
        assert_eq!(
            registry.producer(0).err(),
            Some(QueueError::AlreadyClaimed {
                queue: 0,
                side: Side::Producer
            })
        );
        let _rx = registry.consumer(0).unwrap();
        assert!(registry.endpoints(0).is_err());
    }

    #[test]
    #[should_panic(expected = "queue index 3 out of range: registry holds queues 0..2")]
    fn test_out_of_range_panics_with_range() {
        let registry = Registry::from_sizes(&[4, 4], None).unwrap();
        let _ = registry.is_full(3);
    }

    #[test]
    fn test_observations_through_registry() {
        let registry = Registry::from_sizes(&[4], Some(&[2])).unwrap();
        let (mut tx, _rx) = registry.endpoints(0).unwrap();
        assert!(registry.is_empty_queue(0));

        tx.put_value(1i32).unwrap();
        tx.put_value(2i32).unwrap();
        assert!(registry.is_full(0));
        assert!(!registry.is_empty_queue(0));
        assert_eq!(registry.producer_stats(0).committed, 2);

        tx.finish();
        assert!(registry.is_finished(0));
    }

    #[test]
    fn test_clear_and_rollback_through_registry() {
        let registry = Registry::from_sizes(&[4], Some(&[4])).unwrap();
        let (mut tx, mut rx) = registry.endpoints(0).unwrap();
        for v in 1..=3i32 {
            tx.put_value(v).unwrap();
        }
        assert_eq!(rx.get_value::<i32>(), Some(1));
        assert_eq!(unsafe { registry.rollback(0, 1) }, 1);
        assert_eq!(rx.get_value::<i32>(), Some(1));

        unsafe { registry.clear(0) };
        assert!(registry.is_empty_queue(0));
        assert_eq!(rx.get_value::<i32>(), None);
        tx.put_value(9i32).unwrap();
        assert_eq!(rx.get_value::<i32>(), Some(9));
    }
}
