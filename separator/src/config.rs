//! Queue configuration.
//!
//! A pipeline is described by one [`QueueConfig`] per thread separator (or
//! one [`LocalConfig`] per single-thread queue). Configurations are plain
//! data and serde-serializable so a pipeline layout can be shipped alongside
//! the generated stage code.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::wait::{Backoff, Timeout};

/// Slot count used when a capacity is not specified.
pub const DEFAULT_CAPACITY: usize = 64;

/// Size in bytes of a cache line on the targets this crate is tuned for.
pub const CACHE_LINE: usize = 64;

/// Configuration of one thread-separator queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Bytes per logical element.
    pub element_size: usize,
    /// Number of slots.
    pub capacity: usize,
    /// Elements grouped into one slot. Every element operation moves
    /// `element_size * batch_size` bytes.
    pub batch_size: usize,
    /// What blocked callers do between polls.
    pub backoff: Backoff,
    /// Upper bound on every blocking operation.
    pub timeout: Timeout,
}

impl QueueConfig {
    /// A queue of `capacity` slots holding one `element_size`-byte element each.
    #[must_use]
    pub const fn new(element_size: usize, capacity: usize) -> Self {
        Self {
            element_size,
            capacity,
            batch_size: 1,
            backoff: Backoff::Spin,
            timeout: Timeout::Infinite,
        }
    }

    /// `count` identical queue configurations.
    #[must_use]
    pub fn uniform(count: usize, element_size: usize, capacity: usize) -> Vec<Self> {
        vec![Self::new(element_size, capacity); count]
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bytes moved by one element operation.
    ///
    /// Saturates on overflow; [`validate`](Self::validate) rejects such configs.
    #[must_use]
    pub const fn slot_size(&self) -> usize {
        self.element_size.saturating_mul(self.batch_size)
    }

    /// Distance between consecutive slots in the thread-separator buffer: one
    /// cache line for the slot flag followed by the payload rounded up to a
    /// whole number of cache lines.
    pub(crate) fn slot_stride(&self) -> Option<usize> {
        let payload = self.element_size.checked_mul(self.batch_size)?;
        let lines = payload.checked_add(CACHE_LINE - 1)? / CACHE_LINE;
        lines.checked_add(1)?.checked_mul(CACHE_LINE)
    }

    /// Checks the configuration of the queue at index `queue`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self, queue: usize) -> Result<(), ConfigError> {
        if self.element_size == 0 {
            return Err(ConfigError::ZeroElementSize { queue });
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity { queue });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize { queue });
        }
        let fits = self
            .slot_stride()
            .and_then(|stride| stride.checked_mul(self.capacity))
            .is_some_and(|bytes| bytes <= isize::MAX as usize);
        if !fits {
            return Err(ConfigError::LayoutOverflow {
                queue,
                capacity: self.capacity,
                slot_size: self.slot_size(),
            });
        }
        Ok(())
    }
}

/// Configuration of one single-thread ring queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Bytes per element.
    pub element_size: usize,
    /// Number of elements.
    pub capacity: usize,
}

impl LocalConfig {
    #[must_use]
    pub const fn new(element_size: usize, capacity: usize) -> Self {
        Self {
            element_size,
            capacity,
        }
    }

    /// Checks the configuration of the queue at index `queue`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self, queue: usize) -> Result<(), ConfigError> {
        if self.element_size == 0 {
            return Err(ConfigError::ZeroElementSize { queue });
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity { queue });
        }
        match self.element_size.checked_mul(self.capacity) {
            Some(bytes) if bytes <= isize::MAX as usize => Ok(()),
            _ => Err(ConfigError::LayoutOverflow {
                queue,
                capacity: self.capacity,
                slot_size: self.element_size,
            }),
        }
    }
}

/// Zips parallel size/capacity arrays into configs, the shape of the
/// array-based init calls. A missing capacity array means
/// [`DEFAULT_CAPACITY`] for every queue.
pub(crate) fn zip_sizes(
    sizes: &[usize],
    capacities: Option<&[usize]>,
) -> Result<Vec<(usize, usize)>, ConfigError> {
    match capacities {
        None => Ok(sizes.iter().map(|&s| (s, DEFAULT_CAPACITY)).collect()),
        Some(caps) if caps.len() == sizes.len() => {
            Ok(sizes.iter().copied().zip(caps.iter().copied()).collect())
        }
        Some(caps) => Err(ConfigError::LengthMismatch {
            sizes: sizes.len(),
            capacities: caps.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_stride_reserves_flag_line() {
        assert_eq!(QueueConfig::new(4, 8).slot_stride(), Some(128));
        assert_eq!(QueueConfig::new(64, 8).slot_stride(), Some(128));
        assert_eq!(QueueConfig::new(65, 8).slot_stride(), Some(192));
        assert_eq!(QueueConfig::new(4, 8).with_batch_size(32).slot_stride(), Some(192));
    }

    #[test]
    fn test_validate_rejects_zero_fields() {
        assert_eq!(
            QueueConfig::new(0, 4).validate(3),
            Err(ConfigError::ZeroElementSize { queue: 3 })
        );
        assert_eq!(
            QueueConfig::new(4, 0).validate(1),
            Err(ConfigError::ZeroCapacity { queue: 1 })
        );
        assert_eq!(
            QueueConfig::new(4, 4).with_batch_size(0).validate(0),
            Err(ConfigError::ZeroBatchSize { queue: 0 })
        );
        assert!(LocalConfig::new(0, 1).validate(0).is_err());
    }

    #[test]
    fn test_validate_rejects_overflow() {
        let config = QueueConfig::new(usize::MAX / 2, 4);
        assert!(matches!(
            config.validate(0),
            Err(ConfigError::LayoutOverflow { queue: 0, .. })
        ));
        assert!(LocalConfig::new(usize::MAX, 2).validate(0).is_err());
    }

    #[test]
    fn test_zip_defaults_capacity() {
        assert_eq!(
            zip_sizes(&[4, 8], None).unwrap(),
            vec![(4, DEFAULT_CAPACITY), (8, DEFAULT_CAPACITY)]
        );
        assert_eq!(
            zip_sizes(&[4], Some(&[1, 2])),
            Err(ConfigError::LengthMismatch {
                sizes: 1,
                capacities: 2
            })
        );
    }

    #[test]
    fn test_config_survives_postcard() {
        let config = QueueConfig::new(16, 32)
            .with_batch_size(4)
            .with_backoff(Backoff::SpinThenYield { spins: 100 })
            .with_timeout(Duration::from_millis(250).into());
        let bytes = postcard::to_allocvec(&config).unwrap();
        let decoded: QueueConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
