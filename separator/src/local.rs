//! Single-thread ring queues.
//!
//! Same element contract as the thread separator, for a producer and a
//! consumer interleaved on one thread (adjacent stages of a compiled
//! pipeline calling each other synchronously). There is no synchronization:
//! a plain byte buffer, two cursors and an occupancy count.
//!
//! Overflow, underflow and over-long rollbacks are programmer errors. They
//! panic when `debug_assertions` or the `checks` feature is on. With checks
//! compiled out the queue stays memory-safe (cursors are always reduced
//! modulo capacity) and misuse within one capacity's worth of elements
//! silently corrupts its contents. A bulk call moving more elements than the
//! capacity panics in either mode.

use std::ops::{Index, IndexMut};

use crate::bits;
use crate::config::{self, LocalConfig};
use crate::error::ConfigError;
use crate::sample::{self, Sample};
use crate::trace::debug;

const CHECKS: bool = cfg!(any(debug_assertions, feature = "checks"));

macro_rules! check {
    ($cond:expr, $($arg:tt)+) => {
        if CHECKS {
            assert!($cond, $($arg)+);
        }
    };
}

/// Fixed-capacity FIFO of `element_size`-byte elements.
#[derive(Debug, Clone)]
pub struct LocalQueue {
    buf: Vec<u8>,
    element_size: usize,
    capacity: usize,
    size: usize,
    next_write: usize,
    next_read: usize,
}

impl LocalQueue {
    /// # Errors
    ///
    /// Returns [`ConfigError`] on zero element size, zero capacity or a
    /// buffer that does not fit in memory.
    pub fn new(config: &LocalConfig) -> Result<Self, ConfigError> {
        Self::with_index(config, 0)
    }

    fn with_index(config: &LocalConfig, queue: usize) -> Result<Self, ConfigError> {
        config.validate(queue)?;
        Ok(Self {
            buf: vec![0; config.element_size * config.capacity],
            element_size: config.element_size,
            capacity: config.capacity,
            size: 0,
            next_write: 0,
            next_read: 0,
        })
    }

    #[inline]
    pub const fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.size >= self.capacity
    }

    /// Slots available for writing, which is also the rollback limit.
    #[inline]
    pub const fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.size)
    }

    #[inline]
    fn slot(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.element_size;
        start..start + self.element_size
    }

    #[inline]
    const fn advance(&self, index: usize, n: usize) -> usize {
        (index + n % self.capacity) % self.capacity
    }

    /// Exposes the next write slot for in-place filling, or `None` if full.
    /// Nothing is queued until [`push`](Self::push).
    #[inline]
    pub fn reserve(&mut self) -> Option<&mut [u8]> {
        if self.is_full() {
            return None;
        }
        let range = self.slot(self.next_write);
        Some(&mut self.buf[range])
    }

    /// Queues the slot last exposed by [`reserve`](Self::reserve).
    ///
    /// # Panics
    ///
    /// Panics on a full queue when checks are enabled.
    #[inline]
    #[track_caller]
    pub fn push(&mut self) {
        check!(!self.is_full(), "push on a full queue ({} slots)", self.capacity);
        self.next_write = self.advance(self.next_write, 1);
        self.size += 1;
    }

    /// Exposes the oldest element for in-place reading, or `None` if empty.
    /// It stays queued until [`release`](Self::release).
    #[inline]
    pub fn acquire(&self) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        Some(&self.buf[self.slot(self.next_read)])
    }

    /// Dequeues the oldest element.
    ///
    /// # Panics
    ///
    /// Panics on an empty queue when checks are enabled.
    #[inline]
    #[track_caller]
    pub fn release(&mut self) {
        check!(!self.is_empty(), "release on an empty queue");
        self.next_read = self.advance(self.next_read, 1);
        self.size = self.size.saturating_sub(1);
    }

    /// Copies one element in.
    ///
    /// # Panics
    ///
    /// Panics if `element` is not one element long, or on a full queue when
    /// checks are enabled.
    #[inline]
    #[track_caller]
    pub fn put(&mut self, element: &[u8]) {
        check!(!self.is_full(), "put on a full queue ({} slots)", self.capacity);
        let range = self.slot(self.next_write);
        self.buf[range].copy_from_slice(element);
        self.next_write = self.advance(self.next_write, 1);
        self.size += 1;
    }

    /// Copies consecutive elements in with at most two contiguous copies.
    ///
    /// # Panics
    ///
    /// Panics if `elements` is not a whole number of elements or exceeds the
    /// capacity, or if they do not fit when checks are enabled.
    #[track_caller]
    pub fn put_many(&mut self, elements: &[u8]) {
        let n = self.count(elements.len());
        self.within_capacity(n);
        check!(
            n <= self.free_slots(),
            "put of {n} elements with {} free slots",
            self.free_slots()
        );

        let start = self.next_write * self.element_size;
        let head = elements.len().min(self.buf.len() - start);
        let (tail_part, wrapped) = elements.split_at(head);
        self.buf[start..start + head].copy_from_slice(tail_part);
        self.buf[..wrapped.len()].copy_from_slice(wrapped);

        self.next_write = self.advance(self.next_write, n);
        self.size += n;
    }

    /// Copies the oldest element out.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not one element long, or on an empty queue when
    /// checks are enabled.
    #[inline]
    #[track_caller]
    pub fn pop(&mut self, out: &mut [u8]) {
        check!(!self.is_empty(), "pop on an empty queue");
        out.copy_from_slice(&self.buf[self.slot(self.next_read)]);
        self.next_read = self.advance(self.next_read, 1);
        self.size = self.size.saturating_sub(1);
    }

    /// Fills `out` with the oldest elements using at most two contiguous copies.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not a whole number of elements or exceeds the
    /// capacity, or if fewer are queued when checks are enabled.
    #[track_caller]
    pub fn pop_many(&mut self, out: &mut [u8]) {
        let n = self.count(out.len());
        self.within_capacity(n);
        check!(n <= self.size, "pop of {n} elements with {} queued", self.size);

        let start = self.next_read * self.element_size;
        let head = out.len().min(self.buf.len() - start);
        let (tail_part, wrapped) = out.split_at_mut(head);
        tail_part.copy_from_slice(&self.buf[start..start + head]);
        wrapped.copy_from_slice(&self.buf[..wrapped.len()]);

        self.next_read = self.advance(self.next_read, n);
        self.size = self.size.saturating_sub(n);
    }

    #[track_caller]
    fn count(&self, len: usize) -> usize {
        assert!(
            len % self.element_size == 0,
            "{len} bytes is not a whole number of {}-byte elements",
            self.element_size
        );
        len / self.element_size
    }

    #[track_caller]
    fn within_capacity(&self, n: usize) {
        assert!(
            n <= self.capacity,
            "bulk transfer of {n} elements exceeds the capacity of {}",
            self.capacity
        );
    }

    /// Queues `n` bits of `packed` (LSB first) as one-byte elements.
    ///
    /// # Panics
    ///
    /// Panics if elements are not one byte, if `packed` holds fewer than `n`
    /// bits, if `n` exceeds the capacity, or if they do not fit when checks
    /// are enabled.
    #[track_caller]
    pub fn put_many_bits(&mut self, n: usize, packed: &[u8]) {
        assert_eq!(self.element_size, 1, "bit queues need one-byte elements");
        self.within_capacity(n);
        check!(n <= self.free_slots(), "put of {n} bits with {} free slots", self.free_slots());
        assert!(packed.len() >= bits::packed_len(n), "{n} bits requested from {} bytes", packed.len());
        for i in 0..n {
            self.buf[self.next_write] = bits::read_bit(packed, i);
            self.next_write = self.advance(self.next_write, 1);
        }
        self.size += n;
    }

    /// Dequeues `n` one-byte bit elements and packs them LSB first into `out`.
    ///
    /// # Panics
    ///
    /// Panics if elements are not one byte, if `out` cannot hold `n` bits,
    /// if `n` exceeds the capacity, or if fewer are queued when checks are
    /// enabled.
    #[track_caller]
    pub fn pop_many_bits(&mut self, n: usize, out: &mut [u8]) {
        assert_eq!(self.element_size, 1, "bit queues need one-byte elements");
        self.within_capacity(n);
        check!(n <= self.size, "pop of {n} bits with {} queued", self.size);
        assert!(out.len() >= bits::packed_len(n), "{n} bits do not fit in {} bytes", out.len());
        for i in 0..n {
            bits::write_bit(out, i, self.buf[self.next_read]);
            self.next_read = self.advance(self.next_read, 1);
        }
        self.size = self.size.saturating_sub(n);
    }

    /// Queues one typed sample.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the element size.
    #[track_caller]
    pub fn put_value<T: Sample>(&mut self, value: T) {
        check!(!self.is_full(), "put on a full queue ({} slots)", self.capacity);
        let range = self.slot(self.next_write);
        sample::write_sample(&mut self.buf[range], value);
        self.next_write = self.advance(self.next_write, 1);
        self.size += 1;
    }

    /// Dequeues one typed sample.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the element size, or on an
    /// empty queue when checks are enabled.
    #[track_caller]
    pub fn pop_value<T: Sample>(&mut self) -> T {
        check!(!self.is_empty(), "pop on an empty queue");
        let value = sample::read_sample(&self.buf[self.slot(self.next_read)]);
        self.next_read = self.advance(self.next_read, 1);
        self.size = self.size.saturating_sub(1);
        value
    }

    /// Un-pops the last `n` elements so they are read again, in order.
    ///
    /// The bytes are still in the buffer as long as nothing was written over
    /// them, which holds when `n` does not exceed [`free_slots`](Self::free_slots)
    /// and nothing was put since the pops being undone.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the free slots when checks are enabled.
    #[track_caller]
    pub fn rollback(&mut self, n: usize) {
        check!(
            n <= self.free_slots(),
            "rollback of {n} elements with {} free slots",
            self.free_slots()
        );
        self.next_read = self.advance(self.next_read, self.capacity - n % self.capacity);
        self.size += n;
    }

    /// Empties the queue and rewinds both cursors to the start.
    pub fn clear(&mut self) {
        self.size = 0;
        self.next_write = 0;
        self.next_read = 0;
    }
}

/// Handle-addressed set of single-thread queues.
///
/// ```
/// use separator::local::LocalQueues;
///
/// let mut queues = LocalQueues::from_sizes(&[2, 1], Some(&[4, 16]))?;
/// queues[0].put(&[1, 2]);
/// let mut out = [0u8; 2];
/// queues[0].pop(&mut out);
/// assert_eq!(out, [1, 2]);
/// # Ok::<(), separator::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalQueues {
    queues: Vec<LocalQueue>,
}

impl LocalQueues {
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of the first invalid configuration.
    pub fn new(configs: &[LocalConfig]) -> Result<Self, ConfigError> {
        let queues = configs
            .iter()
            .enumerate()
            .map(|(queue, config)| LocalQueue::with_index(config, queue))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(queues = queues.len(), "single-thread queues created");
        Ok(Self { queues })
    }

    /// Array-style construction, see
    /// [`Registry::from_sizes`](crate::registry::Registry::from_sizes).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LengthMismatch`] or the first per-queue failure.
    pub fn from_sizes(sizes: &[usize], capacities: Option<&[usize]>) -> Result<Self, ConfigError> {
        let configs: Vec<LocalConfig> = config::zip_sizes(sizes, capacities)?
            .into_iter()
            .map(|(element_size, capacity)| LocalConfig::new(element_size, capacity))
            .collect();
        Self::new(&configs)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[track_caller]
    fn out_of_range(&self, queue: usize) -> ! {
        panic!(
            "queue index {queue} out of range: registry holds queues 0..{}",
            self.queues.len()
        )
    }
}

impl Index<usize> for LocalQueues {
    type Output = LocalQueue;

    #[track_caller]
    fn index(&self, queue: usize) -> &LocalQueue {
        match self.queues.get(queue) {
            Some(q) => q,
            None => self.out_of_range(queue),
        }
    }
}

impl IndexMut<usize> for LocalQueues {
    #[track_caller]
    fn index_mut(&mut self, queue: usize) -> &mut LocalQueue {
        if queue >= self.queues.len() {
            self.out_of_range(queue);
        }
        &mut self.queues[queue]
    }
}
