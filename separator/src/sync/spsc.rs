//! Thread-separator endpoints.
//!
//! A thread separator is a fixed-capacity slotted queue between exactly one
//! producer thread (for example a radio receive callback) and one consumer
//! thread (a DSP stage).
//!
//! # Overview
//!
//! - [`Producer`] - write end: `reserve`/`push`, `put`, `reset`, `flush`, `finish`
//! - [`Consumer`] - read end: `acquire`/`release`, `get`, blocking bulk reads
//! - Lock-free: the only synchronization is one flag per slot
//!
//! # Example
//!
//! ```
//! use separator::config::QueueConfig;
//! use separator::sync::spsc;
//!
//! let (mut tx, mut rx) = spsc::channel(&QueueConfig::new(4, 16))?;
//!
//! tx.put(&7i32.to_ne_bytes())?;
//!
//! let mut out = [0u8; 4];
//! assert!(rx.get(&mut out));
//! assert_eq!(i32::from_ne_bytes(out), 7);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Blocking
//!
//! `put`, `put_many`, `put_many_bits`, `reset` and `flush` spin until they
//! can proceed; `get_many_blocking` spins until it has read enough elements
//! or the producer has called [`Producer::finish`]. The queue's
//! [`Backoff`](crate::wait::Backoff) decides what happens between polls and
//! its [`Timeout`](crate::wait::Timeout) bounds the whole call. With
//! `Timeout::Infinite`, a consumer whose producer never writes, resets or
//! finishes spins forever; callers must guarantee progress.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bits;
use crate::config::QueueConfig;
use crate::error::{ConfigError, QueueError, Signal};
use crate::sample::{self, Sample};
use crate::spsc::ring::Ring;
use crate::trace::{debug, warn};
use crate::wait::{Backoff, Spinner, Timeout};

pub use crate::spsc::ring::{ConsumerStats, ProducerStats};

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Creates a standalone thread separator outside any
/// [`Registry`](crate::registry::Registry).
///
/// # Errors
///
/// Returns [`ConfigError`] if the configuration is invalid.
pub fn channel(config: &QueueConfig) -> Result<(Producer, Consumer), ConfigError> {
    let ring = Arc::new(Ring::new(config, 0)?);
    Ok((
        Producer::new(Arc::clone(&ring), 0, config),
        Consumer::new(ring, 0, config),
    ))
}

/// Write end of a thread separator.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer`, so there is never a second concurrent writer
pub struct Producer {
    ring: Arc<Ring>,
    queue: usize,
    backoff: Backoff,
    timeout: Timeout,
    _unsync: PhantomUnsync,
}

/// Read end of a thread separator.
///
/// See [`Producer`] for thread safety details (same semantics apply).
pub struct Consumer {
    ring: Arc<Ring>,
    queue: usize,
    backoff: Backoff,
    timeout: Timeout,
    _unsync: PhantomUnsync,
}

impl Producer {
    pub(crate) fn new(ring: Arc<Ring>, queue: usize, config: &QueueConfig) -> Self {
        Self {
            ring,
            queue,
            backoff: config.backoff,
            timeout: config.timeout,
            _unsync: PhantomData,
        }
    }

    /// Index of this queue in its registry.
    #[inline]
    pub const fn queue(&self) -> usize {
        self.queue
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Bytes moved by one element operation.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.ring.slot_size()
    }

    /// Claims the next slot for writing in place.
    ///
    /// Returns `None` while that slot still holds data the consumer has not
    /// released. The slot stays invisible to the consumer until a matching
    /// [`push`](Self::push); reservations are published in the order they
    /// were made.
    ///
    /// ```
    /// # use separator::config::QueueConfig;
    /// # let (mut tx, mut rx) = separator::sync::spsc::channel(&QueueConfig::new(2, 4))?;
    /// let slot = tx.reserve().expect("queue has space");
    /// slot.copy_from_slice(&[1, 2]);
    /// assert!(rx.is_empty());
    /// assert!(tx.push());
    /// assert!(!rx.is_empty());
    /// # Ok::<(), separator::ConfigError>(())
    /// ```
    #[inline]
    pub fn reserve(&mut self) -> Option<&mut [u8]> {
        // SAFETY: `&mut self` on the only Producer makes this the single producer.
        let ptr = unsafe { self.ring.reserve() }?;
        // SAFETY: the claimed payload is exclusively ours until pushed, and the
        // borrow of `self` prevents a second reserve from aliasing it.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.ring.slot_size()) })
    }

    /// Publishes the oldest reserved slot.
    ///
    /// Returns `false` if no slot is reserved.
    #[inline]
    pub fn push(&mut self) -> bool {
        // SAFETY: single producer.
        unsafe { self.ring.push() }
    }

    #[inline]
    fn put_with(&self, element: &[u8], spinner: &mut Spinner) -> bool {
        let polls = spinner.polls();
        // SAFETY: single producer; `check_put` verified length and that no
        // reservation is outstanding.
        while !unsafe { self.ring.try_put(element) } {
            if !spinner.wait() {
                return false;
            }
        }
        if spinner.polls() != polls {
            self.ring.record_full_stall();
        }
        true
    }

    #[track_caller]
    fn check_put(&self, len: usize) {
        let slot_size = self.ring.slot_size();
        assert!(
            len % slot_size == 0,
            "queue {}: {len} bytes is not a whole number of {slot_size}-byte elements",
            self.queue,
        );
        assert_eq!(
            self.ring.reserved(),
            0,
            "queue {}: put while in-place reservations are outstanding",
            self.queue
        );
    }

    /// Copies one element into the queue, spinning while it is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TimedOut`] if the queue timeout elapses first.
    ///
    /// # Panics
    ///
    /// Panics if `element` is not exactly one slot long, or if reserved slots
    /// have not been pushed yet.
    #[track_caller]
    pub fn put(&mut self, element: &[u8]) -> Result<(), QueueError> {
        assert_eq!(
            element.len(),
            self.ring.slot_size(),
            "queue {}: element length does not match slot size",
            self.queue
        );
        self.put_many(element)
    }

    /// Copies consecutive elements into the queue one at a time.
    ///
    /// Not atomic: the consumer may observe a prefix before the call returns.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TimedOut`] with the number of elements queued if
    /// the queue timeout elapses first.
    ///
    /// # Panics
    ///
    /// Panics if `elements` is not a whole number of slots, or if reserved
    /// slots have not been pushed yet.
    #[track_caller]
    pub fn put_many(&mut self, elements: &[u8]) -> Result<(), QueueError> {
        self.check_put(elements.len());

        let mut spinner = Spinner::new(self.backoff, self.timeout);
        for (transferred, element) in elements.chunks_exact(self.ring.slot_size()).enumerate() {
            if !self.put_with(element, &mut spinner) {
                warn!(queue = self.queue, transferred, "put timed out on a full queue");
                return Err(QueueError::TimedOut { transferred });
            }
        }
        Ok(())
    }

    /// Unpacks `n` bits from `packed` (LSB first) and queues each as its own
    /// one-byte element holding `0` or `1`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TimedOut`] with the number of bits queued if the
    /// queue timeout elapses first.
    ///
    /// # Panics
    ///
    /// Panics if the slot size is not one byte or `packed` holds fewer than
    /// `n` bits.
    #[track_caller]
    pub fn put_many_bits(&mut self, n: usize, packed: &[u8]) -> Result<(), QueueError> {
        assert_eq!(self.ring.slot_size(), 1, "queue {}: bit channels need one-byte slots", self.queue);
        assert!(packed.len() >= bits::packed_len(n), "queue {}: {n} bits requested from {} bytes", self.queue, packed.len());
        self.check_put(1);

        let mut spinner = Spinner::new(self.backoff, self.timeout);
        for transferred in 0..n {
            let bit = [bits::read_bit(packed, transferred)];
            if !self.put_with(&bit, &mut spinner) {
                warn!(queue = self.queue, transferred, "bit put timed out on a full queue");
                return Err(QueueError::TimedOut { transferred });
            }
        }
        Ok(())
    }

    /// Queues one typed sample.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TimedOut`] if the queue timeout elapses first.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the slot size.
    #[track_caller]
    pub fn put_value<T: Sample>(&mut self, value: T) -> Result<(), QueueError> {
        self.put(sample::as_bytes(std::slice::from_ref(&value)))
    }

    /// Point-in-time check that the next write would have to wait.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Asks the consumer to reset and waits until it acknowledges, which it
    /// does the next time it finds the queue empty.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ControlTimedOut`] if the queue timeout elapses
    /// first; the request is withdrawn.
    pub fn reset(&mut self) -> Result<(), QueueError> {
        debug!(queue = self.queue, "reset requested");
        let mut spinner = Spinner::new(self.backoff, self.timeout);
        self.signal(Signal::Reset, &mut spinner)
    }

    /// Waits until the consumer has observed every element pushed so far.
    ///
    /// First waits for the consumer to go idle, then raises a flush request
    /// and waits for its acknowledgement. The consumer only acknowledges on
    /// finding the queue empty, so all earlier elements have been read.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ControlTimedOut`] if the queue timeout elapses
    /// first; the request is withdrawn.
    pub fn flush(&mut self) -> Result<(), QueueError> {
        debug!(queue = self.queue, "flush requested");
        let mut spinner = Spinner::new(self.backoff, self.timeout);
        while !self.ring.is_idle() {
            if !spinner.wait() {
                warn!(queue = self.queue, "flush timed out waiting for consumer to drain");
                return Err(QueueError::ControlTimedOut {
                    signal: Signal::Flush,
                });
            }
        }
        self.signal(Signal::Flush, &mut spinner)
    }

    fn signal(&self, signal: Signal, spinner: &mut Spinner) -> Result<(), QueueError> {
        self.ring.raise(signal);
        while self.ring.is_pending(signal) {
            if !spinner.wait() {
                if self.ring.withdraw(signal) {
                    warn!(queue = self.queue, %signal, "consumer did not acknowledge");
                    return Err(QueueError::ControlTimedOut { signal });
                }
                break;
            }
        }
        debug!(queue = self.queue, %signal, "acknowledged");
        Ok(())
    }

    /// Raises end-of-stream and returns immediately.
    ///
    /// Blocking reads on the consumer return early once they find the queue
    /// empty after this call.
    pub fn finish(&self) {
        debug!(queue = self.queue, "finish raised");
        self.ring.finish();
    }

    /// Producer counters.
    pub fn stats(&self) -> ProducerStats {
        self.ring.producer_stats()
    }
}

impl Consumer {
    pub(crate) fn new(ring: Arc<Ring>, queue: usize, config: &QueueConfig) -> Self {
        Self {
            ring,
            queue,
            backoff: config.backoff,
            timeout: config.timeout,
            _unsync: PhantomData,
        }
    }

    /// Index of this queue in its registry.
    #[inline]
    pub const fn queue(&self) -> usize {
        self.queue
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Bytes moved by one element operation.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.ring.slot_size()
    }

    /// Exposes the oldest committed slot for reading in place.
    ///
    /// The slot stays owned by the consumer until a matching
    /// [`release`](Self::release). On an empty queue, acknowledges pending
    /// reset/flush requests and returns `None`.
    #[inline]
    pub fn acquire(&mut self) -> Option<&[u8]> {
        // SAFETY: `&mut self` on the only Consumer makes this the single consumer.
        let ptr = unsafe { self.ring.acquire() }?;
        // SAFETY: the producer does not touch the slot until it is released,
        // and release needs `&mut self`, which ends this borrow first.
        Some(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.ring.slot_size()) })
    }

    /// Frees the oldest acquired slot for reuse by the producer.
    ///
    /// Returns `false` if nothing is acquired.
    #[inline]
    pub fn release(&mut self) -> bool {
        // SAFETY: single consumer; slices from `acquire` borrowed `self` and are dead.
        unsafe { self.ring.release() }
    }

    #[track_caller]
    fn check_get(&self, len: usize) {
        let slot_size = self.ring.slot_size();
        assert!(
            len % slot_size == 0,
            "queue {}: {len} bytes is not a whole number of {slot_size}-byte elements",
            self.queue,
        );
        assert_eq!(
            self.ring.acquired(),
            0,
            "queue {}: get while acquired slots are outstanding",
            self.queue
        );
    }

    /// Copies the oldest element into `out` without blocking.
    ///
    /// Returns `false` on an empty queue, after acknowledging pending
    /// reset/flush requests.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not exactly one slot long, or if acquired slots
    /// have not been released yet.
    #[track_caller]
    pub fn get(&mut self, out: &mut [u8]) -> bool {
        assert_eq!(
            out.len(),
            self.ring.slot_size(),
            "queue {}: output length does not match slot size",
            self.queue
        );
        self.check_get(out.len());
        // SAFETY: single consumer, length and outstanding acquisitions checked.
        unsafe { self.ring.try_get(out) }
    }

    /// Fills `out` with as many whole elements as are available, without
    /// blocking. Returns the number of elements read.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not a whole number of slots, or if acquired slots
    /// have not been released yet.
    #[track_caller]
    pub fn get_many(&mut self, out: &mut [u8]) -> usize {
        self.check_get(out.len());
        let mut read = 0;
        for chunk in out.chunks_exact_mut(self.ring.slot_size()) {
            // SAFETY: single consumer, length and outstanding acquisitions checked.
            if !unsafe { self.ring.try_get(chunk) } {
                break;
            }
            read += 1;
        }
        read
    }

    /// Blocks until one element is copied into `out`, or until the queue is
    /// empty and finished, or the spinner expires.
    fn get_blocking(&self, out: &mut [u8], spinner: &mut Spinner) -> bool {
        // SAFETY: single consumer; callers checked length and acquisitions.
        while !unsafe { self.ring.try_get(out) } {
            if self.ring.is_finished() {
                return false;
            }
            if !spinner.wait() {
                warn!(queue = self.queue, "blocking get timed out on an empty queue");
                return false;
            }
        }
        true
    }

    /// Fills `out` with whole elements, spinning while the queue is empty.
    ///
    /// Returns early, with fewer elements, only if the queue is empty after
    /// the producer called [`Producer::finish`], or the queue timeout elapses.
    /// Elements pushed before `finish` are always delivered.
    ///
    /// # Panics
    ///
    /// Panics if `out` is not a whole number of slots, or if acquired slots
    /// have not been released yet.
    #[track_caller]
    pub fn get_many_blocking(&mut self, out: &mut [u8]) -> usize {
        self.check_get(out.len());
        let mut spinner = Spinner::new(self.backoff, self.timeout);
        let mut read = 0;
        for chunk in out.chunks_exact_mut(self.ring.slot_size()) {
            if !self.get_blocking(chunk, &mut spinner) {
                break;
            }
            read += 1;
        }
        read
    }

    /// Reads up to `n` one-byte bit elements without blocking and packs them
    /// LSB first into `out`. Returns the number of bits written; positions
    /// past it are left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the slot size is not one byte or `out` cannot hold `n` bits.
    #[track_caller]
    pub fn get_many_bits(&mut self, n: usize, out: &mut [u8]) -> usize {
        self.check_bits(n, out.len());
        let mut bit = [0u8];
        for read in 0..n {
            // SAFETY: single consumer; one-byte slots checked.
            if !unsafe { self.ring.try_get(&mut bit) } {
                return read;
            }
            bits::write_bit(out, read, bit[0]);
        }
        n
    }

    /// Blocking counterpart of [`get_many_bits`](Self::get_many_bits), with
    /// the early-return rules of [`get_many_blocking`](Self::get_many_blocking).
    ///
    /// # Panics
    ///
    /// Panics if the slot size is not one byte or `out` cannot hold `n` bits.
    #[track_caller]
    pub fn get_many_bits_blocking(&mut self, n: usize, out: &mut [u8]) -> usize {
        self.check_bits(n, out.len());
        let mut spinner = Spinner::new(self.backoff, self.timeout);
        let mut bit = [0u8];
        for read in 0..n {
            if !self.get_blocking(&mut bit, &mut spinner) {
                return read;
            }
            bits::write_bit(out, read, bit[0]);
        }
        n
    }

    #[track_caller]
    fn check_bits(&self, n: usize, out_len: usize) {
        assert_eq!(self.ring.slot_size(), 1, "queue {}: bit channels need one-byte slots", self.queue);
        assert!(out_len >= bits::packed_len(n), "queue {}: {n} bits do not fit in {out_len} bytes", self.queue);
        self.check_get(1);
    }

    /// Reads one typed sample without blocking.
    ///
    /// # Panics
    ///
    /// Panics if `size_of::<T>()` differs from the slot size.
    #[track_caller]
    pub fn get_value<T: Sample>(&mut self) -> Option<T> {
        // SAFETY: every bit pattern, zero included, is a valid `Sample`.
        let mut value: T = unsafe { std::mem::zeroed() };
        self.get(sample::as_bytes_mut(std::slice::from_mut(&mut value)))
            .then_some(value)
    }

    /// Point-in-time check that no element is ready.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` once the producer has called [`Producer::finish`].
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.ring.is_finished()
    }

    /// Un-reads up to `n` elements so the next reads return them again, in
    /// their first order. Acquired slots are un-acquired first, then released
    /// slots are restored newest first, as long as the producer has not
    /// reused them. Returns how many elements were restored.
    ///
    /// # Safety
    ///
    /// Not synchronized with the producer: the producer must not be inside
    /// any queue operation for the duration of the call (for example because
    /// it is parked at a barrier or has finished).
    pub unsafe fn rollback(&mut self, n: usize) -> usize {
        // SAFETY: caller guarantees the producer is quiescent; `&mut self`
        // covers the consumer side.
        let restored = unsafe { self.ring.rollback(n) };
        if restored < n {
            warn!(queue = self.queue, requested = n, restored, "rollback stopped early");
        } else {
            debug!(queue = self.queue, restored, "rolled back");
        }
        restored
    }

    /// Consumer counters.
    pub fn stats(&self) -> ConsumerStats {
        self.ring.consumer_stats()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("queue", &self.queue)
            .field("capacity", &self.ring.capacity())
            .field("slot_size", &self.ring.slot_size())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue)
            .field("capacity", &self.ring.capacity())
            .field("slot_size", &self.ring.slot_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn int_channel(capacity: usize) -> (Producer, Consumer) {
        let config = QueueConfig::new(4, capacity)
            .with_backoff(Backoff::Yield)
            .with_timeout(Duration::from_millis(50).into());
        channel(&config).unwrap()
    }

    fn get_i32(rx: &mut Consumer) -> Option<i32> {
        rx.get_value::<i32>()
    }

    #[test]
    fn test_fifo_round_trip() {
        let (mut tx, mut rx) = int_channel(8);
        for v in 0..8 {
            tx.put_value(v).unwrap();
        }
        for v in 0..8 {
            assert_eq!(get_i32(&mut rx), Some(v));
        }
        assert_eq!(get_i32(&mut rx), None);
    }

    #[test]
    fn test_capacity_four_scenario() {
        let (mut tx, mut rx) = int_channel(4);
        for v in [1, 2, 3, 4] {
            tx.put_value(v).unwrap();
        }
        assert!(tx.is_full());
        assert!(tx.reserve().is_none());

        for v in [1, 2, 3, 4] {
            assert_eq!(get_i32(&mut rx), Some(v));
        }
        assert_eq!(get_i32(&mut rx), None);

        tx.put_value(5).unwrap();
        tx.put_value(6).unwrap();
        assert_eq!(get_i32(&mut rx), Some(5));
        assert_eq!(unsafe { rx.rollback(1) }, 1);
        assert_eq!(get_i32(&mut rx), Some(5));
        assert_eq!(get_i32(&mut rx), Some(6));
    }

    #[test]
    fn test_reserve_beyond_capacity_returns_none() {
        let (mut tx, _rx) = int_channel(3);
        for v in 0..3i32 {
            tx.reserve().unwrap().copy_from_slice(&v.to_ne_bytes());
            assert!(tx.push());
        }
        assert!(tx.reserve().is_none());
        assert_eq!(tx.stats().committed, 3);
    }

    #[test]
    fn test_put_times_out_when_full() {
        let (mut tx, _rx) = int_channel(2);
        tx.put_many(sample::as_bytes(&[1i32, 2])).unwrap();
        assert_eq!(
            tx.put_many(sample::as_bytes(&[3i32, 4])),
            Err(QueueError::TimedOut { transferred: 0 })
        );
        assert_eq!(tx.stats().full_stalls, 0);
    }

    #[test]
    fn test_acquire_release_in_place() {
        let (mut tx, mut rx) = int_channel(4);
        tx.put_value(10i32).unwrap();
        tx.put_value(11i32).unwrap();

        let first = rx.acquire().map(<[u8]>::to_vec).unwrap();
        let second = rx.acquire().map(<[u8]>::to_vec).unwrap();
        assert_eq!(first, 10i32.to_ne_bytes());
        assert_eq!(second, 11i32.to_ne_bytes());
        assert!(rx.acquire().is_none());

        assert!(rx.release());
        assert!(rx.release());
        assert!(!rx.release());
        assert_eq!(rx.stats().consumed, 2);
    }

    #[test]
    #[should_panic(expected = "acquired slots are outstanding")]
    fn test_get_with_outstanding_acquire_panics() {
        let (mut tx, mut rx) = int_channel(4);
        tx.put_value(1i32).unwrap();
        tx.put_value(2i32).unwrap();
        let _ = rx.acquire();
        let _ = get_i32(&mut rx);
    }

    #[test]
    #[should_panic(expected = "does not match slot size")]
    fn test_wrong_element_length_panics() {
        let (mut tx, _rx) = int_channel(4);
        let _ = tx.put(&[1, 2]);
    }

    #[test]
    fn test_get_many_stops_when_empty() {
        let (mut tx, mut rx) = int_channel(8);
        tx.put_many(sample::as_bytes(&[1i32, 2, 3])).unwrap();

        let mut out = [0i32; 5];
        assert_eq!(rx.get_many(sample::as_bytes_mut(&mut out)), 3);
        assert_eq!(out, [1, 2, 3, 0, 0]);
    }

    #[test]
    fn test_batched_slots_bulk_round_trip() {
        let config = QueueConfig::new(4, 4)
            .with_batch_size(3)
            .with_timeout(Duration::from_millis(50).into());
        let (mut tx, mut rx) = channel(&config).unwrap();
        assert_eq!(tx.slot_size(), 12);

        // Three slots, then four more so the second burst wraps.
        let first: Vec<u32> = (0..9).collect();
        tx.put_many(sample::as_bytes(&first)).unwrap();
        let mut out = [0u32; 9];
        assert_eq!(rx.get_many(sample::as_bytes_mut(&mut out)), 3);
        assert_eq!(out.as_slice(), first.as_slice());

        let second: Vec<u32> = (100..112).collect();
        tx.put_many(sample::as_bytes(&second)).unwrap();
        assert!(tx.is_full());
        let mut out = [0u32; 15];
        assert_eq!(rx.get_many(sample::as_bytes_mut(&mut out)), 4);
        assert_eq!(&out[..12], second.as_slice());
    }

    #[test]
    #[should_panic(expected = "not a whole number of 12-byte elements")]
    fn test_batched_put_rejects_partial_slot() {
        let config = QueueConfig::new(4, 4).with_batch_size(3);
        let (mut tx, _rx) = channel(&config).unwrap();
        let _ = tx.put_many(sample::as_bytes(&[1u32, 2]));
    }

    #[test]
    fn test_get_many_blocking_returns_after_finish() {
        let (mut tx, mut rx) = int_channel(8);
        tx.put_many(sample::as_bytes(&[1i32, 2])).unwrap();
        tx.finish();

        let mut out = [0i32; 4];
        assert_eq!(rx.get_many_blocking(sample::as_bytes_mut(&mut out)), 2);
        assert_eq!(&out[..2], &[1, 2]);
        assert!(rx.is_finished());
    }

    #[test]
    fn test_get_many_blocking_times_out() {
        let (_tx, mut rx) = int_channel(8);
        let mut out = [0i32; 1];
        assert_eq!(rx.get_many_blocking(sample::as_bytes_mut(&mut out)), 0);
    }

    #[test]
    fn test_bits_round_trip() {
        let config = QueueConfig::new(1, 32).with_timeout(Duration::from_millis(50).into());
        let (mut tx, mut rx) = channel(&config).unwrap();

        tx.put_many_bits(12, &[0b1010_0110, 0b0000_1001]).unwrap();

        let mut out = [0u8; 2];
        assert_eq!(rx.get_many_bits(12, &mut out), 12);
        assert_eq!(out, [0b1010_0110, 0b0000_1001]);
        assert_eq!(rx.get_many_bits(4, &mut out), 0);
    }

    #[test]
    fn test_reset_times_out_without_consumer() {
        let (mut tx, _rx) = int_channel(4);
        assert_eq!(
            tx.reset(),
            Err(QueueError::ControlTimedOut {
                signal: Signal::Reset
            })
        );
    }

    #[test]
    fn test_flush_on_idle_queue_waits_for_acknowledgement() {
        let (mut tx, mut rx) = int_channel(4);
        let consumer = std::thread::spawn(move || {
            while rx.stats().flushes_observed == 0 {
                let _ = get_i32(&mut rx);
                std::thread::yield_now();
            }
        });
        tx.flush().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    fn test_send_to_thread() {
        let (mut tx, mut rx) = int_channel(16);

        let handle = std::thread::spawn(move || {
            for i in 0..10i32 {
                tx.put_value(i).unwrap();
            }
        });
        handle.join().unwrap();

        for i in 0..10 {
            assert_eq!(get_i32(&mut rx), Some(i));
        }
    }
}
