//! Core slotted ring of the thread separator.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ flag (line)  │ payload (whole lines)    │  slot 0
//! ├──────────────┼──────────────────────────┤
//! │ flag (line)  │ payload (whole lines)    │  slot 1
//! ├──────────────┼──────────────────────────┤
//! │ ...          │                          │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! Every slot starts on a cache line boundary and its flag owns that whole
//! line, so the producer publishing slot N never contends with the consumer
//! reading the payload of slot N-1.
//!
//! # Protocol
//!
//! The per-slot flag is the only synchronization between the two sides:
//!
//! - `FREE`: never written, or claimed by the producer for writing.
//! - `COMMITTED`: holds data the consumer has not released yet.
//! - `CONSUMED`: released by the consumer. The producer may reuse it; until
//!   then its bytes are intact and `rollback` may re-commit it.
//!
//! The producer writes the payload and then stores `COMMITTED` with Release.
//! The consumer loads the flag with Acquire before reading the payload and
//! stores `CONSUMED` with Release once it is done, which the producer's
//! Acquire load pairs with before overwriting.
//!
//! # Safety
//!
//! The producer-side methods must only be called by one thread at a time, and
//! likewise the consumer-side methods. [`Ring::clear`] and [`Ring::rollback`]
//! additionally require both sides to be quiescent.

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering, fence};

use crate::config::{CACHE_LINE, QueueConfig};
use crate::error::{ConfigError, Signal};

const FREE: u8 = 0;
const COMMITTED: u8 = 1;
const CONSUMED: u8 = 2;

/// Producer-side cursors and counters.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Next slot to claim (write reserve cursor).
    reserve: AtomicUsize,
    /// Next claimed slot to publish (write commit cursor).
    commit: AtomicUsize,
    /// Claimed but unpublished slots.
    reserved: AtomicUsize,
    committed: AtomicU64,
    full_stalls: AtomicU64,
}

impl ProducerState {
    const fn new() -> Self {
        Self {
            reserve: AtomicUsize::new(0),
            commit: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            committed: AtomicU64::new(0),
            full_stalls: AtomicU64::new(0),
        }
    }
}

/// Consumer-side cursors and counters.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Next committed slot to hand out (read acquire cursor).
    acquire: AtomicUsize,
    /// Next handed-out slot to free (read release cursor).
    release: AtomicUsize,
    /// Handed out but unreleased slots.
    acquired: AtomicUsize,
    consumed: AtomicU64,
    empty_polls: AtomicU64,
    resets_observed: AtomicU64,
    flushes_observed: AtomicU64,
}

impl ConsumerState {
    const fn new() -> Self {
        Self {
            acquire: AtomicUsize::new(0),
            release: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            consumed: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            resets_observed: AtomicU64::new(0),
            flushes_observed: AtomicU64::new(0),
        }
    }
}

/// Out-of-band flags. Set by the producer, cleared by the consumer.
#[repr(C)]
#[repr(align(64))]
pub struct ControlState {
    reset: AtomicBool,
    flush: AtomicBool,
    finish: AtomicBool,
    /// The consumer last found the queue empty.
    idle: AtomicBool,
}

impl ControlState {
    const fn new() -> Self {
        Self {
            reset: AtomicBool::new(false),
            flush: AtomicBool::new(false),
            finish: AtomicBool::new(false),
            idle: AtomicBool::new(true),
        }
    }

    const fn flag(&self, signal: Signal) -> &AtomicBool {
        match signal {
            Signal::Reset => &self.reset,
            Signal::Flush => &self.flush,
        }
    }
}

/// Producer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Slots published.
    pub committed: u64,
    /// Blocking writes that found their slot occupied at least once.
    pub full_stalls: u64,
}

/// Consumer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Slots released.
    pub consumed: u64,
    /// Reads that found the queue empty.
    pub empty_polls: u64,
    /// Reset requests acknowledged.
    pub resets_observed: u64,
    /// Flush requests acknowledged.
    pub flushes_observed: u64,
}

/// Increments a counter owned by a single writer without an RMW.
#[inline]
fn bump_counter(counter: &AtomicU64) {
    counter.store(counter.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
}

/// Slotted circular buffer with cache-line isolated validity flags.
pub struct Ring {
    producer: ProducerState,
    consumer: ConsumerState,
    control: ControlState,
    slots: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    stride: usize,
    slot_size: usize,
}

impl Ring {
    /// Allocates the ring described by the configuration of queue `queue`.
    ///
    /// Allocation failure aborts via [`handle_alloc_error`]: a pipeline cannot
    /// run with a missing separator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: &QueueConfig, queue: usize) -> Result<Self, ConfigError> {
        config.validate(queue)?;

        let overflow = ConfigError::LayoutOverflow {
            queue,
            capacity: config.capacity,
            slot_size: config.slot_size(),
        };
        let stride = config.slot_stride().ok_or_else(|| overflow.clone())?;
        let bytes = stride
            .checked_mul(config.capacity)
            .ok_or_else(|| overflow.clone())?;
        let layout = Layout::from_size_align(bytes, CACHE_LINE).map_err(|_| overflow)?;

        // SAFETY: layout has non-zero size (capacity and stride are non-zero).
        // Zeroed memory marks every flag FREE.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(slots) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };

        Ok(Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            control: ControlState::new(),
            slots,
            layout,
            capacity: config.capacity,
            stride,
            slot_size: config.slot_size(),
        })
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Advances a cursor to the next slot, wrapping to 0 at capacity.
    #[inline]
    const fn bump_cursor(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.capacity { 0 } else { next }
    }

    /// Moves a cursor to the previous slot, wrapping to the last slot.
    #[inline]
    const fn retreat_cursor(&self, cursor: usize) -> usize {
        if cursor == 0 { self.capacity - 1 } else { cursor - 1 }
    }

    #[inline]
    fn flag(&self, index: usize) -> &AtomicU8 {
        debug_assert!(index < self.capacity);
        // SAFETY: index < capacity, so the flag byte lies inside the
        // allocation. AtomicU8 has alignment 1 and the byte was initialized by
        // `alloc_zeroed`; flags are only ever accessed atomically.
        unsafe { &*self.slots.as_ptr().add(index * self.stride).cast::<AtomicU8>() }
    }

    #[inline]
    fn payload(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.capacity);
        // SAFETY: index < capacity; the payload starts one cache line into the
        // slot and spans `slot_size <= stride - CACHE_LINE` bytes.
        unsafe { self.slots.add(index * self.stride + CACHE_LINE) }
    }

    /// Clears the idle flag if set. Loads first so a busy producer does not
    /// keep writing the control line.
    ///
    /// Pairs with the fence in [`acknowledge_control`](Self::acknowledge_control):
    /// either this load sees the consumer's `idle = true`, or the consumer's
    /// re-check sees the slot just published.
    #[inline]
    fn mark_busy(&self) {
        fence(Ordering::SeqCst);
        if self.control.idle.load(Ordering::Relaxed) {
            self.control.idle.store(false, Ordering::Relaxed);
        }
    }

    /// Consumer found slot `index` empty: mark processing idle, then
    /// acknowledge pending reset/flush requests unless the slot was published
    /// in the meantime.
    fn acknowledge_control(&self, index: usize) {
        let consumer = &self.consumer;
        bump_counter(&consumer.empty_polls);

        self.control.idle.store(true, Ordering::Release);
        fence(Ordering::SeqCst);
        if self.flag(index).load(Ordering::Acquire) == COMMITTED {
            return;
        }

        if self.control.reset.load(Ordering::Acquire) {
            self.control.reset.store(false, Ordering::Release);
            bump_counter(&consumer.resets_observed);
        }
        if self.control.flush.load(Ordering::Acquire) {
            self.control.flush.store(false, Ordering::Release);
            bump_counter(&consumer.flushes_observed);
        }
    }

    // ---------------------------------------------------------------- producer

    /// Claims the next slot for in-place writing without publishing it.
    ///
    /// Returns `None` if that slot still holds unreleased data or every slot
    /// is already claimed.
    ///
    /// # Safety
    ///
    /// Single producer.
    #[inline]
    pub unsafe fn reserve(&self) -> Option<NonNull<u8>> {
        let producer = &self.producer;
        let reserved = producer.reserved.load(Ordering::Relaxed);
        if reserved == self.capacity {
            return None;
        }

        let index = producer.reserve.load(Ordering::Relaxed);
        let flag = self.flag(index);
        if flag.load(Ordering::Acquire) == COMMITTED {
            return None;
        }
        // Overwriting starts here: the slot is no longer rollback history.
        flag.store(FREE, Ordering::Relaxed);
        self.mark_busy();

        producer
            .reserve
            .store(self.bump_cursor(index), Ordering::Relaxed);
        producer.reserved.store(reserved + 1, Ordering::Relaxed);
        Some(self.payload(index))
    }

    /// Publishes the oldest claimed slot.
    ///
    /// Returns `false` if nothing is claimed.
    ///
    /// # Safety
    ///
    /// Single producer.
    #[inline]
    pub unsafe fn push(&self) -> bool {
        let producer = &self.producer;
        let reserved = producer.reserved.load(Ordering::Relaxed);
        if reserved == 0 {
            return false;
        }

        let index = producer.commit.load(Ordering::Relaxed);
        self.flag(index).store(COMMITTED, Ordering::Release);
        self.mark_busy();

        producer
            .commit
            .store(self.bump_cursor(index), Ordering::Relaxed);
        producer.reserved.store(reserved - 1, Ordering::Relaxed);
        bump_counter(&producer.committed);
        true
    }

    /// Copies `element` into the next slot and publishes it in one step.
    ///
    /// Returns `false` if the slot still holds unreleased data.
    ///
    /// # Safety
    ///
    /// Single producer, no claimed slots outstanding, and
    /// `element.len() == slot_size`.
    #[inline]
    pub unsafe fn try_put(&self, element: &[u8]) -> bool {
        debug_assert_eq!(element.len(), self.slot_size);
        debug_assert_eq!(self.producer.reserved.load(Ordering::Relaxed), 0);

        let producer = &self.producer;
        let index = producer.reserve.load(Ordering::Relaxed);
        let flag = self.flag(index);
        if flag.load(Ordering::Acquire) == COMMITTED {
            return false;
        }
        flag.store(FREE, Ordering::Relaxed);

        // SAFETY: the slot is not COMMITTED so the consumer will not read it,
        // and the payload region holds at least slot_size bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                element.as_ptr(),
                self.payload(index).as_ptr(),
                self.slot_size,
            );
        }
        flag.store(COMMITTED, Ordering::Release);
        self.mark_busy();

        let next = self.bump_cursor(index);
        producer.reserve.store(next, Ordering::Relaxed);
        producer.commit.store(next, Ordering::Relaxed);
        bump_counter(&producer.committed);
        true
    }

    /// Number of claimed but unpublished slots.
    #[inline]
    pub fn reserved(&self) -> usize {
        self.producer.reserved.load(Ordering::Relaxed)
    }

    /// Records a blocking write that had to wait for space.
    #[inline]
    pub fn record_full_stall(&self) {
        bump_counter(&self.producer.full_stalls);
    }

    /// Raises a control signal.
    #[inline]
    pub fn raise(&self, signal: Signal) {
        self.control.flag(signal).store(true, Ordering::Release);
    }

    /// Returns `true` while a raised signal has not been acknowledged.
    #[inline]
    pub fn is_pending(&self, signal: Signal) -> bool {
        self.control.flag(signal).load(Ordering::Acquire)
    }

    /// Withdraws an unacknowledged signal.
    ///
    /// Returns `false` if the consumer acknowledged it in the meantime.
    #[inline]
    pub fn withdraw(&self, signal: Signal) -> bool {
        self.control
            .flag(signal)
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` if the consumer last observed the queue empty.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.control.idle.load(Ordering::Acquire)
    }

    /// Raises the end-of-stream flag. Never cleared.
    #[inline]
    pub fn finish(&self) {
        self.control.finish.store(true, Ordering::Release);
    }

    // ---------------------------------------------------------------- consumer

    /// Hands out the oldest committed slot for in-place reading.
    ///
    /// On an empty queue acknowledges pending reset/flush requests, marks
    /// processing idle and returns `None`. Also returns `None` if every slot
    /// is already handed out.
    ///
    /// # Safety
    ///
    /// Single consumer.
    #[inline]
    pub unsafe fn acquire(&self) -> Option<NonNull<u8>> {
        let consumer = &self.consumer;
        let acquired = consumer.acquired.load(Ordering::Relaxed);
        if acquired == self.capacity {
            return None;
        }

        let index = consumer.acquire.load(Ordering::Relaxed);
        if self.flag(index).load(Ordering::Acquire) != COMMITTED {
            self.acknowledge_control(index);
            return None;
        }

        consumer
            .acquire
            .store(self.bump_cursor(index), Ordering::Relaxed);
        consumer.acquired.store(acquired + 1, Ordering::Relaxed);
        Some(self.payload(index))
    }

    /// Frees the oldest handed-out slot.
    ///
    /// Returns `false` if nothing is handed out.
    ///
    /// # Safety
    ///
    /// Single consumer; no reference into the released slot may outlive this call.
    #[inline]
    pub unsafe fn release(&self) -> bool {
        let consumer = &self.consumer;
        let acquired = consumer.acquired.load(Ordering::Relaxed);
        if acquired == 0 {
            return false;
        }

        let index = consumer.release.load(Ordering::Relaxed);
        self.flag(index).store(CONSUMED, Ordering::Release);

        consumer
            .release
            .store(self.bump_cursor(index), Ordering::Relaxed);
        consumer.acquired.store(acquired - 1, Ordering::Relaxed);
        bump_counter(&consumer.consumed);
        true
    }

    /// Copies the oldest committed slot into `out` and frees it in one step.
    ///
    /// Same empty-queue behavior as [`acquire`](Self::acquire).
    ///
    /// # Safety
    ///
    /// Single consumer, no handed-out slots outstanding, and
    /// `out.len() == slot_size`.
    #[inline]
    pub unsafe fn try_get(&self, out: &mut [u8]) -> bool {
        debug_assert_eq!(out.len(), self.slot_size);
        debug_assert_eq!(self.consumer.acquired.load(Ordering::Relaxed), 0);

        let consumer = &self.consumer;
        let index = consumer.acquire.load(Ordering::Relaxed);
        let flag = self.flag(index);
        if flag.load(Ordering::Acquire) != COMMITTED {
            self.acknowledge_control(index);
            return false;
        }

        // SAFETY: the Acquire load observed COMMITTED, so the producer's
        // payload writes are visible and it will not touch the slot until we
        // store CONSUMED below.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.payload(index).as_ptr(),
                out.as_mut_ptr(),
                self.slot_size,
            );
        }
        flag.store(CONSUMED, Ordering::Release);

        let next = self.bump_cursor(index);
        consumer.acquire.store(next, Ordering::Relaxed);
        consumer.release.store(next, Ordering::Relaxed);
        bump_counter(&consumer.consumed);
        true
    }

    /// Number of handed-out but unreleased slots.
    #[inline]
    pub fn acquired(&self) -> usize {
        self.consumer.acquired.load(Ordering::Relaxed)
    }

    /// Returns `true` once the producer has raised end-of-stream. Observing
    /// it marks processing idle.
    #[inline]
    pub fn is_finished(&self) -> bool {
        if self.control.finish.load(Ordering::Acquire) {
            self.control.idle.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------ observation

    /// Point-in-time check that the producer's next slot is unavailable.
    #[inline]
    pub fn is_full(&self) -> bool {
        let producer = &self.producer;
        if producer.reserved.load(Ordering::Relaxed) == self.capacity {
            return true;
        }
        let index = producer.reserve.load(Ordering::Relaxed);
        self.flag(index).load(Ordering::Acquire) == COMMITTED
    }

    /// Point-in-time check that the consumer's next slot holds no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let index = self.consumer.acquire.load(Ordering::Relaxed);
        self.flag(index).load(Ordering::Acquire) != COMMITTED
    }

    pub fn producer_stats(&self) -> ProducerStats {
        ProducerStats {
            committed: self.producer.committed.load(Ordering::Relaxed),
            full_stalls: self.producer.full_stalls.load(Ordering::Relaxed),
        }
    }

    pub fn consumer_stats(&self) -> ConsumerStats {
        let consumer = &self.consumer;
        ConsumerStats {
            consumed: consumer.consumed.load(Ordering::Relaxed),
            empty_polls: consumer.empty_polls.load(Ordering::Relaxed),
            resets_observed: consumer.resets_observed.load(Ordering::Relaxed),
            flushes_observed: consumer.flushes_observed.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------ maintenance

    /// Marks every slot `FREE` and moves all cursors to the read position.
    /// Claimed and handed-out slots are discarded.
    ///
    /// # Safety
    ///
    /// Neither side may be inside any ring operation, and outstanding
    /// references into slots must be dead.
    pub unsafe fn clear(&self) {
        for index in 0..self.capacity {
            self.flag(index).store(FREE, Ordering::Relaxed);
        }

        let at = self.consumer.acquire.load(Ordering::Relaxed);
        self.producer.reserve.store(at, Ordering::Relaxed);
        self.producer.commit.store(at, Ordering::Relaxed);
        self.producer.reserved.store(0, Ordering::Relaxed);
        self.consumer.release.store(at, Ordering::Relaxed);
        self.consumer.acquired.store(0, Ordering::Release);
    }

    /// Un-reads up to `n` elements: first un-acquires handed-out slots, then
    /// re-commits released slots whose bytes are still intact, newest first.
    ///
    /// Stops at the first slot that is neither (never written, claimed by the
    /// producer, or unread data after a wrap) and returns how many elements
    /// were restored.
    ///
    /// # Safety
    ///
    /// Neither side may be inside any ring operation.
    pub unsafe fn rollback(&self, n: usize) -> usize {
        let consumer = &self.consumer;
        let mut acquire = consumer.acquire.load(Ordering::Relaxed);
        let mut release = consumer.release.load(Ordering::Relaxed);
        let mut acquired = consumer.acquired.load(Ordering::Relaxed);

        let mut restored = 0;
        while restored < n {
            let prev = self.retreat_cursor(acquire);
            if acquired > 0 {
                // Still COMMITTED; only the cursor moves.
                acquired -= 1;
            } else if self.flag(prev).load(Ordering::Acquire) == CONSUMED {
                self.flag(prev).store(COMMITTED, Ordering::Release);
                release = prev;
            } else {
                break;
            }
            acquire = prev;
            restored += 1;
        }

        consumer.acquire.store(acquire, Ordering::Relaxed);
        consumer.release.store(release, Ordering::Relaxed);
        consumer.acquired.store(acquired, Ordering::Release);
        restored
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with exactly this layout.
        unsafe { dealloc(self.slots.as_ptr(), self.layout) }
    }
}

// SAFETY: Ring owns its buffer; the raw pointer is never shared outside it.
unsafe impl Send for Ring {}

// SAFETY: Concurrent access is mediated by the per-slot flags with
// Release/Acquire ordering; cursors are atomics written by one side only.
// Payload access is governed by the single-producer/single-consumer contract
// of the unsafe methods.
unsafe impl Sync for Ring {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(element_size: usize, capacity: usize) -> Ring {
        Ring::new(&QueueConfig::new(element_size, capacity), 0).unwrap()
    }

    fn put_u32(ring: &Ring, value: u32) -> bool {
        unsafe { ring.try_put(&value.to_ne_bytes()) }
    }

    fn get_u32(ring: &Ring) -> Option<u32> {
        let mut out = [0u8; 4];
        unsafe { ring.try_get(&mut out) }.then(|| u32::from_ne_bytes(out))
    }

    #[test]
    fn test_slots_are_cache_line_isolated() {
        let ring = ring(4, 8);
        assert_eq!(ring.stride, 2 * CACHE_LINE);
        assert_eq!(ring.slots.as_ptr() as usize % CACHE_LINE, 0);
        for i in 0..8 {
            let flag = ring.flag(i) as *const AtomicU8 as usize;
            let payload = ring.payload(i).as_ptr() as usize;
            assert_eq!(flag % CACHE_LINE, 0);
            assert_eq!(payload - flag, CACHE_LINE);
        }
    }

    #[test]
    fn test_batch_size_widens_slots() {
        let ring = Ring::new(&QueueConfig::new(4, 2).with_batch_size(20), 0).unwrap();
        assert_eq!(ring.slot_size(), 80);
        assert_eq!(ring.stride, 3 * CACHE_LINE);
    }

    #[test]
    fn test_reserve_push_pairs() {
        let ring = ring(4, 2);
        unsafe {
            assert!(!ring.push());
            let a = ring.reserve().unwrap();
            a.as_ptr().cast::<[u8; 4]>().write(7u32.to_ne_bytes());
            let b = ring.reserve().unwrap();
            b.as_ptr().cast::<[u8; 4]>().write(8u32.to_ne_bytes());
            // Every slot is claimed.
            assert!(ring.reserve().is_none());
            assert!(ring.is_empty());

            assert!(ring.push());
            assert!(ring.push());
            assert!(!ring.push());
        }
        assert_eq!(get_u32(&ring), Some(7));
        assert_eq!(get_u32(&ring), Some(8));
        assert_eq!(get_u32(&ring), None);
    }

    #[test]
    fn test_acquire_holds_slot_until_release() {
        let ring = ring(4, 2);
        assert!(put_u32(&ring, 1));
        assert!(put_u32(&ring, 2));
        unsafe {
            let slot = ring.acquire().unwrap();
            assert_eq!(slot.as_ptr().cast::<[u8; 4]>().read(), 1u32.to_ne_bytes());
            assert!(!put_u32(&ring, 3), "acquired slot must not be overwritten");
            assert!(ring.release());
            assert!(!ring.release());
        }
        assert!(put_u32(&ring, 3));
        assert_eq!(get_u32(&ring), Some(2));
        assert_eq!(get_u32(&ring), Some(3));
    }

    #[test]
    fn test_acquire_bounded_by_capacity() {
        let ring = ring(4, 2);
        assert!(put_u32(&ring, 1));
        assert!(put_u32(&ring, 2));
        unsafe {
            assert!(ring.acquire().is_some());
            assert!(ring.acquire().is_some());
            assert!(ring.acquire().is_none());
            assert_eq!(ring.acquired(), 2);
        }
    }

    #[test]
    fn test_empty_acknowledges_control() {
        let ring = ring(4, 2);
        ring.raise(Signal::Reset);
        ring.raise(Signal::Flush);
        assert!(put_u32(&ring, 1));
        assert!(!ring.is_idle());

        // Data pending: signals stay raised.
        assert_eq!(get_u32(&ring), Some(1));
        assert!(ring.is_pending(Signal::Reset));

        assert_eq!(get_u32(&ring), None);
        assert!(!ring.is_pending(Signal::Reset));
        assert!(!ring.is_pending(Signal::Flush));
        assert!(ring.is_idle());

        let stats = ring.consumer_stats();
        assert_eq!(stats.resets_observed, 1);
        assert_eq!(stats.flushes_observed, 1);
        assert_eq!(stats.empty_polls, 1);
    }

    #[test]
    fn test_withdraw_reports_acknowledgement() {
        let ring = ring(4, 2);
        ring.raise(Signal::Reset);
        assert!(ring.withdraw(Signal::Reset));
        ring.raise(Signal::Reset);
        assert_eq!(get_u32(&ring), None);
        assert!(!ring.withdraw(Signal::Reset));
    }

    #[test]
    fn test_publish_during_empty_poll_defers_acknowledgement() {
        let ring = ring(4, 2);
        ring.raise(Signal::Flush);

        // Consumer saw slot 0 empty, then the producer published it before
        // the consumer reached the control flags.
        assert!(put_u32(&ring, 1));
        ring.acknowledge_control(0);
        assert!(ring.is_pending(Signal::Flush));
        assert_eq!(ring.consumer_stats().flushes_observed, 0);

        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), None);
        assert!(!ring.is_pending(Signal::Flush));
        assert!(ring.is_idle());
    }

    #[test]
    fn test_publish_clears_idle() {
        let ring = ring(4, 2);
        assert!(ring.is_idle());
        unsafe {
            assert!(ring.reserve().is_some());
        }
        assert!(!ring.is_idle());

        assert_eq!(get_u32(&ring), None);
        assert!(ring.is_idle());
        assert!(unsafe { ring.push() });
        assert!(!ring.is_idle());
    }

    #[test]
    fn test_observing_finish_marks_idle() {
        let ring = ring(4, 2);
        assert!(put_u32(&ring, 1));
        assert!(!ring.is_idle());

        ring.finish();
        assert!(!ring.is_idle());
        assert!(ring.is_finished());
        assert!(ring.is_idle());
    }

    #[test]
    fn test_batched_slots_round_trip_across_wrap() {
        let ring = Ring::new(&QueueConfig::new(4, 2).with_batch_size(3), 0).unwrap();
        assert_eq!(ring.slot_size(), 12);

        let mut out = [0u8; 12];
        for round in 0u8..3 {
            let first: Vec<u8> = (0..12).map(|b| round * 24 + b).collect();
            let second: Vec<u8> = (12..24).map(|b| round * 24 + b).collect();
            unsafe {
                assert!(ring.try_put(&first));
                assert!(ring.try_put(&second));
                assert!(!ring.try_put(&first));

                assert!(ring.try_get(&mut out));
                assert_eq!(out.as_slice(), first.as_slice());
                assert!(ring.try_get(&mut out));
                assert_eq!(out.as_slice(), second.as_slice());
            }
        }
    }

    #[test]
    fn test_rollback_restores_released() {
        let ring = ring(4, 4);
        for v in 1..=3 {
            assert!(put_u32(&ring, v));
        }
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), Some(2));

        assert_eq!(unsafe { ring.rollback(2) }, 2);
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), Some(2));
        assert_eq!(get_u32(&ring), Some(3));
    }

    #[test]
    fn test_rollback_stops_at_unwritten() {
        let ring = ring(4, 4);
        assert!(put_u32(&ring, 1));
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(unsafe { ring.rollback(3) }, 1);
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), None);
    }

    #[test]
    fn test_rollback_stops_at_overwritten() {
        let ring = ring(4, 4);
        for v in 1..=4 {
            assert!(put_u32(&ring, v));
        }
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), Some(2));
        // Reuses slot 0; only slot 1 is still history.
        assert!(put_u32(&ring, 5));

        assert_eq!(unsafe { ring.rollback(2) }, 1);
        let drained: Vec<_> = std::iter::from_fn(|| get_u32(&ring)).collect();
        assert_eq!(drained, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_rollback_unacquires_first() {
        let ring = ring(4, 4);
        for v in 1..=3 {
            assert!(put_u32(&ring, v));
        }
        assert_eq!(get_u32(&ring), Some(1));
        unsafe {
            assert!(ring.acquire().is_some());
            assert_eq!(ring.rollback(2), 2);
            assert_eq!(ring.acquired(), 0);
        }
        assert_eq!(get_u32(&ring), Some(1));
        assert_eq!(get_u32(&ring), Some(2));
    }

    #[test]
    fn test_clear_discards_everything() {
        let ring = ring(4, 4);
        for v in 1..=3 {
            assert!(put_u32(&ring, v));
        }
        assert_eq!(get_u32(&ring), Some(1));
        unsafe {
            assert!(ring.reserve().is_some());
            ring.clear();
        }
        assert!(ring.is_empty());
        assert_eq!(ring.reserved(), 0);
        assert_eq!(get_u32(&ring), None);
        assert_eq!(unsafe { ring.rollback(1) }, 0);

        assert!(put_u32(&ring, 9));
        assert_eq!(get_u32(&ring), Some(9));
    }
}
