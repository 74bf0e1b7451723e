//! Plain-old-data element types.
//!
//! Queues move opaque bytes. [`Sample`] marks the Rust types whose values can
//! be written into a slot and read back from arbitrary slot bytes, so stages
//! can exchange typed samples (`i16`, `[i16; 2]`, a `#[repr(C)]` complex
//! struct) without hand-rolled byte conversions.
//!
//! ```
//! use separator::Sample;
//!
//! #[derive(Sample, Clone, Copy, Debug, PartialEq)]
//! #[repr(C)]
//! struct Complex16 {
//!     re: i16,
//!     im: i16,
//! }
//!
//! let burst = [Complex16 { re: 1, im: -1 }, Complex16 { re: 2, im: -2 }];
//! assert_eq!(separator::sample::as_bytes(&burst).len(), 8);
//! ```

use std::mem::size_of;

/// Types that can be stored in a queue slot and reconstructed from its bytes.
///
/// # Safety
///
/// Implementers must guarantee:
///
/// - **No padding**: every byte of the value is initialized, so it may be
///   viewed as `[u8]`.
/// - **Every bit pattern is valid**: reading a value back from any slot bytes
///   of the right length yields a valid value (this rules out `bool`, `char`,
///   references, `NonZero*` and most enums).
/// - **No pointers or heap ownership**: the value is fully described by its
///   bytes.
///
/// `#[derive(Sample)]` checks these for `#[repr(C)]` and
/// `#[repr(transparent)]` structs whose fields are all `Sample`.
///
/// ```compile_fail
/// use separator::Sample;
///
/// #[derive(Sample, Clone, Copy)]
/// struct MissingRepr {
///     x: u32,
/// }
/// ```
///
/// ```compile_fail
/// use separator::Sample;
///
/// #[derive(Sample, Clone, Copy)]
/// #[repr(C)]
/// struct Padded {
///     a: u8,
///     b: u32,
/// }
/// ```
pub unsafe trait Sample: Copy + 'static {}

macro_rules! impl_sample {
    ($($t:ty),* $(,)?) => {
        $(
            unsafe impl Sample for $t {}
        )*
    };
}

impl_sample! {
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
}

// Arrays have no inter-element padding.
unsafe impl<T: Sample, const N: usize> Sample for [T; N] {}

/// Views a slice of samples as its underlying bytes.
#[inline]
#[must_use]
pub fn as_bytes<T: Sample>(samples: &[T]) -> &[u8] {
    // SAFETY: `Sample` guarantees no padding, so all `size_of_val` bytes are
    // initialized. u8 has alignment 1 and the lifetime is inherited.
    unsafe { std::slice::from_raw_parts(samples.as_ptr().cast::<u8>(), size_of::<T>() * samples.len()) }
}

/// Views a mutable slice of samples as its underlying bytes.
///
/// Any bytes written through the view leave valid samples behind.
#[inline]
#[must_use]
pub fn as_bytes_mut<T: Sample>(samples: &mut [T]) -> &mut [u8] {
    let len = size_of::<T>() * samples.len();
    // SAFETY: as in `as_bytes`; additionally every bit pattern is a valid `T`,
    // so arbitrary writes cannot produce an invalid value.
    unsafe { std::slice::from_raw_parts_mut(samples.as_mut_ptr().cast::<u8>(), len) }
}

/// Writes `value` into the start of `slot`.
///
/// # Panics
///
/// Panics if `slot` is not exactly `size_of::<T>()` bytes.
#[inline]
pub(crate) fn write_sample<T: Sample>(slot: &mut [u8], value: T) {
    assert_eq!(
        slot.len(),
        size_of::<T>(),
        "sample of {} bytes does not match {}-byte slots",
        size_of::<T>(),
        slot.len()
    );
    // SAFETY: length checked above; unaligned write because slots are byte-aligned.
    unsafe { std::ptr::write_unaligned(slot.as_mut_ptr().cast::<T>(), value) }
}

/// Reads a `T` from `slot`.
///
/// # Panics
///
/// Panics if `slot` is not exactly `size_of::<T>()` bytes.
#[inline]
pub(crate) fn read_sample<T: Sample>(slot: &[u8]) -> T {
    assert_eq!(
        slot.len(),
        size_of::<T>(),
        "sample of {} bytes does not match {}-byte slots",
        size_of::<T>(),
        slot.len()
    );
    // SAFETY: length checked above and every bit pattern is a valid `T`.
    unsafe { std::ptr::read_unaligned(slot.as_ptr().cast::<T>()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, crate::Sample)]
    #[repr(C)]
    struct Iq {
        i: i16,
        q: i16,
    }

    #[derive(Clone, Copy, Debug, PartialEq, crate::Sample)]
    #[repr(transparent)]
    struct Soft(u8);

    #[test]
    fn test_bytes_view_matches_layout() {
        let samples = [1i32, -1];
        let bytes = as_bytes(&samples);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1i32.to_ne_bytes());
    }

    #[test]
    fn test_mutable_view_writes_samples() {
        let mut samples = [0u16; 2];
        as_bytes_mut(&mut samples).copy_from_slice(&[0xFF, 0xFF, 0x01, 0x00]);
        assert_eq!(samples[0], 0xFFFF);
        assert_eq!(samples[1], u16::from_ne_bytes([0x01, 0x00]));
    }

    #[test]
    fn test_derived_struct_through_slot() {
        let mut slot = [0u8; 4];
        write_sample(&mut slot, Iq { i: 7, q: -3 });
        assert_eq!(read_sample::<Iq>(&slot), Iq { i: 7, q: -3 });

        let mut byte = [0u8; 1];
        write_sample(&mut byte, Soft(200));
        assert_eq!(read_sample::<Soft>(&byte), Soft(200));
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_size_mismatch_panics() {
        let mut slot = [0u8; 8];
        write_sample(&mut slot, 1u32);
    }
}
