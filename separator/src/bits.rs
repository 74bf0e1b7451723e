//! Bit packing for per-bit channels.
//!
//! Bit streams travel through the queues one bit per one-byte element. These
//! helpers convert between that unpacked form and packed bit arrays, where
//! bit `i` is stored LSB-first in byte `i / 8` at position `i % 8`.

/// Bytes needed to hold `bits` packed bits.
#[inline]
#[must_use]
pub const fn packed_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Reads bit `index` of a packed array as `0` or `1`.
///
/// # Panics
///
/// Panics if `index` lies beyond `packed`.
#[inline]
#[must_use]
pub fn read_bit(packed: &[u8], index: usize) -> u8 {
    (packed[index / 8] >> (index % 8)) & 1
}

/// Sets bit `index` of a packed array to the low bit of `value`.
///
/// Any non-zero `value` with a clear low bit is written as `0`; elements on a
/// bit channel are expected to be exactly `0` or `1`.
///
/// # Panics
///
/// Panics if `index` lies beyond `packed`.
#[inline]
pub fn write_bit(packed: &mut [u8], index: usize, value: u8) {
    let mask = 1u8 << (index % 8);
    let byte = &mut packed[index / 8];
    if value & 1 == 1 {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

/// Unpacks the first `out.len()` bits of `packed` into one byte each.
///
/// # Panics
///
/// Panics if `packed` holds fewer than `out.len()` bits.
pub fn unpack_bits(packed: &[u8], out: &mut [u8]) {
    assert!(
        packed.len() >= packed_len(out.len()),
        "{} packed bytes cannot supply {} bits",
        packed.len(),
        out.len()
    );
    for (i, bit) in out.iter_mut().enumerate() {
        *bit = read_bit(packed, i);
    }
}

/// Packs one-byte bits into `out`, touching only the first `unpacked.len()`
/// bit positions.
///
/// # Panics
///
/// Panics if `out` cannot hold `unpacked.len()` bits.
pub fn pack_bits(unpacked: &[u8], out: &mut [u8]) {
    assert!(
        out.len() >= packed_len(unpacked.len()),
        "{} packed bytes cannot hold {} bits",
        out.len(),
        unpacked.len()
    );
    for (i, &bit) in unpacked.iter().enumerate() {
        write_bit(out, i, bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_len_rounds_up() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(1), 1);
        assert_eq!(packed_len(8), 1);
        assert_eq!(packed_len(9), 2);
    }

    #[test]
    fn test_lsb_first_order() {
        let packed = [0b0000_0101u8, 0b1000_0000];
        assert_eq!(read_bit(&packed, 0), 1);
        assert_eq!(read_bit(&packed, 1), 0);
        assert_eq!(read_bit(&packed, 2), 1);
        assert_eq!(read_bit(&packed, 15), 1);
    }

    #[test]
    fn test_write_bit_sets_and_clears() {
        let mut packed = [0xFFu8];
        write_bit(&mut packed, 3, 0);
        assert_eq!(packed[0], 0b1111_0111);
        write_bit(&mut packed, 3, 1);
        assert_eq!(packed[0], 0xFF);
    }

    #[test]
    fn test_pack_preserves_trailing_bits() {
        let mut out = [0b1110_0000u8];
        pack_bits(&[1, 0, 1, 1, 0], &mut out);
        assert_eq!(out[0], 0b1110_1101);
    }

    #[test]
    fn test_unpack_then_pack_restores_bytes() {
        let packed = [0xA5u8, 0x3C, 0x01];
        let mut bits = [0u8; 17];
        unpack_bits(&packed, &mut bits);
        assert_eq!(&bits[..8], &[1, 0, 1, 0, 0, 1, 0, 1]);

        let mut repacked = [0u8; 3];
        pack_bits(&bits, &mut repacked);
        assert_eq!(repacked, packed);
    }

    #[test]
    #[should_panic(expected = "cannot hold")]
    fn test_pack_rejects_short_output() {
        let mut out = [0u8; 1];
        pack_bits(&[0; 9], &mut out);
    }
}
