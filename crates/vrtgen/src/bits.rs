//! Low-level bit read and write utilities for byte slices.
//!
//! Bits are addressed in MSB-first order: bit 0 is the high bit of the first byte,
//! which is also bit 31 of the first big-endian VRT word.

use crate::errors::UnpackError;

/// Reads a single bit at `bit_pos` (0 = MSB of first byte). Returns 0 or 1.
pub fn read_bit_at(data: &[u8], bit_pos: usize) -> Result<u8, UnpackError> {
    if bit_pos >= data.len() * 8 {
        return Err(UnpackError::OutOfBounds);
    }

    let byte_index = bit_pos / 8;
    let bit_index = bit_pos % 8;

    Ok((data[byte_index] >> (7 - bit_index)) & 1)
}

/// Reads `n` bits starting at `bit_pos` as an unsigned value (max 64 bits). MSB-first.
pub fn read_bits_at(data: &[u8], bit_pos: usize, n: usize) -> Result<u64, UnpackError> {
    if n > 64 {
        return Err(UnpackError::TooManyBitsRead);
    }

    if bit_pos
        .checked_add(n)
        .is_none_or(|end| end > data.len() * 8)
    {
        return Err(UnpackError::OutOfBounds);
    }

    let mut value = 0u64;
    let mut pos = bit_pos;

    for _ in 0..n {
        let bit = read_bit_at(data, pos)? as u64;
        value = (value << 1) | bit;
        pos += 1;
    }

    Ok(value)
}

/// Writes the low `n` bits of `value` starting at `bit_pos`, MSB-first.
///
/// The target bits are overwritten. Bits that fall past the end of `data` are dropped;
/// callers size the buffer from the frozen layout.
pub fn write_bits_at(data: &mut [u8], bit_pos: usize, n: usize, value: u64) {
    let n = n.min(64);

    for i in 0..n {
        let pos = bit_pos + i;
        let Some(byte) = data.get_mut(pos / 8) else {
            return;
        };

        let bit = ((value >> (n - 1 - i)) & 1) as u8;
        let shift = 7 - (pos % 8);
        *byte = (*byte & !(1 << shift)) | (bit << shift);
    }
}

/// Mask covering the low `bits` bits.
pub fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }

    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Number of bytes needed to hold `bits` bits.
pub fn bytes_for(bits: usize) -> usize {
    bits.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bit_at() {
        let data = [0b10000000];
        assert_eq!(read_bit_at(&data, 0).unwrap(), 1);
        assert_eq!(read_bit_at(&data, 1).unwrap(), 0);
    }

    #[test]
    fn test_read_bits_at() {
        let data = [0b11111111];
        assert_eq!(read_bits_at(&data, 0, 8).unwrap(), 0b11111111);
    }

    #[test]
    fn test_read_bits_across_bytes() {
        let data = [0x8A, 0xD0, 0xF7, 0x30];
        assert_eq!(read_bits_at(&data, 0, 16).unwrap(), 0x8AD0);
        assert_eq!(read_bits_at(&data, 4, 12).unwrap(), 0xAD0);
        assert_eq!(read_bits_at(&data, 0, 32).unwrap(), 0x8AD0_F730);
    }

    #[test]
    fn test_read_bits_out_of_bounds() {
        let data = [0b11111111];
        assert_eq!(
            read_bits_at(&data, 0, 9).unwrap_err(),
            UnpackError::OutOfBounds
        );
        assert_eq!(
            read_bits_at(&data, usize::MAX, 2).unwrap_err(),
            UnpackError::OutOfBounds
        );
    }

    #[test]
    fn test_read_bits_more_than_64() {
        let data = [0b11111111];
        assert_eq!(
            read_bits_at(&data, 0, 65).unwrap_err(),
            UnpackError::TooManyBitsRead
        );
    }

    #[test]
    fn test_write_bits_at() {
        let mut data = [0u8; 4];
        write_bits_at(&mut data, 0, 16, 0x8AD0);
        write_bits_at(&mut data, 16, 16, 0xF730);
        assert_eq!(data, [0x8A, 0xD0, 0xF7, 0x30]);
    }

    #[test]
    fn test_write_bits_unaligned_overwrites() {
        let mut data = [0xFFu8; 2];
        write_bits_at(&mut data, 3, 6, 0);
        assert_eq!(data, [0b1110_0000, 0b0111_1111]);

        write_bits_at(&mut data, 3, 6, 0b101101);
        assert_eq!(read_bits_at(&data, 3, 6).unwrap(), 0b101101);
    }

    #[test]
    fn test_write_bits_past_end_is_dropped() {
        let mut data = [0u8; 1];
        write_bits_at(&mut data, 4, 8, 0xFF);
        assert_eq!(data, [0x0F]);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(15), 0x7FFF);
        assert_eq!(mask(64), u64::MAX);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0x8AD0, 16), -30000);
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_bytes_for() {
        assert_eq!(bytes_for(0), 0);
        assert_eq!(bytes_for(1), 1);
        assert_eq!(bytes_for(64), 8);
        assert_eq!(bytes_for(65), 9);
    }
}
