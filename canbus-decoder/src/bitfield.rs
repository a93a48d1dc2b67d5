//! Bit field extraction and insertion
//!
//! Reads and writes N-bit integer fields at arbitrary bit offsets in a byte
//! buffer. Two start bit conventions are supported:
//!
//! - **Little-endian (Intel)**: `start_bit` is the absolute index of the
//!   field's LSB, bit 0 being the LSB of byte 0. Bits are read upward.
//! - **Big-endian (Motorola)**: `start_bit` is the MSB of the field in the
//!   per-byte swapped (DBC "sawtooth") numbering. It is normalized to an
//!   MSB-first absolute index and bits are read from there towards the end
//!   of the buffer, most significant first.
//!
//! Every access is bounds checked up front; a field that does not fit the
//! buffer is an error, never a panic.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::signals::ByteOrder;
use crate::types::{DecoderError, Result};

/// Bit field codec
pub struct BitFieldCodec;

impl BitFieldCodec {
    /// Convert a Motorola start bit into an MSB-first absolute bit index.
    ///
    /// The transform is an involution: applying it to its own output returns
    /// the original start bit, so the same function also denormalizes.
    /// Little-endian start bits are returned unchanged.
    pub fn normalize_start_bit(start_bit: usize, byte_order: ByteOrder) -> usize {
        match byte_order {
            ByteOrder::LittleEndian => start_bit,
            ByteOrder::BigEndian => (start_bit / 8) * 8 + (7 - start_bit % 8),
        }
    }

    /// Extract an unsigned field
    pub fn extract(
        buffer: &[u8],
        start_bit: usize,
        bit_length: usize,
        byte_order: ByteOrder,
    ) -> Result<u64> {
        let first = Self::check_range(buffer.len(), start_bit, bit_length, byte_order)?;

        // Byte aligned fields take the byteorder fast path
        if first % 8 == 0 && bit_length % 8 == 0 {
            let bytes = &buffer[first / 8..first / 8 + bit_length / 8];
            return Ok(match byte_order {
                ByteOrder::LittleEndian => LittleEndian::read_uint(bytes, bytes.len()),
                ByteOrder::BigEndian => BigEndian::read_uint(bytes, bytes.len()),
            });
        }

        Ok(match byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(buffer, first, bit_length),
            ByteOrder::BigEndian => Self::extract_big_endian(buffer, first, bit_length),
        })
    }

    /// Extract a field and sign-extend it from `bit_length` to 64 bits
    pub fn extract_signed(
        buffer: &[u8],
        start_bit: usize,
        bit_length: usize,
        byte_order: ByteOrder,
    ) -> Result<i64> {
        let raw = Self::extract(buffer, start_bit, bit_length, byte_order)?;
        Ok(Self::sign_extend(raw, bit_length))
    }

    /// Write the low `bit_length` bits of `value` into the buffer.
    ///
    /// Bits outside the field are left untouched. Higher bits of `value`
    /// are discarded, which makes negative values stored as two's
    /// complement work without special casing.
    pub fn insert(
        buffer: &mut [u8],
        start_bit: usize,
        bit_length: usize,
        byte_order: ByteOrder,
        value: u64,
    ) -> Result<()> {
        let first = Self::check_range(buffer.len(), start_bit, bit_length, byte_order)?;
        let value = value & Self::mask(bit_length);

        if first % 8 == 0 && bit_length % 8 == 0 {
            let bytes = &mut buffer[first / 8..first / 8 + bit_length / 8];
            let nbytes = bytes.len();
            match byte_order {
                ByteOrder::LittleEndian => LittleEndian::write_uint(bytes, value, nbytes),
                ByteOrder::BigEndian => BigEndian::write_uint(bytes, value, nbytes),
            }
            return Ok(());
        }

        for i in 0..bit_length {
            let (bit_pos, bit) = match byte_order {
                ByteOrder::LittleEndian => (first + i, (value >> i) & 0x01),
                ByteOrder::BigEndian => (first + i, (value >> (bit_length - 1 - i)) & 0x01),
            };
            let shift = match byte_order {
                ByteOrder::LittleEndian => bit_pos % 8,
                ByteOrder::BigEndian => 7 - bit_pos % 8,
            };
            let byte = &mut buffer[bit_pos / 8];
            *byte = (*byte & !(1 << shift)) | ((bit as u8) << shift);
        }
        Ok(())
    }

    /// Sign-extend a value from N bits to 64 bits
    pub fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length == 0 || bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            (value | (!0u64 << bit_length)) as i64
        } else {
            value as i64
        }
    }

    /// Mask with the low `bit_length` bits set
    pub fn mask(bit_length: usize) -> u64 {
        if bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << bit_length) - 1
        }
    }

    /// Validate the field and return its first bit in absolute order
    /// (LSB-first for Intel, MSB-first for Motorola).
    fn check_range(
        buffer_len: usize,
        start_bit: usize,
        bit_length: usize,
        byte_order: ByteOrder,
    ) -> Result<usize> {
        if bit_length == 0 || bit_length > 64 {
            return Err(DecoderError::BitLength(bit_length));
        }
        let first = Self::normalize_start_bit(start_bit, byte_order);
        let available = buffer_len * 8;
        let end = first
            .checked_add(bit_length)
            .ok_or(DecoderError::BitLength(bit_length))?;
        if end > available {
            return Err(DecoderError::Extraction {
                start: first,
                end,
                available,
            });
        }
        Ok(first)
    }

    fn extract_little_endian(data: &[u8], first: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = first + i;
            let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
            result |= (bit_value as u64) << i;
        }

        result
    }

    fn extract_big_endian(data: &[u8], first: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = first + i;
            let bit_value = (data[bit_pos / 8] >> (7 - bit_pos % 8)) & 0x01;
            result = (result << 1) | bit_value as u64;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Motorola extraction by walking the DBC sawtooth numbering directly
    fn reference_motorola(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut bit = start_bit;
        let mut result = 0u64;
        for _ in 0..length {
            let value = (data[bit / 8] >> (bit % 8)) & 0x01;
            result = (result << 1) | value as u64;
            bit = if bit % 8 == 0 { bit + 15 } else { bit - 1 };
        }
        result
    }

    #[test]
    fn test_normalize_vectors() {
        let vectors = [(7, 0), (23, 16), (39, 32), (47, 40), (63, 56), (19, 20), (14, 9)];
        for (dbc, normalized) in vectors {
            assert_eq!(BitFieldCodec::normalize_start_bit(dbc, ByteOrder::BigEndian), normalized);
            assert_eq!(BitFieldCodec::normalize_start_bit(normalized, ByteOrder::BigEndian), dbc);
        }
        assert_eq!(BitFieldCodec::normalize_start_bit(14, ByteOrder::LittleEndian), 14);
    }

    #[test]
    fn test_extract_little_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(BitFieldCodec::extract(&data, 0, 8, ByteOrder::LittleEndian).unwrap(), 0xAB);
        assert_eq!(BitFieldCodec::extract(&data, 0, 16, ByteOrder::LittleEndian).unwrap(), 0xCDAB);
        assert_eq!(BitFieldCodec::extract(&data, 4, 8, ByteOrder::LittleEndian).unwrap(), 0xDA);
    }

    #[test]
    fn test_extract_big_endian_simple() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        assert_eq!(BitFieldCodec::extract(&data, 7, 8, ByteOrder::BigEndian).unwrap(), 0xAB);
        assert_eq!(BitFieldCodec::extract(&data, 7, 16, ByteOrder::BigEndian).unwrap(), 0xABCD);
        // 12 bits from MSB of byte 0: 0xABC
        assert_eq!(BitFieldCodec::extract(&data, 7, 12, ByteOrder::BigEndian).unwrap(), 0xABC);
    }

    #[test]
    fn test_boundary_motorola_start_14_length_6() {
        let data = [0x00, 0b0111_1110, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let decoded = BitFieldCodec::extract(&data, 14, 6, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, reference_motorola(&data, 14, 6));
        assert_eq!(decoded, 0b11_1111);

        let data = [0x12, 0x5A, 0xC3, 0x00, 0xFF, 0x01, 0x80, 0x7E];
        assert_eq!(
            BitFieldCodec::extract(&data, 14, 6, ByteOrder::BigEndian).unwrap(),
            reference_motorola(&data, 14, 6)
        );
    }

    #[test]
    fn test_signed_extraction() {
        let data = [0xFF, 0x7F];
        assert_eq!(BitFieldCodec::extract_signed(&data, 0, 8, ByteOrder::LittleEndian).unwrap(), -1);
        assert_eq!(BitFieldCodec::extract_signed(&data, 0, 16, ByteOrder::LittleEndian).unwrap(), 0x7FFF);
        assert_eq!(BitFieldCodec::extract_signed(&[0x00, 0x80], 0, 16, ByteOrder::LittleEndian).unwrap(), -32768);
        assert_eq!(BitFieldCodec::extract_signed(&[0b0000_0100], 0, 3, ByteOrder::LittleEndian).unwrap(), -4);
    }

    #[test]
    fn test_full_width_fields() {
        let data = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
        assert_eq!(
            BitFieldCodec::extract(&data, 0, 64, ByteOrder::LittleEndian).unwrap(),
            0xEFCD_AB89_6745_2301
        );
        assert_eq!(
            BitFieldCodec::extract(&data, 7, 64, ByteOrder::BigEndian).unwrap(),
            0x0123_4567_89AB_CDEF
        );
    }

    #[test]
    fn test_out_of_bounds_is_error() {
        let data = [0u8; 8];
        assert!(matches!(
            BitFieldCodec::extract(&data, 60, 8, ByteOrder::LittleEndian),
            Err(DecoderError::Extraction { start: 60, end: 68, available: 64 })
        ));
        // Motorola start in the last byte runs past the end
        assert!(BitFieldCodec::extract(&data, 63, 16, ByteOrder::BigEndian).is_err());
        assert!(BitFieldCodec::extract(&[], 0, 1, ByteOrder::LittleEndian).is_err());
        assert!(BitFieldCodec::extract(&data, usize::MAX, 8, ByteOrder::LittleEndian).is_err());
    }

    #[test]
    fn test_bit_length_rejected() {
        let data = [0u8; 16];
        assert!(matches!(
            BitFieldCodec::extract(&data, 0, 65, ByteOrder::LittleEndian),
            Err(DecoderError::BitLength(65))
        ));
        assert!(matches!(
            BitFieldCodec::extract(&data, 0, 0, ByteOrder::BigEndian),
            Err(DecoderError::BitLength(0))
        ));
    }

    #[test]
    fn test_insert_preserves_neighbours() {
        let mut data = [0xFF; 4];
        BitFieldCodec::insert(&mut data, 4, 8, ByteOrder::LittleEndian, 0).unwrap();
        assert_eq!(data, [0x0F, 0xF0, 0xFF, 0xFF]);

        let mut data = [0x00; 4];
        BitFieldCodec::insert(&mut data, 14, 6, ByteOrder::BigEndian, 0b11_1111).unwrap();
        assert_eq!(data, [0x00, 0b0111_1110, 0x00, 0x00]);
    }

    #[test]
    fn test_insert_negative_value() {
        let mut data = [0u8; 2];
        BitFieldCodec::insert(&mut data, 0, 12, ByteOrder::LittleEndian, (-5i64) as u64).unwrap();
        assert_eq!(BitFieldCodec::extract_signed(&data, 0, 12, ByteOrder::LittleEndian).unwrap(), -5);
        assert_eq!(data[1] & 0xF0, 0);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(BitFieldCodec::sign_extend(0x7F, 8), 127);
        assert_eq!(BitFieldCodec::sign_extend(0xFF, 8), -1);
        assert_eq!(BitFieldCodec::sign_extend(0x8000, 16), -32768);
        assert_eq!(BitFieldCodec::sign_extend(u64::MAX, 64), -1);
    }

    fn byte_order() -> impl Strategy<Value = ByteOrder> {
        prop_oneof![Just(ByteOrder::LittleEndian), Just(ByteOrder::BigEndian)]
    }

    proptest! {
        #[test]
        fn normalize_is_involution(start in 0usize..64) {
            let once = BitFieldCodec::normalize_start_bit(start, ByteOrder::BigEndian);
            prop_assert_eq!(BitFieldCodec::normalize_start_bit(once, ByteOrder::BigEndian), start);
        }

        #[test]
        fn insert_then_extract(
            buffer in proptest::collection::vec(any::<u8>(), 8),
            start in 0usize..64,
            length in 1usize..=64,
            order in byte_order(),
            value in any::<u64>(),
        ) {
            let first = BitFieldCodec::normalize_start_bit(start, order);
            prop_assume!(first + length <= 64);
            let value = value & BitFieldCodec::mask(length);
            let mut buffer = buffer;
            BitFieldCodec::insert(&mut buffer, start, length, order, value).unwrap();
            prop_assert_eq!(BitFieldCodec::extract(&buffer, start, length, order).unwrap(), value);
            prop_assert_eq!(
                BitFieldCodec::extract_signed(&buffer, start, length, order).unwrap(),
                BitFieldCodec::sign_extend(value, length)
            );
        }

        #[test]
        fn motorola_matches_reference(
            buffer in proptest::collection::vec(any::<u8>(), 8),
            start in 0usize..64,
            length in 1usize..=32,
        ) {
            let first = BitFieldCodec::normalize_start_bit(start, ByteOrder::BigEndian);
            prop_assume!(first + length <= 64);
            prop_assert_eq!(
                BitFieldCodec::extract(&buffer, start, length, ByteOrder::BigEndian).unwrap(),
                reference_motorola(&buffer, start, length)
            );
        }

        #[test]
        fn extract_never_panics(
            buffer in proptest::collection::vec(any::<u8>(), 0..16),
            start in 0usize..256,
            length in 0usize..80,
            order in byte_order(),
        ) {
            let _ = BitFieldCodec::extract(&buffer, start, length, order);
        }
    }
}
