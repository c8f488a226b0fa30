use crate::error::{RecoveryError, Result};

/// Cyclic right rotation; `bits = 0` (and multiples of 8) is the identity
#[inline]
pub fn rotate_right(value: u8, bits: u8) -> u8 {
    let bits = bits % 8;
    if bits == 0 {
        return value;
    }
    (value >> bits) | (value << (8 - bits))
}

/// Inverse of [`rotate_right`] for the same `bits`
#[inline]
pub fn rotate_left(value: u8, bits: u8) -> u8 {
    let bits = bits % 8;
    if bits == 0 {
        return value;
    }
    (value << bits) | (value >> (8 - bits))
}

/// Plain right shift; the low `bits` are lost
#[inline]
pub fn shift_right(value: u8, bits: u8) -> u8 {
    value.checked_shr(bits as u32).unwrap_or(0)
}

/// Plain left shift; the high `bits` are lost
#[inline]
pub fn shift_left(value: u8, bits: u8) -> u8 {
    value.checked_shl(bits as u32).unwrap_or(0)
}

/// `buf[i] ^= key[i]`
pub fn xor_in_place(buf: &mut [u8], key: &[u8]) -> Result<()> {
    RecoveryError::check_lengths(buf.len(), key.len())?;
    for (byte, &k) in buf.iter_mut().zip(key) {
        *byte ^= k;
    }
    Ok(())
}

/// Apply a per-byte function to the whole buffer
#[inline]
pub fn map_in_place(buf: &mut [u8], f: impl Fn(u8) -> u8) {
    for byte in buf.iter_mut() {
        *byte = f(*byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_right_three() {
        assert_eq!(rotate_right(0b0000_0001, 3), 0b0010_0000);
        assert_eq!(rotate_right(0b1010_1100, 3), 0b1001_0101);
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        // Rotating by 0 would shift the other half by 8; treated as identity.
        for v in 0..=255u8 {
            assert_eq!(rotate_right(v, 0), v);
            assert_eq!(rotate_left(v, 0), v);
        }
    }

    #[test]
    fn test_rotate_round_trip_all_bits() {
        for bits in 0..8 {
            for v in 0..=255u8 {
                assert_eq!(rotate_left(rotate_right(v, bits), bits), v);
                assert_eq!(rotate_right(rotate_left(v, bits), bits), v);
            }
        }
    }

    #[test]
    fn test_shift_loses_bits() {
        assert_eq!(shift_right(0b1111_1111, 2), 0b0011_1111);
        assert_eq!(shift_left(shift_right(0b1111_1111, 2), 2), 0b1111_1100);
        assert_eq!(shift_left(0b1111_1111, 3), 0b1111_1000);
        assert_eq!(shift_right(shift_left(0b1111_1111, 3), 3), 0b0001_1111);
        assert_eq!(shift_left(0xFF, 8), 0);
    }

    #[test]
    fn test_xor_self_inverse() {
        let original = vec![1u8, 2, 3, 250];
        let key = vec![0xAA, 0x55, 0x00, 0xFF];
        let mut buf = original.clone();
        xor_in_place(&mut buf, &key).unwrap();
        assert_ne!(buf, original);
        xor_in_place(&mut buf, &key).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn test_xor_length_mismatch() {
        let mut buf = vec![0u8; 3];
        assert!(matches!(
            xor_in_place(&mut buf, &[0u8; 6]),
            Err(RecoveryError::DimensionMismatch { left: 3, right: 6 })
        ));
    }
}
