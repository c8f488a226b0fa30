//! Seeded positional masking.
//!
//! Triplet `t` covers the three bytes starting at `(seed + 3t) mod len`;
//! every channel index wraps, so a seed near the end of the buffer stays
//! in bounds. A stored value is `previous + transformed`, so one operator
//! turns a transformed byte into the previous one and the other turns it
//! back. Both read every touched byte before writing anything: when two
//! triplets cover the same byte, the later triplet wins.

use crate::error::{RecoveryError, Result};
use crate::mask::MaskDescriptor;

/// Byte positions of the three channels of triplet `index`
#[inline]
pub fn channel_positions(seed: u64, index: usize, len: usize) -> [usize; 3] {
    let base = ((seed % len as u64) as usize + (3 * index) % len) % len;
    [base, (base + 1) % len, (base + 2) % len]
}

/// Every position the mask touches, triplet by triplet, channels in order
pub fn masked_positions(mask: &MaskDescriptor, len: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..mask.count())
        .flat_map(|t| channel_positions(mask.seed, t, len))
        .collect()
}

/// Turn post-transform bytes into pre-transform bytes:
/// `previous = stored - transformed`
pub fn unapply_mask(buf: &mut [u8], mask: &MaskDescriptor) -> Result<()> {
    reflect(buf, mask)
}

/// Turn pre-transform bytes back into post-transform bytes:
/// `transformed = stored - previous`
pub fn apply_mask(buf: &mut [u8], mask: &MaskDescriptor) -> Result<()> {
    reflect(buf, mask)
}

fn reflect(buf: &mut [u8], mask: &MaskDescriptor) -> Result<()> {
    if mask.triplets.is_empty() {
        return Ok(());
    }
    if buf.is_empty() {
        return Err(RecoveryError::InvalidArgument(
            "cannot mask an empty buffer".to_string(),
        ));
    }

    let positions = masked_positions(mask, buf.len());
    let before: Vec<u8> = positions.iter().map(|&p| buf[p]).collect();
    let stored = mask.triplets.iter().flatten();

    for ((&pos, &old), &value) in positions.iter().zip(&before).zip(stored) {
        buf[pos] = (value as u8).wrapping_sub(old);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_wrap() {
        assert_eq!(channel_positions(0, 0, 12), [0, 1, 2]);
        assert_eq!(channel_positions(0, 2, 12), [6, 7, 8]);
        assert_eq!(channel_positions(10, 0, 12), [10, 11, 0]);
        assert_eq!(channel_positions(25, 1, 12), [4, 5, 6]);
        assert_eq!(channel_positions(u64::MAX, 3, 12), [0, 1, 2]);
    }

    #[test]
    fn test_unapply_recovers_previous_bytes() {
        let previous = [10u8, 20, 30, 40, 50, 60];
        let transformed = [200u8, 100, 0, 1, 2, 3];
        let mask = MaskDescriptor::capture(3, 1, &previous, &transformed).unwrap();

        let mut buf = transformed;
        unapply_mask(&mut buf, &mask).unwrap();
        assert_eq!(buf, [200, 100, 0, 40, 50, 60]);
    }

    #[test]
    fn test_round_trip_without_overlap() {
        let original: Vec<u8> = (0..12).map(|i| i * 19).collect();
        let mask = MaskDescriptor::new(4, vec![[300, 1, 255], [7, 8, 9]]);

        let mut buf = original.clone();
        apply_mask(&mut buf, &mask).unwrap();
        assert_ne!(buf, original);
        unapply_mask(&mut buf, &mask).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn test_overlap_last_write_wins() {
        // 5 triplets over 12 bytes: triplet 4 lands on triplet 0's bytes.
        let mask = MaskDescriptor::new(
            0,
            vec![[10, 10, 10], [0, 0, 0], [0, 0, 0], [0, 0, 0], [50, 60, 70]],
        );
        let original = vec![1u8; 12];

        let mut buf = original.clone();
        unapply_mask(&mut buf, &mask).unwrap();
        // Both triplets read the original byte; triplet 4 writes last.
        assert_eq!(&buf[..3], &[49, 59, 69]);
        assert_eq!(&buf[3..], &[255u8; 9][..]);

        apply_mask(&mut buf, &mask).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn test_wraparound_arithmetic() {
        let mask = MaskDescriptor::new(0, vec![[5, 256, 511]]);
        let mut buf = vec![10u8, 1, 255];
        unapply_mask(&mut buf, &mask).unwrap();
        assert_eq!(buf, vec![251, 255, 0]);
    }

    #[test]
    fn test_empty_buffer() {
        let mut buf: Vec<u8> = Vec::new();
        assert!(unapply_mask(&mut buf, &MaskDescriptor::new(1, vec![])).is_ok());
        assert!(unapply_mask(&mut buf, &MaskDescriptor::new(1, vec![[1, 2, 3]])).is_err());
    }
}
