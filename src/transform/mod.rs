//! Transform catalog: forward and inverse byte operators for every
//! transform kind, plus the seeded masking operator.

pub mod bitwise;
pub mod masking;

use crate::error::Result;
use crate::types::{PixelBuffer, TransformKind, Transformation};
use bitwise::{map_in_place, rotate_left, rotate_right, shift_left, shift_right, xor_in_place};

pub use masking::{apply_mask, channel_positions, masked_positions, unapply_mask};

/// A whole-buffer byte operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOp {
    Xor,
    RotateRight(u8),
    RotateLeft(u8),
    ShiftRight(u8),
    ShiftLeft(u8),
    Identity,
}

impl ByteOp {
    /// Apply in place. `key` is only read by `Xor`.
    pub fn apply(&self, buf: &mut [u8], key: &[u8]) -> Result<()> {
        match *self {
            ByteOp::Xor => xor_in_place(buf, key)?,
            ByteOp::RotateRight(bits) => map_in_place(buf, |v| rotate_right(v, bits)),
            ByteOp::RotateLeft(bits) => map_in_place(buf, |v| rotate_left(v, bits)),
            ByteOp::ShiftRight(bits) => map_in_place(buf, |v| shift_right(v, bits)),
            ByteOp::ShiftLeft(bits) => map_in_place(buf, |v| shift_left(v, bits)),
            ByteOp::Identity => {}
        }
        Ok(())
    }

    /// Apply to a copy of `buf`
    pub fn apply_to(&self, buf: &PixelBuffer, key: &PixelBuffer) -> Result<PixelBuffer> {
        let mut out = buf.clone();
        self.apply(out.as_bytes_mut(), key.as_bytes())?;
        Ok(out)
    }
}

/// Operator that performs `t`
pub fn forward_of(t: Transformation) -> ByteOp {
    match t.kind {
        TransformKind::Xor => ByteOp::Xor,
        TransformKind::RotateRight => ByteOp::RotateRight(t.bits),
        TransformKind::RotateLeft => ByteOp::RotateLeft(t.bits),
        TransformKind::ShiftRight => ByteOp::ShiftRight(t.bits),
        TransformKind::ShiftLeft => ByteOp::ShiftLeft(t.bits),
        TransformKind::Identity => ByteOp::Identity,
    }
}

/// Operator that undoes `t`.
///
/// Exact for Xor and rotations. For shifts it is the opposite shift, which
/// cannot restore the bits the forward shift dropped; see
/// [`Transformation::is_lossy`].
pub fn inverse_of(t: Transformation) -> ByteOp {
    match t.kind {
        TransformKind::Xor => ByteOp::Xor,
        TransformKind::RotateRight => ByteOp::RotateLeft(t.bits),
        TransformKind::RotateLeft => ByteOp::RotateRight(t.bits),
        TransformKind::ShiftRight => ByteOp::ShiftLeft(t.bits),
        TransformKind::ShiftLeft => ByteOp::ShiftRight(t.bits),
        TransformKind::Identity => ByteOp::Identity,
    }
}
