//! Approximate buffer equality.
//!
//! Shift transforms drop bits, so even the right candidate rarely
//! reproduces a buffer exactly. A comparison passes when few enough bytes
//! differ by more than the per-byte tolerance.

use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};
use crate::types::MatchScore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Largest absolute byte difference still counted as a match
    pub per_byte: u8,
    /// Share of compared bytes allowed to exceed `per_byte`
    pub max_mismatch_fraction: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            per_byte: 3,
            max_mismatch_fraction: 0.01,
        }
    }
}

impl Tolerance {
    /// Byte-for-byte equality
    pub fn exact() -> Self {
        Self {
            per_byte: 0,
            max_mismatch_fraction: 0.0,
        }
    }

    /// Same mismatch budget, but any byte difference counts as a mismatch
    pub fn with_exact_bytes(&self) -> Self {
        Self {
            per_byte: 0,
            ..*self
        }
    }

    /// Number of mismatching bytes tolerated over `len` compared bytes
    pub fn mismatch_budget(&self, len: usize) -> f64 {
        self.max_mismatch_fraction * len as f64
    }
}

/// Count bytes whose absolute difference exceeds `per_byte`
pub fn mismatch_count(a: &[u8], b: &[u8], per_byte: u8) -> Result<usize> {
    RecoveryError::check_lengths(a.len(), b.len())?;
    Ok(a.iter()
        .zip(b)
        .filter(|(&x, &y)| x.abs_diff(y) > per_byte)
        .count())
}

/// Mismatch statistics for `a` against `b`
pub fn score(a: &[u8], b: &[u8], tolerance: &Tolerance) -> Result<MatchScore> {
    let mismatches = mismatch_count(a, b, tolerance.per_byte)?;
    Ok(MatchScore {
        mismatches,
        compared: a.len(),
    })
}

pub fn approximately_equal(a: &[u8], b: &[u8], tolerance: &Tolerance) -> Result<bool> {
    let result = score(a, b, tolerance)?;
    Ok(result.mismatches as f64 <= tolerance.mismatch_budget(result.compared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference_at_tolerance_is_equal() {
        let a = vec![100u8; 200];
        let b = vec![103u8; 200];
        assert!(approximately_equal(&a, &b, &Tolerance::default()).unwrap());
        assert!(approximately_equal(&b, &a, &Tolerance::default()).unwrap());
    }

    #[test]
    fn test_difference_above_tolerance_beyond_budget() {
        let a = vec![100u8; 200];
        let mut b = a.clone();
        // 1% of 200 is 2 bytes; three exceed it
        for byte in b.iter_mut().take(3) {
            *byte = 104;
        }
        assert!(!approximately_equal(&a, &b, &Tolerance::default()).unwrap());

        b[2] = 100;
        assert!(approximately_equal(&a, &b, &Tolerance::default()).unwrap());
    }

    #[test]
    fn test_no_wraparound_in_difference() {
        assert_eq!(mismatch_count(&[0], &[255], 3).unwrap(), 1);
        assert_eq!(mismatch_count(&[255], &[253], 3).unwrap(), 0);
    }

    #[test]
    fn test_exact_tolerance() {
        let a = [1u8, 2, 3];
        assert!(approximately_equal(&a, &a, &Tolerance::exact()).unwrap());
        assert!(!approximately_equal(&a, &[1, 2, 4], &Tolerance::exact()).unwrap());
    }

    #[test]
    fn test_exact_bytes_keeps_budget() {
        let loose = Tolerance {
            per_byte: 3,
            max_mismatch_fraction: 0.5,
        };
        let strict = loose.with_exact_bytes();
        assert_eq!(strict.per_byte, 0);
        assert_eq!(strict.max_mismatch_fraction, 0.5);

        // One byte off by one: inside the loose tolerance, inside the strict budget.
        assert!(approximately_equal(&[1, 2], &[1, 3], &strict).unwrap());
        assert!(!approximately_equal(&[1, 2], &[2, 3], &strict).unwrap());
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = approximately_equal(&[0; 3], &[0; 4], &Tolerance::default()).unwrap_err();
        assert!(matches!(err, RecoveryError::DimensionMismatch { left: 3, right: 4 }));
    }

    #[test]
    fn test_score_fraction() {
        let result = score(&[0, 0, 0, 0], &[0, 9, 0, 9], &Tolerance::default()).unwrap();
        assert_eq!(result.mismatches, 2);
        assert!((result.mismatch_fraction() - 0.5).abs() < 1e-9);
    }
}
