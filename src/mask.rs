//! Mask files.
//!
//! A mask file is whitespace separated text: the seed, then `r g b`
//! triplets until end of file. Each triplet stores, for three consecutive
//! seeded positions, the sum of the byte before the stage's transform and
//! the byte after it.

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::error::{RecoveryError, Result};
use crate::transform::masking::channel_positions;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaskDescriptor {
    pub seed: u64,
    pub triplets: Vec<[u32; 3]>,
}

impl MaskDescriptor {
    pub fn new(seed: u64, triplets: Vec<[u32; 3]>) -> Self {
        Self { seed, triplets }
    }

    /// Number of triplets, i.e. how many pixel positions the mask covers
    pub fn count(&self) -> usize {
        self.triplets.len()
    }

    /// Build the descriptor a stage `previous -> transformed` leaves behind.
    ///
    /// Sums are stored unreduced, as the files written by the encoder hold
    /// values up to 510.
    pub fn capture(seed: u64, count: usize, previous: &[u8], transformed: &[u8]) -> Result<Self> {
        RecoveryError::check_lengths(previous.len(), transformed.len())?;
        if previous.is_empty() && count > 0 {
            return Err(RecoveryError::InvalidArgument(
                "cannot capture a mask from an empty buffer".to_string(),
            ));
        }

        let triplets = (0..count)
            .map(|t| {
                let positions = channel_positions(seed, t, previous.len());
                positions.map(|p| previous[p] as u32 + transformed[p] as u32)
            })
            .collect();

        Ok(Self { seed, triplets })
    }

    /// Parse mask text; errors name the offending line
    pub fn parse(text: &str) -> Result<Self> {
        let mut values = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            for token in line.split_whitespace() {
                let value: i64 = token.parse().map_err(|_| {
                    RecoveryError::Parse(format!(
                        "line {}: '{}' is not an integer",
                        line_no + 1,
                        token
                    ))
                })?;
                if value < 0 {
                    return Err(RecoveryError::Parse(format!(
                        "line {}: negative value {}",
                        line_no + 1,
                        value
                    )));
                }
                values.push((line_no + 1, value));
            }
        }

        let mut iter = values.into_iter();
        let (_, seed) = iter
            .next()
            .ok_or_else(|| RecoveryError::Parse("mask file has no seed".to_string()))?;

        let rest: Vec<(usize, i64)> = iter.collect();
        if rest.len() % 3 != 0 {
            return Err(RecoveryError::Parse(format!(
                "{} values after the seed is not a whole number of RGB triplets",
                rest.len()
            )));
        }

        let mut triplets = Vec::with_capacity(rest.len() / 3);
        for chunk in rest.chunks_exact(3) {
            let mut triplet = [0u32; 3];
            for (slot, &(line, value)) in triplet.iter_mut().zip(chunk) {
                *slot = u32::try_from(value).map_err(|_| {
                    RecoveryError::Parse(format!("line {line}: value {value} out of range"))
                })?;
            }
            triplets.push(triplet);
        }

        Ok(Self {
            seed: seed as u64,
            triplets,
        })
    }

    /// Same format `parse` reads: seed line, one triplet per line
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(16 + self.triplets.len() * 12);
        let _ = writeln!(out, "{}", self.seed);
        for [r, g, b] in &self.triplets {
            let _ = writeln!(out, "{r} {g} {b}");
        }
        out
    }
}

impl FromStr for MaskDescriptor {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub fn parse_mask_file(path: &Path) -> Result<MaskDescriptor> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RecoveryError::FileNotFound(path.display().to_string())
        } else {
            RecoveryError::Io(e)
        }
    })?;
    MaskDescriptor::parse(&text).map_err(|err| match err {
        RecoveryError::Parse(msg) => RecoveryError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn write_mask_file(path: &Path, mask: &MaskDescriptor) -> Result<()> {
    std::fs::write(path, mask.to_text())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_and_triplets_in_order() {
        let mask = MaskDescriptor::parse("42\n1 2 3\n4 5 6\n").unwrap();
        assert_eq!(mask.seed, 42);
        assert_eq!(mask.triplets, vec![[1, 2, 3], [4, 5, 6]]);
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn test_parse_ignores_layout() {
        let mask = MaskDescriptor::parse("  7 100 200\n300 \t 1 2 3").unwrap();
        assert_eq!(mask.seed, 7);
        assert_eq!(mask.triplets, vec![[100, 200, 300], [1, 2, 3]]);
    }

    #[test]
    fn test_parse_seed_only() {
        let mask = MaskDescriptor::parse("9").unwrap();
        assert_eq!(mask.seed, 9);
        assert!(mask.triplets.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(MaskDescriptor::parse("").is_err());
        assert!(MaskDescriptor::parse("   \n ").is_err());
        assert!(MaskDescriptor::parse("5\n1 2").is_err());
        assert!(MaskDescriptor::parse("5\n1 -2 3").is_err());

        let err = MaskDescriptor::parse("5\n1 2 3\n4 x 6").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_text_round_trip() {
        let mask = MaskDescriptor::new(12, vec![[510, 0, 17], [3, 4, 5]]);
        assert_eq!(MaskDescriptor::parse(&mask.to_text()).unwrap(), mask);
    }

    #[test]
    fn test_capture_stores_unreduced_sums() {
        let previous = [200u8, 10, 20, 30, 40, 50];
        let transformed = [255u8, 1, 2, 3, 4, 5];
        let mask = MaskDescriptor::capture(0, 2, &previous, &transformed).unwrap();
        assert_eq!(mask.triplets, vec![[455, 11, 22], [33, 44, 55]]);
    }

    #[test]
    fn test_capture_wraps_positions() {
        let previous = [1u8, 2, 3, 4, 5, 6];
        let transformed = [0u8; 6];
        let mask = MaskDescriptor::capture(5, 1, &previous, &transformed).unwrap();
        assert_eq!(mask.triplets, vec![[6, 1, 2]]);
    }

    #[test]
    fn test_capture_length_mismatch() {
        assert!(matches!(
            MaskDescriptor::capture(0, 1, &[0; 3], &[0; 6]),
            Err(RecoveryError::DimensionMismatch { .. })
        ));
    }
}
