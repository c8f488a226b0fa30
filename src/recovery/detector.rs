//! Per-stage transform detection.
//!
//! The detector knows the buffer after a stage and the mask file written at
//! that stage. Unmasking the known buffer yields the pre-transform bytes at
//! the mask's positions. A candidate must carry those bytes forward onto
//! the known buffer exactly, and its inverse must survive a forward
//! re-simulation back to the known buffer. The bits a shift drops are
//! missing from its inverse but still present in its forward image.

use rayon::prelude::*;

use crate::comparator::{approximately_equal, score, Tolerance};
use crate::error::{RecoveryError, Result};
use crate::mask::MaskDescriptor;
use crate::transform::{forward_of, inverse_of, masked_positions, unapply_mask};
use crate::types::{
    MatchScore, PixelBuffer, ReconstructConfig, StageOutcome, TransformKind, Transformation,
};

/// Candidate transforms in search order: kind first, then ascending bits.
///
/// Xor only takes `bits = 0`. Rotations and shifts skip `bits = 0`, which
/// would be the identity.
pub fn candidates() -> Vec<Transformation> {
    TransformKind::SEARCH_ORDER
        .iter()
        .flat_map(|&kind| {
            let bits = if kind.takes_bits() { 1..8u8 } else { 0..1u8 };
            bits.map(move |b| Transformation::new(kind, b))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Searching,
    Found(Transformation),
    Undetermined,
}

/// Result of running the detector on one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageDetection {
    pub state: DetectorState,
    /// Identity when the stage is undetermined
    pub transformation: Transformation,
    /// Reconstructed buffer before the stage
    pub buffer: PixelBuffer,
    /// Mask agreement of the accepted candidate
    pub score: Option<MatchScore>,
}

impl StageDetection {
    fn undetermined(known: &PixelBuffer) -> Self {
        Self {
            state: DetectorState::Undetermined,
            transformation: Transformation::identity(),
            buffer: known.clone(),
            score: None,
        }
    }

    pub fn outcome(&self) -> StageOutcome {
        match self.state {
            DetectorState::Found(_) => StageOutcome::Found,
            _ => StageOutcome::Undetermined,
        }
    }
}

/// Mask-derived facts shared by every candidate of a stage
struct StageEvidence {
    /// Bytes before the stage at the masked positions
    expected: Vec<u8>,
    /// Known bytes after the stage at the same positions
    observed: Vec<u8>,
    /// Key bytes at the same positions
    key: Vec<u8>,
}

pub struct Detector<'a> {
    key: &'a PixelBuffer,
    config: &'a ReconstructConfig,
}

impl<'a> Detector<'a> {
    pub fn new(key: &'a PixelBuffer, config: &'a ReconstructConfig) -> Self {
        Self { key, config }
    }

    fn tolerance(&self) -> &Tolerance {
        &self.config.tolerance
    }

    /// Identify the transform that turned some buffer into `known`.
    pub fn detect(&self, known: &PixelBuffer, mask: &MaskDescriptor) -> Result<StageDetection> {
        RecoveryError::check_lengths(known.len(), self.key.len())?;
        if mask.count() == 0 {
            tracing::warn!("mask has no triplets; stage cannot be verified");
            return Ok(StageDetection::undetermined(known));
        }

        let evidence = self.gather_evidence(known, mask)?;
        let candidates = candidates();

        let accepted = if self.config.parallel {
            self.search_parallel(&candidates, known, &evidence)?
        } else {
            self.search_sequential(&candidates, known, &evidence)?
        };

        Ok(match accepted {
            Some((transformation, buffer, mask_score)) => StageDetection {
                state: DetectorState::Found(transformation),
                transformation,
                buffer,
                score: Some(mask_score),
            },
            None => StageDetection::undetermined(known),
        })
    }

    fn gather_evidence(&self, known: &PixelBuffer, mask: &MaskDescriptor) -> Result<StageEvidence> {
        let mut unmasked = known.clone();
        unapply_mask(unmasked.as_bytes_mut(), mask)?;

        let positions = masked_positions(mask, known.len());
        let at = |buf: &[u8]| positions.iter().map(|&p| buf[p]).collect::<Vec<u8>>();
        Ok(StageEvidence {
            expected: at(unmasked.as_bytes()),
            observed: at(known.as_bytes()),
            key: at(self.key.as_bytes()),
        })
    }

    fn search_sequential(
        &self,
        candidates: &[Transformation],
        known: &PixelBuffer,
        evidence: &StageEvidence,
    ) -> Result<Option<(Transformation, PixelBuffer, MatchScore)>> {
        for &t in candidates {
            if let Some((buffer, mask_score)) = self.evaluate(t, known, evidence)? {
                return Ok(Some((t, buffer, mask_score)));
            }
        }
        Ok(None)
    }

    /// Evaluates every candidate and keeps the earliest passing one, so the
    /// outcome matches the sequential search regardless of scheduling.
    fn search_parallel(
        &self,
        candidates: &[Transformation],
        known: &PixelBuffer,
        evidence: &StageEvidence,
    ) -> Result<Option<(Transformation, PixelBuffer, MatchScore)>> {
        let passing: Vec<(usize, Transformation, PixelBuffer, MatchScore)> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(index, &t)| match self.evaluate(t, known, evidence) {
                Ok(Some((buffer, mask_score))) => Some(Ok((index, t, buffer, mask_score))),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            })
            .collect::<Result<_>>()?;

        Ok(passing
            .into_iter()
            .min_by_key(|(index, ..)| *index)
            .map(|(_, t, buffer, mask_score)| (t, buffer, mask_score)))
    }

    /// Check `t` against the mask evidence, then invert `known` with it.
    /// `Ok(None)` is a rejected candidate, not an error.
    fn evaluate(
        &self,
        t: Transformation,
        known: &PixelBuffer,
        evidence: &StageEvidence,
    ) -> Result<Option<(PixelBuffer, MatchScore)>> {
        // Mask bytes are recorded exactly, so only the mismatch budget applies.
        let mut projected = evidence.expected.clone();
        forward_of(t).apply(&mut projected, &evidence.key)?;
        let mask_tolerance = self.tolerance().with_exact_bytes();
        let mask_score = score(&projected, &evidence.observed, &mask_tolerance)?;
        if mask_score.mismatches as f64 > mask_tolerance.mismatch_budget(mask_score.compared) {
            tracing::trace!(candidate = %t, mismatches = mask_score.mismatches, "rejected by mask");
            return Ok(None);
        }

        let candidate = inverse_of(t).apply_to(known, self.key)?;
        let resimulated = forward_of(t).apply_to(&candidate, self.key)?;
        if !approximately_equal(resimulated.as_bytes(), known.as_bytes(), self.tolerance())? {
            tracing::trace!(candidate = %t, "rejected by forward re-simulation");
            return Ok(None);
        }

        Ok(Some((candidate, mask_score)))
    }
}
