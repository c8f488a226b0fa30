//! Forward simulation of a known transform chain.
//!
//! Produces exactly what the reconstruction consumes: the terminal buffer
//! and one mask per stage, captured from the buffers on both sides of the
//! stage's transform.

use sha2::{Digest, Sha256};

use crate::error::{RecoveryError, Result};
use crate::mask::MaskDescriptor;
use crate::transform::forward_of;
use crate::types::{PixelBuffer, Transformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    /// Same seed for every stage
    Fixed(u64),
    /// Per-stage seed hashed from a base value
    Derived(u64),
}

/// Where each stage's mask goes and how many pixels it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPlan {
    pub seeds: SeedSource,
    pub count: usize,
}

impl MaskPlan {
    pub fn fixed(seed: u64, count: usize) -> Self {
        Self {
            seeds: SeedSource::Fixed(seed),
            count,
        }
    }

    pub fn derived(base: u64, count: usize) -> Self {
        Self {
            seeds: SeedSource::Derived(base),
            count,
        }
    }

    /// Seed for `stage` on a buffer of `len` bytes
    pub fn seed_for(&self, stage: usize, len: usize) -> u64 {
        match self.seeds {
            SeedSource::Fixed(seed) => seed,
            SeedSource::Derived(base) => {
                let mut hasher = Sha256::new();
                hasher.update(base.to_le_bytes());
                hasher.update((stage as u64).to_le_bytes());
                let digest = hasher.finalize();
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                u64::from_le_bytes(head) % (len.max(1) as u64)
            }
        }
    }
}

/// A simulated chain: every stage buffer plus the masks
#[derive(Debug, Clone)]
pub struct EncodedChain {
    /// `stages[0]` is the original, `stages[n]` the terminal buffer
    pub stages: Vec<PixelBuffer>,
    pub terminal: PixelBuffer,
    /// `masks[i]` is captured across stage `i`
    pub masks: Vec<MaskDescriptor>,
}

/// Run `chain` forward over `original`, capturing a mask per stage
pub fn encode_chain(
    original: &PixelBuffer,
    key: &PixelBuffer,
    chain: &[Transformation],
    plan: &MaskPlan,
) -> Result<EncodedChain> {
    RecoveryError::check_lengths(original.len(), key.len())?;
    if original.is_empty() {
        return Err(RecoveryError::InvalidArgument(
            "cannot encode an empty buffer".to_string(),
        ));
    }

    let mut stages = Vec::with_capacity(chain.len() + 1);
    let mut masks = Vec::with_capacity(chain.len());
    stages.push(original.clone());

    for (stage, &t) in chain.iter().enumerate() {
        let previous = &stages[stage];
        let transformed = forward_of(t).apply_to(previous, key)?;
        let seed = plan.seed_for(stage, previous.len());
        masks.push(MaskDescriptor::capture(
            seed,
            plan.count,
            previous.as_bytes(),
            transformed.as_bytes(),
        )?);
        tracing::debug!(stage, transform = %t, seed, "encoded stage");
        stages.push(transformed);
    }

    let terminal = stages[chain.len()].clone();
    Ok(EncodedChain {
        stages,
        terminal,
        masks,
    })
}
