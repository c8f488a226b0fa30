use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::comparator::Tolerance;
use crate::error::{RecoveryError, Result};

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of a tightly packed RGB buffer with these dimensions
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Row-major RGB bytes without padding.
///
/// Buffers are plain owned values: a stage produces one and moves it into
/// the pipeline's stage array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PixelBuffer {
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Wrap `data`, checking it matches `dims`
    pub fn for_dimensions(dims: Dimensions, data: Vec<u8>) -> Result<Self> {
        RecoveryError::check_lengths(data.len(), dims.byte_len())?;
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for PixelBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Byte-level transform kinds that can appear in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Xor,
    RotateRight,
    RotateLeft,
    ShiftRight,
    ShiftLeft,
    Identity,
}

impl TransformKind {
    /// Order in which the detector tries kinds; earlier kinds win ties
    pub const SEARCH_ORDER: [TransformKind; 5] = [
        TransformKind::Xor,
        TransformKind::RotateRight,
        TransformKind::RotateLeft,
        TransformKind::ShiftRight,
        TransformKind::ShiftLeft,
    ];

    /// Whether the `bits` parameter means anything for this kind
    pub fn takes_bits(&self) -> bool {
        !matches!(self, TransformKind::Xor | TransformKind::Identity)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Xor => "xor",
            TransformKind::RotateRight => "rotate_right",
            TransformKind::RotateLeft => "rotate_left",
            TransformKind::ShiftRight => "shift_right",
            TransformKind::ShiftLeft => "shift_left",
            TransformKind::Identity => "identity",
        }
    }
}

/// One identified (or hypothesised) step of a transform chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Transformation {
    pub kind: TransformKind,
    pub bits: u8,
}

impl Transformation {
    /// `bits` is reduced modulo 8 and forced to 0 for kinds without a parameter.
    pub fn new(kind: TransformKind, bits: u8) -> Self {
        let bits = if kind.takes_bits() { bits % 8 } else { 0 };
        Self { kind, bits }
    }

    pub fn xor() -> Self {
        Self::new(TransformKind::Xor, 0)
    }

    pub fn identity() -> Self {
        Self::new(TransformKind::Identity, 0)
    }

    pub fn rotate_right(bits: u8) -> Self {
        Self::new(TransformKind::RotateRight, bits)
    }

    pub fn rotate_left(bits: u8) -> Self {
        Self::new(TransformKind::RotateLeft, bits)
    }

    pub fn shift_right(bits: u8) -> Self {
        Self::new(TransformKind::ShiftRight, bits)
    }

    pub fn shift_left(bits: u8) -> Self {
        Self::new(TransformKind::ShiftLeft, bits)
    }

    /// Shift kinds drop bits, so their inverse is only an approximation
    pub fn is_lossy(&self) -> bool {
        matches!(self.kind, TransformKind::ShiftRight | TransformKind::ShiftLeft) && self.bits > 0
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TransformKind::Xor => write!(f, "xor"),
            TransformKind::Identity => write!(f, "id"),
            TransformKind::RotateRight => write!(f, "ror{}", self.bits),
            TransformKind::RotateLeft => write!(f, "rol{}", self.bits),
            TransformKind::ShiftRight => write!(f, "shr{}", self.bits),
            TransformKind::ShiftLeft => write!(f, "shl{}", self.bits),
        }
    }
}

impl FromStr for Transformation {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_lowercase();
        match token.as_str() {
            "xor" => return Ok(Self::xor()),
            "id" | "identity" => return Ok(Self::identity()),
            _ => {}
        }

        let split = token
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| RecoveryError::Parse(format!("unknown transform '{s}'")))?;
        let (prefix, digits) = token.split_at(split);
        let kind = match prefix {
            "ror" => TransformKind::RotateRight,
            "rol" => TransformKind::RotateLeft,
            "shr" => TransformKind::ShiftRight,
            "shl" => TransformKind::ShiftLeft,
            _ => return Err(RecoveryError::Parse(format!("unknown transform '{s}'"))),
        };
        let bits: u8 = digits
            .parse()
            .map_err(|_| RecoveryError::Parse(format!("invalid bit count in '{s}'")))?;
        if bits >= 8 {
            return Err(RecoveryError::Parse(format!(
                "bit count in '{s}' must be below 8"
            )));
        }

        Ok(Self::new(kind, bits))
    }
}

/// Parse a comma separated chain such as `xor,ror3,xor`
pub fn parse_chain(text: &str) -> Result<Vec<Transformation>> {
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// How well the accepted candidate matched
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchScore {
    pub mismatches: usize,
    pub compared: usize,
}

impl MatchScore {
    pub fn mismatch_fraction(&self) -> f64 {
        if self.compared == 0 {
            0.0
        } else {
            self.mismatches as f64 / self.compared as f64
        }
    }
}

/// Terminal state of a detector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Found,
    Undetermined,
}

/// Log entry for one reconstructed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: usize,
    pub transformation: Transformation,
    pub outcome: StageOutcome,
    pub score: Option<MatchScore>,
}

impl StageRecord {
    pub fn is_confident(&self) -> bool {
        self.outcome == StageOutcome::Found && !self.transformation.is_lossy()
    }
}

/// Reconstruction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructConfig {
    /// Comparator tolerance used when verifying candidates
    pub tolerance: Tolerance,

    /// Evaluate a stage's candidates on the rayon pool
    pub parallel: bool,

    /// Number of threads (0 = auto)
    pub num_threads: usize,

    /// Keep every intermediate stage buffer in the result
    pub keep_stages: bool,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            parallel: true,
            num_threads: 0,
            keep_stages: false,
        }
    }
}

impl ReconstructConfig {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Default::default()
        }
    }

    /// Load a JSON config file; missing fields fall back to defaults
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|err| RecoveryError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = self.tolerance.max_mismatch_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(RecoveryError::Config(format!(
                "max_mismatch_fraction must be within [0, 1], got {fraction}"
            )));
        }
        Ok(())
    }
}

/// Progress update sent via tokio channel
#[derive(Debug, Clone)]
pub enum StageProgress {
    /// Detector started on a stage
    StageStarted { stage: usize, total: usize },
    /// A candidate was accepted
    StageResolved(StageRecord),
    /// No candidate passed; identity substituted
    StageUndetermined(usize),
    /// All stages processed
    Finished { low_confidence: bool },
}
