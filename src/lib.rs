//! Reconstruction of images hidden behind a chain of byte transforms.
//!
//! An original RGB image is passed through a sequence of whole-buffer
//! operations (XOR with a key image, bit rotations, bit shifts). After each
//! operation a seeded mask file records the bytes on both sides of it at a
//! few positions. Starting from the final image, this crate walks the chain
//! backwards:
//! - Brute-force search over every transform candidate per stage
//! - Verification against the stage mask and by forward re-simulation
//! - Parallel candidate evaluation using rayon
//! - Progress streaming via tokio::sync::mpsc
//! - Case discovery, BMP/PNG I/O and JSON/text transform logs

pub mod case;
pub mod cli;
pub mod comparator;
pub mod error;
pub mod image_io;
pub mod mask;
pub mod recovery;
pub mod report;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use types::{Dimensions, PixelBuffer, TransformKind, Transformation};
pub use types::{MatchScore, ReconstructConfig, StageOutcome, StageProgress, StageRecord};
pub use case::CasePaths;
pub use comparator::{approximately_equal, Tolerance};
pub use image_io::{load_pixel_buffer, save_pixel_buffer, LoadedImage};
pub use mask::{parse_mask_file, write_mask_file, MaskDescriptor};
pub use recovery::{encode_chain, reconstruct, Detector, MaskPlan, Reconstruction, ReconstructionPipeline};
pub use report::ReconstructionReport;
pub use error::{RecoveryError, Result};
