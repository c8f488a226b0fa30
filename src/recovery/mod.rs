pub mod detector;
pub mod encoder;
pub mod pipeline;

pub use detector::{candidates, Detector, DetectorState, StageDetection};
pub use encoder::{encode_chain, EncodedChain, MaskPlan, SeedSource};
pub use pipeline::{reconstruct, reconstruct_streaming, Reconstruction, ReconstructionPipeline};
