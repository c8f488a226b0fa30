use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::mpsc::Sender;

use crate::error::{RecoveryError, Result};
use crate::mask::MaskDescriptor;
use crate::recovery::detector::Detector;
use crate::types::{
    PixelBuffer, ReconstructConfig, StageOutcome, StageProgress, StageRecord, Transformation,
};

/// Output of a full reconstruction
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Stage 0: the recovered original
    pub recovered: PixelBuffer,
    /// One record per stage, earliest first
    pub log: Vec<StageRecord>,
    /// Set when a stage was undetermined or its transform is lossy
    pub low_confidence: bool,
    /// Every stage buffer, index 0 first; empty unless `keep_stages`
    pub stages: Vec<PixelBuffer>,
    pub duration_secs: f64,
}

impl Reconstruction {
    pub fn transformations(&self) -> Vec<Transformation> {
        self.log.iter().map(|record| record.transformation).collect()
    }

    pub fn undetermined_stages(&self) -> Vec<usize> {
        self.log
            .iter()
            .filter(|record| record.outcome == StageOutcome::Undetermined)
            .map(|record| record.stage)
            .collect()
    }
}

/// Runs the detector over every stage, last stage first
pub struct ReconstructionPipeline {
    config: ReconstructConfig,
}

impl ReconstructionPipeline {
    pub fn new(config: ReconstructConfig) -> Self {
        // Configure global thread pool if requested
        if config.num_threads > 0 {
            let _ = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .build_global();
        }

        Self { config }
    }

    pub fn config(&self) -> &ReconstructConfig {
        &self.config
    }

    pub fn run(
        &self,
        terminal: PixelBuffer,
        key: &PixelBuffer,
        masks: &[MaskDescriptor],
    ) -> Result<Reconstruction> {
        self.run_streaming(terminal, key, masks, None)
    }

    /// Reconstruct with progress updates via tokio channel.
    ///
    /// `masks[i]` is the mask written at stage `i`; the terminal buffer is
    /// the output of the last stage.
    pub fn run_streaming(
        &self,
        terminal: PixelBuffer,
        key: &PixelBuffer,
        masks: &[MaskDescriptor],
        sender: Option<Sender<StageProgress>>,
    ) -> Result<Reconstruction> {
        let start_time = Instant::now();
        RecoveryError::check_lengths(terminal.len(), key.len())?;

        let num_stages = masks.len();
        let mut stages: Vec<Option<PixelBuffer>> = vec![None; num_stages + 1];
        stages[num_stages] = Some(terminal);

        let detector = Detector::new(key, &self.config);
        let mut log = VecDeque::with_capacity(num_stages);

        for stage in (0..num_stages).rev() {
            report(&sender, StageProgress::StageStarted {
                stage,
                total: num_stages,
            });
            tracing::info!(stage, total = num_stages, "detecting stage transform");

            let known = stages[stage + 1]
                .as_ref()
                .ok_or_else(|| RecoveryError::Config(format!("stage {} was never filled", stage + 1)))?;
            let detection = detector.detect(known, &masks[stage])?;

            let record = StageRecord {
                stage,
                transformation: detection.transformation,
                outcome: detection.outcome(),
                score: detection.score,
            };
            match record.outcome {
                StageOutcome::Found => {
                    tracing::info!(stage, transform = %record.transformation, "stage resolved");
                    report(&sender, StageProgress::StageResolved(record.clone()));
                }
                StageOutcome::Undetermined => {
                    tracing::warn!(stage, "no candidate matched; substituting identity");
                    report(&sender, StageProgress::StageUndetermined(stage));
                }
            }

            stages[stage] = Some(detection.buffer);
            log.push_front(record);
        }

        let log: Vec<StageRecord> = log.into();
        let low_confidence = log.iter().any(|record| !record.is_confident());
        report(&sender, StageProgress::Finished { low_confidence });

        let mut stages: Vec<PixelBuffer> = stages.into_iter().flatten().collect();
        let recovered = if self.config.keep_stages {
            stages[0].clone()
        } else {
            let recovered = stages.swap_remove(0);
            stages.clear();
            recovered
        };

        Ok(Reconstruction {
            recovered,
            log,
            low_confidence,
            stages,
            duration_secs: start_time.elapsed().as_secs_f64(),
        })
    }
}

/// Reconstruct with a one-off pipeline
pub fn reconstruct(
    terminal: PixelBuffer,
    key: &PixelBuffer,
    masks: &[MaskDescriptor],
    config: &ReconstructConfig,
) -> Result<Reconstruction> {
    ReconstructionPipeline::new(config.clone()).run(terminal, key, masks)
}

/// Reconstruct with a one-off pipeline, streaming progress to `sender`
pub fn reconstruct_streaming(
    terminal: PixelBuffer,
    key: &PixelBuffer,
    masks: &[MaskDescriptor],
    config: &ReconstructConfig,
    sender: Option<Sender<StageProgress>>,
) -> Result<Reconstruction> {
    ReconstructionPipeline::new(config.clone()).run_streaming(terminal, key, masks, sender)
}

fn report(sender: &Option<Sender<StageProgress>>, progress: StageProgress) {
    if let Some(ref s) = sender {
        if !s.is_closed() {
            let _ = s.blocking_send(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::encoder::{encode_chain, MaskPlan};

    fn original() -> PixelBuffer {
        PixelBuffer::new(vec![12, 200, 37, 99, 250, 3, 128, 64, 77, 18, 161, 240])
    }

    fn key() -> PixelBuffer {
        PixelBuffer::new(vec![0x5A, 0x13, 0xC7, 0x88, 0x01, 0xFE, 0x42, 0x99, 0x3C, 0x70, 0x0F, 0xB1])
    }

    #[test]
    fn test_recovers_two_stage_chain() {
        let chain = [Transformation::xor(), Transformation::rotate_right(3)];
        let encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(4, 4)).unwrap();

        let result = reconstruct(encoded.terminal, &key(), &encoded.masks, &ReconstructConfig::default())
            .unwrap();
        assert_eq!(result.recovered, original());
        assert_eq!(result.transformations(), chain.to_vec());
        assert!(!result.low_confidence);
        assert!(result.stages.is_empty());
        assert_eq!(result.log[0].stage, 0);
        assert_eq!(result.log[1].stage, 1);
    }

    #[test]
    fn test_keep_stages_matches_encoder() {
        let chain = [Transformation::xor(), Transformation::rotate_left(2), Transformation::xor()];
        let encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(1, 4)).unwrap();

        let config = ReconstructConfig {
            keep_stages: true,
            ..ReconstructConfig::sequential()
        };
        let result = reconstruct(encoded.terminal.clone(), &key(), &encoded.masks, &config).unwrap();
        assert_eq!(result.stages, encoded.stages);
        assert_eq!(result.recovered, result.stages[0]);
    }

    #[test]
    fn test_no_masks_returns_terminal() {
        let result = reconstruct(original(), &key(), &[], &ReconstructConfig::default()).unwrap();
        assert_eq!(result.recovered, original());
        assert!(result.log.is_empty());
        assert!(!result.low_confidence);
    }

    #[test]
    fn test_undetermined_stage_continues() {
        let chain = [Transformation::xor(), Transformation::rotate_right(3)];
        let mut encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(0, 4)).unwrap();
        // Corrupt the later mask so nothing explains the last stage.
        for triplet in encoded.masks[1].triplets.iter_mut() {
            for value in triplet.iter_mut() {
                *value += 100;
            }
        }

        let result = reconstruct(encoded.terminal.clone(), &key(), &encoded.masks, &ReconstructConfig::default())
            .unwrap();
        assert_eq!(result.log[1].outcome, StageOutcome::Undetermined);
        assert_eq!(result.log[1].transformation, Transformation::identity());
        // Stage 0 then starts from the wrong buffer and may fail as well.
        assert!(result.undetermined_stages().contains(&1));
        assert!(result.low_confidence);
        assert_eq!(result.recovered.len(), original().len());
    }

    #[test]
    fn test_shift_stages_are_lossy() {
        for t in [
            Transformation::shift_left(1),
            Transformation::shift_left(3),
            Transformation::shift_right(4),
        ] {
            let encoded = encode_chain(&original(), &key(), &[t], &MaskPlan::fixed(0, 4)).unwrap();
            let result = reconstruct(encoded.terminal, &key(), &encoded.masks, &ReconstructConfig::default())
                .unwrap();

            assert_eq!(result.transformations(), vec![t]);
            assert_eq!(result.log[0].outcome, StageOutcome::Found);
            assert!(!result.log[0].is_confident());
            assert!(result.low_confidence);

            let keep: u8 = if t.kind == crate::types::TransformKind::ShiftRight {
                0xFF << t.bits
            } else {
                0xFF >> t.bits
            };
            for (got, want) in result.recovered.as_bytes().iter().zip(original().as_bytes()) {
                assert_eq!(got & keep, want & keep, "stage {t}");
            }
        }
    }

    #[test]
    fn test_shift_as_first_stage_of_chain() {
        let chain = [Transformation::shift_left(3), Transformation::xor(), Transformation::rotate_right(2)];
        let encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(4, 4)).unwrap();

        let result = reconstruct(encoded.terminal, &key(), &encoded.masks, &ReconstructConfig::sequential())
            .unwrap();
        assert_eq!(result.transformations(), chain.to_vec());
        assert!(result.low_confidence);
        assert!(result.undetermined_stages().is_empty());
    }

    #[test]
    fn test_empty_mask_lowers_confidence() {
        let chain = [Transformation::rotate_right(3)];
        let encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(5, 0)).unwrap();

        let result = reconstruct(encoded.terminal.clone(), &key(), &encoded.masks, &ReconstructConfig::default())
            .unwrap();
        assert_eq!(result.log[0].outcome, StageOutcome::Undetermined);
        assert_eq!(result.log[0].transformation, Transformation::identity());
        assert_eq!(result.recovered, encoded.terminal);
        assert!(result.low_confidence);
    }

    #[test]
    fn test_terminal_key_mismatch() {
        let err = reconstruct(PixelBuffer::zeroed(12), &PixelBuffer::zeroed(6), &[], &ReconstructConfig::default())
            .unwrap_err();
        assert!(matches!(err, RecoveryError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_streaming_progress() {
        let chain = [Transformation::xor(), Transformation::rotate_right(3)];
        let encoded = encode_chain(&original(), &key(), &chain, &MaskPlan::fixed(2, 4)).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        reconstruct_streaming(encoded.terminal, &key(), &encoded.masks, &ReconstructConfig::default(), Some(tx))
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], StageProgress::StageStarted { stage: 1, total: 2 }));
        assert!(matches!(events[4], StageProgress::Finished { low_confidence: false }));
    }
}
