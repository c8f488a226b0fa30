use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::case::CasePaths;
use crate::error::Result;
use crate::recovery::MaskPlan;
use crate::types::{parse_chain, ReconstructConfig, Transformation};

/// Recover an image from the output of a masked byte-transform chain
#[derive(Parser, Debug, Clone)]
#[command(name = "unmask-recovery")]
#[command(version)]
#[command(about = "Reconstruct images from masked XOR/rotate/shift chains", long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconstruct one case
    Reconstruct(ReconstructArgs),
    /// Reconstruct every case under a directory
    Batch(BatchArgs),
    /// Run a chain forward and write a case directory
    Simulate(SimulateArgs),
    /// Compare a recovered image with a reference
    Verify(VerifyArgs),
}

/// Detector tuning shared by `reconstruct` and `batch`
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Per-byte tolerance when comparing buffers
    #[arg(long = "tolerance")]
    pub tolerance: Option<u8>,

    /// Fraction of compared bytes allowed to exceed the tolerance
    #[arg(long = "max-mismatch")]
    pub max_mismatch: Option<f64>,

    /// Evaluate candidates one at a time
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Worker threads (0 = auto)
    #[arg(long = "threads")]
    pub threads: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long = "config", value_name = "JSON")]
    pub config: Option<PathBuf>,
}

impl TuningArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(fraction) = self.max_mismatch {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(format!("max-mismatch ({}) must be within [0, 1]", fraction));
            }
        }
        Ok(())
    }

    /// Build the detector configuration from the config file and flags
    pub fn to_config(&self) -> Result<ReconstructConfig> {
        let mut config = match &self.config {
            Some(path) => ReconstructConfig::from_json_file(path)?,
            None => ReconstructConfig::default(),
        };

        if let Some(per_byte) = self.tolerance {
            config.tolerance.per_byte = per_byte;
        }
        if let Some(fraction) = self.max_mismatch {
            config.tolerance.max_mismatch_fraction = fraction;
        }
        if self.sequential {
            config.parallel = false;
        }
        if let Some(threads) = self.threads {
            config.num_threads = threads;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReconstructArgs {
    /// Transformed image (output of the last stage)
    #[arg(long = "transformed", value_name = "IMG")]
    pub transformed: Option<PathBuf>,

    /// Key image used by the XOR stages
    #[arg(long = "key", value_name = "IMG")]
    pub key: Option<PathBuf>,

    /// Mask files, first stage first
    #[arg(long = "mask", value_name = "TXT")]
    pub masks: Vec<PathBuf>,

    /// Case directory holding I_D, I_M and M<n>.txt
    #[arg(long = "case-dir", value_name = "DIR")]
    pub case_dir: Option<PathBuf>,

    /// Recovered image path
    #[arg(short = 'o', long = "output", default_value = "recovered.bmp")]
    pub output: PathBuf,

    /// Write the transform log to <PATH>.json and <PATH>.txt
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Write every intermediate stage image into this directory
    #[arg(long = "emit-stages", value_name = "DIR")]
    pub emit_stages: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl ReconstructArgs {
    /// Validate the arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        match (&self.case_dir, &self.transformed, &self.key) {
            (Some(_), None, None) if self.masks.is_empty() => {}
            (Some(_), _, _) => {
                return Err("--case-dir cannot be combined with --transformed, --key or --mask".to_string())
            }
            (None, Some(_), Some(_)) => {}
            (None, _, _) => {
                return Err("either --case-dir or both --transformed and --key are required".to_string())
            }
        }

        if self.output.as_os_str().is_empty() {
            return Err("Output path cannot be empty".to_string());
        }

        self.tuning.validate()
    }

    /// Input paths, discovered from the case directory or taken from flags
    pub fn case_paths(&self) -> Result<CasePaths> {
        if let Some(dir) = &self.case_dir {
            return CasePaths::discover(dir);
        }
        Ok(CasePaths::new(
            self.transformed.clone().unwrap_or_default(),
            self.key.clone().unwrap_or_default(),
            self.masks.clone(),
        ))
    }

    pub fn to_config(&self) -> Result<ReconstructConfig> {
        let mut config = self.tuning.to_config()?;
        config.keep_stages = self.emit_stages.is_some();
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Directory whose sub-directories are cases
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Output directory; one recovered image and report per case
    #[arg(short = 'o', long = "output", default_value = "recovery_output")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl BatchArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("Root path cannot be empty".to_string());
        }
        self.tuning.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Original image
    #[arg(long = "original", value_name = "IMG")]
    pub original: PathBuf,

    /// Key image
    #[arg(long = "key", value_name = "IMG")]
    pub key: PathBuf,

    /// Comma separated chain, e.g. xor,ror3,xor
    #[arg(long = "chain")]
    pub chain: String,

    /// Pixels covered by each mask
    #[arg(long = "mask-count", default_value = "64")]
    pub mask_count: usize,

    /// Mask seed
    #[arg(long = "seed", default_value = "0")]
    pub seed: u64,

    /// Derive a different seed for every stage from --seed
    #[arg(long = "derive-seeds")]
    pub derive_seeds: bool,

    /// Case directory to write
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Also write every intermediate stage image
    #[arg(long = "emit-stages")]
    pub emit_stages: bool,
}

impl SimulateArgs {
    pub fn validate(&self) -> std::result::Result<(), String> {
        let chain = self.transformations().map_err(|e| e.to_string())?;
        if chain.is_empty() {
            return Err("chain must name at least one transform".to_string());
        }
        if self.mask_count == 0 {
            return Err("mask-count must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn transformations(&self) -> Result<Vec<Transformation>> {
        parse_chain(&self.chain)
    }

    pub fn mask_plan(&self) -> MaskPlan {
        if self.derive_seeds {
            MaskPlan::derived(self.seed, self.mask_count)
        } else {
            MaskPlan::fixed(self.seed, self.mask_count)
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Recovered image
    #[arg(value_name = "RECOVERED")]
    pub recovered: PathBuf,

    /// Reference image
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    /// Per-byte tolerance for the approximate score
    #[arg(long = "tolerance", default_value = "3")]
    pub tolerance: u8,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
