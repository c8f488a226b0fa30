//! Transform log reports.
//!
//! Each reconstruction can leave a machine-readable JSON report and a plain
//! text log next to the recovered image.

use chrono::Local;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::case::CasePaths;
use crate::error::{RecoveryError, Result};
use crate::image_io::save_pixel_buffer;
use crate::recovery::Reconstruction;
use crate::types::{Dimensions, PixelBuffer, StageOutcome, StageRecord};

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub timestamp: String,
    pub tool_name: String,
    pub version: String,
    pub transformed_path: String,
    pub key_path: String,
    pub mask_paths: Vec<String>,
    pub output_path: String,
}

/// Everything known about one reconstruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub metadata: ReportMetadata,
    pub dimensions: Dimensions,
    /// Identified chain in short form, earliest stage first
    pub chain: String,
    pub stages: Vec<StageRecord>,
    pub low_confidence: bool,
    pub recovered_sha256: String,
    pub duration_secs: f64,
}

/// Paths to generated report files
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json_path: PathBuf,
    pub text_path: PathBuf,
}

impl ReconstructionReport {
    pub fn new(metadata: ReportMetadata, dimensions: Dimensions, result: &Reconstruction) -> Self {
        let chain = result
            .transformations()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",");

        Self {
            metadata,
            dimensions,
            chain,
            stages: result.log.clone(),
            low_confidence: result.low_confidence,
            recovered_sha256: sha256_hex(result.recovered.as_bytes()),
            duration_secs: result.duration_secs,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RecoveryError::Encode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RecoveryError::Parse(e.to_string()))
    }

    /// Human-readable transform log
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} {}\n", self.metadata.tool_name, self.metadata.version));
        out.push_str(&format!("Generated:   {}\n", self.metadata.timestamp));
        out.push_str(&format!("Transformed: {}\n", self.metadata.transformed_path));
        out.push_str(&format!("Key:         {}\n", self.metadata.key_path));
        out.push_str(&format!("Dimensions:  {}\n", self.dimensions));
        out.push_str(&format!("Stages:      {}\n", self.stages.len()));
        out.push('\n');

        for record in &self.stages {
            let status = match record.outcome {
                StageOutcome::Found if record.transformation.is_lossy() => "found (lossy)",
                StageOutcome::Found => "found",
                StageOutcome::Undetermined => "UNDETERMINED",
            };
            let mask = self
                .metadata
                .mask_paths
                .get(record.stage)
                .map(String::as_str)
                .unwrap_or("-");
            out.push_str(&format!(
                "  stage {:>2}: {:<6} {:<14} mask {}\n",
                record.stage,
                record.transformation.to_string(),
                status,
                mask
            ));
        }

        out.push('\n');
        out.push_str(&format!("Chain:       {}\n", if self.chain.is_empty() { "(none)" } else { &self.chain }));
        out.push_str(&format!("Confidence:  {}\n", if self.low_confidence { "LOW" } else { "ok" }));
        out.push_str(&format!("SHA-256:     {}\n", self.recovered_sha256));
        out.push_str(&format!("Output:      {}\n", self.metadata.output_path));
        out.push_str(&format!("Time:        {:.3}s\n", self.duration_secs));
        out
    }

    /// Write `<path>.json` and `<path>.txt`
    pub fn write(&self, path: &Path) -> Result<ReportPaths> {
        write_rendered(path, &self.to_json()?, &self.to_text())
    }
}

/// Save the recovered image and, when given, its report. Nothing is
/// written until the report has rendered, and a failed report write
/// removes the image again.
pub fn write_outputs(
    recovered: &PixelBuffer,
    dimensions: Dimensions,
    output: &Path,
    report: Option<(&ReconstructionReport, &Path)>,
) -> Result<Option<ReportPaths>> {
    let rendered = match report {
        Some((report, path)) => Some((report.to_json()?, report.to_text(), path)),
        None => None,
    };

    save_pixel_buffer(recovered, dimensions, output)?;
    let Some((json, text, path)) = rendered else {
        return Ok(None);
    };

    match write_rendered(path, &json, &text) {
        Ok(paths) => Ok(Some(paths)),
        Err(err) => {
            let _ = fs::remove_file(output);
            Err(err)
        }
    }
}

fn write_rendered(path: &Path, json: &str, text: &str) -> Result<ReportPaths> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_path = path.with_extension("json");
    let text_path = path.with_extension("txt");
    fs::write(&json_path, json)?;
    if let Err(err) = fs::write(&text_path, text) {
        let _ = fs::remove_file(&json_path);
        return Err(err.into());
    }

    Ok(ReportPaths {
        json_path,
        text_path,
    })
}

/// Helper function to create metadata from the case inputs
pub fn create_report_metadata(case: &CasePaths, output: &Path) -> ReportMetadata {
    ReportMetadata {
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        tool_name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        transformed_path: case.transformed.display().to_string(),
        key_path: case.key.display().to_string(),
        mask_paths: case.masks.iter().map(|p| p.display().to_string()).collect(),
        output_path: output.display().to_string(),
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
