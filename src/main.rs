use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use unmask_recovery::case::{discover_cases, CasePaths};
use unmask_recovery::cli::{BatchArgs, Cli, Command, ReconstructArgs, SimulateArgs, VerifyArgs};
use unmask_recovery::comparator::{self, Tolerance};
use unmask_recovery::recovery::{encode_chain, Reconstruction, ReconstructionPipeline};
use unmask_recovery::report::{create_report_metadata, sha256_hex, write_outputs, ReconstructionReport};
use unmask_recovery::types::{Dimensions, PixelBuffer, StageProgress};
use unmask_recovery::{load_pixel_buffer, parse_mask_file, save_pixel_buffer, write_mask_file};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Reconstruct(args) => run_reconstruct(args),
        Command::Batch(args) => run_batch(args),
        Command::Simulate(args) => run_simulate(args),
        Command::Verify(args) => run_verify(args),
    }
}

fn run_reconstruct(args: ReconstructArgs) -> Result<()> {
    args.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;
    let config = args.to_config().context("Failed to build configuration")?;
    let case = args.case_paths().context("Failed to locate case inputs")?;

    println!("Unmask Recovery v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "=".repeat(60));
    println!();
    println!("Configuration:");
    println!("  Transformed:        {}", case.transformed.display());
    println!("  Key:                {}", case.key.display());
    println!("  Masks:              {}", case.masks.len());
    println!("  Output:             {}", args.output.display());
    println!("  Tolerance:          {} per byte, {:.3} mismatch fraction",
        config.tolerance.per_byte, config.tolerance.max_mismatch_fraction
    );
    println!("  Parallel search:    {}", config.parallel);
    println!();

    let pipeline = ReconstructionPipeline::new(config);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<StageProgress>(64);
    let printer = std::thread::spawn(move || {
        while let Some(event) = rx.blocking_recv() {
            print_progress(&event);
        }
    });

    let processed = process_case(&pipeline, &case, &args.output, args.report.as_deref(), Some(tx));
    let _ = printer.join();
    let (dims, result) = processed?;

    if let Some(dir) = &args.emit_stages {
        emit_stages(&result.stages, dims, dir)?;
        println!("  Stage images written to {}", dir.display());
    }

    println!();
    println!("Reconstruction complete in {:.3}s", result.duration_secs);
    println!("  Chain:              {}", chain_text(&result));
    println!("  Recovered image:    {}", args.output.display());
    if result.low_confidence {
        println!("  WARNING: low confidence (undetermined stages: {:?})", result.undetermined_stages());
    }
    Ok(())
}

fn run_batch(args: BatchArgs) -> Result<()> {
    args.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;
    let config = args.tuning.to_config().context("Failed to build configuration")?;

    let cases = discover_cases(&args.root)
        .with_context(|| format!("Failed to list cases under {}", args.root.display()))?;
    if cases.is_empty() {
        bail!("no case directories found under {}", args.root.display());
    }
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    println!("Processing {} cases from {}", cases.len(), args.root.display());
    let pipeline = ReconstructionPipeline::new(config);

    let outcomes: Vec<(PathBuf, Result<Reconstruction>)> = cases
        .par_iter()
        .map(|dir| {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "case".to_string());
            let output = args.output.join(format!("{}.bmp", name));
            let report = args.output.join(format!("{}_report", name));

            let outcome = CasePaths::discover(dir)
                .map_err(anyhow::Error::from)
                .and_then(|case| process_case(&pipeline, &case, &output, Some(report.as_path()), None))
                .map(|(_, result)| result);
            (dir.clone(), outcome)
        })
        .collect();

    let mut failed = 0;
    for (dir, outcome) in &outcomes {
        match outcome {
            Ok(result) => println!(
                "  {:<30} {:<24} {}",
                dir.display(),
                chain_text(result),
                if result.low_confidence { "LOW CONFIDENCE" } else { "ok" }
            ),
            Err(e) => {
                failed += 1;
                println!("  {:<30} FAILED: {:#}", dir.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} cases failed", failed, outcomes.len());
    }
    println!("All {} cases reconstructed into {}", outcomes.len(), args.output.display());
    Ok(())
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    args.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;
    let chain = args.transformations()?;

    let original = load_pixel_buffer(&args.original)
        .with_context(|| format!("Failed to load {}", args.original.display()))?;
    let key = load_pixel_buffer(&args.key)
        .with_context(|| format!("Failed to load {}", args.key.display()))?;
    check_dimensions(original.dimensions, key.dimensions)?;

    let encoded = encode_chain(&original.buffer, &key.buffer, &chain, &args.mask_plan())?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let dims = original.dimensions;
    save_pixel_buffer(&encoded.terminal, dims, args.output.join("I_D.bmp"))?;
    save_pixel_buffer(&key.buffer, dims, args.output.join("I_M.bmp"))?;
    for (i, mask) in encoded.masks.iter().enumerate() {
        write_mask_file(&args.output.join(format!("M{}.txt", i + 1)), mask)?;
    }
    if args.emit_stages {
        emit_stages(&encoded.stages, dims, &args.output.join("stages"))?;
    }

    println!("Simulated {} stages over a {} image", chain.len(), dims);
    println!("  Chain:              {}", args.chain);
    println!("  Case directory:     {}", args.output.display());
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<()> {
    let recovered = load_pixel_buffer(&args.recovered)
        .with_context(|| format!("Failed to load {}", args.recovered.display()))?;
    let reference = load_pixel_buffer(&args.reference)
        .with_context(|| format!("Failed to load {}", args.reference.display()))?;
    check_dimensions(recovered.dimensions, reference.dimensions)?;

    let tolerance = Tolerance {
        per_byte: args.tolerance,
        ..Tolerance::default()
    };
    let a = recovered.buffer.as_bytes();
    let b = reference.buffer.as_bytes();
    let score = comparator::score(a, b, &tolerance)?;
    let exact = a == b;

    println!("Recovered:  {}  sha256 {}", args.recovered.display(), sha256_hex(a));
    println!("Reference:  {}  sha256 {}", args.reference.display(), sha256_hex(b));
    println!(
        "Bytes beyond tolerance {}: {} of {} ({:.4}%)",
        args.tolerance,
        score.mismatches,
        score.compared,
        score.mismatch_fraction() * 100.0
    );

    if !exact {
        bail!("images differ");
    }
    println!("Images are identical");
    Ok(())
}

/// Load, reconstruct and save one case; returns the image dimensions and result
fn process_case(
    pipeline: &ReconstructionPipeline,
    case: &CasePaths,
    output: &Path,
    report: Option<&Path>,
    sender: Option<tokio::sync::mpsc::Sender<StageProgress>>,
) -> Result<(Dimensions, Reconstruction)> {
    let transformed = load_pixel_buffer(&case.transformed)
        .with_context(|| format!("Failed to load {}", case.transformed.display()))?;
    let key = load_pixel_buffer(&case.key)
        .with_context(|| format!("Failed to load {}", case.key.display()))?;
    check_dimensions(transformed.dimensions, key.dimensions)?;

    let masks = case
        .masks
        .iter()
        .map(|path| parse_mask_file(path))
        .collect::<unmask_recovery::Result<Vec<_>>>()?;

    let dims = transformed.dimensions;
    let result = pipeline.run_streaming(transformed.into_buffer(), &key.buffer, &masks, sender)?;

    let report = report.map(|path| {
        let metadata = create_report_metadata(case, output);
        (ReconstructionReport::new(metadata, dims, &result), path)
    });
    write_outputs(
        &result.recovered,
        dims,
        output,
        report.as_ref().map(|(report, path)| (report, *path)),
    )
    .with_context(|| format!("Failed to write outputs for {}", output.display()))?;

    Ok((dims, result))
}

fn emit_stages(stages: &[PixelBuffer], dims: Dimensions, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (i, stage) in stages.iter().enumerate() {
        save_pixel_buffer(stage, dims, dir.join(format!("P{}.bmp", i)))?;
    }
    Ok(())
}

fn check_dimensions(left: Dimensions, right: Dimensions) -> Result<()> {
    if left != right {
        bail!("image dimensions differ: {} vs {}", left, right);
    }
    Ok(())
}

fn chain_text(result: &Reconstruction) -> String {
    let chain: Vec<String> = result.transformations().iter().map(|t| t.to_string()).collect();
    if chain.is_empty() {
        "(no stages)".to_string()
    } else {
        chain.join(",")
    }
}

fn print_progress(event: &StageProgress) {
    match event {
        StageProgress::StageStarted { stage, total } => {
            println!("  [{}/{}] searching stage {}", total - stage, total, stage)
        }
        StageProgress::StageResolved(record) => {
            println!("         stage {} -> {}", record.stage, record.transformation)
        }
        StageProgress::StageUndetermined(stage) => {
            println!("         stage {} -> undetermined, identity substituted", stage)
        }
        StageProgress::Finished { low_confidence } => {
            println!("  Done{}", if *low_confidence { " (low confidence)" } else { "" })
        }
    }
}
