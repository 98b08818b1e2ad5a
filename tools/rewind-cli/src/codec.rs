//! Diff two snapshot files

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use clap::Args;

use rewind_core::{DeltaCodec, Lz4DeltaCodec};

#[derive(Args)]
pub struct CodecArgs {
    /// Snapshot to diff against
    #[arg(long)]
    pub base: PathBuf,

    /// Snapshot to encode
    #[arg(long)]
    pub target: PathBuf,
}

/// Sizes and timings of one encode/decode round trip
#[derive(Debug)]
struct CodecReport {
    base_len: usize,
    target_len: usize,
    diff_len: usize,
    encode_micros: u128,
    decode_micros: u128,
}

impl CodecReport {
    fn ratio(&self) -> f64 {
        if self.target_len == 0 {
            return 0.0;
        }
        self.diff_len as f64 / self.target_len as f64
    }
}

pub fn execute(args: CodecArgs) -> Result<()> {
    let base = std::fs::read(&args.base)
        .with_context(|| format!("Failed to read base: {}", args.base.display()))?;
    let target = std::fs::read(&args.target)
        .with_context(|| format!("Failed to read target: {}", args.target.display()))?;

    let report = round_trip(&Lz4DeltaCodec::new(), &base, &target)?;

    println!("Base:   {} bytes", report.base_len);
    println!("Target: {} bytes", report.target_len);
    println!(
        "Diff:   {} bytes ({:.2}% of target)",
        report.diff_len,
        report.ratio() * 100.0
    );
    println!("Encode: {} us", report.encode_micros);
    println!("Decode: {} us", report.decode_micros);
    println!("Round trip verified");
    Ok(())
}

fn round_trip(codec: &dyn DeltaCodec, base: &[u8], target: &[u8]) -> Result<CodecReport> {
    let started = Instant::now();
    let diff = codec.encode(base, target).context("Failed to encode diff")?;
    let encode_micros = started.elapsed().as_micros();

    let started = Instant::now();
    let decoded = codec.decode(base, &diff).context("Failed to decode diff")?;
    let decode_micros = started.elapsed().as_micros();

    ensure!(decoded == target, "Decoded snapshot differs from target");

    Ok(CodecReport {
        base_len: base.len(),
        target_len: target.len(),
        diff_len: diff.len(),
        encode_micros,
        decode_micros,
    })
}
