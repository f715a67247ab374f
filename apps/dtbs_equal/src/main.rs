//! Check that two device tree blobs are structurally equal, including
//! node, property and reservation order.
//!
//! Exit status: 0 when the trees are equal, 1 when they diverge, 2 on
//! usage or load errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use fdt_cmp::{compare, Fdt};

#[derive(Parser)]
#[command(version, about = "Check two DTBs for ordered structural equality")]
struct Args {
    /// First device tree blob
    dtb1: PathBuf,
    /// Second device tree blob
    dtb2: PathBuf,
}

fn load_blob(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn run(args: &Args) -> Result<ExitCode> {
    let blob1 = load_blob(&args.dtb1)?;
    let blob2 = load_blob(&args.dtb2)?;

    let fdt1 = Fdt::from_bytes(&blob1)
        .with_context(|| format!("Invalid FDT {}", args.dtb1.display()))?;
    let fdt2 = Fdt::from_bytes(&blob2)
        .with_context(|| format!("Invalid FDT {}", args.dtb2.display()))?;

    Ok(match compare(&fdt1, &fdt2) {
        Ok(()) => {
            println!("PASS");
            ExitCode::SUCCESS
        }
        Err(mismatch) => {
            eprintln!("FAIL: {mismatch}");
            ExitCode::from(1)
        }
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}
