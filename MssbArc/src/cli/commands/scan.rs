//! CLI command for scanning a buffer for block descriptors

use std::path::Path;

use crate::archive::FingerprintScanner;
use crate::cli::progress::{LOOKING_GLASS, print_step};
use crate::compression::CodecParams;

pub fn execute(source: &Path, params: CodecParams, stored: bool, blob_name: &str) -> anyhow::Result<()> {
    let data = std::fs::read(source)?;
    let scanner = FingerprintScanner::new(&data, blob_name);
    let steps = if stored { 2 } else { 1 };

    print_step(1, steps, LOOKING_GLASS, &format!("Scanning {} for [{params}]...", source.display()));
    let found = scanner.scan(params);
    for d in &found {
        println!("  {d}");
    }
    println!("  {} descriptors", found.len());

    if stored {
        print_step(2, steps, LOOKING_GLASS, "Scanning for stored chunks...");
        let raw = scanner.scan_stored();
        for d in &raw {
            println!("  {d}");
        }
        println!("  {} descriptors", raw.len());
    }

    Ok(())
}
