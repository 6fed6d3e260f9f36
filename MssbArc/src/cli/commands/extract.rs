//! CLI command for extracting catalogued chunks

use std::path::Path;
use std::time::Instant;

use crate::archive::{Catalog, ExtractProgress, FileCache, write_chunks};
use crate::cli::progress::{LOOKING_GLASS, PACKAGE, count_bar, print_done, print_step};

pub fn execute(catalog_path: &Path, destination: &Path, quiet: bool) -> anyhow::Result<()> {
    let start = Instant::now();

    print_step(1, 2, LOOKING_GLASS, &format!("Reading {}...", catalog_path.display()));
    let catalog = Catalog::load(catalog_path)?;
    let descriptors: Vec<_> = catalog.iter().cloned().collect();

    print_step(2, 2, PACKAGE, &format!("Extracting {} chunks...", descriptors.len()));
    let pb = (!quiet).then(|| count_bar(descriptors.len() as u64, "Extracting"));
    let mut cache = FileCache::new();

    let summary = write_chunks(&descriptors, &mut cache, destination, |p: &ExtractProgress| {
        if let Some(pb) = &pb {
            pb.set_position(p.current as u64);
            pb.set_message(p.current_file.clone());
        }
    })?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    println!();
    println!("Extraction complete:");
    println!("  Success: {}", summary.written.len());
    println!("  Failed: {}", summary.failed.len());

    if !summary.is_complete() {
        println!();
        println!("Failures:");
        for (name, error) in &summary.failed {
            println!("  {name}: {error}");
        }
    }

    print_done(start.elapsed());
    Ok(())
}
