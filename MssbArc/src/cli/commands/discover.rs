//! CLI command for building a chunk catalog

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::archive::{Catalog, DiscoveryConfig, DiscoveryPhase, DiscoveryProgress, FileCache};
use crate::cli::progress::{DISK, LOOKING_GLASS, count_bar, print_done, print_step};

pub fn execute(config_path: &Path, destination: &Path, force: bool, quiet: bool) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = stop_on_ctrl_c(Arc::clone(&stop)) {
        tracing::warn!("Ctrl-C will end the process without saving: {e}");
    }
    discover(config_path, destination, force, quiet, &stop)
}

/// Set `stop` on the first Ctrl-C, from a listener thread.
fn stop_on_ctrl_c(stop: Arc<AtomicBool>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        eprintln!("Interrupted, finishing the current step...");
                        stop.store(true, Ordering::Relaxed);
                    }
                    Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {e}"),
                }
            });
        })?;
    Ok(())
}

fn discover(
    config_path: &Path,
    destination: &Path,
    force: bool,
    quiet: bool,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    if destination.exists() && !force {
        let catalog = Catalog::load(destination)?;
        println!(
            "Catalog {} already lists {} chunks (use --force to rebuild)",
            destination.display(),
            catalog.len()
        );
        return Ok(());
    }

    let start = Instant::now();

    print_step(1, 3, LOOKING_GLASS, &format!("Loading {}...", config_path.display()));
    let config = DiscoveryConfig::load(config_path)?;
    let mut cache = FileCache::new();

    print_step(2, 3, LOOKING_GLASS, &format!("Discovering chunks in {}...", config.blob.display()));
    let pb = (!quiet).then(|| count_bar(0, DiscoveryPhase::ScanningReferences.as_str()));
    let last_phase = Mutex::new(None);

    let progress = |p: &DiscoveryProgress| {
        let Some(pb) = &pb else { return };
        if let Ok(mut last) = last_phase.lock() {
            if *last != Some(p.phase) {
                *last = Some(p.phase);
                pb.set_message(p.phase.as_str());
                pb.set_length(p.total as u64);
            }
        }
        pb.set_position(p.current as u64);
    };
    let outcome = config.run(&mut cache, &progress, Some(stop))?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    println!("{}", outcome.report);

    // A partial catalog would be reused as complete by later runs.
    if outcome.report.interrupted {
        println!("Interrupted; {} was not written", destination.display());
        return Ok(());
    }

    print_step(3, 3, DISK, &format!("Writing {}...", destination.display()));
    outcome.catalog.save(destination)?;

    println!(
        "  {} chunks, 0x{:x} bytes of the blob attributed",
        outcome.catalog.len(),
        outcome.claimed.covered_len()
    );
    print_done(start.elapsed());
    Ok(())
}
