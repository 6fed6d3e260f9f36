//! Terminal output for the `mssbarc` commands
//!
//! Numbered step lines for the short commands and one indicatif bar for the
//! long ones (discovery phases, batch extraction).

use std::time::Duration;

use console::{Emoji, style};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};

// ---- step markers (empty fallback on terminals without emoji) ----

/// Reading inputs or scanning buffers
pub static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
/// Compressing or extracting chunks
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "");
/// Writing catalogs and chunk files
pub static DISK: Emoji<'_, '_> = Emoji("💾 ", "");
/// Running the codec
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

const BAR_TEMPLATE: &str = "{msg:<32} {wide_bar:.cyan/blue} {pos:>7}/{len:7} {percent:>3}%";

/// `[step/steps] <marker>message`
pub fn print_step(step: usize, steps: usize, marker: Emoji, message: &str) {
    let counter = style(format!("[{step}/{steps}]")).bold().dim();
    println!("{counter} {marker}{message}");
}

/// Closing line with the elapsed wall time.
pub fn print_done(elapsed: Duration) {
    println!("{SPARKLE}Finished in {}", HumanDuration(elapsed));
}

/// Bar counting discrete items (sectors, candidates, chunks).
///
/// # Panics
/// Only if `BAR_TEMPLATE` stops parsing, which no input can cause.
#[must_use]
pub fn count_bar(len: u64, label: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .expect("bar template parses")
        .progress_chars("=> ");
    let bar = ProgressBar::new(len).with_style(style);
    bar.set_message(label.to_owned());
    bar
}

/// Byte count as hex plus a rounded human size, e.g. `0x1027e4 (1.0 MiB)`.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1 << 10;
    const MIB: u64 = 1 << 20;
    let human = match bytes {
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    };
    format!("0x{bytes:x} ({human})")
}
