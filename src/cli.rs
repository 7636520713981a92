//! CLI utilities: tracing setup and progress bar style.

use indicatif::ProgressStyle;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr tracing subscriber. Honors `RUST_LOG` when set and
/// defaults to info level otherwise; callers in quiet or JSON mode simply
/// never install it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Progress bar style for the per-key search loop.
pub fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Invalid progress bar template")
        .progress_chars("#>-")
}
