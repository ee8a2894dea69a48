//! `fastswap init` command implementation

use crate::CliError;
use colored::Colorize;
use fastswap_kernel::config::FastSwapConfig;
use std::path::Path;

/// Execute the `fastswap init` command
pub fn run(path: &Path) -> Result<(), CliError> {
    if FastSwapConfig::write_default_if_missing(path)? {
        println!("{} Wrote default configuration to {}", "✓".green(), path.display());
    } else {
        println!(
            "{} {} already exists, leaving it untouched",
            "→".yellow(),
            path.display()
        );
    }
    Ok(())
}
