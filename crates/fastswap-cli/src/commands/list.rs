//! `fastswap list` command implementation

use crate::CliError;
use colored::Colorize;
use fastswap_runtime::DescriptorLoader;
use std::path::Path;

/// Execute the `fastswap list` command
pub fn run(modules_dir: &Path) -> Result<(), CliError> {
    let loader = DescriptorLoader::new(modules_dir);
    let archives = loader.list_archives()?;

    if archives.is_empty() {
        println!("No module archives in {}", modules_dir.display());
        return Ok(());
    }

    for path in archives {
        let file = path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        match loader.parse_manifest(&path) {
            Ok(manifest) => {
                let commands: Vec<_> = manifest.command_labels().collect();
                println!(
                    "{} {} {} ({})",
                    "•".green(),
                    manifest.name.cyan(),
                    manifest.version,
                    file
                );
                if !commands.is_empty() {
                    println!("    commands: {}", commands.join(", "));
                }
            }
            Err(e) => println!("{} {}: {}", "✗".red(), file, e),
        }
    }
    Ok(())
}
