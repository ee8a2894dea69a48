//! `fastswap run` command implementation

use crate::CliError;
use crate::console::{Console, Flow};
use colored::Colorize;
use fastswap_kernel::config::FastSwapConfig;
use fastswap_runtime::{
    ConfigReloadCommand, EmbeddedHost, HostLayout, PrimaryThread, ReloadEvent, ReloadOrchestrator,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Execute the `fastswap run` command
pub async fn run(
    modules_dir: &Path,
    config_path: &Path,
    layout: HostLayout,
) -> Result<(), CliError> {
    if FastSwapConfig::write_default_if_missing(config_path)? {
        info!("Wrote default configuration to {:?}", config_path);
    }
    let config = FastSwapConfig::load_with_env(config_path)?;
    std::fs::create_dir_all(modules_dir)?;

    println!(
        "{} Starting {} host on {}",
        "→".green(),
        format!("{:?}", layout).to_lowercase(),
        modules_dir.display()
    );

    let host = Arc::new(EmbeddedHost::new(layout, modules_dir));
    let report = host.bootstrap();
    for (path, error) in &report.failures {
        println!("{} {}: {}", "✗".red(), path.display(), error);
    }
    println!(
        "{} Loaded {} module(s): {}",
        "✓".green(),
        report.loaded.len(),
        report.loaded.join(", ")
    );

    let primary = Arc::new(PrimaryThread::spawn("fastswap-primary")?);
    let orchestrator = ReloadOrchestrator::builder(host.clone(), primary.clone(), modules_dir)
        .with_policy(config.to_policy())
        .with_runtime(Handle::current())
        .build();

    let installed = orchestrator.install_trigger_commands();
    info!(labels = installed, "Reload commands installed");
    orchestrator.start();

    let events = tokio::spawn(log_events(orchestrator.subscribe()));

    let console = Console::new(
        host,
        Arc::clone(&orchestrator),
        ConfigReloadCommand::new(Arc::clone(&orchestrator), config_path),
    );
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if console.handle_line(&line).await == Flow::Stop {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    println!("{} Shutting down", "→".yellow());
    orchestrator.shutdown();
    events.abort();
    drop(console);
    primary.shutdown();
    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<ReloadEvent>) {
    loop {
        match events.recv().await {
            Ok(ReloadEvent::ModuleLoaded { module, duration }) => {
                println!(
                    "{} Loaded new module {} in {} ms",
                    "✓".green(),
                    module.cyan(),
                    duration.as_millis()
                );
            }
            Ok(ReloadEvent::ModuleFailed {
                module,
                error,
                duration,
            }) => {
                println!(
                    "{} {} failed after {} ms: {}",
                    "✗".red(),
                    module.cyan(),
                    duration.as_millis(),
                    error
                );
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Reload event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
