//! fastswap CLI - embedded host console and module archive tooling

mod cli;
mod commands;
mod console;
mod error;

pub use error::CliError;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run_command_async(cli));
    // A pending stdin read would otherwise hold the runtime open
    rt.shutdown_timeout(std::time::Duration::from_millis(200));
    result
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            modules_dir,
            config,
            layout,
        } => {
            commands::run::run(&modules_dir, &config, layout.into()).await?;
        }

        Commands::Pack {
            manifest,
            files,
            output,
        } => {
            commands::pack::run(&manifest, &files, output.as_deref())?;
        }

        Commands::Init { path } => {
            commands::init::run(&path)?;
        }

        Commands::List { modules_dir } => {
            commands::list::run(&modules_dir)?;
        }
    }

    Ok(())
}
