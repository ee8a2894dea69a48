//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use fastswap_runtime::HostLayout;
use std::path::PathBuf;

/// fastswap - reload modules without restarting the host
#[derive(Parser)]
#[command(name = "fastswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run an embedded host with an interactive console
    Run {
        /// Directory holding module archives
        #[arg(short, long, default_value = "modules", env = "FASTSWAP_MODULES_DIR")]
        modules_dir: PathBuf,

        /// Configuration file, created with defaults if missing
        #[arg(short, long, default_value = "fastswap/config.yml", env = "FASTSWAP_CONFIG")]
        config: PathBuf,

        /// Registry storage layout of the embedded host
        #[arg(short, long, value_enum, default_value_t = LayoutArg::Flat)]
        layout: LayoutArg,
    },

    /// Package a manifest and files into a module archive
    Pack {
        /// Manifest file (module.yml)
        manifest: PathBuf,

        /// Extra files to store next to the manifest
        files: Vec<PathBuf>,

        /// Output archive, defaults to `<name>.zip` in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the default configuration file
    Init {
        /// Configuration file path
        #[arg(default_value = "fastswap/config.yml")]
        path: PathBuf,
    },

    /// List the module archives in a directory
    List {
        /// Directory holding module archives
        #[arg(default_value = "modules")]
        modules_dir: PathBuf,
    },
}

/// Host storage layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// One manager holding every table
    Flat,
    /// Instance and permission managers behind a layered manager
    Nested,
}

impl From<LayoutArg> for HostLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Flat => HostLayout::Flat,
            LayoutArg::Nested => HostLayout::Nested,
        }
    }
}
