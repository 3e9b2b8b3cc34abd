use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "emm", about = "Mod manager for the Ex Machina game family", version)]
pub struct ProgArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Persisted tool configuration to read and update (default:
    /// `emm.yaml` in the working directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the mods of a distribution with their load status.
    List {
        /// Distribution directory (holds `mods/`).
        #[arg(long)]
        distro: PathBuf,
    },

    /// Identify a game directory: executable, version, installed mods.
    Probe {
        /// Game root directory.
        game: PathBuf,
    },

    /// Resolve a mod against a game copy and report every verdict.
    Check {
        #[arg(long)]
        distro: PathBuf,
        #[arg(long)]
        game: PathBuf,
        /// Mod name as declared in its manifest.
        name: String,
        /// Report using this translation when available.
        #[arg(long)]
        language: Option<String>,
    },

    /// Install a mod into a game copy.
    Install {
        #[arg(long)]
        distro: PathBuf,
        #[arg(long)]
        game: PathBuf,
        /// Mod name as declared in its manifest.
        name: String,
        /// Override an option, e.g. `--option hud=skip` or
        /// `--option maps=classic`.  Defaults come from the manifest.
        #[arg(long = "option", value_name = "NAME=VALUE")]
        options: Vec<String>,
        /// Install this translation instead of the primary manifest.
        #[arg(long)]
        language: Option<String>,
        /// Skip the base content.
        #[arg(long)]
        skip_base: bool,
    },
}
