use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "package update server")]
pub struct Args {
    /// Sub‑commands (run, latest, verify)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(ClapArgs, Debug, Default, Clone)]
pub struct StoreArgs {
    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Package store directory (overrides `store_dir`)
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Serve the HTTP endpoints (default if no sub‑command)
    Run {
        #[command(flatten)]
        store: StoreArgs,

        /// Listen address, e.g. 0.0.0.0:38686 (overrides `bind`)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Append logs to this file instead of stderr (overrides `log_file`)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the latest version listed in the manifest (Exit 0 = found, 1 = error)
    Latest {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Check every manifest entry (Exit 0 = clean, 1 = problems found)
    Verify {
        #[command(flatten)]
        store: StoreArgs,
    },
}
