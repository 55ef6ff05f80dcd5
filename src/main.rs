mod cli;
mod manager;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use cli::{Cmd, StoreArgs};
use manager::Supervisor;
use pkgserve::config::{Overrides, ServerConfig};
use pkgserve::logging::ServerLog;
use pkgserve::service::current_latest;

fn main() {
    let args = cli::Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            eprintln!("The server cannot start without an async runtime.");
            std::process::exit(1);
        }
    };

    let cmd = args.sub.unwrap_or(Cmd::Run {
        store: StoreArgs::default(),
        bind: None,
        log_file: None,
    });

    let outcome = match cmd {
        Cmd::Run {
            store,
            bind,
            log_file,
        } => rt.block_on(run_server(store, bind, log_file)),
        Cmd::Latest { store } => rt.block_on(handle_latest(store)),
        Cmd::Verify { store } => rt.block_on(handle_verify(store)),
    };

    if let Err(e) = outcome {
        // Offline commands and early startup failures run without a logger
        if log::max_level() == log::LevelFilter::Off {
            eprintln!("Error: {e:#}");
        } else {
            error!("{e:#}");
        }
        std::process::exit(1);
    }
}

async fn run_server(
    store: StoreArgs,
    bind: Option<std::net::SocketAddr>,
    log_file: Option<std::path::PathBuf>,
) -> Result<()> {
    let loaded = ServerConfig::load(store.config.as_deref())?;
    let mut cfg = loaded.config;
    cfg.apply(Overrides {
        bind,
        store_dir: store.store,
        log_file,
    });

    let (log, level) = ServerLog::build(cfg.log_file.as_deref())?;
    log.install_global(level)?;

    if loaded.created {
        info!("Created default configuration at {}", loaded.path.display());
    }
    info!("Using config from: {}", loaded.path.display());

    manager::install_signal_handlers()?;
    info!("pkgserve started (pid {})", std::process::id());
    Supervisor::new(cfg, log).run().await?;
    info!("pkgserve exiting");
    Ok(())
}

fn offline_config(store: StoreArgs) -> Result<ServerConfig> {
    let mut cfg = ServerConfig::load(store.config.as_deref())?.config;
    cfg.apply(Overrides {
        store_dir: store.store,
        ..Overrides::default()
    });
    Ok(cfg)
}

/// Handle latest command - print the version `/latest_version` would report
async fn handle_latest(store: StoreArgs) -> Result<()> {
    let cfg = offline_config(store)?;
    let latest = current_latest(&cfg.manifest_store())
        .await
        .context("Failed to determine latest version")?;
    println!("{latest}");
    Ok(())
}

/// Handle verify command - check that every manifest entry is servable
async fn handle_verify(store: StoreArgs) -> Result<()> {
    let cfg = offline_config(store)?;
    let manifest_store = cfg.manifest_store();
    let report = manifest_store
        .verify()
        .await
        .context("Failed to verify manifest")?;

    println!(
        "{}: {} entries, latest {}",
        manifest_store.manifest_path().display(),
        report.entries,
        report.latest.as_deref().unwrap_or("<none>")
    );
    for problem in &report.problems {
        println!("  problem: {problem}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} problem(s) found", report.problems.len()))
    }
}
