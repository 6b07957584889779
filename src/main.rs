//! omadm-server: a SyncML 1.2 / OMA DM update server for legacy webOS
//! devices, speaking the `/palmcsext/swupdateserver` protocol HP TouchPad
//! and Pre firmware expect.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::*;
use omadm_core::catalog::Catalog;
use std::fs;
use std::time::Duration;
use validator::Validate;

mod cmdline;
mod config;
mod transport;

use cmdline::{Command, Opt};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    let config: Config = toml::from_str(
        &fs::read_to_string(&opt.config).with_context(|| format!("Failed to read {:?}", opt.config))?,
    )
    .with_context(|| format!("Failed to parse the {:?} config file", opt.config))?;

    config
        .validate()
        .with_context(|| format!("Failed to validate the {:?} config file", opt.config))?;

    env_logger::Builder::from_env(Env::default().default_filter_or(if config.debug { "debug" } else { "info" })).init();

    info!("omadm-server {}", env!("CARGO_PKG_VERSION"));

    let catalog = Catalog::load(config.packages_dir.clone()).await;
    let added = catalog
        .scan()
        .await
        .with_context(|| format!("Failed to scan {:?}", config.packages_dir))?;
    info!("loaded {} package(s), {} new since last run", catalog.len().await, added);

    match opt.cmd {
        None | Some(Command::Serve) => serve(config, catalog).await,
        Some(Command::Scan) => {
            let added = catalog.scan().await.context("rescan failed")?;
            println!("{} package(s) known, {} added", catalog.len().await, added);
            Ok(())
        }
        Some(Command::Check { build }) => {
            match catalog.check_update_available(&build, None, None).await {
                Some(pkg) => println!("update available for {build}: {} ({})", pkg.name, pkg.version),
                None => println!("no update available for {build}"),
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, catalog: Catalog) -> Result<()> {
    let host = config.server_host.clone();
    let port = config.server_port;
    let sweep_interval = Duration::from_secs(config.session_timeout_secs.max(1));

    let (router, state) = transport::build(config, catalog);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let expired = state.sessions.sweep().await;
            if expired > 0 {
                debug!("swept {expired} expired session(s)");
            }
        }
    });

    let addr = format!("{host}:{port}");
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
