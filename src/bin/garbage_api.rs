//! garbage_api - HTTP service for geotagged waste reports
//!
//! This daemon:
//! 1. Loads configuration (file + environment)
//! 2. Opens the report store and loads the detection model
//! 3. Serves the report API until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use garbage_detection::{
    api::{ApiConfig, ApiServer},
    config::ServiceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "garbage_api", version, about = "Garbage Detection API server")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "GARBAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(long)]
    addr: Option<String>,

    /// Do not serve saved uploads under /uploads.
    #[arg(long)]
    no_static_uploads: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ServiceConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.api.addr = addr;
    }

    log::info!("opening report store {}", config.database_url);
    log::info!(
        "loading detector backend '{}' (threshold {})",
        config.detector.backend,
        config.detector.confidence_threshold
    );
    let service = garbage_detection::build_service(&config)?;
    log::info!("storing uploads in {}", service.upload_dir().display());

    let api_config = ApiConfig {
        addr: config.api.addr.clone(),
        max_upload_bytes: config.api.max_upload_bytes,
        serve_uploads: !args.no_static_uploads,
    };
    let api_handle = ApiServer::new(api_config, service).spawn()?;
    log::info!("report api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("garbage_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
