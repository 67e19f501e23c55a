//! wastewatchd - waste photo ingestion daemon
//!
//! This daemon:
//! 1. Opens the SQLite record/credential store and the media roots
//! 2. Builds the ingestion pipeline around the configured detection model
//! 3. Serves the upload and query API with the credential gate
//! 4. Runs until interrupted

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use wastewatch::api::{ApiConfig, ApiServer, ApiServices};
use wastewatch::config::WastewatchConfig;
use wastewatch::{
    AccessGate, CredentialIssuer, IngestionPipeline, MediaStore, SqliteStore, StubModel,
};

#[derive(Debug, Parser)]
#[command(name = "wastewatchd", about = "Waste photo ingestion daemon")]
struct Cli {
    /// JSON config file
    #[arg(long, env = "WASTEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = WastewatchConfig::load_from(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        cfg.api_addr = addr;
    }

    let store = SqliteStore::open(&cfg.db_path)?;
    let media = MediaStore::open(&cfg.image_dir, &cfg.labeled_dir)?;
    let catalog = cfg.catalog()?;

    // The production inference backend is wired in by the deployment; until
    // then every upload records zero detections.
    log::warn!("stub detection model active; uploads will record zero detections");
    let model = Box::new(StubModel::empty());

    let pipeline = IngestionPipeline::new(
        media.clone(),
        Box::new(store.clone()),
        model,
        catalog.clone(),
    );
    let services = ApiServices {
        pipeline,
        gate: AccessGate::new(Box::new(store.clone())),
        issuer: CredentialIssuer::new(Box::new(store.clone())),
        records: Box::new(store),
        media,
    };

    let api_cfg = ApiConfig {
        addr: cfg.api_addr.clone(),
        require_upload_token: cfg.require_upload_token,
        default_token_validity: cfg.token_validity,
    };
    let handle = ApiServer::new(api_cfg, services).spawn()?;

    log::info!("wastewatchd running. db={} api={}", cfg.db_path, handle.addr);
    log::info!(
        "catalog: {} classes, upload gating: {}",
        catalog.len(),
        if cfg.require_upload_token { "on" } else { "off" }
    );

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    stop_rx.recv()?;

    log::info!("shutting down");
    handle.stop()?;
    Ok(())
}
