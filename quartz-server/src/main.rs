use anyhow::Context;
use quartz_core::{IndexService, ServiceConfig};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    quartz_server::init_tracing();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    // The upstream client is blocking: build it (and later drop it) outside the runtime.
    let service = Arc::new(IndexService::from_config(&config).context("failed to build index service")?);

    tracing::info!(
        snapshot_dir = %config.snapshot_dir.display(),
        equity = %config.equity_symbol,
        crypto = %config.crypto_symbol,
        start = %config.start_date,
        presets = ?config.presets.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "configuration loaded"
    );
    if config.eod_api_key.is_empty() {
        tracing::warn!("EOD_API_KEY is not set; upstream fetches will be rejected");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = runtime.block_on(quartz_server::serve(&config, Arc::clone(&service)));
    drop(runtime);

    result
}
