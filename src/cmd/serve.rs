use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::{AppConfig, GlobalOpts};
use crate::{repo, web};

/// Leftover checkouts older than this are removed when the server starts.
const STARTUP_PRUNE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub async fn run(listen: SocketAddr, opts: &GlobalOpts) -> Result<()> {
    let cfg = AppConfig::init_from_cli(opts)?;
    info!(
        runtime = %cfg.runtime.kind,
        binary = %cfg.runtime.binary_path.display(),
        storage_root = %cfg.storage_root.display(),
        timeout = %humantime::format_duration(cfg.command_timeout),
        "configuration loaded"
    );

    match repo::prune(&cfg.storage_root, STARTUP_PRUNE_AGE) {
        Ok(removed) if !removed.is_empty() => info!(count = removed.len(), "pruned stale checkouts"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to prune stale checkouts"),
    }

    web::serve(listen, cfg).await
}
