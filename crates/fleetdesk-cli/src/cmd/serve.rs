use anyhow::Context;
use fleetdesk_core::config::{Config, WarnLevel};
use std::sync::Arc;

use crate::settings;

pub fn run(config: Config) -> anyhow::Result<()> {
    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }
    config.ensure_valid().context("refusing to start")?;

    let store = Arc::new(settings::open_store(&config)?);
    tracing::info!(
        path = %config.database.path.display(),
        version = store.schema_version()?,
        "database ready"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let local = listener.local_addr()?;
        println!("fleetdesk API → http://{local}/api  (PID {})", std::process::id());

        tokio::select! {
            res = fleetdesk_server::serve_on(&config, store, listener) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
