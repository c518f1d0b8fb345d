use std::sync::Arc;

use fleetdesk_core::db::Store;
use fleetdesk_core::geocode::{self, GeocodeJob, Geocoder};
use tokio::sync::mpsc;

/// Start the background geocoder. Jobs are resolved one at a time on the
/// blocking pool, after the write that queued them has committed.
pub fn spawn(store: Arc<Store>, geocoder: Arc<dyn Geocoder>) -> mpsc::UnboundedSender<GeocodeJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<GeocodeJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let store = store.clone();
            let geocoder = geocoder.clone();
            let target = job.target;
            let res = tokio::task::spawn_blocking(move || {
                geocode::run_job(&store, geocoder.as_ref(), &job)
            })
            .await;
            match res {
                Ok(Ok(true)) => tracing::debug!(?target, "coordinates stored"),
                Ok(Ok(false)) => tracing::debug!(?target, "no coordinates stored"),
                Ok(Err(e)) => tracing::warn!(?target, error = %e, "storing coordinates failed"),
                Err(e) => tracing::warn!(?target, error = %e, "geocode task panicked"),
            }
        }
        tracing::debug!("geocode worker stopped");
    });
    tx
}
