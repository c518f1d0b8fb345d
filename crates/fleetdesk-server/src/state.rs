use std::sync::Arc;

use fleetdesk_core::config::Config;
use fleetdesk_core::db::Store;
use fleetdesk_core::geocode::{self, GeocodeJob, Geocoder};
use fleetdesk_core::push::{self, PushSender};
use tokio::sync::mpsc;

use crate::auth::TokenService;
use crate::geocode_worker;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub tokens: Arc<TokenService>,
    pub push: Arc<dyn PushSender>,
    geocode_tx: Option<mpsc::UnboundedSender<GeocodeJob>>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        tokens: TokenService,
        geocoder: Arc<dyn Geocoder>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        let geocode_tx = tokio::runtime::Handle::try_current()
            .is_ok()
            .then(|| geocode_worker::spawn(store.clone(), geocoder));
        Self {
            store,
            tokens: Arc::new(tokens),
            push,
            geocode_tx,
        }
    }

    /// Wire up the geocoder and push sender described by `config`.
    pub fn from_config(config: &Config, store: Arc<Store>) -> anyhow::Result<Self> {
        let geocoder: Arc<dyn Geocoder> = Arc::from(geocode::from_config(&config.geocoding));
        if !config.push.is_configured() {
            tracing::info!("push credentials not configured; notifications disabled");
        }
        let push: Arc<dyn PushSender> = Arc::from(push::from_config(&config.push)?);
        Ok(Self::new(store, TokenService::new(&config.auth), geocoder, push))
    }

    /// Hand lookups to the background worker. Dropped silently when no
    /// worker is running.
    pub fn enqueue_geocode(&self, jobs: Vec<GeocodeJob>) {
        let Some(tx) = &self.geocode_tx else {
            return;
        };
        for job in jobs {
            if tx.send(job).is_err() {
                tracing::warn!("geocode worker is gone; lookup dropped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdesk_core::geocode::DisabledGeocoder;
    use fleetdesk_core::push::DisabledPush;

    #[test]
    fn new_state_without_runtime_has_no_worker() {
        let state = AppState::new(
            Arc::new(Store::in_memory().unwrap()),
            TokenService::new(&Default::default()),
            Arc::new(DisabledGeocoder),
            Arc::new(DisabledPush),
        );
        assert!(state.geocode_tx.is_none());
        state.enqueue_geocode(vec![GeocodeJob::new(
            fleetdesk_core::geocode::GeocodeTarget::Address(1),
            "1 Main St",
        )]);
    }
}
