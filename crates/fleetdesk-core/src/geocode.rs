//! Best-effort address → coordinates lookup.
//!
//! Geocoding never fails the write it accompanies. Writes that change an
//! address return [`GeocodeJob`]s; the server resolves them after the
//! transaction commits and stores whatever comes back.

use std::time::Duration;

use reqwest::blocking::Client;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config::GeocodingConfig;
use crate::db::Store;
use crate::error::{DeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

pub trait Geocoder: Send + Sync {
    /// `None` when the address is unknown or the lookup failed.
    fn geocode(&self, query: &str) -> Option<Coordinates>;
}

// ---------------------------------------------------------------------------
// Nominatim
// ---------------------------------------------------------------------------

pub struct NominatimGeocoder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct Place {
    lat: serde_json::Value,
    lon: serde_json::Value,
}

/// Nominatim sends coordinates as strings; accept numbers too.
fn coord(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

impl NominatimGeocoder {
    pub fn new(cfg: &GeocodingConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            user_agent: cfg.user_agent.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms.max(100)),
        }
    }

    pub fn lookup(&self, query: &str) -> Result<Option<Coordinates>> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()?;
        let resp = client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()?;
        if !resp.status().is_success() {
            return Err(DeskError::Geocode(format!("HTTP {}", resp.status())));
        }
        let places: Vec<Place> = resp.json()?;
        Ok(places.first().and_then(|p| {
            Some(Coordinates {
                latitude: coord(&p.lat)?,
                longitude: coord(&p.lon)?,
            })
        }))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> Option<Coordinates> {
        match self.lookup(query) {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(address = %truncate(query, 40), "no geocoding match");
                }
                found
            }
            Err(e) => {
                tracing::warn!(address = %truncate(query, 40), error = %e, "geocoding failed");
                None
            }
        }
    }
}

pub struct DisabledGeocoder;

impl Geocoder for DisabledGeocoder {
    fn geocode(&self, _query: &str) -> Option<Coordinates> {
        None
    }
}

pub fn from_config(cfg: &GeocodingConfig) -> Box<dyn Geocoder> {
    if cfg.enabled {
        Box::new(NominatimGeocoder::new(cfg))
    } else {
        Box::new(DisabledGeocoder)
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodeTarget {
    Address(i64),
    DeliveryPickup(i64),
    DeliveryDrop(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeJob {
    pub target: GeocodeTarget,
    pub query: String,
}

impl GeocodeJob {
    pub fn new(target: GeocodeTarget, query: impl Into<String>) -> Self {
        Self {
            target,
            query: query.into(),
        }
    }

    /// Store `coords` on the target row. Skipped when the row's text no
    /// longer matches the query, so a slow lookup cannot overwrite a newer
    /// edit. Returns whether a row was updated.
    pub fn apply(&self, conn: &Connection, coords: Coordinates) -> Result<bool> {
        let (sql, id) = match self.target {
            GeocodeTarget::Address(id) => (
                "UPDATE addresses SET latitude = ?2, longitude = ?3 WHERE id = ?1 AND address = ?4",
                id,
            ),
            GeocodeTarget::DeliveryPickup(id) => (
                "UPDATE deliveries SET pickup_latitude = ?2, pickup_longitude = ?3
                 WHERE id = ?1 AND pickup_address = ?4",
                id,
            ),
            GeocodeTarget::DeliveryDrop(id) => (
                "UPDATE deliveries SET drop_latitude = ?2, drop_longitude = ?3
                 WHERE id = ?1 AND drop_address = ?4",
                id,
            ),
        };
        let n = conn.execute(
            sql,
            params![id, coords.latitude, coords.longitude, self.query],
        )?;
        Ok(n > 0)
    }
}

/// Resolve one job and persist the result. Blocking.
pub fn run_job(store: &Store, geocoder: &dyn Geocoder, job: &GeocodeJob) -> Result<bool> {
    let Some(coords) = geocoder.geocode(&job.query) else {
        return Ok(false);
    };
    store.write(|tx| job.apply(tx, coords))
}

/// A committed write plus the lookups it left behind.
#[derive(Debug, Clone)]
pub struct Saved<T> {
    pub record: T,
    pub geocode: Vec<GeocodeJob>,
}

impl<T> Saved<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            geocode: Vec::new(),
        }
    }

    pub fn with_job(mut self, job: Option<GeocodeJob>) -> Self {
        self.geocode.extend(job);
        self
    }
}
