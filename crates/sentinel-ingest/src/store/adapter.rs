//! Create-or-update with geocode gating

use sentinel_common::DisasterEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{EventStore, EventUpsert};
use crate::error::StoreError;
use crate::geocode::GeocodeEnricher;
use crate::models::RawRecord;

/// What happened to the region lookup for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeOutcome {
    /// A new region was resolved and written
    Resolved,
    /// The stored event already had a region and no refresh was forced
    AlreadyKnown,
    MissingCoordinates,
    /// Geocoding switched off for this run
    Disabled,
    /// The service answered without a usable region
    NotFound,
    /// The lookup failed; the stored region is left as it was
    Failed,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub event: DisasterEvent,
    pub created: bool,
    /// New event, or the alert tier differs from what was stored before
    pub alert_changed: bool,
    pub geocode: GeocodeOutcome,
}

/// Write path for one record.
///
/// Built per run: the geocode switches are run-level flags.
#[derive(Clone)]
pub struct UpsertAdapter {
    store: Arc<dyn EventStore>,
    enricher: Option<GeocodeEnricher>,
    force_geocode: bool,
    disable_geocode: bool,
}

impl UpsertAdapter {
    /// `enricher: None` behaves like a run with geocoding disabled
    pub fn new(store: Arc<dyn EventStore>, enricher: Option<GeocodeEnricher>) -> Self {
        Self {
            store,
            enricher,
            force_geocode: false,
            disable_geocode: false,
        }
    }

    /// Re-resolve regions even when one is already stored
    pub fn force_geocode(mut self, force: bool) -> Self {
        self.force_geocode = force;
        self
    }

    pub fn disable_geocode(mut self, disable: bool) -> Self {
        self.disable_geocode = disable;
        self
    }

    pub async fn upsert(&self, record: RawRecord) -> Result<UpsertOutcome, StoreError> {
        let existing = self.store.find(&record.event_id).await?;

        let already_known = existing.as_ref().is_some_and(DisasterEvent::has_region);
        let (region, geocode) = if already_known && !self.force_geocode {
            (None, GeocodeOutcome::AlreadyKnown)
        } else {
            self.lookup_region(&record).await
        };

        let previous_alert = existing.as_ref().and_then(DisasterEvent::alert);
        let (event, created) = self.store.upsert(EventUpsert { record, region }).await?;

        let alert_changed = created || event.alert() != previous_alert;
        debug!(
            event_id = %event.event_id,
            created,
            alert_changed,
            geocode = ?geocode,
            "Stored event"
        );

        Ok(UpsertOutcome {
            event,
            created,
            alert_changed,
            geocode,
        })
    }

    async fn lookup_region(&self, record: &RawRecord) -> (Option<String>, GeocodeOutcome) {
        let enricher = match &self.enricher {
            Some(enricher) if !self.disable_geocode => enricher,
            _ => return (None, GeocodeOutcome::Disabled),
        };

        let Some((latitude, longitude)) = record.coordinates() else {
            debug!(event_id = %record.event_id, "No coordinates, skipping geocode");
            return (None, GeocodeOutcome::MissingCoordinates);
        };

        match enricher.resolve_region(latitude, longitude).await {
            Ok(Some(region)) => (Some(region), GeocodeOutcome::Resolved),
            Ok(None) => (None, GeocodeOutcome::NotFound),
            Err(e) => {
                warn!(event_id = %record.event_id, error = %e, "Geocoding failed, keeping stored region");
                (None, GeocodeOutcome::Failed)
            },
        }
    }
}
