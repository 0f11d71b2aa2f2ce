//! Event persistence
//!
//! [`EventStore`] is the seam between the pipeline and the database.
//! [`PgEventStore`] is the production implementation; [`MemoryStore`] backs
//! tests and `--memory` dry runs. [`UpsertAdapter`] layers the
//! create-or-update and geocode gating rules on top of either.

pub mod adapter;
pub mod memory;
pub mod postgres;

pub use adapter::{GeocodeOutcome, UpsertAdapter, UpsertOutcome};
pub use memory::MemoryStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use sentinel_common::DisasterEvent;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::StoreError;
use crate::filter::CountryScope;
use crate::models::RawRecord;

/// One write: the normalized record plus a freshly resolved region, if any.
///
/// Optional fields that are `None` keep whatever the store already has;
/// `region: None` never clears a stored region.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpsert {
    pub record: RawRecord,
    pub region: Option<String>,
}

/// Rows flipped by one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Current events that were absent from the run
    pub demoted: u64,
    /// Events seen in the run that were not yet marked current
    pub promoted: u64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find(&self, event_id: &str) -> Result<Option<DisasterEvent>, StoreError>;

    /// Insert or update by `event_id`; returns the stored event and whether
    /// it was newly created
    async fn upsert(&self, upsert: EventUpsert) -> Result<(DisasterEvent, bool), StoreError>;

    /// Within `scope`, mark `seen` events current and every other current
    /// event not current
    async fn reconcile_current(
        &self,
        scope: &CountryScope,
        seen: &HashSet<String>,
    ) -> Result<ReconcileSummary, StoreError>;

    /// Most recent events first, by publish date then from-date
    async fn recent(&self, limit: usize) -> Result<Vec<DisasterEvent>, StoreError>;
}
