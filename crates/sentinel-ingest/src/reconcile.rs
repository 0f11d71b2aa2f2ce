//! Currency reconciliation
//!
//! After a run, events of the target country that the feed still lists as
//! current are marked `is_current = true`, and previously current events
//! that no longer appear are demoted. Events outside the country scope are
//! never touched.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::StoreError;
use crate::filter::CountryScope;
use crate::store::EventStore;

pub use crate::store::ReconcileSummary;

#[derive(Clone)]
pub struct CurrencyReconciler {
    store: Arc<dyn EventStore>,
    scope: CountryScope,
}

impl CurrencyReconciler {
    pub fn new(store: Arc<dyn EventStore>, scope: CountryScope) -> Self {
        Self { store, scope }
    }

    /// Flip `is_current` so that exactly the `seen` events in scope are
    /// current. Running it twice with the same set changes nothing.
    pub async fn reconcile(&self, seen: &HashSet<String>) -> Result<ReconcileSummary, StoreError> {
        let summary = self.store.reconcile_current(&self.scope, seen).await?;
        info!(
            seen = seen.len(),
            demoted = summary.demoted,
            promoted = summary.promoted,
            "Reconciled current events"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::store::{EventUpsert, MemoryStore};

    async fn seed(store: &MemoryStore, id: &str, country: &str) {
        let mut record = RawRecord::new(id);
        record.country = Some(country.to_string());
        store.upsert(EventUpsert { record, region: None }).await.unwrap();
    }

    fn ids(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_absent_events_are_demoted() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "A", "India").await;
        seed(&store, "B", "India").await;
        let reconciler = CurrencyReconciler::new(store.clone(), CountryScope::default());

        reconciler.reconcile(&ids(&["A", "B"])).await.unwrap();
        let summary = reconciler.reconcile(&ids(&["B"])).await.unwrap();

        assert_eq!(summary.demoted, 1);
        assert!(!store.find("A").await.unwrap().unwrap().is_current);
        assert!(store.find("B").await.unwrap().unwrap().is_current);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "A", "India").await;
        let reconciler = CurrencyReconciler::new(store.clone(), CountryScope::default());

        assert_eq!(reconciler.reconcile(&ids(&["A"])).await.unwrap().promoted, 1);
        assert_eq!(
            reconciler.reconcile(&ids(&["A"])).await.unwrap(),
            ReconcileSummary::default()
        );
    }
}
