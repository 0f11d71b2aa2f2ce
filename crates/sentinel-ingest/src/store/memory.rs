//! In-process event store

use async_trait::async_trait;
use chrono::Utc;
use sentinel_common::DisasterEvent;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{EventStore, EventUpsert, ReconcileSummary};
use crate::error::StoreError;
use crate::filter::CountryScope;
use crate::models::UNTITLED;

/// `HashMap`-backed store with the same write semantics as the database
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<String, DisasterEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite an event as-is
    pub async fn insert(&self, event: DisasterEvent) {
        self.events.write().await.insert(event.event_id.clone(), event);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// All events, ordered by id
    pub async fn snapshot(&self) -> Vec<DisasterEvent> {
        let mut events: Vec<_> = self.events.read().await.values().cloned().collect();
        events.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        events
    }
}

fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find(&self, event_id: &str) -> Result<Option<DisasterEvent>, StoreError> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn upsert(&self, upsert: EventUpsert) -> Result<(DisasterEvent, bool), StoreError> {
        let EventUpsert { record, region } = upsert;
        let now = Utc::now();
        let mut events = self.events.write().await;

        if let Some(event) = events.get_mut(&record.event_id) {
            if let Some(title) = record.title {
                event.title = title;
            }
            if let Some(link) = record.link {
                event.link = link;
            }
            keep(&mut event.description, record.description);
            keep(&mut event.published_at, record.published_at);
            keep(&mut event.from_date, record.from_date);
            keep(&mut event.to_date, record.to_date);
            keep(&mut event.latitude, record.latitude);
            keep(&mut event.longitude, record.longitude);
            keep(&mut event.region, region);
            keep(&mut event.event_type, record.event_type);
            keep(&mut event.alert_level, record.alert_level);
            keep(&mut event.severity, record.severity);
            keep(&mut event.population_estimate, record.population_estimate);
            keep(&mut event.country, record.country);
            keep(&mut event.country_code, record.country_code);
            event.updated_at = now;
            return Ok((event.clone(), false));
        }

        let event = DisasterEvent {
            event_id: record.event_id,
            title: record.title.unwrap_or_else(|| UNTITLED.to_string()),
            description: record.description,
            link: record.link.unwrap_or_default(),
            published_at: record.published_at,
            from_date: record.from_date,
            to_date: record.to_date,
            latitude: record.latitude,
            longitude: record.longitude,
            region,
            event_type: record.event_type,
            alert_level: record.alert_level,
            severity: record.severity,
            population_estimate: record.population_estimate,
            country: record.country,
            country_code: record.country_code,
            is_current: false,
            created_at: now,
            updated_at: now,
        };
        events.insert(event.event_id.clone(), event.clone());
        Ok((event, true))
    }

    async fn reconcile_current(
        &self,
        scope: &CountryScope,
        seen: &HashSet<String>,
    ) -> Result<ReconcileSummary, StoreError> {
        let now = Utc::now();
        let mut summary = ReconcileSummary::default();
        let mut events = self.events.write().await;

        for event in events.values_mut() {
            if !scope.matches(event.country.as_deref(), event.country_code.as_deref()) {
                continue;
            }
            let current = seen.contains(&event.event_id);
            if current != event.is_current {
                event.is_current = current;
                event.updated_at = now;
                if current {
                    summary.promoted += 1;
                } else {
                    summary.demoted += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<DisasterEvent>, StoreError> {
        let mut events: Vec<_> = self.events.read().await.values().cloned().collect();
        // Undated events last, ties broken by id for a stable listing
        events.sort_by(|a, b| {
            (a.sort_key().is_none(), Reverse(a.sort_key()), &a.event_id).cmp(&(
                b.sort_key().is_none(),
                Reverse(b.sort_key()),
                &b.event_id,
            ))
        });
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use chrono::{Duration, TimeZone};

    fn record(id: &str) -> RawRecord {
        let mut r = RawRecord::new(id);
        r.title = Some(format!("Event {}", id));
        r.country = Some("India".into());
        r.alert_level = Some("Green".into());
        r
    }

    #[tokio::test]
    async fn test_insert_then_update_keeps_absent_fields() {
        let store = MemoryStore::new();
        let mut first = record("1");
        first.severity = Some("Magnitude 5".into());
        let (created, is_new) = store
            .upsert(EventUpsert {
                record: first,
                region: Some("Delhi".into()),
            })
            .await
            .unwrap();
        assert!(is_new);
        assert!(!created.is_current);

        let mut second = RawRecord::new("1");
        second.alert_level = Some("Red".into());
        let (updated, is_new) = store
            .upsert(EventUpsert {
                record: second,
                region: None,
            })
            .await
            .unwrap();
        assert!(!is_new);
        assert_eq!(updated.title, "Event 1");
        assert_eq!(updated.severity.as_deref(), Some("Magnitude 5"));
        assert_eq!(updated.region.as_deref(), Some("Delhi"));
        assert_eq!(updated.alert_level.as_deref(), Some("Red"));
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_title_and_link_get_defaults() {
        let store = MemoryStore::new();
        let (event, _) = store
            .upsert(EventUpsert {
                record: RawRecord::new("9"),
                region: None,
            })
            .await
            .unwrap();
        assert_eq!(event.title, UNTITLED);
        assert_eq!(event.link, "");
    }

    #[tokio::test]
    async fn test_reconcile_only_touches_scope() {
        let store = MemoryStore::new();
        for id in ["a", "b"] {
            store
                .upsert(EventUpsert {
                    record: record(id),
                    region: None,
                })
                .await
                .unwrap();
        }
        let mut nepal = record("n");
        nepal.country = Some("Nepal".into());
        store
            .upsert(EventUpsert {
                record: nepal,
                region: None,
            })
            .await
            .unwrap();

        let scope = CountryScope::default();
        let all: HashSet<String> = ["a", "b", "n"].iter().map(|s| s.to_string()).collect();
        let first = store.reconcile_current(&scope, &all).await.unwrap();
        assert_eq!(first, ReconcileSummary { demoted: 0, promoted: 2 });

        let only_a: HashSet<String> = ["a".to_string()].into_iter().collect();
        let second = store.reconcile_current(&scope, &only_a).await.unwrap();
        assert_eq!(second, ReconcileSummary { demoted: 1, promoted: 0 });

        let again = store.reconcile_current(&scope, &only_a).await.unwrap();
        assert_eq!(again, ReconcileSummary::default());

        assert!(store.find("a").await.unwrap().unwrap().is_current);
        assert!(!store.find("b").await.unwrap().unwrap().is_current);
        assert!(!store.find("n").await.unwrap().unwrap().is_current);
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first_with_undated_last() {
        let store = MemoryStore::new();
        let base = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();

        let mut old = record("old");
        old.published_at = Some(base);
        let mut new = record("new");
        new.from_date = Some(base + Duration::days(3));
        let undated = record("undated");

        for r in [undated, old, new] {
            store.upsert(EventUpsert { record: r, region: None }).await.unwrap();
        }

        let ids: Vec<_> = store
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
        assert_eq!(store.recent(1).await.unwrap().len(), 1);
    }
}
