//! PostgreSQL event store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_common::DisasterEvent;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, info};

use super::{EventStore, EventUpsert, ReconcileSummary};
use crate::error::StoreError;
use crate::filter::CountryScope;
use crate::models::UNTITLED;

const EVENT_COLUMNS: &str = "event_id, title, description, link, published_at, from_date, \
     to_date, latitude, longitude, region, event_type, alert_level, severity, \
     population_estimate, country, country_code, is_current, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: String,
    title: String,
    description: Option<String>,
    link: String,
    published_at: Option<DateTime<Utc>>,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    region: Option<String>,
    event_type: Option<String>,
    alert_level: Option<String>,
    severity: Option<String>,
    population_estimate: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    is_current: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    event: EventRow,
    inserted: bool,
}

impl From<EventRow> for DisasterEvent {
    fn from(row: EventRow) -> Self {
        DisasterEvent {
            event_id: row.event_id,
            title: row.title,
            description: row.description,
            link: row.link,
            published_at: row.published_at,
            from_date: row.from_date,
            to_date: row.to_date,
            latitude: row.latitude,
            longitude: row.longitude,
            region: row.region,
            event_type: row.event_type,
            alert_level: row.alert_level,
            severity: row.severity,
            population_estimate: row.population_estimate,
            country: row.country,
            country_code: row.country_code,
            is_current: row.is_current,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `disaster_events` table access
#[derive(Debug, Clone)]
pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Connect a pool of at most `max_connections`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(db))
    }

    /// Apply pending migrations from `migrations/`
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.db).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find(&self, event_id: &str) -> Result<Option<DisasterEvent>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM disaster_events WHERE event_id = $1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(DisasterEvent::from))
    }

    async fn upsert(&self, upsert: EventUpsert) -> Result<(DisasterEvent, bool), StoreError> {
        let EventUpsert { record, region } = upsert;

        // xmax is zero only for a row this statement inserted
        let sql = format!(
            r#"
            INSERT INTO disaster_events (
                event_id, title, description, link, published_at, from_date, to_date,
                latitude, longitude, region, event_type, alert_level, severity,
                population_estimate, country, country_code, is_current, created_at, updated_at
            )
            VALUES (
                $1, COALESCE($2, $17), $3, COALESCE($4, ''), $5, $6, $7,
                $8, $9, $10, $11, $12, $13, $14, $15, $16, FALSE, NOW(), NOW()
            )
            ON CONFLICT (event_id) DO UPDATE SET
                title = COALESCE($2, disaster_events.title),
                description = COALESCE($3, disaster_events.description),
                link = COALESCE($4, disaster_events.link),
                published_at = COALESCE($5, disaster_events.published_at),
                from_date = COALESCE($6, disaster_events.from_date),
                to_date = COALESCE($7, disaster_events.to_date),
                latitude = COALESCE($8, disaster_events.latitude),
                longitude = COALESCE($9, disaster_events.longitude),
                region = COALESCE($10, disaster_events.region),
                event_type = COALESCE($11, disaster_events.event_type),
                alert_level = COALESCE($12, disaster_events.alert_level),
                severity = COALESCE($13, disaster_events.severity),
                population_estimate = COALESCE($14, disaster_events.population_estimate),
                country = COALESCE($15, disaster_events.country),
                country_code = COALESCE($16, disaster_events.country_code),
                updated_at = NOW()
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            EVENT_COLUMNS
        );

        let row = sqlx::query_as::<_, UpsertRow>(&sql)
            .bind(&record.event_id)
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.link)
            .bind(record.published_at)
            .bind(record.from_date)
            .bind(record.to_date)
            .bind(record.latitude)
            .bind(record.longitude)
            .bind(&region)
            .bind(&record.event_type)
            .bind(&record.alert_level)
            .bind(&record.severity)
            .bind(&record.population_estimate)
            .bind(&record.country)
            .bind(&record.country_code)
            .bind(UNTITLED)
            .fetch_one(&self.db)
            .await?;

        debug!(event_id = %record.event_id, inserted = row.inserted, "Upserted event");
        Ok((row.event.into(), row.inserted))
    }

    async fn reconcile_current(
        &self,
        scope: &CountryScope,
        seen: &HashSet<String>,
    ) -> Result<ReconcileSummary, StoreError> {
        let seen: Vec<&str> = seen.iter().map(String::as_str).collect();
        let mut tx = self.db.begin().await?;

        let promoted = sqlx::query(
            r#"
            UPDATE disaster_events
            SET is_current = TRUE, updated_at = NOW()
            WHERE is_current = FALSE
              AND event_id = ANY($1)
              AND (
                  ($2 <> '' AND STRPOS(LOWER(country), $2) > 0)
                  OR ($3 <> '' AND UPPER(TRIM(country_code)) = $3)
              )
            "#,
        )
        .bind(&seen)
        .bind(scope.name())
        .bind(scope.code())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let demoted = sqlx::query(
            r#"
            UPDATE disaster_events
            SET is_current = FALSE, updated_at = NOW()
            WHERE is_current = TRUE
              AND NOT (event_id = ANY($1))
              AND (
                  ($2 <> '' AND STRPOS(LOWER(country), $2) > 0)
                  OR ($3 <> '' AND UPPER(TRIM(country_code)) = $3)
              )
            "#,
        )
        .bind(&seen)
        .bind(scope.name())
        .bind(scope.code())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(ReconcileSummary { demoted, promoted })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<DisasterEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM disaster_events \
             ORDER BY COALESCE(published_at, from_date) DESC NULLS LAST, event_id \
             LIMIT $1",
            EVENT_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(DisasterEvent::from).collect())
    }
}
