use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::info;

use crate::application::ports::AlertStorePort;
use crate::domain::market::Timeframe;
use crate::domain::pattern::PatternGroup;
use crate::domain::signal::{Alert, SignalDirection};

/// [`AlertStorePort`] backed by the `alerts` table, plus an `archive`
/// helper that moves stale rows into `alert_archive` rather than deleting
/// them, mirroring the original bot's `cleanup_old_alerts`.
pub struct SqliteAlertStore {
    pool: SqlitePool,
}

impl SqliteAlertStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Moves every alert older than `older_than` into `alert_archive` and
    /// removes it from the live table. Returns the number of rows archived.
    pub async fn archive_older_than(&self, older_than: DateTime<Utc>, reason: &str) -> Result<u64> {
        let cutoff = older_than.timestamp_millis();
        let now = Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO alert_archive
                (alert_id, symbol, timeframe, signal_type, direction, pattern_group, price,
                 signal_timestamp, created_at, chart_link, is_futures, region, confidence, notes,
                 archived_at, archive_reason)
            SELECT id, symbol, timeframe, signal_type, direction, pattern_group, price,
                   signal_timestamp, created_at, chart_link, is_futures, region, confidence, notes,
                   ?, ?
            FROM alerts WHERE signal_timestamp < ?
            "#,
        )
        .bind(now)
        .bind(reason)
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .context("failed to copy stale alerts into archive")?;

        let result = sqlx::query("DELETE FROM alerts WHERE signal_timestamp < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .context("failed to delete archived alerts")?;

        tx.commit().await?;
        info!(rows = result.rows_affected(), %reason, "archived stale alerts");
        Ok(result.rows_affected())
    }

    fn row_to_alert(row: SqliteRow) -> Result<Alert> {
        let timeframe_label: String = row.try_get("timeframe")?;
        let direction_str: String = row.try_get("direction")?;
        let pattern_group_str: String = row.try_get("pattern_group")?;
        let price_str: String = row.try_get("price")?;

        Ok(Alert {
            id: Some(row.try_get("id")?),
            symbol: row.try_get("symbol")?,
            timeframe: Timeframe::parse(&timeframe_label).context("stored timeframe label no longer valid")?,
            signal_type: row.try_get("signal_type")?,
            direction: parse_direction(&direction_str)?,
            pattern_group: parse_pattern_group(&pattern_group_str)?,
            price: Decimal::from_str(&price_str).context("stored price is not a valid decimal")?,
            signal_timestamp: millis_to_utc(row.try_get("signal_timestamp")?),
            created_at: millis_to_utc(row.try_get("created_at")?),
            chart_link: row.try_get("chart_link")?,
            is_futures: row.try_get("is_futures")?,
            region: row.try_get("region")?,
            confidence: row.try_get("confidence")?,
            notes: row.try_get("notes")?,
        })
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

fn parse_direction(s: &str) -> Result<SignalDirection> {
    match s {
        "Long" => Ok(SignalDirection::Long),
        "Short" => Ok(SignalDirection::Short),
        other => anyhow::bail!("unknown stored signal direction '{other}'"),
    }
}

fn parse_pattern_group(s: &str) -> Result<PatternGroup> {
    match s {
        "G1" => Ok(PatternGroup::G1),
        "G2" => Ok(PatternGroup::G2),
        "G3" => Ok(PatternGroup::G3),
        other => anyhow::bail!("unknown stored pattern group '{other}'"),
    }
}

#[async_trait]
impl AlertStorePort for SqliteAlertStore {
    async fn insert(&self, mut alert: Alert) -> Result<Alert> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts
                (symbol, timeframe, signal_type, direction, pattern_group, price,
                 signal_timestamp, created_at, chart_link, is_futures, region, confidence, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.symbol)
        .bind(alert.timeframe.label())
        .bind(&alert.signal_type)
        .bind(alert.direction.to_string())
        .bind(format!("{:?}", alert.pattern_group))
        .bind(alert.price.to_string())
        .bind(alert.signal_timestamp.timestamp_millis())
        .bind(alert.created_at.timestamp_millis())
        .bind(&alert.chart_link)
        .bind(alert.is_futures)
        .bind(&alert.region)
        .bind(alert.confidence)
        .bind(&alert.notes)
        .execute(&self.pool)
        .await
        .context("failed to persist alert")?;

        alert.id = Some(result.last_insert_rowid());
        Ok(alert)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        let rows = sqlx::query("SELECT * FROM alerts ORDER BY signal_timestamp DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to load recent alerts")?;
        rows.into_iter().map(Self::row_to_alert).collect()
    }

    async fn filter(
        &self,
        symbol: Option<&str>,
        timeframe: Option<Timeframe>,
        direction: Option<SignalDirection>,
        signal_type: Option<&str>,
    ) -> Result<Vec<Alert>> {
        let mut sql = String::from("SELECT * FROM alerts WHERE 1 = 1");
        if symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if timeframe.is_some() {
            sql.push_str(" AND timeframe = ?");
        }
        if direction.is_some() {
            sql.push_str(" AND direction = ?");
        }
        if signal_type.is_some() {
            sql.push_str(" AND signal_type = ?");
        }
        sql.push_str(" ORDER BY signal_timestamp DESC");

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = symbol {
            query = query.bind(symbol);
        }
        if let Some(timeframe) = timeframe {
            query = query.bind(timeframe.label());
        }
        if let Some(direction) = direction {
            query = query.bind(direction.to_string());
        }
        if let Some(signal_type) = signal_type {
            query = query.bind(signal_type);
        }

        let rows = query.fetch_all(&self.pool).await.context("failed to filter alerts")?;
        rows.into_iter().map(Self::row_to_alert).collect()
    }
}
