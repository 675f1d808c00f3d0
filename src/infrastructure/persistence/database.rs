use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::fs;
use tracing::info;

/// Owns the scanner's one SQLite pool. `alerts`/`alert_archive` are the only
/// tables this system needs; the schema is intentionally much narrower than
/// a full trading bot's persistence layer.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent).await.context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(%db_url, "connected to database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                direction TEXT NOT NULL,
                pattern_group TEXT NOT NULL,
                price TEXT NOT NULL,
                signal_timestamp INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                chart_link TEXT NOT NULL,
                is_futures BOOLEAN NOT NULL DEFAULT 1,
                region TEXT,
                confidence REAL,
                notes TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create alerts table")?;

        // Migration: older schemas created before `confidence`/`notes` existed.
        let _ = sqlx::query("ALTER TABLE alerts ADD COLUMN confidence REAL").execute(&mut *conn).await;
        let _ = sqlx::query("ALTER TABLE alerts ADD COLUMN notes TEXT").execute(&mut *conn).await;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_symbol_timeframe
            ON alerts (symbol, timeframe, signal_timestamp DESC);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create alerts index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                alert_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                direction TEXT NOT NULL,
                pattern_group TEXT NOT NULL,
                price TEXT NOT NULL,
                signal_timestamp INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                chart_link TEXT NOT NULL,
                is_futures BOOLEAN NOT NULL,
                region TEXT,
                confidence REAL,
                notes TEXT,
                archived_at INTEGER NOT NULL,
                archive_reason TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create alert_archive table")?;

        info!("database schema initialized");
        Ok(())
    }
}
