//! SQLite backend.
//!
//! Stores slip rows and subscription rows in two tables, created on connect.
//! Timestamps are kept as epoch milliseconds; the pick blob as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{SlipRemote, TierSource};
use crate::types::{RemoteSlipRow, SubscriptionRow};

const BACKEND_NAME: &str = "sqlite";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS bet_slip (
        user_id TEXT NOT NULL,
        prediction_id TEXT NOT NULL,
        prediction_data TEXT NOT NULL,
        added_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bet_slip_user ON bet_slip (user_id, added_at)",
    "CREATE TABLE IF NOT EXISTS subscriptions (
        user_id TEXT NOT NULL,
        tier TEXT NOT NULL,
        status TEXT NOT NULL,
        current_period_end INTEGER,
        created_at INTEGER NOT NULL
    )",
];

/// SQLite-backed slip store and tier source.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect to `url` (e.g. `sqlite://pickslip.db` or `sqlite::memory:`)
    /// and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        // Every in-memory connection is its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {url}"))?;

        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&pool)
                .await
                .context("Failed to apply SQLite schema")?;
        }

        info!(url, "SQLite backend ready");
        Ok(Self { pool })
    }

    /// Insert a subscription row (used by seeding and tests; billing writes
    /// these in production).
    pub async fn insert_subscription(&self, user_id: &str, row: &SubscriptionRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, tier, status, current_period_end, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&row.tier)
        .bind(&row.status)
        .bind(row.current_period_end.map(|t| t.timestamp_millis()))
        .bind(row.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert subscription")?;
        Ok(())
    }

    fn decode_slip_row(row: &SqliteRow) -> Result<RemoteSlipRow> {
        let data: String = row.try_get("prediction_data")?;
        Ok(RemoteSlipRow {
            user_id: row.try_get("user_id")?,
            prediction_id: row.try_get("prediction_id")?,
            prediction_data: serde_json::from_str(&data).context("Corrupt prediction_data JSON")?,
            added_at: Self::ms_to_datetime(row.try_get("added_at")?),
        })
    }

    fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl SlipRemote for SqliteBackend {
    async fn load_slip(&self, user_id: &str) -> Result<Vec<RemoteSlipRow>> {
        let rows = sqlx::query(
            "SELECT user_id, prediction_id, prediction_data, added_at
             FROM bet_slip WHERE user_id = ? ORDER BY added_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load slip rows")?;

        // One undecodable row must not hide the rest of the slip
        let decoded: Vec<RemoteSlipRow> = rows
            .into_iter()
            .filter_map(|row| match Self::decode_slip_row(&row) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    let prediction_id: String = row.try_get("prediction_id").unwrap_or_default();
                    warn!(user_id, prediction_id = %prediction_id, error = %e, "Skipping undecodable slip row");
                    None
                }
            })
            .collect();
        Ok(decoded)
    }

    async fn replace_slip(&self, user_id: &str, rows: &[RemoteSlipRow]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM bet_slip WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete slip rows")?;

        for row in rows {
            sqlx::query(
                "INSERT INTO bet_slip (user_id, prediction_id, prediction_data, added_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(&row.prediction_id)
            .bind(row.prediction_data.to_string())
            .bind(row.added_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .context("Failed to insert slip row")?;
        }

        tx.commit().await.context("Failed to commit slip replace")?;
        debug!(user_id, rows = rows.len(), "Slip replaced in SQLite");
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[async_trait]
impl TierSource for SqliteBackend {
    async fn fetch_subscriptions(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        let rows = sqlx::query(
            "SELECT tier, status, current_period_end, created_at
             FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load subscriptions")?;

        rows.into_iter()
            .map(|row| -> Result<SubscriptionRow> {
                let period_end: Option<i64> = row.try_get("current_period_end")?;
                Ok(SubscriptionRow {
                    tier: row.try_get("tier")?,
                    status: row.try_get("status")?,
                    current_period_end: period_end.map(Self::ms_to_datetime),
                    created_at: Self::ms_to_datetime(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
