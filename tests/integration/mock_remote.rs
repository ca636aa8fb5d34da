//! Mock remote backend for integration testing.
//!
//! Provides a deterministic `SlipRemote` + `TierSource` implementation that
//! stores rows per user and records every write, all in-memory with no
//! external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use pickslip::odds;
use pickslip::remote::{SlipRemote, TierSource};
use pickslip::types::*;

/// A write observed by the mock: the user and the pick ids it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub user_id: String,
    pub pick_ids: Vec<String>,
}

/// A mock remote store for deterministic testing.
///
/// Rows, subscriptions and failure mode are fully controllable from test
/// code. Clones share state.
#[derive(Clone, Default)]
pub struct MockRemote {
    slips: Arc<Mutex<HashMap<String, Vec<RemoteSlipRow>>>>,
    subscriptions: Arc<Mutex<HashMap<String, Vec<SubscriptionRow>>>>,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
    /// Per-user latency applied to reads, to hold a load or refresh open.
    delays: Arc<Mutex<HashMap<String, StdDuration>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Delay every read for `user_id` by `delay` (tokio time, so paused
    /// tests advance it deterministically).
    pub fn set_delay(&self, user_id: &str, delay: StdDuration) {
        self.delays.lock().unwrap().insert(user_id.to_string(), delay);
    }

    /// Seed the stored slip for a user, items given oldest first.
    pub fn seed_slip(&self, user_id: &str, picks: &[Pick]) {
        let start = Utc::now() - Duration::hours(1);
        let mut rows: Vec<RemoteSlipRow> = picks
            .iter()
            .enumerate()
            .map(|(i, pick)| {
                let mut item = SlipItem::new(pick.clone(), user_id);
                item.added_at = start + Duration::seconds(i as i64);
                RemoteSlipRow::from_item(user_id, &item).unwrap()
            })
            .collect();
        rows.reverse();
        self.slips.lock().unwrap().insert(user_id.to_string(), rows);
    }

    pub fn seed_subscription(&self, user_id: &str, tier: &str, status: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(SubscriptionRow {
                tier: tier.to_string(),
                status: status.to_string(),
                current_period_end: Some(Utc::now() + Duration::days(30)),
                created_at: Utc::now(),
            });
    }

    /// Pick ids currently stored for a user, oldest first.
    pub fn stored_ids(&self, user_id: &str) -> Vec<String> {
        let slips = self.slips.lock().unwrap();
        let mut rows = slips.get(user_id).cloned().unwrap_or_default();
        rows.sort_by_key(|row| row.added_at);
        rows.into_iter().map(|row| row.prediction_id).collect()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    async fn wait_for(&self, user_id: &str) {
        let delay = self.delays.lock().unwrap().get(user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SlipRemote for MockRemote {
    async fn load_slip(&self, user_id: &str) -> Result<Vec<RemoteSlipRow>> {
        self.wait_for(user_id).await;
        self.check_error()?;
        let mut rows = self
            .slips
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(rows)
    }

    async fn replace_slip(&self, user_id: &str, rows: &[RemoteSlipRow]) -> Result<()> {
        self.check_error()?;
        self.writes.lock().unwrap().push(WriteRecord {
            user_id: user_id.to_string(),
            pick_ids: rows.iter().map(|row| row.prediction_id.clone()).collect(),
        });
        self.slips
            .lock()
            .unwrap()
            .insert(user_id.to_string(), rows.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl TierSource for MockRemote {
    async fn fetch_subscriptions(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.wait_for(user_id).await;
        self.check_error()?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Build a pick with the given id and odds literal.
pub fn pick(id: &str, odds_literal: &str) -> Pick {
    Pick {
        id: id.to_string(),
        home_team: "Chiefs".to_string(),
        away_team: "Bills".to_string(),
        scheduled_at: Utc::now() + Duration::hours(24),
        selection: "Chiefs".to_string(),
        odds: odds::classify(odds_literal),
        confidence: Some(68.0),
        result: PickResult::Pending,
        league: Some("NFL".to_string()),
        analysis: Some("Home field and rest advantage.".to_string()),
    }
}

pub fn identity(user_id: &str) -> Identity {
    Identity::new(user_id, Some(format!("{user_id}@example.com")))
}
