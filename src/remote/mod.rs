//! Remote backends.
//!
//! Defines the `SlipRemote` and `TierSource` traits consumed by the slip
//! store and the access policy, and provides implementations for:
//! - SQLite (sqlx): self-hosted durable store
//! - REST: hosted data backend with PostgREST-style query syntax

pub mod rest;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{RemoteSlipRow, SubscriptionRow};

/// Durable per-user slip storage.
///
/// Rows for a user are owned by whichever session flushed last; there is no
/// version check.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SlipRemote: Send + Sync {
    /// All slip rows for a user, newest `added_at` first.
    async fn load_slip(&self, user_id: &str) -> Result<Vec<RemoteSlipRow>>;

    /// Replace every row owned by `user_id` with `rows` (delete, then insert).
    async fn replace_slip(&self, user_id: &str, rows: &[RemoteSlipRow]) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Subscription lookup for the access policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TierSource: Send + Sync {
    /// Subscription rows for a user, in any order and any status.
    async fn fetch_subscriptions(&self, user_id: &str) -> Result<Vec<SubscriptionRow>>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
