//! Shared types for PICKSLIP.
//!
//! These types form the data model used across all modules. They are kept
//! free of I/O so that the odds engine, access policy, slip store and the
//! remote backends can all depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::odds::{self, Odds};

// ---------------------------------------------------------------------------
// Pick
// ---------------------------------------------------------------------------

/// Lifecycle result of a predicted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PickResult {
    #[default]
    Pending,
    Win,
    Loss,
    Push,
}

impl PickResult {
    /// Whether the pick has been graded.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PickResult::Pending)
    }
}

impl fmt::Display for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickResult::Pending => write!(f, "pending"),
            PickResult::Win => write!(f, "win"),
            PickResult::Loss => write!(f, "loss"),
            PickResult::Push => write!(f, "push"),
        }
    }
}

/// An AI-generated prediction for a single game.
///
/// Picks are immutable once published; the slip only ever references them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub scheduled_at: DateTime<Utc>,
    /// The side the model selected (team name, "over", "under", ...).
    pub selection: String,
    pub odds: Odds,
    /// Raw model confidence, scale unknown (0–1 or 0–100).
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub result: PickResult,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} | {} {} | conf={}% [{}]",
            self.away_team,
            self.home_team,
            self.selection,
            self.odds,
            self.confidence_score(),
            self.result,
        )
    }
}

impl Pick {
    /// Decimal odds for this pick (fallback applied for unparsed literals).
    pub fn decimal_odds(&self) -> f64 {
        odds::to_decimal(self.odds)
    }

    /// Confidence on the canonical 0–100 scale.
    pub fn confidence_score(&self) -> u8 {
        odds::confidence::normalize(self.confidence)
    }

    /// Helper to build a test/sample pick with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, odds: &str) -> Self {
        Pick {
            id: id.to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Celtics".to_string(),
            scheduled_at: Utc::now() + chrono::Duration::hours(6),
            selection: "Lakers".to_string(),
            odds: odds::classify(odds),
            confidence: Some(0.72),
            result: PickResult::Pending,
            league: Some("NBA".to_string()),
            analysis: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Slip items
// ---------------------------------------------------------------------------

/// A pick the user has put on their slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipItem {
    pub pick: Pick,
    pub added_at: DateTime<Utc>,
    /// Owning session key: the user id, or an anonymous session id.
    pub session: String,
}

impl SlipItem {
    pub fn new(pick: Pick, session: impl Into<String>) -> Self {
        Self {
            pick,
            added_at: Utc::now(),
            session: session.into(),
        }
    }
}

/// Local cache entry. Field names are part of the cache format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSlipEntry {
    pub prediction: Pick,
    #[serde(rename = "addedAt", with = "chrono::serde::ts_milliseconds")]
    pub added_at: DateTime<Utc>,
}

impl From<&SlipItem> for CachedSlipEntry {
    fn from(item: &SlipItem) -> Self {
        Self {
            prediction: item.pick.clone(),
            added_at: item.added_at,
        }
    }
}

impl CachedSlipEntry {
    pub fn into_item(self, session: &str) -> SlipItem {
        SlipItem {
            pick: self.prediction,
            added_at: self.added_at,
            session: session.to_string(),
        }
    }
}

/// Durable per-user slip row in the remote store.
///
/// `prediction_data` is kept as an opaque JSON blob so that one malformed row
/// does not poison the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSlipRow {
    pub user_id: String,
    pub prediction_id: String,
    pub prediction_data: serde_json::Value,
    pub added_at: DateTime<Utc>,
}

impl RemoteSlipRow {
    pub fn from_item(user_id: &str, item: &SlipItem) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id: user_id.to_string(),
            prediction_id: item.pick.id.clone(),
            prediction_data: serde_json::to_value(&item.pick)?,
            added_at: item.added_at,
        })
    }

    /// Decode the row back into a slip item owned by `session`.
    pub fn to_item(&self, session: &str) -> Result<SlipItem, serde_json::Error> {
        let pick: Pick = serde_json::from_value(self.prediction_data.clone())?;
        Ok(SlipItem {
            pick,
            added_at: self.added_at,
            session: session.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Identity & subscriptions
// ---------------------------------------------------------------------------

/// The signed-in identity as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.user_id, email),
            None => write!(f, "{}", self.user_id),
        }
    }
}

/// A subscription record from the billing backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRow {
    pub tier: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRow {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PICKSLIP.
#[derive(Debug, thiserror::Error)]
pub enum PickslipError {
    #[error("Remote store error ({backend}): {message}")]
    RemoteStore { backend: String, message: String },

    #[error("Local cache error: {0}")]
    Cache(String),

    #[error("Tier source error ({backend}): {message}")]
    TierSource { backend: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
