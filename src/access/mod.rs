//! Subscription-tier access control.
//!
//! Answers "can this user see X" for UI gating. Decisions here are never a
//! security boundary: the remote store enforces authorization on its own.
//!
//! The tier is only ever set from a fetch. While a refresh is in flight the
//! user is treated as `None`, and any fetch failure resolves to `None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::remote::TierSource;
use crate::types::{Identity, Pick, SubscriptionRow};

/// Daily pick allowance for the starter tier.
pub const STARTER_DAILY_PICKS: u32 = 10;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Subscription tier, totally ordered `None < Starter < Pro < Elite`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    None,
    Starter,
    Pro,
    Elite,
}

impl Tier {
    pub const ALL: &'static [Tier] = &[Tier::None, Tier::Starter, Tier::Pro, Tier::Elite];

    /// Parse a tier string from billing, case-insensitively.
    ///
    /// Legacy aliases map explicitly (`basic` → starter, `free` → none);
    /// anything unrecognised is `None`. Use `str::parse` where an unknown
    /// tier must be rejected instead.
    pub fn parse(raw: &str) -> Tier {
        raw.parse().unwrap_or_else(|e: UnknownTier| {
            warn!(tier = %e.0, "Unknown subscription tier, treating as none");
            Tier::None
        })
    }
}

/// A tier string that names no known tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl std::str::FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "starter" | "basic" => Ok(Tier::Starter),
            "pro" => Ok(Tier::Pro),
            "elite" => Ok(Tier::Elite),
            "none" | "free" | "" => Ok(Tier::None),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::None => write!(f, "none"),
            Tier::Starter => write!(f, "starter"),
            Tier::Pro => write!(f, "pro"),
            Tier::Elite => write!(f, "elite"),
        }
    }
}

/// Pick the effective tier from a user's subscription rows: only active rows
/// count, and the most recently created one wins.
pub fn resolve_tier(rows: &[SubscriptionRow]) -> Tier {
    rows.iter()
        .filter(|row| row.is_active())
        .max_by_key(|row| row.created_at)
        .map(|row| Tier::parse(&row.tier))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Policy & decisions
// ---------------------------------------------------------------------------

/// Injected access configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// The one privileged account, matched case-insensitively on email.
    /// Display-only shortcut.
    pub admin_email: Option<String>,
}

impl AccessPolicy {
    pub fn is_admin(&self, identity: &Identity) -> bool {
        match (&self.admin_email, &identity.email) {
            (Some(admin), Some(email)) => {
                let admin = admin.trim();
                !admin.is_empty() && admin.eq_ignore_ascii_case(email.trim())
            }
            _ => false,
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub required: Tier,
}

/// Capabilities derived from tier and admin flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `None` means unlimited.
    pub max_daily_picks: Option<u32>,
    pub can_export_data: bool,
    pub can_view_detailed_analysis: bool,
    pub can_view_privileged_content: bool,
}

impl Capabilities {
    pub fn for_tier(tier: Tier, is_admin: bool) -> Self {
        if is_admin {
            return Self {
                max_daily_picks: None,
                can_export_data: true,
                can_view_detailed_analysis: true,
                can_view_privileged_content: true,
            };
        }
        Self {
            max_daily_picks: (tier == Tier::Starter).then_some(STARTER_DAILY_PICKS),
            can_export_data: tier >= Tier::Pro,
            can_view_detailed_analysis: tier != Tier::None,
            can_view_privileged_content: tier == Tier::Elite,
        }
    }
}

/// Snapshot of the current access state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccessSnapshot {
    pub tier: Tier,
    pub is_admin: bool,
    pub loading: bool,
}

impl AccessSnapshot {
    pub fn can_view(&self, required: Tier) -> bool {
        self.is_admin || self.tier >= required
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_tier(self.tier, self.is_admin)
    }
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AccessState {
    snapshot: AccessSnapshot,
    /// Bumped on every refresh / sign-out; stale fetches compare against it.
    generation: u64,
}

/// Tier-gated access policy for the current session.
pub struct AccessControl {
    source: Arc<dyn TierSource>,
    policy: AccessPolicy,
    state: Mutex<AccessState>,
}

impl AccessControl {
    pub fn new(source: Arc<dyn TierSource>, policy: AccessPolicy) -> Self {
        Self {
            source,
            policy,
            state: Mutex::new(AccessState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AccessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current tier, admin flag and loading state.
    pub fn snapshot(&self) -> AccessSnapshot {
        self.lock().snapshot
    }

    pub fn tier(&self) -> Tier {
        self.snapshot().tier
    }

    pub fn is_admin(&self) -> bool {
        self.snapshot().is_admin
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot().loading
    }

    /// Whether the current user may see content requiring `required`.
    pub fn can_view(&self, required: Tier) -> bool {
        self.snapshot().can_view(required)
    }

    pub fn decide(&self, required: Tier) -> AccessDecision {
        AccessDecision {
            allowed: self.can_view(required),
            required,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.snapshot().capabilities()
    }

    /// Trim a pick list to the daily allowance.
    pub fn visible_picks<'a>(&self, picks: &'a [Pick]) -> &'a [Pick] {
        match self.capabilities().max_daily_picks {
            Some(limit) => &picks[..picks.len().min(limit as usize)],
            None => picks,
        }
    }

    /// Re-fetch the tier for `identity` (or clear it when signed out).
    ///
    /// Access drops to `None` for the duration of the fetch. A fetch that is
    /// superseded by a newer refresh or sign-out is discarded.
    pub async fn refresh(&self, identity: Option<&Identity>) -> AccessSnapshot {
        let Some(identity) = identity else {
            self.sign_out();
            return self.snapshot();
        };

        let is_admin = self.policy.is_admin(identity);
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.snapshot = AccessSnapshot {
                tier: Tier::None,
                is_admin,
                loading: true,
            };
            state.generation
        };

        let tier = match self.source.fetch_subscriptions(&identity.user_id).await {
            Ok(rows) => resolve_tier(&rows),
            Err(e) => {
                warn!(
                    user_id = %identity.user_id,
                    source = self.source.name(),
                    error = %e,
                    "Tier fetch failed, failing closed"
                );
                Tier::None
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!(user_id = %identity.user_id, "Discarding superseded tier fetch");
            return state.snapshot;
        }
        state.snapshot = AccessSnapshot {
            tier,
            is_admin,
            loading: false,
        };
        info!(user_id = %identity.user_id, %tier, is_admin, "Access refreshed");
        state.snapshot
    }

    /// Drop all access (identity signed out).
    pub fn sign_out(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.snapshot = AccessSnapshot::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
