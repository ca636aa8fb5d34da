//! Bet slip store.
//!
//! Owns the user's selected picks for one session and keeps them in sync
//! across the local cache (written synchronously on every mutation) and the
//! remote store (written by a debounced, full-replace flush).
//!
//! Phases: `Uninitialized → Loading → Ready`, and `Ready ⇄ Syncing` while a
//! flush is in flight. Mutations never wait on I/O; derived values are
//! computed from the current items on every read.
//!
//! Two sessions of the same user overwrite each other's remote rows: the
//! most recent flush wins, with no merge or version check.

pub mod debounce;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::odds;
use crate::remote::SlipRemote;
use crate::storage::LocalCache;
use crate::types::{CachedSlipEntry, Identity, Pick, RemoteSlipRow, SlipItem};
use debounce::Debouncer;

/// Quiet period between the last mutation and the remote flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Phase & summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipPhase {
    Uninitialized,
    Loading,
    Ready,
    Syncing,
}

impl fmt::Display for SlipPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlipPhase::Uninitialized => write!(f, "uninitialized"),
            SlipPhase::Loading => write!(f, "loading"),
            SlipPhase::Ready => write!(f, "ready"),
            SlipPhase::Syncing => write!(f, "syncing"),
        }
    }
}

/// Derived totals for the slip at a given stake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlipSummary {
    pub legs: usize,
    pub stake: f64,
    /// 0.0 when the slip is empty.
    pub combined_odds: f64,
    pub potential_payout: f64,
    pub potential_profit: f64,
}

impl fmt::Display for SlipSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} legs @ {:.2} | stake={:.0} payout={:.2} profit={:.2}",
            self.legs, self.combined_odds, self.stake, self.potential_payout, self.potential_profit,
        )
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct SlipState {
    items: Vec<SlipItem>,
    phase: SlipPhase,
    identity: Option<Identity>,
    /// Session key stamped on new items.
    session: String,
    /// Bumped on every session start/end; async work from an older epoch
    /// must not touch current state.
    epoch: u64,
    in_flight: usize,
}

impl SlipState {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            phase: SlipPhase::Uninitialized,
            identity: None,
            session: String::new(),
            epoch: 0,
            in_flight: 0,
        }
    }
}

struct Shared {
    state: Mutex<SlipState>,
    remote: Arc<dyn SlipRemote>,
    cache: Arc<dyn LocalCache>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SlipState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// An empty slip removes the cache entry rather than storing `[]`.
    fn write_cache(&self, items: &[SlipItem]) {
        let result = if items.is_empty() {
            self.cache.clear()
        } else {
            let entries: Vec<CachedSlipEntry> = items.iter().map(CachedSlipEntry::from).collect();
            self.cache.write(&entries)
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to write slip to local cache");
        }
    }

    /// Write `items` to the remote store for `user_id`, tracking the
    /// in-flight count for `epoch`.
    async fn flush(&self, user_id: String, items: Vec<SlipItem>, epoch: u64) {
        let rows: Vec<RemoteSlipRow> = items
            .iter()
            .filter_map(|item| match RemoteSlipRow::from_item(&user_id, item) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(pick_id = %item.pick.id, error = %e, "Skipping unserialisable pick");
                    None
                }
            })
            .collect();

        match self.remote.replace_slip(&user_id, &rows).await {
            Ok(()) => debug!(user_id = %user_id, rows = rows.len(), "Slip flushed to remote"),
            Err(e) => warn!(
                user_id = %user_id,
                backend = self.remote.name(),
                error = %e,
                "Remote slip flush failed; next mutation will retry"
            ),
        }

        let mut state = self.lock();
        if state.epoch == epoch {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The single authority for slip contents and slip math.
pub struct SlipStore {
    shared: Arc<Shared>,
    debouncer: Debouncer,
}

impl SlipStore {
    pub fn new(remote: Arc<dyn SlipRemote>, cache: Arc<dyn LocalCache>) -> Self {
        Self::with_debounce(remote, cache, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        remote: Arc<dyn SlipRemote>,
        cache: Arc<dyn LocalCache>,
        debounce: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SlipState::new()),
                remote,
                cache,
            }),
            debouncer: Debouncer::new(debounce),
        }
    }

    // -- Session lifecycle -----------------------------------------------

    /// Start a session and load the slip.
    ///
    /// Signed in: a non-empty remote slip is authoritative and overwrites the
    /// local cache; an empty or failing remote falls back to the cache.
    /// Signed out: the cache only. Never fails; worst case the slip is empty.
    pub async fn start_session(&self, identity: Option<Identity>) {
        self.debouncer.cancel();

        let session = identity
            .as_ref()
            .map(|id| id.user_id.clone())
            .unwrap_or_else(|| format!("anon-{}", uuid::Uuid::new_v4()));

        let epoch = {
            let mut state = self.shared.lock();
            state.epoch += 1;
            state.items.clear();
            state.in_flight = 0;
            state.phase = SlipPhase::Loading;
            state.identity = identity.clone();
            state.session = session.clone();
            state.epoch
        };

        let remote_items = match &identity {
            Some(id) => self.load_remote(&id.user_id, &session).await,
            None => Vec::new(),
        };

        let (items, source) = if !remote_items.is_empty() {
            (remote_items, "remote")
        } else {
            match self.shared.cache.read() {
                Ok(Some(entries)) if !entries.is_empty() => (
                    entries.into_iter().map(|e| e.into_item(&session)).collect(),
                    "cache",
                ),
                Ok(_) => (Vec::new(), "empty"),
                Err(e) => {
                    warn!(error = %e, "Local slip cache unreadable, starting empty");
                    (Vec::new(), "empty")
                }
            }
        };

        // Cache write stays under the guard so a superseded load cannot
        // overwrite the cache of the session that replaced it
        let mut state = self.shared.lock();
        if state.epoch != epoch {
            debug!(session = %session, "Discarding slip load for superseded session");
            return;
        }
        state.items = dedupe(items);
        if source == "remote" {
            self.shared.write_cache(&state.items);
        }
        state.phase = SlipPhase::Ready;
        info!(session = %session, items = state.items.len(), source, "Slip session ready");
    }

    /// Remote rows come back newest first; the slip keeps oldest first.
    async fn load_remote(&self, user_id: &str, session: &str) -> Vec<SlipItem> {
        match self.shared.remote.load_slip(user_id).await {
            Ok(rows) => {
                let mut items: Vec<SlipItem> = rows
                    .iter()
                    .filter_map(|row| match row.to_item(session) {
                        Ok(item) => Some(item),
                        Err(e) => {
                            warn!(prediction_id = %row.prediction_id, error = %e, "Skipping undecodable slip row");
                            None
                        }
                    })
                    .collect();
                items.sort_by_key(|item| item.added_at);
                items
            }
            Err(e) => {
                warn!(
                    user_id,
                    backend = self.shared.remote.name(),
                    error = %e,
                    "Remote slip load failed, falling back to local cache"
                );
                Vec::new()
            }
        }
    }

    /// Tear the session down: cancel the pending flush and forget state.
    /// Writes already issued are left to complete.
    pub fn end_session(&self) {
        let cancelled = self.debouncer.cancel();
        let mut state = self.shared.lock();
        state.epoch += 1;
        state.items.clear();
        state.identity = None;
        state.session.clear();
        state.in_flight = 0;
        state.phase = SlipPhase::Uninitialized;
        debug!(cancelled_flush = cancelled, "Slip session ended");
    }

    // -- Mutations -------------------------------------------------------

    /// Add a pick. Returns `false` if it was already on the slip or the
    /// session is not `Ready`.
    pub fn add_to_slip(&self, pick: Pick) -> bool {
        {
            let mut state = self.shared.lock();
            if !accepts_mutations(&state, "add") {
                return false;
            }
            if state.items.iter().any(|item| item.pick.id == pick.id) {
                return false;
            }
            if !pick.odds.is_parsed() {
                debug!(pick_id = %pick.id, "Unparsed odds, pricing at the default");
            }
            let mut item = SlipItem::new(pick, state.session.clone());
            // Keep `added_at` strictly increasing so remote order round-trips
            if let Some(last) = state.items.last() {
                if item.added_at <= last.added_at {
                    item.added_at = last.added_at + chrono::Duration::milliseconds(1);
                }
            }
            debug!(pick_id = %item.pick.id, "Pick added to slip");
            state.items.push(item);
        }
        self.after_mutation();
        true
    }

    /// Remove a pick by id. Returns `false` if it was not on the slip or the
    /// session is not `Ready`.
    pub fn remove_from_slip(&self, pick_id: &str) -> bool {
        {
            let mut state = self.shared.lock();
            if !accepts_mutations(&state, "remove") {
                return false;
            }
            let before = state.items.len();
            state.items.retain(|item| item.pick.id != pick_id);
            if state.items.len() == before {
                return false;
            }
            debug!(pick_id, "Pick removed from slip");
        }
        self.after_mutation();
        true
    }

    /// Empty the slip. Returns `false` if the session is not `Ready`.
    pub fn clear(&self) -> bool {
        {
            let mut state = self.shared.lock();
            if !accepts_mutations(&state, "clear") {
                return false;
            }
            state.items.clear();
        }
        debug!("Slip cleared");
        self.after_mutation();
        true
    }

    fn after_mutation(&self) {
        let (items, user_id, epoch) = {
            let state = self.shared.lock();
            (
                state.items.clone(),
                state.identity.as_ref().map(|id| id.user_id.clone()),
                state.epoch,
            )
        };
        self.shared.write_cache(&items);

        if user_id.is_some() {
            self.schedule_flush(epoch);
        }
    }

    /// Arm the debounced flush. The snapshot is taken when the timer fires,
    /// so the write always carries the latest contents.
    fn schedule_flush(&self, epoch: u64) {
        let shared = Arc::clone(&self.shared);
        self.debouncer.schedule(async move {
            let snapshot = {
                let mut state = shared.lock();
                match state.identity.as_ref().map(|id| id.user_id.clone()) {
                    Some(user_id) if state.epoch == epoch => {
                        state.in_flight += 1;
                        Some((user_id, state.items.clone()))
                    }
                    _ => None,
                }
            };
            if let Some((user_id, items)) = snapshot {
                shared.flush(user_id, items, epoch).await;
            }
        });
    }

    /// Skip the debounce and write the current slip now (e.g. at shutdown).
    ///
    /// Does nothing until the session is `Ready`: an unloaded slip would
    /// wipe the remote rows.
    pub async fn flush_now(&self) {
        self.debouncer.cancel();
        let snapshot = {
            let mut state = self.shared.lock();
            let epoch = state.epoch;
            match state.identity.as_ref().map(|id| id.user_id.clone()) {
                Some(user_id) if state.phase == SlipPhase::Ready => {
                    state.in_flight += 1;
                    Some((user_id, state.items.clone(), epoch))
                }
                _ => None,
            }
        };
        if let Some((user_id, items, epoch)) = snapshot {
            self.shared.flush(user_id, items, epoch).await;
        }
    }

    // -- Reads -----------------------------------------------------------

    pub fn phase(&self) -> SlipPhase {
        let state = self.shared.lock();
        match state.phase {
            SlipPhase::Ready if state.in_flight > 0 => SlipPhase::Syncing,
            phase => phase,
        }
    }

    /// Whether mutations are currently accepted.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().phase == SlipPhase::Ready
    }

    /// Whether a debounced flush is armed but has not fired yet.
    pub fn has_pending_flush(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.shared.lock().identity.clone()
    }

    pub fn is_in_slip(&self, pick_id: &str) -> bool {
        self.shared.lock().items.iter().any(|item| item.pick.id == pick_id)
    }

    pub fn items(&self) -> Vec<SlipItem> {
        self.shared.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Product of every leg's decimal odds; 0.0 for an empty slip.
    pub fn combined_odds(&self) -> f64 {
        let state = self.shared.lock();
        odds::combined_odds(state.items.iter().map(|item| item.pick.odds))
    }

    pub fn potential_payout(&self, stake: f64) -> f64 {
        odds::payout_at(self.combined_odds(), stake)
    }

    pub fn potential_profit(&self, stake: f64) -> f64 {
        odds::profit_at(self.combined_odds(), stake)
    }

    pub fn summary(&self, stake: f64) -> SlipSummary {
        let (legs, combined) = {
            let state = self.shared.lock();
            (
                state.items.len(),
                odds::combined_odds(state.items.iter().map(|item| item.pick.odds)),
            )
        };
        SlipSummary {
            legs,
            stake,
            combined_odds: combined,
            potential_payout: odds::payout_at(combined, stake),
            potential_profit: odds::profit_at(combined, stake),
        }
    }
}

/// Mutations are only accepted once the session has loaded. Earlier ones
/// would be dropped by the load and would clobber the cache it falls back to.
fn accepts_mutations(state: &SlipState, op: &str) -> bool {
    if state.phase == SlipPhase::Ready {
        return true;
    }
    debug!(op, phase = %state.phase, "Slip mutation rejected before session is ready");
    false
}

/// Keep the first occurrence of each pick id.
fn dedupe(items: Vec<SlipItem>) -> Vec<SlipItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.pick.id.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
