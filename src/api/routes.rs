//! API route handlers.
//!
//! All endpoints return JSON. Slip math comes from the `SlipStore`; these
//! handlers only format it for display.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::access::{AccessControl, AccessDecision, AccessSnapshot, Capabilities, Tier, UnknownTier};
use crate::odds::confidence;
use crate::odds::format::{self, Locale};
use crate::slip::{SlipPhase, SlipStore};
use crate::types::Pick;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub slip: Arc<SlipStore>,
    pub access: Arc<AccessControl>,
    pub default_stake: f64,
    pub locale: Locale,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StakeQuery {
    pub stake: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlipLegView {
    pub id: String,
    pub matchup: String,
    pub selection: String,
    pub odds: String,
    pub american: String,
    pub confidence: u8,
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlipResponse {
    pub phase: SlipPhase,
    pub legs: Vec<SlipLegView>,
    pub stake: f64,
    pub combined_odds: f64,
    pub potential_payout: f64,
    pub potential_profit: f64,
    pub display: SlipDisplay,
}

/// Locale-formatted strings for the summary panel.
#[derive(Debug, Clone, Serialize)]
pub struct SlipDisplay {
    pub combined_odds: String,
    pub stake: String,
    pub potential_payout: String,
    pub potential_profit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationResponse {
    pub changed: bool,
    pub legs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessResponse {
    #[serde(flatten)]
    pub snapshot: AccessSnapshot,
    pub capabilities: Capabilities,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

fn slip_response(state: &ApiState, stake: f64) -> SlipResponse {
    let summary = state.slip.summary(stake);
    let legs = state
        .slip
        .items()
        .into_iter()
        .map(|item| SlipLegView {
            matchup: format!("{} @ {}", item.pick.away_team, item.pick.home_team),
            odds: format::format_odds(item.pick.decimal_odds(), state.locale),
            american: format::format_american(item.pick.odds),
            confidence: confidence::normalize(item.pick.confidence),
            added_at: item.added_at.to_rfc3339(),
            selection: item.pick.selection,
            id: item.pick.id,
        })
        .collect();

    SlipResponse {
        phase: state.slip.phase(),
        legs,
        stake: summary.stake,
        combined_odds: summary.combined_odds,
        potential_payout: summary.potential_payout,
        potential_profit: summary.potential_profit,
        display: SlipDisplay {
            combined_odds: format::format_odds(summary.combined_odds, state.locale),
            stake: format::format_currency(summary.stake, state.locale),
            potential_payout: format::format_currency(summary.potential_payout, state.locale),
            potential_profit: format::format_currency(summary.potential_profit, state.locale),
        },
    }
}

/// GET /api/slip?stake=
pub async fn get_slip(
    State(state): State<AppState>,
    Query(query): Query<StakeQuery>,
) -> Json<SlipResponse> {
    let stake = query.stake.unwrap_or(state.default_stake);
    Json(slip_response(&state, stake))
}

/// POST /api/slip
pub async fn add_pick(
    State(state): State<AppState>,
    Json(pick): Json<Pick>,
) -> (StatusCode, Json<MutationResponse>) {
    debug!(pick_id = %pick.id, "API add to slip");
    let changed = state.slip.add_to_slip(pick);
    let status = match (changed, state.slip.is_ready()) {
        (true, _) => StatusCode::CREATED,
        (false, true) => StatusCode::OK,
        (false, false) => StatusCode::CONFLICT,
    };
    (
        status,
        Json(MutationResponse {
            changed,
            legs: state.slip.len(),
        }),
    )
}

/// DELETE /api/slip/:id
pub async fn remove_pick(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<MutationResponse>) {
    let changed = state.slip.remove_from_slip(&id);
    let status = match (changed, state.slip.is_ready()) {
        (true, _) => StatusCode::OK,
        (false, true) => StatusCode::NOT_FOUND,
        (false, false) => StatusCode::CONFLICT,
    };
    (
        status,
        Json(MutationResponse {
            changed,
            legs: state.slip.len(),
        }),
    )
}

/// DELETE /api/slip
pub async fn clear_slip(State(state): State<AppState>) -> (StatusCode, Json<MutationResponse>) {
    let had_items = !state.slip.is_empty();
    let status = if state.slip.clear() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (
        status,
        Json(MutationResponse {
            changed: had_items && status == StatusCode::OK,
            legs: state.slip.len(),
        }),
    )
}

/// GET /api/access
pub async fn get_access(State(state): State<AppState>) -> Json<AccessResponse> {
    let snapshot = state.access.snapshot();
    Json(AccessResponse {
        snapshot,
        capabilities: snapshot.capabilities(),
    })
}

/// GET /api/access/:tier
///
/// An unknown tier is rejected: treating it as `none` would grant access.
pub async fn check_access(
    State(state): State<AppState>,
    Path(tier): Path<String>,
) -> Result<Json<AccessDecision>, (StatusCode, Json<ErrorResponse>)> {
    let required: Tier = tier.parse().map_err(|e: UnknownTier| {
        debug!(tier = %tier, "Access check for unknown tier");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: e.to_string() }),
        )
    })?;
    Ok(Json(state.access.decide(required)))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
