//! Odds engine.
//!
//! Classifies odds literals of unknown format, normalizes them to decimal
//! odds, and computes parlay (combined) odds, payouts and profit. All
//! arithmetic is `f64`; rounding only happens in [`format`].

pub mod confidence;
pub mod format;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal odds used when a literal cannot be classified ("average juice").
pub const DEFAULT_DECIMAL_ODDS: f64 = 1.85;

/// Smallest decimal odds a literal may carry.
pub const MIN_DECIMAL_ODDS: f64 = 1.01;

/// Largest decimal odds a literal may carry before it is read as American.
pub const MAX_DECIMAL_ODDS: f64 = 100.0;

/// Smallest magnitude for American odds.
pub const MIN_AMERICAN_MAGNITUDE: i32 = 100;

// ---------------------------------------------------------------------------
// Odds value
// ---------------------------------------------------------------------------

/// A classified odds value.
///
/// Serialized as its canonical literal and deserialized from either a string
/// or a JSON number, always through [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "OddsLiteral", into = "String")]
pub enum Odds {
    /// Signed American odds, magnitude ≥ 100.
    American(i32),
    /// Decimal odds in [1.01, 100].
    Decimal(f64),
    /// Anything else; priced at [`DEFAULT_DECIMAL_ODDS`].
    Unparsed,
}

impl Odds {
    pub fn is_parsed(&self) -> bool {
        !matches!(self, Odds::Unparsed)
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Odds::American(a) if *a > 0 => write!(f, "+{a}"),
            Odds::American(a) => write!(f, "{a}"),
            Odds::Decimal(d) => write!(f, "{d:?}"),
            Odds::Unparsed => Ok(()),
        }
    }
}

impl From<Odds> for String {
    fn from(odds: Odds) -> Self {
        odds.to_string()
    }
}

/// Wire shapes an odds literal may arrive in.
#[derive(Deserialize)]
#[serde(untagged)]
enum OddsLiteral {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<OddsLiteral> for Odds {
    fn from(literal: OddsLiteral) -> Self {
        match literal {
            OddsLiteral::Int(n) => classify(&n.to_string()),
            OddsLiteral::Float(x) => classify(&format!("{x:?}")),
            OddsLiteral::Text(s) => classify(&s),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification & conversion
// ---------------------------------------------------------------------------

/// Classify a raw odds literal.
///
/// A literal with a fractional separator (`.` or `,`) whose value lies in
/// [1.01, 100] is decimal. Anything else is read as a leading signed integer
/// and treated as American. Empty, non-numeric, or American literals with a
/// magnitude below 100 are `Unparsed`.
pub fn classify(raw: &str) -> Odds {
    let raw = raw.trim();
    if raw.is_empty() {
        return Odds::Unparsed;
    }

    if raw.contains(['.', ',']) {
        if let Ok(value) = raw.replace(',', ".").parse::<f64>() {
            if (MIN_DECIMAL_ODDS..=MAX_DECIMAL_ODDS).contains(&value) {
                return Odds::Decimal(value);
            }
        }
    }

    match leading_integer(raw) {
        Some(a) if a.checked_abs().is_some_and(|m| m >= MIN_AMERICAN_MAGNITUDE) => {
            Odds::American(a)
        }
        _ => Odds::Unparsed,
    }
}

/// Parse the leading `[+-]digits` prefix of a literal.
fn leading_integer(raw: &str) -> Option<i32> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let digits: &str = &rest[..rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len())];
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i32>().ok().map(|n| sign * n)
}

/// Decimal odds for a classified value.
pub fn to_decimal(odds: Odds) -> f64 {
    match odds {
        Odds::American(a) if a > 0 => 1.0 + f64::from(a) / 100.0,
        Odds::American(a) if a < 0 => 1.0 + 100.0 / f64::from(a).abs(),
        Odds::American(_) => DEFAULT_DECIMAL_ODDS,
        Odds::Decimal(d) => d,
        Odds::Unparsed => DEFAULT_DECIMAL_ODDS,
    }
}

/// Classify a literal and return its decimal odds in one step.
pub fn parse_decimal(raw: &str) -> f64 {
    to_decimal(classify(raw))
}

/// Convert decimal odds to American odds.
///
/// Returns `None` for odds ≤ 1.0 (no payout) or non-finite input.
pub fn to_american(decimal: f64) -> Option<i32> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return None;
    }
    let american = if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    };
    Some(american.round() as i32)
}

/// Implied win probability (no vig removal).
pub fn implied_probability(odds: Odds) -> f64 {
    1.0 / to_decimal(odds)
}

// ---------------------------------------------------------------------------
// Parlay math
// ---------------------------------------------------------------------------

/// Combined (parlay) decimal odds for a set of legs.
///
/// An empty set means nothing is selected and yields 0.0.
pub fn combined_odds<I>(legs: I) -> f64
where
    I: IntoIterator<Item = Odds>,
{
    let mut legs = legs.into_iter().peekable();
    if legs.peek().is_none() {
        return 0.0;
    }
    legs.fold(1.0, |acc, odds| acc * to_decimal(odds))
}

/// Total return for a stake at the given odds.
pub fn payout(odds: Odds, stake: f64) -> f64 {
    payout_at(to_decimal(odds), stake)
}

/// Net profit for a stake at the given odds.
pub fn profit(odds: Odds, stake: f64) -> f64 {
    profit_at(to_decimal(odds), stake)
}

/// Total return for a stake at already-normalized decimal odds.
pub fn payout_at(decimal: f64, stake: f64) -> f64 {
    sanitize_stake(stake) * decimal
}

/// Net profit for a stake at already-normalized decimal odds.
pub fn profit_at(decimal: f64, stake: f64) -> f64 {
    payout_at(decimal, stake) - sanitize_stake(stake)
}

fn sanitize_stake(stake: f64) -> f64 {
    if stake.is_nan() {
        0.0
    } else {
        stake.max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
