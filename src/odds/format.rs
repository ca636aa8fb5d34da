//! Display formatting for odds and currency.
//!
//! Odds math stays in `f64`; values are converted to `rust_decimal` only at
//! the display boundary so rounding is exact (midpoint away from zero).

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Odds;

/// Decimal places used for odds display.
pub const ODDS_DISPLAY_DP: u32 = 2;

/// Number formatting convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// `1,234.56`
    #[default]
    En,
    /// `1.234,56`
    Es,
}

impl Locale {
    pub fn decimal_separator(&self) -> char {
        match self {
            Locale::En => '.',
            Locale::Es => ',',
        }
    }

    pub fn thousands_separator(&self) -> char {
        match self {
            Locale::En => ',',
            Locale::Es => '.',
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::En => write!(f, "en"),
            Locale::Es => write!(f, "es"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "en-us" | "en_us" => Ok(Locale::En),
            "es" | "es-es" | "es_es" => Ok(Locale::Es),
            _ => Err(anyhow::anyhow!("Unknown locale: {s}")),
        }
    }
}

/// Round a float for display. Non-finite input rounds to zero.
pub fn display_decimal(value: f64, dp: u32) -> Decimal {
    let mut rounded = Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// Render decimal odds with two decimals and the locale's separator.
pub fn format_odds(decimal: f64, locale: Locale) -> String {
    render(display_decimal(decimal, ODDS_DISPLAY_DP), locale, false)
}

/// Render a currency amount with no decimals and thousands grouping.
pub fn format_currency(amount: f64, locale: Locale) -> String {
    render(display_decimal(amount, 0), locale, true)
}

/// Render odds in American style (`+150`, `-110`).
///
/// Decimal odds are converted; unparsed odds render as an empty string.
pub fn format_american(odds: Odds) -> String {
    let american = match odds {
        Odds::American(a) => Some(a),
        Odds::Decimal(d) => super::to_american(d),
        Odds::Unparsed => None,
    };
    match american {
        Some(a) if a > 0 => format!("+{a}"),
        Some(a) => a.to_string(),
        None => String::new(),
    }
}

fn render(value: Decimal, locale: Locale, group: bool) -> String {
    let text = value.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let int_part = if group {
        group_thousands(int_part, locale.thousands_separator())
    } else {
        int_part.to_string()
    };

    let mut out = String::new();
    if value.is_sign_negative() && !value.is_zero() {
        out.push('-');
    }
    out.push_str(&int_part);
    if let Some(frac) = frac_part {
        out.push(locale.decimal_separator());
        out.push_str(frac);
    }
    out
}

fn group_thousands(digits: &str, sep: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}
