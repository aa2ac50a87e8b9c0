#![deny(warnings)]

//! Yield models: daily crystal aggregation and upgrade ranking.
//!
//! This module provides:
//! - Maximum and expected daily yield over a player's selection set
//! - Upgrade suggestions ranked by expected yield after one more level
//! - Display rounding matching how yields are shown to players

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use treasure_core::{Catalog, Level, SelectionSet, Treasure};

/// Number of suggestions shown by default.
pub const DEFAULT_TOP_N: usize = 5;

/// Decimal places used when reporting expected yield.
pub const DISPLAY_DP: u32 = 2;

/// Errors produced by yield computations.
#[derive(Debug, Error, PartialEq)]
pub enum YieldError {
    /// A selected treasure is missing from the catalog.
    #[error("selection references unknown treasure {0:?}")]
    UnknownTreasure(String),
}

fn lookup<'c>(catalog: &'c Catalog, name: &str) -> Result<&'c Treasure, YieldError> {
    catalog
        .get(name)
        .ok_or_else(|| YieldError::UnknownTreasure(name.to_string()))
}

/// Total daily yield for a selection set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct YieldSummary {
    /// Crystals if every holding succeeded. Exact.
    pub max_yield: Decimal,
    /// Probability-weighted crystals, rounded to two places.
    pub expected_yield: Decimal,
}

/// One upgrade opportunity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeSuggestion {
    pub name: String,
    pub current_level: Level,
    /// Expected daily crystals at the current level.
    pub current_expected: Decimal,
    /// Expected daily crystals after upgrading one level.
    pub next_expected: Decimal,
}

impl UpgradeSuggestion {
    /// Level reached by the suggested upgrade.
    pub fn next_level(&self) -> Level {
        // Suggestions are never built for max-level holdings.
        self.current_level.next().unwrap_or(Level::MAX)
    }

    /// Marginal gain of the upgrade.
    pub fn gain(&self) -> Decimal {
        self.next_expected - self.current_expected
    }
}

/// Round a yield for display: two places, halves away from zero.
///
/// Example:
/// assert_eq!(round_display(Decimal::new(1235, 3)), Decimal::new(124, 2));
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Expected daily crystals of one treasure at `level`.
///
/// crystals * chance / 100.
pub fn expected_daily(treasure: &Treasure, level: Level) -> Decimal {
    treasure.crystals_per_success() * treasure.probability_at(level)
}

/// Aggregate max and expected daily yield.
///
/// Fails on the first holding whose name the catalog does not contain; no
/// partial result is returned.
///
/// Example:
/// let summary = aggregate(&catalog, &SelectionSet::new()).unwrap();
/// assert_eq!(summary, YieldSummary::default());
pub fn aggregate(catalog: &Catalog, selections: &SelectionSet) -> Result<YieldSummary, YieldError> {
    let mut max_yield = Decimal::ZERO;
    let mut expected = Decimal::ZERO;
    for holding in selections {
        let treasure = lookup(catalog, &holding.name)?;
        max_yield += treasure.crystals_per_success();
        expected += expected_daily(treasure, holding.level);
    }
    let summary = YieldSummary {
        max_yield,
        expected_yield: round_display(expected),
    };
    debug!(
        holdings = selections.len(),
        max = %summary.max_yield,
        expected = %summary.expected_yield,
        "aggregated yield"
    );
    Ok(summary)
}

/// Rank upgrade opportunities, best first.
///
/// Holdings at max level are skipped. Ranking is by expected yield *after*
/// the upgrade, descending; equal values keep selection order. Returns at
/// most `top_n` suggestions, or none when nothing can be upgraded.
pub fn recommend(
    catalog: &Catalog,
    selections: &SelectionSet,
    top_n: usize,
) -> Result<Vec<UpgradeSuggestion>, YieldError> {
    let mut candidates = Vec::with_capacity(selections.len());
    for holding in selections {
        let treasure = lookup(catalog, &holding.name)?;
        let Some(next) = holding.level.next() else {
            continue;
        };
        candidates.push(UpgradeSuggestion {
            name: holding.name.clone(),
            current_level: holding.level,
            current_expected: expected_daily(treasure, holding.level),
            next_expected: expected_daily(treasure, next),
        });
    }
    // sort_by is stable
    candidates.sort_by(|a, b| b.next_expected.cmp(&a.next_expected));
    candidates.truncate(top_n);
    debug!(suggestions = candidates.len(), "ranked upgrades");
    Ok(candidates)
}
