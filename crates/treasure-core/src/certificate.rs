//! Certificate treasures: one tier per score threshold.
//!
//! Tiers run 0M..9M in steps of one million, then 10M..100M in steps of ten
//! million. All certificates award a single crystal. For tier index `t`
//! (position in [`TIERS_MILLIONS`]) the chance at level `L` in 0..=8 is
//! `40 + t + L` percent, and level 9 is `50 + t`, a two point jump over
//! level 8. The 100M tier breaks the pattern and is loaded from catalog data.

use crate::{Treasure, TreasureGroup, LEVEL_COUNT};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Every certificate tier, in ascending order.
pub const TIERS_MILLIONS: [u32; 20] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100,
];

/// Tiers supplied literally by the catalog source instead of derived.
pub const LITERAL_TIERS_MILLIONS: [u32; 1] = [100];

/// Base chance of the 0M tier at level 0.
const BASE_CHANCE: u32 = 40;
/// Chance of the 0M tier at level 9.
const MAX_LEVEL_BASE_CHANCE: u32 = 50;

/// Crystals awarded by every certificate.
pub fn crystals_per_success() -> Decimal {
    Decimal::ONE
}

/// Display name for the certificate of a tier.
pub fn certificate_name(millions: u32) -> String {
    format!("Cookie Run: {millions}M Points Certificate")
}

/// Position of a tier in [`TIERS_MILLIONS`].
pub fn tier_index(millions: u32) -> Option<usize> {
    TIERS_MILLIONS.iter().position(|&m| m == millions)
}

/// Chance curve for the tier at position `tier_index`.
pub fn chance_curve(tier_index: usize) -> [Decimal; LEVEL_COUNT] {
    let t = tier_index as u32;
    let mut curve = [Decimal::ZERO; LEVEL_COUNT];
    for (level, slot) in curve.iter_mut().enumerate().take(LEVEL_COUNT - 1) {
        *slot = Decimal::from(BASE_CHANCE + t + level as u32);
    }
    curve[LEVEL_COUNT - 1] = Decimal::from(MAX_LEVEL_BASE_CHANCE + t);
    curve
}

/// Names of the derived tiers, in tier order.
pub fn generated_names() -> impl Iterator<Item = String> {
    generated_tiers().map(|(_, millions)| certificate_name(millions))
}

fn generated_tiers() -> impl Iterator<Item = (usize, u32)> {
    TIERS_MILLIONS
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !LITERAL_TIERS_MILLIONS.contains(m))
}

/// Derive the certificate treasures for 0M..90M.
///
/// Never produces the literal tiers.
pub fn generate() -> BTreeMap<String, Treasure> {
    generated_tiers()
        .map(|(index, millions)| {
            let name = certificate_name(millions);
            let treasure = Treasure::from_parts(
                name.clone(),
                TreasureGroup::Certificate,
                crystals_per_success(),
                chance_curve(index),
            );
            (name, treasure)
        })
        .collect()
}
