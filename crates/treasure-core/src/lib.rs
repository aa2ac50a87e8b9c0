#![deny(warnings)]

//! Core domain models and invariants for the crystal yield calculator.
//!
//! This crate defines the treasure catalog, the certificate tier family and
//! the player's selection set, with validation helpers that reject bad data
//! instead of repairing it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod catalog;
pub mod certificate;

pub use catalog::{Catalog, CatalogSource, TreasureData};

/// Number of upgrade levels a treasure has (0 through 9).
pub const LEVEL_COUNT: usize = 10;

/// Raw level value used by callers for "not owned".
pub const NOT_OWNED: i32 = -1;

/// Upgrade level of an owned treasure, always within 0..=9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub struct Level(u8);

impl Level {
    /// Base level of a freshly obtained treasure.
    pub const BASE: Level = Level(0);
    /// Highest level; treasures here cannot be upgraded.
    pub const MAX: Level = Level(9);

    /// Build a level, rejecting anything above [`Level::MAX`].
    pub fn new(value: u8) -> Result<Self, SelectionError> {
        if usize::from(value) >= LEVEL_COUNT {
            return Err(SelectionError::InvalidLevel(i32::from(value)));
        }
        Ok(Level(value))
    }

    /// Interpret a raw level as entered by a caller.
    ///
    /// `-1` means "not owned" and maps to `None`; `0..=9` map to a level;
    /// anything else is rejected rather than clamped.
    pub fn from_raw(raw: i32) -> Result<Option<Self>, SelectionError> {
        if raw == NOT_OWNED {
            return Ok(None);
        }
        let value = u8::try_from(raw).map_err(|_| SelectionError::InvalidLevel(raw))?;
        Level::new(value)
            .map(Some)
            .map_err(|_| SelectionError::InvalidLevel(raw))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Index into a chance curve.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn is_max(self) -> bool {
        self == Level::MAX
    }

    /// The level after one upgrade, or `None` at max level.
    pub fn next(self) -> Option<Level> {
        if self.is_max() {
            None
        } else {
            Some(Level(self.0 + 1))
        }
    }
}

impl TryFrom<i8> for Level {
    type Error = SelectionError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match Level::from_raw(i32::from(value))? {
            Some(level) => Ok(level),
            None => Err(SelectionError::InvalidLevel(i32::from(value))),
        }
    }
}

impl From<Level> for i8 {
    fn from(level: Level) -> Self {
        // Always <= 9.
        level.0 as i8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.0)
    }
}

/// Catalog organization of treasures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreasureGroup {
    /// Obtained by unlocking cookies.
    Cookie,
    /// Obtained by unlocking pets.
    Pet,
    /// Rewards for account level.
    Level,
    /// Limited-time event rewards.
    Event,
    /// Point certificates, one tier per score threshold.
    Certificate,
    /// Drawn from treasure chests; a player may hold several copies.
    Chest,
}

impl TreasureGroup {
    /// Every group in catalog merge order.
    pub const ALL: [TreasureGroup; 6] = [
        TreasureGroup::Cookie,
        TreasureGroup::Pet,
        TreasureGroup::Level,
        TreasureGroup::Event,
        TreasureGroup::Certificate,
        TreasureGroup::Chest,
    ];

    /// Whether a player may hold more than one copy of the same treasure.
    pub fn is_repeatable(self) -> bool {
        matches!(self, TreasureGroup::Chest)
    }

    pub fn label(self) -> &'static str {
        match self {
            TreasureGroup::Cookie => "Cookie treasures",
            TreasureGroup::Pet => "Pet treasures",
            TreasureGroup::Level => "Level treasures",
            TreasureGroup::Event => "Event treasures",
            TreasureGroup::Certificate => "Certificate treasures",
            TreasureGroup::Chest => "Chest treasures",
        }
    }
}

/// A named collectible with a crystal payout and a per-level chance curve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Treasure {
    name: String,
    group: TreasureGroup,
    crystals_per_success: Decimal,
    chance_by_level: [Decimal; LEVEL_COUNT],
}

impl Treasure {
    /// Build a treasure, validating its payout and chance curve.
    ///
    /// Crystals must be > 0; the curve must have exactly ten percentages, each
    /// within [0, 100], non-decreasing in level.
    pub fn new(
        name: impl Into<String>,
        group: TreasureGroup,
        crystals_per_success: Decimal,
        chances: &[Decimal],
    ) -> Result<Self, CatalogError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if crystals_per_success <= Decimal::ZERO {
            return Err(CatalogError::InvalidCrystals(name));
        }
        let chance_by_level: [Decimal; LEVEL_COUNT] =
            chances
                .try_into()
                .map_err(|_| CatalogError::ChanceCount {
                    name: name.clone(),
                    found: chances.len(),
                })?;
        let hundred = Decimal::ONE_HUNDRED;
        for (level, chance) in chance_by_level.iter().enumerate() {
            if *chance < Decimal::ZERO || *chance > hundred {
                return Err(CatalogError::ChanceOutOfRange { name, level });
            }
            if level > 0 && *chance < chance_by_level[level - 1] {
                return Err(CatalogError::ChanceDecreasing { name, level });
            }
        }
        Ok(Self::from_parts(
            name,
            group,
            crystals_per_success,
            chance_by_level,
        ))
    }

    /// Assemble a treasure whose invariants the caller already guarantees.
    pub(crate) fn from_parts(
        name: String,
        group: TreasureGroup,
        crystals_per_success: Decimal,
        chance_by_level: [Decimal; LEVEL_COUNT],
    ) -> Self {
        Self {
            name,
            group,
            crystals_per_success,
            chance_by_level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> TreasureGroup {
        self.group
    }

    /// Crystals awarded when the daily trigger succeeds.
    pub fn crystals_per_success(&self) -> Decimal {
        self.crystals_per_success
    }

    /// Full chance curve in percent, indexed by level.
    pub fn chance_by_level(&self) -> &[Decimal; LEVEL_COUNT] {
        &self.chance_by_level
    }

    /// Success chance in percent (0..=100) at `level`.
    pub fn chance_at(&self, level: Level) -> Decimal {
        self.chance_by_level[level.index()]
    }

    /// Success probability in [0, 1] at `level`.
    pub fn probability_at(&self, level: Level) -> Decimal {
        self.chance_at(level) / Decimal::ONE_HUNDRED
    }
}

/// Validation errors for catalog data.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    /// Treasure name is blank.
    #[error("treasure name must not be empty")]
    EmptyName,
    /// Crystals per success must be strictly positive.
    #[error("treasure {0:?} must award a positive number of crystals")]
    InvalidCrystals(String),
    /// Chance curve does not cover levels 0..=9.
    #[error("treasure {name:?} has {found} chance values, expected 10")]
    ChanceCount { name: String, found: usize },
    /// Chance outside [0, 100].
    #[error("treasure {name:?} has an out-of-range chance at level {level}")]
    ChanceOutOfRange { name: String, level: usize },
    /// Chance decreases from one level to the next.
    #[error("treasure {name:?} chance decreases at level {level}")]
    ChanceDecreasing { name: String, level: usize },
    /// The same name appears in more than one place.
    #[error("duplicate treasure name: {0}")]
    DuplicateName(String),
    /// A literal certificate tier the generator does not derive is absent.
    #[error("catalog source is missing certificate tier: {0}")]
    MissingCertificateTier(String),
    /// Lookup of a name the catalog does not contain.
    #[error("treasure not found in catalog: {0}")]
    NotFound(String),
    /// Catalog source document could not be parsed.
    #[error("catalog source is malformed: {0}")]
    Parse(String),
}

/// Validation errors for player selections.
#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    /// Level outside -1..=9.
    #[error("level {0} is out of range [-1, 9]")]
    InvalidLevel(i32),
    /// A non-chest treasure is held more than once.
    #[error("treasure {0:?} can only be held once")]
    DuplicateHolding(String),
    /// More than one certificate treasure is held.
    #[error("only one certificate can be held, found {first:?} and {second:?}")]
    MultipleCertificates { first: String, second: String },
    /// Holding references a treasure the catalog does not know.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One player-owned treasure instance at a specific level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub name: String,
    pub level: Level,
}

impl Holding {
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

/// The player's current holdings, in presentation order.
///
/// Only owned treasures are stored; "not owned" inputs are dropped when the
/// set is built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSet {
    holdings: Vec<Holding>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw `(name, level)` pairs, skipping `-1` entries.
    pub fn from_raw<I, S>(entries: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (name, raw) in entries {
            set.push_raw(name, raw)?;
        }
        Ok(set)
    }

    /// Append a holding given a raw level. Returns whether it was kept.
    pub fn push_raw(&mut self, name: impl Into<String>, raw: i32) -> Result<bool, SelectionError> {
        match Level::from_raw(raw)? {
            Some(level) => {
                self.push(Holding::new(name, level));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn push(&mut self, holding: Holding) {
        self.holdings.push(holding);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Holding> {
        self.holdings.iter()
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Check the set against a catalog.
    ///
    /// Every name must resolve; non-chest treasures may appear once; at most
    /// one certificate may be held.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), SelectionError> {
        let mut seen = std::collections::HashSet::new();
        let mut certificate: Option<&str> = None;
        for holding in &self.holdings {
            let treasure = catalog.lookup(&holding.name)?;
            let group = treasure.group();
            if !group.is_repeatable() && !seen.insert(holding.name.as_str()) {
                return Err(SelectionError::DuplicateHolding(holding.name.clone()));
            }
            if group == TreasureGroup::Certificate {
                if let Some(first) = certificate {
                    return Err(SelectionError::MultipleCertificates {
                        first: first.to_string(),
                        second: holding.name.clone(),
                    });
                }
                certificate = Some(holding.name.as_str());
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = &'a Holding;
    type IntoIter = std::slice::Iter<'a, Holding>;

    fn into_iter(self) -> Self::IntoIter {
        self.holdings.iter()
    }
}
