#![deny(warnings)]

//! Persistence layer: saved player selections as JSON snapshots or SQLite
//! saves.
//!
//! A save stores unique treasures as a name → level map, at most one
//! certificate, and chest treasures as an ordered list. Restoring validates
//! every entry against the catalog; nothing is repaired or invented.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use treasure_core::{
    Catalog, CatalogError, Holding, Level, SelectionError, SelectionSet, TreasureGroup, NOT_OWNED,
};

mod store;

pub use store::{
    create_save, default_sqlite_url, ensure_db_dir, find_save, init_db, read_selections,
    write_selections,
};
pub use sqlx::SqlitePool;

/// Groups whose treasures are stored in [`SavedSelections::unique`].
const UNIQUE_GROUPS: [TreasureGroup; 4] = [
    TreasureGroup::Cookie,
    TreasureGroup::Pet,
    TreasureGroup::Level,
    TreasureGroup::Event,
];

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Entry stored under a section that does not match its catalog group.
    #[error("treasure {name:?} is a {found:?} treasure and cannot be stored here")]
    WrongGroup { name: String, found: TreasureGroup },
    /// Chest rows are added and removed, not set by name.
    #[error("treasure {0:?} is repeatable; add or remove chest rows instead")]
    RepeatableTreasure(String),
    #[error("no chest row at index {0}")]
    ChestIndex(usize),
    #[error("save {0} does not exist")]
    UnknownSave(i64),
    #[error("malformed stored row: {0}")]
    MalformedRow(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// A stored `(name, level)` pair. Level `-1` marks an unselected chest row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedHolding {
    pub name: String,
    pub level: i32,
}

impl SavedHolding {
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

impl From<&Holding> for SavedHolding {
    fn from(h: &Holding) -> Self {
        SavedHolding::new(h.name.clone(), i32::from(h.level.get()))
    }
}

/// Logical shape of a player's saved selections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSelections {
    /// Cookie, pet, level and event treasures by name.
    #[serde(default)]
    pub unique: BTreeMap<String, i32>,
    #[serde(default)]
    pub certificate: Option<SavedHolding>,
    /// Chest rows in display order; repeats allowed.
    #[serde(default)]
    pub chests: Vec<SavedHolding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SavedSelections {
    /// Split a selection set into its saved sections.
    pub fn capture(catalog: &Catalog, selections: &SelectionSet) -> Result<Self, PersistenceError> {
        selections.validate(catalog)?;
        let mut saved = SavedSelections {
            saved_at: Some(Utc::now()),
            ..Default::default()
        };
        for holding in selections {
            match catalog.lookup(&holding.name)?.group() {
                TreasureGroup::Certificate => saved.certificate = Some(holding.into()),
                TreasureGroup::Chest => saved.chests.push(holding.into()),
                _ => {
                    saved
                        .unique
                        .insert(holding.name.clone(), i32::from(holding.level.get()));
                }
            }
        }
        Ok(saved)
    }

    /// Rebuild a selection set in display order: unique treasures in catalog
    /// order, then the certificate, then chest rows as stored.
    pub fn restore(&self, catalog: &Catalog) -> Result<SelectionSet, PersistenceError> {
        for name in self.unique.keys() {
            expect_group(catalog, name, &UNIQUE_GROUPS)?;
        }
        let mut set = SelectionSet::new();
        for group in UNIQUE_GROUPS {
            for name in catalog.names_in(group) {
                if let Some(&raw) = self.unique.get(name) {
                    set.push_raw(name.clone(), raw)?;
                }
            }
        }
        if let Some(cert) = &self.certificate {
            expect_group(catalog, &cert.name, &[TreasureGroup::Certificate])?;
            set.push_raw(cert.name.clone(), cert.level)?;
        }
        for chest in &self.chests {
            expect_group(catalog, &chest.name, &[TreasureGroup::Chest])?;
            set.push_raw(chest.name.clone(), chest.level)?;
        }
        set.validate(catalog)?;
        debug!(holdings = set.len(), "restored selections");
        Ok(set)
    }

    /// Set the level of a unique or certificate treasure. `-1` removes it.
    ///
    /// Choosing a certificate replaces any other certificate.
    pub fn set_level(
        &mut self,
        catalog: &Catalog,
        name: &str,
        raw: i32,
    ) -> Result<(), PersistenceError> {
        let owned = Level::from_raw(raw)?.is_some();
        match catalog.lookup(name)?.group() {
            TreasureGroup::Chest => Err(PersistenceError::RepeatableTreasure(name.to_string())),
            TreasureGroup::Certificate => {
                if owned {
                    self.certificate = Some(SavedHolding::new(name, raw));
                } else if self.certificate.as_ref().is_some_and(|c| c.name == name) {
                    self.certificate = None;
                }
                Ok(())
            }
            _ => {
                if owned {
                    self.unique.insert(name.to_string(), raw);
                } else {
                    self.unique.remove(name);
                }
                Ok(())
            }
        }
    }

    /// Append a chest row.
    pub fn add_chest(
        &mut self,
        catalog: &Catalog,
        name: &str,
        raw: i32,
    ) -> Result<(), PersistenceError> {
        Level::from_raw(raw)?;
        expect_group(catalog, name, &[TreasureGroup::Chest])?;
        self.chests.push(SavedHolding::new(name, raw));
        Ok(())
    }

    /// Remove the chest row at `index`, shifting later rows up.
    pub fn remove_chest(&mut self, index: usize) -> Result<SavedHolding, PersistenceError> {
        if index >= self.chests.len() {
            return Err(PersistenceError::ChestIndex(index));
        }
        Ok(self.chests.remove(index))
    }

    /// Number of stored entries that count as owned.
    pub fn owned_count(&self) -> usize {
        let unique = self.unique.values().filter(|&&l| l != NOT_OWNED).count();
        let cert = usize::from(
            self.certificate
                .as_ref()
                .is_some_and(|c| c.level != NOT_OWNED),
        );
        let chests = self.chests.iter().filter(|c| c.level != NOT_OWNED).count();
        unique + cert + chests
    }

    /// Write a pretty-printed JSON snapshot, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!(path = %path.display(), entries = self.owned_count(), "selections saved");
        Ok(())
    }

    /// Read a JSON snapshot. A missing file is an empty save.
    pub fn load_json(path: &Path) -> Result<Self, PersistenceError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved selections, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn expect_group(
    catalog: &Catalog,
    name: &str,
    allowed: &[TreasureGroup],
) -> Result<(), PersistenceError> {
    let found = match catalog.lookup(name) {
        Ok(t) => t.group(),
        Err(e) => {
            warn!(name, "saved treasure is not in the catalog");
            return Err(e.into());
        }
    };
    if !allowed.contains(&found) {
        warn!(name, group = found.label(), "saved treasure stored in the wrong section");
        return Err(PersistenceError::WrongGroup {
            name: name.to_string(),
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use treasure_core::Treasure;

    fn t(name: &str, group: TreasureGroup) -> Treasure {
        let chances: Vec<Decimal> = (1..=10).map(|c| Decimal::from(c * 5)).collect();
        Treasure::new(name, group, Decimal::from(4), &chances).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::from_treasures([
            t("Goggles", TreasureGroup::Cookie),
            t("Collar", TreasureGroup::Pet),
            t("Medal", TreasureGroup::Level),
            t("Lantern", TreasureGroup::Event),
            t("Cert 1M", TreasureGroup::Certificate),
            t("Cert 2M", TreasureGroup::Certificate),
            t("Coin", TreasureGroup::Chest),
            t("Bell", TreasureGroup::Chest),
        ])
        .unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("crystal-calc-{name}-{stamp}.json"))
    }

    #[test]
    fn capture_splits_by_group() {
        let cat = catalog();
        let set = SelectionSet::from_raw([
            ("Lantern", 2),
            ("Goggles", 5),
            ("Cert 2M", 3),
            ("Coin", 1),
            ("Bell", 0),
            ("Coin", 9),
        ])
        .unwrap();
        let saved = SavedSelections::capture(&cat, &set).unwrap();
        assert_eq!(saved.unique.len(), 2);
        assert_eq!(saved.unique["Goggles"], 5);
        assert_eq!(saved.certificate, Some(SavedHolding::new("Cert 2M", 3)));
        assert_eq!(
            saved.chests,
            vec![
                SavedHolding::new("Coin", 1),
                SavedHolding::new("Bell", 0),
                SavedHolding::new("Coin", 9)
            ]
        );
        assert!(saved.saved_at.is_some());
    }

    #[test]
    fn restore_uses_display_order() {
        let cat = catalog();
        let set = SelectionSet::from_raw([
            ("Coin", 1),
            ("Lantern", 2),
            ("Cert 1M", 0),
            ("Goggles", 5),
            ("Coin", 3),
        ])
        .unwrap();
        let restored = SavedSelections::capture(&cat, &set)
            .unwrap()
            .restore(&cat)
            .unwrap();
        let names: Vec<&str> = restored.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Goggles", "Lantern", "Cert 1M", "Coin", "Coin"]);
        assert_eq!(restored.holdings()[4].level, Level::new(3).unwrap());
    }

    #[test]
    fn restore_rejects_unknown_names() {
        let cat = catalog();
        let mut saved = SavedSelections::default();
        saved.unique.insert("Ghost".into(), 2);
        assert!(matches!(
            saved.restore(&cat),
            Err(PersistenceError::Catalog(CatalogError::NotFound(_)))
        ));
    }

    #[test]
    fn restore_rejects_wrong_section() {
        let cat = catalog();
        let mut saved = SavedSelections::default();
        saved.unique.insert("Coin".into(), 2);
        assert!(matches!(
            saved.restore(&cat),
            Err(PersistenceError::WrongGroup { found: TreasureGroup::Chest, .. })
        ));

        let saved = SavedSelections {
            chests: vec![SavedHolding::new("Goggles", 1)],
            ..Default::default()
        };
        assert!(matches!(
            saved.restore(&cat),
            Err(PersistenceError::WrongGroup { .. })
        ));
    }

    #[test]
    fn restore_rejects_invalid_levels() {
        let cat = catalog();
        let mut saved = SavedSelections::default();
        saved.unique.insert("Goggles".into(), 12);
        assert!(matches!(
            saved.restore(&cat),
            Err(PersistenceError::Selection(SelectionError::InvalidLevel(12)))
        ));
    }

    #[test]
    fn unselected_chest_rows_survive_but_do_not_count() {
        let cat = catalog();
        let saved = SavedSelections {
            chests: vec![SavedHolding::new("Coin", -1), SavedHolding::new("Bell", 4)],
            ..Default::default()
        };
        let set = saved.restore(&cat).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(saved.owned_count(), 1);
    }

    #[test]
    fn unowned_certificate_does_not_count() {
        let cat = catalog();
        let saved = SavedSelections {
            certificate: Some(SavedHolding::new("Cert 1M", -1)),
            chests: vec![SavedHolding::new("Bell", 4)],
            ..Default::default()
        };
        assert_eq!(saved.restore(&cat).unwrap().len(), 1);
        assert_eq!(saved.owned_count(), 1);
    }

    #[test]
    fn set_level_edits_sections() {
        let cat = catalog();
        let mut saved = SavedSelections::default();
        saved.set_level(&cat, "Goggles", 4).unwrap();
        saved.set_level(&cat, "Cert 1M", 2).unwrap();
        saved.set_level(&cat, "Cert 2M", 6).unwrap();
        assert_eq!(saved.certificate, Some(SavedHolding::new("Cert 2M", 6)));

        // Clearing a certificate that is not selected leaves the current one.
        saved.set_level(&cat, "Cert 1M", -1).unwrap();
        assert!(saved.certificate.is_some());
        saved.set_level(&cat, "Cert 2M", -1).unwrap();
        assert!(saved.certificate.is_none());

        saved.set_level(&cat, "Goggles", -1).unwrap();
        assert!(saved.unique.is_empty());

        assert!(matches!(
            saved.set_level(&cat, "Coin", 1),
            Err(PersistenceError::RepeatableTreasure(_))
        ));
        assert!(matches!(
            saved.set_level(&cat, "Goggles", 10),
            Err(PersistenceError::Selection(SelectionError::InvalidLevel(10)))
        ));
    }

    #[test]
    fn chest_rows_add_and_remove_in_order() {
        let cat = catalog();
        let mut saved = SavedSelections::default();
        saved.add_chest(&cat, "Coin", 1).unwrap();
        saved.add_chest(&cat, "Bell", 2).unwrap();
        saved.add_chest(&cat, "Coin", 3).unwrap();
        assert_eq!(saved.remove_chest(1).unwrap(), SavedHolding::new("Bell", 2));
        assert_eq!(saved.chests[1], SavedHolding::new("Coin", 3));
        assert!(matches!(
            saved.remove_chest(5),
            Err(PersistenceError::ChestIndex(5))
        ));
        assert!(matches!(
            saved.add_chest(&cat, "Medal", 1),
            Err(PersistenceError::WrongGroup { .. })
        ));
    }

    #[test]
    fn json_snapshot_round_trip() {
        let cat = catalog();
        let set = SelectionSet::from_raw([("Medal", 7), ("Coin", 2), ("Coin", 2)]).unwrap();
        let saved = SavedSelections::capture(&cat, &set).unwrap();
        let path = temp_path("roundtrip");
        saved.save_json(&path).unwrap();
        let back = SavedSelections::load_json(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back, saved);
        assert_eq!(back.restore(&cat).unwrap(), set);
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let path = temp_path("missing");
        let saved = SavedSelections::load_json(&path).unwrap();
        assert_eq!(saved, SavedSelections::default());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let path = temp_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let res = SavedSelections::load_json(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(res, Err(PersistenceError::Json(_))));
    }

    proptest! {
        #[test]
        fn chest_order_survives_capture_restore(levels in prop::collection::vec(0i32..=9, 0..12)) {
            let cat = catalog();
            let entries: Vec<(&str, i32)> = levels
                .iter()
                .enumerate()
                .map(|(i, &l)| (if i % 2 == 0 { "Coin" } else { "Bell" }, l))
                .collect();
            let set = SelectionSet::from_raw(entries).unwrap();
            let restored = SavedSelections::capture(&cat, &set).unwrap().restore(&cat).unwrap();
            prop_assert_eq!(restored, set);
        }
    }
}
