use crate::certificate;
use crate::{CatalogError, Treasure, TreasureGroup};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Raw treasure entry as supplied by the catalog source.
#[derive(Clone, Debug, Deserialize)]
pub struct TreasureData {
    /// Crystals awarded per successful trigger.
    pub crystals: Decimal,
    /// Chance in percent for levels 0..=9.
    pub chance: Vec<Decimal>,
}

/// Catalog source document, one map per treasure group. Each group keeps
/// the order its entries appear in the document.
///
/// `certificate_treasures` holds only the tiers the generator does not
/// derive (the 100M certificate).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSource {
    #[serde(default)]
    pub cookie_treasures: IndexMap<String, TreasureData>,
    #[serde(default)]
    pub pet_treasures: IndexMap<String, TreasureData>,
    #[serde(default)]
    pub level_treasures: IndexMap<String, TreasureData>,
    #[serde(default)]
    pub event_treasures: IndexMap<String, TreasureData>,
    #[serde(default)]
    pub certificate_treasures: IndexMap<String, TreasureData>,
    #[serde(default)]
    pub chest_treasures: IndexMap<String, TreasureData>,
}

impl CatalogSource {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

/// Read-only treasure reference data with O(1) lookup by name.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    treasures: HashMap<String, Treasure>,
    groups: BTreeMap<TreasureGroup, Vec<String>>,
}

impl Catalog {
    /// Build the full catalog from a source document.
    ///
    /// Merge order: cookie, pet, level and event groups verbatim, then the
    /// generated certificate tiers, then literal certificate entries, then
    /// the chest group.
    pub fn build(source: CatalogSource) -> Result<Self, CatalogError> {
        let mut catalog = Catalog::default();
        for (group, entries) in [
            (TreasureGroup::Cookie, source.cookie_treasures),
            (TreasureGroup::Pet, source.pet_treasures),
            (TreasureGroup::Level, source.level_treasures),
            (TreasureGroup::Event, source.event_treasures),
        ] {
            catalog.insert_group(group, entries)?;
        }

        let mut generated = certificate::generate();
        for name in certificate::generated_names() {
            if let Some(treasure) = generated.remove(&name) {
                catalog.insert(treasure)?;
            }
        }
        for tier in certificate::LITERAL_TIERS_MILLIONS {
            let name = certificate::certificate_name(tier);
            if !source.certificate_treasures.contains_key(&name) {
                return Err(CatalogError::MissingCertificateTier(name));
            }
        }
        catalog.insert_group(TreasureGroup::Certificate, source.certificate_treasures)?;
        catalog.insert_group(TreasureGroup::Chest, source.chest_treasures)?;

        debug!(
            treasures = catalog.len(),
            chests = catalog.names_in(TreasureGroup::Chest).len(),
            "catalog built"
        );
        Ok(catalog)
    }

    /// Parse a JSON catalog source and build the catalog.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Self::build(CatalogSource::from_json_str(json)?)
    }

    /// Build a catalog from already-validated treasures, without certificate
    /// generation.
    pub fn from_treasures<I>(treasures: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = Treasure>,
    {
        let mut catalog = Catalog::default();
        for t in treasures {
            catalog.insert(t)?;
        }
        Ok(catalog)
    }

    fn insert_group(
        &mut self,
        group: TreasureGroup,
        entries: IndexMap<String, TreasureData>,
    ) -> Result<(), CatalogError> {
        for (name, data) in entries {
            let treasure = Treasure::new(name, group, data.crystals, &data.chance)
                .map_err(|e| {
                    warn!(group = group.label(), error = %e, "catalog entry rejected");
                    e
                })?;
            self.insert(treasure)?;
        }
        Ok(())
    }

    fn insert(&mut self, treasure: Treasure) -> Result<(), CatalogError> {
        if self.treasures.contains_key(treasure.name()) {
            warn!(name = treasure.name(), "duplicate treasure name rejected");
            return Err(CatalogError::DuplicateName(treasure.name().to_string()));
        }
        self.groups
            .entry(treasure.group())
            .or_default()
            .push(treasure.name().to_string());
        self.treasures.insert(treasure.name().to_string(), treasure);
        Ok(())
    }

    /// Find a treasure by name. A miss is a data-consistency defect.
    pub fn lookup(&self, name: &str) -> Result<&Treasure, CatalogError> {
        self.treasures
            .get(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Treasure> {
        self.treasures.get(name)
    }

    /// Names in one group, in merge order.
    pub fn names_in(&self, group: TreasureGroup) -> &[String] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All treasures, grouped and in merge order.
    pub fn iter(&self) -> impl Iterator<Item = &Treasure> + '_ {
        TreasureGroup::ALL
            .into_iter()
            .flat_map(move |g| self.names_in(g).iter())
            .filter_map(move |name| self.treasures.get(name))
    }

    pub fn len(&self) -> usize {
        self.treasures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.treasures.is_empty()
    }
}
