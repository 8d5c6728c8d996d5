use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::Result;

/// The fixed 18-type universe, in canonical order.
pub const MONSTER_TYPES: [&str; 18] = [
    "Normal", "Fire", "Water", "Electric", "Grass", "Ice", "Fighting", "Poison", "Ground",
    "Flying", "Psychic", "Bug", "Rock", "Ghost", "Dragon", "Dark", "Steel", "Fairy",
];

/// The five attributes every composite carries exactly one of.
pub const ATTRIBUTES: [&str; 5] = ["Vaccine", "Data", "Virus", "Variable", "Free"];

/// The source tables rollable species can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTable {
    Pokemon,
    Digimon,
    Yokai,
    Nexomon,
    Pals,
    Fakemon,
    FinalFantasy,
    MonsterHunter,
}

impl SourceTable {
    pub const ALL: [SourceTable; 8] = [
        SourceTable::Pokemon,
        SourceTable::Digimon,
        SourceTable::Yokai,
        SourceTable::Nexomon,
        SourceTable::Pals,
        SourceTable::Fakemon,
        SourceTable::FinalFantasy,
        SourceTable::MonsterHunter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTable::Pokemon => "pokemon",
            SourceTable::Digimon => "digimon",
            SourceTable::Yokai => "yokai",
            SourceTable::Nexomon => "nexomon",
            SourceTable::Pals => "pals",
            SourceTable::Fakemon => "fakemon",
            SourceTable::FinalFantasy => "finalfantasy",
            SourceTable::MonsterHunter => "monsterhunter",
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceTable {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SourceTable::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown source table: {s}"))
    }
}

/// Which metadata columns a source table actually carries. Filters on a
/// column a table does not have are skipped for that table rather than
/// emptying its candidate pool.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub has_stage: bool,
    pub has_rank: bool,
    pub has_attribute: bool,
    pub has_legendary: bool,
    pub has_mythical: bool,
}

pub fn table_schema(table: SourceTable) -> TableSchema {
    match table {
        SourceTable::Pokemon => TableSchema {
            has_stage: true,
            has_rank: false,
            has_attribute: false,
            has_legendary: true,
            has_mythical: true,
        },
        SourceTable::Digimon => TableSchema {
            has_stage: false,
            has_rank: true,
            has_attribute: true,
            has_legendary: false,
            has_mythical: false,
        },
        SourceTable::Yokai => TableSchema {
            has_stage: false,
            has_rank: true,
            has_attribute: false,
            has_legendary: false,
            has_mythical: false,
        },
        SourceTable::Nexomon => TableSchema {
            has_stage: true,
            has_rank: false,
            has_attribute: false,
            has_legendary: true,
            has_mythical: false,
        },
        SourceTable::Pals => TableSchema {
            has_stage: false,
            has_rank: false,
            has_attribute: false,
            has_legendary: false,
            has_mythical: false,
        },
        SourceTable::Fakemon => TableSchema {
            has_stage: true,
            has_rank: false,
            has_attribute: true,
            has_legendary: true,
            has_mythical: true,
        },
        SourceTable::FinalFantasy => TableSchema {
            has_stage: true,
            has_rank: false,
            has_attribute: false,
            has_legendary: false,
            has_mythical: false,
        },
        SourceTable::MonsterHunter => TableSchema {
            has_stage: false,
            has_rank: true,
            has_attribute: true,
            has_legendary: false,
            has_mythical: false,
        },
    }
}

/// Default restrictions applied to a table when the caller supplies no
/// explicit rank/stage/legendary/mythical filter of their own. Keeps the
/// everyday roll to early-stage, non-legendary species unless the caller
/// opts in.
#[derive(Debug, Clone, Copy)]
pub struct TablePolicy {
    pub stages: &'static [&'static str],
    pub ranks: &'static [&'static str],
    pub legendary: Option<bool>,
    pub mythical: Option<bool>,
}

const BASE_STAGES: &[&str] = &["Base Stage", "Doesn't Evolve"];

pub fn default_policy(table: SourceTable) -> TablePolicy {
    match table {
        SourceTable::Pokemon => TablePolicy {
            stages: BASE_STAGES,
            ranks: &[],
            legendary: Some(false),
            mythical: Some(false),
        },
        SourceTable::Digimon => TablePolicy {
            stages: &[],
            ranks: &["Baby I", "Baby II", "In-Training", "Rookie"],
            legendary: None,
            mythical: None,
        },
        SourceTable::Yokai => TablePolicy {
            stages: &[],
            ranks: &["E", "D", "C"],
            legendary: None,
            mythical: None,
        },
        SourceTable::Nexomon => TablePolicy {
            stages: BASE_STAGES,
            ranks: &[],
            legendary: Some(false),
            mythical: None,
        },
        SourceTable::Pals => TablePolicy {
            stages: &[],
            ranks: &[],
            legendary: None,
            mythical: None,
        },
        SourceTable::Fakemon => TablePolicy {
            stages: BASE_STAGES,
            ranks: &[],
            legendary: Some(false),
            mythical: Some(false),
        },
        SourceTable::FinalFantasy => TablePolicy {
            stages: BASE_STAGES,
            ranks: &[],
            legendary: None,
            mythical: None,
        },
        SourceTable::MonsterHunter => TablePolicy {
            stages: &[],
            ranks: &["1", "2", "3"],
            legendary: None,
            mythical: None,
        },
    }
}

/// One rollable species row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub name: String,
    pub table: SourceTable,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub legendary: bool,
    #[serde(default)]
    pub mythical: bool,
    #[serde(default)]
    pub families: Vec<String>,
    #[serde(default)]
    pub level_required: Option<u32>,
    #[serde(default)]
    pub ndex: Option<u32>,
    #[serde(default)]
    pub evolves_from: Option<String>,
    #[serde(default)]
    pub evolves_to: Option<String>,
    #[serde(default)]
    pub breeding_results: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// One rollable item row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntity {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    monsters: Vec<CatalogEntity>,
    #[serde(default)]
    items: Vec<ItemEntity>,
}

/// Immutable in-memory catalog. Built once at startup and passed by
/// reference into the resolver and builder; safe to share across threads
/// without locking.
#[derive(Debug, Default)]
pub struct Catalog {
    entities: Vec<CatalogEntity>,
    items: Vec<ItemEntity>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entities: Vec<CatalogEntity>, items: Vec<ItemEntity>) -> Self {
        let mut by_name = HashMap::with_capacity(entities.len());
        for (idx, entity) in entities.iter().enumerate() {
            // First occurrence wins on duplicate names across tables.
            by_name.entry(entity.name.to_lowercase()).or_insert(idx);
        }
        Self {
            entities,
            items,
            by_name,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&data)?;
        Ok(Self::new(file.monsters, file.items))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.items.is_empty()
    }

    /// Species names, optionally restricted to one source table. Unknown or
    /// empty tables yield an empty list, never an error.
    pub fn species(&self, table: Option<SourceTable>) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| table.map_or(true, |t| e.table == t))
            .map(|e| e.name.as_str())
            .collect()
    }

    pub fn entities(&self) -> &[CatalogEntity] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&CatalogEntity> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&idx| &self.entities[idx])
    }

    pub fn types(&self) -> &'static [&'static str; 18] {
        &MONSTER_TYPES
    }

    pub fn attributes(&self) -> &'static [&'static str; 5] {
        &ATTRIBUTES
    }

    pub fn ranks(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .entities
            .iter()
            .filter_map(|e| e.rank.as_deref())
            .collect();
        set.into_iter().collect()
    }

    pub fn stages(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .entities
            .iter()
            .filter_map(|e| e.stage.as_deref())
            .collect();
        set.into_iter().collect()
    }

    pub fn families(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .entities
            .iter()
            .flat_map(|e| e.families.iter().map(|f| f.as_str()))
            .filter(|f| !f.is_empty())
            .collect();
        set.into_iter().collect()
    }

    /// Items in the given categories (case-insensitive). An empty category
    /// list selects every item.
    pub fn items(&self, categories: &[String]) -> Vec<&ItemEntity> {
        self.items
            .iter()
            .filter(|item| {
                categories.is_empty()
                    || categories
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&item.category))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, table: SourceTable) -> CatalogEntity {
        CatalogEntity {
            name: name.to_string(),
            table,
            types: vec![],
            attribute: None,
            rank: None,
            stage: None,
            legendary: false,
            mythical: false,
            families: vec![],
            level_required: None,
            ndex: None,
            evolves_from: None,
            evolves_to: None,
            breeding_results: None,
            image: None,
        }
    }

    #[test]
    fn species_filters_by_table() {
        let catalog = Catalog::new(
            vec![
                entity("Bulbasaur", SourceTable::Pokemon),
                entity("Agumon", SourceTable::Digimon),
            ],
            vec![],
        );
        assert_eq!(catalog.species(None).len(), 2);
        assert_eq!(
            catalog.species(Some(SourceTable::Pokemon)),
            vec!["Bulbasaur"]
        );
        assert!(catalog.species(Some(SourceTable::Yokai)).is_empty());
    }

    #[test]
    fn entity_lookup_is_case_insensitive() {
        let catalog = Catalog::new(vec![entity("Bulbasaur", SourceTable::Pokemon)], vec![]);
        assert!(catalog.entity("bulbasaur").is_some());
        assert!(catalog.entity("BULBASAUR").is_some());
        assert!(catalog.entity("Missingno").is_none());
    }

    #[test]
    fn families_are_distinct_and_sorted() {
        let mut a = entity("Agumon", SourceTable::Digimon);
        a.families = vec!["Dragon's Roar".to_string(), "Metal Empire".to_string()];
        let mut b = entity("Gabumon", SourceTable::Digimon);
        b.families = vec!["Dragon's Roar".to_string()];
        let catalog = Catalog::new(vec![a, b], vec![]);
        assert_eq!(catalog.families(), vec!["Dragon's Roar", "Metal Empire"]);
    }

    #[test]
    fn items_by_category() {
        let catalog = Catalog::new(
            vec![],
            vec![
                ItemEntity {
                    name: "Oran Berry".to_string(),
                    category: "berries".to_string(),
                    rarity: None,
                    image: None,
                },
                ItemEntity {
                    name: "Poke Ball".to_string(),
                    category: "balls".to_string(),
                    rarity: None,
                    image: None,
                },
            ],
        );
        assert_eq!(catalog.items(&["Berries".to_string()]).len(), 1);
        assert_eq!(catalog.items(&[]).len(), 2);
        assert!(catalog.items(&["seals".to_string()]).is_empty());
    }

    #[test]
    fn source_table_serde_round_trip() {
        let json = serde_json::to_string(&SourceTable::FinalFantasy).unwrap();
        assert_eq!(json, "\"finalfantasy\"");
        let table: SourceTable = serde_json::from_str("\"monsterhunter\"").unwrap();
        assert_eq!(table, SourceTable::MonsterHunter);
    }
}
