use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::catalog::{
    default_policy, table_schema, Catalog, CatalogEntity, SourceTable, ATTRIBUTES, MONSTER_TYPES,
};
use crate::{Result, RollError};

pub const SPECIES_SLOTS: usize = 3;
pub const TYPE_SLOTS: usize = 5;

const DEFAULT_SPECIES_MIN: usize = 1;
const DEFAULT_SPECIES_MAX: usize = 2;
const DEFAULT_TYPES_MIN: usize = 1;
const DEFAULT_TYPES_MAX: usize = 3;

/// Per-slot constraint: an explicit pin wins outright; otherwise a
/// non-empty include list acts as an allow-list and excludes are
/// subtracted last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConstraint {
    pub pin: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Per-table filter overrides. A field set here replaces the request-level
/// equivalent for that table only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFilter {
    pub legendary: Option<bool>,
    pub mythical: Option<bool>,
    pub include_ranks: Vec<String>,
    pub exclude_ranks: Vec<String>,
    pub include_stages: Vec<String>,
    pub exclude_stages: Vec<String>,
}

/// A monster roll request. Everything defaults to "unconstrained"; the
/// resolver layers per-table default policy on top of whatever the caller
/// leaves unspecified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RollRequest {
    /// Source tables to draw from; empty means all of them.
    pub tables: Vec<SourceTable>,
    pub species_slots: [SlotConstraint; SPECIES_SLOTS],
    pub type_slots: [SlotConstraint; TYPE_SLOTS],
    pub attribute: Option<String>,
    pub include_attributes: Vec<String>,
    pub exclude_attributes: Vec<String>,
    pub include_ranks: Vec<String>,
    pub exclude_ranks: Vec<String>,
    pub include_stages: Vec<String>,
    pub exclude_stages: Vec<String>,
    pub legendary: Option<bool>,
    pub mythical: Option<bool>,
    pub only_legendary: bool,
    pub only_mythical: bool,
    pub family: Option<String>,
    pub level_required: Option<u32>,
    pub ndex: Option<u32>,
    pub evolves_from: Option<String>,
    pub evolves_to: Option<String>,
    pub breeding_results: Option<String>,
    pub species_min: Option<usize>,
    pub species_max: Option<usize>,
    pub types_min: Option<usize>,
    pub types_max: Option<usize>,
    pub table_filters: HashMap<SourceTable, TableFilter>,
    pub seed: Option<String>,
    pub count: Option<usize>,
}

/// The resolved form of a request: one candidate set per slot/dimension,
/// plus validated cardinality ranges. Everything the composite builder
/// needs, with no further catalog access required for species names.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub species_slots: Vec<Vec<String>>,
    pub type_slots: Vec<Vec<String>>,
    pub attributes: Vec<String>,
    pub species_min: usize,
    pub species_max: usize,
    pub types_min: usize,
    pub types_max: usize,
    pub count: usize,
}

pub fn resolve(catalog: &Catalog, request: &RollRequest) -> Result<ResolvedRequest> {
    let (species_min, species_max) = validated_range(
        "species",
        request.species_min.unwrap_or(DEFAULT_SPECIES_MIN),
        request.species_max.unwrap_or(DEFAULT_SPECIES_MAX),
        SPECIES_SLOTS,
    )?;
    let (types_min, types_max) = validated_range(
        "types",
        request.types_min.unwrap_or(DEFAULT_TYPES_MIN),
        request.types_max.unwrap_or(DEFAULT_TYPES_MAX),
        TYPE_SLOTS,
    )?;
    let count = request.count.unwrap_or(1);
    if count < 1 {
        return Err(RollError::InvalidRollParams("count must be at least 1".into()));
    }

    let (tables, overrides) = effective_tables(request);

    // Species universe shared by all three slots: every entity that passes
    // the scalar filters plus per-table policy.
    let universe: Vec<String> = catalog
        .entities()
        .iter()
        .filter(|e| tables.contains(&e.table))
        .filter(|e| entity_matches(e, request, overrides.get(&e.table)))
        .map(|e| e.name.clone())
        .collect();

    // The raw (unfiltered) name list backs include allow-lists, so a caller
    // can explicitly allow a species the default policy would hide.
    let raw_names: Vec<String> = catalog
        .entities()
        .iter()
        .filter(|e| tables.contains(&e.table))
        .map(|e| e.name.clone())
        .collect();

    debug!(
        tables = tables.len(),
        candidates = universe.len(),
        "resolved species universe"
    );

    let mut species_slots = Vec::with_capacity(SPECIES_SLOTS);
    for slot in &request.species_slots {
        species_slots.push(slot_candidates(slot, &universe, &raw_names));
    }

    let type_universe: Vec<String> = MONSTER_TYPES.iter().map(|t| t.to_string()).collect();
    let mut type_slots = Vec::with_capacity(TYPE_SLOTS);
    for slot in &request.type_slots {
        type_slots.push(slot_candidates(slot, &type_universe, &type_universe));
    }

    let attributes = attribute_candidates(request);

    // Required slots must have at least one candidate.
    if species_slots[0].is_empty() {
        return Err(RollError::InsufficientCandidates {
            dimension: "species1".into(),
        });
    }
    if type_slots[0].is_empty() {
        return Err(RollError::InsufficientCandidates {
            dimension: "type1".into(),
        });
    }
    if attributes.is_empty() {
        return Err(RollError::InsufficientCandidates {
            dimension: "attribute".into(),
        });
    }

    // A minimum above what the optional slots can supply is an error, not
    // something to relax silently.
    let species_available = 1 + species_slots[1..].iter().filter(|s| !s.is_empty()).count();
    if species_min > species_available {
        return Err(RollError::ConstraintUnsatisfiable {
            dimension: "species".into(),
            needed: species_min,
            available: species_available,
        });
    }
    let types_available = 1 + type_slots[1..].iter().filter(|s| !s.is_empty()).count();
    if types_min > types_available {
        return Err(RollError::ConstraintUnsatisfiable {
            dimension: "types".into(),
            needed: types_min,
            available: types_available,
        });
    }

    Ok(ResolvedRequest {
        species_slots,
        type_slots,
        attributes,
        species_min,
        species_max,
        types_min,
        types_max,
        count,
    })
}

fn validated_range(
    dimension: &str,
    min: usize,
    max: usize,
    domain_max: usize,
) -> Result<(usize, usize)> {
    if min < 1 || max > domain_max || min > max {
        return Err(RollError::InvalidRollParams(format!(
            "{dimension} range {min}..={max} is outside 1..={domain_max}"
        )));
    }
    Ok((min, max))
}

/// Apply the only-legendary / only-mythical modes: narrow the table set to
/// the tables that can satisfy them and force the matching rarity filter.
/// When none of the requested tables qualify, the mode is ignored and the
/// request falls back to a default roll.
fn effective_tables(request: &RollRequest) -> (Vec<SourceTable>, HashMap<SourceTable, TableFilter>) {
    let mut tables: Vec<SourceTable> = if request.tables.is_empty() {
        SourceTable::ALL.to_vec()
    } else {
        request.tables.clone()
    };
    let mut overrides: HashMap<SourceTable, TableFilter> = request.table_filters.clone();

    if request.only_legendary {
        let capable: Vec<SourceTable> = tables
            .iter()
            .copied()
            .filter(|t| matches!(t, SourceTable::Pokemon | SourceTable::Nexomon))
            .collect();
        if !capable.is_empty() {
            for table in &capable {
                overrides.entry(*table).or_default().legendary = Some(true);
            }
            tables = capable;
        } else {
            debug!("only_legendary requested but no capable table selected");
        }
    }

    if request.only_mythical {
        let capable: Vec<SourceTable> = tables
            .iter()
            .copied()
            .filter(|t| {
                matches!(
                    t,
                    SourceTable::Pokemon | SourceTable::Nexomon | SourceTable::Yokai
                )
            })
            .collect();
        if !capable.is_empty() {
            for table in &capable {
                let entry = overrides.entry(*table).or_default();
                match table {
                    // Yokai has no mythical flag; S rank is its equivalent.
                    SourceTable::Yokai => entry.include_ranks = vec!["S".to_string()],
                    _ => entry.mythical = Some(true),
                }
            }
            tables = capable;
        } else {
            debug!("only_mythical requested but no capable table selected");
        }
    }

    (tables, overrides)
}

fn entity_matches(
    entity: &CatalogEntity,
    request: &RollRequest,
    table_filter: Option<&TableFilter>,
) -> bool {
    let schema = table_schema(entity.table);

    // Table filter fields override the request-level equivalents.
    let legendary = table_filter
        .and_then(|t| t.legendary)
        .or(request.legendary);
    let mythical = table_filter.and_then(|t| t.mythical).or(request.mythical);
    let include_ranks = pick_list(table_filter.map(|t| &t.include_ranks), &request.include_ranks);
    let exclude_ranks = pick_list(table_filter.map(|t| &t.exclude_ranks), &request.exclude_ranks);
    let include_stages = pick_list(
        table_filter.map(|t| &t.include_stages),
        &request.include_stages,
    );
    let exclude_stages = pick_list(
        table_filter.map(|t| &t.exclude_stages),
        &request.exclude_stages,
    );

    let explicit = legendary.is_some()
        || mythical.is_some()
        || !include_ranks.is_empty()
        || !exclude_ranks.is_empty()
        || !include_stages.is_empty()
        || !exclude_stages.is_empty();

    if explicit {
        if schema.has_legendary {
            if let Some(flag) = legendary {
                if entity.legendary != flag {
                    return false;
                }
            }
        }
        if schema.has_mythical {
            if let Some(flag) = mythical {
                if entity.mythical != flag {
                    return false;
                }
            }
        }
        if schema.has_rank {
            if !include_ranks.is_empty()
                && !entity
                    .rank
                    .as_deref()
                    .map_or(false, |r| include_ranks.iter().any(|i| i == r))
            {
                return false;
            }
            if let Some(rank) = entity.rank.as_deref() {
                if exclude_ranks.iter().any(|x| x == rank) {
                    return false;
                }
            }
        }
        if schema.has_stage {
            if !include_stages.is_empty()
                && !entity
                    .stage
                    .as_deref()
                    .map_or(false, |s| include_stages.iter().any(|i| i == s))
            {
                return false;
            }
            if let Some(stage) = entity.stage.as_deref() {
                if exclude_stages.iter().any(|x| x == stage) {
                    return false;
                }
            }
        }
    } else {
        // No explicit rank/stage/rarity filter from the caller: fall back
        // to the per-table default policy.
        let policy = default_policy(entity.table);
        if schema.has_legendary {
            if let Some(flag) = policy.legendary {
                if entity.legendary != flag {
                    return false;
                }
            }
        }
        if schema.has_mythical {
            if let Some(flag) = policy.mythical {
                if entity.mythical != flag {
                    return false;
                }
            }
        }
        if schema.has_rank && !policy.ranks.is_empty() {
            if !entity
                .rank
                .as_deref()
                .map_or(false, |r| policy.ranks.iter().any(|p| *p == r))
            {
                return false;
            }
        }
        if schema.has_stage && !policy.stages.is_empty() {
            if !entity
                .stage
                .as_deref()
                .map_or(false, |s| policy.stages.iter().any(|p| *p == s))
            {
                return false;
            }
        }
    }

    // Scalar filters, species dimensions only.
    if let Some(family) = request.family.as_deref() {
        if !entity
            .families
            .iter()
            .any(|f| contains_ci(f, family))
        {
            return false;
        }
    }
    if let Some(level) = request.level_required {
        if entity.level_required != Some(level) {
            return false;
        }
    }
    if let Some(ndex) = request.ndex {
        if entity.ndex != Some(ndex) {
            return false;
        }
    }
    if let Some(from) = request.evolves_from.as_deref() {
        if !entity
            .evolves_from
            .as_deref()
            .map_or(false, |v| contains_ci(v, from))
        {
            return false;
        }
    }
    if let Some(to) = request.evolves_to.as_deref() {
        if !entity
            .evolves_to
            .as_deref()
            .map_or(false, |v| contains_ci(v, to))
        {
            return false;
        }
    }
    if let Some(breeding) = request.breeding_results.as_deref() {
        if !entity
            .breeding_results
            .as_deref()
            .map_or(false, |v| contains_ci(v, breeding))
        {
            return false;
        }
    }

    true
}

fn pick_list<'a>(table: Option<&'a Vec<String>>, global: &'a [String]) -> &'a [String] {
    match table {
        Some(list) if !list.is_empty() => list,
        _ => global,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Candidate set for one slot. A pin is an explicit admin choice and is
/// taken as-is; an include list is intersected with the raw catalog names
/// (so an allow-listed legendary works, but a name the catalog has never
/// heard of yields an empty set); excludes are subtracted last.
fn slot_candidates(slot: &SlotConstraint, filtered: &[String], raw: &[String]) -> Vec<String> {
    if let Some(pin) = slot.pin.as_ref() {
        return vec![pin.clone()];
    }
    let mut candidates: Vec<String> = if slot.include.is_empty() {
        filtered.to_vec()
    } else {
        raw.iter()
            .filter(|name| slot.include.iter().any(|i| i.eq_ignore_ascii_case(name)))
            .cloned()
            .collect()
    };
    if !slot.exclude.is_empty() {
        candidates.retain(|name| !slot.exclude.iter().any(|x| x.eq_ignore_ascii_case(name)));
    }
    candidates
}

fn attribute_candidates(request: &RollRequest) -> Vec<String> {
    if let Some(pin) = request.attribute.as_ref() {
        return vec![pin.clone()];
    }
    let mut candidates: Vec<String> = if request.include_attributes.is_empty() {
        ATTRIBUTES.iter().map(|a| a.to_string()).collect()
    } else {
        ATTRIBUTES
            .iter()
            .filter(|a| {
                request
                    .include_attributes
                    .iter()
                    .any(|i| i.eq_ignore_ascii_case(a))
            })
            .map(|a| a.to_string())
            .collect()
    };
    if !request.exclude_attributes.is_empty() {
        candidates.retain(|a| {
            !request
                .exclude_attributes
                .iter()
                .any(|x| x.eq_ignore_ascii_case(a))
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogEntity};

    fn pokemon(name: &str, stage: &str, legendary: bool) -> CatalogEntity {
        CatalogEntity {
            name: name.to_string(),
            table: SourceTable::Pokemon,
            types: vec![],
            attribute: None,
            rank: None,
            stage: Some(stage.to_string()),
            legendary,
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

    fn digimon(name: &str, rank: &str) -> CatalogEntity {
        CatalogEntity {
            name: name.to_string(),
            table: SourceTable::Digimon,
            types: vec![],
            attribute: Some("Vaccine".to_string()),
            rank: Some(rank.to_string()),
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

    fn small_catalog() -> Catalog {
        Catalog::new(
            vec![
                pokemon("Bulbasaur", "Base Stage", false),
                pokemon("Venusaur", "Stage 2", false),
                pokemon("Mewtwo", "Doesn't Evolve", true),
                digimon("Agumon", "Rookie"),
                digimon("Greymon", "Champion"),
            ],
            vec![],
        )
    }

    #[test]
    fn default_policy_hides_evolved_and_legendary() {
        let resolved = resolve(&small_catalog(), &RollRequest::default()).unwrap();
        assert_eq!(resolved.species_slots[0], vec!["Bulbasaur", "Agumon"]);
    }

    #[test]
    fn explicit_legendary_filter_disables_defaults() {
        let request = RollRequest {
            legendary: Some(true),
            ..Default::default()
        };
        let resolved = resolve(&small_catalog(), &request).unwrap();
        // Legendary filter only gates tables that carry the flag; digimon
        // pass through unchanged (and no rank default applies once an
        // explicit rarity filter is present).
        assert!(resolved.species_slots[0].contains(&"Mewtwo".to_string()));
        assert!(!resolved.species_slots[0].contains(&"Bulbasaur".to_string()));
        assert!(resolved.species_slots[0].contains(&"Greymon".to_string()));
    }

    #[test]
    fn include_is_an_allow_list_over_raw_names() {
        let mut request = RollRequest::default();
        // Mewtwo is hidden by default policy but an explicit allow-list
        // brings it back.
        request.species_slots[0].include = vec!["Mewtwo".to_string()];
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert_eq!(resolved.species_slots[0], vec!["Mewtwo"]);
    }

    #[test]
    fn unknown_include_name_is_insufficient_candidates() {
        let mut request = RollRequest::default();
        request.species_slots[0].include = vec!["OnlyThis".to_string()];
        let err = resolve(&small_catalog(), &request).unwrap_err();
        assert!(matches!(
            err,
            RollError::InsufficientCandidates { ref dimension } if dimension == "species1"
        ));
    }

    #[test]
    fn exclude_removes_candidates() {
        let mut request = RollRequest::default();
        request.species_slots[0].exclude = vec!["bulbasaur".to_string()];
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert_eq!(resolved.species_slots[0], vec!["Agumon"]);
    }

    #[test]
    fn pin_wins_outright() {
        let mut request = RollRequest::default();
        request.species_slots[0].pin = Some("Custom Thing".to_string());
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert_eq!(resolved.species_slots[0], vec!["Custom Thing"]);
    }

    #[test]
    fn invalid_ranges_are_rejected_before_sampling() {
        let request = RollRequest {
            species_min: Some(3),
            species_max: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&small_catalog(), &request),
            Err(RollError::InvalidRollParams(_))
        ));

        let request = RollRequest {
            types_max: Some(6),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&small_catalog(), &request),
            Err(RollError::InvalidRollParams(_))
        ));

        let request = RollRequest {
            count: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&small_catalog(), &request),
            Err(RollError::InvalidRollParams(_))
        ));
    }

    #[test]
    fn species_min_beyond_optional_slots_is_unsatisfiable() {
        let mut request = RollRequest {
            species_min: Some(3),
            species_max: Some(3),
            ..Default::default()
        };
        // Empty the optional slots outright.
        request.species_slots[1].include = vec!["Nobody".to_string()];
        request.species_slots[2].include = vec!["Nobody".to_string()];
        let err = resolve(&small_catalog(), &request).unwrap_err();
        assert!(matches!(
            err,
            RollError::ConstraintUnsatisfiable {
                ref dimension,
                needed: 3,
                available: 1,
            } if dimension == "species"
        ));
    }

    #[test]
    fn only_legendary_narrows_tables_and_forces_flag() {
        let request = RollRequest {
            only_legendary: true,
            ..Default::default()
        };
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert_eq!(resolved.species_slots[0], vec!["Mewtwo"]);
    }

    #[test]
    fn table_filter_overrides_global_ranks() {
        let mut request = RollRequest::default();
        request.table_filters.insert(
            SourceTable::Digimon,
            TableFilter {
                include_ranks: vec!["Champion".to_string()],
                ..Default::default()
            },
        );
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert!(resolved.species_slots[0].contains(&"Greymon".to_string()));
        assert!(!resolved.species_slots[0].contains(&"Agumon".to_string()));
    }

    #[test]
    fn type_slots_draw_from_fixed_universe() {
        let mut request = RollRequest::default();
        request.type_slots[0].include = vec!["Fire".to_string(), "Water".to_string()];
        request.type_slots[1].exclude = vec!["Fire".to_string()];
        let resolved = resolve(&small_catalog(), &request).unwrap();
        assert_eq!(resolved.type_slots[0], vec!["Fire", "Water"]);
        assert_eq!(resolved.type_slots[1].len(), 17);
        assert_eq!(resolved.type_slots[2].len(), 18);
    }

    #[test]
    fn empty_catalog_is_insufficient_not_a_crash() {
        let catalog = Catalog::new(vec![], vec![]);
        let err = resolve(&catalog, &RollRequest::default()).unwrap_err();
        assert!(matches!(err, RollError::InsufficientCandidates { .. }));
    }
}
