use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{table_schema, Catalog, ItemEntity, SourceTable};
use crate::constraint::{resolve, ResolvedRequest, RollRequest};
use crate::images::{ImageResolver, PLACEHOLDER_IMAGE};
use crate::sampler::{generate_seed, SeededRng};
use crate::{Result, RollError};

/// One rolled monster: 1-3 species fused together, 1-5 types, exactly one
/// attribute. Rank, stage and table come from the lead species when its
/// source table carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterComposite {
    pub species: Vec<String>,
    pub types: Vec<String>,
    pub attribute: String,
    #[serde(default)]
    pub table: Option<SourceTable>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A monster batch plus the seed that produced it. Echoing the seed back
/// lets the caller reproduce or audit the batch later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollOutcome {
    pub seed: String,
    pub monsters: Vec<MonsterComposite>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRollRequest {
    /// Item categories to draw from; empty means all of them.
    pub categories: Vec<String>,
    pub seed: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRoll {
    pub name: String,
    pub category: String,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRollOutcome {
    pub seed: String,
    pub items: Vec<ItemRoll>,
}

/// Roll a batch of monsters. The whole batch shares one RNG stream seeded
/// from the request seed (or a freshly generated one), so a batch of N is
/// reproducible as a unit.
pub fn roll(
    catalog: &Catalog,
    images: &dyn ImageResolver,
    request: &RollRequest,
) -> Result<RollOutcome> {
    let resolved = resolve(catalog, request)?;
    let seed = request.seed.clone().unwrap_or_else(generate_seed);
    let mut rng = SeededRng::from_seed_str(&seed);
    let mut monsters = Vec::with_capacity(resolved.count);
    for _ in 0..resolved.count {
        monsters.push(build_monster(catalog, images, &resolved, &mut rng)?);
    }
    debug!(seed = %seed, count = monsters.len(), "rolled monster batch");
    Ok(RollOutcome { seed, monsters })
}

/// Build one composite from an already-resolved request. Draw order is
/// fixed: species cardinality, species slots in order, type cardinality,
/// type slots in order, attribute.
pub(crate) fn build_monster(
    catalog: &Catalog,
    images: &dyn ImageResolver,
    resolved: &ResolvedRequest,
    rng: &mut SeededRng,
) -> Result<MonsterComposite> {
    let species = draw_slots(
        rng,
        &resolved.species_slots,
        resolved.species_min,
        resolved.species_max,
        "species",
    )?;
    let types = draw_slots(
        rng,
        &resolved.type_slots,
        resolved.types_min,
        resolved.types_max,
        "types",
    )?;

    let lead = catalog.entity(&species[0]);

    // A lead species keeps its catalog attribute when it is still in the
    // candidate pool; otherwise the attribute is drawn uniformly.
    let attribute = lead
        .and_then(|e| e.attribute.as_deref())
        .filter(|a| resolved.attributes.iter().any(|c| c.eq_ignore_ascii_case(a)))
        .map(str::to_string)
        .unwrap_or_else(|| {
            rng.pick(&resolved.attributes)
                .cloned()
                .unwrap_or_else(|| resolved.attributes[0].clone())
        });

    let (table, rank, stage) = match lead {
        Some(entity) => {
            let schema = table_schema(entity.table);
            (
                Some(entity.table),
                schema.has_rank.then(|| entity.rank.clone()).flatten(),
                schema.has_stage.then(|| entity.stage.clone()).flatten(),
            )
        }
        None => (None, None, None),
    };

    let imgs = species
        .iter()
        .map(|name| {
            catalog
                .entity(name)
                .and_then(|e| e.image.clone())
                .or_else(|| images.resolve(name))
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
        })
        .collect();

    Ok(MonsterComposite {
        species,
        types,
        attribute,
        table,
        rank,
        stage,
        images: imgs,
    })
}

/// Draw a cardinality, then fill that many slots in slot order. Slot 1 is
/// always taken; later slots are skipped when empty or when every candidate
/// is already picked, so values within one composite stay pairwise
/// distinct. Falling short of the minimum after slot exhaustion is an
/// error, never a silently smaller composite.
fn draw_slots(
    rng: &mut SeededRng,
    slots: &[Vec<String>],
    min: usize,
    max: usize,
    dimension: &str,
) -> Result<Vec<String>> {
    let target = rng.sample_cardinality(min, max);
    let mut picked: Vec<String> = Vec::with_capacity(target);
    for slot in slots {
        if picked.len() >= target {
            break;
        }
        let remaining: Vec<&String> = slot.iter().filter(|c| !picked.contains(c)).collect();
        if let Some(choice) = rng.pick(&remaining) {
            picked.push((*choice).clone());
        }
    }
    if picked.len() < min {
        return Err(RollError::ConstraintUnsatisfiable {
            dimension: dimension.to_string(),
            needed: min,
            available: picked.len(),
        });
    }
    Ok(picked)
}

/// Roll a batch of items with replacement. A repeat pick bumps the quantity
/// of the entry already in the batch instead of appending a duplicate row.
pub fn roll_items(
    catalog: &Catalog,
    images: &dyn ImageResolver,
    request: &ItemRollRequest,
) -> Result<ItemRollOutcome> {
    let count = request.count.unwrap_or(1);
    if count < 1 {
        return Err(RollError::InvalidRollParams("count must be at least 1".into()));
    }
    let pool = catalog.items(&request.categories);
    if pool.is_empty() {
        return Err(RollError::InsufficientCandidates {
            dimension: "items".into(),
        });
    }

    let seed = request.seed.clone().unwrap_or_else(generate_seed);
    let mut rng = SeededRng::from_seed_str(&seed);
    let mut items: Vec<ItemRoll> = Vec::new();
    for _ in 0..count {
        let idx = rng.next_index(pool.len());
        let entity = pool[idx];
        match items.iter_mut().find(|i| i.name == entity.name) {
            Some(existing) => existing.quantity += 1,
            None => items.push(build_item(entity, images)),
        }
    }
    debug!(seed = %seed, rows = items.len(), draws = count, "rolled item batch");
    Ok(ItemRollOutcome { seed, items })
}

pub(crate) fn build_item(entity: &ItemEntity, images: &dyn ImageResolver) -> ItemRoll {
    ItemRoll {
        name: entity.name.clone(),
        category: entity.category.clone(),
        quantity: 1,
        image: entity
            .image
            .clone()
            .or_else(|| images.resolve(&entity.name)),
    }
}
