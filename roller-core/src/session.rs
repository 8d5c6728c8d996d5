use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Catalog, SourceTable};
use crate::composite::{
    build_item, build_monster, roll, roll_items, ItemRoll, ItemRollRequest, MonsterComposite,
};
use crate::constraint::{resolve, RollRequest, TableFilter};
use crate::images::ImageResolver;
use crate::sampler::{derive_seed, generate_seed, generate_token, SeededRng};
use crate::{Result, RollError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollType {
    Monster,
    Item,
    Combined,
    Gift,
    Birthday,
}

impl Default for RollType {
    fn default() -> Self {
        RollType::Monster
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Claimed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Claimed => "claimed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which result array an index-addressed operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Monster,
    Item,
}

impl ResultKind {
    fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Monster => "monster",
            ResultKind::Item => "item",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller can say when opening a session. Counts and params
/// left unset fall back per roll type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub roll_type: RollType,
    pub monster_count: Option<usize>,
    pub item_count: Option<usize>,
    pub monster_params: Option<RollRequest>,
    pub item_params: Option<ItemRollRequest>,
    pub gift_levels: Option<u32>,
    /// Who the rolled rewards are destined for; the claim flow consumes it.
    pub target_user: Option<String>,
    /// None means unlimited claims.
    pub max_monster_claims: Option<u32>,
    pub max_item_claims: Option<u32>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub seed: Option<String>,
}

/// Manual field patch for one monster result. Set fields replace, unset
/// fields are left alone. No re-validation against the original
/// constraints; this is the admin escape hatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterPatch {
    pub species: Option<Vec<String>>,
    pub types: Option<Vec<String>>,
    pub attribute: Option<String>,
    pub rank: Option<String>,
    pub stage: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<u32>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPatch {
    Monster(MonsterPatch),
    Item(ItemPatch),
}

/// One claimable roll batch. The token is the claim capability handed to
/// the community; the id is the admin handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollSession {
    pub id: u64,
    pub token: String,
    pub status: SessionStatus,
    pub roll_type: RollType,
    pub seed: String,
    pub monsters: Vec<MonsterComposite>,
    pub items: Vec<ItemRoll>,
    pub monster_params: RollRequest,
    pub item_params: ItemRollRequest,
    pub max_monster_claims: Option<u32>,
    pub max_item_claims: Option<u32>,
    pub target_user: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every single-slot reroll so repeated rerolls of the same
    /// index keep producing new values.
    pub mutation_counter: u64,
}

impl RollSession {
    fn ensure_active(&self) -> Result<()> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(RollError::SessionNotActive {
                status: self.status,
            })
        }
    }
}

/// Concurrent session registry. DashMap entry guards serialize mutation per
/// session while reads and other sessions proceed untouched.
pub struct SessionStore {
    catalog: Arc<Catalog>,
    images: Arc<dyn ImageResolver + Send + Sync>,
    sessions: DashMap<u64, RollSession>,
    by_token: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(catalog: Arc<Catalog>, images: Arc<dyn ImageResolver + Send + Sync>) -> Self {
        Self {
            catalog,
            images,
            sessions: DashMap::new(),
            by_token: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self, params: SessionParams) -> Result<RollSession> {
        let (monster_count, item_count, monster_params, item_params, max_monster, max_item) =
            plan_session(&params)?;

        let seed = params.seed.clone().unwrap_or_else(generate_seed);

        let monsters = if monster_count > 0 {
            let mut request = monster_params.clone();
            request.seed = Some(seed.clone());
            request.count = Some(monster_count);
            roll(&self.catalog, self.images.as_ref(), &request)?.monsters
        } else {
            Vec::new()
        };

        let items = if item_count > 0 {
            let mut request = item_params.clone();
            // Item draws get their own derived stream so they do not shift
            // the monster stream when counts change. The batch tag is
            // distinct from the per-slot reroll tag, otherwise the first
            // reroll of item 0 under counter 0 would replay the batch's
            // first draw.
            request.seed = Some(derive_seed(&seed, "item-batch", 0, 0));
            request.count = Some(item_count);
            roll_items(&self.catalog, self.images.as_ref(), &request)?.items
        } else {
            Vec::new()
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let session = RollSession {
            id,
            token: generate_token(),
            status: SessionStatus::Active,
            roll_type: params.roll_type,
            seed,
            monsters,
            items,
            monster_params,
            item_params,
            max_monster_claims: max_monster,
            max_item_claims: max_item,
            target_user: params.target_user,
            notes: params.notes,
            created_by: params.created_by,
            created_at: now,
            updated_at: now,
            mutation_counter: 0,
        };
        info!(
            id,
            roll_type = ?session.roll_type,
            monsters = session.monsters.len(),
            items = session.items.len(),
            "created roll session"
        );
        self.by_token.insert(session.token.clone(), id);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    pub fn session(&self, id: u64) -> Result<RollSession> {
        self.sessions
            .get(&id)
            .map(|s| s.clone())
            .ok_or(RollError::SessionNotFound)
    }

    pub fn session_by_token(&self, token: &str) -> Result<RollSession> {
        let id = *self
            .by_token
            .get(token)
            .ok_or(RollError::SessionNotFound)?;
        self.session(id)
    }

    /// Reroll a single result slot. Every other index keeps its value; a
    /// second reroll of the same index produces a fresh draw because the
    /// mutation counter feeds the sub-seed.
    pub fn reroll_one(&self, id: u64, kind: ResultKind, index: usize) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;
        check_index(&entry, kind, index)?;

        let sub_seed = derive_seed(&entry.seed, kind.as_str(), index, entry.mutation_counter);
        entry.mutation_counter += 1;
        let mut rng = SeededRng::from_seed_str(&sub_seed);

        match kind {
            ResultKind::Monster => {
                let resolved = resolve(&self.catalog, &entry.monster_params)?;
                entry.monsters[index] =
                    build_monster(&self.catalog, self.images.as_ref(), &resolved, &mut rng)?;
            }
            ResultKind::Item => {
                let pool = self.catalog.items(&entry.item_params.categories);
                let picked = rng.pick(&pool).ok_or(RollError::InsufficientCandidates {
                    dimension: "items".into(),
                })?;
                entry.items[index] = build_item(picked, self.images.as_ref());
            }
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Rebuild both result arrays under a brand-new seed, keeping the
    /// original constraint parameters, limits and notes.
    pub fn reroll_all(&self, id: u64) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;

        let seed = generate_seed();
        let monster_count = entry.monsters.len();
        let item_draws: u32 = entry.items.iter().map(|i| i.quantity).sum();

        if monster_count > 0 {
            let mut request = entry.monster_params.clone();
            request.seed = Some(seed.clone());
            request.count = Some(monster_count);
            entry.monsters = roll(&self.catalog, self.images.as_ref(), &request)?.monsters;
        }
        if item_draws > 0 {
            let mut request = entry.item_params.clone();
            request.seed = Some(derive_seed(&seed, "item-batch", 0, 0));
            request.count = Some(item_draws as usize);
            entry.items = roll_items(&self.catalog, self.images.as_ref(), &request)?.items;
        }
        entry.seed = seed;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Remove one result and close the gap; later results shift down one
    /// index.
    pub fn delete_one(&self, id: u64, kind: ResultKind, index: usize) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;
        check_index(&entry, kind, index)?;
        match kind {
            ResultKind::Monster => {
                entry.monsters.remove(index);
            }
            ResultKind::Item => {
                entry.items.remove(index);
            }
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Apply a manual field patch to one result.
    pub fn update_one(&self, id: u64, index: usize, patch: ResultPatch) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;
        match patch {
            ResultPatch::Monster(patch) => {
                check_index(&entry, ResultKind::Monster, index)?;
                let monster = &mut entry.monsters[index];
                if let Some(species) = patch.species {
                    monster.species = species;
                }
                if let Some(types) = patch.types {
                    monster.types = types;
                }
                if let Some(attribute) = patch.attribute {
                    monster.attribute = attribute;
                }
                if let Some(rank) = patch.rank {
                    monster.rank = Some(rank);
                }
                if let Some(stage) = patch.stage {
                    monster.stage = Some(stage);
                }
                if let Some(images) = patch.images {
                    monster.images = images;
                }
            }
            ResultPatch::Item(patch) => {
                check_index(&entry, ResultKind::Item, index)?;
                let item = &mut entry.items[index];
                if let Some(name) = patch.name {
                    item.name = name;
                }
                if let Some(category) = patch.category {
                    item.category = category;
                }
                if let Some(quantity) = patch.quantity {
                    item.quantity = quantity;
                }
                if let Some(image) = patch.image {
                    item.image = Some(image);
                }
            }
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Replace the claim limits. Only active sessions can be retuned; a
    /// claimed or cancelled session keeps the limits it ended with.
    pub fn update_limits(
        &self,
        id: u64,
        max_monster_claims: Option<u32>,
        max_item_claims: Option<u32>,
    ) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;
        entry.max_monster_claims = max_monster_claims;
        entry.max_item_claims = max_item_claims;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn cancel(&self, id: u64) -> Result<RollSession> {
        self.transition(id, SessionStatus::Cancelled)
    }

    pub fn mark_claimed(&self, id: u64) -> Result<RollSession> {
        self.transition(id, SessionStatus::Claimed)
    }

    fn transition(&self, id: u64, target: SessionStatus) -> Result<RollSession> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RollError::SessionNotFound)?;
        entry.ensure_active()?;
        entry.status = target;
        entry.updated_at = Utc::now();
        info!(id, status = %target, "session state change");
        Ok(entry.clone())
    }

    /// Drop a session entirely, terminal or not.
    pub fn remove(&self, id: u64) -> Result<RollSession> {
        let (_, session) = self
            .sessions
            .remove(&id)
            .ok_or(RollError::SessionNotFound)?;
        self.by_token.remove(&session.token);
        Ok(session)
    }
}

fn check_index(session: &RollSession, kind: ResultKind, index: usize) -> Result<()> {
    let len = match kind {
        ResultKind::Monster => session.monsters.len(),
        ResultKind::Item => session.items.len(),
    };
    if index >= len {
        return Err(RollError::ResultNotFound { kind, index, len });
    }
    Ok(())
}

type SessionPlan = (
    usize,
    usize,
    RollRequest,
    ItemRollRequest,
    Option<u32>,
    Option<u32>,
);

/// Turn the caller's params into concrete counts, request templates and
/// claim limits per roll type.
fn plan_session(params: &SessionParams) -> Result<SessionPlan> {
    let monster_params = params.monster_params.clone().unwrap_or_default();
    let item_params = params.item_params.clone().unwrap_or_default();
    match params.roll_type {
        RollType::Monster => Ok((
            params.monster_count.unwrap_or(1),
            0,
            monster_params,
            item_params,
            params.max_monster_claims,
            params.max_item_claims,
        )),
        RollType::Item => Ok((
            0,
            params.item_count.unwrap_or(1),
            monster_params,
            item_params,
            params.max_monster_claims,
            params.max_item_claims,
        )),
        RollType::Combined => Ok((
            params.monster_count.unwrap_or(1),
            params.item_count.unwrap_or(1),
            monster_params,
            item_params,
            params.max_monster_claims,
            params.max_item_claims,
        )),
        RollType::Gift => {
            let levels = params.gift_levels.unwrap_or(0);
            if levels < 1 {
                return Err(RollError::InvalidRollParams(
                    "gift rolls require gift_levels >= 1".into(),
                ));
            }
            // One item per 5 levels rounded up, one monster per full 10.
            let item_count = levels.div_ceil(5) as usize;
            let monster_count = (levels / 10) as usize;
            Ok((
                monster_count,
                item_count,
                RollRequest::default(),
                ItemRollRequest::default(),
                None,
                None,
            ))
        }
        RollType::Birthday => Ok((
            10,
            10,
            birthday_request(),
            ItemRollRequest::default(),
            None,
            None,
        )),
    }
}

/// Birthday rolls widen the stage pool to include baby stages while keeping
/// the usual starter ranks on the rank-based tables.
fn birthday_request() -> RollRequest {
    let mut request = RollRequest {
        include_stages: vec![
            "Base Stage".to_string(),
            "Doesn't Evolve".to_string(),
            "Baby I".to_string(),
            "Baby II".to_string(),
        ],
        legendary: Some(false),
        ..Default::default()
    };
    for (table, ranks) in [
        (SourceTable::Digimon, &["Baby I", "Baby II", "In-Training", "Rookie"][..]),
        (SourceTable::Yokai, &["E", "D", "C"][..]),
        (SourceTable::MonsterHunter, &["1", "2", "3"][..]),
    ] {
        request.table_filters.insert(
            table,
            TableFilter {
                include_ranks: ranks.iter().map(|r| r.to_string()).collect(),
                ..Default::default()
            },
        );
    }
    request
}
