use thiserror::Error;

pub mod catalog;
pub mod composite;
pub mod constraint;
pub mod images;
pub mod sampler;
pub mod session;

pub use catalog::{Catalog, CatalogEntity, ItemEntity, SourceTable, ATTRIBUTES, MONSTER_TYPES};
pub use composite::{
    roll, roll_items, ItemRoll, ItemRollOutcome, ItemRollRequest, MonsterComposite, RollOutcome,
};
pub use constraint::{RollRequest, SlotConstraint, TableFilter};
pub use images::{DirImageResolver, ImageResolver, NullImageResolver, PLACEHOLDER_IMAGE};
pub use session::{
    ItemPatch, MonsterPatch, ResultKind, ResultPatch, RollSession, RollType, SessionParams,
    SessionStatus, SessionStore,
};

#[derive(Debug, Error)]
pub enum RollError {
    /// A required dimension slot has no eligible candidates after filtering.
    #[error("no eligible candidates for {dimension}")]
    InsufficientCandidates { dimension: String },
    /// The requested cardinality range cannot be met with the available
    /// optional-slot candidates.
    #[error("cannot fill {needed} {dimension} slots, only {available} available")]
    ConstraintUnsatisfiable {
        dimension: String,
        needed: usize,
        available: usize,
    },
    /// Malformed request rejected before any sampling occurs.
    #[error("invalid roll parameters: {0}")]
    InvalidRollParams(String),
    #[error("session not found")]
    SessionNotFound,
    /// Index-addressed result does not exist in the session's array.
    #[error("no {kind} result at index {index} (len {len})")]
    ResultNotFound {
        kind: session::ResultKind,
        index: usize,
        len: usize,
    },
    #[error("session is {status}, not active")]
    SessionNotActive { status: session::SessionStatus },
    #[error("catalog IO error: {0}")]
    Catalog(#[from] std::io::Error),
    #[error("catalog format error: {0}")]
    CatalogFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RollError>;
