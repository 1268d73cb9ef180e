//! Transit Idle Game Engine
//!
//! Platform-agnostic core game logic for the Transit Idle browser game:
//! the research progression tree, its derived effects, and the starter-fleet
//! preview-run scheduler. This crate provides all game mechanics without UI
//! or platform-specific dependencies; hosts inject time as `local_now_ms`
//! parameters and persistence through the [`ResearchStore`] trait.

pub mod autosave;
pub mod catalog;
pub mod clock;
pub mod effects;
pub mod engine;
pub mod persist;
pub mod preview;
pub mod timefmt;
pub mod transports;

// Re-export commonly used types
pub use autosave::{AutosaveScheduler, AutosaveSettings, delay_to_next_boundary_ms};
pub use catalog::{
    Catalog, CatalogError, CityScale, Effect, FeatureKey, NodeType, PreviewFleetConfig,
    PreviewRunMode, ResearchNode, TimePolicy, TransportId,
};
pub use clock::SyncedClock;
pub use effects::{DerivedEffects, FeatureSet, duration_multiplier, queue_limit_for_level};
pub use engine::{
    EngineConfig, HARD_LOCKED_RESEARCH_IDS, ResearchEngine, StartError, StartOutcome, Status,
    TickOutcome,
};
pub use persist::{
    ActiveResearch, MemoryStore, ResearchStore, SAVE_DOC_VERSION, SaveDoc, SaveReason,
    normalize_world,
};
pub use preview::{
    PreviewBoard, PreviewContext, PreviewRun, PreviewSave, RUN_MAX_SEC, RUN_MIN_SEC, RunStatus,
};
pub use timefmt::{format_remaining_ms, format_remaining_secs};
pub use transports::{TransportInfo, preview_context, start_transport_unlock, transport_infos};
