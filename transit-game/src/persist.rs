//! Save-document wire shape and the storage seam the engine talks through.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

/// Current research document schema version.
pub const SAVE_DOC_VERSION: u32 = 10;

/// Why a save was committed. The tag lands in the document for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Manual,
    Debounced,
    Autosave,
    FirstUnlock,
    InstantComplete,
    StartResearch,
    QueueAdd,
    QueueCancel,
    QueueCancelAll,
    ResearchComplete,
    HardLockCleanup,
    Init,
    MigrateLegacy,
}

impl SaveReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Debounced => "debounced",
            Self::Autosave => "autosave",
            Self::FirstUnlock => "firstUnlock",
            Self::InstantComplete => "instantComplete",
            Self::StartResearch => "startResearch",
            Self::QueueAdd => "queueAdd",
            Self::QueueCancel => "queueCancel",
            Self::QueueCancelAll => "queueCancelAll",
            Self::ResearchComplete => "researchComplete",
            Self::HardLockCleanup => "hardLockCleanup",
            Self::Init => "init",
            Self::MigrateLegacy => "migrateLegacy",
        }
    }
}

impl fmt::Display for SaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The task currently occupying the single research slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResearch {
    pub id: String,
    #[serde(default)]
    pub started_at_ms: i64,
    #[serde(default)]
    pub ends_at_ms: i64,
}

/// Per-transport lock flag from pre-v10 documents. Read-only compat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransport {
    pub id: String,
    #[serde(default = "locked_default")]
    pub locked: bool,
}

const fn locked_default() -> bool {
    true
}

/// The persisted research document (camelCase on the wire, version 10).
///
/// Every field defaults so documents written by older clients, or partially
/// merged ones, deserialize without error. The legacy fields are accepted on
/// read and never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveDoc {
    pub version: u32,
    #[serde(alias = "firstUnlockId")]
    pub first_unlock_transport_id: Option<String>,
    pub completed_research_ids: Vec<String>,
    pub active_research: Option<ActiveResearch>,
    pub queued_research_ids: Vec<String>,
    /// Pre-v10 single-slot queue; merged into `queued_research_ids` on read.
    #[serde(skip_serializing)]
    pub queued_research_id: Option<String>,
    /// Pre-research-tree transport locks; used once to infer tier-1
    /// completions when the completed set is empty.
    #[serde(skip_serializing)]
    pub transports: Vec<LegacyTransport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_save_reason: Option<String>,
}

impl SaveDoc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: SAVE_DOC_VERSION,
            ..Self::default()
        }
    }
}

/// Lowercases and trims a world/channel name; empty means production.
#[must_use]
pub fn normalize_world(world: &str) -> String {
    let w = world.trim().to_lowercase();
    if w.is_empty() { "prod".to_string() } else { w }
}

/// Storage backend seam. The host wires this to its real document store; the
/// engine only ever sees per-user, per-world research documents.
pub trait ResearchStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the research document for a user in a world, if one exists.
    ///
    /// # Errors
    /// Returns the backend's error when the read fails.
    fn load(&mut self, uid: &str, world: &str) -> Result<Option<SaveDoc>, Self::Error>;

    /// Writes the research document for a user in a world.
    ///
    /// # Errors
    /// Returns the backend's error when the write fails.
    fn save(&mut self, uid: &str, world: &str, doc: &SaveDoc) -> Result<(), Self::Error>;

    /// Loads the pre-world-partition document for a user, if one exists.
    ///
    /// # Errors
    /// Returns the backend's error when the read fails.
    fn load_legacy(&mut self, uid: &str) -> Result<Option<SaveDoc>, Self::Error>;
}

/// In-memory store used by tests and local/offline hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: HashMap<(String, String), SaveDoc>,
    legacy: HashMap<String, SaveDoc>,
    save_count: usize,
    next_timestamp_ms: i64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a legacy (pre-world) document for migration tests.
    pub fn seed_legacy(&mut self, uid: &str, doc: SaveDoc) {
        self.legacy.insert(uid.to_string(), doc);
    }

    /// Fakes the server clock used to stamp `updatedAtMs`.
    pub fn set_timestamp_ms(&mut self, ms: i64) {
        self.next_timestamp_ms = ms;
    }

    #[must_use]
    pub fn doc(&self, uid: &str, world: &str) -> Option<&SaveDoc> {
        self.docs.get(&(uid.to_string(), world.to_string()))
    }

    /// Number of writes accepted since construction.
    #[must_use]
    pub const fn save_count(&self) -> usize {
        self.save_count
    }
}

impl ResearchStore for MemoryStore {
    type Error = Infallible;

    fn load(&mut self, uid: &str, world: &str) -> Result<Option<SaveDoc>, Self::Error> {
        Ok(self.docs.get(&(uid.to_string(), world.to_string())).cloned())
    }

    fn save(&mut self, uid: &str, world: &str, doc: &SaveDoc) -> Result<(), Self::Error> {
        let mut stamped = doc.clone();
        stamped.updated_at_ms = Some(self.next_timestamp_ms);
        self.docs
            .insert((uid.to_string(), world.to_string()), stamped);
        self.save_count += 1;
        Ok(())
    }

    fn load_legacy(&mut self, uid: &str) -> Result<Option<SaveDoc>, Self::Error> {
        Ok(self.legacy.get(uid).cloned())
    }
}
