//! Research progression engine: status resolution, the single active slot and
//! its bounded queue, completion ticks, and persistence wiring.

use crate::autosave::{AutosaveScheduler, AutosaveSettings};
use crate::catalog::{Catalog, CityScale, FeatureKey, ResearchNode, TransportId};
use crate::clock::SyncedClock;
use crate::effects::DerivedEffects;
use crate::persist::{
    ActiveResearch, ResearchStore, SAVE_DOC_VERSION, SaveDoc, SaveReason, normalize_world,
};
use crate::timefmt::format_remaining_ms;
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Operator kill-switch: these ids are evicted from the active slot and the
/// queue whenever their catalog entry is disabled. The list is intentionally
/// broader than the currently disabled set so re-disabling an id later needs
/// only a catalog change.
pub const HARD_LOCKED_RESEARCH_IDS: [&str; 5] = [
    "sys_unlock_vehicle",
    "sys_unlock_route",
    "sys_unlock_construction",
    "sys_unlock_finance",
    "sys_unlock_city",
];

const SAVE_DEBOUNCE_MS: i64 = 800;

/// Player-facing state of one research node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unknown,
    Hidden,
    Done,
    Active,
    Queued,
    ComingSoon,
    Locked,
    Available,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Hidden => "hidden",
            Self::Done => "done",
            Self::Active => "active",
            Self::Queued => "queued",
            Self::ComingSoon => "comingSoon",
            Self::Locked => "locked",
            Self::Available => "available",
        }
    }

    /// Uppercased status used as a rejection reason code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Hidden => "HIDDEN",
            Self::Done => "DONE",
            Self::Active => "ACTIVE",
            Self::Queued => "QUEUED",
            Self::ComingSoon => "COMINGSOON",
            Self::Locked => "LOCKED",
            Self::Available => "AVAILABLE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a start/queue command was refused. `code` yields the stable wire
/// strings hosts key their toasts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("research id is not in the catalog")]
    UnknownResearch,
    #[error("research is disabled")]
    ComingSoon,
    #[error("research is already completed")]
    AlreadyDone,
    #[error("research is already the active task")]
    AlreadyActive,
    #[error("research queue is full")]
    QueueFull,
    #[error("a first transport unlock must be chosen")]
    FirstUnlockRequired,
    #[error("synchronized clock is not ready")]
    ClockNotReady,
    #[error("research is not available (status {0})")]
    NotAvailable(Status),
}

impl StartError {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnknownResearch => "UNKNOWN_RESEARCH",
            Self::ComingSoon => "COMING_SOON",
            Self::AlreadyDone => "ALREADY_DONE",
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::QueueFull => "QUEUE_FULL",
            Self::FirstUnlockRequired => "FIRST_UNLOCK_REQUIRED",
            Self::ClockNotReady => "KST_NOT_READY",
            Self::NotAvailable(status) => status.code(),
        }
    }
}

/// Accepted start/queue command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Now occupying the active slot.
    Started,
    /// Zero-duration node, completed on the spot.
    Instant,
    /// Placed in (or already in) the waiting queue.
    Queued { already_queued: bool },
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Research that finished this tick.
    pub completed: Option<String>,
    /// Queued research promoted into the freed slot.
    pub promoted: Option<String>,
    /// Queued research dropped because its promotion was refused.
    pub dropped: Option<String>,
    /// A KST-boundary autosave fired.
    pub autosaved: bool,
}

/// Engine policy knobs fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// World partition used before any subscription names one.
    pub default_world: String,
    /// When false the engine runs fully local: subscriptions complete
    /// immediately and no store traffic ever happens (test channels).
    pub remote_enabled: bool,
    /// Forces every non-zero research duration to this many seconds
    /// (test channels pin everything to 300).
    pub force_duration_sec: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_world: "prod".to_string(),
            remote_enabled: true,
            force_duration_sec: None,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    uid: Option<String>,
    world: String,
    loaded: bool,
    loading: bool,
    hydrating: bool,
}

/// The research engine. Owns all progression state; the host owns the loop,
/// feeding local timestamps into [`ResearchEngine::tick`] and the commands.
pub struct ResearchEngine<S: ResearchStore> {
    catalog: Catalog,
    config: EngineConfig,
    clock: SyncedClock,
    first_unlock: Option<TransportId>,
    completed: BTreeSet<String>,
    active: Option<ActiveResearch>,
    queue: SmallVec<[String; 5]>,
    derived: DerivedEffects,
    store: S,
    session: SessionState,
    save_enabled: bool,
    autosave_settings: AutosaveSettings,
    autosave: AutosaveScheduler,
    debounce_due_ms: Option<i64>,
}

impl<S: ResearchStore> ResearchEngine<S> {
    #[must_use]
    pub fn new(catalog: Catalog, config: EngineConfig, store: S) -> Self {
        let derived = DerivedEffects::recompute(&catalog, &BTreeSet::new());
        let world = normalize_world(&config.default_world);
        Self {
            catalog,
            config,
            clock: SyncedClock::new(),
            first_unlock: None,
            completed: BTreeSet::new(),
            active: None,
            queue: SmallVec::new(),
            derived,
            store,
            session: SessionState {
                world,
                ..SessionState::default()
            },
            save_enabled: true,
            autosave_settings: AutosaveSettings::default(),
            autosave: AutosaveScheduler::default(),
            debounce_due_ms: None,
        }
    }

    // ===== Accessors =====

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn derived(&self) -> &DerivedEffects {
        &self.derived
    }

    #[must_use]
    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveResearch> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    #[must_use]
    pub fn first_unlock_transport(&self) -> Option<TransportId> {
        self.first_unlock
    }

    #[must_use]
    pub fn clock(&self) -> SyncedClock {
        self.clock
    }

    /// Feeds a measured server offset in; the clock becomes ready.
    pub fn set_clock_offset(&mut self, offset_ms: i64) {
        self.clock.set_offset(offset_ms);
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn current_uid(&self) -> Option<&str> {
        self.session.uid.as_deref()
    }

    #[must_use]
    pub fn current_world(&self) -> &str {
        &self.session.world
    }

    /// Guests are always hydrated; signed-in users once their load finished.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.session.uid.is_none() || self.session.loaded
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.session.loading
    }

    #[must_use]
    pub fn autosave_settings(&self) -> AutosaveSettings {
        self.autosave_settings
    }

    #[must_use]
    pub fn is_autosave_running(&self) -> bool {
        self.autosave.is_running()
    }

    #[must_use]
    pub fn is_save_enabled(&self) -> bool {
        self.save_enabled
    }

    // ===== Catalog resolution =====

    fn prerequisites_met(&self, def: &ResearchNode) -> bool {
        def.requires.iter().all(|rid| self.completed.contains(rid))
    }

    fn reveal_satisfied(&self, def: &ResearchNode) -> bool {
        def.reveal_after
            .iter()
            .all(|rid| self.completed.contains(rid))
    }

    fn hard_locked(&self, id: &str) -> bool {
        HARD_LOCKED_RESEARCH_IDS.contains(&id)
            && self.catalog.get(id).is_some_and(|def| !def.enabled)
    }

    /// Any of the starter-fleet transports already unlocked at tier 1?
    fn any_starter_transport_unlocked(&self, transports: &[TransportId]) -> bool {
        transports.iter().any(|&t| {
            self.catalog
                .tier1_unlock_id(t)
                .is_some_and(|rid| self.completed.contains(rid))
        })
    }

    /// Resolves the player-facing status of a node. Precedence: unknown,
    /// hidden, done, active, queued, comingSoon, then availability.
    #[must_use]
    pub fn status(&self, id: &str) -> Status {
        let Some(def) = self.catalog.get(id) else {
            return Status::Unknown;
        };
        if def.tier == 1 && !self.reveal_satisfied(def) {
            return Status::Hidden;
        }
        if self.completed.contains(id) {
            return Status::Done;
        }
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            return Status::Active;
        }
        if self.queue.iter().any(|q| q == id) {
            return Status::Queued;
        }
        if !def.enabled {
            return Status::ComingSoon;
        }
        // Starter-fleet preview gates on an OR over its transports' tier-1
        // unlocks, which the AND-only `requires` list cannot express.
        if let Some(cfg) = def.starter_fleet_preview() {
            if self.first_unlock.is_none() {
                return Status::Locked;
            }
            if !self.any_starter_transport_unlocked(&cfg.transports) {
                return Status::Locked;
            }
            return Status::Available;
        }
        if def.tier == 1 && def.tier1_transport_unlock().is_some() && self.first_unlock.is_some() {
            return Status::Available;
        }
        if !self.prerequisites_met(def) {
            return Status::Locked;
        }
        Status::Available
    }

    /// Nodes the tree view shows: tier 2+ always, tier 1 once revealed.
    #[must_use]
    pub fn visible_nodes(&self) -> Vec<&ResearchNode> {
        self.catalog
            .nodes()
            .iter()
            .filter(|def| def.tier >= 2 || self.reveal_satisfied(def))
            .collect()
    }

    #[must_use]
    pub fn needs_first_unlock_selection(&self) -> bool {
        self.first_unlock.is_none()
    }

    #[must_use]
    pub fn first_unlock_candidates(&self) -> Vec<TransportId> {
        self.catalog.tier1_transports()
    }

    #[must_use]
    pub fn has_feature(&self, key: FeatureKey) -> bool {
        self.derived.features.enabled(key)
    }

    #[must_use]
    pub fn city_scale_at_least(&self, scale: CityScale) -> bool {
        self.derived.city_scale >= scale
    }

    #[must_use]
    pub fn queue_limit(&self) -> usize {
        self.derived.queue_limit()
    }

    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        self.queue.len() >= self.queue_limit()
    }

    // ===== Commands =====

    /// One-time starter choice: marks the transport's tier-1 unlock complete
    /// with no research time. Ignored once a choice exists.
    pub fn set_first_unlock_transport(&mut self, transport: TransportId) {
        if self.first_unlock.is_some() {
            return;
        }
        let Some(rid) = self.catalog.tier1_unlock_id(transport) else {
            return;
        };
        let rid = rid.to_string();
        self.first_unlock = Some(transport);
        self.completed.insert(rid);
        self.recompute_effects();
        self.save_now(SaveReason::FirstUnlock);
    }

    /// Starts a node immediately when the slot is free, otherwise queues it.
    ///
    /// # Errors
    /// Refuses with a [`StartError`] carrying a stable reason code.
    pub fn start_research(
        &mut self,
        id: &str,
        local_now_ms: i64,
    ) -> Result<StartOutcome, StartError> {
        if self.hard_locked(id) {
            return Err(StartError::ComingSoon);
        }
        if self.completed.contains(id) {
            return Err(StartError::AlreadyDone);
        }
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            return Err(StartError::AlreadyActive);
        }
        if self.queue.iter().any(|q| q == id) {
            return Ok(StartOutcome::Queued {
                already_queued: true,
            });
        }

        if self.active.is_some() {
            let limit = self.queue_limit();
            if self.queue.len() >= limit {
                return Err(StartError::QueueFull);
            }
            let st = self.status(id);
            if st != Status::Available {
                return Err(StartError::NotAvailable(st));
            }
            self.queue.push(id.to_string());
            self.queue.truncate(limit);
            self.save_now(SaveReason::QueueAdd);
            return Ok(StartOutcome::Queued {
                already_queued: false,
            });
        }

        self.start_now(id, local_now_ms)
    }

    /// Occupies the free slot, or completes instantly for zero durations.
    fn start_now(&mut self, id: &str, local_now_ms: i64) -> Result<StartOutcome, StartError> {
        if self.hard_locked(id) {
            return Err(StartError::ComingSoon);
        }
        let Some(def) = self.catalog.get(id) else {
            return Err(StartError::UnknownResearch);
        };
        let base_sec = def.duration_sec;
        let fixed = def.is_fixed_duration();

        if self.first_unlock.is_none() {
            return Err(StartError::FirstUnlockRequired);
        }
        if !self.clock.is_ready() {
            return Err(StartError::ClockNotReady);
        }
        if self.completed.contains(id) {
            return Err(StartError::AlreadyDone);
        }
        if !self.catalog.get(id).is_some_and(|d| d.enabled) {
            return Err(StartError::ComingSoon);
        }
        let st = self.status(id);
        if st != Status::Available {
            return Err(StartError::NotAvailable(st));
        }

        let duration_sec = if base_sec == 0 {
            0
        } else if let Some(forced) = self.config.force_duration_sec {
            forced
        } else if fixed {
            base_sec
        } else {
            scale_duration(base_sec, self.derived.research_duration_multiplier)
        };

        // Zero-duration research completes on the spot, even on channels
        // that force fixed durations.
        if duration_sec == 0 {
            self.completed.insert(id.to_string());
            self.recompute_effects();
            self.save_now(SaveReason::InstantComplete);
            return Ok(StartOutcome::Instant);
        }

        let now = self.clock.now_ms(local_now_ms);
        self.active = Some(ActiveResearch {
            id: id.to_string(),
            started_at_ms: now,
            ends_at_ms: now + i64::from(duration_sec) * 1000,
        });
        self.save_now(SaveReason::StartResearch);
        Ok(StartOutcome::Started)
    }

    /// Removes one id from the queue; silently ignores ids not present.
    pub fn cancel_queued(&mut self, id: &str) {
        let before = self.queue.len();
        self.queue.retain(|q| q != id);
        if self.queue.len() != before {
            self.save_now(SaveReason::QueueCancel);
        }
    }

    pub fn cancel_all_queued(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        self.queue.clear();
        self.save_now(SaveReason::QueueCancelAll);
    }

    // ===== Display helpers =====

    /// Percentage progress of the active task, 0 for everything else and
    /// whenever the clock is not ready.
    #[must_use]
    pub fn progress(&self, id: &str, local_now_ms: i64) -> f64 {
        let Some(active) = self.active.as_ref().filter(|a| a.id == id) else {
            return 0.0;
        };
        if !self.clock.is_ready() {
            return 0.0;
        }
        let total = active.ends_at_ms - active.started_at_ms;
        if total <= 0 {
            return 0.0;
        }
        let elapsed = self.clock.now_ms(local_now_ms) - active.started_at_ms;
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Formatted countdown for the active task, `"0s"` otherwise.
    #[must_use]
    pub fn remaining_time(&self, id: &str, local_now_ms: i64) -> String {
        let Some(active) = self.active.as_ref().filter(|a| a.id == id) else {
            return "0s".to_string();
        };
        if !self.clock.is_ready() {
            return "0s".to_string();
        }
        format_remaining_ms(active.ends_at_ms - self.clock.now_ms(local_now_ms))
    }

    // ===== Tick =====

    /// Advances the engine: evicts hard-locked work, completes the active
    /// task when its deadline passed (promoting at most one queued id), and
    /// fires any due debounced or boundary saves. Call once per host frame
    /// or timer beat.
    pub fn tick(&mut self, local_now_ms: i64) -> TickOutcome {
        let mut out = TickOutcome::default();

        self.hard_lock_cleanup();

        if self.clock.is_ready() {
            let now = self.clock.now_ms(local_now_ms);
            let due = self
                .active
                .as_ref()
                .is_some_and(|active| now >= active.ends_at_ms);
            if due {
                if let Some(active) = self.active.take() {
                    self.completed.insert(active.id.clone());
                    out.completed = Some(active.id);
                }
                self.recompute_effects();

                if !self.queue.is_empty() {
                    let next = self.queue.remove(0);
                    match self.start_now(&next, local_now_ms) {
                        Ok(_) => out.promoted = Some(next),
                        Err(err) => {
                            log::warn!(
                                "queued research '{next}' could not start: {}",
                                err.code()
                            );
                            out.dropped = Some(next);
                        }
                    }
                }
                self.save_now(SaveReason::ResearchComplete);
            }
        }

        if self
            .debounce_due_ms
            .is_some_and(|due| local_now_ms >= due)
        {
            self.debounce_due_ms = None;
            if self.can_background_save() {
                self.save_now(SaveReason::Debounced);
            }
        }

        if self.autosave.poll(local_now_ms) {
            self.save_now(SaveReason::Autosave);
            out.autosaved = true;
            // Re-arm at the following boundary, success or not.
            self.sync_autosave(local_now_ms);
        }

        out
    }

    /// Drops hard-locked ids from the active slot and queue. Runs every tick
    /// but never during hydration, so a remote doc is not rewritten while it
    /// is being applied.
    fn hard_lock_cleanup(&mut self) {
        if self.session.hydrating {
            return;
        }
        let mut changed = false;

        if self
            .active
            .as_ref()
            .is_some_and(|a| self.hard_locked(&a.id))
        {
            self.active = None;
            changed = true;
        }

        let before = self.queue.len();
        let locked: Vec<String> = self
            .queue
            .iter()
            .filter(|id| self.hard_locked(id))
            .cloned()
            .collect();
        if !locked.is_empty() {
            self.queue.retain(|id| !locked.contains(id));
        }
        changed |= self.queue.len() != before;

        if changed {
            self.save_now(SaveReason::HardLockCleanup);
        }
    }

    fn recompute_effects(&mut self) {
        self.derived = DerivedEffects::recompute(&self.catalog, &self.completed);
        let limit = self.derived.queue_limit();
        if self.queue.len() > limit {
            self.queue.truncate(limit);
        }
    }

    // ===== Persistence =====

    fn can_commit(&self) -> bool {
        self.config.remote_enabled
            && self.session.uid.is_some()
            && self.session.loaded
            && !self.session.hydrating
    }

    fn can_background_save(&self) -> bool {
        self.save_enabled && self.can_commit()
    }

    fn serialize_doc(&self, reason: SaveReason) -> SaveDoc {
        let limit = self.derived.queue_limit();
        SaveDoc {
            version: SAVE_DOC_VERSION,
            first_unlock_transport_id: self.first_unlock.map(|t| t.as_str().to_string()),
            completed_research_ids: self.completed.iter().cloned().collect(),
            active_research: self.active.clone(),
            queued_research_ids: self.queue.iter().take(limit).cloned().collect(),
            last_save_reason: Some(reason.as_str().to_string()),
            ..SaveDoc::default()
        }
    }

    /// Commits the current state. Guests and half-hydrated sessions are a
    /// silent no-op; storage failures are logged, never propagated.
    pub fn save_now(&mut self, reason: SaveReason) {
        if !self.can_commit() {
            return;
        }
        self.debounce_due_ms = None;
        let doc = self.serialize_doc(reason);
        let Some(uid) = self.session.uid.clone() else {
            return;
        };
        let world = self.session.world.clone();
        if let Err(err) = self.store.save(&uid, &world, &doc) {
            log::error!("research save failed ({reason}): {err}");
        }
    }

    /// Arms the 800 ms write-coalescing deadline, if background saves are
    /// currently allowed.
    pub fn schedule_save(&mut self, local_now_ms: i64) {
        if !self.can_background_save() {
            return;
        }
        self.debounce_due_ms = Some(local_now_ms + SAVE_DEBOUNCE_MS);
    }

    fn apply_doc(&mut self, doc: &SaveDoc) {
        self.first_unlock = doc
            .first_unlock_transport_id
            .as_deref()
            .and_then(|s| s.parse().ok());

        self.completed = doc.completed_research_ids.iter().cloned().collect();

        self.active = doc
            .active_research
            .as_ref()
            .filter(|a| !a.id.is_empty())
            .cloned();

        let mut merged: SmallVec<[String; 5]> = SmallVec::new();
        for id in &doc.queued_research_ids {
            if !merged.iter().any(|q| q == id) {
                merged.push(id.clone());
            }
        }
        if let Some(legacy) = doc.queued_research_id.as_ref() {
            if !merged.iter().any(|q| q == legacy) {
                merged.push(legacy.clone());
            }
        }
        self.queue = merged;

        // Pre-research-tree saves tracked unlocks as transport lock flags.
        if self.completed.is_empty() {
            for t in &doc.transports {
                if t.locked {
                    continue;
                }
                let Ok(transport) = t.id.parse::<TransportId>() else {
                    continue;
                };
                if let Some(rid) = self.catalog.tier1_unlock_id(transport) {
                    self.completed.insert(rid.to_string());
                }
            }
        }

        self.recompute_effects();
    }

    /// Applies a document from the store (initial load or a remote echo).
    /// Hydration suppresses every save path while the state mutates.
    pub fn apply_remote(&mut self, doc: &SaveDoc, local_now_ms: i64) {
        self.session.hydrating = true;
        self.apply_doc(doc);
        self.session.hydrating = false;
        self.session.loading = false;
        self.session.loaded = true;
        self.sync_autosave_restart(local_now_ms);
    }

    /// Binds the engine to a signed-in user: loads their world document,
    /// migrating a legacy one or initializing a fresh one as needed.
    pub fn subscribe_for_user(&mut self, uid: &str, world: &str, local_now_ms: i64) {
        if uid.is_empty() {
            return;
        }
        self.unsubscribe();

        self.session.uid = Some(uid.to_string());
        self.session.world = normalize_world(world);

        if !self.config.remote_enabled {
            // Local mode: no store traffic at all.
            self.recompute_effects();
            self.session.loading = false;
            self.session.loaded = true;
            self.session.hydrating = false;
            self.autosave.stop();
            return;
        }

        self.session.loading = true;
        self.session.loaded = false;

        let world = self.session.world.clone();
        match self.store.load(uid, &world) {
            Ok(Some(doc)) => self.apply_remote(&doc, local_now_ms),
            Ok(None) => match self.migrate_legacy(uid, &world) {
                Some(doc) => self.apply_remote(&doc, local_now_ms),
                None => self.initialize_fresh_doc(uid, &world, local_now_ms),
            },
            Err(err) => {
                log::error!("research load failed for world '{world}': {err}");
                self.session.loading = false;
                self.session.loaded = false;
                self.autosave.stop();
            }
        }
    }

    /// Copies the pre-world document into the world partition, if one exists.
    fn migrate_legacy(&mut self, uid: &str, world: &str) -> Option<SaveDoc> {
        let legacy = match self.store.load_legacy(uid) {
            Ok(doc) => doc?,
            Err(err) => {
                log::error!("legacy research load failed: {err}");
                return None;
            }
        };
        let mut doc = legacy;
        doc.last_save_reason = Some(SaveReason::MigrateLegacy.as_str().to_string());
        if let Err(err) = self.store.save(uid, world, &doc) {
            log::error!("legacy research migration failed: {err}");
        }
        Some(doc)
    }

    /// First sign-in for this world: write an empty state document.
    fn initialize_fresh_doc(&mut self, uid: &str, world: &str, local_now_ms: i64) {
        self.recompute_effects();
        let doc = self.serialize_doc(SaveReason::Init);
        if let Err(err) = self.store.save(uid, world, &doc) {
            log::error!("research init save failed: {err}");
        }
        self.session.loading = false;
        self.session.loaded = true;
        self.sync_autosave_restart(local_now_ms);
    }

    /// Detaches from the current user without touching progression state.
    pub fn unsubscribe(&mut self) {
        self.debounce_due_ms = None;
        self.autosave.stop();
        self.session.uid = None;
        self.session.world = normalize_world(&self.config.default_world);
        self.session.loaded = false;
        self.session.loading = false;
        self.session.hydrating = false;
    }

    /// Sign-out to guest mode; alias of [`ResearchEngine::unsubscribe`] kept
    /// for hosts that distinguish the two transitions.
    pub fn become_guest(&mut self) {
        self.unsubscribe();
    }

    /// Full reset: session teardown plus wiping all progression state.
    pub fn clear_user_state(&mut self) {
        self.become_guest();
        self.first_unlock = None;
        self.completed.clear();
        self.active = None;
        self.queue.clear();
        self.recompute_effects();
    }

    // ===== Save settings =====

    /// Master toggle for background (debounced + autosave) commits. Explicit
    /// `save_now` calls stay allowed either way.
    pub fn set_save_enabled(&mut self, enabled: bool, local_now_ms: i64) {
        self.save_enabled = enabled;
        if enabled {
            self.sync_autosave(local_now_ms);
        } else {
            self.debounce_due_ms = None;
            self.autosave.stop();
        }
    }

    pub fn set_autosave_enabled(&mut self, enabled: bool, local_now_ms: i64) {
        self.autosave_settings.enabled = enabled;
        self.sync_autosave(local_now_ms);
    }

    pub fn set_autosave_base_min(&mut self, value: u32, local_now_ms: i64) {
        self.autosave_settings.set_base_min(value);
        self.sync_autosave_restart(local_now_ms);
    }

    pub fn set_autosave_interval_min(&mut self, value: u32, local_now_ms: i64) {
        self.autosave_settings.set_interval_min(value);
        self.sync_autosave_restart(local_now_ms);
    }

    fn autosave_allowed(&self) -> bool {
        self.config.remote_enabled
            && self.autosave_settings.enabled
            && self.save_enabled
            && self.session.uid.is_some()
            && self.session.loaded
            && !self.session.hydrating
    }

    fn sync_autosave(&mut self, local_now_ms: i64) {
        if self.autosave_allowed() {
            if !self.autosave.is_running() || self.autosave.next_due_ms().is_none() {
                self.autosave
                    .arm(self.autosave_settings.interval_min(), local_now_ms);
            }
        } else {
            self.autosave.stop();
        }
    }

    fn sync_autosave_restart(&mut self, local_now_ms: i64) {
        self.autosave.stop();
        self.sync_autosave(local_now_ms);
    }
}

/// `ceil(base * multiplier)` in whole seconds.
fn scale_duration(base_sec: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(base_sec) * multiplier).ceil();
    if scaled <= 0.0 { 0 } else { scaled as u32 }
}
