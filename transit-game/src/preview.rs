//! Preview-run scheduler: short demo hauls for starter transports, one run
//! per transport, with manual restarts until automation research lands.

use crate::catalog::TransportId;
use crate::timefmt::format_remaining_ms;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default run-duration bounds, used when the catalog config names none.
pub const RUN_MIN_SEC: u32 = 30 * 60;
pub const RUN_MAX_SEC: u32 = 3 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Never started (or policy-frozen).
    #[default]
    Idle,
    Running,
    /// Finished and waiting for a manual restart.
    Ready,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Ready => "ready",
        }
    }
}

/// One transport's preview run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRun {
    pub transport_id: TransportId,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    #[serde(default)]
    pub ends_at_ms: Option<i64>,
    #[serde(default)]
    pub duration_sec: u32,
}

impl PreviewRun {
    #[must_use]
    pub fn idle(transport_id: TransportId) -> Self {
        Self {
            transport_id,
            status: RunStatus::Idle,
            started_at_ms: None,
            ends_at_ms: None,
            duration_sec: 0,
        }
    }
}

/// Gating inputs the board needs each tick, derived from research state (see
/// `transports::preview_context`). The board itself never reads the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewContext {
    /// Starter-fleet preview research completed.
    pub preview_unlocked: bool,
    /// Auto-assign research completed: runs chain without player input.
    pub auto_unlocked: bool,
    /// Transports currently eligible for preview runs.
    pub active: BTreeSet<TransportId>,
    pub run_min_sec: u32,
    pub run_max_sec: u32,
}

impl PreviewContext {
    /// Context for a player with no preview research at all.
    #[must_use]
    pub fn locked() -> Self {
        Self {
            preview_unlocked: false,
            auto_unlocked: false,
            active: BTreeSet::new(),
            run_min_sec: RUN_MIN_SEC,
            run_max_sec: RUN_MAX_SEC,
        }
    }
}

/// Locally persisted run map (per device, guests included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSave {
    #[serde(default)]
    pub runs: BTreeMap<TransportId, PreviewRun>,
}

/// The per-transport run board. Time is injected; the board keeps the last
/// tick's clock so countdowns render without re-ticking.
#[derive(Debug)]
pub struct PreviewBoard {
    runs: BTreeMap<TransportId, PreviewRun>,
    clock_ms: i64,
    rng: Option<ChaCha20Rng>,
}

impl Default for PreviewBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewBoard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: BTreeMap::new(),
            clock_ms: 0,
            rng: None,
        }
    }

    /// Deterministic board for tests and replays.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            runs: BTreeMap::new(),
            clock_ms: 0,
            rng: Some(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    #[must_use]
    pub fn from_save(save: PreviewSave) -> Self {
        Self {
            runs: save.runs,
            clock_ms: 0,
            rng: None,
        }
    }

    #[must_use]
    pub fn to_save(&self) -> PreviewSave {
        PreviewSave {
            runs: self.runs.clone(),
        }
    }

    #[must_use]
    pub fn clock_ms(&self) -> i64 {
        self.clock_ms
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    fn draw_duration_sec(&mut self, ctx: &PreviewContext) -> u32 {
        let (min, max) = if ctx.run_min_sec <= ctx.run_max_sec {
            (ctx.run_min_sec, ctx.run_max_sec)
        } else {
            (ctx.run_max_sec, ctx.run_min_sec)
        };
        let rng = self.rng.get_or_insert_with(ChaCha20Rng::from_entropy);
        rng.gen_range(min..=max)
    }

    fn start_run_now(&mut self, transport: TransportId, now_ms: i64, ctx: &PreviewContext) {
        let duration_sec = self.draw_duration_sec(ctx);
        self.runs.insert(
            transport,
            PreviewRun {
                transport_id: transport,
                status: RunStatus::Running,
                started_at_ms: Some(now_ms),
                ends_at_ms: Some(now_ms + i64::from(duration_sec) * 1000),
                duration_sec,
            },
        );
    }

    /// Advances the board one beat. Spawns first runs for newly eligible
    /// transports, finishes due runs (freezing to ready, or chaining straight
    /// into a fresh draw under automation), and recovers stalled runs once
    /// automation is on. Ineligible transports are skipped entirely, never
    /// deleted. Returns whether anything changed (the host's cue to persist).
    pub fn tick(&mut self, now_ms: i64, ctx: &PreviewContext) -> bool {
        self.clock_ms = now_ms;
        if !ctx.preview_unlocked {
            return false;
        }
        let mut changed = false;

        for &transport in &ctx.active {
            if !self.runs.contains_key(&transport) {
                self.start_run_now(transport, now_ms, ctx);
                changed = true;
            }
        }

        let ids: Vec<TransportId> = self.runs.keys().copied().collect();
        for transport in ids {
            if !ctx.active.contains(&transport) {
                continue;
            }
            let Some(run) = self.runs.get(&transport) else {
                continue;
            };
            match run.status {
                RunStatus::Running => {
                    let end = run.ends_at_ms.filter(|&e| e > 0);
                    let Some(end) = end else {
                        // Corrupt local data: no deadline to wait for.
                        if ctx.auto_unlocked {
                            self.start_run_now(transport, now_ms, ctx);
                            changed = true;
                        }
                        continue;
                    };
                    if now_ms >= end {
                        if ctx.auto_unlocked {
                            self.start_run_now(transport, now_ms, ctx);
                        } else if let Some(run) = self.runs.get_mut(&transport) {
                            run.status = RunStatus::Ready;
                            run.started_at_ms = None;
                            run.ends_at_ms = Some(end);
                        }
                        changed = true;
                    }
                }
                RunStatus::Idle | RunStatus::Ready => {
                    // Automation sweeps up runs that finished (or stalled)
                    // before it was researched.
                    if ctx.auto_unlocked {
                        self.start_run_now(transport, now_ms, ctx);
                        changed = true;
                    }
                }
            }
        }

        changed
    }

    /// Player restart of a ready run. Refused while preview is locked, for
    /// ineligible transports, once automation owns the board, and for runs
    /// not in the ready state.
    pub fn start_manual_run(
        &mut self,
        transport: TransportId,
        now_ms: i64,
        ctx: &PreviewContext,
    ) -> bool {
        if !ctx.preview_unlocked {
            return false;
        }
        if !ctx.active.contains(&transport) {
            return false;
        }
        if ctx.auto_unlocked {
            return false;
        }
        let ready = self
            .runs
            .get(&transport)
            .is_some_and(|r| r.status == RunStatus::Ready);
        if !ready {
            return false;
        }
        self.start_run_now(transport, now_ms, ctx);
        self.clock_ms = now_ms;
        true
    }

    /// Remaining time against the last tick's clock; 0 for anything that is
    /// not an eligible running transport.
    #[must_use]
    pub fn remaining_ms(&self, transport: TransportId, ctx: &PreviewContext) -> i64 {
        if !ctx.active.contains(&transport) {
            return 0;
        }
        let Some(run) = self.runs.get(&transport) else {
            return 0;
        };
        if run.status != RunStatus::Running {
            return 0;
        }
        match run.ends_at_ms.filter(|&e| e > 0) {
            Some(end) => (end - self.clock_ms).max(0),
            None => 0,
        }
    }

    #[must_use]
    pub fn remaining_of(&self, transport: TransportId, ctx: &PreviewContext) -> String {
        format_remaining_ms(self.remaining_ms(transport, ctx))
    }

    /// Ineligible transports always read as idle, whatever is stored.
    #[must_use]
    pub fn status_of(&self, transport: TransportId, ctx: &PreviewContext) -> RunStatus {
        if !ctx.active.contains(&transport) {
            return RunStatus::Idle;
        }
        self.runs
            .get(&transport)
            .map_or(RunStatus::Idle, |r| r.status)
    }

    /// Eligible runs sorted by transport id string, the order the UI lists.
    #[must_use]
    pub fn run_list(&self, ctx: &PreviewContext) -> Vec<&PreviewRun> {
        let mut list: Vec<&PreviewRun> = self
            .runs
            .values()
            .filter(|r| ctx.active.contains(&r.transport_id))
            .collect();
        list.sort_by_key(|r| r.transport_id.as_str());
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn ctx(auto: bool, transports: &[TransportId]) -> PreviewContext {
        PreviewContext {
            preview_unlocked: true,
            auto_unlocked: auto,
            active: transports.iter().copied().collect(),
            run_min_sec: RUN_MIN_SEC,
            run_max_sec: RUN_MAX_SEC,
        }
    }

    #[test]
    fn locked_preview_never_spawns() {
        let mut board = PreviewBoard::with_seed(1);
        assert!(!board.tick(T0, &PreviewContext::locked()));
        assert!(board.to_save().runs.is_empty());
    }

    #[test]
    fn durations_stay_inside_the_bounds() {
        let mut board = PreviewBoard::with_seed(7);
        let ctx = ctx(true, &[TransportId::Bus]);
        for i in 0..500 {
            board.clear();
            board.tick(T0 + i, &ctx);
            let save = board.to_save();
            let run = &save.runs[&TransportId::Bus];
            assert!(run.duration_sec >= RUN_MIN_SEC);
            assert!(run.duration_sec <= RUN_MAX_SEC);
            assert_eq!(
                run.ends_at_ms.unwrap() - run.started_at_ms.unwrap(),
                i64::from(run.duration_sec) * 1000
            );
        }
    }

    #[test]
    fn first_tick_spawns_one_run_per_eligible_transport() {
        let mut board = PreviewBoard::with_seed(2);
        let ctx = ctx(false, &[TransportId::Bus, TransportId::Rail]);
        assert!(board.tick(T0, &ctx));
        assert_eq!(board.to_save().runs.len(), 2);
        assert_eq!(board.status_of(TransportId::Bus, &ctx), RunStatus::Running);
        // Already spawned: a second tick changes nothing.
        assert!(!board.tick(T0 + 1_000, &ctx));
    }

    #[test]
    fn manual_mode_freezes_to_ready_and_keeps_the_end_time() {
        let mut board = PreviewBoard::with_seed(3);
        let ctx = ctx(false, &[TransportId::Bus]);
        board.tick(T0, &ctx);
        let end = board.to_save().runs[&TransportId::Bus].ends_at_ms.unwrap();

        assert!(board.tick(end, &ctx));
        let run = board.to_save().runs[&TransportId::Bus].clone();
        assert_eq!(run.status, RunStatus::Ready);
        assert_eq!(run.started_at_ms, None);
        assert_eq!(run.ends_at_ms, Some(end));
        assert_eq!(board.remaining_ms(TransportId::Bus, &ctx), 0);

        // Manual restart draws a fresh duration.
        assert!(board.start_manual_run(TransportId::Bus, end + 5_000, &ctx));
        assert_eq!(board.status_of(TransportId::Bus, &ctx), RunStatus::Running);
        assert_eq!(
            board.to_save().runs[&TransportId::Bus].started_at_ms,
            Some(end + 5_000)
        );
    }

    #[test]
    fn auto_mode_chains_runs_without_a_gap() {
        let mut board = PreviewBoard::with_seed(4);
        let ctx = ctx(true, &[TransportId::Truck]);
        board.tick(T0, &ctx);
        let end = board.to_save().runs[&TransportId::Truck].ends_at_ms.unwrap();

        assert!(board.tick(end + 250, &ctx));
        let run = board.to_save().runs[&TransportId::Truck].clone();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.started_at_ms, Some(end + 250));
    }

    #[test]
    fn automation_recovers_ready_and_stalled_runs() {
        let mut board = PreviewBoard::with_seed(5);
        let manual = ctx(false, &[TransportId::Bus]);
        board.tick(T0, &manual);
        let end = board.to_save().runs[&TransportId::Bus].ends_at_ms.unwrap();
        board.tick(end, &manual);
        assert_eq!(board.status_of(TransportId::Bus, &manual), RunStatus::Ready);

        // Auto-assign research completes: next tick re-arms the ready run.
        let auto = ctx(true, &[TransportId::Bus]);
        assert!(board.tick(end + 60_000, &auto));
        assert_eq!(board.status_of(TransportId::Bus, &auto), RunStatus::Running);
    }

    #[test]
    fn stalled_running_entry_without_deadline_is_redrawn_under_auto() {
        let mut save = PreviewSave::default();
        save.runs.insert(
            TransportId::Bus,
            PreviewRun {
                transport_id: TransportId::Bus,
                status: RunStatus::Running,
                started_at_ms: Some(T0),
                ends_at_ms: None,
                duration_sec: 0,
            },
        );
        let mut board = PreviewBoard::from_save(save);
        board.rng = Some(ChaCha20Rng::seed_from_u64(6));

        let manual = ctx(false, &[TransportId::Bus]);
        assert!(!board.tick(T0 + 1_000, &manual));
        assert_eq!(board.remaining_ms(TransportId::Bus, &manual), 0);

        let auto = ctx(true, &[TransportId::Bus]);
        assert!(board.tick(T0 + 2_000, &auto));
        assert!(board.to_save().runs[&TransportId::Bus].ends_at_ms.is_some());
    }

    #[test]
    fn ineligible_transports_are_frozen_and_hidden_but_kept() {
        let mut board = PreviewBoard::with_seed(8);
        let both = ctx(false, &[TransportId::Bus, TransportId::Rail]);
        board.tick(T0, &both);

        // Rail drops out of eligibility (research state changed server-side).
        let bus_only = ctx(false, &[TransportId::Bus]);
        let rail_end = board.to_save().runs[&TransportId::Rail].ends_at_ms.unwrap();
        board.tick(rail_end + 1, &bus_only);

        // Frozen in place, reported idle, hidden from the list, not deleted.
        assert_eq!(board.status_of(TransportId::Rail, &bus_only), RunStatus::Idle);
        assert_eq!(board.remaining_ms(TransportId::Rail, &bus_only), 0);
        let list = board.run_list(&bus_only);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].transport_id, TransportId::Bus);
        assert_eq!(
            board.to_save().runs[&TransportId::Rail].status,
            RunStatus::Running
        );
    }

    #[test]
    fn manual_start_rejections() {
        let mut board = PreviewBoard::with_seed(9);
        let manual = ctx(false, &[TransportId::Bus]);
        board.tick(T0, &manual);

        // Still running.
        assert!(!board.start_manual_run(TransportId::Bus, T0 + 1, &manual));
        // Ineligible transport.
        assert!(!board.start_manual_run(TransportId::Ship, T0 + 1, &manual));
        // Preview locked entirely.
        assert!(!board.start_manual_run(TransportId::Bus, T0 + 1, &PreviewContext::locked()));

        let end = board.to_save().runs[&TransportId::Bus].ends_at_ms.unwrap();
        board.tick(end, &manual);
        // Automation owns the board now.
        let auto = ctx(true, &[TransportId::Bus]);
        assert!(!board.start_manual_run(TransportId::Bus, end + 1, &auto));
        // And the plain happy path still works.
        assert!(board.start_manual_run(TransportId::Bus, end + 1, &manual));
    }

    #[test]
    fn run_list_sorts_by_transport_id_string() {
        let mut board = PreviewBoard::with_seed(10);
        let ctx = ctx(
            false,
            &[TransportId::Truck, TransportId::Bus, TransportId::Rail],
        );
        board.tick(T0, &ctx);
        let order: Vec<&str> = board
            .run_list(&ctx)
            .iter()
            .map(|r| r.transport_id.as_str())
            .collect();
        assert_eq!(order, ["bus", "rail", "truck"]);
    }

    #[test]
    fn save_round_trips_through_json() {
        let mut board = PreviewBoard::with_seed(11);
        let ctx = ctx(false, &[TransportId::Bus, TransportId::Spaceship]);
        board.tick(T0, &ctx);
        let save = board.to_save();
        let json = serde_json::to_string(&save).unwrap();
        assert!(json.contains("\"bus\""));
        let back: PreviewSave = serde_json::from_str(&json).unwrap();
        assert_eq!(back, save);
        assert_eq!(PreviewBoard::from_save(back).to_save(), save);
    }
}
