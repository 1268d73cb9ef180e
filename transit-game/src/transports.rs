//! Transport unlock surface: per-transport state rows and the preview-run
//! gating context, both derived from the research engine.

use crate::catalog::TransportId;
use crate::engine::{ResearchEngine, StartError, StartOutcome};
use crate::persist::ResearchStore;
use crate::preview::{PreviewContext, RUN_MAX_SEC, RUN_MIN_SEC};
use std::collections::BTreeSet;

/// One transport's row in the unlock/preview UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportInfo {
    pub id: TransportId,
    /// No tier unlocked yet.
    pub locked: bool,
    /// Its tier-1 unlock research is the active task.
    pub researching: bool,
    pub unlock_research_id: Option<String>,
    /// Named by the starter-fleet preview config.
    pub preview_eligible: bool,
    /// Eligible, unlocked, and preview research completed.
    pub preview_active: bool,
}

/// Derives the full transport list in display order.
#[must_use]
pub fn transport_infos<S: ResearchStore>(engine: &ResearchEngine<S>) -> Vec<TransportInfo> {
    let derived = engine.derived();
    let eligible: BTreeSet<TransportId> = derived
        .preview
        .as_ref()
        .map(|cfg| cfg.transports.iter().copied().collect())
        .unwrap_or_default();

    TransportId::ALL
        .iter()
        .map(|&id| {
            let locked = derived.unlocked_tier(id) < 1;
            let unlock_research_id = engine.catalog().tier1_unlock_id(id).map(ToString::to_string);
            let researching = unlock_research_id
                .as_deref()
                .zip(engine.active())
                .is_some_and(|(rid, active)| active.id == rid);
            let preview_eligible = eligible.contains(&id);
            TransportInfo {
                id,
                locked,
                researching,
                unlock_research_id,
                preview_eligible,
                preview_active: derived.preview_unlocked && !locked && preview_eligible,
            }
        })
        .collect()
}

/// Builds the gating context the preview board consumes each tick. Transport
/// eligibility here is the single source of truth; the board itself never
/// inspects research state.
#[must_use]
pub fn preview_context<S: ResearchStore>(engine: &ResearchEngine<S>) -> PreviewContext {
    let derived = engine.derived();
    let (run_min_sec, run_max_sec) = derived
        .preview
        .as_ref()
        .map_or((RUN_MIN_SEC, RUN_MAX_SEC), |cfg| {
            (cfg.run_min_sec, cfg.run_max_sec)
        });
    let active = transport_infos(engine)
        .into_iter()
        .filter(|info| info.preview_active)
        .map(|info| info.id)
        .collect();
    PreviewContext {
        preview_unlocked: derived.preview_unlocked,
        auto_unlocked: derived.preview_run_mode == crate::catalog::PreviewRunMode::Auto,
        active,
        run_min_sec,
        run_max_sec,
    }
}

/// Starts (or queues) the tier-1 unlock research for a transport.
///
/// # Errors
/// `UnknownResearch` when the catalog has no such unlock node, otherwise
/// whatever the engine refuses the start with.
pub fn start_transport_unlock<S: ResearchStore>(
    engine: &mut ResearchEngine<S>,
    transport: TransportId,
    local_now_ms: i64,
) -> Result<StartOutcome, StartError> {
    let Some(rid) = engine
        .catalog()
        .tier1_unlock_id(transport)
        .map(ToString::to_string)
    else {
        return Err(StartError::UnknownResearch);
    };
    engine.start_research(&rid, local_now_ms)
}
