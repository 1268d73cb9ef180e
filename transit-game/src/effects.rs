//! Effect resolver: folds the completed-research set into derived game state.

use crate::catalog::{
    Catalog, CityScale, Effect, FeatureKey, PreviewFleetConfig, PreviewRunMode, TransportId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Flat per-level discount on scalable research durations.
pub const RESEARCH_DISCOUNT_PER_LEVEL: f64 = 0.05;
/// Durations never drop below this fraction of the catalog value.
pub const MIN_DURATION_MULTIPLIER: f64 = 0.20;

/// Queue capacity for a given queue-reserve level (clamped to 1..=3).
#[must_use]
pub const fn queue_limit_for_level(level: u8) -> usize {
    match level {
        0 | 1 => 1,
        2 => 3,
        _ => 5,
    }
}

/// Feature surfaces currently switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet {
    pub vehicle: bool,
    pub route: bool,
    pub construction: bool,
    pub finance: bool,
    pub city: bool,
    pub preview_auto_assign: bool,
}

impl FeatureSet {
    #[must_use]
    pub const fn enabled(self, key: FeatureKey) -> bool {
        match key {
            FeatureKey::Vehicle => self.vehicle,
            FeatureKey::Route => self.route,
            FeatureKey::Construction => self.construction,
            FeatureKey::Finance => self.finance,
            FeatureKey::City => self.city,
            FeatureKey::PreviewAutoAssign => self.preview_auto_assign,
        }
    }

    const fn set(&mut self, key: FeatureKey) {
        match key {
            FeatureKey::Vehicle => self.vehicle = true,
            FeatureKey::Route => self.route = true,
            FeatureKey::Construction => self.construction = true,
            FeatureKey::Finance => self.finance = true,
            FeatureKey::City => self.city = true,
            FeatureKey::PreviewAutoAssign => self.preview_auto_assign = true,
        }
    }
}

/// Everything derived from the completed set. Recomputed wholesale after any
/// completion; order of completion never matters.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedEffects {
    /// Highest unlocked tier per transport; absent means locked.
    pub transport_tiers: BTreeMap<TransportId, u8>,
    pub income_multiplier: f64,
    pub research_speed_level: u8,
    pub research_duration_multiplier: f64,
    pub queue_reserve_level: u8,
    pub city_scale: CityScale,
    pub features: FeatureSet,
    /// True once any starter-fleet preview node is completed.
    pub preview_unlocked: bool,
    /// Active preview config: the completed node's, else the first catalog
    /// candidate's (so the UI can describe it before the unlock).
    pub preview: Option<PreviewFleetConfig>,
    pub preview_run_mode: PreviewRunMode,
    /// Starter vehicles granted by completed unlocks, per transport.
    pub starter_grants: BTreeMap<TransportId, u8>,
}

impl Default for DerivedEffects {
    fn default() -> Self {
        Self {
            transport_tiers: BTreeMap::new(),
            income_multiplier: 1.0,
            research_speed_level: 0,
            research_duration_multiplier: 1.0,
            queue_reserve_level: 1,
            city_scale: CityScale::None,
            features: FeatureSet::default(),
            preview_unlocked: false,
            preview: None,
            preview_run_mode: PreviewRunMode::Manual,
            starter_grants: BTreeMap::new(),
        }
    }
}

impl DerivedEffects {
    /// Folds every effect of every completed node: tiers/levels/scale take the
    /// max, income multiplies, features OR together.
    #[must_use]
    pub fn recompute(catalog: &Catalog, completed: &BTreeSet<String>) -> Self {
        let mut out = Self::default();
        for id in completed {
            let Some(node) = catalog.get(id) else { continue };
            for effect in &node.effects {
                out.apply(effect);
            }
        }
        out.research_duration_multiplier = duration_multiplier(out.research_speed_level);
        if out.preview.is_none() {
            out.preview = catalog
                .starter_fleet_nodes()
                .next()
                .map(|(_, cfg)| cfg.clone());
        }
        out
    }

    fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::UnlockTransportTier { transport, tier } => {
                let entry = self.transport_tiers.entry(*transport).or_insert(0);
                *entry = (*entry).max(*tier);
            }
            Effect::IncomeMultiplier { value } => self.income_multiplier *= value,
            Effect::ResearchSpeedLevel { level } => {
                self.research_speed_level = self.research_speed_level.max(*level);
            }
            Effect::QueueReserveLevel { level } => {
                self.queue_reserve_level = self.queue_reserve_level.max(*level);
            }
            Effect::UnlockFeature { feature } => self.features.set(*feature),
            Effect::CityScaleRank { scale } => {
                self.city_scale = self.city_scale.max(*scale);
            }
            Effect::UnlockStarterFleetPreview { config } => {
                self.preview_unlocked = true;
                self.preview = Some(config.clone());
            }
            Effect::SetPreviewRunMode { mode } => {
                self.preview_run_mode = self.preview_run_mode.max(*mode);
            }
            Effect::GrantStarterVehicle { transport, count } => {
                *self.starter_grants.entry(*transport).or_insert(0) += count;
            }
        }
    }

    /// Highest unlocked tier for a transport (0 when locked).
    #[must_use]
    pub fn unlocked_tier(&self, transport: TransportId) -> u8 {
        self.transport_tiers.get(&transport).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn queue_limit(&self) -> usize {
        queue_limit_for_level(self.queue_reserve_level)
    }
}

/// `max(0.20, 1 - 0.05 * level)`.
#[must_use]
pub fn duration_multiplier(speed_level: u8) -> f64 {
    (1.0 - RESEARCH_DISCOUNT_PER_LEVEL * f64::from(speed_level)).max(MIN_DURATION_MULTIPLIER)
}
