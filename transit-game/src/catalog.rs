//! Research catalog: node definitions, effect descriptors, and the builtin tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTE: u32 = 60;
const HOUR: u32 = 60 * MINUTE;

/// The six transport kinds the game ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportId {
    Bus,
    Truck,
    Rail,
    Plane,
    Ship,
    Spaceship,
}

impl TransportId {
    /// Display order used across the UI and save documents.
    pub const ALL: [Self; 6] = [
        Self::Bus,
        Self::Truck,
        Self::Rail,
        Self::Plane,
        Self::Ship,
        Self::Spaceship,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Rail => "rail",
            Self::Plane => "plane",
            Self::Ship => "ship",
            Self::Spaceship => "spaceship",
        }
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bus" => Ok(Self::Bus),
            "truck" => Ok(Self::Truck),
            "rail" => Ok(Self::Rail),
            "plane" => Ok(Self::Plane),
            "ship" => Ok(Self::Ship),
            "spaceship" => Ok(Self::Spaceship),
            _ => Err(()),
        }
    }
}

impl From<TransportId> for String {
    fn from(value: TransportId) -> Self {
        value.as_str().to_string()
    }
}

/// Whether a node's duration responds to research-speed discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimePolicy {
    /// Always runs for the raw catalog duration.
    Fixed,
    /// Scaled by the current research-duration multiplier.
    #[default]
    Scalable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    System,
    Efficiency,
    #[default]
    Transport,
    City,
    Real,
}

/// Gameplay surfaces toggled by feature-unlock effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    Vehicle,
    Route,
    Construction,
    Finance,
    City,
    PreviewAutoAssign,
}

impl FeatureKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Route => "route",
            Self::Construction => "construction",
            Self::Finance => "finance",
            Self::City => "city",
            Self::PreviewAutoAssign => "preview_auto_assign",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expansion rank; later variants strictly dominate earlier ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CityScale {
    #[default]
    None,
    Region,
    City,
    Country,
    State,
    Planet,
}

impl CityScale {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Region => "REGION",
            Self::City => "CITY",
            Self::Country => "COUNTRY",
            Self::State => "STATE",
            Self::Planet => "PLANET",
        }
    }

    /// Numeric rank used when folding completed nodes (max wins).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CityScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CityScale {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "REGION" => Ok(Self::Region),
            "CITY" => Ok(Self::City),
            "COUNTRY" => Ok(Self::Country),
            "STATE" => Ok(Self::State),
            "PLANET" => Ok(Self::Planet),
            _ => Err(()),
        }
    }
}

/// Preview-run assignment mode. `Auto` dominates `Manual` when folding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewRunMode {
    #[default]
    Manual,
    Auto,
}

/// Starter-fleet preview configuration carried on the unlocking node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFleetConfig {
    pub transports: Vec<TransportId>,
    pub run_min_sec: u32,
    pub run_max_sec: u32,
    pub count_per_transport: u8,
    #[serde(default)]
    pub mode: PreviewRunMode,
}

/// Declarative effect descriptors attached to research nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    UnlockTransportTier { transport: TransportId, tier: u8 },
    IncomeMultiplier { value: f64 },
    ResearchSpeedLevel { level: u8 },
    QueueReserveLevel { level: u8 },
    UnlockFeature { feature: FeatureKey },
    CityScaleRank { scale: CityScale },
    UnlockStarterFleetPreview { config: PreviewFleetConfig },
    SetPreviewRunMode { mode: PreviewRunMode },
    GrantStarterVehicle { transport: TransportId, count: u8 },
}

/// A single research definition. Catalog data is immutable at runtime;
/// player progress lives in the engine, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub time_policy: TimePolicy,
    pub tier: u8,
    pub duration_sec: u32,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub reveal_after: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

const fn default_true() -> bool {
    true
}

impl ResearchNode {
    /// The transport this node unlocks at tier 1, if it is such a node.
    #[must_use]
    pub fn tier1_transport_unlock(&self) -> Option<TransportId> {
        if self.tier != 1 {
            return None;
        }
        self.effects.iter().find_map(|e| match e {
            Effect::UnlockTransportTier { transport, tier: 1 } => Some(*transport),
            _ => None,
        })
    }

    /// The starter-fleet preview config, if this node carries one.
    #[must_use]
    pub fn starter_fleet_preview(&self) -> Option<&PreviewFleetConfig> {
        self.effects.iter().find_map(|e| match e {
            Effect::UnlockStarterFleetPreview { config } => Some(config),
            _ => None,
        })
    }

    /// Fixed-duration nodes ignore speed discounts; all SYSTEM nodes are
    /// treated as fixed regardless of their declared policy.
    #[must_use]
    pub fn is_fixed_duration(&self) -> bool {
        self.time_policy == TimePolicy::Fixed || self.node_type == NodeType::System
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate research id '{0}'")]
    DuplicateId(String),
    #[error("research '{node}' requires unknown id '{prereq}'")]
    UnknownPrerequisite { node: String, prereq: String },
    #[error("research '{node}' reveals after unknown id '{trigger}'")]
    UnknownRevealTrigger { node: String, trigger: String },
}

/// Validated, id-indexed set of research nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    nodes: Vec<ResearchNode>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate ids and dangling references.
    ///
    /// # Errors
    /// Returns `CatalogError` when two nodes share an id or a `requires` /
    /// `reveal_after` entry names a node that does not exist.
    pub fn new(nodes: Vec<ResearchNode>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(node.id.clone()));
            }
        }
        for node in &nodes {
            for prereq in &node.requires {
                if !index.contains_key(prereq) {
                    return Err(CatalogError::UnknownPrerequisite {
                        node: node.id.clone(),
                        prereq: prereq.clone(),
                    });
                }
            }
            for trigger in &node.reveal_after {
                if !index.contains_key(trigger) {
                    return Err(CatalogError::UnknownRevealTrigger {
                        node: node.id.clone(),
                        trigger: trigger.clone(),
                    });
                }
            }
        }
        Ok(Self { nodes, index })
    }

    /// The shipping research tree.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_nodes()).expect("builtin catalog is internally consistent")
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ResearchNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn nodes(&self) -> &[ResearchNode] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The enabled tier-1 unlock node for a transport, if any.
    #[must_use]
    pub fn tier1_unlock_id(&self, transport: TransportId) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.enabled && n.tier1_transport_unlock() == Some(transport))
            .map(|n| n.id.as_str())
    }

    /// Transports that have any tier-1 unlock node, in catalog order.
    /// These are the candidates for the first-unlock choice.
    #[must_use]
    pub fn tier1_transports(&self) -> Vec<TransportId> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if let Some(t) = node.tier1_transport_unlock() {
                if !out.contains(&t) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// Nodes that carry a starter-fleet preview effect, in catalog order.
    pub fn starter_fleet_nodes(&self) -> impl Iterator<Item = (&str, &PreviewFleetConfig)> {
        self.nodes
            .iter()
            .filter_map(|n| n.starter_fleet_preview().map(|cfg| (n.id.as_str(), cfg)))
    }
}

fn sys_feature_unlock(id: &str, feature: FeatureKey) -> ResearchNode {
    ResearchNode {
        id: id.to_string(),
        node_type: NodeType::System,
        time_policy: TimePolicy::Fixed,
        tier: 1,
        duration_sec: 8 * HOUR,
        requires: Vec::new(),
        reveal_after: Vec::new(),
        enabled: false,
        effects: vec![Effect::UnlockFeature { feature }],
    }
}

fn city_scale_node(id: &str, scale: CityScale, duration_sec: u32, prev: Option<&str>) -> ResearchNode {
    let mut requires = vec!["sys_unlock_city".to_string()];
    if let Some(prev) = prev {
        requires.push(prev.to_string());
    }
    ResearchNode {
        id: id.to_string(),
        node_type: NodeType::City,
        time_policy: TimePolicy::Scalable,
        tier: 1,
        duration_sec,
        requires,
        reveal_after: vec!["sys_unlock_city".to_string()],
        enabled: true,
        effects: vec![Effect::CityScaleRank { scale }],
    }
}

fn transport_unlock(
    id: &str,
    transport: TransportId,
    duration_sec: u32,
    requires: &[&str],
    reveal_after: &[&str],
) -> ResearchNode {
    ResearchNode {
        id: id.to_string(),
        node_type: NodeType::Transport,
        time_policy: TimePolicy::Scalable,
        tier: 1,
        duration_sec,
        requires: requires.iter().map(ToString::to_string).collect(),
        reveal_after: reveal_after.iter().map(ToString::to_string).collect(),
        enabled: true,
        effects: vec![
            Effect::UnlockTransportTier { transport, tier: 1 },
            Effect::GrantStarterVehicle { transport, count: 1 },
        ],
    }
}

fn research_speed(id: &str, level: u8, duration_sec: u32, prev: Option<&str>) -> ResearchNode {
    ResearchNode {
        id: id.to_string(),
        node_type: NodeType::Efficiency,
        time_policy: TimePolicy::Scalable,
        tier: 1,
        duration_sec,
        requires: prev.map(ToString::to_string).into_iter().collect(),
        reveal_after: Vec::new(),
        enabled: true,
        effects: vec![Effect::ResearchSpeedLevel { level }],
    }
}

fn builtin_nodes() -> Vec<ResearchNode> {
    let mut nodes = vec![
        sys_feature_unlock("sys_unlock_vehicle", FeatureKey::Vehicle),
        sys_feature_unlock("sys_unlock_route", FeatureKey::Route),
        sys_feature_unlock("sys_unlock_construction", FeatureKey::Construction),
        sys_feature_unlock("sys_unlock_finance", FeatureKey::Finance),
        sys_feature_unlock("sys_unlock_city", FeatureKey::City),
        ResearchNode {
            id: "sys_preview_starter_vehicles".to_string(),
            node_type: NodeType::System,
            time_policy: TimePolicy::Scalable,
            tier: 1,
            duration_sec: 30 * MINUTE,
            requires: Vec::new(),
            reveal_after: Vec::new(),
            enabled: true,
            effects: vec![Effect::UnlockStarterFleetPreview {
                config: PreviewFleetConfig {
                    transports: vec![TransportId::Bus, TransportId::Truck, TransportId::Rail],
                    run_min_sec: 30 * MINUTE,
                    run_max_sec: 3 * HOUR,
                    count_per_transport: 1,
                    mode: PreviewRunMode::Manual,
                },
            }],
        },
        ResearchNode {
            id: "sys_preview_auto_assign".to_string(),
            node_type: NodeType::System,
            time_policy: TimePolicy::Scalable,
            tier: 1,
            duration_sec: HOUR,
            requires: vec!["sys_preview_starter_vehicles".to_string()],
            reveal_after: Vec::new(),
            enabled: true,
            effects: vec![
                Effect::UnlockFeature {
                    feature: FeatureKey::PreviewAutoAssign,
                },
                Effect::SetPreviewRunMode {
                    mode: PreviewRunMode::Auto,
                },
            ],
        },
        city_scale_node("city_scale_region", CityScale::Region, 4 * HOUR, None),
        city_scale_node(
            "city_scale_city",
            CityScale::City,
            8 * HOUR,
            Some("city_scale_region"),
        ),
        city_scale_node(
            "city_scale_country",
            CityScale::Country,
            12 * HOUR,
            Some("city_scale_city"),
        ),
        city_scale_node(
            "city_scale_state",
            CityScale::State,
            16 * HOUR,
            Some("city_scale_country"),
        ),
        city_scale_node(
            "city_scale_planet",
            CityScale::Planet,
            24 * HOUR,
            Some("city_scale_state"),
        ),
        transport_unlock("unlock_bus_t1", TransportId::Bus, HOUR, &[], &[]),
        transport_unlock("unlock_truck_t1", TransportId::Truck, HOUR, &[], &[]),
        transport_unlock("unlock_rail_t1", TransportId::Rail, HOUR, &[], &[]),
        transport_unlock(
            "unlock_plane_t1",
            TransportId::Plane,
            2 * HOUR,
            &["sys_unlock_city", "city_scale_city"],
            &["sys_unlock_city"],
        ),
        transport_unlock(
            "unlock_ship_t1",
            TransportId::Ship,
            2 * HOUR,
            &["sys_unlock_city", "city_scale_country"],
            &["sys_unlock_city"],
        ),
        transport_unlock(
            "unlock_spaceship_t1",
            TransportId::Spaceship,
            3 * HOUR,
            &["sys_unlock_city", "city_scale_planet"],
            &["sys_unlock_city"],
        ),
        research_speed("rs_1", 1, HOUR, None),
        research_speed("rs_2", 2, 2 * HOUR, Some("rs_1")),
        research_speed("rs_3", 3, 4 * HOUR, Some("rs_2")),
        research_speed("rs_4", 4, 8 * HOUR, Some("rs_3")),
        research_speed("rs_5", 5, 16 * HOUR, Some("rs_4")),
    ];
    nodes.push(ResearchNode {
        id: "t2_transport_foundation".to_string(),
        node_type: NodeType::Transport,
        time_policy: TimePolicy::Scalable,
        tier: 2,
        duration_sec: 12 * HOUR,
        requires: Vec::new(),
        reveal_after: Vec::new(),
        enabled: false,
        effects: Vec::new(),
    });
    nodes
}
