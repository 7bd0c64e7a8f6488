//! Tier resolution — turns a lane's waterfall into ordered dispatch stages.
//!
//! Custom tiers always come first, ordered by their `order` rank. Carriers
//! outside every custom tier follow, either grouped by identical rate
//! (auto-tier, cheapest first) or one per stage in entry order.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use tender_core::{ConfigError, ConfigResult, CustomTier, Lane, Rate, WaterfallEntry};

/// How a stage was formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageKind {
    /// A user-defined custom tier.
    Custom { tier_id: String, tier_name: String },
    /// Carriers auto-grouped by identical rate.
    AutoRate { rate: Rate },
    /// A single carrier with auto-tiering disabled.
    Single,
}

/// One step of the waterfall: carriers offered simultaneously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub members: Vec<WaterfallEntry>,
    /// Minimum of the members' windows, so no member is offered past its
    /// own limit.
    pub response_window_mins: u32,
}

/// A stage member, as carried by a [`Stage`].
pub type StageMember = WaterfallEntry;

impl Stage {
    fn from_members(kind: StageKind, members: Vec<WaterfallEntry>) -> Self {
        let response_window_mins = members
            .iter()
            .map(WaterfallEntry::response_window_mins)
            .min()
            .unwrap_or(0);
        Self {
            kind,
            members,
            response_window_mins,
        }
    }

    pub fn contains(&self, carrier_id: &str) -> bool {
        self.members.iter().any(|m| m.carrier_id() == carrier_id)
    }

    pub fn carrier_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.carrier_id())
    }

    /// Short human-readable label for logs and the CLI.
    pub fn label(&self) -> String {
        match &self.kind {
            StageKind::Custom { tier_name, .. } => format!("tier {tier_name}"),
            StageKind::AutoRate { rate } => format!("auto-tier {rate}"),
            StageKind::Single => match self.members.first() {
                Some(m) => format!("carrier {}", m.carrier.name),
                None => "empty".to_string(),
            },
        }
    }
}

/// Resolve waterfall entries and custom tiers into ordered stages.
///
/// Fails when `entries` is empty, an entry repeats a carrier, a window is
/// zero, or custom-tier membership is overlapping or dangling.
pub fn resolve(
    entries: &[WaterfallEntry],
    custom_tiers: &[CustomTier],
    auto_tier: bool,
) -> ConfigResult<Vec<Stage>> {
    if entries.is_empty() {
        return Err(ConfigError::EmptyWaterfall);
    }

    let mut by_id: HashMap<&str, &WaterfallEntry> = HashMap::with_capacity(entries.len());
    for entry in entries {
        if entry.response_window_override == Some(0) || entry.response_window_mins() == 0 {
            return Err(ConfigError::NonPositiveWindow(entry.carrier.id.clone()));
        }
        if by_id.insert(entry.carrier_id(), entry).is_some() {
            return Err(ConfigError::DuplicateEntry(entry.carrier.id.clone()));
        }
    }

    // Exclusivity: each carrier id in at most one custom tier.
    let mut assigned: HashMap<&str, &str> = HashMap::new();
    for tier in custom_tiers {
        for carrier in &tier.carriers {
            if !by_id.contains_key(carrier.as_str()) {
                return Err(ConfigError::UnknownTierMember {
                    tier: tier.id.clone(),
                    carrier: carrier.clone(),
                });
            }
            if let Some(first) = assigned.insert(carrier.as_str(), tier.id.as_str()) {
                return Err(ConfigError::OverlappingTiers {
                    carrier: carrier.clone(),
                    first: first.to_string(),
                    second: tier.id.clone(),
                });
            }
        }
    }

    let mut stages = Vec::new();

    let mut ordered: Vec<&CustomTier> = custom_tiers.iter().collect();
    ordered.sort_by_key(|t| t.order);
    for tier in ordered {
        if tier.carriers.is_empty() {
            debug!(tier = %tier.id, "skipping empty custom tier");
            continue;
        }
        let members = tier
            .carriers
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|e| (*e).clone()))
            .collect();
        stages.push(Stage::from_members(
            StageKind::Custom {
                tier_id: tier.id.clone(),
                tier_name: tier.name.clone(),
            },
            members,
        ));
    }

    let in_tier: HashSet<&str> = assigned.keys().copied().collect();
    let remaining = entries
        .iter()
        .filter(|e| !in_tier.contains(e.carrier_id()));

    if auto_tier {
        let mut by_rate: BTreeMap<Rate, Vec<WaterfallEntry>> = BTreeMap::new();
        for entry in remaining {
            by_rate
                .entry(entry.carrier.rate)
                .or_default()
                .push(entry.clone());
        }
        for (rate, members) in by_rate {
            stages.push(Stage::from_members(StageKind::AutoRate { rate }, members));
        }
    } else {
        for entry in remaining {
            stages.push(Stage::from_members(StageKind::Single, vec![entry.clone()]));
        }
    }

    debug!(
        entries = entries.len(),
        custom_tiers = custom_tiers.len(),
        auto_tier,
        stages = stages.len(),
        "waterfall resolved"
    );
    Ok(stages)
}

/// Resolve a lane's full waterfall configuration.
pub fn resolve_lane(lane: &Lane) -> ConfigResult<Vec<Stage>> {
    resolve(&lane.entries, &lane.custom_tiers, lane.auto_tier)
}
