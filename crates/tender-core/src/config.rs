//! Lane and simulation-script TOML parsers.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::*;

fn default_window() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    pub lane: LaneSection,
    #[serde(default)]
    pub carriers: Vec<CarrierConfig>,
    /// Waterfall order. When omitted, every carrier is used in file order.
    #[serde(default)]
    pub waterfall: Vec<EntryConfig>,
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSection {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub equipment: String,
    #[serde(default)]
    pub auto_tier: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub id: String,
    pub name: String,
    pub mc_number: String,
    pub rate_cents: u64,
    #[serde(default = "default_window")]
    pub default_response_window_mins: u32,
    pub contact: Option<ContactInfo>,
    pub capacity: Option<Vec<CapacityRule>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    pub carrier: String,
    pub response_window_mins: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub id: String,
    pub name: String,
    pub order: u32,
    pub carriers: Vec<String>,
}

impl LaneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LaneConfig = toml::from_str(&content)?;
        debug!(?path, lane = %config.lane.id, "lane config loaded");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the `Lane` record, resolving waterfall carrier references.
    ///
    /// Tier membership and window checks are left to the tier resolver.
    pub fn into_lane(self) -> ConfigResult<Lane> {
        let mut directory: HashMap<String, Carrier> = HashMap::new();
        let mut file_order = Vec::with_capacity(self.carriers.len());

        for c in self.carriers {
            let carrier = Carrier {
                id: c.id.clone(),
                name: c.name,
                mc_number: c.mc_number,
                rate: Rate::from_cents(c.rate_cents),
                contact: c.contact.unwrap_or_default(),
                default_response_window_mins: c.default_response_window_mins,
                capacity: c.capacity.unwrap_or_default(),
            };
            carrier.validate()?;
            file_order.push(c.id.clone());
            directory.insert(c.id, carrier);
        }

        let waterfall = if self.waterfall.is_empty() {
            file_order
                .into_iter()
                .map(|carrier| EntryConfig {
                    carrier,
                    response_window_mins: None,
                })
                .collect()
        } else {
            self.waterfall
        };

        let entries = waterfall
            .into_iter()
            .map(|e| {
                let carrier = directory
                    .get(&e.carrier)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownCarrier(e.carrier.clone()))?;
                Ok(WaterfallEntry {
                    carrier,
                    response_window_override: e.response_window_mins,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let custom_tiers = self
            .tiers
            .into_iter()
            .map(|t| CustomTier {
                id: t.id,
                name: t.name,
                carriers: t.carriers,
                order: t.order,
            })
            .collect();

        Ok(Lane {
            id: self.lane.id,
            origin: self.lane.origin,
            destination: self.lane.destination,
            equipment: self.lane.equipment,
            auto_tier: self.lane.auto_tier,
            entries,
            custom_tiers,
        })
    }
}

// ── Simulation script ─────────────────────────────────────────────

/// A timed sequence of host actions, replayed against a manual clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationScript {
    #[serde(default, rename = "step")]
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Minutes after the run started.
    pub at_mins: u64,
    pub action: ScriptAction,
    pub carrier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptAction {
    Accept,
    Decline,
    Tick,
    Pause,
    Resume,
    Cancel,
}

impl SimulationScript {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut script: SimulationScript = toml::from_str(&content)?;
        script.steps.sort_by_key(|s| s.at_mins);
        for step in &script.steps {
            if matches!(step.action, ScriptAction::Accept | ScriptAction::Decline)
                && step.carrier.is_none()
            {
                anyhow::bail!("step at {} min: {:?} needs a carrier", step.at_mins, step.action);
            }
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANE_TOML: &str = r#"
[lane]
id = "chi-dal"
origin = "Chicago, IL"
destination = "Dallas, TX"
equipment = "dry_van"
auto_tier = true

[[carriers]]
id = "c1"
name = "Acme Freight"
mc_number = "MC-1"
rate_cents = 185000
default_response_window_mins = 20
contact = { email = "ops@acme.test" }
capacity = [{ day = "mon", trucks_per_day = 2 }]

[[carriers]]
id = "c2"
name = "Bolt Logistics"
mc_number = "MC-2"
rate_cents = 190000

[[waterfall]]
carrier = "c2"

[[waterfall]]
carrier = "c1"
response_window_mins = 15

[[tiers]]
id = "t1"
name = "Preferred"
order = 1
carriers = ["c1"]
"#;

    #[test]
    fn test_parse_lane() {
        let config: LaneConfig = toml::from_str(LANE_TOML).unwrap();
        let lane = config.into_lane().unwrap();
        assert_eq!(lane.id, "chi-dal");
        assert!(lane.auto_tier);
        assert_eq!(lane.entries.len(), 2);
        assert_eq!(lane.entries[0].carrier_id(), "c2");
        assert_eq!(lane.entries[0].response_window_mins(), 30);
        assert_eq!(lane.entries[1].response_window_mins(), 15);
        assert_eq!(lane.entries[1].carrier.contact.email.as_deref(), Some("ops@acme.test"));
        assert_eq!(lane.custom_tiers[0].carriers, vec!["c1".to_string()]);
    }

    #[test]
    fn test_waterfall_defaults_to_directory_order() {
        let toml_str = r#"
[lane]
id = "l"
origin = "A"
destination = "B"
equipment = "flatbed"

[[carriers]]
id = "x"
name = "X"
mc_number = "MC-X"
rate_cents = 100

[[carriers]]
id = "y"
name = "Y"
mc_number = "MC-Y"
rate_cents = 100
"#;
        let lane = toml::from_str::<LaneConfig>(toml_str)
            .unwrap()
            .into_lane()
            .unwrap();
        let ids: Vec<_> = lane.entries.iter().map(|e| e.carrier_id()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert!(!lane.auto_tier);
    }

    #[test]
    fn test_unknown_waterfall_carrier() {
        let mut config: LaneConfig = toml::from_str(LANE_TOML).unwrap();
        config.waterfall.push(EntryConfig {
            carrier: "ghost".to_string(),
            response_window_mins: None,
        });
        assert_eq!(
            config.into_lane(),
            Err(ConfigError::UnknownCarrier("ghost".to_string()))
        );
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lane.toml");
        std::fs::write(&path, LANE_TOML).unwrap();

        let config = LaneConfig::from_file(&path).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("chi-dal"));
        assert!(rendered.contains("Preferred"));
    }

    #[test]
    fn test_script_sorted_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.toml");
        std::fs::write(
            &path,
            r#"
[[step]]
at_mins = 12
action = "tick"

[[step]]
at_mins = 3
action = "decline"
carrier = "c1"
"#,
        )
        .unwrap();
        let script = SimulationScript::from_file(&path).unwrap();
        assert_eq!(script.steps[0].at_mins, 3);
        assert_eq!(script.steps[1].action, ScriptAction::Tick);

        std::fs::write(&path, "[[step]]\nat_mins = 1\naction = \"accept\"\n").unwrap();
        assert!(SimulationScript::from_file(&path).is_err());
    }
}
