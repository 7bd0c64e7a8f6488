//! Domain records shared across Tender crates.
//!
//! These are owned by the CRUD layer. The engine reads them to build a
//! waterfall and never writes them back.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Stable, unique carrier identifier.
pub type CarrierId = String;

/// Lane identifier (origin/destination/equipment combination).
pub type LaneId = String;

/// Load identifier.
pub type LoadId = String;

/// Custom tier identifier.
pub type TierId = String;

// ── Rate ──────────────────────────────────────────────────────────

/// A carrier rate in integer minor units (cents).
///
/// Auto-tiering groups carriers by exact equality, so rates are never
/// stored as floats.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(u64);

impl Rate {
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ── Capacity ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub fn label(&self) -> &'static str {
        match self {
            Weekday::Mon => "mon",
            Weekday::Tue => "tue",
            Weekday::Wed => "wed",
            Weekday::Thu => "thu",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
            Weekday::Sun => "sun",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tuesday" => Ok(Weekday::Tue),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thursday" => Ok(Weekday::Thu),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            "sun" | "sunday" => Ok(Weekday::Sun),
            other => Err(format!("unknown weekday: {other}")),
        }
    }
}

/// Trucks a carrier can commit on one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRule {
    pub day: Weekday,
    pub trucks_per_day: u32,
}

// ── Carrier ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A carrier in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: CarrierId,
    pub name: String,
    pub mc_number: String,
    pub rate: Rate,
    #[serde(default)]
    pub contact: ContactInfo,
    /// Response window used when a waterfall entry has no override.
    pub default_response_window_mins: u32,
    /// Day-of-week capacity. At most one rule per day.
    #[serde(default)]
    pub capacity: Vec<CapacityRule>,
}

impl Carrier {
    /// Check that no two capacity rules name the same day.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for rule in &self.capacity {
            if !seen.insert(rule.day) {
                return Err(ConfigError::OverlappingCapacity {
                    carrier: self.id.clone(),
                    day: rule.day.to_string(),
                });
            }
        }
        Ok(())
    }

    /// True when the carrier can take a load on `day`.
    ///
    /// A carrier with no capacity rules is treated as always available.
    pub fn has_capacity_on(&self, day: Weekday) -> bool {
        if self.capacity.is_empty() {
            return true;
        }
        self.capacity
            .iter()
            .any(|rule| rule.day == day && rule.trucks_per_day > 0)
    }
}

// ── Waterfall ─────────────────────────────────────────────────────

/// One carrier's slot in a lane's waterfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallEntry {
    pub carrier: Carrier,
    /// Per-lane override of the carrier's default response window.
    pub response_window_override: Option<u32>,
}

impl WaterfallEntry {
    pub fn new(carrier: Carrier) -> Self {
        Self {
            carrier,
            response_window_override: None,
        }
    }

    pub fn with_window(mut self, mins: u32) -> Self {
        self.response_window_override = Some(mins);
        self
    }

    pub fn carrier_id(&self) -> &str {
        &self.carrier.id
    }

    /// Effective response window in minutes.
    pub fn response_window_mins(&self) -> u32 {
        self.response_window_override
            .unwrap_or(self.carrier.default_response_window_mins)
    }
}

/// A user-curated group of carriers offered together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTier {
    pub id: TierId,
    pub name: String,
    /// Member carrier ids, in offer-display order.
    pub carriers: Vec<CarrierId>,
    /// Rank among custom tiers; lower goes first.
    pub order: u32,
}

// ── Lane ──────────────────────────────────────────────────────────

/// A lane and its waterfall configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub origin: String,
    pub destination: String,
    pub equipment: String,
    pub auto_tier: bool,
    pub entries: Vec<WaterfallEntry>,
    pub custom_tiers: Vec<CustomTier>,
}

impl Lane {
    /// Entries whose carrier has capacity on `day`.
    pub fn entries_available_on(&self, day: Weekday) -> Vec<WaterfallEntry> {
        self.entries
            .iter()
            .filter(|e| e.carrier.has_capacity_on(day))
            .cloned()
            .collect()
    }

    /// Custom tiers restricted to carriers present in `entries`.
    ///
    /// Used together with [`Lane::entries_available_on`] so that tiers do
    /// not reference carriers filtered out for the day.
    pub fn tiers_for(&self, entries: &[WaterfallEntry]) -> Vec<CustomTier> {
        let present: HashSet<&str> = entries.iter().map(|e| e.carrier_id()).collect();
        self.custom_tiers
            .iter()
            .map(|tier| CustomTier {
                carriers: tier
                    .carriers
                    .iter()
                    .filter(|id| present.contains(id.as_str()))
                    .cloned()
                    .collect(),
                ..tier.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier(id: &str, cents: u64) -> Carrier {
        Carrier {
            id: id.to_string(),
            name: format!("Carrier {id}"),
            mc_number: format!("MC-{id}"),
            rate: Rate::from_cents(cents),
            contact: ContactInfo::default(),
            default_response_window_mins: 30,
            capacity: vec![],
        }
    }

    #[test]
    fn rate_display() {
        assert_eq!(Rate::from_cents(185_050).to_string(), "$1850.50");
        assert_eq!(Rate::from_cents(7).to_string(), "$0.07");
    }

    #[test]
    fn entry_window_falls_back_to_carrier_default() {
        let entry = WaterfallEntry::new(carrier("a", 100));
        assert_eq!(entry.response_window_mins(), 30);
        assert_eq!(entry.with_window(15).response_window_mins(), 15);
    }

    #[test]
    fn overlapping_capacity_rejected() {
        let mut c = carrier("a", 100);
        c.capacity = vec![
            CapacityRule { day: Weekday::Mon, trucks_per_day: 2 },
            CapacityRule { day: Weekday::Mon, trucks_per_day: 1 },
        ];
        assert_eq!(
            c.validate(),
            Err(ConfigError::OverlappingCapacity {
                carrier: "a".to_string(),
                day: "mon".to_string(),
            })
        );
    }

    #[test]
    fn capacity_filters_entries() {
        let mut busy = carrier("busy", 100);
        busy.capacity = vec![
            CapacityRule { day: Weekday::Mon, trucks_per_day: 0 },
            CapacityRule { day: Weekday::Tue, trucks_per_day: 3 },
        ];
        let lane = Lane {
            id: "lane".to_string(),
            origin: "A".to_string(),
            destination: "B".to_string(),
            equipment: "reefer".to_string(),
            auto_tier: false,
            entries: vec![WaterfallEntry::new(busy), WaterfallEntry::new(carrier("free", 100))],
            custom_tiers: vec![CustomTier {
                id: "t".to_string(),
                name: "T".to_string(),
                carriers: vec!["busy".to_string(), "free".to_string()],
                order: 1,
            }],
        };

        let monday = lane.entries_available_on(Weekday::Mon);
        assert_eq!(monday.len(), 1);
        assert_eq!(monday[0].carrier_id(), "free");
        assert_eq!(lane.tiers_for(&monday)[0].carriers, vec!["free".to_string()]);

        assert_eq!(lane.entries_available_on(Weekday::Tue).len(), 2);
    }

    #[test]
    fn weekday_parse() {
        assert_eq!("Friday".parse::<Weekday>(), Ok(Weekday::Fri));
        assert!("someday".parse::<Weekday>().is_err());
    }
}
