use std::path::Path;

use tender_core::{Lane, LaneConfig, Weekday};
use tender_waterfall::{resolve_lane, tiers, Stage};

use super::report;

pub fn resolve(lane_path: &Path, day: Option<Weekday>, format: &str) -> anyhow::Result<()> {
    let lane = LaneConfig::from_file(lane_path)?.into_lane()?;
    let stages = resolve_stages(&lane, day)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&stages)?);
        }
        _ => {
            print!("{}", report::format_stages(&lane.id, &stages));
        }
    }

    Ok(())
}

/// Resolve a lane's stages, keeping only carriers with capacity on `day`.
pub fn resolve_stages(lane: &Lane, day: Option<Weekday>) -> anyhow::Result<Vec<Stage>> {
    let stages = match day {
        Some(day) => {
            let entries = lane.entries_available_on(day);
            let custom_tiers = lane.tiers_for(&entries);
            tiers::resolve(&entries, &custom_tiers, lane.auto_tier)?
        }
        None => resolve_lane(lane)?,
    };
    Ok(stages)
}
