//! End-to-end dispatch scenarios.
//!
//! Drives lanes through resolution, registration and the runner state
//! machine using explicit timestamps, and checks that the execution log
//! replays to the same outcome as the live run.

use tender_core::time::minutes;
use tender_core::{Carrier, ConfigError, ContactInfo, CustomTier, Lane, Rate, Timestamp, WaterfallEntry};
use tender_registry::{RegistryError, RunRegistry};
use tender_waterfall::{
    replay, resolve, CarrierOutcome, LogKind, Response, RunStatus, WaterfallRunner,
};

fn at(mins: u64) -> Timestamp {
    Timestamp::from_millis(1_700_000_000_000) + minutes(mins)
}

fn carrier(id: &str, cents: u64) -> Carrier {
    Carrier {
        id: id.to_string(),
        name: format!("{id} Trucking"),
        mc_number: format!("MC-{id}"),
        rate: Rate::from_cents(cents),
        contact: ContactInfo {
            email: Some(format!("dispatch@{id}.test")),
            phone: None,
        },
        default_response_window_mins: 30,
        capacity: vec![],
    }
}

fn lane(entries: Vec<WaterfallEntry>, tiers: Vec<CustomTier>, auto_tier: bool) -> Lane {
    Lane {
        id: "lane1".to_string(),
        origin: "Chicago, IL".to_string(),
        destination: "Dallas, TX".to_string(),
        equipment: "dry_van".to_string(),
        auto_tier,
        entries,
        custom_tiers: tiers,
    }
}

fn assert_replays(runner: &WaterfallRunner) {
    let replayed = replay(runner.log().all());
    assert_eq!(replayed.status, runner.state().status);
    assert_eq!(replayed.stage_index, runner.state().current_stage_index);
    assert_eq!(replayed.outcomes, runner.state().outcomes);
}

#[test]
fn two_carriers_first_accepts() {
    let l = lane(
        vec![
            WaterfallEntry::new(carrier("A", 150_000)).with_window(15),
            WaterfallEntry::new(carrier("B", 140_000)).with_window(30),
        ],
        vec![],
        false,
    );
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(&l, "load1", at(0)).unwrap();

    let status = registry
        .record_response(&handle, "A", Response::Accepted, at(10))
        .unwrap();
    assert_eq!(status, RunStatus::Succeeded);

    let runner = registry.runner("lane1", "load1").unwrap();
    assert_eq!(runner.state().current_stage_index, 0);
    assert_eq!(
        runner.log().kinds(),
        vec![
            LogKind::StageStarted,
            LogKind::OfferSent,
            LogKind::Accepted,
            LogKind::RunSucceeded
        ]
    );
    assert_replays(runner);
}

#[test]
fn single_carrier_no_response_exhausts() {
    let l = lane(
        vec![WaterfallEntry::new(carrier("A", 100_000)).with_window(10)],
        vec![],
        false,
    );
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(&l, "load1", at(0)).unwrap();

    assert!(registry.tick(&handle, at(11)).unwrap());

    let state = registry.get("lane1", "load1").unwrap();
    assert_eq!(state.status, RunStatus::Exhausted);
    assert_eq!(state.outcome("A"), Some(CarrierOutcome::TimedOut));
    let kinds = registry.runner("lane1", "load1").unwrap().log().kinds();
    assert!(kinds.contains(&LogKind::TimedOut));
    assert_eq!(kinds.last(), Some(&LogKind::RunExhausted));
}

#[test]
fn custom_tier_declines_escalate_to_individual_carrier() {
    let l = lane(
        vec![
            WaterfallEntry::new(carrier("A", 100_000)).with_window(20),
            WaterfallEntry::new(carrier("B", 100_000)).with_window(20),
            WaterfallEntry::new(carrier("C", 120_000)).with_window(30),
        ],
        vec![CustomTier {
            id: "t1".to_string(),
            name: "Preferred".to_string(),
            carriers: vec!["A".to_string(), "B".to_string()],
            order: 1,
        }],
        false,
    );
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(&l, "load1", at(0)).unwrap();

    registry
        .record_response(&handle, "A", Response::Declined, at(4))
        .unwrap();
    registry
        .record_response(&handle, "B", Response::Declined, at(6))
        .unwrap();

    let runner = registry.runner("lane1", "load1").unwrap();
    assert_eq!(runner.status(), RunStatus::Running);
    assert_eq!(runner.state().current_stage_index, 1);
    let offer = runner.log().last().unwrap();
    assert_eq!(offer.kind, LogKind::OfferSent);
    assert_eq!(offer.carrier_id.as_deref(), Some("C"));
    assert!(runner.log().kinds().contains(&LogKind::StageEscalated));
    assert_replays(runner);
}

#[test]
fn pause_excludes_gap_from_window() {
    let l = lane(
        vec![WaterfallEntry::new(carrier("A", 100_000)).with_window(10)],
        vec![],
        false,
    );
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(&l, "load1", at(0)).unwrap();

    registry.pause(&handle, at(5)).unwrap();
    registry.resume(&handle, at(13)).unwrap();

    let state = registry.get("lane1", "load1").unwrap();
    assert_eq!(state.remaining(at(13)), Some(minutes(5)));
    assert_eq!(state.status, RunStatus::Running);
}

#[test]
fn second_begin_without_end_conflicts() {
    let l = lane(vec![WaterfallEntry::new(carrier("A", 100_000))], vec![], false);
    let mut registry = RunRegistry::new();
    registry.begin_lane(&l, "load1", at(0)).unwrap();

    let err = registry.begin_lane(&l, "load1", at(1)).unwrap_err();
    assert!(matches!(err, RegistryError::Conflict(_)));
}

#[test]
fn empty_entries_are_a_config_error() {
    assert_eq!(resolve(&[], &[], false), Err(ConfigError::EmptyWaterfall));

    let mut registry = RunRegistry::new();
    let err = registry
        .begin_lane(&lane(vec![], vec![], true), "load1", at(0))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Config(ConfigError::EmptyWaterfall)));
}

#[test]
fn auto_tier_run_offers_equal_rates_together() {
    let l = lane(
        vec![
            WaterfallEntry::new(carrier("X", 200_000)).with_window(10),
            WaterfallEntry::new(carrier("Y", 180_000)).with_window(25),
            WaterfallEntry::new(carrier("Z", 180_000)).with_window(15),
        ],
        vec![],
        true,
    );
    let mut registry = RunRegistry::new();
    let handle = registry.begin_lane(&l, "load1", at(0)).unwrap();

    let state = registry.get("lane1", "load1").unwrap();
    assert_eq!(state.outcome("Y"), Some(CarrierOutcome::Pending));
    assert_eq!(state.outcome("Z"), Some(CarrierOutcome::Pending));
    assert_eq!(state.outcome("X"), None);
    // Stage window is the smaller of the two members.
    assert_eq!(state.remaining(at(0)), Some(minutes(15)));

    registry.tick(&handle, at(15)).unwrap();
    registry
        .record_response(&handle, "X", Response::Accepted, at(16))
        .unwrap();

    let runner = registry.runner("lane1", "load1").unwrap();
    assert_eq!(runner.status(), RunStatus::Succeeded);
    assert_eq!(runner.state().outcome("Y"), Some(CarrierOutcome::TimedOut));
    assert_replays(runner);

    let state = registry.end(&handle).unwrap();
    assert_eq!(state.accepted_by.as_deref(), Some("X"));
}
