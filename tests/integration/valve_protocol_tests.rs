//! Valve command/feedback protocol scenarios through the control service.

use hydronic::app::commands::AppCommand;
use hydronic::app::events::AppEvent;
use hydronic::error::AlertKind;
use hydronic::fsm::BoilerState;
use hydronic::valves::{DemandMap, RoomId};

use super::mock_hw::{Harness, demand, two_room_config};

fn lounge() -> RoomId {
    RoomId::from("lounge")
}

// ── Drift correction ──────────────────────────────────────────

#[test]
fn drift_while_firing_is_corrected_inside_rate_limit_window() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 5);
    assert_eq!(h.state(), BoilerState::On);

    h.feedback("lounge", 40, 6);

    assert_eq!(h.plant.sent_to("lounge"), vec![100, 100]);
    assert!(h.events.events.iter().any(|e| matches!(
        e,
        AppEvent::ValveCommanded { percent: 100, correction: true, .. }
    )));
    assert_eq!(h.svc.actuator().correction(&lounge()), Some(100));

    // Check at +5 s confirms, correction retires.
    h.cycle(&d, 11);
    assert_eq!(h.svc.actuator().correction(&lounge()), None);
    assert_eq!(h.svc.counters().corrections, 1);
    assert_eq!(h.state(), BoilerState::On);
}

#[test]
fn drift_within_tolerance_is_ignored() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 5);

    h.feedback("lounge", 97, 8);
    assert_eq!(h.plant.sent_to("lounge"), vec![100]);
    assert_eq!(h.svc.counters().corrections, 0);
}

#[test]
fn drift_during_pump_overrun_hold_is_left_alone() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 190);
    let idle = DemandMap::new();
    h.run(&idle, 191, 240);
    assert_eq!(h.state(), BoilerState::PumpOverrun);

    h.feedback("lounge", 40, 241);

    assert_eq!(h.plant.sent_to("lounge"), vec![100]);
    assert_eq!(h.svc.counters().corrections, 0);
    assert_eq!(h.svc.actuator().get_feedback(&lounge()), Some(40));
}

// ── Retries ───────────────────────────────────────────────────

#[test]
fn jammed_valve_is_retried_a_bounded_number_of_times() {
    let mut h = Harness::new(two_room_config());
    h.plant.jam("lounge", 40);
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 600);

    // First send plus three retries, then never again.
    assert_eq!(h.plant.sent_to("lounge"), vec![100, 100, 100, 100]);
    assert_eq!(h.alerts.count(AlertKind::FeedbackTimeout), 1);

    let counters = h.svc.counters();
    assert_eq!(counters.retries, 3);
    assert_eq!(counters.feedback_failures, 1);

    let status = h.svc.status(h.at(600));
    let room = status.room("lounge").expect("lounge status");
    assert_eq!(room.commanded_percent, Some(40));
    assert_eq!(room.failed_target, Some(100));
}

#[test]
fn jammed_valve_never_lets_the_boiler_fire() {
    let mut h = Harness::new(two_room_config());
    h.plant.jam("lounge", 40);
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 600);

    assert!(h.plant.boiler_calls().is_empty());
    assert_eq!(h.state(), BoilerState::PendingOn);
    assert!(!h.svc.status(h.at(600)).interlock.satisfied);
}

#[test]
fn freed_valve_clears_its_feedback_alert() {
    let mut h = Harness::new(two_room_config());
    h.plant.jam("lounge", 40);
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 25);
    assert_eq!(h.alerts.count(AlertKind::FeedbackTimeout), 1);

    // Freed, and a different target that needs no top-up.
    h.plant.jammed.clear();
    let lower = demand(&[("lounge", 80), ("study", 40)]);
    h.run(&lower, 60, 70);

    assert_eq!(h.plant.sent_to("lounge").last(), Some(&80));
    assert!(
        h.alerts
            .cleared
            .iter()
            .any(|(kind, room)| *kind == AlertKind::FeedbackTimeout && room.as_ref() == Some(&lounge()))
    );
}

// ── Rate limiting and load sharing ────────────────────────────

#[test]
fn demand_changes_are_rate_limited() {
    let mut h = Harness::new(two_room_config());
    h.cycle(&demand(&[("lounge", 100)]), 0);
    h.cycle(&demand(&[("lounge", 60), ("study", 60)]), 10);
    assert_eq!(h.plant.sent_to("lounge"), vec![100]);

    h.cycle(&demand(&[("lounge", 60), ("study", 60)]), 30);
    assert_eq!(h.plant.sent_to("lounge"), vec![100, 60]);
}

#[test]
fn cleared_load_sharing_is_undone_immediately() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 39);

    h.svc.handle_command(AppCommand::SetLoadSharing {
        overrides: [(RoomId::from("study"), 40)].into_iter().collect(),
        reason: "schedule lookahead".into(),
    });
    h.cycle(&d, 40);
    assert_eq!(h.plant.sent_to("study"), vec![0, 40]);

    h.svc.handle_command(AppCommand::ClearLoadSharing);
    h.cycle(&d, 50);
    assert_eq!(h.plant.sent_to("study"), vec![0, 40, 0]);
    assert!(h.svc.coordinator().load_sharing().is_none());
}
