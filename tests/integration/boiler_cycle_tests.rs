//! Boiler lifecycle scenarios through the control service.

use hydronic::app::events::AppEvent;
use hydronic::config::{BoilerConfig, SystemConfig};
use hydronic::error::{AlertKind, Severity};
use hydronic::fsm::BoilerState;
use hydronic::valves::{DemandMap, RoomId};

use super::mock_hw::{Harness, demand, two_room_config};

fn fired() -> Harness {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 0, 5);
    assert_eq!(h.state(), BoilerState::On);
    h
}

// ── Ignition ──────────────────────────────────────────────────

#[test]
fn single_room_fully_open_ignites_after_feedback() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100)]);

    assert_eq!(h.cycle(&d, 0), Some((BoilerState::Off, BoilerState::PendingOn)));
    for s in 1..5 {
        assert_eq!(h.cycle(&d, s), None);
    }
    assert!(h.plant.boiler_calls().is_empty());

    assert_eq!(h.cycle(&d, 5), Some((BoilerState::PendingOn, BoilerState::On)));
    assert_eq!(h.plant.boiler_calls(), vec![true]);
    assert_eq!(
        h.events.transitions(),
        vec![
            (BoilerState::Off, BoilerState::PendingOn),
            (BoilerState::PendingOn, BoilerState::On),
        ]
    );
}

#[test]
fn two_small_demands_are_opened_to_share_the_minimum() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 30), ("study", 20)]);
    h.run(&d, 0, 5);

    assert_eq!(h.plant.sent_to("lounge"), vec![50]);
    assert_eq!(h.plant.sent_to("study"), vec![50]);
    assert_eq!(h.state(), BoilerState::On);

    let status = h.svc.status(h.at(5));
    let persistence = status.persistence.expect("interlock top-up");
    assert_eq!(persistence.reason.as_str(), "valve interlock");
    assert_eq!(status.interlock.aggregate_percent, 100);
}

// ── Normal shutdown ───────────────────────────────────────────

#[test]
fn shutdown_holds_valves_through_off_delay_and_pump_overrun() {
    let mut h = fired();
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 6, 204);
    let sent_before = h.plant.valve_call_count();
    let idle = DemandMap::new();

    assert_eq!(h.cycle(&idle, 205), Some((BoilerState::On, BoilerState::PendingOff)));
    let held = h.svc.status(h.at(205)).persistence.expect("off delay snapshot");
    assert_eq!(held.reason.as_str(), "off delay");
    h.run(&idle, 206, 234);
    assert_eq!(h.state(), BoilerState::PendingOff);
    assert_eq!(h.plant.boiler_calls(), vec![true]);

    assert_eq!(h.cycle(&idle, 235), Some((BoilerState::PendingOff, BoilerState::PumpOverrun)));
    assert_eq!(h.plant.boiler_calls(), vec![true, false]);
    h.run(&idle, 236, 414);
    assert_eq!(h.state(), BoilerState::PumpOverrun);
    assert!(h.svc.boiler().must_hold_valves());

    assert_eq!(h.cycle(&idle, 415), Some((BoilerState::PumpOverrun, BoilerState::Off)));
    assert_eq!(h.plant.valve_call_count(), sent_before, "valves moved during the hold");
    assert!(!h.svc.boiler().must_hold_valves());

    // Released on the next pass, correction semantics skip the rate limit.
    h.cycle(&idle, 416);
    assert_eq!(h.plant.sent_to("lounge"), vec![100, 0]);
    assert!(h.events.events.iter().any(|e| matches!(
        e,
        AppEvent::ValveCommanded { room, percent: 0, correction: true } if room.as_str() == "lounge"
    )));
}

#[test]
fn demand_lost_before_min_on_keeps_firing_with_valves_held() {
    let mut h = fired();
    let idle = DemandMap::new();

    h.run(&idle, 60, 184);
    assert_eq!(h.state(), BoilerState::On);
    assert!(h.svc.boiler().must_hold_valves());
    assert_eq!(h.plant.sent_to("lounge"), vec![100]);

    assert_eq!(h.cycle(&idle, 185), Some((BoilerState::On, BoilerState::PendingOff)));
}

#[test]
fn demand_returning_during_off_delay_resumes_without_reignition() {
    let mut h = fired();
    let d = demand(&[("lounge", 100)]);
    h.run(&d, 6, 199);
    h.cycle(&DemandMap::new(), 200);
    assert_eq!(h.state(), BoilerState::PendingOff);

    assert_eq!(h.cycle(&d, 210), Some((BoilerState::PendingOff, BoilerState::On)));
    assert_eq!(h.plant.boiler_calls(), vec![true]);
    h.cycle(&d, 211);
    assert!(!h.svc.boiler().must_hold_valves());
    assert!(h.svc.coordinator().persistence().is_none());
}

// ── Safety ────────────────────────────────────────────────────

fn strict_config() -> SystemConfig {
    SystemConfig {
        boiler: BoilerConfig {
            min_valve_open_percent: 150,
            ..BoilerConfig::default()
        },
        ..two_room_config()
    }
}

#[test]
fn losing_interlock_while_firing_is_an_emergency_shutdown() {
    let mut h = Harness::new(strict_config());
    let both = demand(&[("lounge", 100), ("study", 100)]);
    h.run(&both, 0, 5);
    assert_eq!(h.state(), BoilerState::On);

    let lounge_only = demand(&[("lounge", 100)]);
    assert_eq!(h.cycle(&lounge_only, 10), Some((BoilerState::On, BoilerState::Off)));
    assert_eq!(h.plant.boiler_calls(), vec![true, false]);
    assert_eq!(h.events.emergency_count(), 1);
    assert_eq!(h.svc.counters().emergency_shutdowns, 1);

    let alert = h
        .alerts
        .raised
        .iter()
        .find(|a| a.kind == AlertKind::EmergencyInterlockLoss)
        .expect("emergency alert");
    assert_eq!(alert.severity, Severity::Critical);

    // One room can never reach 150%.
    assert_eq!(
        h.cycle(&lounge_only, 11),
        Some((BoilerState::Off, BoilerState::InterlockBlocked))
    );
    assert_eq!(h.alerts.count(AlertKind::InterlockFailure), 1);
}

#[test]
fn blocked_interlock_recovers_when_a_second_room_calls() {
    let mut h = Harness::new(strict_config());
    let lounge_only = demand(&[("lounge", 100)]);
    assert_eq!(
        h.cycle(&lounge_only, 0),
        Some((BoilerState::Off, BoilerState::InterlockBlocked))
    );

    let both = demand(&[("lounge", 100), ("study", 100)]);
    assert_eq!(
        h.cycle(&both, 40),
        Some((BoilerState::InterlockBlocked, BoilerState::PendingOn))
    );
    assert!(
        h.alerts
            .cleared
            .iter()
            .any(|(kind, _)| *kind == AlertKind::InterlockFailure)
    );
    assert!(h.plant.boiler_calls().is_empty());
}

#[test]
fn boiler_found_off_is_corrected_and_min_off_is_honoured() {
    let mut h = fired();
    let d = demand(&[("lounge", 100)]);
    h.plant.boiler_on = false;

    assert_eq!(h.cycle(&d, 10), Some((BoilerState::On, BoilerState::Off)));
    assert_eq!(h.alerts.count(AlertKind::StateDesync), 1);
    assert_eq!(h.svc.counters().desync_corrections, 1);

    h.run(&d, 11, 189);
    assert_eq!(h.state(), BoilerState::Off);
    assert!(h.svc.boiler().reason().contains("min_off"));

    assert_eq!(h.cycle(&d, 190), Some((BoilerState::Off, BoilerState::PendingOn)));
    assert_eq!(h.cycle(&d, 191), Some((BoilerState::PendingOn, BoilerState::On)));
    assert_eq!(h.plant.boiler_calls(), vec![true, false, true]);
}

#[test]
fn every_desync_is_raised_and_cleared_in_turn() {
    let mut h = fired();
    let d = demand(&[("lounge", 100)]);

    h.plant.boiler_on = false;
    h.cycle(&d, 10);
    h.run(&d, 11, 191);
    assert_eq!(h.state(), BoilerState::On);

    h.plant.boiler_on = false;
    assert_eq!(h.cycle(&d, 200), Some((BoilerState::On, BoilerState::Off)));
    h.cycle(&d, 201);

    assert_eq!(h.alerts.count(AlertKind::StateDesync), 2);
    let cleared = h
        .alerts
        .cleared
        .iter()
        .filter(|(kind, _)| *kind == AlertKind::StateDesync)
        .count();
    assert_eq!(cleared, 2);
}

#[test]
fn boiler_found_on_while_off_is_switched_off_again() {
    let mut h = Harness::new(two_room_config());
    h.plant.boiler_on = true;

    assert_eq!(h.cycle(&DemandMap::new(), 1), None);
    assert_eq!(h.plant.boiler_calls(), vec![false]);
    assert_eq!(h.alerts.count(AlertKind::StateDesync), 1);
    assert_eq!(h.state(), BoilerState::Off);

    h.cycle(&DemandMap::new(), 2);
    assert!(
        h.alerts
            .cleared
            .iter()
            .any(|(kind, _)| *kind == AlertKind::StateDesync)
    );
}

#[test]
fn demand_from_unconfigured_room_is_ignored() {
    let mut h = Harness::new(two_room_config());
    let d = demand(&[("lounge", 100), ("attic", 100)]);
    h.run(&d, 0, 5);

    assert_eq!(h.state(), BoilerState::On);
    assert_eq!(h.plant.sent_to("attic"), Vec::<u8>::new());
    assert_eq!(h.svc.status(h.at(5)).interlock.aggregate_percent, 100);
}

#[test]
fn status_reports_held_snapshot_during_pump_overrun() {
    let mut h = fired();
    let idle = DemandMap::new();
    h.run(&idle, 185, 245);
    assert_eq!(h.state(), BoilerState::PumpOverrun);

    let status = h.svc.status(h.at(245));
    assert!(status.must_hold_valves);
    let persistence = status.persistence.expect("pump overrun snapshot");
    assert_eq!(persistence.overrides.get(&RoomId::from("lounge")), Some(&100));
    assert_eq!(persistence.overrides.get(&RoomId::from("study")), Some(&0));
    assert_eq!(persistence.reason.as_str(), "pump overrun");
    assert_eq!(status.timers.pump_overrun_secs, Some(150));
}
