//! Mock plant adapter for integration tests.
//!
//! Records every valve and boiler call so tests can assert on the full
//! command history.  Valves follow their commands instantly unless a test
//! jams one.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use hydronic::app::events::AppEvent;
use hydronic::app::ports::{AlertSink, BoilerPhysicalState, BoilerPort, EventSink, ValvePort};
use hydronic::app::service::ControlService;
use hydronic::config::{BoilerConfig, RoomConfig, SystemConfig, ValveConfig};
use hydronic::error::{Alert, AlertKind, HardwareError};
use hydronic::fsm::BoilerState;
use hydronic::valves::{DemandMap, RoomDemand, RoomId};

// ── Plant call record ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PlantCall {
    Valve { room: RoomId, percent: u8 },
    Boiler(bool),
}

// ── MockPlant ─────────────────────────────────────────────────

pub struct MockPlant {
    pub calls: Vec<PlantCall>,
    pub feedback: BTreeMap<RoomId, u8>,
    /// Valves that report this position whatever they are told.
    pub jammed: BTreeMap<RoomId, u8>,
    pub boiler_on: bool,
}

#[allow(dead_code)]
impl MockPlant {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            feedback: BTreeMap::new(),
            jammed: BTreeMap::new(),
            boiler_on: false,
        }
    }

    pub fn jam(&mut self, room: &str, percent: u8) {
        let room = RoomId::from(room);
        self.feedback.insert(room.clone(), percent);
        self.jammed.insert(room, percent);
    }

    /// Positions sent to one room, oldest first.
    pub fn sent_to(&self, room: &str) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PlantCall::Valve { room: r, percent } if r.as_str() == room => Some(*percent),
                _ => None,
            })
            .collect()
    }

    pub fn valve_call_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, PlantCall::Valve { .. }))
            .count()
    }

    pub fn boiler_calls(&self) -> Vec<bool> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PlantCall::Boiler(on) => Some(*on),
                _ => None,
            })
            .collect()
    }
}

impl ValvePort for MockPlant {
    fn send_valve_command(&mut self, room: &RoomId, percent: u8) -> Result<(), HardwareError> {
        self.calls.push(PlantCall::Valve {
            room: room.clone(),
            percent,
        });
        let reported = self.jammed.get(room).copied().unwrap_or(percent);
        self.feedback.insert(room.clone(), reported);
        Ok(())
    }

    fn read_valve_feedback(&self, room: &RoomId) -> Option<u8> {
        self.feedback.get(room).copied()
    }
}

impl BoilerPort for MockPlant {
    fn set_boiler(&mut self, on: bool) -> Result<(), HardwareError> {
        self.calls.push(PlantCall::Boiler(on));
        self.boiler_on = on;
        Ok(())
    }

    fn read_boiler_physical_state(&self) -> BoilerPhysicalState {
        if self.boiler_on {
            BoilerPhysicalState::On
        } else {
            BoilerPhysicalState::Off
        }
    }
}

// ── Recording sinks ───────────────────────────────────────────

#[derive(Default)]
pub struct AlertLog {
    pub raised: Vec<Alert>,
    pub cleared: Vec<(AlertKind, Option<RoomId>)>,
}

#[allow(dead_code)]
impl AlertLog {
    pub fn count(&self, kind: AlertKind) -> usize {
        self.raised.iter().filter(|a| a.kind == kind).count()
    }
}

impl AlertSink for AlertLog {
    fn report_error(&mut self, alert: &Alert) {
        self.raised.push(alert.clone());
    }

    fn clear_error(&mut self, kind: AlertKind, room: Option<&RoomId>) {
        self.cleared.push((kind, room.cloned()));
    }
}

#[derive(Default)]
pub struct EventLog {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl EventLog {
    pub fn transitions(&self) -> Vec<(BoilerState, BoilerState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn emergency_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::EmergencyShutdown))
            .count()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub fn two_room_config() -> SystemConfig {
    SystemConfig {
        rooms: vec![
            RoomConfig {
                id: RoomId::from("lounge"),
                name: "Lounge".into(),
            },
            RoomConfig {
                id: RoomId::from("study"),
                name: "Study".into(),
            },
        ],
        valves: ValveConfig::default(),
        boiler: BoilerConfig::default(),
        control_loop_interval_ms: 1000,
    }
}

#[allow(dead_code)]
pub fn demand(calling: &[(&str, u8)]) -> DemandMap {
    calling
        .iter()
        .map(|(room, p)| (RoomId::from(*room), RoomDemand::calling(*p)))
        .collect()
}

/// A started service wired to the recording plant and sinks.
pub struct Harness {
    pub t0: Instant,
    pub svc: ControlService,
    pub plant: MockPlant,
    pub alerts: AlertLog,
    pub events: EventLog,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: SystemConfig) -> Self {
        let t0 = Instant::now();
        let mut h = Self {
            t0,
            svc: ControlService::new(&config, t0),
            plant: MockPlant::new(),
            alerts: AlertLog::default(),
            events: EventLog::default(),
        };
        h.svc.start(t0, &mut h.plant, &mut h.alerts, &mut h.events);
        h
    }

    pub fn at(&self, secs: u64) -> Instant {
        self.t0 + Duration::from_secs(secs)
    }

    pub fn cycle(&mut self, demand: &DemandMap, secs: u64) -> Option<(BoilerState, BoilerState)> {
        let now = self.at(secs);
        self.svc
            .run_cycle(demand, now, &mut self.plant, &mut self.alerts, &mut self.events)
    }

    /// One pass per second over `from..=to`.
    pub fn run(&mut self, demand: &DemandMap, from: u64, to: u64) {
        for s in from..=to {
            self.cycle(demand, s);
        }
    }

    /// Deliver a valve feedback notification at `secs`.
    pub fn feedback(&mut self, room: &str, percent: u8, secs: u64) {
        let now = self.at(secs);
        let room = RoomId::from(room);
        self.plant.feedback.insert(room.clone(), percent);
        self.svc.on_feedback_changed(
            &room,
            percent,
            now,
            &mut self.plant,
            &mut self.alerts,
            &mut self.events,
        );
    }

    pub fn state(&self) -> BoilerState {
        self.svc.boiler_state()
    }
}
