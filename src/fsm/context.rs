//! Shared mutable context threaded through every boiler FSM handler.
//!
//! `FsmContext` is the blackboard the state handlers read from and write
//! to.  The control service fills [`BoilerInputs`] before each update and
//! drains [`BoilerOutputs`] afterwards, applying them to the boiler port,
//! the coordinator and the alert sink.  Handlers never touch a port.

use std::time::Instant;

use crate::app::ports::BoilerPhysicalState;
use crate::config::BoilerConfig;
use crate::error::{Alert, AlertKind, bounded_text};
use crate::interlock::InterlockAssessment;
use crate::valves::{PercentMap, RoomId};

use super::timers::BoilerTimers;

/// Maximum length of the diagnostic reason string.
pub const REASON_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Inputs (written by the control service before each update)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BoilerInputs {
    pub calling_rooms: Vec<RoomId>,
    pub interlock: InterlockAssessment,
    /// Every calling room reports its commanded position within tolerance.
    pub feedback_confirmed: bool,
    pub physical: BoilerPhysicalState,
    /// Commanded percentage of every room, used for the valve snapshot.
    pub commanded: PercentMap,
}

impl Default for BoilerInputs {
    fn default() -> Self {
        Self {
            calling_rooms: Vec::new(),
            interlock: InterlockAssessment::default(),
            feedback_confirmed: false,
            physical: BoilerPhysicalState::Off,
            commanded: PercentMap::new(),
        }
    }
}

impl BoilerInputs {
    pub fn has_demand(&self) -> bool {
        !self.calling_rooms.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outputs (drained by the control service after each update)
// ---------------------------------------------------------------------------

/// What the coordinator's persistence tier should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersistenceCommand {
    #[default]
    Keep,
    Publish {
        overrides: PercentMap,
        reason: &'static str,
    },
    Clear,
}

#[derive(Debug, Clone, Default)]
pub struct BoilerOutputs {
    /// `Some(on)` when the appliance must be switched this cycle.
    pub boiler: Option<bool>,
    pub persistence: PersistenceCommand,
    pub raised: Vec<Alert>,
    pub cleared: Vec<AlertKind>,
    pub emergency_shutdown: bool,
    pub desync_corrected: bool,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    /// Time of the current update.
    pub now: Instant,
    pub config: BoilerConfig,
    pub inputs: BoilerInputs,
    pub outputs: BoilerOutputs,
    pub timers: BoilerTimers,
    /// Positions held through PENDING_OFF and PUMP_OVERRUN (and the min_on wait).
    pub valve_snapshot: PercentMap,
    pub must_hold_valves: bool,
    /// A `StateDesync` alert was raised and not yet cleared.
    pub desync_alert_active: bool,
    pub reason: heapless::String<REASON_LEN>,
}

impl FsmContext {
    pub fn new(config: BoilerConfig, now: Instant) -> Self {
        Self {
            now,
            timers: BoilerTimers::new(&config),
            config,
            inputs: BoilerInputs::default(),
            outputs: BoilerOutputs::default(),
            valve_snapshot: PercentMap::new(),
            must_hold_valves: false,
            desync_alert_active: false,
            reason: bounded_text("startup"),
        }
    }

    pub fn set_reason(&mut self, reason: &str) {
        self.reason = bounded_text(reason);
    }

    pub fn command_boiler(&mut self, on: bool) {
        self.outputs.boiler = Some(on);
    }

    pub fn raise(&mut self, kind: AlertKind, message: &str) {
        self.outputs.raised.push(Alert::new(kind, message));
    }

    pub fn clear_alert(&mut self, kind: AlertKind) {
        self.outputs.cleared.push(kind);
    }

    /// Capture every commanded room position and publish it as the hold.
    pub fn capture_snapshot(&mut self, reason: &'static str) {
        self.valve_snapshot = self.inputs.commanded.clone();
        self.must_hold_valves = true;
        self.publish_snapshot(reason);
    }

    pub fn publish_snapshot(&mut self, reason: &'static str) {
        self.outputs.persistence = PersistenceCommand::Publish {
            overrides: self.valve_snapshot.clone(),
            reason,
        };
    }

    /// Drop the hold and the whole persistence tier.
    pub fn release_valves(&mut self) {
        self.valve_snapshot.clear();
        self.must_hold_valves = false;
        self.outputs.persistence = PersistenceCommand::Clear;
    }

    pub fn take_outputs(&mut self) -> BoilerOutputs {
        std::mem::take(&mut self.outputs)
    }
}
