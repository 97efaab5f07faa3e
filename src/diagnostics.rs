//! Runtime counters and the status snapshot.
//!
//! The snapshot is the core's read-only face to status publication: boiler
//! state with remaining timer durations, per-room valve state, and the
//! active override tiers with their reasons.  It is collected on demand
//! and serialized to JSON by whoever publishes it.

use std::time::Instant;

use serde::Serialize;

use crate::fsm::timers::TimerRemaining;
use crate::fsm::{BoilerFsm, BoilerState};
use crate::interlock::InterlockAssessment;
use crate::valves::actuator::{CommandPhase, ValveActuator};
use crate::valves::coordinator::{OverrideLayer, ValveCoordinator};
use crate::valves::{PercentMap, RoomId};

/// Counters kept by the valve actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValveCounters {
    pub commands_sent: u64,
    pub retries: u64,
    pub corrections: u64,
    pub feedback_failures: u64,
}

/// Process-lifetime counters for the whole control core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeCounters {
    pub cycles: u64,
    pub valve_commands_sent: u64,
    pub retries: u64,
    pub corrections: u64,
    pub feedback_failures: u64,
    pub emergency_shutdowns: u64,
    pub desync_corrections: u64,
}

impl RuntimeCounters {
    /// Fold in the actuator's counters (they are owned there).
    pub fn with_valves(mut self, valves: &ValveCounters) -> Self {
        self.valve_commands_sent = valves.commands_sent;
        self.retries = valves.retries;
        self.corrections = valves.corrections;
        self.feedback_failures = valves.feedback_failures;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStatus {
    pub room: RoomId,
    pub commanded_percent: Option<u8>,
    pub feedback_percent: Option<u8>,
    pub phase: CommandPhase,
    pub retry_count: u8,
    pub unexpected_position: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_target: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: BoilerState,
    pub reason: String,
    pub secs_in_state: u64,
    pub timers: TimerRemaining,
    pub must_hold_valves: bool,
    pub interlock: InterlockAssessment,
    pub rooms: Vec<RoomStatus>,
    pub persistence: Option<OverrideLayer>,
    pub load_sharing: Option<OverrideLayer>,
    pub corrections: PercentMap,
    /// Seconds until the earliest booked feedback check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_feedback_check_secs: Option<u64>,
    pub counters: RuntimeCounters,
}

impl StatusSnapshot {
    pub fn collect(
        now: Instant,
        boiler: &BoilerFsm,
        coordinator: &ValveCoordinator,
        actuator: &ValveActuator,
        interlock: InterlockAssessment,
        counters: RuntimeCounters,
    ) -> Self {
        Self {
            state: boiler.state(),
            reason: boiler.reason().to_string(),
            secs_in_state: boiler.time_in_state(now).as_secs(),
            timers: boiler.timers_remaining(now),
            must_hold_valves: boiler.must_hold_valves(),
            interlock,
            rooms: actuator
                .room_states()
                .map(|s| RoomStatus {
                    room: s.room_id.clone(),
                    commanded_percent: s.commanded_percent,
                    feedback_percent: s.feedback_percent,
                    phase: s.command_phase,
                    retry_count: s.retry_count,
                    unexpected_position: s.unexpected_position,
                    failed_target: s.failed_target,
                })
                .collect(),
            persistence: coordinator.persistence().cloned(),
            load_sharing: coordinator.load_sharing().cloned(),
            corrections: actuator.corrections().clone(),
            next_feedback_check_secs: actuator
                .next_check_due()
                .map(|due| due.saturating_duration_since(now).as_secs()),
            counters: counters.with_valves(actuator.counters()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn room(&self, room: &str) -> Option<&RoomStatus> {
        self.rooms.iter().find(|r| r.room.as_str() == room)
    }
}
