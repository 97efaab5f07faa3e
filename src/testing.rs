//! Recording mocks shared by the in-crate unit tests.

use std::collections::BTreeMap;

use crate::app::events::AppEvent;
use crate::app::ports::{
    AlertSink, BoilerPhysicalState, BoilerPort, EventSink, ValveHoldQuery, ValvePort,
};
use crate::error::{Alert, AlertKind, HardwareError};
use crate::valves::RoomId;

pub fn room(id: &str) -> RoomId {
    RoomId::from(id)
}

/// Valves and boiler in one recording mock.  Feedback only changes when
/// a test says so (or `auto_follow` mirrors every accepted command).
#[derive(Default)]
pub struct MockPlant {
    pub sent: Vec<(RoomId, u8)>,
    pub feedback: BTreeMap<RoomId, u8>,
    pub auto_follow: bool,
    pub reject_sends: bool,
    pub boiler_on: bool,
    pub boiler_calls: Vec<bool>,
}

impl MockPlant {
    pub fn following() -> Self {
        Self {
            auto_follow: true,
            ..Self::default()
        }
    }

    pub fn sent_to(&self, id: &str) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|(r, _)| r.as_str() == id)
            .map(|(_, p)| *p)
            .collect()
    }
}

impl ValvePort for MockPlant {
    fn send_valve_command(&mut self, room: &RoomId, percent: u8) -> Result<(), HardwareError> {
        if self.reject_sends {
            return Err(HardwareError::CommandRejected("mock transport down"));
        }
        self.sent.push((room.clone(), percent));
        if self.auto_follow {
            self.feedback.insert(room.clone(), percent);
        }
        Ok(())
    }

    fn read_valve_feedback(&self, room: &RoomId) -> Option<u8> {
        self.feedback.get(room).copied()
    }
}

impl BoilerPort for MockPlant {
    fn set_boiler(&mut self, on: bool) -> Result<(), HardwareError> {
        self.boiler_calls.push(on);
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

#[derive(Default)]
pub struct RecordingAlerts {
    pub raised: Vec<Alert>,
    pub cleared: Vec<(AlertKind, Option<RoomId>)>,
}

impl RecordingAlerts {
    pub fn count(&self, kind: AlertKind) -> usize {
        self.raised.iter().filter(|a| a.kind == kind).count()
    }
}

impl AlertSink for RecordingAlerts {
    fn report_error(&mut self, alert: &Alert) {
        self.raised.push(alert.clone());
    }

    fn clear_error(&mut self, kind: AlertKind, room: Option<&RoomId>) {
        self.cleared.push((kind, room.cloned()));
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingEvents {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

/// Fixed answer for [`ValveHoldQuery`].
pub struct Hold(pub bool);

impl ValveHoldQuery for Hold {
    fn is_valve_hold_active(&self) -> bool {
        self.0
    }
}
