//! Outbound application events.
//!
//! The [`ControlService`](super::service::ControlService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log, publish, forward.

use crate::diagnostics::StatusSnapshot;
use crate::fsm::BoilerState;
use crate::valves::RoomId;

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service has started (carries the initial boiler state).
    Started(BoilerState),

    /// The boiler FSM transitioned between states.
    StateChanged { from: BoilerState, to: BoilerState },

    /// A valve command went out.
    ValveCommanded {
        room: RoomId,
        percent: u8,
        correction: bool,
    },

    /// Interlock lost while firing; the boiler was forced off.
    EmergencyShutdown,

    /// Periodic status snapshot.
    Status(Box<StatusSnapshot>),
}
