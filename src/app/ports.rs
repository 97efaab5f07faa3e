//! Port traits: the hexagonal boundary between the heating core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlService (domain)
//! ```
//!
//! Driven adapters (valve transport, boiler relay, alert delivery, event
//! publication, config storage) implement these traits.  The
//! [`ControlService`](super::service::ControlService) consumes them via
//! generics, so the core never touches a transport directly.

use core::fmt;

use serde::Serialize;

use crate::config::SystemConfig;
use crate::error::{Alert, AlertKind, HardwareError};
use crate::valves::RoomId;

// ───────────────────────────────────────────────────────────────
// Valve port (domain ↔ radiator valves)
// ───────────────────────────────────────────────────────────────

/// Command side and feedback side of the motorized radiator valves.
pub trait ValvePort {
    /// Fire-and-forget position command.  `Err` means the transport did
    /// not accept it; arrival is confirmed separately through feedback.
    fn send_valve_command(&mut self, room: &RoomId, percent: u8) -> Result<(), HardwareError>;

    /// Last position reported by the valve, `None` if the sensor is unreadable.
    fn read_valve_feedback(&self, room: &RoomId) -> Option<u8>;
}

// ───────────────────────────────────────────────────────────────
// Boiler port (domain ↔ appliance)
// ───────────────────────────────────────────────────────────────

/// Observed state of the heat source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoilerPhysicalState {
    On,
    Off,
}

impl BoilerPhysicalState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

pub trait BoilerPort {
    /// Command the appliance on or off.
    fn set_boiler(&mut self, on: bool) -> Result<(), HardwareError>;

    /// What the appliance is actually doing right now.
    fn read_boiler_physical_state(&self) -> BoilerPhysicalState;
}

// ───────────────────────────────────────────────────────────────
// Alert sink (domain → notifications)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget alert delivery.  Implementations decide on
/// de-duplication and notification channels.
pub trait AlertSink {
    fn report_error(&mut self, alert: &Alert);

    /// The condition behind `kind` (optionally for one room) has resolved.
    fn clear_error(&mut self, kind: AlertKind, room: Option<&RoomId>);
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → status publication / logging)
// ───────────────────────────────────────────────────────────────

pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Valve hold capability (boiler FSM → corrective actors)
// ───────────────────────────────────────────────────────────────

/// Narrow read-only view of the boiler FSM.  Anything that corrects valve
/// positions asks this first, so it never fights a safety hold.
pub trait ValveHoldQuery {
    fn is_valve_hold_active(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads system configuration.
///
/// Implementations MUST return only validated configuration
/// (see [`SystemConfig::validate`]).  Out-of-range values are rejected
/// with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<SystemConfig, ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No configuration found at the expected location.
    NotFound,
    /// Stored configuration could not be parsed.
    Corrupted,
    /// A field failed range or consistency validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
