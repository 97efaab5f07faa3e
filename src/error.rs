//! Error and alert types for the heating core.
//!
//! Nothing in the core is fatal.  Port calls return [`HardwareError`],
//! which the core logs and folds into an [`Alert`] for the alert sink.
//! Alerts carry a [`AlertKind`] so that a later success can clear exactly
//! the condition it resolves.

use core::fmt;

use serde::Serialize;

use crate::valves::RoomId;

/// Maximum length of an alert message (characters beyond are dropped).
pub const ALERT_MESSAGE_LEN: usize = 96;

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

/// Errors returned by the valve and boiler ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// The transport refused or dropped the command.
    CommandRejected(&'static str),
    /// The device is offline or not reachable.
    Unavailable,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandRejected(why) => write!(f, "command rejected: {why}"),
            Self::Unavailable => write!(f, "device unavailable"),
        }
    }
}

impl std::error::Error for HardwareError {}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Every condition the core reports to the alert sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AlertKind {
    /// A valve command could not be handed to the transport.
    ValveCommandFailure,
    /// Retries exhausted and the valve never reported the commanded position.
    FeedbackTimeout,
    /// Retries exhausted and the valve never reported any position.
    FeedbackUnavailable,
    /// Not enough aggregate valve opening to permit ignition.
    InterlockFailure,
    /// Aggregate valve opening lost while the boiler was firing.
    EmergencyInterlockLoss,
    /// FSM state disagreed with the observed appliance state.
    StateDesync,
}

impl AlertKind {
    /// Severity used when the core raises this kind.
    pub const fn severity(self) -> Severity {
        match self {
            Self::ValveCommandFailure | Self::InterlockFailure | Self::StateDesync => {
                Severity::Warning
            }
            Self::FeedbackTimeout | Self::FeedbackUnavailable => Severity::Error,
            Self::EmergencyInterlockLoss => Severity::Critical,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValveCommandFailure => write!(f, "valve command failure"),
            Self::FeedbackTimeout => write!(f, "valve feedback timeout"),
            Self::FeedbackUnavailable => write!(f, "valve feedback unavailable"),
            Self::InterlockFailure => write!(f, "valve interlock failure"),
            Self::EmergencyInterlockLoss => write!(f, "emergency interlock loss"),
            Self::StateDesync => write!(f, "boiler state desync"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One alert handed to the [`AlertSink`](crate::app::ports::AlertSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: heapless::String<ALERT_MESSAGE_LEN>,
    pub room: Option<RoomId>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: &str) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: bounded_text(message),
            room: None,
        }
    }

    pub fn for_room(kind: AlertKind, room: &RoomId, message: &str) -> Self {
        Self {
            room: Some(room.clone()),
            ..Self::new(kind, message)
        }
    }
}

/// Copy `text` into a fixed-capacity string, dropping whatever does not fit.
/// Truncation happens on character boundaries.
pub fn bounded_text<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
