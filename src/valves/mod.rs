//! Radiator valve arbitration and actuation.
//!
//! ```text
//!  demand ─▶ ValveCoordinator ─(final %, is_correction)─▶ ValveActuator ─▶ ValvePort
//!               ▲   persistence (boiler FSM)                  │
//!               │   load sharing (external)                   │ feedback checks,
//!               └── correction (actuator) ◀───────────────────┘ drift detection
//! ```
//!
//! Percentages are whole numbers in `0..=100`.

pub mod actuator;
pub mod coordinator;

use core::fmt;
use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use actuator::{CommandPhase, RoomValveState, ValveActuator};
pub use coordinator::{OverrideTier, ValveCoordinator};

/// Identifier of a configured room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for RoomId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-room heat demand produced by the target-resolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomDemand {
    /// Room is asking for heat.
    pub calling: bool,
    /// Valve opening the demand layer wants (0–100).
    pub desired_percent: u8,
}

impl RoomDemand {
    pub fn calling(desired_percent: u8) -> Self {
        Self {
            calling: true,
            desired_percent: desired_percent.min(100),
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }
}

/// Demand for every room this cycle.  Rooms missing from the map are idle at 0%.
pub type DemandMap = BTreeMap<RoomId, RoomDemand>;

/// Valve percentages keyed by room, used for override tiers and snapshots.
pub type PercentMap = BTreeMap<RoomId, u8>;

/// Rooms currently calling for heat, in stable order.
pub fn calling_rooms(demand: &DemandMap) -> Vec<RoomId> {
    demand
        .iter()
        .filter(|(_, d)| d.calling)
        .map(|(room, _)| room.clone())
        .collect()
}

/// Absolute distance between two percentages.
pub fn percent_delta(a: u8, b: u8) -> u8 {
    a.abs_diff(b)
}
