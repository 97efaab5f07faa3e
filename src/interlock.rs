//! Valve interlock: minimum aggregate opening before combustion.
//!
//! The boiler may only fire while the calling rooms' commanded openings
//! add up to at least `min_valve_open_percent`.  When the demand layer
//! asks for less, the boiler FSM tops the calling rooms up through the
//! persistence tier, sharing the minimum evenly:
//!
//! ```text
//!   min 100 %, calling: lounge 20 %, study 10 %
//!   share = ceil(100 / 2) = 50 %  →  lounge 50 %, study 50 %
//! ```
//!
//! Rooms that already want more than the share keep their own target.

use serde::Serialize;

use crate::valves::{PercentMap, RoomId};

/// Interlock picture for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InterlockAssessment {
    pub calling_rooms: usize,
    /// Sum of commanded percentages over the calling rooms.
    pub aggregate_percent: u16,
    pub required_percent: u16,
    /// Enough opening right now.
    pub satisfied: bool,
    /// Enough rooms calling that fully open valves could satisfy it.
    pub satisfiable: bool,
}

/// Assess the interlock against the actuator's commanded positions.
/// Rooms never commanded count as closed.
pub fn assess(calling: &[RoomId], commanded: &PercentMap, required_percent: u16) -> InterlockAssessment {
    let aggregate_percent: u16 = calling
        .iter()
        .map(|room| u16::from(commanded.get(room).copied().unwrap_or(0)))
        .sum();
    InterlockAssessment {
        calling_rooms: calling.len(),
        aggregate_percent,
        required_percent,
        satisfied: !calling.is_empty() && aggregate_percent >= required_percent,
        satisfiable: capacity(calling.len()) >= u32::from(required_percent),
    }
}

/// Persistence overrides that lift `targets` (calling rooms and the
/// percentage each would otherwise get) up to the interlock minimum.
///
/// Returns `None` when nothing is calling or the targets already suffice.
pub fn plan_persistence(targets: &[(RoomId, u8)], required_percent: u16) -> Option<PercentMap> {
    if targets.is_empty() {
        return None;
    }
    let total: u16 = targets.iter().map(|(_, p)| u16::from(*p)).sum();
    if total >= required_percent {
        return None;
    }

    let n = u16::try_from(targets.len()).unwrap_or(u16::MAX);
    let share = required_percent.div_ceil(n).min(100);
    let share = u8::try_from(share).unwrap_or(100);
    Some(
        targets
            .iter()
            .map(|(room, p)| (room.clone(), (*p).max(share)))
            .collect(),
    )
}

fn capacity(rooms: usize) -> u32 {
    u32::try_from(rooms).unwrap_or(u32::MAX).saturating_mul(100)
}
