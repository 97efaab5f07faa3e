//! Valve coordinator: one authoritative target per room per cycle.
//!
//! Resolution order, first match wins:
//!
//! | Tier         | Owner                         | Bypasses rate limit |
//! |--------------|-------------------------------|---------------------|
//! | persistence  | boiler FSM                    | yes                 |
//! | load sharing | external policy (`AppCommand`) | no                 |
//! | correction   | valve actuator                | yes                 |
//! | demand       | room demand layer             | no                  |
//!
//! Lower tiers are ignored, never blended.  Removing a room from an
//! override tier marks it *released*: its next resolution is sent as a
//! correction so the valve actually moves back to the lower tier's value.

use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::app::ports::{AlertSink, ValvePort};
use crate::error::bounded_text;

use super::actuator::{SetValveOutcome, ValveActuator};
use super::{DemandMap, PercentMap, RoomId};

/// Maximum length of an override reason.
pub const REASON_LEN: usize = 48;

/// Which source decided a room's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OverrideTier {
    Persistence,
    LoadSharing,
    Correction,
    Demand,
}

/// One active override map with the reason it was published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideLayer {
    pub overrides: PercentMap,
    pub reason: heapless::String<REASON_LEN>,
}

/// Outcome of resolving one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub percent: u8,
    pub tier: OverrideTier,
    pub is_correction: bool,
}

/// A command the coordinator caused the actuator to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCommand {
    pub room: RoomId,
    pub percent: u8,
    pub tier: OverrideTier,
    pub is_correction: bool,
}

#[derive(Debug, Default)]
pub struct ValveCoordinator {
    persistence: Option<OverrideLayer>,
    load_sharing: Option<OverrideLayer>,
    released: BTreeSet<RoomId>,
}

impl ValveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Override tiers ────────────────────────────────────────

    /// Republishing the current map only refreshes the reason.
    pub fn set_persistence_overrides(&mut self, overrides: PercentMap, reason: &str) {
        if let Some(layer) = self.persistence.as_mut().filter(|l| l.overrides == overrides) {
            if layer.reason.as_str() != reason {
                debug!("Coordinator: persistence reason {} -> {reason}", layer.reason);
                layer.reason = bounded_text(reason);
            }
            return;
        }
        info!("Coordinator: persistence override set ({reason}): {overrides:?}");
        Self::replace(&mut self.persistence, &mut self.released, overrides, reason);
    }

    /// Returns `true` if a persistence layer was active.
    pub fn clear_persistence_overrides(&mut self) -> bool {
        Self::clear(&mut self.persistence, &mut self.released, "persistence")
    }

    pub fn set_load_sharing_overrides(&mut self, overrides: PercentMap, reason: &str) {
        info!("Coordinator: load sharing override set ({reason}): {overrides:?}");
        Self::replace(&mut self.load_sharing, &mut self.released, overrides, reason);
    }

    /// Returns `true` if a load sharing layer was active.
    pub fn clear_load_sharing_overrides(&mut self) -> bool {
        Self::clear(&mut self.load_sharing, &mut self.released, "load sharing")
    }

    pub fn persistence(&self) -> Option<&OverrideLayer> {
        self.persistence.as_ref()
    }

    pub fn load_sharing(&self) -> Option<&OverrideLayer> {
        self.load_sharing.as_ref()
    }

    /// Rooms awaiting a compensating command after leaving an override tier.
    pub fn released(&self) -> impl Iterator<Item = &RoomId> {
        self.released.iter()
    }

    // ── Resolution ────────────────────────────────────────────

    /// Final target for `room` given its demand and the actuator's corrections.
    pub fn resolve(&self, room: &RoomId, demand_percent: u8, actuator: &ValveActuator) -> Resolution {
        let released = self.released.contains(room);
        let pick = |percent: u8, tier: OverrideTier, correction: bool| Resolution {
            percent: percent.min(100),
            tier,
            is_correction: correction || released,
        };

        if let Some(p) = tier_value(self.persistence.as_ref(), room) {
            return pick(p, OverrideTier::Persistence, true);
        }
        if let Some(p) = tier_value(self.load_sharing.as_ref(), room) {
            return pick(p, OverrideTier::LoadSharing, false);
        }
        if let Some(p) = actuator.correction(room) {
            return pick(p, OverrideTier::Correction, true);
        }
        pick(demand_percent, OverrideTier::Demand, false)
    }

    /// Target `room` would get if no persistence override existed.  The
    /// boiler FSM plans interlock persistence from this so it never feeds
    /// back on its own previous override.
    pub fn resolve_unpersisted(&self, room: &RoomId, demand_percent: u8, actuator: &ValveActuator) -> u8 {
        tier_value(self.load_sharing.as_ref(), room)
            .or_else(|| actuator.correction(room))
            .unwrap_or(demand_percent)
            .min(100)
    }

    /// Resolve every configured room and hand the result to the actuator.
    ///
    /// Rooms absent from `demand` are treated as idle at 0%.  Returns the
    /// commands that were actually sent.
    pub fn apply(
        &mut self,
        demand: &DemandMap,
        actuator: &mut ValveActuator,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
        now: Instant,
    ) -> Vec<IssuedCommand> {
        let rooms: Vec<RoomId> = actuator.room_states().map(|s| s.room_id.clone()).collect();
        let mut issued = Vec::new();

        for room in rooms {
            let demand_percent = demand.get(&room).map_or(0, |d| d.desired_percent);
            let res = self.resolve(&room, demand_percent, actuator);
            let outcome = actuator.set_valve(&room, res.percent, res.is_correction, now, valves, alerts);

            if self.released.remove(&room) {
                debug!("Coordinator: {room} released to {:?} at {}%", res.tier, res.percent);
            }
            if outcome == SetValveOutcome::Sent {
                issued.push(IssuedCommand {
                    room,
                    percent: res.percent,
                    tier: res.tier,
                    is_correction: res.is_correction,
                });
            }
        }
        issued
    }

    // ── Internal ──────────────────────────────────────────────

    fn replace(
        slot: &mut Option<OverrideLayer>,
        released: &mut BTreeSet<RoomId>,
        overrides: PercentMap,
        reason: &str,
    ) {
        if let Some(old) = slot.as_ref() {
            released.extend(
                old.overrides
                    .keys()
                    .filter(|room| !overrides.contains_key(*room))
                    .cloned(),
            );
        }
        for room in overrides.keys() {
            released.remove(room);
        }
        *slot = Some(OverrideLayer {
            overrides,
            reason: bounded_text(reason),
        });
    }

    fn clear(slot: &mut Option<OverrideLayer>, released: &mut BTreeSet<RoomId>, name: &str) -> bool {
        match slot.take() {
            Some(layer) => {
                info!("Coordinator: {name} override cleared ({})", layer.reason);
                released.extend(layer.overrides.into_keys());
                true
            }
            None => false,
        }
    }
}

fn tier_value(layer: Option<&OverrideLayer>, room: &RoomId) -> Option<u8> {
    layer.and_then(|l| l.overrides.get(room).copied())
}
