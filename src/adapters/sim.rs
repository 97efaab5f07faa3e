//! In-memory simulated plant.
//!
//! Implements [`ValvePort`] and [`BoilerPort`] for the host runner and for
//! tests.  Valves travel to a commanded position after a fixed travel
//! time; the boiler follows `set_boiler` immediately.  External
//! interference (a hand-turned valve, a stuck head, a boiler switched
//! off at the wall) can be injected.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::app::ports::{BoilerPhysicalState, BoilerPort, ValvePort};
use crate::error::HardwareError;
use crate::valves::RoomId;

#[derive(Debug, Clone)]
struct SimValve {
    position: u8,
    target: u8,
    commanded_at: Option<Instant>,
    /// Head jams at this position whatever it is told.
    stuck_at: Option<u8>,
    /// Feedback sensor unreadable.
    offline: bool,
}

pub struct SimPlant {
    valves: BTreeMap<RoomId, SimValve>,
    travel: Duration,
    now: Instant,
    boiler_on: bool,
    boiler_switches: u32,
}

impl SimPlant {
    pub fn new<'a>(rooms: impl IntoIterator<Item = &'a RoomId>, travel: Duration, now: Instant) -> Self {
        Self {
            valves: rooms
                .into_iter()
                .map(|r| {
                    (
                        r.clone(),
                        SimValve {
                            position: 0,
                            target: 0,
                            commanded_at: None,
                            stuck_at: None,
                            offline: false,
                        },
                    )
                })
                .collect(),
            travel,
            now,
            boiler_on: false,
            boiler_switches: 0,
        }
    }

    /// Advance simulated time.  Returns the valves whose reported
    /// position changed, as feedback notifications.
    pub fn advance_to(&mut self, now: Instant) -> Vec<(RoomId, u8)> {
        self.now = now;
        let mut changed = Vec::new();
        for (room, valve) in &mut self.valves {
            let Some(at) = valve.commanded_at else {
                continue;
            };
            if now.saturating_duration_since(at) < self.travel {
                continue;
            }
            valve.commanded_at = None;
            let arrived = valve.stuck_at.unwrap_or(valve.target);
            if arrived != valve.position {
                valve.position = arrived;
                if !valve.offline {
                    changed.push((room.clone(), arrived));
                }
            }
        }
        changed
    }

    /// Someone turned the valve by hand.  Returns the notification to deliver.
    pub fn disturb(&mut self, room: &RoomId, percent: u8) -> Option<(RoomId, u8)> {
        let valve = self.valves.get_mut(room)?;
        valve.position = percent.min(100);
        valve.commanded_at = None;
        (!valve.offline).then(|| (room.clone(), valve.position))
    }

    /// Jam the valve head at `percent` (or free it with `None`).
    pub fn set_stuck(&mut self, room: &RoomId, percent: Option<u8>) {
        if let Some(v) = self.valves.get_mut(room) {
            v.stuck_at = percent;
        }
    }

    pub fn set_offline(&mut self, room: &RoomId, offline: bool) {
        if let Some(v) = self.valves.get_mut(room) {
            v.offline = offline;
        }
    }

    /// The appliance goes off without the controller asking.
    pub fn switch_boiler_off_externally(&mut self) {
        self.boiler_on = false;
    }

    pub fn position(&self, room: &RoomId) -> Option<u8> {
        self.valves.get(room).map(|v| v.position)
    }

    pub fn is_boiler_on(&self) -> bool {
        self.boiler_on
    }

    /// Number of on/off switches the controller requested.
    pub fn boiler_switches(&self) -> u32 {
        self.boiler_switches
    }
}

impl ValvePort for SimPlant {
    fn send_valve_command(&mut self, room: &RoomId, percent: u8) -> Result<(), HardwareError> {
        let valve = self
            .valves
            .get_mut(room)
            .ok_or(HardwareError::CommandRejected("no such valve"))?;
        if valve.offline {
            return Err(HardwareError::Unavailable);
        }
        debug!("Sim: valve {room} commanded to {percent}%");
        valve.target = percent.min(100);
        valve.commanded_at = Some(self.now);
        Ok(())
    }

    fn read_valve_feedback(&self, room: &RoomId) -> Option<u8> {
        self.valves
            .get(room)
            .filter(|v| !v.offline)
            .map(|v| v.position)
    }
}

impl BoilerPort for SimPlant {
    fn set_boiler(&mut self, on: bool) -> Result<(), HardwareError> {
        if self.boiler_on != on {
            self.boiler_switches += 1;
        }
        debug!("Sim: boiler {}", if on { "on" } else { "off" });
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
