//! Feedback-check scheduler.
//!
//! Valve commands are confirmed by reading feedback a fixed delay after
//! the command goes out.  Instead of sleeping, the actuator books a
//! continuation here and the control loop drains due entries on every
//! pass.  Everything runs in the same serialized context as the rest of
//! the core, so a fired check is a continuation, not a parallel task.
//!
//! ```text
//!  set_valve ──▶ schedule(room, token, now + delay)
//!                      │
//!  control pass ──▶ take_due(now) ──▶ actuator.on_feedback_check(room, token)
//!                                        (stale token → ignored)
//! ```
//!
//! At most one check is pending per room.  Booking a new one replaces the
//! old entry, and the token lets the actuator reject anything that was
//! already taken out of the queue before it was superseded.

use std::collections::BTreeMap;
use std::time::Instant;

use log::debug;
use serde::Serialize;

use crate::valves::RoomId;

/// Generation tag of one logical valve command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct CommandToken(pub u64);

impl CommandToken {
    /// The token that supersedes this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A check taken out of the scheduler because its deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCheck {
    pub room: RoomId,
    pub token: CommandToken,
    pub due: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Booking {
    token: CommandToken,
    due: Instant,
}

/// Pending feedback checks, one slot per room.
#[derive(Debug, Default)]
pub struct FeedbackScheduler {
    pending: BTreeMap<RoomId, Booking>,
}

impl FeedbackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book a check for `room`.  Returns the token it replaced, if any.
    pub fn schedule(&mut self, room: &RoomId, token: CommandToken, due: Instant) -> Option<CommandToken> {
        let replaced = self
            .pending
            .insert(room.clone(), Booking { token, due })
            .map(|b| b.token);
        if let Some(old) = replaced {
            debug!("Scheduler: {room} check {:?} superseded by {:?}", old, token);
        }
        replaced
    }

    /// Remove and return every check whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueCheck> {
        let due_rooms: Vec<RoomId> = self
            .pending
            .iter()
            .filter(|(_, b)| b.due <= now)
            .map(|(room, _)| room.clone())
            .collect();

        let mut out: Vec<DueCheck> = due_rooms
            .into_iter()
            .filter_map(|room| {
                self.pending.remove(&room).map(|b| DueCheck {
                    room,
                    token: b.token,
                    due: b.due,
                })
            })
            .collect();
        out.sort_by(|a, b| a.due.cmp(&b.due).then_with(|| a.room.cmp(&b.room)));
        out
    }

    /// Earliest pending deadline, if anything is booked.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|b| b.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
