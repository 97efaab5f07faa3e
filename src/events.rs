//! Recompute triggers for the serialized control loop.
//!
//! Triggers are produced by:
//! - the periodic control tick
//! - the demand layer (room demand changed)
//! - valve feedback sensors (position report)
//! - the appliance (observed on/off change)
//! - external commands (load sharing)
//!
//! The runner owns one [`TriggerQueue`] and processes triggers one at a
//! time in FIFO order.  Each trigger runs exactly one full pass, and
//! passes never overlap.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────────┐
//! │ Tick         │────▶│              │     │                      │
//! │ Demand       │────▶│ TriggerQueue │────▶│ ControlService pass  │
//! │ Feedback     │────▶│   (FIFO)     │     │ (one at a time)      │
//! │ Command      │────▶│              │     │                      │
//! └──────────────┘     └──────────────┘     └──────────────────────┘
//! ```

use log::warn;

use crate::app::commands::AppCommand;
use crate::valves::RoomId;

/// Maximum number of pending triggers.
pub const TRIGGER_QUEUE_CAP: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Periodic control loop tick.
    Tick,
    /// The demand layer produced new per-room demand.
    DemandChanged,
    /// A valve reported a new position.
    FeedbackChanged { room: RoomId, percent: u8 },
    /// The appliance was observed switching on or off.
    BoilerStateChanged,
    /// Inbound command from an adapter.
    Command(AppCommand),
}

#[derive(Debug, Default)]
pub struct TriggerQueue {
    queue: heapless::Deque<Trigger, TRIGGER_QUEUE_CAP>,
    dropped: u32,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a trigger.  Returns `false` if the queue is full (trigger dropped).
    pub fn push(&mut self, trigger: Trigger) -> bool {
        match self.queue.push_back(trigger) {
            Ok(()) => true,
            Err(t) => {
                self.dropped = self.dropped.saturating_add(1);
                warn!("Trigger queue full, dropping {t:?}");
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<Trigger> {
        self.queue.pop_front()
    }

    /// Hand every pending trigger to `handler`, oldest first.  Triggers
    /// pushed by the handler are not seen until the next drain.
    pub fn drain(&mut self, mut handler: impl FnMut(Trigger)) {
        let pending = self.queue.len();
        for _ in 0..pending {
            match self.queue.pop_front() {
                Some(t) => handler(t),
                None => break,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Triggers lost to a full queue since construction.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
