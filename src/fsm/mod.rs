//! Boiler safety state machine: function-pointer table engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                          │
//! │  ┌──────────────────┬──────────────┬─────────────┬────────────────┐  │
//! │  │ BoilerState      │ on_enter     │ on_exit     │ on_update      │  │
//! │  ├──────────────────┼──────────────┼─────────────┼────────────────┤  │
//! │  │ Off              │ fn(ctx,from) │ -           │ fn(ctx)->Opt<> │  │
//! │  │ PendingOn        │ fn(ctx,from) │ -           │ fn(ctx)->Opt<> │  │
//! │  │ On               │ fn(ctx,from) │ fn(ctx,to)  │ fn(ctx)->Opt<> │  │
//! │  │ PendingOff       │ fn(ctx,from) │ fn(ctx,to)  │ fn(ctx)->Opt<> │  │
//! │  │ PumpOverrun      │ fn(ctx,from) │ fn(ctx,to)  │ fn(ctx)->Opt<> │  │
//! │  │ InterlockBlocked │ fn(ctx,from) │ fn(ctx,to)  │ fn(ctx)->Opt<> │  │
//! │  └──────────────────┴──────────────┴─────────────┴────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each update the engine calls `on_update` for the current state.  If it
//! returns `Some(next)`, the engine runs `on_exit(current, next)`, then
//! `on_enter(next, current)`.  At most one transition happens per update.
//!
//! [`BoilerFsm`] wraps the engine and its [`FsmContext`] into the single
//! owned boiler object the control service holds.

pub mod context;
pub mod states;
pub mod timers;

use std::time::{Duration, Instant};

use core::fmt;
use log::{info, warn};
use serde::Serialize;

use crate::app::ports::ValveHoldQuery;
use crate::config::BoilerConfig;
use crate::error::AlertKind;
use crate::interlock;
use crate::valves::{PercentMap, RoomId};

use context::{BoilerInputs, BoilerOutputs, FsmContext, PersistenceCommand};
use timers::TimerRemaining;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum BoilerState {
    Off = 0,
    PendingOn = 1,
    On = 2,
    PendingOff = 3,
    PumpOverrun = 4,
    InterlockBlocked = 5,
}

impl BoilerState {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Off,
        Self::PendingOn,
        Self::On,
        Self::PendingOff,
        Self::PumpOverrun,
        Self::InterlockBlocked,
    ];

    /// Returns `Off` for out-of-range indices (debug builds assert).
    pub fn from_index(idx: usize) -> Self {
        Self::ALL.get(idx).copied().unwrap_or_else(|| {
            debug_assert!(false, "invalid state index: {idx}");
            Self::Off
        })
    }

    /// Burner lit as far as the FSM is concerned.
    pub fn is_firing(self) -> bool {
        matches!(self, Self::On | Self::PendingOff)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::PendingOn => "PENDING_ON",
            Self::On => "ON",
            Self::PendingOff => "PENDING_OFF",
            Self::PumpOverrun => "PUMP_OVERRUN",
            Self::InterlockBlocked => "INTERLOCK_BLOCKED",
        }
    }
}

impl fmt::Display for BoilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` receives the previous state, `on_exit` the next one.
pub type StateActionFn = fn(&mut FsmContext, BoilerState);

/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<BoilerState>;

pub struct StateDescriptor {
    pub id: BoilerState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; BoilerState::COUNT],
    current: usize,
    entry_time: Instant,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; BoilerState::COUNT], initial: BoilerState, now: Instant) -> Self {
        Self {
            table,
            current: initial as usize,
            entry_time: now,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("Boiler FSM starting in state: {}", self.table[self.current].name);
        self.entry_time = ctx.now;
        let current = self.current_state();
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx, current);
        }
    }

    /// Run `on_update` for the current state and apply its transition.
    /// Returns `(from, to)` when a transition happened.
    pub fn update(&mut self, ctx: &mut FsmContext) -> Option<(BoilerState, BoilerState)> {
        let next = (self.table[self.current].on_update)(ctx)?;
        let from = self.current_state();
        self.transition(next, ctx);
        Some((from, next))
    }

    /// Transition immediately, bypassing `on_update`.
    pub fn force_transition(&mut self, next: BoilerState, ctx: &mut FsmContext) -> bool {
        if next as usize == self.current {
            return false;
        }
        self.transition(next, ctx);
        true
    }

    pub fn current_state(&self) -> BoilerState {
        BoilerState::from_index(self.current)
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entry_time)
    }

    fn transition(&mut self, next: BoilerState, ctx: &mut FsmContext) {
        let from = self.current_state();
        let next_idx = next as usize;

        info!(
            "Boiler FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx, next);
        }

        self.current = next_idx;
        self.entry_time = ctx.now;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx, from);
        }
    }
}

// ---------------------------------------------------------------------------
// Boiler FSM (engine + context, one owned instance)
// ---------------------------------------------------------------------------

/// Result of one [`BoilerFsm::update`].
#[derive(Debug, Clone, Default)]
pub struct BoilerStep {
    pub transition: Option<(BoilerState, BoilerState)>,
    pub outputs: BoilerOutputs,
}

pub struct BoilerFsm {
    engine: Fsm,
    ctx: FsmContext,
}

impl BoilerFsm {
    /// Construct in OFF.  Call [`start`](Self::start) before the first update.
    pub fn new(config: BoilerConfig, now: Instant) -> Self {
        Self {
            engine: Fsm::new(states::build_state_table(), BoilerState::Off, now),
            ctx: FsmContext::new(config, now),
        }
    }

    pub fn start(&mut self, now: Instant) -> BoilerOutputs {
        self.ctx.now = now;
        self.engine.start(&mut self.ctx);
        self.ctx.take_outputs()
    }

    /// Persistence the boiler wants in place before valves are resolved
    /// this cycle.
    ///
    /// `targets` are the calling rooms with the percentage each would get
    /// without persistence.  `commanded` is the actuator's current view.
    pub fn plan_valve_overrides(
        &mut self,
        now: Instant,
        targets: &[(RoomId, u8)],
        commanded: &PercentMap,
    ) -> PersistenceCommand {
        self.ctx.now = now;
        match self.engine.current_state() {
            BoilerState::PendingOff => {
                return PersistenceCommand::Publish {
                    overrides: self.ctx.valve_snapshot.clone(),
                    reason: "off delay",
                };
            }
            BoilerState::PumpOverrun => {
                return PersistenceCommand::Publish {
                    overrides: self.ctx.valve_snapshot.clone(),
                    reason: "pump overrun",
                };
            }
            BoilerState::On if targets.is_empty() => {
                if !self.ctx.must_hold_valves {
                    info!("Boiler FSM: demand gone during min_on, holding valves");
                    self.ctx.valve_snapshot = commanded.clone();
                    self.ctx.must_hold_valves = true;
                }
                return PersistenceCommand::Publish {
                    overrides: self.ctx.valve_snapshot.clone(),
                    reason: "min_on hold",
                };
            }
            _ => {}
        }

        if self.ctx.must_hold_valves {
            info!("Boiler FSM: demand returned, releasing valve hold");
            self.ctx.valve_snapshot.clear();
            self.ctx.must_hold_valves = false;
        }
        match interlock::plan_persistence(targets, self.ctx.config.min_valve_open_percent) {
            Some(overrides) => PersistenceCommand::Publish {
                overrides,
                reason: "valve interlock",
            },
            None => PersistenceCommand::Clear,
        }
    }

    /// One FSM pass: desync check, then at most one transition.
    pub fn update(&mut self, now: Instant, inputs: BoilerInputs) -> BoilerStep {
        self.ctx.now = now;
        self.ctx.inputs = inputs;

        let transition = match self.check_desync() {
            Some(t) => Some(t),
            None => self.engine.update(&mut self.ctx),
        };
        BoilerStep {
            transition,
            outputs: self.ctx.take_outputs(),
        }
    }

    /// A raised desync alert stays up until one pass sees the FSM and the
    /// appliance agree again.
    fn check_desync(&mut self) -> Option<(BoilerState, BoilerState)> {
        let state = self.engine.current_state();
        let physically_on = self.ctx.inputs.physical.is_on();

        if state.is_firing() == physically_on {
            if self.ctx.desync_alert_active {
                info!("Boiler FSM: appliance back in step with {state}");
                self.ctx.clear_alert(AlertKind::StateDesync);
                self.ctx.desync_alert_active = false;
            }
            return None;
        }
        self.ctx.desync_alert_active = true;

        if state.is_firing() {
            warn!("Boiler FSM: in {state} but appliance observed off, correcting to OFF");
            self.ctx
                .raise(AlertKind::StateDesync, &format!("{state} but appliance is off"));
            self.ctx.outputs.desync_corrected = true;
            self.engine.force_transition(BoilerState::Off, &mut self.ctx);
            self.ctx.timers.min_on.cancel();
            self.ctx.timers.off_delay.cancel();
            self.ctx.set_reason("desync: appliance found off");
            return Some((state, BoilerState::Off));
        }

        warn!("Boiler FSM: in {state} but appliance observed on, re-sending off");
        self.ctx
            .raise(AlertKind::StateDesync, &format!("{state} but appliance is on"));
        self.ctx.outputs.desync_corrected = true;
        self.ctx.command_boiler(false);
        None
    }

    pub fn state(&self) -> BoilerState {
        self.engine.current_state()
    }

    pub fn reason(&self) -> &str {
        self.ctx.reason.as_str()
    }

    pub fn must_hold_valves(&self) -> bool {
        self.ctx.must_hold_valves
    }

    pub fn valve_snapshot(&self) -> &PercentMap {
        &self.ctx.valve_snapshot
    }

    pub fn time_in_state(&self, now: Instant) -> Duration {
        self.engine.time_in_state(now)
    }

    pub fn timers_remaining(&self, now: Instant) -> TimerRemaining {
        self.ctx.timers.remaining(now)
    }

    pub fn config(&self) -> &BoilerConfig {
        &self.ctx.config
    }
}

impl ValveHoldQuery for BoilerFsm {
    fn is_valve_hold_active(&self) -> bool {
        self.ctx.must_hold_valves
    }
}
