//! Boiler state handlers and table builder.
//!
//! Each state is three plain `fn` pointers.  Entry and exit actions get the
//! state on the other side of the transition, so a single handler can
//! tell an emergency stop from a normal one.
//!
//! ```text
//!   demand, satisfiable, min_off done        confirmed, interlock ok, min_off done
//!  OFF ─────────────────────▶ PENDING_ON ─────────────────────────────────▶ ON
//!   ▲ │ demand, unsatisfiable   │  ▲                                        │ │
//!   │ ▼                         │  │ demand returns         interlock lost │ │ no demand,
//!   │ INTERLOCK_BLOCKED ◀───────┘  │                    (emergency → OFF) ◀─┘ │ min_on done
//!   │                              │                                          ▼
//!   └──── overrun done ──── PUMP_OVERRUN ◀──── off_delay done ──── PENDING_OFF
//!                                                                  (demand → ON)
//! ```

use log::{error, info, warn};

use crate::error::AlertKind;

use super::context::FsmContext;
use super::{BoilerState, StateDescriptor};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; BoilerState::COUNT] {
    [
        StateDescriptor {
            id: BoilerState::Off,
            name: "OFF",
            on_enter: Some(off_enter),
            on_exit: None,
            on_update: off_update,
        },
        StateDescriptor {
            id: BoilerState::PendingOn,
            name: "PENDING_ON",
            on_enter: Some(pending_on_enter),
            on_exit: None,
            on_update: pending_on_update,
        },
        StateDescriptor {
            id: BoilerState::On,
            name: "ON",
            on_enter: Some(on_enter),
            on_exit: Some(on_exit),
            on_update: on_update,
        },
        StateDescriptor {
            id: BoilerState::PendingOff,
            name: "PENDING_OFF",
            on_enter: Some(pending_off_enter),
            on_exit: Some(pending_off_exit),
            on_update: pending_off_update,
        },
        StateDescriptor {
            id: BoilerState::PumpOverrun,
            name: "PUMP_OVERRUN",
            on_enter: Some(pump_overrun_enter),
            on_exit: Some(pump_overrun_exit),
            on_update: pump_overrun_update,
        },
        StateDescriptor {
            id: BoilerState::InterlockBlocked,
            name: "INTERLOCK_BLOCKED",
            on_enter: Some(interlock_blocked_enter),
            on_exit: Some(interlock_blocked_exit),
            on_update: interlock_blocked_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF
// ═══════════════════════════════════════════════════════════════════════════

fn off_enter(ctx: &mut FsmContext, from: BoilerState) {
    if from.is_firing() {
        ctx.command_boiler(false);
        ctx.timers.min_off.start(ctx.now);
    }
    ctx.release_valves();
    ctx.set_reason("no demand");
}

fn off_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    if !ctx.inputs.has_demand() {
        return None;
    }
    if !ctx.inputs.interlock.satisfiable {
        return Some(BoilerState::InterlockBlocked);
    }
    // Anti-cycling: no new ignition attempt until min_off has run out.
    if ctx.timers.min_off.is_active(ctx.now) {
        let left = ctx.timers.min_off.remaining(ctx.now).unwrap_or_default();
        ctx.set_reason(&format!("anti-cycling, {}s of min_off left", left.as_secs()));
        return None;
    }
    Some(BoilerState::PendingOn)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PENDING_ON: waiting for valves to open before ignition
// ═══════════════════════════════════════════════════════════════════════════

fn pending_on_enter(ctx: &mut FsmContext, _from: BoilerState) {
    ctx.set_reason("waiting for valves to open");
}

fn pending_on_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    if !ctx.inputs.has_demand() {
        return Some(BoilerState::Off);
    }
    let interlock = ctx.inputs.interlock;
    if !interlock.satisfiable {
        return Some(BoilerState::InterlockBlocked);
    }

    if !interlock.satisfied {
        ctx.set_reason(&format!(
            "interlock {}% of {}%",
            interlock.aggregate_percent, interlock.required_percent
        ));
        return None;
    }
    if !ctx.inputs.feedback_confirmed {
        ctx.set_reason("waiting for valve feedback");
        return None;
    }
    if let Some(left) = ctx.timers.min_off.remaining(ctx.now).filter(|d| !d.is_zero()) {
        ctx.set_reason(&format!("anti-cycling, {}s of min_off left", left.as_secs()));
        return None;
    }
    Some(BoilerState::On)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ON: firing
// ═══════════════════════════════════════════════════════════════════════════

fn on_enter(ctx: &mut FsmContext, from: BoilerState) {
    if from == BoilerState::PendingOff {
        // Still lit; min_on already served.
        ctx.set_reason("demand returned");
        return;
    }
    ctx.command_boiler(true);
    ctx.timers.min_on.start(ctx.now);
    ctx.clear_alert(AlertKind::EmergencyInterlockLoss);
    ctx.set_reason("heating");
    info!(
        "ON: firing for {} calling room(s), interlock {}%",
        ctx.inputs.calling_rooms.len(),
        ctx.inputs.interlock.aggregate_percent
    );
}

fn on_exit(ctx: &mut FsmContext, to: BoilerState) {
    if to == BoilerState::Off {
        ctx.timers.min_on.cancel();
    }
}

fn on_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    let interlock = ctx.inputs.interlock;
    if ctx.inputs.has_demand() && !interlock.satisfied {
        error!(
            "ON: interlock lost while firing ({}% of {}%), emergency shutdown",
            interlock.aggregate_percent, interlock.required_percent
        );
        ctx.raise(
            AlertKind::EmergencyInterlockLoss,
            &format!(
                "valve opening fell to {}% of {}% while firing",
                interlock.aggregate_percent, interlock.required_percent
            ),
        );
        ctx.outputs.emergency_shutdown = true;
        return Some(BoilerState::Off);
    }

    if ctx.inputs.has_demand() {
        return None;
    }
    if ctx.timers.min_on.is_active(ctx.now) {
        ctx.set_reason("no demand, serving min_on");
        return None;
    }
    Some(BoilerState::PendingOff)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PENDING_OFF: still lit, valves frozen at the snapshot
// ═══════════════════════════════════════════════════════════════════════════

fn pending_off_enter(ctx: &mut FsmContext, _from: BoilerState) {
    ctx.capture_snapshot("off delay");
    ctx.timers.off_delay.start(ctx.now);
    ctx.set_reason("off delay");
    info!("PENDING_OFF: holding {} valve(s)", ctx.valve_snapshot.len());
}

fn pending_off_exit(ctx: &mut FsmContext, to: BoilerState) {
    ctx.timers.off_delay.cancel();
    if to != BoilerState::PumpOverrun {
        ctx.release_valves();
    }
}

fn pending_off_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    if ctx.inputs.has_demand() {
        if ctx.inputs.interlock.satisfied {
            return Some(BoilerState::On);
        }
        // Valves are frozen at the snapshot; let the shutdown run and
        // re-plan the interlock from PENDING_ON.
        ctx.set_reason("demand returned, interlock not met");
    }
    if ctx.timers.off_delay.is_elapsed(ctx.now) {
        return Some(BoilerState::PumpOverrun);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PUMP_OVERRUN: burner off, circulating through the snapshot
// ═══════════════════════════════════════════════════════════════════════════

fn pump_overrun_enter(ctx: &mut FsmContext, _from: BoilerState) {
    ctx.command_boiler(false);
    ctx.timers.min_off.start(ctx.now);
    ctx.timers.pump_overrun.start(ctx.now);
    ctx.publish_snapshot("pump overrun");
    ctx.set_reason("pump overrun");
}

fn pump_overrun_exit(ctx: &mut FsmContext, _to: BoilerState) {
    ctx.timers.pump_overrun.cancel();
    ctx.release_valves();
}

fn pump_overrun_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    if ctx.inputs.has_demand() {
        return Some(BoilerState::PendingOn);
    }
    if ctx.timers.pump_overrun.is_elapsed(ctx.now) {
        return Some(BoilerState::Off);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  INTERLOCK_BLOCKED: demand present but too few valves could open
// ═══════════════════════════════════════════════════════════════════════════

fn interlock_blocked_enter(ctx: &mut FsmContext, _from: BoilerState) {
    let interlock = ctx.inputs.interlock;
    warn!(
        "INTERLOCK_BLOCKED: {} calling room(s) cannot reach {}%",
        interlock.calling_rooms, interlock.required_percent
    );
    ctx.raise(
        AlertKind::InterlockFailure,
        &format!(
            "{} calling room(s) cannot provide {}% valve opening",
            interlock.calling_rooms, interlock.required_percent
        ),
    );
    ctx.set_reason("interlock not satisfiable");
}

fn interlock_blocked_exit(ctx: &mut FsmContext, _to: BoilerState) {
    ctx.clear_alert(AlertKind::InterlockFailure);
}

fn interlock_blocked_update(ctx: &mut FsmContext) -> Option<BoilerState> {
    if !ctx.inputs.has_demand() {
        return Some(BoilerState::Off);
    }
    if ctx.inputs.interlock.satisfiable {
        // OFF carries the min_off hold after a shutdown.
        if ctx.timers.min_off.is_active(ctx.now) {
            return Some(BoilerState::Off);
        }
        return Some(BoilerState::PendingOn);
    }
    None
}
