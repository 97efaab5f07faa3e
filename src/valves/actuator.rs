//! Valve actuator: command, confirm, retry, and drift correction.
//!
//! Per-room protocol:
//!
//! ```text
//!            set_valve (new target, interval elapsed or correction)
//!   IDLE ───────────────────────────────────────────────▶ AWAITING_FEEDBACK
//!    ▲   ◀── feedback within tolerance ──────────────────────┤
//!    │   ◀── retries exhausted (alert, adopt feedback) ──────┤
//!    │                                                       │ mismatch, retries left:
//!    │                                                       └─ resend, re-book check
//!    │
//!    └── feedback drift while IDLE and no boiler hold ──▶ correction (bypasses rate limit)
//! ```
//!
//! A new command for a room bumps its [`CommandToken`]; any check still
//! carrying the old token is ignored when it fires.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::app::ports::{AlertSink, ValveHoldQuery, ValvePort};
use crate::config::ValveConfig;
use crate::diagnostics::ValveCounters;
use crate::error::{Alert, AlertKind};
use crate::scheduler::{CommandToken, FeedbackScheduler};

use super::{PercentMap, RoomId, percent_delta};

/// Where a room is in the command/feedback protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandPhase {
    Idle,
    AwaitingFeedback,
}

/// Live protocol state for one room's valve.
#[derive(Debug, Clone, Serialize)]
pub struct RoomValveState {
    pub room_id: RoomId,
    /// Last position sent to the valve (`None` until the first command).
    pub commanded_percent: Option<u8>,
    /// Last position the valve reported (`None` if never read or unreadable).
    pub feedback_percent: Option<u8>,
    #[serde(skip)]
    pub last_command_time: Option<Instant>,
    pub retry_count: u8,
    pub command_phase: CommandPhase,
    pub unexpected_position: bool,
    pub token: CommandToken,
    /// Target that exhausted its retries; not retried until a different one is requested.
    pub failed_target: Option<u8>,
    #[serde(skip)]
    raised: BTreeSet<AlertKind>,
}

impl RoomValveState {
    fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            commanded_percent: None,
            feedback_percent: None,
            last_command_time: None,
            retry_count: 0,
            command_phase: CommandPhase::Idle,
            unexpected_position: false,
            token: CommandToken::default(),
            failed_target: None,
            raised: BTreeSet::new(),
        }
    }
}

/// What [`ValveActuator::set_valve`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetValveOutcome {
    /// A new command went out and a feedback check is booked.
    Sent,
    /// Target equals the commanded position already.
    Unchanged,
    /// Suppressed: too soon after the previous command.
    RateLimited,
    /// Suppressed: this exact target already exhausted its retries.
    StuckTarget,
    /// Room is not configured.
    UnknownRoom,
}

pub struct ValveActuator {
    config: ValveConfig,
    rooms: BTreeMap<RoomId, RoomValveState>,
    /// Expected positions being restored after drift.  Owned here; the
    /// coordinator only reads them.
    corrections: PercentMap,
    scheduler: FeedbackScheduler,
    counters: ValveCounters,
}

impl ValveActuator {
    pub fn new<'a>(config: ValveConfig, rooms: impl IntoIterator<Item = &'a RoomId>) -> Self {
        Self {
            config,
            rooms: rooms
                .into_iter()
                .map(|r| (r.clone(), RoomValveState::new(r.clone())))
                .collect(),
            corrections: PercentMap::new(),
            scheduler: FeedbackScheduler::new(),
            counters: ValveCounters::default(),
        }
    }

    // ── Commands ──────────────────────────────────────────────

    /// Drive `room` towards `target`.
    ///
    /// Unchanged targets are ignored.  A changed target is rate limited
    /// by `min_interval` unless `is_correction` is set.  Sending supersedes
    /// any feedback check still pending for the room.
    pub fn set_valve(
        &mut self,
        room: &RoomId,
        target: u8,
        is_correction: bool,
        now: Instant,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) -> SetValveOutcome {
        let target = target.min(100);
        let min_interval = self.config.min_interval();
        let Some(state) = self.rooms.get(room) else {
            warn!("Valve: set_valve for unknown room '{room}' ignored");
            return SetValveOutcome::UnknownRoom;
        };

        if state.commanded_percent == Some(target) {
            return SetValveOutcome::Unchanged;
        }
        if state.failed_target == Some(target) {
            debug!("Valve: {room} target {target}% previously failed, not retrying");
            return SetValveOutcome::StuckTarget;
        }
        if !is_correction {
            if let Some(last) = state.last_command_time {
                if now.saturating_duration_since(last) < min_interval {
                    debug!("Valve: {room} -> {target}% rate limited");
                    return SetValveOutcome::RateLimited;
                }
            }
        }

        info!(
            "Valve: {room} -> {target}%{}",
            if is_correction { " (correction)" } else { "" }
        );
        self.issue(room, target, now, valves, alerts);
        SetValveOutcome::Sent
    }

    /// Feedback-sensor change notification.
    ///
    /// Returns `true` if the report was out-of-band drift and a correction
    /// went out.  Drift is ignored while a command is in flight (the pending
    /// check owns that case) and while the boiler is holding valves.
    pub fn on_feedback_changed(
        &mut self,
        room: &RoomId,
        percent: u8,
        now: Instant,
        hold: &impl ValveHoldQuery,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) -> bool {
        let tolerance = self.config.tolerance_percent;
        let Some(state) = self.rooms.get_mut(room) else {
            return false;
        };
        state.feedback_percent = Some(percent.min(100));

        if state.command_phase != CommandPhase::Idle {
            return false;
        }
        let Some(expected) = state.commanded_percent else {
            return false;
        };
        if percent_delta(percent, expected) <= tolerance {
            state.unexpected_position = false;
            return false;
        }
        if hold.is_valve_hold_active() {
            debug!("Valve: {room} at {percent}% (expected {expected}%), boiler hold active");
            return false;
        }

        warn!("Valve: {room} unexpectedly at {percent}% (expected {expected}%), correcting");
        state.unexpected_position = true;
        self.corrections.insert(room.clone(), expected);
        self.counters.corrections += 1;
        self.issue(room, expected, now, valves, alerts);
        true
    }

    /// Fire every feedback check whose delay has elapsed.
    pub fn poll_feedback_checks(
        &mut self,
        now: Instant,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) {
        for check in self.scheduler.take_due(now) {
            self.on_feedback_check(&check.room, check.token, now, valves, alerts);
        }
    }

    /// Continuation booked by a command: compare feedback to the commanded
    /// position, then succeed, retry, or give up.
    pub fn on_feedback_check(
        &mut self,
        room: &RoomId,
        token: CommandToken,
        now: Instant,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) {
        let tolerance = self.config.tolerance_percent;
        let max_retries = self.config.max_retries;
        let delay = self.config.feedback_delay();

        let Some(state) = self.rooms.get_mut(room) else {
            return;
        };
        if state.token != token || state.command_phase != CommandPhase::AwaitingFeedback {
            debug!("Valve: stale feedback check for {room} ({:?}) dropped", token);
            return;
        }
        let Some(commanded) = state.commanded_percent else {
            state.command_phase = CommandPhase::Idle;
            return;
        };

        let feedback = valves.read_valve_feedback(room);
        state.feedback_percent = feedback;

        if let Some(fb) = feedback.filter(|fb| percent_delta(*fb, commanded) <= tolerance) {
            debug!("Valve: {room} confirmed at {fb}% (commanded {commanded}%)");
            state.command_phase = CommandPhase::Idle;
            state.retry_count = 0;
            state.unexpected_position = false;
            self.corrections.remove(room);
            for kind in std::mem::take(&mut state.raised) {
                alerts.clear_error(kind, Some(room));
            }
            return;
        }

        if state.retry_count < max_retries {
            state.retry_count += 1;
            state.last_command_time = Some(now);
            warn!(
                "Valve: {room} feedback {} != {commanded}%, retry {}/{max_retries}",
                describe(feedback),
                state.retry_count
            );
            self.counters.retries += 1;
            self.transmit(room, commanded, valves, alerts);
            self.scheduler.schedule(room, token, now + delay);
            return;
        }

        // Exhausted: report once, adopt what the valve actually did.
        let kind = if feedback.is_some() {
            AlertKind::FeedbackTimeout
        } else {
            AlertKind::FeedbackUnavailable
        };
        error!(
            "Valve: {room} gave up on {commanded}% after {max_retries} retries, feedback {}",
            describe(feedback)
        );
        alerts.report_error(&Alert::for_room(
            kind,
            room,
            &format!(
                "valve did not reach {commanded}% after {max_retries} retries (feedback {})",
                describe(feedback)
            ),
        ));
        state.raised.insert(kind);
        state.command_phase = CommandPhase::Idle;
        state.retry_count = 0;
        state.failed_target = Some(commanded);
        state.unexpected_position = false;
        if let Some(fb) = feedback {
            state.commanded_percent = Some(fb);
        }
        self.corrections.remove(room);
        self.counters.feedback_failures += 1;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn get_feedback(&self, room: &RoomId) -> Option<u8> {
        self.rooms.get(room).and_then(|s| s.feedback_percent)
    }

    pub fn get_commanded(&self, room: &RoomId) -> Option<u8> {
        self.rooms.get(room).and_then(|s| s.commanded_percent)
    }

    /// `true` if the last reported position is within `tolerance` of `target`.
    pub fn is_feedback_confirmed(&self, room: &RoomId, target: u8, tolerance: u8) -> bool {
        self.get_feedback(room)
            .is_some_and(|fb| percent_delta(fb, target) <= tolerance)
    }

    /// Correction currently being restored for `room`.
    pub fn correction(&self, room: &RoomId) -> Option<u8> {
        self.corrections.get(room).copied()
    }

    pub fn corrections(&self) -> &PercentMap {
        &self.corrections
    }

    /// Commanded percentage of every room that has been commanded at least once.
    pub fn commanded_snapshot(&self) -> PercentMap {
        self.rooms
            .iter()
            .filter_map(|(room, s)| s.commanded_percent.map(|p| (room.clone(), p)))
            .collect()
    }

    pub fn room_state(&self, room: &RoomId) -> Option<&RoomValveState> {
        self.rooms.get(room)
    }

    pub fn room_states(&self) -> impl Iterator<Item = &RoomValveState> {
        self.rooms.values()
    }

    pub fn tolerance(&self) -> u8 {
        self.config.tolerance_percent
    }

    /// Earliest booked feedback check.
    pub fn next_check_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    pub fn counters(&self) -> &ValveCounters {
        &self.counters
    }

    // ── Internal ──────────────────────────────────────────────

    /// Start a new logical command: new token, fresh retry budget, booked check.
    fn issue(
        &mut self,
        room: &RoomId,
        target: u8,
        now: Instant,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) {
        let delay = self.config.feedback_delay();
        let Some(state) = self.rooms.get_mut(room) else {
            return;
        };
        state.token = state.token.next();
        state.commanded_percent = Some(target);
        state.retry_count = 0;
        state.command_phase = CommandPhase::AwaitingFeedback;
        state.last_command_time = Some(now);
        state.failed_target = None;
        let token = state.token;

        self.transmit(room, target, valves, alerts);
        self.scheduler.schedule(room, token, now + delay);
    }

    /// Hand one command to the transport.  A refused send is not fatal:
    /// the booked check will see the mismatch and retry.
    fn transmit(
        &mut self,
        room: &RoomId,
        percent: u8,
        valves: &mut impl ValvePort,
        alerts: &mut impl AlertSink,
    ) {
        match valves.send_valve_command(room, percent) {
            Ok(()) => self.counters.commands_sent += 1,
            Err(e) => {
                warn!("Valve: send to {room} failed: {e}");
                alerts.report_error(&Alert::for_room(
                    AlertKind::ValveCommandFailure,
                    room,
                    &format!("command {percent}% not sent: {e}"),
                ));
                if let Some(state) = self.rooms.get_mut(room) {
                    state.raised.insert(AlertKind::ValveCommandFailure);
                }
            }
        }
    }
}

fn describe(feedback: Option<u8>) -> String {
    feedback.map_or_else(|| "unavailable".to_string(), |p| format!("{p}%"))
}
