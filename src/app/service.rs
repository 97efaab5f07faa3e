//! Control service: the hexagonal core.
//!
//! [`ControlService`] owns the valve coordinator, the valve actuator and
//! the boiler FSM.  There is exactly one of each, constructed here and
//! reached only through the service.  All I/O flows through port traits
//! injected at call sites.
//!
//! ```text
//!                ┌─────────────────────────────────────────────┐
//!  demand ─────▶ │ 1. due feedback checks                      │
//!                │ 2. boiler publishes persistence (pre-pass)  │ ──▶ ValvePort
//!                │ 3. coordinator → actuator                   │
//!                │ 4. interlock + feedback → boiler FSM        │ ──▶ BoilerPort
//!                │ 5. apply FSM outputs                        │ ──▶ AlertSink / EventSink
//!                └─────────────────────────────────────────────┘
//! ```

use std::time::Instant;

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::diagnostics::{RuntimeCounters, StatusSnapshot};
use crate::fsm::context::{BoilerInputs, BoilerOutputs, PersistenceCommand};
use crate::fsm::{BoilerFsm, BoilerState};
use crate::interlock::{self, InterlockAssessment};
use crate::valves::{
    DemandMap, RoomId, ValveActuator, ValveCoordinator, calling_rooms, coordinator::IssuedCommand,
};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{AlertSink, BoilerPort, EventSink, ValveHoldQuery, ValvePort};

pub struct ControlService {
    coordinator: ValveCoordinator,
    actuator: ValveActuator,
    boiler: BoilerFsm,
    counters: RuntimeCounters,
    last_interlock: InterlockAssessment,
    /// Demand from the most recent pass, reused by feedback-triggered passes.
    last_demand: DemandMap,
}

impl ControlService {
    /// Construct the service from validated configuration.
    ///
    /// Does **not** start the boiler FSM; call [`start`](Self::start) next.
    pub fn new(config: &SystemConfig, now: Instant) -> Self {
        Self {
            coordinator: ValveCoordinator::new(),
            actuator: ValveActuator::new(config.valves.clone(), config.room_ids()),
            boiler: BoilerFsm::new(config.boiler.clone(), now),
            counters: RuntimeCounters::default(),
            last_interlock: InterlockAssessment::default(),
            last_demand: DemandMap::new(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start in OFF.  No timer is resumed across restarts; the FSM
    /// re-converges through feedback and desync detection.
    pub fn start(
        &mut self,
        now: Instant,
        hw: &mut impl BoilerPort,
        alerts: &mut impl AlertSink,
        sink: &mut impl EventSink,
    ) {
        let outputs = self.boiler.start(now);
        self.apply_outputs(outputs, hw, alerts, sink);
        sink.emit(&AppEvent::Started(self.boiler.state()));
        info!("ControlService started in {}", self.boiler.state());
    }

    // ── Per-trigger orchestration ─────────────────────────────

    /// Run one full pass.  Returns the boiler transition, if any.
    pub fn run_cycle(
        &mut self,
        demand: &DemandMap,
        now: Instant,
        hw: &mut (impl ValvePort + BoilerPort),
        alerts: &mut impl AlertSink,
        sink: &mut impl EventSink,
    ) -> Option<(BoilerState, BoilerState)> {
        self.counters.cycles += 1;
        if &self.last_demand != demand {
            self.last_demand = demand.clone();
        }

        // 1. Continuations whose feedback delay has passed
        self.actuator.poll_feedback_checks(now, hw, alerts);

        // 2. Boiler-owned persistence goes in before valves are resolved
        let calling: Vec<RoomId> = calling_rooms(demand)
            .into_iter()
            .filter(|room| {
                let known = self.actuator.room_state(room).is_some();
                if !known {
                    warn!("Demand from unknown room '{room}' ignored");
                }
                known
            })
            .collect();
        let targets: Vec<(RoomId, u8)> = calling
            .iter()
            .map(|room| {
                let wanted = demand.get(room).map_or(0, |d| d.desired_percent);
                let target = self
                    .coordinator
                    .resolve_unpersisted(room, wanted, &self.actuator);
                (room.clone(), target)
            })
            .collect();
        let plan = self
            .boiler
            .plan_valve_overrides(now, &targets, &self.actuator.commanded_snapshot());
        self.apply_persistence(plan);

        // 3. Arbitrate and actuate
        let issued = self
            .coordinator
            .apply(demand, &mut self.actuator, hw, alerts, now);
        for cmd in issued {
            emit_valve_command(sink, cmd);
        }

        // 4. Boiler FSM on the commanded picture
        let commanded = self.actuator.commanded_snapshot();
        let required = self.boiler.config().min_valve_open_percent;
        let interlock = interlock::assess(&calling, &commanded, required);
        let tolerance = self.actuator.tolerance();
        let feedback_confirmed = calling.iter().all(|room| {
            commanded
                .get(room)
                .is_some_and(|c| self.actuator.is_feedback_confirmed(room, *c, tolerance))
        });
        self.last_interlock = interlock;

        let step = self.boiler.update(
            now,
            BoilerInputs {
                calling_rooms: calling,
                interlock,
                feedback_confirmed,
                physical: hw.read_boiler_physical_state(),
                commanded,
            },
        );

        // 5. Outputs
        self.apply_outputs(step.outputs, hw, alerts, sink);
        if let Some((from, to)) = step.transition {
            sink.emit(&AppEvent::StateChanged { from, to });
        }
        step.transition
    }

    /// Valve feedback notification: drift check first, then a full pass
    /// with the most recent demand.
    pub fn on_feedback_changed(
        &mut self,
        room: &RoomId,
        percent: u8,
        now: Instant,
        hw: &mut (impl ValvePort + BoilerPort),
        alerts: &mut impl AlertSink,
        sink: &mut impl EventSink,
    ) -> Option<(BoilerState, BoilerState)> {
        let corrected = self
            .actuator
            .on_feedback_changed(room, percent, now, &self.boiler, hw, alerts);
        if corrected {
            if let Some(target) = self.actuator.get_commanded(room) {
                sink.emit(&AppEvent::ValveCommanded {
                    room: room.clone(),
                    percent: target,
                    correction: true,
                });
            }
        }
        let demand = std::mem::take(&mut self.last_demand);
        let transition = self.run_cycle(&demand, now, hw, alerts, sink);
        self.last_demand = demand;
        transition
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Takes effect on the next pass.
    pub fn handle_command(&mut self, cmd: AppCommand) {
        match cmd {
            AppCommand::SetLoadSharing { overrides, reason } => {
                let (known, unknown): (Vec<_>, Vec<_>) = overrides
                    .into_iter()
                    .partition(|(room, _)| self.actuator.room_state(room).is_some());
                for (room, _) in &unknown {
                    warn!("Load sharing override for unknown room '{room}' ignored");
                }
                self.coordinator
                    .set_load_sharing_overrides(known.into_iter().collect(), &reason);
            }
            AppCommand::ClearLoadSharing => {
                self.coordinator.clear_load_sharing_overrides();
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self, now: Instant) -> StatusSnapshot {
        StatusSnapshot::collect(
            now,
            &self.boiler,
            &self.coordinator,
            &self.actuator,
            self.last_interlock,
            self.counters,
        )
    }

    /// Emit a status snapshot through the event sink.
    pub fn publish_status(&self, now: Instant, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Status(Box::new(self.status(now))));
    }

    pub fn boiler_state(&self) -> BoilerState {
        self.boiler.state()
    }

    pub fn boiler(&self) -> &BoilerFsm {
        &self.boiler
    }

    pub fn actuator(&self) -> &ValveActuator {
        &self.actuator
    }

    pub fn coordinator(&self) -> &ValveCoordinator {
        &self.coordinator
    }

    pub fn counters(&self) -> RuntimeCounters {
        self.counters.with_valves(self.actuator.counters())
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_persistence(&mut self, cmd: PersistenceCommand) {
        match cmd {
            PersistenceCommand::Keep => {}
            PersistenceCommand::Publish { overrides, reason } => {
                self.coordinator.set_persistence_overrides(overrides, reason);
            }
            PersistenceCommand::Clear => {
                self.coordinator.clear_persistence_overrides();
            }
        }
    }

    fn apply_outputs(
        &mut self,
        outputs: BoilerOutputs,
        hw: &mut impl BoilerPort,
        alerts: &mut impl AlertSink,
        sink: &mut impl EventSink,
    ) {
        if let Some(on) = outputs.boiler {
            if let Err(e) = hw.set_boiler(on) {
                // Desync detection picks this up on the next pass.
                error!("Boiler: set_boiler({on}) failed: {e}");
            }
        }
        self.apply_persistence(outputs.persistence);

        for alert in &outputs.raised {
            alerts.report_error(alert);
        }
        for kind in outputs.cleared {
            alerts.clear_error(kind, None);
        }
        if outputs.emergency_shutdown {
            self.counters.emergency_shutdowns += 1;
            sink.emit(&AppEvent::EmergencyShutdown);
        }
        if outputs.desync_corrected {
            self.counters.desync_corrections += 1;
        }
    }
}

impl ValveHoldQuery for ControlService {
    fn is_valve_hold_active(&self) -> bool {
        self.boiler.is_valve_hold_active()
    }
}

fn emit_valve_command(sink: &mut impl EventSink, cmd: IssuedCommand) {
    sink.emit(&AppEvent::ValveCommanded {
        room: cmd.room,
        percent: cmd.percent,
        correction: cmd.is_correction,
    });
}
