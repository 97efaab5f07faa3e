//! Hydronic controller host runner.
//!
//! Runs the control core against the simulated plant on simulated time
//! (no sleeping) through a scripted heating day, logging every
//! transition, then prints the final status as JSON on stdout.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                      │
//! │   SimPlant (Valve+Boiler)   LogEventSink (Event+Alert)        │
//! │   JsonConfigFile (Config)                                     │
//! │  ──────────────── Port Trait Boundary ──────────────────      │
//! │   ┌────────────────────────────────────────────────────────┐  │
//! │   │  ControlService: Coordinator · Actuator · Boiler FSM   │  │
//! │   └────────────────────────────────────────────────────────┘  │
//! │   TriggerQueue (one pass per trigger, FIFO)                   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `hydronic [config.json]`.  `RUST_LOG` controls verbosity.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

use hydronic::adapters::config_file::JsonConfigFile;
use hydronic::adapters::log_sink::LogEventSink;
use hydronic::adapters::sim::SimPlant;
use hydronic::app::commands::AppCommand;
use hydronic::app::ports::ConfigPort;
use hydronic::app::service::ControlService;
use hydronic::config::SystemConfig;
use hydronic::events::{Trigger, TriggerQueue};
use hydronic::valves::{DemandMap, RoomDemand, RoomId};

/// Valve head travel time in the simulation.
const VALVE_TRAVEL: Duration = Duration::from_secs(3);
/// Length of the scripted run.
const RUN_SECS: u64 = 600;
/// Interval between status records in the log.
const STATUS_EVERY_SECS: u64 = 120;

/// One scripted happening, at a second offset from the start.
enum Step {
    Demand(&'static str, Option<u8>),
    LoadSharing(&'static str, u8),
    ClearLoadSharing,
    Disturb(&'static str, u8),
    BoilerOffAtWall,
}

fn script() -> Vec<(u64, Step)> {
    vec![
        (0, Step::Demand("lounge", Some(100))),
        (60, Step::Demand("kitchen", Some(30))),
        (120, Step::LoadSharing("bedroom", 40)),
        (150, Step::Disturb("lounge", 40)),
        (240, Step::Demand("lounge", None)),
        (240, Step::Demand("kitchen", None)),
        (300, Step::ClearLoadSharing),
        (480, Step::Demand("kitchen", Some(80))),
        (560, Step::BoilerOffAtWall),
    ]
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => JsonConfigFile::new(&path)
            .load()
            .with_context(|| format!("loading configuration from {path}"))?,
        None => {
            let config = SystemConfig::default();
            config.validate().context("built-in configuration")?;
            config
        }
    };
    info!(
        "hydronic: {} room(s), interlock minimum {}%",
        config.rooms.len(),
        config.boiler.min_valve_open_percent
    );

    let t0 = Instant::now();
    let mut plant = SimPlant::new(config.room_ids(), VALVE_TRAVEL, t0);
    let mut sink = LogEventSink::new();
    let mut alerts = LogEventSink::new();
    let mut service = ControlService::new(&config, t0);
    service.start(t0, &mut plant, &mut alerts, &mut sink);

    let mut queue = TriggerQueue::new();
    let mut demand = DemandMap::new();
    let script = script();
    let tick = config.control_loop_interval();
    let mut now = t0;

    while now.saturating_duration_since(t0) <= Duration::from_secs(RUN_SECS) {
        let elapsed = now.saturating_duration_since(t0);

        for (at, step) in &script {
            if Duration::from_secs(*at) > elapsed || Duration::from_secs(*at) + tick <= elapsed {
                continue;
            }
            match step {
                Step::Demand(room, Some(p)) => {
                    demand.insert(RoomId::from(*room), RoomDemand::calling(*p));
                    queue.push(Trigger::DemandChanged);
                }
                Step::Demand(room, None) => {
                    demand.insert(RoomId::from(*room), RoomDemand::idle());
                    queue.push(Trigger::DemandChanged);
                }
                Step::LoadSharing(room, p) => {
                    queue.push(Trigger::Command(AppCommand::SetLoadSharing {
                        overrides: [(RoomId::from(*room), *p)].into_iter().collect(),
                        reason: "schedule lookahead".into(),
                    }));
                }
                Step::ClearLoadSharing => {
                    queue.push(Trigger::Command(AppCommand::ClearLoadSharing));
                }
                Step::Disturb(room, p) => {
                    if let Some((room, percent)) = plant.disturb(&RoomId::from(*room), *p) {
                        queue.push(Trigger::FeedbackChanged { room, percent });
                    }
                }
                Step::BoilerOffAtWall => {
                    plant.switch_boiler_off_externally();
                    queue.push(Trigger::BoilerStateChanged);
                }
            }
        }

        for (room, percent) in plant.advance_to(now) {
            queue.push(Trigger::FeedbackChanged { room, percent });
        }
        queue.push(Trigger::Tick);

        queue.drain(|trigger| match trigger {
            Trigger::Tick | Trigger::DemandChanged | Trigger::BoilerStateChanged => {
                service.run_cycle(&demand, now, &mut plant, &mut alerts, &mut sink);
            }
            Trigger::FeedbackChanged { room, percent } => {
                service.on_feedback_changed(&room, percent, now, &mut plant, &mut alerts, &mut sink);
            }
            Trigger::Command(cmd) => {
                service.handle_command(cmd);
                service.run_cycle(&demand, now, &mut plant, &mut alerts, &mut sink);
            }
        });

        if elapsed.as_secs() % STATUS_EVERY_SECS == 0 && elapsed.subsec_nanos() == 0 {
            service.publish_status(now, &mut sink);
        }
        now += tick;
    }

    let status = service.status(now);
    println!("{}", status.to_json().context("serializing status")?);
    info!(
        "hydronic: done, {} boiler switch(es), {} trigger(s) dropped",
        plant.boiler_switches(),
        queue.dropped()
    );
    Ok(())
}
