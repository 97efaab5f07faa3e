//! Log-based event and alert sink adapter.
//!
//! Implements [`EventSink`] and [`AlertSink`] by writing single-line
//! structured records through the `log` facade (stderr via `env_logger`
//! in the host runner).  A notification or MQTT adapter would implement
//! the same traits.

use std::collections::BTreeSet;

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{AlertSink, EventSink};
use crate::error::{Alert, AlertKind, Severity};
use crate::valves::RoomId;

/// Logs every [`AppEvent`] and de-duplicates alerts: a condition is
/// logged once when raised and once when cleared.
#[derive(Debug, Default)]
pub struct LogEventSink {
    active: BTreeSet<(AlertKind, Option<RoomId>)>,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions raised and not yet cleared.
    pub fn active_alerts(&self) -> impl Iterator<Item = &(AlertKind, Option<RoomId>)> {
        self.active.iter()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={state}");
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            AppEvent::ValveCommanded {
                room,
                percent,
                correction,
            } => {
                info!(
                    "VALVE | room={room} target={percent}%{}",
                    if *correction { " correction" } else { "" }
                );
            }
            AppEvent::EmergencyShutdown => {
                error!("EMERGENCY | boiler forced off, interlock lost");
            }
            AppEvent::Status(status) => match status.to_json() {
                Ok(json) => info!("STATUS | {json}"),
                Err(e) => warn!("STATUS | not serializable: {e}"),
            },
        }
    }
}

impl AlertSink for LogEventSink {
    fn report_error(&mut self, alert: &Alert) {
        if !self.active.insert((alert.kind, alert.room.clone())) {
            return;
        }
        let room = alert.room.as_ref().map_or("-", RoomId::as_str);
        match alert.severity {
            Severity::Warning => warn!("ALERT | {} | room={room} | {}", alert.kind, alert.message),
            Severity::Error | Severity::Critical => error!(
                "ALERT | {} {} | room={room} | {}",
                alert.severity, alert.kind, alert.message
            ),
        }
    }

    fn clear_error(&mut self, kind: AlertKind, room: Option<&RoomId>) {
        let key = (kind, room.cloned());
        if self.active.remove(&key) {
            info!(
                "ALERT | {kind} cleared | room={}",
                room.map_or("-", RoomId::as_str)
            );
        }
    }
}
