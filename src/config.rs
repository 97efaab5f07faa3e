//! System configuration parameters
//!
//! All tunable thresholds for the heating core.  Parsed once at startup,
//! validated, then injected by value into each component's constructor.
//! Nothing reads loosely-typed settings at runtime.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::valves::RoomId;

/// One configured room with a motorized radiator valve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Stable identifier used in every map and alert.
    pub id: RoomId,
    /// Human-readable name for logs.
    #[serde(default)]
    pub name: String,
}

/// Valve command/feedback protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValveConfig {
    /// Maximum |feedback - commanded| (percentage points) counted as arrived.
    pub tolerance_percent: u8,
    /// Resends after the first command before giving up.
    pub max_retries: u8,
    /// Delay between a command and its feedback check (milliseconds).
    pub feedback_delay_ms: u32,
    /// Minimum spacing between non-corrective commands to one room (seconds).
    pub min_interval_secs: u32,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: 5,
            max_retries: 3,
            feedback_delay_ms: 5_000,
            min_interval_secs: 30,
        }
    }
}

impl ValveConfig {
    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.feedback_delay_ms))
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_interval_secs))
    }
}

/// Boiler anti-cycling, pump overrun and interlock parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoilerConfig {
    /// Minimum firing time before a normal shutdown (seconds).
    pub min_on_secs: u32,
    /// Minimum rest time after the boiler is switched off (seconds).
    pub min_off_secs: u32,
    /// Grace period between demand loss and shutdown (seconds).
    pub off_delay_secs: u32,
    /// Post-shutdown valve hold for heat dissipation (seconds).
    pub pump_overrun_secs: u32,
    /// Minimum sum of commanded valve percentages across calling rooms.
    pub min_valve_open_percent: u16,
}

impl Default for BoilerConfig {
    fn default() -> Self {
        Self {
            min_on_secs: 180,
            min_off_secs: 180,
            off_delay_secs: 30,
            pump_overrun_secs: 180,
            min_valve_open_percent: 100,
        }
    }
}

impl BoilerConfig {
    pub fn min_on(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_on_secs))
    }

    pub fn min_off(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_off_secs))
    }

    pub fn off_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.off_delay_secs))
    }

    pub fn pump_overrun(&self) -> Duration {
        Duration::from_secs(u64::from(self.pump_overrun_secs))
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub rooms: Vec<RoomConfig>,
    #[serde(default)]
    pub valves: ValveConfig,
    #[serde(default)]
    pub boiler: BoilerConfig,
    /// Periodic recompute interval (milliseconds)
    #[serde(default = "default_control_loop_interval_ms")]
    pub control_loop_interval_ms: u32,
}

fn default_control_loop_interval_ms() -> u32 {
    1000
}

impl Default for SystemConfig {
    fn default() -> Self {
        let room = |id: &str, name: &str| RoomConfig {
            id: RoomId::from(id),
            name: name.to_string(),
        };
        Self {
            rooms: vec![
                room("lounge", "Lounge"),
                room("kitchen", "Kitchen"),
                room("bedroom", "Bedroom"),
            ],
            valves: ValveConfig::default(),
            boiler: BoilerConfig::default(),
            control_loop_interval_ms: default_control_loop_interval_ms(),
        }
    }
}

const MAX_TIMER_SECS: u32 = 3600;

impl SystemConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| {
            log::warn!("config parse error: {e}");
            ConfigError::Corrupted
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Room identifiers in configuration order.
    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.iter().map(|r| &r.id)
    }

    pub fn control_loop_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.control_loop_interval_ms))
    }

    /// Range and cross-field checks.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rooms.is_empty() {
            return Err(ConfigError::ValidationFailed("at least one room is required"));
        }
        let mut seen = BTreeSet::new();
        for room in &self.rooms {
            if room.id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationFailed("room id must not be empty"));
            }
            if !seen.insert(&room.id) {
                return Err(ConfigError::ValidationFailed("room ids must be unique"));
            }
        }

        let v = &self.valves;
        if v.tolerance_percent > 25 {
            return Err(ConfigError::ValidationFailed("valves.tolerance_percent must be 0–25"));
        }
        if v.max_retries > 10 {
            return Err(ConfigError::ValidationFailed("valves.max_retries must be 0–10"));
        }
        if !(100..=60_000).contains(&v.feedback_delay_ms) {
            return Err(ConfigError::ValidationFailed(
                "valves.feedback_delay_ms must be 100–60000",
            ));
        }
        if v.min_interval_secs > MAX_TIMER_SECS {
            return Err(ConfigError::ValidationFailed(
                "valves.min_interval_secs must be 0–3600",
            ));
        }

        let b = &self.boiler;
        for (value, msg) in [
            (b.min_on_secs, "boiler.min_on_secs must be 0–3600"),
            (b.min_off_secs, "boiler.min_off_secs must be 0–3600"),
            (b.off_delay_secs, "boiler.off_delay_secs must be 0–3600"),
            (b.pump_overrun_secs, "boiler.pump_overrun_secs must be 0–3600"),
        ] {
            if value > MAX_TIMER_SECS {
                return Err(ConfigError::ValidationFailed(msg));
            }
        }
        if !(1..=1000).contains(&b.min_valve_open_percent) {
            return Err(ConfigError::ValidationFailed(
                "boiler.min_valve_open_percent must be 1–1000",
            ));
        }

        if !(100..=60_000).contains(&self.control_loop_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "control_loop_interval_ms must be 100–60000",
            ));
        }
        Ok(())
    }
}
