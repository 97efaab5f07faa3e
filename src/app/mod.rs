//! Application core: pure domain orchestration, zero I/O.
//!
//! Valve arbitration, the actuation protocol and the boiler safety FSM
//! are wired together here.  All interaction with valves, the appliance,
//! alerting and configuration storage goes through the **port traits**
//! in [`ports`], keeping this layer testable without real equipment.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
