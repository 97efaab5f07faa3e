//! Hydronic heating actuation safety core.
//!
//! Valve arbitration, the valve command/feedback protocol and the boiler
//! safety FSM, behind port traits so the whole core runs against
//! simulated or recorded equipment in tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fsm;
pub mod interlock;
pub mod scheduler;
pub mod valves;

#[cfg(test)]
mod testing;
