//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the control service
//! through a heating scenario against the recording plant in `mock_hw`.
//! Time is simulated; nothing sleeps.

mod boiler_cycle_tests;
mod mock_hw;
mod valve_protocol_tests;
