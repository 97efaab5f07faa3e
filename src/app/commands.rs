//! Inbound commands to the control service.
//!
//! These represent actions requested by policy layers outside the safety
//! core that the [`ControlService`](super::service::ControlService)
//! interprets and acts upon.

use crate::valves::PercentMap;

/// Commands that external adapters can send into the control core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Publish load-sharing valve positions (second override tier).
    SetLoadSharing { overrides: PercentMap, reason: String },

    /// Drop the load-sharing tier.  Affected valves are sent back to their
    /// next-lower source on the following pass.
    ClearLoadSharing,
}
