//! # pmslv: slave power-state resolution
//!
//! Decision core of a platform power management unit. Every power-manageable
//! hardware node ("slave": OCM bank, USB controller, PLL, interconnect) is
//! wanted by several independent requesters ("masters") at once, each with
//! its own capability and wake-up latency needs. This crate turns those
//! demands into one concrete state per slave.
//!
//! ## Resolution
//!
//! 1. Union the capabilities requested by every master using the slave.
//! 2. Select the lowest-power state providing all of them.
//! 3. If that state wakes up too slowly for the tightest latency budget,
//!    promote it to the first higher state that is fast enough.
//! 4. Transition: request the power parent and clocks the new state needs,
//!    run the FSM enter action, commit, release what is no longer needed.
//!
//! Contention that no state can satisfy is reported as
//! [`Error::Conflict`] and leaves the slave untouched.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pmslv::prelude::*;
//!
//! static STATES: [Capability; 2] = [Capability::empty(), Capability::CLOCK];
//! static TRANS: [Transition<'static>; 2] =
//!     [Transition::new(0, 1, 200), Transition::new(1, 0, 0)];
//! static TTC_FSM: SlaveFsm<'static> = SlaveFsm::new(&STATES, &TRANS);
//!
//! let mut ttc = Slave::new(NODE_TTC0, "ttc0", &TTC_FSM).with_clocks(&lpd_clocks);
//! ttc.set_config(SlavePolicy::empty(), APU.into(), &masters)?;
//!
//! ttc.verify_request()?;
//! ttc.request(APU, Capability::CLOCK, MAX_LATENCY)?;
//! ```
//!
//! ## Execution model
//!
//! Single-threaded and run-to-completion on the management core. All
//! mutation goes through `&mut Slave`, so one resolution per slave is in
//! flight at any time.
//!
//! ## License
//!
//! MIT License - Copyright (c) 2026 Elektrokombinacija

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

// Core modules
pub mod types;
pub mod fsm;
pub mod requirement;
pub mod master;
pub mod hal;
pub mod node;
pub mod slave;
pub mod registry;
pub mod config;

// Re-exports for convenience
pub use types::*;
pub use fsm::{EnterState, SlaveFsm, Transition};
pub use requirement::{Requirement, RequirementFlags, Requirements};
pub use master::{Master, MasterRegistry, MasterTable};
pub use hal::{ClockControl, DepResult, PowerParent};
pub use node::PowerNode;
pub use slave::Slave;
pub use registry::{Registry, SlaveRegistry};
pub use config::{apply_configs, SlaveConfig};

#[cfg(feature = "std")]
pub use config::PmConfig;

/// Prelude - commonly used items
pub mod prelude {
    pub use crate::types::*;
    pub use crate::fsm::{EnterState, SlaveFsm, Transition};
    pub use crate::master::{Master, MasterRegistry, MasterTable};
    pub use crate::hal::{ClockControl, PowerParent};
    pub use crate::node::PowerNode;
    pub use crate::slave::Slave;
    pub use crate::registry::SlaveRegistry;
}

// ============================================================================
// Version
// ============================================================================

/// Major version
pub const VERSION_MAJOR: u32 = 0;
/// Minor version
pub const VERSION_MINOR: u32 = 1;
/// Patch version
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION_STRING: &str = "0.1.0";

/// Get version as packed integer (major << 16 | minor << 8 | patch)
pub const fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), 0x000100);
        assert_eq!(VERSION_STRING, env!("CARGO_PKG_VERSION"));
    }
}
