//! Slave configuration
//!
//! The configuration object delivered by the boot loader lists, per slave,
//! the usage policy and the masters allowed to use it. Loading the object
//! is out of scope here; applying it to a registry is not.

use crate::master::MasterRegistry;
use crate::registry::SlaveRegistry;
use crate::types::*;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlaveConfig {
    /// Node id of the slave
    pub node: NodeId,
    /// Usage policy flags (`SlavePolicy` bits)
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: u32,
    /// ORed IPI masks of permitted masters
    #[cfg_attr(feature = "serde", serde(default))]
    pub perms: u32,
}

impl SlaveConfig {
    /// Usage policy; unknown bits are dropped
    pub fn policy(&self) -> SlavePolicy {
        SlavePolicy::from_bits_truncate(self.policy)
    }

    /// Permitted masters
    pub fn perms(&self) -> MasterMask {
        MasterMask::from_bits(self.perms)
    }
}

/// Apply slave configurations in order
///
/// Stops at the first slave whose configuration cannot be applied; slaves
/// configured before it keep their configuration.
pub fn apply_configs<R, const N: usize>(
    configs: &[SlaveConfig],
    slaves: &mut SlaveRegistry<'_, N>,
    masters: &R,
) -> Result<()>
where
    R: MasterRegistry + ?Sized,
{
    for cfg in configs {
        let slave = slaves.lookup_mut(cfg.node)?;
        slave.set_config(cfg.policy(), cfg.perms(), masters)?;
        debug!(node = cfg.node, perms = cfg.perms, "{} configured", slave.name());
    }
    Ok(())
}

/// Full configuration object (std only)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmConfig {
    /// Per-slave configuration
    #[serde(default)]
    pub slaves: std::vec::Vec<SlaveConfig>,
}

#[cfg(feature = "std")]
impl PmConfig {
    /// Parse from JSON
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Apply to a slave registry
    pub fn apply<R, const N: usize>(&self, slaves: &mut SlaveRegistry<'_, N>, masters: &R) -> Result<()>
    where
        R: MasterRegistry + ?Sized,
    {
        apply_configs(&self.slaves, slaves, masters)
    }
}
