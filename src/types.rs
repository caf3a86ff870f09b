//! Base types and configuration
//!
//! Capabilities, master identities, policy flags and the error type shared
//! by every part of the resolution core.

use bitflags::bitflags;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Maximum masters that may hold a requirement on one slave
///
/// One per IPI channel on the management processor.
pub const MAX_MASTERS: usize = 8;

/// Maximum slaves tracked by a registry
pub const MAX_SLAVES: usize = 64;

/// Latency value meaning "no latency requirement"
pub const MAX_LATENCY: LatencyUs = LatencyUs::MAX;

// ============================================================================
// Basic Types
// ============================================================================

/// Node identifier assigned by the platform
pub type NodeId = u32;

/// Index into a slave FSM's state array (0 = lowest power)
pub type StateId = u8;

/// Latency in microseconds
pub type LatencyUs = u32;

/// GIC proxy wake bit associated with a slave
pub type WakeSource = u32;

// ============================================================================
// Error Types
// ============================================================================

/// Result type for power management operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No state satisfies the combined capability or latency demand
    #[error("conflicting requirements: no state satisfies all active masters")]
    Conflict,
    /// Query found no matching state or capability
    #[error("feature not available")]
    NoFeature,
    /// Power parent, clock source or enter action refused
    #[error("dependency failed: {0}")]
    Dependency(#[from] DependencyError),
    /// No transition is defined between the two states
    #[error("no transition from state {from} to state {to}")]
    TransitionUndefined {
        /// Current state
        from: StateId,
        /// Requested state
        to: StateId,
    },
    /// Identity does not resolve to a known master
    #[error("unknown master {0:#x}")]
    UnknownMaster(u32),
    /// Node id not present in the registry
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// Non-shareable slave already used by another master
    #[error("node is used by another master")]
    NodeBusy,
    /// Master has no requirement relationship with the slave
    #[error("master has no permission to use the node")]
    NoPermission,
    /// Master is not currently using the slave
    #[error("master is not using the node")]
    NotUsing,
    /// Requirement table or registry is full
    #[error("out of memory")]
    NoMemory,
    /// Invalid argument provided
    #[error("invalid argument")]
    InvalidArg,
}

/// Failure reported by a dependency collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DependencyError {
    /// Power parent could not be brought up
    #[error("power parent refused request")]
    ParentRefused,
    /// Clock source could not be enabled
    #[error("clock source refused request")]
    ClockRefused,
    /// Power parent rejected the new latency requirement
    #[error("power parent rejected latency requirement")]
    LatencyRejected,
    /// Register access or polling failed
    #[error("hardware access failed (code {0})")]
    Hardware(u32),
}

// ============================================================================
// Capabilities
// ============================================================================

bitflags! {
    /// Capability set provided by a state or requested by a master
    ///
    /// Unnamed bits are retained, so device-specific capabilities can be
    /// carried through the aggregator untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capability: u32 {
        /// Slave can be accessed
        const ACCESS = 1 << 0;
        /// Slave retains its context
        const CONTEXT = 1 << 1;
        /// Slave can wake up a master
        const WAKEUP = 1 << 2;
        /// Slave is not usable in this state
        const UNUSABLE = 1 << 3;
        /// State requires the power parent to be on
        const POWER = 1 << 4;
        /// State requires the clock to be running
        const CLOCK = 1 << 5;
    }
}

impl Capability {
    /// Parse a capability name as used in configuration and test vectors
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "access" => Some(Self::ACCESS),
            "context" => Some(Self::CONTEXT),
            "wakeup" => Some(Self::WAKEUP),
            "unusable" => Some(Self::UNUSABLE),
            "power" => Some(Self::POWER),
            "clock" => Some(Self::CLOCK),
            _ => None,
        }
    }
}

bitflags! {
    /// Usage policy of a slave
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SlavePolicy: u32 {
        /// Multiple masters may use the slave at the same time
        const SHAREABLE = 1 << 0;
    }
}

// ============================================================================
// Master Identity
// ============================================================================

/// One-hot master identity (IPI mask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MasterId(u32);

impl MasterId {
    /// Create from a mask; `None` unless exactly one bit is set
    pub const fn new(mask: u32) -> Option<Self> {
        if mask.is_power_of_two() {
            Some(Self(mask))
        } else {
            None
        }
    }

    /// Create from a bit position
    pub const fn from_bit(bit: u32) -> Option<Self> {
        match 1u32.checked_shl(bit) {
            Some(mask) => Some(Self(mask)),
            None => None,
        }
    }

    /// Raw one-hot mask
    pub const fn mask(self) -> u32 {
        self.0
    }
}

/// Set of masters, one bit per master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MasterMask(u32);

impl MasterMask {
    /// Empty set
    pub const EMPTY: Self = Self(0);

    /// Create from raw ORed IPI masks
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if no master is in the set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of masters in the set
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Check membership
    pub const fn contains(self, master: MasterId) -> bool {
        self.0 & master.0 != 0
    }

    /// Add a master
    pub fn insert(&mut self, master: MasterId) {
        self.0 |= master.0;
    }

    /// Set without the given master
    pub const fn without(self, master: MasterId) -> Self {
        Self(self.0 & !master.0)
    }

    /// Iterate members, lowest bit first
    pub fn iter(self) -> MasterMaskIter {
        MasterMaskIter { remaining: self.0 }
    }
}

impl From<MasterId> for MasterMask {
    fn from(master: MasterId) -> Self {
        Self(master.0)
    }
}

impl IntoIterator for MasterMask {
    type Item = MasterId;
    type IntoIter = MasterMaskIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the masters of a [`MasterMask`]
#[derive(Debug, Clone)]
pub struct MasterMaskIter {
    remaining: u32,
}

impl Iterator for MasterMaskIter {
    type Item = MasterId;

    fn next(&mut self) -> Option<MasterId> {
        if self.remaining == 0 {
            return None;
        }
        // Extract lowest set bit
        let mask = 1u32 << self.remaining.trailing_zeros();
        self.remaining &= !mask;
        Some(MasterId(mask))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.count_ones() as usize;
        (n, Some(n))
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// Usage of a slave relative to one querying master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum UsageStatus {
    /// No master is using the slave
    #[default]
    Unused = 0,
    /// Only the querying master is using the slave
    SelfOnly = 1,
    /// Only other masters are using the slave
    OthersOnly = 2,
    /// The querying master and at least one other are using the slave
    Both = 3,
}

impl UsageStatus {
    /// Combine the two usage observations
    pub const fn from_usage(self_using: bool, others_using: bool) -> Self {
        match (self_using, others_using) {
            (false, false) => Self::Unused,
            (true, false) => Self::SelfOnly,
            (false, true) => Self::OthersOnly,
            (true, true) => Self::Both,
        }
    }
}

/// Wake-up latency of a slave including its power parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeUpLatency {
    /// Latency in microseconds
    pub latency: LatencyUs,
    /// False if the power parent could not report its own latency,
    /// in which case `latency` covers the slave alone
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_id_one_hot() {
        assert_eq!(MasterId::new(0x4).map(MasterId::mask), Some(0x4));
        assert!(MasterId::new(0).is_none());
        assert!(MasterId::new(0x6).is_none());
        assert_eq!(MasterId::from_bit(31).map(MasterId::mask), Some(1 << 31));
        assert!(MasterId::from_bit(32).is_none());
    }

    #[test]
    fn test_mask_iterates_low_bit_first() {
        let mask = MasterMask::from_bits(0b1010_0100);
        let order: heapless::Vec<u32, 8> = mask.iter().map(MasterId::mask).collect();
        assert_eq!(order.as_slice(), &[0b100, 0b10_0000, 0b1000_0000]);
        assert_eq!(mask.len(), 3);
    }

    #[test]
    fn test_usage_status_values() {
        assert_eq!(UsageStatus::from_usage(false, false) as u8, 0);
        assert_eq!(UsageStatus::from_usage(true, false) as u8, 1);
        assert_eq!(UsageStatus::from_usage(false, true) as u8, 2);
        assert_eq!(UsageStatus::from_usage(true, true) as u8, 3);
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::from_label("clock"), Some(Capability::CLOCK));
        assert_eq!(Capability::from_label("bogus"), None);
        let retained = Capability::from_bits_retain(1 << 20);
        assert!((retained | Capability::POWER).contains(retained));
    }
}
