//! Per-slave requirement bookkeeping
//!
//! Every master permitted to use a slave owns one [`Requirement`] in the
//! slave's [`Requirements`] table. Entries stay in the table for as long as
//! the permission exists; whether the master is actually using the slave is
//! tracked by a flag, and only flagged entries take part in aggregation.

use crate::types::*;
use bitflags::bitflags;
use heapless::Vec;

bitflags! {
    /// Requirement state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequirementFlags: u8 {
        /// Master is currently using the slave
        const USING = 1 << 0;
        /// Master has set a latency requirement
        const LATENCY_SET = 1 << 1;
    }
}

// ============================================================================
// Requirement
// ============================================================================

/// Demand of one master on one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    master: MasterId,
    flags: RequirementFlags,
    caps: Capability,
    latency: LatencyUs,
}

impl Requirement {
    /// Create an inactive requirement for `master`
    pub const fn new(master: MasterId) -> Self {
        Self {
            master,
            flags: RequirementFlags::empty(),
            caps: Capability::empty(),
            latency: MAX_LATENCY,
        }
    }

    /// Owning master
    pub fn master(&self) -> MasterId {
        self.master
    }

    /// State flags
    pub fn flags(&self) -> RequirementFlags {
        self.flags
    }

    /// Check if the master is using the slave
    pub fn is_using(&self) -> bool {
        self.flags.contains(RequirementFlags::USING)
    }

    /// Check if a latency requirement is set
    pub fn has_latency(&self) -> bool {
        self.flags.contains(RequirementFlags::LATENCY_SET)
    }

    /// Requested capabilities
    pub fn capabilities(&self) -> Capability {
        self.caps
    }

    /// Requested latency (`MAX_LATENCY` if none)
    pub fn latency(&self) -> LatencyUs {
        self.latency
    }

    /// Start (or keep) using the slave with `caps`
    pub fn set_capabilities(&mut self, caps: Capability) {
        self.flags.insert(RequirementFlags::USING);
        self.caps = caps;
    }

    /// Set the latency requirement
    pub fn set_latency(&mut self, latency: LatencyUs) {
        self.flags.insert(RequirementFlags::LATENCY_SET);
        self.latency = latency;
    }

    /// End usage: drop capabilities and latency, keep the permission
    pub fn clear(&mut self) {
        self.flags.remove(RequirementFlags::USING | RequirementFlags::LATENCY_SET);
        self.caps = Capability::empty();
        self.latency = MAX_LATENCY;
    }
}

// ============================================================================
// Requirement Table
// ============================================================================

/// Requirements of all permitted masters on one slave
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    entries: Vec<Requirement, MAX_MASTERS>,
}

impl Requirements {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of permitted masters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no master is permitted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free slots
    pub fn remaining(&self) -> usize {
        MAX_MASTERS - self.entries.len()
    }

    /// Add a relationship for `master`, reusing an existing one
    pub fn add(&mut self, master: MasterId) -> Result<&mut Requirement> {
        let pos = match self.entries.iter().position(|r| r.master == master) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push(Requirement::new(master))
                    .map_err(|_| Error::NoMemory)?;
                self.entries.len() - 1
            }
        };
        Ok(&mut self.entries[pos])
    }

    /// Requirement of `master`
    pub fn get(&self, master: MasterId) -> Option<&Requirement> {
        self.entries.iter().find(|r| r.master == master)
    }

    /// Mutable requirement of `master`
    pub fn get_mut(&mut self, master: MasterId) -> Option<&mut Requirement> {
        self.entries.iter_mut().find(|r| r.master == master)
    }

    /// All requirements
    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.iter()
    }

    /// Requirements of masters currently using the slave
    pub fn active(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.iter().filter(|r| r.is_using())
    }

    /// Clear every requirement that is in use
    pub fn clear_usage(&mut self) {
        for req in self.entries.iter_mut().filter(|r| r.is_using()) {
            req.clear();
        }
    }

    /// Drop all relationships
    pub fn remove_all(&mut self) {
        self.entries.clear();
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Union of capabilities requested by masters using the slave
    pub fn max_capabilities(&self) -> Capability {
        self.active()
            .fold(Capability::empty(), |acc, r| acc | r.caps)
    }

    /// Minimum latency over all set latency requirements
    ///
    /// `MAX_LATENCY` when no master set one.
    pub fn min_latency(&self) -> LatencyUs {
        self.entries
            .iter()
            .filter(|r| r.has_latency())
            .map(|r| r.latency)
            .min()
            .unwrap_or(MAX_LATENCY)
    }

    /// Masters currently using the slave
    pub fn users_mask(&self) -> MasterMask {
        let mut mask = MasterMask::EMPTY;
        for req in self.active() {
            mask.insert(req.master);
        }
        mask
    }

    /// Usage relative to `master`
    pub fn usage_status(&self, master: MasterId) -> UsageStatus {
        let users = self.users_mask();
        UsageStatus::from_usage(users.contains(master), !users.without(master).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(bit: u32) -> MasterId {
        MasterId::from_bit(bit).unwrap()
    }

    #[test]
    fn test_empty_table_aggregates_to_defaults() {
        let reqs = Requirements::new();
        assert_eq!(reqs.max_capabilities(), Capability::empty());
        assert_eq!(reqs.min_latency(), MAX_LATENCY);
        assert!(reqs.users_mask().is_empty());
    }

    #[test]
    fn test_only_active_entries_contribute_caps() {
        let mut reqs = Requirements::new();
        reqs.add(master(0)).unwrap().set_capabilities(Capability::CLOCK);
        reqs.add(master(1)).unwrap();
        reqs.add(master(2)).unwrap().set_capabilities(Capability::CONTEXT);

        assert_eq!(
            reqs.max_capabilities(),
            Capability::CLOCK | Capability::CONTEXT
        );
        assert_eq!(reqs.users_mask().bits(), 0b101);
        assert_eq!(reqs.usage_status(master(0)), UsageStatus::Both);
        assert_eq!(reqs.usage_status(master(1)), UsageStatus::OthersOnly);
    }

    #[test]
    fn test_min_latency() {
        let mut reqs = Requirements::new();
        reqs.add(master(0)).unwrap().set_latency(50);
        reqs.add(master(1)).unwrap().set_latency(10);
        reqs.add(master(2)).unwrap();
        assert_eq!(reqs.min_latency(), 10);
    }

    #[test]
    fn test_add_reuses_entry() {
        let mut reqs = Requirements::new();
        reqs.add(master(3)).unwrap().set_capabilities(Capability::ACCESS);
        let again = reqs.add(master(3)).unwrap();
        assert!(again.is_using());
        assert_eq!(reqs.len(), 1);
    }

    #[test]
    fn test_table_full() {
        let mut reqs = Requirements::new();
        for bit in 0..MAX_MASTERS as u32 {
            reqs.add(master(bit)).unwrap();
        }
        assert_eq!(reqs.remaining(), 0);
        assert_eq!(reqs.add(master(MAX_MASTERS as u32)).err(), Some(Error::NoMemory));
    }

    #[test]
    fn test_clear_usage_keeps_permission() {
        let mut reqs = Requirements::new();
        let req = reqs.add(master(0)).unwrap();
        req.set_capabilities(Capability::CLOCK);
        req.set_latency(5);

        reqs.clear_usage();
        let req = reqs.get(master(0)).unwrap();
        assert!(!req.is_using());
        assert!(!req.has_latency());
        assert_eq!(req.latency(), MAX_LATENCY);
        assert_eq!(reqs.usage_status(master(0)), UsageStatus::Unused);
        assert_eq!(reqs.len(), 1);
    }
}
