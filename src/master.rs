//! Masters and master lookup
//!
//! Master bookkeeping (IPI channels, suspend state) lives outside this
//! crate. The resolution core only needs to turn a one-hot identity from a
//! configuration mask into a known master.

use crate::types::*;
use heapless::Vec;

/// A requester of slave capabilities (APU, RPU0, RPU1, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Master {
    /// One-hot identity
    pub id: MasterId,
    /// Name (for debugging)
    pub name: &'static str,
}

impl Master {
    /// Create master
    pub const fn new(id: MasterId, name: &'static str) -> Self {
        Self { id, name }
    }
}

/// Lookup of masters by identity
pub trait MasterRegistry {
    /// Master with identity `id`, if known
    fn lookup(&self, id: MasterId) -> Option<&Master>;
}

/// Fixed table of the platform's masters
#[derive(Debug, Clone, Default)]
pub struct MasterTable {
    masters: Vec<Master, MAX_MASTERS>,
}

impl MasterTable {
    /// Create empty table
    pub const fn new() -> Self {
        Self {
            masters: Vec::new(),
        }
    }

    /// Register a master
    pub fn add(&mut self, master: Master) -> Result<()> {
        if self.masters.iter().any(|m| m.id == master.id) {
            return Err(Error::InvalidArg);
        }
        self.masters.push(master).map_err(|_| Error::NoMemory)
    }

    /// Identities of all registered masters
    pub fn all(&self) -> MasterMask {
        let mut mask = MasterMask::EMPTY;
        for m in self.masters.iter() {
            mask.insert(m.id);
        }
        mask
    }

    /// Registered masters
    pub fn iter(&self) -> impl Iterator<Item = &Master> {
        self.masters.iter()
    }
}

impl MasterRegistry for MasterTable {
    fn lookup(&self, id: MasterId) -> Option<&Master> {
        self.masters.iter().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let apu = MasterId::new(0x1).unwrap();
        let rpu = MasterId::new(0x100).unwrap();
        let mut table = MasterTable::new();
        table.add(Master::new(apu, "apu")).unwrap();
        table.add(Master::new(rpu, "rpu0")).unwrap();

        assert_eq!(table.lookup(rpu).map(|m| m.name), Some("rpu0"));
        assert!(table.lookup(MasterId::new(0x2).unwrap()).is_none());
        assert_eq!(table.all().bits(), 0x101);
        assert_eq!(table.add(Master::new(apu, "dup")), Err(Error::InvalidArg));
    }
}
