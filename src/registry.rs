//! Node registry
//!
//! Built once at startup by the power manager and handed by reference to
//! request handlers. Holds every node of one class.

use crate::node::PowerNode;
use crate::slave::Slave;
use crate::types::*;
use heapless::Vec;
use tracing::{info, warn};

/// Fixed-capacity collection of nodes
pub struct Registry<T, const N: usize> {
    nodes: Vec<T, N>,
}

/// Registry of slaves
pub type SlaveRegistry<'a, const N: usize> = Registry<Slave<'a>, N>;

impl<T: PowerNode, const N: usize> Registry<T, N> {
    /// Create empty registry
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Register a node; node ids must be unique
    pub fn add(&mut self, node: T) -> Result<()> {
        if self.get(node.node_id()).is_some() {
            return Err(Error::InvalidArg);
        }
        self.nodes.push(node).map_err(|_| Error::NoMemory)
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    pub fn get(&self, node: NodeId) -> Option<&T> {
        self.nodes.iter().find(|n| n.node_id() == node)
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.nodes.iter_mut().find(|n| n.node_id() == node)
    }

    /// Mutable node by id, or [`Error::UnknownNode`]
    pub fn lookup_mut(&mut self, node: NodeId) -> Result<&mut T> {
        self.get_mut(node).ok_or(Error::UnknownNode(node))
    }

    /// All nodes
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }

    /// All nodes, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.nodes.iter_mut()
    }

    /// Force every node down
    ///
    /// Keeps going past failures so one stuck node does not keep the rest
    /// powered; returns the first error.
    pub fn force_down_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for node in self.nodes.iter_mut() {
            if let Err(e) = node.force_down() {
                warn!(node = node.node_id(), "{} force down failed: {}", node.name(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reset configuration of every node
    pub fn clear_config_all(&mut self) {
        for node in self.nodes.iter_mut() {
            node.clear_config();
        }
        info!(count = self.nodes.len(), "configuration cleared");
    }
}

impl<T: PowerNode, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{SlaveFsm, Transition};
    use crate::hal::SimClocks;
    use crate::master::{Master, MasterTable};

    static STATES: [Capability; 2] = [Capability::empty(), Capability::CLOCK];
    static TRANS: [Transition<'static>; 2] = [Transition::new(0, 1, 60), Transition::new(1, 0, 0)];
    static FSM: SlaveFsm<'static> = SlaveFsm::new(&STATES, &TRANS);

    #[test]
    fn test_add_and_lookup() {
        let mut reg: SlaveRegistry<'_, 4> = Registry::new();
        reg.add(Slave::new(10, "ttc0", &FSM)).unwrap();
        reg.add(Slave::new(11, "ttc1", &FSM)).unwrap();

        assert_eq!(reg.add(Slave::new(10, "dup", &FSM)), Err(Error::InvalidArg));
        assert_eq!(reg.get(11).map(|s| s.name()), Some("ttc1"));
        assert!(matches!(reg.lookup_mut(12), Err(Error::UnknownNode(12))));
    }

    #[test]
    fn test_force_down_all() {
        let clocks = SimClocks::new();
        let apu = MasterId::new(1).unwrap();
        let mut masters = MasterTable::new();
        masters.add(Master::new(apu, "apu")).unwrap();

        let mut reg: SlaveRegistry<'_, 4> = Registry::new();
        for node in [20, 21] {
            let mut slave = Slave::new(node, "can", &FSM).with_clocks(&clocks);
            slave.set_config(SlavePolicy::empty(), apu.into(), &masters).unwrap();
            slave.request(apu, Capability::CLOCK, MAX_LATENCY).unwrap();
            reg.add(slave).unwrap();
        }
        assert_eq!(clocks.held(), 2);

        reg.force_down_all().unwrap();
        assert!(reg.iter().all(|s| s.state() == 0 && s.users_mask().is_empty()));
        assert_eq!(clocks.held(), 0);

        reg.clear_config_all();
        assert!(reg.iter().all(|s| s.requirements().is_empty()));
    }
}
