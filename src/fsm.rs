//! Slave state machine descriptors
//!
//! One [`SlaveFsm`] describes every slave of a hardware type: the states
//! it can be in, ordered from lowest to highest power, and the transitions
//! between them. Descriptors are built once (usually as statics) and shared
//! read-only by all slaves of that type.
//!
//! State selection lives here as well, since it depends on nothing but the
//! descriptor:
//!
//! - [`SlaveFsm::find_state_with_capabilities`] picks the lowest-power state
//!   covering a capability set
//! - [`SlaveFsm::constrain_by_latency`] promotes a state upward until its
//!   wake-up latency fits a budget
//!
//! ```ignore
//! static USB_STATES: [Capability; 2] = [Capability::empty(), USB_ON];
//! static USB_TRANS: [Transition<'static>; 2] = [
//!     Transition::new(0, 1, 500).with_action(&USB_POWER_UP),
//!     Transition::new(1, 0, 0).with_action(&USB_POWER_DOWN),
//! ];
//! static USB_FSM: SlaveFsm<'static> = SlaveFsm::new(&USB_STATES, &USB_TRANS);
//! ```

use crate::types::*;
use core::fmt;

// ============================================================================
// Enter Action
// ============================================================================

/// Action run when a transition enters its target state
///
/// Device specific: power-gating an SRAM bank, putting a DDR controller
/// into self-refresh, toggling a PLL bypass.
pub trait EnterState: Sync {
    /// Drive the hardware of `node` into state `next`
    fn enter(&self, node: NodeId, next: StateId) -> Result<()>;
}

// ============================================================================
// Transition
// ============================================================================

/// One edge of a slave FSM
#[derive(Clone, Copy)]
pub struct Transition<'a> {
    /// Source state
    pub from: StateId,
    /// Target state
    pub to: StateId,
    /// Wake-up latency from `from` to the highest state (microseconds)
    pub latency: LatencyUs,
    /// Action run on entering `to`
    pub action: Option<&'a dyn EnterState>,
}

impl<'a> Transition<'a> {
    /// Create a transition without an enter action
    pub const fn new(from: StateId, to: StateId, latency: LatencyUs) -> Self {
        Self {
            from,
            to,
            latency,
            action: None,
        }
    }

    /// Attach an enter action
    pub const fn with_action(mut self, action: &'a dyn EnterState) -> Self {
        self.action = Some(action);
        self
    }
}

impl fmt::Debug for Transition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("latency", &self.latency)
            .field("action", &self.action.is_some())
            .finish()
    }
}

// ============================================================================
// FSM Descriptor
// ============================================================================

/// State machine shared by all slaves of one hardware type
#[derive(Debug, Clone, Copy)]
pub struct SlaveFsm<'a> {
    /// Capabilities per state, index 0 = lowest power
    states: &'a [Capability],
    /// Transition table
    transitions: &'a [Transition<'a>],
}

impl<'a> SlaveFsm<'a> {
    /// Create a descriptor
    ///
    /// # Panics
    /// If `states` is empty or has more than `StateId::MAX + 1` entries.
    /// In a static initializer this fails the build instead.
    pub const fn new(states: &'a [Capability], transitions: &'a [Transition<'a>]) -> Self {
        assert!(!states.is_empty(), "slave FSM needs at least one state");
        assert!(states.len() <= StateId::MAX as usize + 1, "too many states");
        Self {
            states,
            transitions,
        }
    }

    /// All states in index order
    pub fn states(&self) -> &'a [Capability] {
        self.states
    }

    /// Transition table
    pub fn transitions(&self) -> &'a [Transition<'a>] {
        self.transitions
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Highest power state
    pub fn highest_state(&self) -> StateId {
        (self.states.len() - 1) as StateId
    }

    /// Check if `state` indexes a state of this FSM
    pub fn is_valid(&self, state: StateId) -> bool {
        (state as usize) < self.states.len()
    }

    /// Capabilities of a state (empty for an invalid index)
    pub fn capabilities(&self, state: StateId) -> Capability {
        self.states
            .get(state as usize)
            .copied()
            .unwrap_or(Capability::empty())
    }

    /// Check if `state` provides all of `caps`
    #[inline]
    pub fn state_has(&self, state: StateId, caps: Capability) -> bool {
        self.capabilities(state).contains(caps)
    }

    /// Find the transition `from -> to`
    pub fn transition(&self, from: StateId, to: StateId) -> Option<&'a Transition<'a>> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.to == to)
    }

    // ========================================================================
    // State Selection
    // ========================================================================

    /// Lowest-power state providing all of `caps`
    ///
    /// Fails with [`Error::Conflict`] when no state is a superset, i.e. the
    /// masters asked for capability combinations no single state offers.
    pub fn find_state_with_capabilities(&self, caps: Capability) -> Result<StateId> {
        self.states
            .iter()
            .position(|s| s.contains(caps))
            .map(|i| i as StateId)
            .ok_or(Error::Conflict)
    }

    /// Check if any state provides all of `caps`
    pub fn has_state_with_capabilities(&self, caps: Capability) -> bool {
        self.states.iter().any(|s| s.contains(caps))
    }

    /// Wake-up latency from `state` to the highest state
    ///
    /// Zero for the highest state itself and for states with no edge to it.
    pub fn latency_from_state(&self, state: StateId) -> LatencyUs {
        let highest = self.highest_state();
        self.transitions
            .iter()
            .find(|t| t.from == state && t.to == highest)
            .map(|t| t.latency)
            .unwrap_or(0)
    }

    /// Promote `start` upward to the first state covering `caps` whose
    /// wake-up latency fits `budget`
    ///
    /// States below `start` are never considered. Exhausting the states
    /// yields [`Error::Conflict`].
    pub fn constrain_by_latency(
        &self,
        start: StateId,
        caps: Capability,
        budget: LatencyUs,
    ) -> Result<StateId> {
        (start as usize..self.states.len())
            .map(|i| i as StateId)
            .find(|&s| self.state_has(s, caps) && self.latency_from_state(s) <= budget)
            .ok_or(Error::Conflict)
    }
}
