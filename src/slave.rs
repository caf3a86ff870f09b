//! Slave nodes
//!
//! # Resolution
//!
//! A slave never decides on its own which state it is in. Masters change
//! their [`Requirement`]s and then call [`Slave::update`], which
//!
//! 1. unions the capabilities of all masters using the slave
//! 2. picks the lowest-power state providing them (state 0 if none)
//! 3. promotes that state until its wake-up latency fits the tightest
//!    latency requirement
//! 4. runs the transition, acquiring the power parent and clocks the new
//!    state needs before it and releasing the ones it no longer needs after
//!
//! Any failure leaves the slave exactly as it was.

use crate::fsm::SlaveFsm;
use crate::hal::{ClockControl, PowerParent};
use crate::master::MasterRegistry;
use crate::node::PowerNode;
use crate::requirement::{Requirement, Requirements};
use crate::types::*;
use tracing::{debug, trace, warn};

/// Dependencies acquired while preparing a transition
#[derive(Debug, Clone, Copy, Default)]
struct Prepared {
    parent: bool,
    clocks: bool,
}

// ============================================================================
// Slave
// ============================================================================

/// Power-manageable hardware node
pub struct Slave<'a> {
    // Identity
    /// Node id
    node: NodeId,
    /// Name (for debugging)
    name: &'static str,

    // State machine
    /// Shared descriptor of this slave type
    fsm: &'a SlaveFsm<'a>,
    /// Current state index
    curr_state: StateId,
    /// Slack between the latency requirement and the achieved latency
    latency_margin: LatencyUs,

    // Dependencies
    /// Power parent
    parent: Option<&'a dyn PowerParent>,
    /// Clock resources
    clocks: Option<&'a dyn ClockControl>,
    /// GIC proxy wake association
    wake: Option<WakeSource>,

    // Configuration
    /// Usage policy
    policy: SlavePolicy,
    /// Requirements of permitted masters
    reqs: Requirements,
}

impl<'a> Slave<'a> {
    /// Create a slave in state 0 with no dependencies
    pub fn new(node: NodeId, name: &'static str, fsm: &'a SlaveFsm<'a>) -> Self {
        Self {
            node,
            name,
            fsm,
            curr_state: 0,
            latency_margin: MAX_LATENCY,
            parent: None,
            clocks: None,
            wake: None,
            policy: SlavePolicy::empty(),
            reqs: Requirements::new(),
        }
    }

    /// Attach a power parent
    pub fn with_parent(mut self, parent: &'a dyn PowerParent) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Attach clock resources
    pub fn with_clocks(mut self, clocks: &'a dyn ClockControl) -> Self {
        self.clocks = Some(clocks);
        self
    }

    /// Associate a wake source
    pub fn with_wake_source(mut self, wake: WakeSource) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Set the state the hardware is in at startup
    ///
    /// Out-of-range indices select the highest state.
    pub fn with_state(mut self, state: StateId) -> Self {
        self.curr_state = state.min(self.fsm.highest_state());
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Node id
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// State machine descriptor
    pub fn fsm(&self) -> &'a SlaveFsm<'a> {
        self.fsm
    }

    /// Current state index
    pub fn state(&self) -> StateId {
        self.curr_state
    }

    /// Capabilities of the current state
    pub fn state_capabilities(&self) -> Capability {
        self.fsm.capabilities(self.curr_state)
    }

    /// Latency margin recorded by the last successful update
    pub fn latency_margin(&self) -> LatencyUs {
        self.latency_margin
    }

    /// Usage policy
    pub fn policy(&self) -> SlavePolicy {
        self.policy
    }

    /// Check if multiple masters may use the slave
    pub fn is_shareable(&self) -> bool {
        self.policy.contains(SlavePolicy::SHAREABLE)
    }

    /// Requirement table
    pub fn requirements(&self) -> &Requirements {
        &self.reqs
    }

    /// Mutable requirement table
    ///
    /// Changes take effect on the next [`update`](Self::update).
    pub fn requirements_mut(&mut self) -> &mut Requirements {
        &mut self.reqs
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Move the slave to the state demanded by the current requirements
    pub fn update(&mut self) -> Result<()> {
        let caps = self.reqs.max_capabilities();

        let mut state: StateId = 0;
        if !caps.is_empty() {
            state = self.fsm.find_state_with_capabilities(caps).map_err(|e| {
                warn!(node = self.node, caps = caps.bits(), "no state with requested capabilities");
                e
            })?;
        }

        let min_lat = self.reqs.min_latency();
        let mut wkup_lat = self.fsm.latency_from_state(state);
        if wkup_lat > min_lat {
            state = self
                .fsm
                .constrain_by_latency(state, caps, min_lat)
                .map_err(|e| {
                    warn!(node = self.node, min_lat, "no state satisfies latency requirement");
                    e
                })?;
            wkup_lat = self.fsm.latency_from_state(state);
        }
        let margin = min_lat - wkup_lat;

        if state != self.curr_state {
            self.change_state(state)?;
        } else if !self.fsm.state_has(state, Capability::POWER) {
            if let Some(parent) = self.parent {
                parent.update_latency_requirement(self.node).map_err(|e| {
                    warn!(node = self.node, "{} latency update rejected: {}", self.name, e);
                    e
                })?;
            }
        }
        self.latency_margin = margin;

        Ok(())
    }

    /// Run the transition to `next`
    fn change_state(&mut self, next: StateId) -> Result<()> {
        let prev = self.curr_state;

        let status = self.prepare_state(next).and_then(|prepared| {
            self.run_transition(prev, next).map_err(|e| {
                self.undo_prepare(prepared);
                e
            })
        });

        match status {
            Ok(()) => {
                if prev != next {
                    self.curr_state = next;
                    self.clear_after_state(prev);
                }
                debug!(node = self.node, "{} {} -> {}", self.name, prev, next);
            }
            Err(e) => {
                warn!(node = self.node, "{} {} -> {} failed: {}", self.name, prev, next, e);
            }
        }
        status
    }

    /// Acquire the power parent and clocks `next` needs and `curr` lacks
    fn prepare_state(&self, next: StateId) -> Result<Prepared> {
        let curr = self.curr_state;
        let mut prepared = Prepared::default();

        if let Some(parent) = self.parent {
            if self.gains(curr, next, Capability::POWER) {
                parent.request_parent(self.node)?;
                prepared.parent = true;
            }
        }

        if let Some(clocks) = self.clocks {
            if self.gains(curr, next, Capability::CLOCK) {
                if let Err(e) = clocks.request_clocks(self.node) {
                    self.undo_prepare(prepared);
                    return Err(e.into());
                }
                prepared.clocks = true;
            }
        }

        Ok(prepared)
    }

    /// Give back what a failed transition acquired
    fn undo_prepare(&self, prepared: Prepared) {
        if prepared.clocks {
            if let Some(clocks) = self.clocks {
                clocks.release_clocks(self.node);
            }
        }
        if prepared.parent {
            if let Some(parent) = self.parent {
                parent.release_parent(self.node);
            }
        }
    }

    /// Look up and run the FSM transition `from -> to`
    fn run_transition(&self, from: StateId, to: StateId) -> Result<()> {
        // Single-state FSMs have no transitions
        if self.fsm.transitions().is_empty() {
            return Ok(());
        }

        let transition = self
            .fsm
            .transition(from, to)
            .ok_or(Error::TransitionUndefined { from, to })?;

        match transition.action {
            Some(action) => action.enter(self.node, to),
            None => Ok(()),
        }
    }

    /// Release the clocks and power parent the new state no longer needs
    fn clear_after_state(&self, prev: StateId) {
        let curr = self.curr_state;

        if let Some(clocks) = self.clocks {
            if self.gains(curr, prev, Capability::CLOCK) {
                clocks.release_clocks(self.node);
            }
        }

        if let Some(parent) = self.parent {
            if self.gains(curr, prev, Capability::POWER) {
                parent.release_parent(self.node);
            }
        }
    }

    /// Check if `to` has `cap` while `from` does not
    #[inline]
    fn gains(&self, from: StateId, to: StateId, cap: Capability) -> bool {
        !self.fsm.state_has(from, cap) && self.fsm.state_has(to, cap)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Use the slave on behalf of `master` with `caps` and `latency`
    ///
    /// The master's previous requirement is restored if the slave cannot
    /// satisfy the new one.
    pub fn request(&mut self, master: MasterId, caps: Capability, latency: LatencyUs) -> Result<()> {
        if !self.is_shareable() && !self.reqs.users_mask().without(master).is_empty() {
            return Err(Error::NodeBusy);
        }

        self.change_requirement(master, |req| {
            req.set_capabilities(caps);
            req.set_latency(latency);
        })
    }

    /// Change only the latency requirement of `master`
    pub fn set_latency_requirement(&mut self, master: MasterId, latency: LatencyUs) -> Result<()> {
        self.change_requirement(master, |req| req.set_latency(latency))
    }

    /// Stop using the slave on behalf of `master`
    ///
    /// The master keeps using the slave if the slave cannot leave its
    /// current state.
    pub fn release(&mut self, master: MasterId) -> Result<()> {
        let req = self.reqs.get(master).ok_or(Error::NoPermission)?;
        if !req.is_using() {
            return Err(Error::NotUsing);
        }
        self.change_requirement(master, Requirement::clear)
    }

    fn change_requirement<F>(&mut self, master: MasterId, change: F) -> Result<()>
    where
        F: FnOnce(&mut Requirement),
    {
        let req = self.reqs.get_mut(master).ok_or(Error::NoPermission)?;
        let saved = *req;
        change(req);

        if let Err(e) = self.update() {
            if let Some(req) = self.reqs.get_mut(master) {
                *req = saved;
            }
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Check if any state provides all of `caps`
    pub fn check_capabilities(&self, caps: Capability) -> bool {
        self.fsm.has_state_with_capabilities(caps)
    }

    /// Check if the slave can wake up a master
    pub fn has_wake_up_capability(&self) -> bool {
        self.wake.is_some() && self.check_capabilities(Capability::WAKEUP)
    }

    /// Masters currently using the slave
    pub fn users_mask(&self) -> MasterMask {
        self.reqs.users_mask()
    }

    /// Usage relative to `master`
    pub fn usage_status(&self, master: MasterId) -> UsageStatus {
        self.reqs.usage_status(master)
    }

    /// Capabilities currently requested by `master` (empty if not using)
    pub fn current_requirement(&self, master: MasterId) -> Capability {
        self.reqs
            .get(master)
            .filter(|r| r.is_using())
            .map(Requirement::capabilities)
            .unwrap_or(Capability::empty())
    }

    /// Admission check before granting a new use of the slave
    pub fn verify_request(&self) -> Result<()> {
        if self.is_shareable() || self.users_mask().is_empty() {
            Ok(())
        } else {
            Err(Error::NodeBusy)
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Apply usage policy and permissions
    ///
    /// Every identity in `perms` must resolve through `masters`; the call
    /// checks all of them (and the table capacity) before changing anything.
    pub fn set_config<R>(&mut self, policy: SlavePolicy, perms: MasterMask, masters: &R) -> Result<()>
    where
        R: MasterRegistry + ?Sized,
    {
        let mut new_masters = 0;
        for id in perms.iter() {
            if masters.lookup(id).is_none() {
                warn!(node = self.node, master = id.mask(), "unknown master in permissions");
                return Err(Error::UnknownMaster(id.mask()));
            }
            if self.reqs.get(id).is_none() {
                new_masters += 1;
            }
        }
        if new_masters > self.reqs.remaining() {
            return Err(Error::NoMemory);
        }

        if policy.contains(SlavePolicy::SHAREABLE) {
            self.policy.insert(SlavePolicy::SHAREABLE);
        }
        for id in perms.iter() {
            self.reqs.add(id)?;
        }

        trace!(node = self.node, perms = perms.bits(), policy = self.policy.bits(), "configured");
        Ok(())
    }

    /// Forget all permissions and the usage policy
    pub fn clear_config(&mut self) {
        self.reqs.remove_all();
        self.policy = SlavePolicy::empty();
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Drop all usage and move to the lowest power state
    ///
    /// Used on master failure and shutdown. Only entries the slave already
    /// tracks are touched, so permissions cannot make this fail.
    pub fn force_down(&mut self) -> Result<()> {
        self.reqs.clear_usage();
        if self.curr_state != 0 {
            self.change_state(0)?;
        }
        Ok(())
    }

    /// Wake-up latency of the current state plus the power parent's
    pub fn wake_up_latency(&self) -> WakeUpLatency {
        let local = self.fsm.latency_from_state(self.curr_state);

        match self.parent.map(|p| p.wake_up_latency()) {
            Some(Ok(parent_lat)) => WakeUpLatency {
                latency: local.saturating_add(parent_lat),
                complete: true,
            },
            // Parent cannot tell; report what is known
            Some(Err(_)) => WakeUpLatency {
                latency: local,
                complete: false,
            },
            None => WakeUpLatency {
                latency: local,
                complete: true,
            },
        }
    }
}

impl PowerNode for Slave<'_> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn state(&self) -> StateId {
        self.curr_state
    }

    fn wake_up_latency(&self) -> WakeUpLatency {
        Slave::wake_up_latency(self)
    }

    fn force_down(&mut self) -> Result<()> {
        Slave::force_down(self)
    }

    fn clear_config(&mut self) {
        Slave::clear_config(self)
    }
}
