//! Dependency collaborators
//!
//! The resolution core never touches registers. Power parents and clock
//! sources are reached through the traits below; the platform layer
//! implements them on top of the node framework.
//!
//! # Implementing a power parent
//!
//! ```ignore
//! struct FpdDomain { users: Cell<u32> }
//!
//! impl PowerParent for FpdDomain {
//!     fn request_parent(&self, _child: NodeId) -> DepResult {
//!         if self.users.get() == 0 {
//!             // Power up the island
//!         }
//!         self.users.set(self.users.get() + 1);
//!         Ok(())
//!     }
//!
//!     // ... implement other methods
//! }
//! ```

use crate::types::*;

/// Result of a collaborator call
pub type DepResult = core::result::Result<(), DependencyError>;

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Power parent of a slave (power island or domain)
///
/// All methods take `&self`; implementations keep their use counts in
/// cells since calls are serialized on the management core.
pub trait PowerParent {
    /// Make sure the parent is powered for `child`
    fn request_parent(&self, child: NodeId) -> DepResult;

    /// Drop the request made for `child`
    fn release_parent(&self, child: NodeId);

    /// Latency requirement of `child` changed; re-evaluate parent timing
    fn update_latency_requirement(&self, child: NodeId) -> DepResult;

    /// Parent's own wake-up latency
    ///
    /// Parents that cannot report a latency keep the default, which
    /// returns [`Error::NoFeature`].
    fn wake_up_latency(&self) -> Result<LatencyUs> {
        Err(Error::NoFeature)
    }
}

/// Clock resources of a slave
pub trait ClockControl {
    /// Enable all clocks used by `node`
    fn request_clocks(&self, node: NodeId) -> DepResult;

    /// Disable the clocks used by `node`
    fn release_clocks(&self, node: NodeId);
}

// ============================================================================
// Simulated collaborators (for testing)
// ============================================================================

#[cfg(any(test, feature = "std"))]
pub use sim::{SimClocks, SimParent};

#[cfg(any(test, feature = "std"))]
mod sim {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Simulated power parent counting requests and releases
    #[derive(Debug, Default)]
    pub struct SimParent {
        requests: AtomicU32,
        releases: AtomicU32,
        latency_updates: AtomicU32,
        refuse: AtomicBool,
        refuse_latency: AtomicBool,
        latency: Option<LatencyUs>,
    }

    impl SimParent {
        /// Create parent that cannot report its latency
        pub fn new() -> Self {
            Self::default()
        }

        /// Create parent with a known wake-up latency
        pub fn with_latency(latency: LatencyUs) -> Self {
            Self {
                latency: Some(latency),
                ..Self::default()
            }
        }

        /// Refuse (or accept again) subsequent requests
        pub fn set_refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }

        /// Reject (or accept again) subsequent latency requirement changes
        pub fn set_refuse_latency(&self, refuse: bool) {
            self.refuse_latency.store(refuse, Ordering::SeqCst);
        }

        /// Number of successful requests
        pub fn requests(&self) -> u32 {
            self.requests.load(Ordering::SeqCst)
        }

        /// Number of releases
        pub fn releases(&self) -> u32 {
            self.releases.load(Ordering::SeqCst)
        }

        /// Requests not yet released
        pub fn held(&self) -> u32 {
            self.requests().saturating_sub(self.releases())
        }

        /// Number of accepted latency requirement notifications
        pub fn latency_updates(&self) -> u32 {
            self.latency_updates.load(Ordering::SeqCst)
        }
    }

    impl PowerParent for SimParent {
        fn request_parent(&self, _child: NodeId) -> DepResult {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(DependencyError::ParentRefused);
            }
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release_parent(&self, _child: NodeId) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn update_latency_requirement(&self, _child: NodeId) -> DepResult {
            if self.refuse_latency.load(Ordering::SeqCst) {
                return Err(DependencyError::LatencyRejected);
            }
            self.latency_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn wake_up_latency(&self) -> Result<LatencyUs> {
            self.latency.ok_or(Error::NoFeature)
        }
    }

    /// Simulated clock source counting requests and releases
    #[derive(Debug, Default)]
    pub struct SimClocks {
        requests: AtomicU32,
        releases: AtomicU32,
        refuse: AtomicBool,
    }

    impl SimClocks {
        /// Create clock source
        pub fn new() -> Self {
            Self::default()
        }

        /// Refuse (or accept again) subsequent requests
        pub fn set_refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }

        /// Number of successful requests
        pub fn requests(&self) -> u32 {
            self.requests.load(Ordering::SeqCst)
        }

        /// Number of releases
        pub fn releases(&self) -> u32 {
            self.releases.load(Ordering::SeqCst)
        }

        /// Requests not yet released
        pub fn held(&self) -> u32 {
            self.requests().saturating_sub(self.releases())
        }
    }

    impl ClockControl for SimClocks {
        fn request_clocks(&self, _node: NodeId) -> DepResult {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(DependencyError::ClockRefused);
            }
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release_clocks(&self, _node: NodeId) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_parent_counts() {
        let parent = SimParent::with_latency(30);
        parent.request_parent(1).unwrap();
        parent.request_parent(2).unwrap();
        parent.release_parent(1);
        assert_eq!(parent.held(), 1);
        assert_eq!(parent.wake_up_latency(), Ok(30));

        parent.set_refuse(true);
        assert_eq!(parent.request_parent(3), Err(DependencyError::ParentRefused));
        assert_eq!(parent.requests(), 2);
    }

    #[test]
    fn test_parent_without_latency() {
        assert_eq!(SimParent::new().wake_up_latency(), Err(Error::NoFeature));
    }
}
