//! Node class operations
//!
//! Operations the power manager runs on every node of a class regardless
//! of its type: shutdown, configuration reset and latency reporting.

use crate::types::*;

/// Node that can be driven uniformly by a registry
pub trait PowerNode {
    /// Platform node id
    fn node_id(&self) -> NodeId;

    /// Name (for debugging)
    fn name(&self) -> &'static str;

    /// Current state index
    fn state(&self) -> StateId;

    /// Wake-up latency including the power parent, where known
    fn wake_up_latency(&self) -> WakeUpLatency;

    /// Drop all usage and move to the lowest power state
    fn force_down(&mut self) -> Result<()>;

    /// Forget all configuration (permissions and policy)
    fn clear_config(&mut self);
}
