//! Topology change listener

use crate::{ComponentId, Subgraph};

/// Receives component additions and removals
///
/// Called on the control-loop thread, after the change has been committed.
/// Implementations must not call back into lifecycle operations.
pub trait DataflowObserver: Send + Sync {
    /// A component was created or replaced by subgraph `pattern`/`id`
    fn notify_add_component(&self, pattern: &str, id: &ComponentId, subgraph: &Subgraph);

    /// Component `id` of pattern `pattern` was removed
    fn notify_delete_component(&self, pattern: &str, id: &ComponentId);
}
