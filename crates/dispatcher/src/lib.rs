//! # Dispatcher
//!
//! Event scheduling for the dataflow.
//!
//! Responsibilities:
//! - Map each measurement kind to its dispatch policy
//! - Order pending events by priority, bounded per receiving port
//! - Drain the queue on one dispatch thread

pub mod dispatcher;
pub mod metrics;
pub mod policy;
pub mod queue;

pub use dispatcher::{on_dispatch_thread, Dispatcher};
pub use metrics::{QueueMetrics, QueueSnapshot};
pub use policy::{DispatchPolicy, PolicyRegistry, PriorityFn};
pub use queue::{Delivery, EnqueueOutcome, Event, EventQueue, PortKey};
