//! # Dataflow
//!
//! Lifecycle of the component graph.
//!
//! - `ComponentRegistry`: class name -> component factory
//! - `DataflowNetwork`: live components, two-phase plan / commit updates
//! - `ObserverBus`: topology change notifications
//! - `LifecycleController`: load / start / stop / clear with their ordering
//! - `DataflowHandle`: the control-loop thread every mutation goes through

pub mod controller;
pub mod handle;
pub mod network;
pub mod observer;
pub mod registry;

pub use controller::{DataflowStatus, LifecycleController, LifecycleState};
pub use handle::{on_control_thread, DataflowHandle};
pub use network::{DataflowNetwork, NetworkEnv, NetworkUpdate};
pub use observer::ObserverBus;
pub use registry::{ComponentFactory, ComponentRegistry};
