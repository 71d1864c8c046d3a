//! # Reconfig
//!
//! Connection to a remote reconfiguration server.
//!
//! One TCP session at a time, served by one I/O thread running a
//! current-thread tokio runtime. Frames are `u32` big-endian length prefixed;
//! every inbound frame is a document applied to the dataflow incrementally.

pub mod address;
pub mod controller;

pub use address::{ServerAddress, DEFAULT_PORT};
pub use controller::{ConnectionState, NetworkController, NetworkOptions};
