//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the tracking facade.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Timestamps are `u64` nanoseconds since the Unix epoch
//! - `0` marks a measurement that has not been stamped yet

mod component_id;
mod document;
mod error;
mod measurement;
mod observer;
mod values;

pub use component_id::ComponentId;
pub use document::*;
pub use error::*;
pub use measurement::*;
pub use observer::DataflowObserver;
pub use values::*;
