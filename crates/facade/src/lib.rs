//! # Facade
//!
//! Application boundary of the tracking dataflow.
//!
//! - [`AdvancedFacade`]: typed measurements, `Result` on every operation
//! - [`SimpleFacade`]: flat values, `bool` / `Option` plus a last-error message
//!
//! # Example
//!
//! ```no_run
//! use facade::{SimpleFacade, SimplePose};
//!
//! let facade = SimpleFacade::new();
//! if !facade.load_dataflow("tracking.json") {
//!     eprintln!("load failed: {:?}", facade.last_error());
//! }
//! facade.set_pose_callback("Viewer", |pose: SimplePose| println!("{pose:?}"));
//! facade.start_dataflow();
//! ```

mod advanced;
mod simple;
mod simple_types;

pub use advanced::{network_options, policy_registry, AdvancedFacade, FacadeBuilder};
pub use simple::{SimpleFacade, SimplePullSink, SimplePushSource, SimpleStringSource};
pub use simple_types::{
    SimpleButton, SimpleDistance, SimpleErrorPose, SimpleErrorPosition3D, SimpleErrorPositionList3D, SimpleImage,
    SimpleMatrix3x3, SimpleMatrix3x4, SimpleMatrix4x4, SimplePose, SimplePosition2D, SimplePosition2DList,
    SimplePosition3D, SimplePositionList3D, SimpleValue,
};

pub use config_loader::FacadeConfig;
pub use contracts::{ContractError, DataflowObserver};
pub use reconfig::ConnectionState;
