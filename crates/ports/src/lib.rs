//! # Ports
//!
//! Typed event ports and the application endpoints built on them.
//!
//! - `ApplicationPushSink<T>`: bus -> application callback (dispatch thread)
//! - `ApplicationPushSource<T>`: application -> bus, fire-and-forget
//! - `ApplicationPullSink<T>`: application pulls from an upstream supplier
//!
//! Measurements also travel in a JSON string form for callers that only know
//! a component by name.

pub mod codec;
pub mod component;
pub mod metrics;
pub mod port;
pub mod pull_sink;
pub mod push_sink;
pub mod push_source;
pub mod string_port;

pub use component::{Component, ComponentContext};
pub use metrics::{PortMetrics, PortSnapshot};
pub use port::{
    ConnectOp, InputPort, OutputPort, PortMode, PullConsumer, PullHandler, PullSupplier, PushConsumer,
    PushHandler, PushSupplier,
};
pub use pull_sink::ApplicationPullSink;
pub use push_sink::{ApplicationPushSink, PushCallback};
pub use push_source::ApplicationPushSource;
pub use string_port::{StringPull, StringReceiver, StringSink};
