//! Boolean-returning facade for callers that cannot handle `Result`
//!
//! Failures are reported as `false` / `None` and the message is kept for
//! [`SimpleFacade::last_error`]. Panics inside an operation are caught and
//! reported the same way.

use std::fmt::Display;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{ContractError, DataflowObserver, Timestamp};
use config_loader::FacadeConfig;
use ports::{ApplicationPullSink, StringReceiver};
use reconfig::ConnectionState;
use tracing::{debug, warn};

use crate::advanced::AdvancedFacade;
use crate::simple_types::{
    SimpleButton, SimpleDistance, SimpleErrorPose, SimpleErrorPosition3D, SimpleErrorPositionList3D, SimpleImage,
    SimpleMatrix3x3, SimpleMatrix3x4, SimpleMatrix4x4, SimplePose, SimplePosition2D, SimplePosition2DList,
    SimplePosition3D, SimplePositionList3D, SimpleValue,
};

type ErrorSlot = Arc<Mutex<Option<String>>>;

fn store(slot: &ErrorSlot, message: impl Display) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Push source accepting flat values
pub struct SimplePushSource<S> {
    send: Box<dyn Fn(S) + Send + Sync>,
}

impl<S: SimpleValue> SimplePushSource<S> {
    /// Fire-and-forget; invalid values are dropped and counted on the source
    pub fn send(&self, value: S) {
        (self.send)(value)
    }
}

/// Push source accepting string-encoded measurements
pub struct SimpleStringSource {
    receiver: Arc<dyn StringReceiver>,
}

impl SimpleStringSource {
    /// Malformed strings are dropped and counted on the source
    pub fn send(&self, value: &str) {
        self.receiver.receive_string(value)
    }
}

/// Pull sink answering with flat values
pub struct SimplePullSink<S: SimpleValue> {
    sink: Arc<ApplicationPullSink<S::Value>>,
    last_error: ErrorSlot,
    _value: PhantomData<fn() -> S>,
}

impl<S: SimpleValue> SimplePullSink<S> {
    /// Value for time `t`, or `None` with [`Self::last_error`] set
    pub fn get(&self, t: Timestamp) -> Option<S> {
        match self.sink.get(t) {
            Ok(m) => Some(S::from_measurement(m)),
            Err(e) => {
                store(&self.last_error, e);
                None
            }
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Facade exchanging flat values; see the module docs for error reporting
pub struct SimpleFacade {
    facade: Option<AdvancedFacade>,
    observer: Mutex<Option<Arc<dyn DataflowObserver>>>,
    last_error: ErrorSlot,
}

macro_rules! simple_callbacks {
    ($($(#[$doc:meta])* $method:ident => $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $method<F>(&self, name: &str, f: F) -> bool
            where
                F: Fn($ty) + Send + Sync + 'static,
            {
                self.set_callback::<$ty, F>(name, f)
            }
        )*
    };
}

macro_rules! simple_push_sources {
    ($($method:ident => $ty:ty;)*) => {
        $(
            pub fn $method(&self, name: &str) -> Option<SimplePushSource<$ty>> {
                self.push_source::<$ty>(name)
            }
        )*
    };
}

macro_rules! simple_pull_sinks {
    ($($method:ident => $ty:ty;)*) => {
        $(
            pub fn $method(&self, name: &str) -> Option<SimplePullSink<$ty>> {
                self.pull_sink::<$ty>(name)
            }
        )*
    };
}

impl SimpleFacade {
    /// Facade with the default configuration
    ///
    /// Never fails; if setup fails every operation returns `false` and
    /// `last_error` holds the cause.
    pub fn new() -> Self {
        Self::with_config(FacadeConfig::default())
    }

    pub fn with_config(config: FacadeConfig) -> Self {
        let last_error = ErrorSlot::default();
        let facade = match AdvancedFacade::with_config(config) {
            Ok(facade) => Some(facade),
            Err(e) => {
                warn!(error = %e, "Facade setup failed");
                store(&last_error, e);
                None
            }
        };
        Self {
            facade,
            observer: Mutex::new(None),
            last_error,
        }
    }

    /// Wrap an already built facade
    pub fn from_advanced(facade: AdvancedFacade) -> Self {
        Self {
            facade: Some(facade),
            observer: Mutex::new(None),
            last_error: ErrorSlot::default(),
        }
    }

    /// Current time in nanoseconds
    pub fn now() -> Timestamp {
        contracts::now()
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn load_dataflow(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.run("load_dataflow", |f| f.load_dataflow(path, true)).is_some()
    }

    pub fn load_dataflow_string(&self, document: &str) -> bool {
        self.run("load_dataflow_string", |f| f.load_dataflow_str(document, true))
            .is_some()
    }

    pub fn clear_dataflow(&self) -> bool {
        self.run("clear_dataflow", AdvancedFacade::clear_dataflow).is_some()
    }

    pub fn start_dataflow(&self) -> bool {
        self.run("start_dataflow", AdvancedFacade::start_dataflow).is_some()
    }

    pub fn stop_dataflow(&self) -> bool {
        self.run("stop_dataflow", AdvancedFacade::stop_dataflow).is_some()
    }

    pub fn connect_to_server(&self, address: &str) -> bool {
        self.run("connect_to_server", |f| f.connect_to_server(address)).is_some()
    }

    pub fn send_to_server_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.run("send_to_server_file", |f| f.send_to_server_file(path)).is_some()
    }

    pub fn send_to_server_string(&self, document: &str) -> bool {
        self.run("send_to_server_string", |f| f.send_to_server_str(document))
            .is_some()
    }

    /// Server session state; `Disconnected` once the facade is gone
    pub fn connection_state(&self) -> ConnectionState {
        self.facade
            .as_ref()
            .map_or(ConnectionState::Disconnected, AdvancedFacade::connection_state)
    }

    /// Replace the single observer installed through this facade
    pub fn set_dataflow_observer(&self, observer: Arc<dyn DataflowObserver>) -> bool {
        let mut current = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        let installed = self.run("set_dataflow_observer", |f| {
            if let Some(previous) = current.take() {
                f.remove_observer(previous)?;
            }
            f.add_observer(Arc::clone(&observer))
        });
        if installed.is_some() {
            *current = Some(observer);
        }
        installed.is_some()
    }

    pub fn remove_dataflow_observer(&self) -> bool {
        let mut current = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(observer) = current.take() else {
            return true;
        };
        self.run("remove_dataflow_observer", |f| f.remove_observer(observer))
            .is_some()
    }

    /// Install a flat-value callback on push sink `name`
    pub fn set_callback<S, F>(&self, name: &str, f: F) -> bool
    where
        S: SimpleValue,
        F: Fn(S) + Send + Sync + 'static,
    {
        self.run("set_callback", |facade| {
            facade.set_callback::<S::Value, _>(name, move |m| f(S::from_measurement(m)))
        })
        .is_some()
    }

    /// Install a string callback on push sink `name`, whatever its kind
    pub fn set_string_callback<F>(&self, name: &str, f: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.run("set_string_callback", |facade| facade.set_string_callback(name, f))
            .is_some()
    }

    pub fn clear_callback(&self, name: &str) -> bool {
        self.run("clear_callback", |f| f.clear_callback(name)).is_some()
    }

    pub fn push_source<S: SimpleValue>(&self, name: &str) -> Option<SimplePushSource<S>> {
        self.run("push_source", |f| f.push_source::<S::Value>(name))
            .map(|source| SimplePushSource {
                send: Box::new(source.receiver(S::into_measurement)),
            })
    }

    /// String source for push source `name`, whatever its kind
    pub fn string_push_source(&self, name: &str) -> Option<SimpleStringSource> {
        self.run("string_push_source", |f| f.string_source(name))
            .map(|receiver| SimpleStringSource { receiver })
    }

    pub fn pull_sink<S: SimpleValue>(&self, name: &str) -> Option<SimplePullSink<S>> {
        self.run("pull_sink", |f| f.pull_sink::<S::Value>(name))
            .map(|sink| SimplePullSink {
                sink,
                last_error: ErrorSlot::default(),
                _value: PhantomData,
            })
    }

    /// String-encoded value of pull sink `name` at time `t`
    pub fn pull_string(&self, name: &str, t: Timestamp) -> Option<String> {
        self.run("pull_string", |f| f.string_pull(name)?.get_string(t))
    }

    simple_callbacks! {
        set_pose_callback => SimplePose;
        set_error_pose_callback => SimpleErrorPose;
        set_position2d_callback => SimplePosition2D;
        set_position3d_callback => SimplePosition3D;
        set_error_position3d_callback => SimpleErrorPosition3D;
        set_position2d_list_callback => SimplePosition2DList;
        set_position3d_list_callback => SimplePositionList3D;
        set_error_position3d_list_callback => SimpleErrorPositionList3D;
        set_matrix3x4_callback => SimpleMatrix3x4;
        set_matrix4x4_callback => SimpleMatrix4x4;
        set_distance_callback => SimpleDistance;
        /// Latest image only; older pending images are dropped
        set_image_callback => SimpleImage;
    }

    simple_push_sources! {
        position2d_push_source => SimplePosition2D;
        position3d_push_source => SimplePosition3D;
        pose_push_source => SimplePose;
        button_push_source => SimpleButton;
        position3d_list_push_source => SimplePositionList3D;
    }

    simple_pull_sinks! {
        pose_pull_sink => SimplePose;
        error_pose_pull_sink => SimpleErrorPose;
        matrix3x3_pull_sink => SimpleMatrix3x3;
        matrix4x4_pull_sink => SimpleMatrix4x4;
        position3d_pull_sink => SimplePosition3D;
        error_position3d_pull_sink => SimpleErrorPosition3D;
        position3d_list_pull_sink => SimplePositionList3D;
        error_position3d_list_pull_sink => SimpleErrorPositionList3D;
    }

    /// Close the connection and stop the dataflow; later calls fail
    pub fn kill_everything(&self) {
        if let Some(facade) = &self.facade {
            facade.shutdown();
        }
    }

    fn run<T, F>(&self, operation: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(&AdvancedFacade) -> Result<T, ContractError>,
    {
        let Some(facade) = &self.facade else {
            store(&self.last_error, "facade is not initialized");
            return None;
        };
        match catch_unwind(AssertUnwindSafe(|| f(facade))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                debug!(operation, error = %e, "Operation failed");
                store(&self.last_error, e);
                None
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(operation, panic = %message, "Operation panicked");
                store(&self.last_error, format!("{operation} panicked: {message}"));
                None
            }
        }
    }
}

impl Default for SimpleFacade {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PIPELINE: &str = r#"{"subgraphs": [
        {"name": "Injector", "id": "src", "component": {"class": "ApplicationPushSourcePosition"}},
        {"name": "Viewer", "id": "sink", "component": {"class": "ApplicationPushSinkPosition"},
         "inputs": [{"port": "Input", "source": "src", "source_port": "Output"}]}]}"#;

    #[test]
    fn test_flat_values_flow() {
        let facade = SimpleFacade::new();
        assert!(facade.load_dataflow_string(PIPELINE));
        assert!(facade.start_dataflow());

        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(facade.set_position3d_callback("sink", move |p| {
            let _ = tx.send(p);
        }));
        let source = facade.position3d_push_source("src").unwrap();
        source.send(SimplePosition3D {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            timestamp: 5,
        });

        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((received.x, received.y, received.z, received.timestamp), (1.0, 2.0, 3.0, 5));
    }

    #[test]
    fn test_failures_set_last_error() {
        let facade = SimpleFacade::new();
        assert_eq!(facade.last_error(), None);

        assert!(!facade.load_dataflow_string("{ not a document"));
        assert!(facade.last_error().unwrap().contains("parse error"));

        assert!(!facade.send_to_server_string("{}"));
        assert_eq!(facade.last_error().as_deref(), Some("no connection to server"));

        assert!(facade.pose_push_source("missing").is_none());
    }

    #[test]
    fn test_unresolvable_server() {
        let facade = SimpleFacade::new();
        assert!(!facade.connect_to_server("nonexistent-host.invalid:9999"));
        let error = facade.last_error().unwrap();
        assert!(error.contains("nonexistent-host.invalid"), "{error}");
        assert_eq!(facade.connection_state(), ConnectionState::Disconnected);
        assert!(!facade.send_to_server_string("{}"));
    }

    #[test]
    fn test_string_callback_on_any_kind() {
        let facade = SimpleFacade::new();
        assert!(facade.load_dataflow_string(PIPELINE));
        assert!(facade.start_dataflow());

        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(facade.set_string_callback("sink", move |s| {
            let _ = tx.send(s.to_string());
        }));
        let source = facade.string_push_source("src").unwrap();
        source.send("not json");
        source.send(r#"{"timestamp": 9, "value": [1.0, 2.0, 3.0]}"#);

        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(received.contains("\"timestamp\":9"));
    }

    #[test]
    fn test_observer_replaced() {
        struct Quiet;
        impl DataflowObserver for Quiet {
            fn notify_add_component(&self, _: &str, _: &contracts::ComponentId, _: &contracts::Subgraph) {}
            fn notify_delete_component(&self, _: &str, _: &contracts::ComponentId) {}
        }

        let facade = SimpleFacade::new();
        assert!(facade.set_dataflow_observer(Arc::new(Quiet)));
        assert!(facade.set_dataflow_observer(Arc::new(Quiet)));
        assert!(facade.remove_dataflow_observer());
        assert!(facade.remove_dataflow_observer());
    }

    #[test]
    fn test_kill_everything() {
        let facade = SimpleFacade::new();
        facade.kill_everything();
        assert!(!facade.start_dataflow());
        assert!(facade.last_error().is_some());
    }
}
