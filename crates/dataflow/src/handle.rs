//! DataflowHandle - cloneable front of the single-writer control loop

use std::any::type_name;
use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use contracts::{ContractError, DataflowObserver, GraphDocument, MeasurementValue};
use ports::{
    ApplicationPullSink, ApplicationPushSink, ApplicationPushSource, Component, StringPull, StringReceiver,
    StringSink,
};

use crate::controller::{DataflowStatus, LifecycleController};

thread_local! {
    static ON_CONTROL_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Whether the caller runs on a dataflow control loop
///
/// Observers are notified there; blocking on the dataflow from it would wait
/// on itself.
pub fn on_control_thread() -> bool {
    ON_CONTROL_THREAD.with(Cell::get)
}

type Reply<T> = Sender<Result<T, ContractError>>;

enum Command {
    Load {
        document: GraphDocument,
        replace: bool,
        reply: Reply<()>,
    },
    LoadBytes {
        bytes: Bytes,
        replace: bool,
        reply: Reply<()>,
    },
    Reconfigure {
        bytes: Bytes,
        reply: Reply<()>,
    },
    Start {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Clear {
        reply: Reply<()>,
    },
    AddObserver {
        observer: Arc<dyn DataflowObserver>,
        reply: Reply<bool>,
    },
    RemoveObserver {
        observer: Arc<dyn DataflowObserver>,
        reply: Reply<bool>,
    },
    Shutdown,
}

/// Handle to the thread owning a [`LifecycleController`]
///
/// Every lifecycle call is a command executed in order on the control loop,
/// so local calls and network reconfigurations never interleave. Component
/// lookups read the latest published [`DataflowStatus`] instead.
#[derive(Clone)]
pub struct DataflowHandle {
    tx: Sender<Command>,
    status: watch::Receiver<DataflowStatus>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DataflowHandle {
    /// Move `controller` onto a new control-loop thread
    pub fn spawn(controller: LifecycleController) -> Result<Self, ContractError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let status = controller.subscribe();
        controller.publish();

        let thread = std::thread::Builder::new()
            .name("dataflow-control".to_string())
            .spawn(move || control_loop(controller, rx))?;

        Ok(Self {
            tx,
            status,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }

    fn call<T>(
        &self,
        operation: &'static str,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ContractError> {
        if dispatcher::on_dispatch_thread() || on_control_thread() {
            return Err(ContractError::Reentrant { operation });
        }
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(command(reply))
            .map_err(|_| ContractError::ControlLoopClosed)?;
        rx.recv().map_err(|_| ContractError::ControlLoopClosed)?
    }

    /// Apply a parsed document
    pub fn load(&self, document: GraphDocument, replace: bool) -> Result<(), ContractError> {
        self.call("load", |reply| Command::Load {
            document,
            replace,
            reply,
        })
    }

    /// Parse and apply a serialized document
    pub fn load_bytes(&self, bytes: impl Into<Bytes>, replace: bool) -> Result<(), ContractError> {
        let bytes = bytes.into();
        self.call("load", |reply| Command::LoadBytes { bytes, replace, reply })
    }

    /// Apply a serialized incremental document inside a stop/start bracket
    pub fn reconfigure(&self, bytes: impl Into<Bytes>) -> Result<(), ContractError> {
        let bytes = bytes.into();
        self.call("reconfigure", |reply| Command::Reconfigure { bytes, reply })
    }

    pub fn start(&self) -> Result<(), ContractError> {
        self.call("start", |reply| Command::Start { reply })
    }

    pub fn stop(&self) -> Result<(), ContractError> {
        self.call("stop", |reply| Command::Stop { reply })
    }

    pub fn clear(&self) -> Result<(), ContractError> {
        self.call("clear", |reply| Command::Clear { reply })
    }

    /// Register `observer`; `false` if it already was
    pub fn add_observer(&self, observer: Arc<dyn DataflowObserver>) -> Result<bool, ContractError> {
        self.call("add_observer", |reply| Command::AddObserver { observer, reply })
    }

    /// Unregister `observer`; `false` if it was not registered
    pub fn remove_observer(&self, observer: Arc<dyn DataflowObserver>) -> Result<bool, ContractError> {
        self.call("remove_observer", |reply| Command::RemoveObserver { observer, reply })
    }

    /// Latest published status
    pub fn status(&self) -> DataflowStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<DataflowStatus> {
        self.status.clone()
    }

    /// Whether the control loop is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Component by instance name
    pub fn component(&self, name: &str) -> Result<Arc<dyn Component>, ContractError> {
        self.status
            .borrow()
            .component(name)
            .ok_or_else(|| ContractError::not_found(name, "no such component"))
    }

    /// Component by instance name, downcast to `C`
    pub fn component_as<C: Component>(&self, name: &str) -> Result<Arc<C>, ContractError> {
        self.lookup(name, type_name::<C>())
    }

    fn lookup<C: Component>(&self, name: &str, expected: &str) -> Result<Arc<C>, ContractError> {
        let component = self.component(name)?;
        let found = component.class().to_string();
        component
            .into_any()
            .downcast::<C>()
            .map_err(|_| ContractError::type_mismatch(name, expected, found))
    }

    pub fn push_sink<T: MeasurementValue>(&self, name: &str) -> Result<Arc<ApplicationPushSink<T>>, ContractError> {
        self.lookup(name, &ApplicationPushSink::<T>::class_name())
    }

    pub fn push_source<T: MeasurementValue>(
        &self,
        name: &str,
    ) -> Result<Arc<ApplicationPushSource<T>>, ContractError> {
        self.lookup(name, &ApplicationPushSource::<T>::class_name())
    }

    pub fn pull_sink<T: MeasurementValue>(&self, name: &str) -> Result<Arc<ApplicationPullSink<T>>, ContractError> {
        self.lookup(name, &ApplicationPullSink::<T>::class_name())
    }

    /// Push sink of any kind, for string callbacks
    pub fn string_sink(&self, name: &str) -> Result<Arc<dyn StringSink>, ContractError> {
        let component = self.component(name)?;
        let found = component.class().to_string();
        component
            .string_sink()
            .ok_or_else(|| ContractError::type_mismatch(name, "ApplicationPushSink", found))
    }

    /// Push source of any kind, for string injection
    pub fn string_source(&self, name: &str) -> Result<Arc<dyn StringReceiver>, ContractError> {
        let component = self.component(name)?;
        let found = component.class().to_string();
        component
            .string_source()
            .ok_or_else(|| ContractError::type_mismatch(name, "ApplicationPushSource", found))
    }

    /// Pull sink of any kind, for string pulls
    pub fn string_pull(&self, name: &str) -> Result<Arc<dyn StringPull>, ContractError> {
        let component = self.component(name)?;
        let found = component.class().to_string();
        component
            .string_pull()
            .ok_or_else(|| ContractError::type_mismatch(name, "ApplicationPullSink", found))
    }

    /// Stop the control loop and wait for it
    ///
    /// The graph is cleared on the way out. Idempotent. Called from a push
    /// callback or an observer, the loop is told to exit but not joined.
    #[instrument(name = "dataflow_shutdown", skip(self))]
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
        if dispatcher::on_dispatch_thread() || on_control_thread() {
            debug!("Shutdown requested from inside the dataflow, not joining");
            return;
        }
        let thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("Control loop panicked");
            }
            debug!("Control loop joined");
        }
    }
}

impl std::fmt::Debug for DataflowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataflowHandle")
            .field("status", &*self.status.borrow())
            .finish()
    }
}

fn control_loop(mut controller: LifecycleController, rx: Receiver<Command>) {
    ON_CONTROL_THREAD.with(|flag| flag.set(true));
    info!("Control loop started");

    // Status is published before replying so callers observe their own change
    let publish = |controller: &LifecycleController| controller.publish();

    while let Ok(command) = rx.recv() {
        match command {
            Command::Load {
                document,
                replace,
                reply,
            } => {
                let result = controller.load_document(document, replace);
                publish(&controller);
                let _ = reply.send(result);
            }
            Command::LoadBytes { bytes, replace, reply } => {
                let result = controller.load_bytes(&bytes, replace);
                publish(&controller);
                let _ = reply.send(result);
            }
            Command::Reconfigure { bytes, reply } => {
                let result = controller.reconfigure_bytes(&bytes);
                publish(&controller);
                let _ = reply.send(result);
            }
            Command::Start { reply } => {
                let result = controller.start();
                publish(&controller);
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                controller.stop();
                publish(&controller);
                let _ = reply.send(Ok(()));
            }
            Command::Clear { reply } => {
                controller.clear();
                publish(&controller);
                let _ = reply.send(Ok(()));
            }
            Command::AddObserver { observer, reply } => {
                let _ = reply.send(Ok(controller.add_observer(observer)));
            }
            Command::RemoveObserver { observer, reply } => {
                let _ = reply.send(Ok(controller.remove_observer(&observer)));
            }
            Command::Shutdown => break,
        }
    }

    controller.clear();
    publish(&controller);
    info!("Control loop stopped");
}
