//! Component trait and construction context

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{ComponentId, ContractError, Measurement, MeasurementValue, Timestamp};
use dispatcher::{EventQueue, PolicyRegistry};

use crate::port::{InputPort, OutputPort, PullConsumer, PullSupplier, PushConsumer, PushSupplier};
use crate::string_port::{StringPull, StringReceiver, StringSink};

/// A node of the dataflow graph
///
/// Components are created by the registry from a subgraph and owned by the
/// network; their ports are wired by name.
pub trait Component: Send + Sync + 'static {
    /// Instance name (the subgraph id)
    fn name(&self) -> &ComponentId;

    /// Registered class name
    fn class(&self) -> &str;

    /// Called when the graph starts, or when added to a started graph
    fn start(&self) {}

    /// Called when the graph stops, or before removal from a started graph
    fn stop(&self) {}

    /// Receiving ports
    fn inputs(&self) -> Vec<Arc<dyn InputPort>>;

    /// Sending ports
    fn outputs(&self) -> Vec<Arc<dyn OutputPort>>;

    fn input(&self, port: &str) -> Option<Arc<dyn InputPort>> {
        self.inputs().into_iter().find(|p| p.name() == port)
    }

    fn output(&self, port: &str) -> Option<Arc<dyn OutputPort>> {
        self.outputs().into_iter().find(|p| p.name() == port)
    }

    /// Upcast for typed lookup
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// String callback access, for sinks delivering to the application
    fn string_sink(self: Arc<Self>) -> Option<Arc<dyn StringSink>> {
        None
    }

    /// String injection access, for sources fed by the application
    fn string_source(self: Arc<Self>) -> Option<Arc<dyn StringReceiver>> {
        None
    }

    /// String pull access
    fn string_pull(self: Arc<Self>) -> Option<Arc<dyn StringPull>> {
        None
    }
}

/// Everything a component needs to build its ports
#[derive(Clone)]
pub struct ComponentContext {
    name: ComponentId,
    queue: Arc<EventQueue>,
    policies: Arc<PolicyRegistry>,
    attributes: BTreeMap<String, String>,
}

impl ComponentContext {
    pub fn new(name: ComponentId, queue: Arc<EventQueue>, policies: Arc<PolicyRegistry>) -> Self {
        Self {
            name,
            queue,
            policies,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach the attributes of the component's subgraph
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Instance name
    pub fn name(&self) -> &ComponentId {
        &self.name
    }

    /// Shared event queue
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Dispatch policy table
    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Attribute of the subgraph
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Build a sending push port
    pub fn push_supplier<T: MeasurementValue>(&self, port: &str) -> Arc<PushSupplier<T>> {
        Arc::new(PushSupplier::new(
            self.name.clone(),
            port,
            Arc::clone(&self.queue),
            self.policies.policy_for::<T>(),
        ))
    }

    /// Build a receiving push port; `handler` runs on the dispatch thread
    pub fn push_consumer<T, F>(&self, port: &str, handler: F) -> Arc<PushConsumer<T>>
    where
        T: MeasurementValue,
        F: Fn(Measurement<T>) + Send + Sync + 'static,
    {
        Arc::new(PushConsumer::new(
            self.name.clone(),
            port,
            Arc::clone(&self.queue),
            &self.policies.policy_for::<T>(),
            Arc::new(handler),
        ))
    }

    /// Build an answering pull port
    pub fn pull_supplier<T, F>(&self, port: &str, handler: F) -> Arc<PullSupplier<T>>
    where
        T: MeasurementValue,
        F: Fn(Timestamp) -> Result<Measurement<T>, ContractError> + Send + Sync + 'static,
    {
        Arc::new(PullSupplier::new(self.name.clone(), port, Arc::new(handler)))
    }

    /// Build a requesting pull port
    pub fn pull_consumer<T: MeasurementValue>(&self, port: &str) -> Arc<PullConsumer<T>> {
        Arc::new(PullConsumer::new(self.name.clone(), port))
    }
}
