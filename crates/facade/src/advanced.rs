//! Typed facade over the dataflow and the server connection

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, DataflowObserver, DocumentParser, GraphDocument, Measurement, MeasurementValue,
    PassthroughResolver, PatternResolver, Timestamp,
};
use config_loader::{ConfigLoader, DispatchSection, FacadeConfig, NetworkSection, SerdeDocumentParser};
use dataflow::{
    ComponentRegistry, DataflowHandle, DataflowStatus, LifecycleController, NetworkEnv,
};
use dispatcher::{EventQueue, PolicyRegistry};
use ports::{
    ApplicationPullSink, ApplicationPushSink, ApplicationPushSource, Component, ComponentContext,
    StringPull, StringReceiver, StringSink,
};
use reconfig::{ConnectionState, NetworkController, NetworkOptions};
use tracing::{debug, info};

/// Dispatch policies: built-in defaults with the configured overrides applied
pub fn policy_registry(section: &DispatchSection) -> PolicyRegistry {
    let mut policies = PolicyRegistry::with_defaults();
    for entry in &section.policies {
        let max = entry.max_queue_length.and_then(NonZeroUsize::new);
        policies.set_max_queue_length(entry.kind, max);
    }
    policies
}

/// Connection options from the `[network]` section
pub fn network_options(section: &NetworkSection) -> NetworkOptions {
    NetworkOptions {
        default_port: section.default_port,
        max_frame_length: section.max_frame_length,
        connect_timeout: Duration::from_millis(section.connect_timeout_ms),
        flush_timeout: Duration::from_millis(section.flush_timeout_ms),
    }
}

/// Builder for [`AdvancedFacade`]
pub struct FacadeBuilder {
    config: FacadeConfig,
    registry: ComponentRegistry,
    parser: Arc<dyn DocumentParser>,
    resolver: Arc<dyn PatternResolver>,
}

impl Default for FacadeBuilder {
    fn default() -> Self {
        Self {
            config: FacadeConfig::default(),
            registry: ComponentRegistry::with_builtins(),
            parser: Arc::new(SerdeDocumentParser::new()),
            resolver: Arc::new(PassthroughResolver),
        }
    }
}

impl FacadeBuilder {
    pub fn config(mut self, config: FacadeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a component class next to the built-in endpoints
    pub fn component<F>(mut self, class: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentContext) -> Result<Arc<dyn Component>, ContractError> + Send + Sync + 'static,
    {
        self.registry.register(class, factory);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Resolver for documents flagged as pattern requests
    pub fn resolver(mut self, resolver: Arc<dyn PatternResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Spawn the control loop and create the (unconnected) network controller
    pub fn build(self) -> Result<AdvancedFacade, ContractError> {
        let env = NetworkEnv {
            registry: Arc::new(self.registry),
            queue: Arc::new(EventQueue::new()),
            policies: Arc::new(policy_registry(&self.config.dispatch)),
        };
        debug!(classes = env.registry.len(), "Building facade");
        let controller = LifecycleController::new(env, self.parser, self.resolver);
        let dataflow = DataflowHandle::spawn(controller)?;
        let network = NetworkController::with_options(dataflow.clone(), network_options(&self.config.network));
        info!("Facade ready");
        Ok(AdvancedFacade { dataflow, network })
    }
}

/// Entry point for applications using typed measurements
///
/// Every operation returns a `Result`; nothing here panics on bad input.
pub struct AdvancedFacade {
    dataflow: DataflowHandle,
    network: NetworkController,
}

impl AdvancedFacade {
    /// Facade with the default configuration
    pub fn new() -> Result<Self, ContractError> {
        Self::builder().build()
    }

    pub fn with_config(config: FacadeConfig) -> Result<Self, ContractError> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> FacadeBuilder {
        FacadeBuilder::default()
    }

    /// Current time in nanoseconds, the clock used for measurement timestamps
    pub fn now() -> Timestamp {
        contracts::now()
    }

    /// Underlying dataflow handle
    pub fn dataflow(&self) -> &DataflowHandle {
        &self.dataflow
    }

    /// Underlying server connection
    pub fn network(&self) -> &NetworkController {
        &self.network
    }

    /// Load a dataflow document from a file
    ///
    /// With `replace` the current graph is discarded first; otherwise the
    /// document is applied as an incremental change.
    pub fn load_dataflow(&self, path: impl AsRef<Path>, replace: bool) -> Result<(), ContractError> {
        let bytes = std::fs::read(path.as_ref())?;
        self.dataflow.load_bytes(bytes, replace)
    }

    pub fn load_dataflow_str(&self, document: &str, replace: bool) -> Result<(), ContractError> {
        self.dataflow.load_bytes(document.as_bytes().to_vec(), replace)
    }

    /// Load an already parsed document
    pub fn load_document(&self, document: GraphDocument, replace: bool) -> Result<(), ContractError> {
        self.dataflow.load(document, replace)
    }

    /// Load a document file through the configuration loader's parser
    pub fn load_document_file(&self, path: impl AsRef<Path>, replace: bool) -> Result<(), ContractError> {
        let document = ConfigLoader::load_document_from_path(path.as_ref())?;
        self.dataflow.load(document, replace)
    }

    pub fn clear_dataflow(&self) -> Result<(), ContractError> {
        self.dataflow.clear()
    }

    pub fn start_dataflow(&self) -> Result<(), ContractError> {
        self.dataflow.start()
    }

    pub fn stop_dataflow(&self) -> Result<(), ContractError> {
        self.dataflow.stop()
    }

    pub fn status(&self) -> DataflowStatus {
        self.dataflow.status()
    }

    /// Connect to a reconfiguration server, `host` or `host:port`
    pub fn connect_to_server(&self, address: &str) -> Result<(), ContractError> {
        self.network.connect(address)
    }

    /// Send a document file to the server
    pub fn send_to_server_file(&self, path: impl AsRef<Path>) -> Result<(), ContractError> {
        self.network.send_file(path)
    }

    pub fn send_to_server_str(&self, document: &str) -> Result<(), ContractError> {
        self.network.send_str(document)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.network.state()
    }

    pub fn disconnect(&self) {
        self.network.shutdown();
    }

    /// Returns `false` if the observer was already registered
    pub fn add_observer(&self, observer: Arc<dyn DataflowObserver>) -> Result<bool, ContractError> {
        self.dataflow.add_observer(observer)
    }

    /// Returns `false` if the observer was not registered
    pub fn remove_observer(&self, observer: Arc<dyn DataflowObserver>) -> Result<bool, ContractError> {
        self.dataflow.remove_observer(observer)
    }

    pub fn push_sink<T: MeasurementValue>(&self, name: &str) -> Result<Arc<ApplicationPushSink<T>>, ContractError> {
        self.dataflow.push_sink(name)
    }

    pub fn push_source<T: MeasurementValue>(
        &self,
        name: &str,
    ) -> Result<Arc<ApplicationPushSource<T>>, ContractError> {
        self.dataflow.push_source(name)
    }

    pub fn pull_sink<T: MeasurementValue>(&self, name: &str) -> Result<Arc<ApplicationPullSink<T>>, ContractError> {
        self.dataflow.pull_sink(name)
    }

    pub fn string_sink(&self, name: &str) -> Result<Arc<dyn StringSink>, ContractError> {
        self.dataflow.string_sink(name)
    }

    pub fn string_source(&self, name: &str) -> Result<Arc<dyn StringReceiver>, ContractError> {
        self.dataflow.string_source(name)
    }

    pub fn string_pull(&self, name: &str) -> Result<Arc<dyn StringPull>, ContractError> {
        self.dataflow.string_pull(name)
    }

    /// Install `f` as the callback of push sink `name`
    ///
    /// `f` runs on the dispatch thread; it must not call back into the
    /// lifecycle operations.
    pub fn set_callback<T, F>(&self, name: &str, f: F) -> Result<(), ContractError>
    where
        T: MeasurementValue,
        F: Fn(Measurement<T>) + Send + Sync + 'static,
    {
        self.push_sink::<T>(name)?.set_callback(f);
        Ok(())
    }

    /// Install a string callback on push sink `name`, whatever its kind
    pub fn set_string_callback<F>(&self, name: &str, f: F) -> Result<(), ContractError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.string_sink(name)?.set_string_callback(Arc::new(f));
        Ok(())
    }

    pub fn clear_callback(&self, name: &str) -> Result<(), ContractError> {
        self.string_sink(name)?.clear_callback();
        Ok(())
    }

    /// Close the server connection, then stop and join the control loop
    pub fn shutdown(&self) {
        self.network.shutdown();
        self.dataflow.shutdown();
    }
}

impl Drop for AdvancedFacade {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::PolicyOverride;
    use contracts::{MeasurementKind, Pose};
    use std::io::Write;

    const PIPELINE: &str = r#"{"subgraphs": [
        {"name": "Injector", "id": "src", "component": {"class": "ApplicationPushSourcePose"}},
        {"name": "Viewer", "id": "sink", "component": {"class": "ApplicationPushSinkPose"},
         "inputs": [{"port": "Input", "source": "src", "source_port": "Output"}]}]}"#;

    #[test]
    fn test_policy_overrides_applied() {
        let section = DispatchSection {
            policies: vec![
                PolicyOverride {
                    kind: MeasurementKind::Pose,
                    max_queue_length: Some(4),
                },
                PolicyOverride {
                    kind: MeasurementKind::Image,
                    max_queue_length: None,
                },
            ],
        };
        let policies = policy_registry(&section);
        assert_eq!(policies.policy(MeasurementKind::Pose).max_queue_length(), NonZeroUsize::new(4));
        assert_eq!(policies.policy(MeasurementKind::Image).max_queue_length(), None);
    }

    #[test]
    fn test_default_image_policy_keeps_one() {
        let policies = policy_registry(&DispatchSection::default());
        assert_eq!(policies.policy(MeasurementKind::Image).max_queue_length(), NonZeroUsize::new(1));
        assert_eq!(policies.policy(MeasurementKind::Pose).max_queue_length(), None);
    }

    #[test]
    fn test_typed_round_trip() {
        let facade = AdvancedFacade::new().unwrap();
        facade.load_dataflow_str(PIPELINE, true).unwrap();
        facade.start_dataflow().unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        facade
            .set_callback::<Pose, _>("sink", move |m| {
                let _ = tx.send(m.timestamp());
            })
            .unwrap();
        facade
            .push_source::<Pose>("src")
            .unwrap()
            .send(Measurement::new(7, Pose::identity()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_wrong_type_lookup() {
        let facade = AdvancedFacade::new().unwrap();
        facade.load_dataflow_str(PIPELINE, true).unwrap();
        assert!(matches!(
            facade.push_sink::<f64>("sink"),
            Err(ContractError::TypeMismatch { .. })
        ));
        assert!(matches!(facade.push_sink::<Pose>("nope"), Err(ContractError::NotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(PIPELINE.as_bytes()).unwrap();

        let facade = AdvancedFacade::new().unwrap();
        facade.load_dataflow(file.path(), true).unwrap();
        assert_eq!(facade.status().component_count(), 2);

        facade.clear_dataflow().unwrap();
        facade.load_document_file(file.path(), false).unwrap();
        assert_eq!(facade.status().component_count(), 2);
    }

    #[test]
    fn test_send_without_server() {
        let facade = AdvancedFacade::new().unwrap();
        assert_eq!(facade.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(facade.send_to_server_str("{}"), Err(ContractError::NotConnected)));
    }

    #[test]
    fn test_calls_after_shutdown_fail() {
        let facade = AdvancedFacade::new().unwrap();
        facade.shutdown();
        assert!(matches!(facade.start_dataflow(), Err(ContractError::ControlLoopClosed)));
        facade.shutdown();
    }
}
