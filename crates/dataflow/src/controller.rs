//! Lifecycle controller - owns the graph, the queue and the dispatch thread
//!
//! The controller is single-threaded by construction: it is moved into the
//! control loop of a [`DataflowHandle`](crate::DataflowHandle) and every
//! mutation runs there.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use contracts::{ComponentId, ContractError, DataflowObserver, DocumentParser, GraphDocument, PatternResolver};
use dispatcher::Dispatcher;
use ports::Component;

use crate::network::{DataflowNetwork, NetworkEnv};
use crate::observer::ObserverBus;

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No graph loaded
    NoGraph,
    /// Graph loaded, dispatch halted
    Stopped,
    /// Graph loaded and dispatching
    Started,
}

/// Snapshot published after every control-loop command
#[derive(Clone)]
pub struct DataflowStatus {
    /// Lifecycle state of the graph
    pub state: LifecycleState,

    /// Start requested; a graph loaded while this holds starts immediately
    pub started: bool,

    /// Incremented on every graph change
    pub generation: u64,

    components: Arc<BTreeMap<ComponentId, Arc<dyn Component>>>,
}

impl DataflowStatus {
    fn empty() -> Self {
        Self {
            state: LifecycleState::NoGraph,
            started: false,
            generation: 0,
            components: Arc::new(BTreeMap::new()),
        }
    }

    /// Component by instance name
    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).cloned()
    }

    /// Instance names and classes, sorted by name
    pub fn components(&self) -> impl Iterator<Item = (&ComponentId, &str)> {
        self.components.iter().map(|(id, c)| (id, c.class()))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

impl Default for DataflowStatus {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DataflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataflowStatus")
            .field("state", &self.state)
            .field("started", &self.started)
            .field("generation", &self.generation)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Owner of the dataflow graph and its lifecycle
pub struct LifecycleController {
    env: NetworkEnv,
    network: Option<DataflowNetwork>,
    dispatcher: Dispatcher,
    observers: ObserverBus,
    parser: Arc<dyn DocumentParser>,
    resolver: Arc<dyn PatternResolver>,
    started: bool,
    generation: u64,
    published: watch::Sender<DataflowStatus>,
}

impl LifecycleController {
    pub fn new(env: NetworkEnv, parser: Arc<dyn DocumentParser>, resolver: Arc<dyn PatternResolver>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&env.queue));
        Self {
            env,
            network: None,
            dispatcher,
            observers: ObserverBus::new(),
            parser,
            resolver,
            started: false,
            generation: 0,
            published: watch::channel(DataflowStatus::empty()).0,
        }
    }

    pub fn env(&self) -> &NetworkEnv {
        &self.env
    }

    pub fn state(&self) -> LifecycleState {
        match (&self.network, self.started) {
            (None, _) => LifecycleState::NoGraph,
            (Some(_), false) => LifecycleState::Stopped,
            (Some(_), true) => LifecycleState::Started,
        }
    }

    /// Whether start was requested and not stopped since
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn has_graph(&self) -> bool {
        self.network.is_some()
    }

    /// Whether the dispatch thread is alive
    pub fn is_dispatching(&self) -> bool {
        self.dispatcher.is_running()
    }

    pub fn component(&self, name: &str) -> Option<&Arc<dyn Component>> {
        self.network.as_ref().and_then(|n| n.component(name))
    }

    pub fn status(&self) -> DataflowStatus {
        DataflowStatus {
            state: self.state(),
            started: self.started,
            generation: self.generation,
            components: Arc::new(self.network.as_ref().map(DataflowNetwork::components).unwrap_or_default()),
        }
    }

    /// Receiver of the snapshots sent by [`Self::publish`]
    pub fn subscribe(&self) -> watch::Receiver<DataflowStatus> {
        self.published.subscribe()
    }

    /// Send the current snapshot to every subscriber
    pub fn publish(&self) {
        self.published.send_replace(self.status());
    }

    pub fn add_observer(&mut self, observer: Arc<dyn DataflowObserver>) -> bool {
        self.observers.register(observer)
    }

    pub fn remove_observer(&mut self, observer: &Arc<dyn DataflowObserver>) -> bool {
        self.observers.unregister(observer)
    }

    /// Parse `bytes` and load the result
    pub fn load_bytes(&mut self, bytes: &[u8], replace: bool) -> Result<(), ContractError> {
        let doc = self.parser.parse(bytes)?;
        self.load_document(doc, replace)
    }

    /// Apply a document
    ///
    /// With `replace`, or when no graph exists, a new graph is built and
    /// swapped in; otherwise the document is applied to the current graph.
    /// Deletion notifications go out before the change, addition
    /// notifications after it and after the new status is published, so an
    /// observer can look up the component it is told about. A failure leaves
    /// the graph untouched and notifies nobody.
    #[instrument(name = "lifecycle_load", skip(self, doc), fields(subgraphs = doc.subgraphs.len()))]
    pub fn load_document(&mut self, doc: GraphDocument, replace: bool) -> Result<(), ContractError> {
        let result = self.apply(doc, replace);
        observability::record_lifecycle("load", result.is_ok());
        if let Err(e) = &result {
            warn!(error = %e, "Dataflow load failed, graph unchanged");
        }
        result
    }

    fn apply(&mut self, doc: GraphDocument, replace: bool) -> Result<(), ContractError> {
        let doc = if doc.is_request {
            debug!("Resolving request document");
            self.resolver.resolve(doc)?
        } else {
            doc
        };

        let (fresh, update) = match &self.network {
            Some(network) if !replace => (None, network.plan(&doc)?),
            _ => {
                let fresh = DataflowNetwork::new(self.env.clone());
                let update = fresh.plan(&doc)?;
                (Some(fresh), update)
            }
        };

        for subgraph in doc.removals() {
            self.observers.notify_removed(&subgraph.name, &subgraph.id);
        }

        match fresh {
            Some(mut fresh) => {
                if self.started && self.network.is_some() {
                    self.halt();
                }
                self.network = None;
                fresh.commit(update, false);
                self.network = Some(fresh);
                if self.started {
                    self.resume()?;
                }
            }
            None => {
                if let Some(network) = self.network.as_mut() {
                    network.commit(update, self.started);
                }
            }
        }
        self.generation += 1;
        self.publish();

        for subgraph in doc.additions() {
            self.observers.notify_added(&subgraph.name, &subgraph.id, subgraph);
        }
        info!(replace, generation = self.generation, "Dataflow loaded");
        Ok(())
    }

    /// Start dispatching
    ///
    /// Without a graph only the request is recorded; the next loaded graph
    /// starts right away.
    #[instrument(name = "lifecycle_start", skip(self))]
    pub fn start(&mut self) -> Result<(), ContractError> {
        if self.started && self.dispatcher.is_running() {
            debug!("Dataflow already started");
            return Ok(());
        }
        if self.network.is_some() {
            let result = self.resume();
            observability::record_lifecycle("start", result.is_ok());
            result?;
        }
        self.started = true;
        info!(has_graph = self.network.is_some(), "Dataflow started");
        Ok(())
    }

    /// Stop dispatching and discard pending events
    #[instrument(name = "lifecycle_stop", skip(self))]
    pub fn stop(&mut self) {
        if self.started && self.network.is_some() {
            self.halt();
            observability::record_lifecycle("stop", true);
        }
        self.started = false;
        info!("Dataflow stopped");
    }

    /// Stop and drop the graph
    #[instrument(name = "lifecycle_clear", skip(self))]
    pub fn clear(&mut self) {
        if self.started {
            self.stop();
        }
        if let Some(mut network) = self.network.take() {
            network.clear();
            self.generation += 1;
            observability::record_lifecycle("clear", true);
            info!("Dataflow cleared");
        }
    }

    /// Apply an incremental document, halting dispatch around it
    ///
    /// The started flag is kept throughout, so published snapshots never show
    /// a running graph as stopped. Dispatch resumes even when the load fails.
    #[instrument(name = "lifecycle_reconfigure", skip(self, doc))]
    pub fn reconfigure(&mut self, doc: GraphDocument) -> Result<(), ContractError> {
        let began = Instant::now();
        let halted = self.started && self.network.is_some();
        if halted {
            self.halt();
        }
        let loaded = self.load_document(doc, false);
        let restarted = if halted { self.resume() } else { Ok(()) };

        let result = loaded.and(restarted);
        observability::record_reconfiguration(result.is_ok(), began.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Parse `bytes` and reconfigure with the result
    pub fn reconfigure_bytes(&mut self, bytes: &Bytes) -> Result<(), ContractError> {
        let began = Instant::now();
        match self.parser.parse(bytes) {
            Ok(doc) => self.reconfigure(doc),
            Err(e) => {
                observability::record_reconfiguration(false, began.elapsed().as_secs_f64() * 1000.0);
                Err(e)
            }
        }
    }

    fn halt(&mut self) {
        self.dispatcher.stop();
        if let Some(network) = &self.network {
            network.stop_all();
        }
        let discarded = self.env.queue.clear();
        debug!(discarded, "Dispatch halted");
    }

    fn resume(&mut self) -> Result<(), ContractError> {
        let discarded = self.env.queue.clear();
        if let Some(network) = &self.network {
            network.start_all();
        }
        self.dispatcher.start()?;
        debug!(discarded, "Dispatch resumed");
        Ok(())
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.clear();
    }
}
