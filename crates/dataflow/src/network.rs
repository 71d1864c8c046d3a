//! Dataflow network - live components and their wiring
//!
//! Changes are applied in two phases. [`DataflowNetwork::plan`] creates the
//! new components and resolves every edge without touching the live graph;
//! [`DataflowNetwork::commit`] then swaps them in. A failed plan leaves the
//! network exactly as it was.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use contracts::{ComponentId, ContractError, EdgeSpec, GraphDocument, Subgraph};
use dispatcher::{EventQueue, PolicyRegistry};
use ports::{Component, ComponentContext, ConnectOp};

use crate::registry::ComponentRegistry;

/// Shared construction environment of a network
#[derive(Clone)]
pub struct NetworkEnv {
    pub registry: Arc<ComponentRegistry>,
    pub queue: Arc<EventQueue>,
    pub policies: Arc<PolicyRegistry>,
}

impl NetworkEnv {
    fn context(&self, subgraph: &Subgraph) -> ComponentContext {
        let ctx = ComponentContext::new(
            subgraph.id.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.policies),
        );
        match &subgraph.component {
            Some(spec) => ctx.with_attributes(spec.attributes.clone()),
            None => ctx,
        }
    }
}

struct Node {
    component: Arc<dyn Component>,
    subgraph: Subgraph,
}

/// Prepared change set, applied by [`DataflowNetwork::commit`]
///
/// Dropping an uncommitted update releases the components it created.
pub struct NetworkUpdate {
    created: Vec<(Subgraph, Arc<dyn Component>)>,
    removed: Vec<ComponentId>,
    ops: Vec<ConnectOp>,
}

impl NetworkUpdate {
    fn empty() -> Self {
        Self {
            created: Vec::new(),
            removed: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Components this update creates
    pub fn created_ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.created.iter().map(|(s, _)| &s.id)
    }

    /// Existing components this update removes or replaces
    pub fn removed_ids(&self) -> &[ComponentId] {
        &self.removed
    }

    /// Number of edges this update connects
    pub fn edge_count(&self) -> usize {
        self.ops.len()
    }
}

impl Drop for NetworkUpdate {
    fn drop(&mut self) {
        for (_, component) in self.created.drain(..) {
            retire(component.as_ref());
        }
    }
}

impl fmt::Debug for NetworkUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkUpdate")
            .field("created", &self.created.len())
            .field("removed", &self.removed)
            .field("edges", &self.ops.len())
            .finish()
    }
}

/// Unhook every port of `component`
fn retire(component: &dyn Component) {
    for input in component.inputs() {
        input.detach();
    }
    for output in component.outputs() {
        output.disconnect_all();
    }
}

/// Run component code, reporting a panic as an error
fn guard<R>(id: &ComponentId, operation: &'static str, f: impl FnOnce() -> R) -> Result<R, ContractError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| ContractError::Other(format!("component '{id}' panicked in {operation}")))
}

/// Call a start or stop hook; a panicking component is logged and left in place
fn run_hook(component: &dyn Component, hook: &'static str, f: impl FnOnce(&dyn Component)) {
    if let Err(e) = guard(component.name(), hook, || f(component)) {
        warn!(error = %e, class = component.class(), "Component hook failed");
    }
}

/// The live component graph
pub struct DataflowNetwork {
    env: NetworkEnv,
    nodes: BTreeMap<ComponentId, Node>,
}

impl DataflowNetwork {
    /// Empty network
    pub fn new(env: NetworkEnv) -> Self {
        Self {
            env,
            nodes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Component ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.nodes.keys()
    }

    pub fn component(&self, id: &str) -> Option<&Arc<dyn Component>> {
        self.nodes.get(id).map(|n| &n.component)
    }

    /// Every component by id
    pub fn components(&self) -> BTreeMap<ComponentId, Arc<dyn Component>> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), Arc::clone(&node.component)))
            .collect()
    }

    /// Prepare the changes described by `doc`
    ///
    /// Empty subgraphs remove the component with their id; non-empty ones
    /// create a component, replacing any existing one with the same id.
    #[instrument(name = "network_plan", skip_all, fields(subgraphs = doc.subgraphs.len()))]
    pub fn plan(&self, doc: &GraphDocument) -> Result<NetworkUpdate, ContractError> {
        doc.validate()?;

        let mut update = NetworkUpdate::empty();
        for subgraph in doc.removals() {
            if self.nodes.contains_key(&subgraph.id) {
                update.removed.push(subgraph.id.clone());
            } else {
                debug!(id = %subgraph.id, "Deletion of unknown component ignored");
            }
        }

        for subgraph in doc.additions() {
            let Some(spec) = &subgraph.component else {
                continue;
            };
            if self.nodes.contains_key(&subgraph.id) && !update.removed.contains(&subgraph.id) {
                debug!(id = %subgraph.id, "Replacing existing component");
                update.removed.push(subgraph.id.clone());
            }
            let ctx = self.env.context(subgraph);
            let component = guard(&subgraph.id, "create", || self.env.registry.create(&spec.class, &ctx))??;
            update.created.push((subgraph.clone(), component));
        }

        let gone: HashSet<&ComponentId> = update.removed.iter().collect();
        let created: HashMap<&ComponentId, &Arc<dyn Component>> =
            update.created.iter().map(|(s, c)| (&s.id, c)).collect();
        let lookup = |id: &ComponentId| -> Option<Arc<dyn Component>> {
            match created.get(id) {
                Some(c) => Some(Arc::clone(c)),
                None if gone.contains(id) => None,
                None => self.nodes.get(id).map(|n| Arc::clone(&n.component)),
            }
        };

        let mut ops = Vec::new();
        for (subgraph, component) in &update.created {
            for edge in &subgraph.inputs {
                ops.push(plan_edge(&subgraph.id, component.as_ref(), edge, &lookup)?);
            }
        }

        // Surviving components fed by a replaced one are rewired to the new instance
        for (id, node) in &self.nodes {
            if gone.contains(id) {
                continue;
            }
            for edge in &node.subgraph.inputs {
                if created.contains_key(&edge.source) {
                    ops.push(plan_edge(id, node.component.as_ref(), edge, &lookup)?);
                }
            }
        }

        update.ops = ops;
        Ok(update)
    }

    /// Apply a planned update
    ///
    /// Removed components are stopped first when `started`; created
    /// components are started last.
    #[instrument(name = "network_commit", skip_all)]
    pub fn commit(&mut self, mut update: NetworkUpdate, started: bool) {
        for id in std::mem::take(&mut update.removed) {
            self.remove(&id, started);
        }

        let created = std::mem::take(&mut update.created);
        for op in std::mem::take(&mut update.ops) {
            op();
        }
        for (subgraph, component) in created {
            if started {
                run_hook(component.as_ref(), "start", |c| c.start());
            }
            debug!(id = %subgraph.id, class = component.class(), "Component added");
            self.nodes.insert(
                subgraph.id.clone(),
                Node {
                    component,
                    subgraph,
                },
            );
        }
        info!(components = self.nodes.len(), "Network updated");
    }

    fn remove(&mut self, id: &ComponentId, started: bool) {
        let Some(node) = self.nodes.remove(id) else {
            warn!(id = %id, "Component vanished before removal");
            return;
        };
        if started {
            run_hook(node.component.as_ref(), "stop", |c| c.stop());
        }
        retire(node.component.as_ref());
        for other in self.nodes.values() {
            for output in other.component.outputs() {
                output.detach_owner(id);
            }
            for input in other.component.inputs() {
                input.detach_owner(id);
            }
        }
        debug!(id = %id, "Component removed");
    }

    /// Start every component
    pub fn start_all(&self) {
        for node in self.nodes.values() {
            run_hook(node.component.as_ref(), "start", |c| c.start());
        }
    }

    /// Stop every component
    pub fn stop_all(&self) {
        for node in self.nodes.values() {
            run_hook(node.component.as_ref(), "stop", |c| c.stop());
        }
    }

    /// Drop every component
    pub fn clear(&mut self) {
        for (_, node) in std::mem::take(&mut self.nodes) {
            retire(node.component.as_ref());
        }
    }
}

impl Drop for DataflowNetwork {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for DataflowNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataflowNetwork")
            .field("components", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn plan_edge(
    target_id: &ComponentId,
    target: &dyn Component,
    edge: &EdgeSpec,
    lookup: &impl Fn(&ComponentId) -> Option<Arc<dyn Component>>,
) -> Result<ConnectOp, ContractError> {
    let source = lookup(&edge.source).ok_or_else(|| {
        ContractError::invalid_document(target_id.as_str(), format!("unknown source '{}'", edge.source))
    })?;
    let output = source.output(&edge.source_port).ok_or_else(|| {
        ContractError::not_found(format!("{}.{}", edge.source, edge.source_port), "no such output port")
    })?;
    let input = target
        .input(&edge.port)
        .ok_or_else(|| ContractError::not_found(format!("{}.{}", target_id, edge.port), "no such input port"))?;
    input.plan_connect(output)
}
