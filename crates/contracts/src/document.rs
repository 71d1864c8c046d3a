//! Graph document model
//!
//! A document is a list of subgraphs. Each non-empty subgraph instantiates
//! one component and declares the edges feeding its input ports; an empty
//! subgraph deletes the component carrying its id.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{ComponentId, ContractError};

/// Parsed dataflow document (response or request)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Request documents must be resolved into responses before use
    #[serde(default)]
    pub is_request: bool,

    /// Subgraphs in document order
    #[serde(default)]
    pub subgraphs: Vec<Subgraph>,
}

/// One pattern instance of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Pattern name reported to observers
    pub name: String,

    /// Instance id; also names the component it creates
    pub id: ComponentId,

    /// Component to instantiate, `None` for a deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentSpec>,

    /// Edges ending at this component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<EdgeSpec>,
}

/// Component class and its attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Registered class name, e.g. `ApplicationPushSinkPose`
    pub class: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Edge from `source.source_port` to a port of the owning subgraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Receiving port on the owning component
    pub port: String,

    /// Sending component id
    pub source: ComponentId,

    /// Sending port name
    pub source_port: String,
}

impl Subgraph {
    /// Subgraph instantiating `class` under `id`
    pub fn component(name: impl Into<String>, id: impl Into<ComponentId>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            component: Some(ComponentSpec {
                class: class.into(),
                attributes: BTreeMap::new(),
            }),
            inputs: Vec::new(),
        }
    }

    /// Empty subgraph, deleting component `id`
    pub fn deletion(name: impl Into<String>, id: impl Into<ComponentId>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            component: None,
            inputs: Vec::new(),
        }
    }

    /// Add an input edge
    pub fn with_input(
        mut self,
        port: impl Into<String>,
        source: impl Into<ComponentId>,
        source_port: impl Into<String>,
    ) -> Self {
        self.inputs.push(EdgeSpec {
            port: port.into(),
            source: source.into(),
            source_port: source_port.into(),
        });
        self
    }

    /// Add a component attribute; no-op on deletions
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(spec) = self.component.as_mut() {
            spec.attributes.insert(key.into(), value.into());
        }
        self
    }

    /// Whether this subgraph deletes its component
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.component.is_none()
    }
}

impl GraphDocument {
    /// Response document from subgraphs
    pub fn new(subgraphs: Vec<Subgraph>) -> Self {
        Self {
            is_request: false,
            subgraphs,
        }
    }

    /// Empty subgraphs, in document order
    pub fn removals(&self) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.iter().filter(|s| s.is_empty())
    }

    /// Non-empty subgraphs, in document order
    pub fn additions(&self) -> impl Iterator<Item = &Subgraph> {
        self.subgraphs.iter().filter(|s| !s.is_empty())
    }

    /// Structural checks that do not need the component registry
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut seen = HashSet::new();
        for subgraph in &self.subgraphs {
            if let Err(reason) = subgraph.id.check() {
                return Err(ContractError::invalid_document(&subgraph.name, reason));
            }
            if !seen.insert(subgraph.id.clone()) {
                return Err(ContractError::invalid_document(
                    subgraph.id.as_str(),
                    "duplicate subgraph id",
                ));
            }
            if subgraph.is_empty() && !subgraph.inputs.is_empty() {
                return Err(ContractError::invalid_document(
                    subgraph.id.as_str(),
                    "empty subgraph cannot declare inputs",
                ));
            }
            let mut ports = HashSet::new();
            for edge in &subgraph.inputs {
                if !ports.insert(edge.port.as_str()) {
                    return Err(ContractError::invalid_document(
                        subgraph.id.as_str(),
                        format!("input port '{}' connected twice", edge.port),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Turns raw document bytes into a [`GraphDocument`]
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<GraphDocument, ContractError>;
}

/// Turns a request document into a response document
pub trait PatternResolver: Send + Sync {
    fn resolve(&self, document: GraphDocument) -> Result<GraphDocument, ContractError>;
}

/// Resolver accepting requests as already-resolved responses
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl PatternResolver for PassthroughResolver {
    fn resolve(&self, mut document: GraphDocument) -> Result<GraphDocument, ContractError> {
        document.is_request = false;
        Ok(document)
    }
}
