// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph persistence.
//!
//! Every entity writes itself into a key-value [`Document`]; a
//! [`GraphDocument`] collects those documents and is stored as RON.
//! Loading happens in two phases: first every entity is allocated under
//! its saved id, then cross references are wired. References to ids that
//! are not part of the batch are logged and dropped.

use crate::graph::Graph;
use crate::link::{Link, LinkId};
use crate::node::{Node, NodeBehavior, NodeId};
use crate::pin::{Pin, PinDirection, PinId, PinSpec};
use crate::property::{Property, PropertyId};
use crate::registry::Registry;
use crate::value::{PinValue, ValueError};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Current graph document format version
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Highest id a document may use. Ids above it are left for allocation
/// after load.
pub const MAX_DOCUMENT_ID: u64 = u64::MAX / 2;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Text is not a valid graph document
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Document could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Required key absent from an entity document
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// Field holds a value of the wrong shape
    #[error("Invalid field '{key}': {source}")]
    Field {
        /// Field key
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Node type not present in the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Value kind not present in the registry
    #[error("Unknown value kind: {tag}{size}")]
    UnknownValueKind {
        /// Type tag
        tag: String,
        /// Component count
        size: usize,
    },

    /// Two entities share an id
    #[error("Duplicate id: {0}")]
    DuplicateId(u64),

    /// An entity id or `next_id` lies outside the loadable id range
    #[error("Id {id} is out of range (max {max})")]
    IdOutOfRange {
        /// Offending id
        id: u64,
        /// Highest accepted id
        max: u64,
    },

    /// Node state could not be restored
    #[error("Invalid state for {node}: {source}")]
    State {
        /// Node whose state failed to load
        node: NodeId,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Document was written by a newer version
    #[error("Document version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Highest supported version
        supported: u32,
    },

    /// Stored value does not fit its kind
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Key-value record of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(IndexMap<String, serde_json::Value>);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under `key`
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), DocumentError> {
        let value = serde_json::to_value(value).map_err(|source| DocumentError::Field {
            key: key.to_string(),
            source,
        })?;
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    /// Store a raw value under `key`
    pub fn set_raw(&mut self, key: &str, value: serde_json::Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Read a required field
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, DocumentError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| DocumentError::MissingField(key.to_string()))?;
        T::deserialize(value).map_err(|source| DocumentError::Field {
            key: key.to_string(),
            source,
        })
    }

    /// Read an optional field; absent and null both give `None`
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DocumentError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(_) => self.get(key).map(Some),
        }
    }

    /// Raw value stored under `key`
    pub fn raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.0.shift_remove(key)
    }
}

/// Saved form of a whole graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDocument {
    /// Format version
    pub version: u32,
    /// Graph name
    pub name: String,
    /// Id allocator position at save time
    pub next_id: u64,
    /// Node records
    pub nodes: Vec<Document>,
    /// Pin records
    pub pins: Vec<Document>,
    /// Link records
    pub links: Vec<Document>,
    /// Property records
    pub properties: Vec<Document>,
}

impl GraphDocument {
    /// Parse a document from RON text
    pub fn from_ron(s: &str) -> Result<Self, DocumentError> {
        let document: GraphDocument = ron::from_str(s)?;
        if document.version > DOCUMENT_FORMAT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: document.version,
                supported: DOCUMENT_FORMAT_VERSION,
            });
        }
        Ok(document)
    }

    /// Serialize to RON text
    pub fn to_ron(&self) -> Result<String, DocumentError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load a document from a file
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save the document to a file
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

fn write_value(doc: &mut Document, value: &dyn PinValue) -> Result<(), DocumentError> {
    let value_type = value.value_type();
    doc.set("type", value_type.tag)?;
    doc.set("size", &value_type.size)?;
    let json = value.to_json()?;
    if !json.is_null() {
        doc.set_raw("value", json);
    }
    Ok(())
}

fn read_value(doc: &Document, registry: &Registry) -> Result<Box<dyn PinValue>, DocumentError> {
    let tag: String = doc.get("type")?;
    let size: usize = doc.get("size")?;
    let mut value = registry
        .create_value(&tag, size)
        .ok_or(DocumentError::UnknownValueKind { tag, size })?;
    if let Some(saved) = doc.raw("value") {
        value.load_json(saved)?;
    }
    Ok(value)
}

impl Node {
    /// Write this node to a document
    pub fn write_to_document(&self) -> Result<Document, DocumentError> {
        let mut doc = Document::new();
        doc.set("id", &self.id.0)?;
        doc.set("type", &self.node_type)?;
        doc.set("name", &self.name)?;
        doc.set("inputs", &self.inputs.iter().map(|p| p.0).collect::<Vec<_>>())?;
        doc.set("outputs", &self.outputs.iter().map(|p| p.0).collect::<Vec<_>>())?;
        if let Some(state) = self.behavior().map(NodeBehavior::save_state) {
            if !state.is_null() {
                doc.set_raw("state", state);
            }
        }
        Ok(doc)
    }

    /// Allocate a node from a document. Pin lists are returned unresolved.
    pub(crate) fn read_from_document(
        doc: &Document,
        registry: &Registry,
    ) -> Result<(Node, Vec<u64>, Vec<u64>), DocumentError> {
        let id = NodeId(doc.get("id")?);
        let node_type: String = doc.get("type")?;
        let mut behavior = registry
            .create_behavior(&node_type)
            .ok_or_else(|| DocumentError::UnknownNodeType(node_type.clone()))?;
        if let Some(state) = doc.raw("state") {
            behavior
                .load_state(state)
                .map_err(|source| DocumentError::State { node: id, source })?;
        }
        let name = doc.get_opt::<String>("name")?.unwrap_or(node_type);
        let inputs = doc.get_opt("inputs")?.unwrap_or_default();
        let outputs = doc.get_opt("outputs")?.unwrap_or_default();
        Ok((Node::new(id, name, behavior), inputs, outputs))
    }
}

impl Pin {
    /// Write this pin to a document
    pub fn write_to_document(&self) -> Result<Document, DocumentError> {
        let mut doc = Document::new();
        doc.set("id", &self.id.0)?;
        doc.set("name", &self.name)?;
        doc.set("direction", &self.direction)?;
        doc.set("node", &self.node.0)?;
        write_value(&mut doc, &*self.value)?;
        doc.set("links", &self.links.iter().map(|l| l.0).collect::<Vec<_>>())?;
        Ok(doc)
    }

    /// Allocate a pin from a document. Link ids are returned unresolved.
    pub(crate) fn read_from_document(
        doc: &Document,
        registry: &Registry,
    ) -> Result<(Pin, Vec<u64>), DocumentError> {
        let id = PinId(doc.get("id")?);
        let node = NodeId(doc.get("node")?);
        let spec = PinSpec {
            name: doc.get("name")?,
            direction: doc.get("direction")?,
            value: read_value(doc, registry)?,
        };
        let links = doc.get_opt("links")?.unwrap_or_default();
        Ok((Pin::new(id, node, spec), links))
    }
}

impl Link {
    /// Write this link to a document
    pub fn write_to_document(&self) -> Result<Document, DocumentError> {
        let mut doc = Document::new();
        doc.set("id", &self.id.0)?;
        doc.set("start", &self.start.0)?;
        doc.set("end", &self.end.0)?;
        Ok(doc)
    }

    /// Read a link from a document
    pub fn read_from_document(doc: &Document) -> Result<Link, DocumentError> {
        Ok(Link::new(
            LinkId(doc.get("id")?),
            PinId(doc.get("start")?),
            PinId(doc.get("end")?),
        ))
    }
}

impl Property {
    /// Write this property to a document
    pub fn write_to_document(&self) -> Result<Document, DocumentError> {
        let mut doc = Document::new();
        doc.set("id", &self.id.0)?;
        doc.set("name", &self.name)?;
        write_value(&mut doc, &*self.value)?;
        if let Some(parent) = self.parent {
            doc.set("parent", &parent.0)?;
        }
        Ok(doc)
    }

    /// Allocate a property from a document. The parent is returned
    /// unresolved.
    pub(crate) fn read_from_document(
        doc: &Document,
        registry: &Registry,
    ) -> Result<(Property, Option<PropertyId>), DocumentError> {
        let id = PropertyId(doc.get("id")?);
        let name = doc.get("name")?;
        let value = read_value(doc, registry)?;
        let parent = doc.get_opt::<u64>("parent")?.map(PropertyId);
        Ok((Property::new(id, name, value, None), parent))
    }
}

impl Graph {
    /// Save the whole graph
    pub fn to_document(&self) -> Result<GraphDocument, DocumentError> {
        Ok(GraphDocument {
            version: DOCUMENT_FORMAT_VERSION,
            name: self.name.clone(),
            next_id: self.next_id,
            nodes: self
                .nodes
                .values()
                .map(Node::write_to_document)
                .collect::<Result<_, _>>()?,
            pins: self
                .pins
                .values()
                .map(Pin::write_to_document)
                .collect::<Result<_, _>>()?,
            links: self
                .links
                .values()
                .map(Link::write_to_document)
                .collect::<Result<_, _>>()?,
            properties: self
                .properties
                .values()
                .map(Property::write_to_document)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Rebuild a graph from a document.
    ///
    /// Unknown node types or value kinds, duplicate ids and newer format
    /// versions are errors. Dangling references are dropped with a warning.
    pub fn from_document(registry: Arc<Registry>, document: &GraphDocument) -> Result<Graph, DocumentError> {
        if document.version > DOCUMENT_FORMAT_VERSION {
            return Err(DocumentError::UnsupportedVersion {
                found: document.version,
                supported: DOCUMENT_FORMAT_VERSION,
            });
        }

        if document.next_id > MAX_DOCUMENT_ID {
            return Err(DocumentError::IdOutOfRange {
                id: document.next_id,
                max: MAX_DOCUMENT_ID,
            });
        }

        let mut graph = Graph::new(document.name.clone(), Arc::clone(&registry));
        let mut seen = HashSet::new();
        let mut claim = |id: u64| {
            if id > MAX_DOCUMENT_ID {
                Err(DocumentError::IdOutOfRange {
                    id,
                    max: MAX_DOCUMENT_ID,
                })
            } else if seen.insert(id) {
                Ok(())
            } else {
                Err(DocumentError::DuplicateId(id))
            }
        };

        // Phase 1: allocate everything under its saved id
        let mut parents = Vec::new();
        for doc in &document.properties {
            let (property, parent) = Property::read_from_document(doc, &registry)?;
            claim(property.id.0)?;
            parents.push((property.id, parent));
            graph.properties.insert(property.id, property);
        }

        let mut pin_lists = Vec::new();
        for doc in &document.nodes {
            let (node, inputs, outputs) = Node::read_from_document(doc, &registry)?;
            claim(node.id.0)?;
            pin_lists.push((node.id, inputs, outputs));
            graph.nodes.insert(node.id, node);
        }

        let mut link_lists = Vec::new();
        for doc in &document.pins {
            let (pin, links) = Pin::read_from_document(doc, &registry)?;
            claim(pin.id.0)?;
            link_lists.push((pin.id, links));
            graph.pins.insert(pin.id, pin);
        }

        let mut links = Vec::new();
        for doc in &document.links {
            let link = Link::read_from_document(doc)?;
            claim(link.id.0)?;
            links.push(link);
        }

        // Phase 2: wire references
        graph.wire_properties(parents);
        graph.wire_pins(pin_lists);
        graph.wire_links(links, link_lists);
        graph.wire_bindings();

        let highest = seen.iter().copied().max().unwrap_or(0);
        let after_highest = highest.checked_add(1).ok_or(DocumentError::IdOutOfRange {
            id: highest,
            max: MAX_DOCUMENT_ID,
        })?;
        graph.next_id = document.next_id.max(after_highest);
        debug!(
            graph = %graph.name,
            nodes = graph.node_count(),
            pins = graph.pin_count(),
            links = graph.link_count(),
            properties = graph.property_count(),
            "Loaded graph"
        );
        Ok(graph)
    }

    fn wire_properties(&mut self, parents: Vec<(PropertyId, Option<PropertyId>)>) {
        for (id, parent) in parents {
            let Some(parent) = parent else {
                continue;
            };
            if !self.properties.contains_key(&parent) {
                warn!(property = %id, parent = %parent, "Dropping unresolved property parent");
                continue;
            }
            if self.is_property_ancestor(id, parent) {
                warn!(property = %id, parent = %parent, "Dropping property parent that closes a cycle");
                continue;
            }
            if let Some(property) = self.properties.get_mut(&id) {
                property.parent = Some(parent);
            }
        }
    }

    /// Whether `ancestor` is `property` itself or on the parent chain above
    /// `property`. Only wired parents are followed, so the chain is acyclic.
    fn is_property_ancestor(&self, ancestor: PropertyId, property: PropertyId) -> bool {
        let mut current = Some(property);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.properties.get(&id).and_then(|p| p.parent);
        }
        false
    }

    fn wire_pins(&mut self, pin_lists: Vec<(NodeId, Vec<u64>, Vec<u64>)>) {
        for (node_id, inputs, outputs) in pin_lists {
            let inputs = self.resolve_pins(node_id, PinDirection::Input, inputs);
            let outputs = self.resolve_pins(node_id, PinDirection::Output, outputs);
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.inputs = inputs;
                node.outputs = outputs;
            }
        }

        let listed: HashSet<PinId> = self.nodes.values().flat_map(Node::pins).collect();
        let orphans: Vec<PinId> = self
            .pins
            .keys()
            .copied()
            .filter(|id| !listed.contains(id))
            .collect();
        for pin in orphans {
            warn!(pin = %pin, "Dropping pin not owned by any loaded node");
            self.pins.shift_remove(&pin);
        }
    }

    fn resolve_pins(&self, node_id: NodeId, direction: PinDirection, saved: Vec<u64>) -> Vec<PinId> {
        saved
            .into_iter()
            .map(PinId)
            .filter(|id| {
                let owned = self
                    .pins
                    .get(id)
                    .is_some_and(|p| p.node == node_id && p.direction == direction);
                if !owned {
                    warn!(node = %node_id, pin = %id, "Dropping unresolved pin reference");
                }
                owned
            })
            .collect()
    }

    fn wire_links(&mut self, links: Vec<Link>, link_lists: Vec<(PinId, Vec<u64>)>) {
        for link in links {
            let compatible = match (self.pins.get(&link.start), self.pins.get(&link.end)) {
                (Some(start), Some(end)) => start.can_connect_to(end),
                _ => {
                    warn!(link = %link.id, "Dropping link with unresolved endpoint");
                    continue;
                }
            };
            if !compatible {
                warn!(link = %link.id, "Dropping link between incompatible pins");
                continue;
            }
            let occupied = link
                .endpoints()
                .iter()
                .filter_map(|id| self.pins.get(id))
                .any(|p| p.direction == PinDirection::Input && p.is_connected());
            if occupied {
                warn!(link = %link.id, "Dropping second link into an input pin");
                continue;
            }

            for pin in link.endpoints() {
                if let Some(pin) = self.pins.get_mut(&pin) {
                    pin.connect(link.id);
                }
            }
            self.links.insert(link.id, link);
        }

        for (pin, saved) in link_lists {
            for link in saved.into_iter().map(LinkId) {
                if !self.links.get(&link).is_some_and(|l| l.involves(pin)) {
                    warn!(pin = %pin, link = %link, "Dropping unresolved link reference");
                }
            }
        }
    }

    fn wire_bindings(&mut self) {
        for node in self.nodes.values_mut() {
            let node_id = node.id;
            let Some(behavior) = node.behavior_mut() else {
                continue;
            };
            let Some(property) = behavior.bound_property() else {
                continue;
            };
            if !self.properties.contains_key(&property) {
                warn!(node = %node_id, property = %property, "Unbinding variable from missing property");
                behavior.on_property_deleted(property);
            }
        }
    }
}
