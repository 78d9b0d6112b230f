//! Node graph serialization.
//!
//! [`Serializer::serialize_all`] flattens every node reachable from a set of
//! roots into one JSON record per node:
//!
//! ```json
//! [
//!   { "class": "_rootRefs", "ids": ["ImageProcessingPipeline1"] },
//!   { "class": "ImageProcessingPipeline", "id": "ImageProcessingPipeline1",
//!     "pipeline": [ { "class": "_ref", "id": "PointSampler1" } ] },
//!   { "class": "PointSampler", "id": "PointSampler1", "normalizedX": 0.0 }
//! ]
//! ```
//!
//! Record ids are the class name plus a per-class counter, allocated the
//! first time a depth-first walk over property values meets a node. Shared
//! and cyclic references collapse onto one record.
//!
//! [`Serializer::deserialize_all`] reverses this in two passes: construct a
//! default node for every record, then resolve `_ref` objects to the new
//! ids and hand each node its record. Nothing is added to the target graph
//! unless every record resolves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};

use crate::cropper::SimpleCropper;
use crate::detect::SimpleCropDetector;
use crate::expand::SimpleExpander;
use crate::fill::BorderColorFiller;
use crate::node::{AnyNode, NodeClass, NodeGraph, NodeId};
use crate::pipeline::ImageProcessingPipeline;
use crate::sampler::{ManualColor, PointSampler};
use crate::value::{Record, Value};
use crate::viewer::ImageViewer;

/// Class tag of the record listing the roots.
pub const ROOT_REFS: &str = "_rootRefs";

/// Class tag of an embedded node reference.
pub const REF: &str = "_ref";

const CLASS_KEY: &str = "class";
const ID_KEY: &str = "id";
const IDS_KEY: &str = "ids";

/// Constructor for a registered node class.
pub type NodeFactory = fn() -> AnyNode;

/// Errors raised while serializing or deserializing a node graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializerError {
    /// A root or reference points at a node that is not in the graph.
    #[error("node {0} is not part of the graph")]
    UnknownNode(NodeId),

    /// A node's type was never registered.
    #[error("node class {0:?} is not registered")]
    UnregisteredClass(String),

    /// A node produced a value that has no serialized form.
    #[error("unsupported value in {class}: {detail}")]
    UnsupportedValue {
        /// Registered class of the offending node.
        class: String,
        /// What was wrong.
        detail: String,
    },

    /// A record names a class that is not registered.
    #[error("unknown node class {0:?}")]
    UnknownClass(String),

    /// A reference or root names an id no record defines.
    #[error("reference to unknown id {0:?}")]
    DanglingReference(String),

    /// Two records share one id.
    #[error("duplicate record id {0:?}")]
    DuplicateId(String),

    /// A record does not have the expected shape.
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord {
        /// Position in the input array.
        index: usize,
        /// What was wrong.
        reason: &'static str,
    },

    /// A serialized graph had no root to return.
    #[error("serialized graph has no root")]
    MissingRoot,
}

fn construct<T: NodeClass>() -> AnyNode {
    T::default().into()
}

#[derive(Debug, Clone)]
struct ClassEntry {
    name: String,
    declared: &'static str,
    factory: NodeFactory,
}

/// Node class registry and graph codec.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    entries: Vec<ClassEntry>,
}

impl Serializer {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in node class.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut serializer = Self::new();
        serializer.add_class::<ImageProcessingPipeline>();
        serializer.add_class::<PointSampler>();
        serializer.add_class::<ManualColor>();
        serializer.add_class::<SimpleCropDetector>();
        serializer.add_class::<SimpleExpander>();
        serializer.add_class::<BorderColorFiller>();
        serializer.add_class::<ImageViewer>();
        serializer.add_class::<SimpleCropper>();
        serializer
    }

    /// Register `T` under its declared name.
    pub fn add_class<T: NodeClass>(&mut self) {
        self.add_class_named::<T>(T::CLASS_NAME);
    }

    /// Register `T` under `name`. Re-registering a name replaces the
    /// previous class but keeps its position.
    pub fn add_class_named<T: NodeClass>(&mut self, name: &str) {
        let entry = ClassEntry {
            name: name.to_owned(),
            declared: T::CLASS_NAME,
            factory: construct::<T>,
        };
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// The constructor registered under `name`.
    #[must_use]
    pub fn lookup_class(&self, name: &str) -> Option<NodeFactory> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.factory)
    }

    /// The name `node`'s class was registered under. When a class is
    /// registered under several names the latest registration wins.
    #[must_use]
    pub fn class_name_from_instance(&self, node: &AnyNode) -> Option<&str> {
        let declared = node.as_node().class_name();
        self.entries
            .iter()
            .rev()
            .find(|e| e.declared == declared)
            .map(|e| e.name.as_str())
    }

    /// Registered names in registration order.
    pub fn enumerate_classes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Serialize `roots` and every node they reach.
    ///
    /// The first record lists the roots (in order, with duplicates); the
    /// rest are node records in id allocation order.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError`] if a reachable node is missing from
    /// `graph`, has an unregistered class, or serializes a value with no
    /// JSON form.
    pub fn serialize_all(
        &self,
        graph: &NodeGraph,
        roots: &[NodeId],
    ) -> Result<Vec<serde_json::Value>, SerializerError> {
        let mut writer = Writer {
            registry: self,
            graph,
            ids: HashMap::new(),
            counters: HashMap::new(),
            slots: Vec::new(),
        };
        let root_ids = roots
            .iter()
            .map(|&root| writer.add_node(root).map(serde_json::Value::String))
            .collect::<Result<Vec<_>, _>>()?;

        let mut root_refs = Map::new();
        root_refs.insert(CLASS_KEY.to_owned(), ROOT_REFS.into());
        root_refs.insert(IDS_KEY.to_owned(), serde_json::Value::Array(root_ids));

        let mut out = Vec::with_capacity(writer.slots.len() + 1);
        out.push(serde_json::Value::Object(root_refs));
        out.extend(
            writer
                .slots
                .into_iter()
                .flatten()
                .map(serde_json::Value::Object),
        );
        tracing::debug!(records = out.len() - 1, roots = roots.len(), "serialized node graph");
        Ok(out)
    }

    /// Rebuild nodes from records produced by
    /// [`serialize_all`](Self::serialize_all) and add them to `graph`.
    ///
    /// Returns the roots in recorded order (with duplicates) when the
    /// records carry a root list, otherwise every new node in record order.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError`] on an unknown class, a dangling
    /// reference, a duplicate id or a malformed record. `graph` is left
    /// untouched on error.
    pub fn deserialize_all(
        &self,
        graph: &mut NodeGraph,
        records: &[serde_json::Value],
    ) -> Result<Vec<NodeId>, SerializerError> {
        let mut root_names: Option<Vec<String>> = None;
        let mut pending: Vec<(usize, &Map<String, serde_json::Value>)> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let map = record.as_object().ok_or(SerializerError::MalformedRecord {
                index,
                reason: "record is not an object",
            })?;
            let class = map
                .get(CLASS_KEY)
                .and_then(serde_json::Value::as_str)
                .ok_or(SerializerError::MalformedRecord {
                    index,
                    reason: "missing or non-string class",
                })?;
            if class == ROOT_REFS {
                if root_names.is_some() {
                    return Err(SerializerError::MalformedRecord {
                        index,
                        reason: "more than one root list",
                    });
                }
                root_names = Some(parse_root_ids(index, map)?);
            } else {
                pending.push((index, map));
            }
        }

        // Construction: every node exists before any of them is deserialized.
        let mut by_name: HashMap<&str, NodeId> = HashMap::new();
        let mut nodes: Vec<AnyNode> = Vec::with_capacity(pending.len());
        for &(index, map) in &pending {
            let class = map
                .get(CLASS_KEY)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let name = map
                .get(ID_KEY)
                .and_then(serde_json::Value::as_str)
                .ok_or(SerializerError::MalformedRecord {
                    index,
                    reason: "missing or non-string id",
                })?;
            let factory = self
                .lookup_class(class)
                .ok_or_else(|| SerializerError::UnknownClass(class.to_owned()))?;
            let node = factory();
            if by_name.insert(name, node.id()).is_some() {
                return Err(SerializerError::DuplicateId(name.to_owned()));
            }
            nodes.push(node);
        }

        // Resolution: references become ids of the nodes built above.
        let resolved = pending
            .iter()
            .map(|&(index, map)| resolve_record(index, map, &by_name))
            .collect::<Result<Vec<_>, _>>()?;

        let roots = match root_names {
            Some(names) => names
                .iter()
                .map(|name| {
                    by_name
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| SerializerError::DanglingReference(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => nodes.iter().map(AnyNode::id).collect(),
        };

        for (node, record) in nodes.iter_mut().zip(&resolved) {
            node.as_node_mut().deserialize(record);
        }
        tracing::debug!(nodes = nodes.len(), roots = roots.len(), "deserialized node graph");
        for node in nodes {
            graph.insert(node);
        }
        Ok(roots)
    }

    /// Duplicate `id` and everything it references by serializing and
    /// deserializing it. Returns the new node's id.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError`] if the subgraph cannot be serialized or
    /// rebuilt.
    pub fn serialized_clone(
        &self,
        graph: &mut NodeGraph,
        id: NodeId,
    ) -> Result<NodeId, SerializerError> {
        let records = self.serialize_all(graph, &[id])?;
        let roots = self.deserialize_all(graph, &records)?;
        roots.first().copied().ok_or(SerializerError::MissingRoot)
    }

    /// Capture a graph into a persisted pipeline document.
    ///
    /// # Errors
    ///
    /// See [`serialize_all`](Self::serialize_all).
    pub fn capture(
        &self,
        graph: &NodeGraph,
        root: NodeId,
    ) -> Result<PipelineDocument, SerializerError> {
        Ok(PipelineDocument {
            pipeline: self.serialize_all(graph, &[root])?,
        })
    }

    /// Restore a persisted pipeline document into `graph` and return its
    /// first root.
    ///
    /// # Errors
    ///
    /// See [`deserialize_all`](Self::deserialize_all). An empty document is
    /// [`SerializerError::MissingRoot`].
    pub fn restore(
        &self,
        graph: &mut NodeGraph,
        document: &PipelineDocument,
    ) -> Result<NodeId, SerializerError> {
        let roots = self.deserialize_all(graph, &document.pipeline)?;
        roots.first().copied().ok_or(SerializerError::MissingRoot)
    }
}

/// The persisted form of a pipeline: `{ "pipeline": [records...] }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineDocument {
    /// Serialized records, root list first.
    pub pipeline: Vec<serde_json::Value>,
}

struct Writer<'a> {
    registry: &'a Serializer,
    graph: &'a NodeGraph,
    ids: HashMap<NodeId, String>,
    counters: HashMap<String, u32>,
    /// One slot per allocated id, filled once the node's walk finishes.
    slots: Vec<Option<Map<String, serde_json::Value>>>,
}

impl Writer<'_> {
    fn add_node(&mut self, id: NodeId) -> Result<String, SerializerError> {
        if let Some(name) = self.ids.get(&id) {
            return Ok(name.clone());
        }
        let graph = self.graph;
        let node = graph.get(id).ok_or(SerializerError::UnknownNode(id))?;
        let class = self
            .registry
            .class_name_from_instance(node)
            .ok_or_else(|| SerializerError::UnregisteredClass(node.as_node().class_name().to_owned()))?
            .to_owned();

        let count = self.counters.entry(class.clone()).or_insert(0);
        *count += 1;
        let name = format!("{class}{count}");
        self.ids.insert(id, name.clone());
        let slot = self.slots.len();
        self.slots.push(None);

        let mut map = Map::new();
        map.insert(CLASS_KEY.to_owned(), class.clone().into());
        map.insert(ID_KEY.to_owned(), name.clone().into());
        for (key, value) in node.as_node().serialize() {
            if key == CLASS_KEY || key == ID_KEY {
                return Err(SerializerError::UnsupportedValue {
                    class,
                    detail: format!("property name {key:?} is reserved"),
                });
            }
            let json = self.write_value(&class, value)?;
            map.insert(key, json);
        }
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(map);
        }
        Ok(name)
    }

    fn write_value(&mut self, class: &str, value: Value) -> Result<serde_json::Value, SerializerError> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => b.into(),
            Value::Int(i) => i.into(),
            Value::Float(f) => Number::from_f64(f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| SerializerError::UnsupportedValue {
                    class: class.to_owned(),
                    detail: format!("non-finite number {f}"),
                })?,
            Value::String(s) => s.into(),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(|v| self.write_value(class, v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(record) => {
                let mut map = Map::new();
                for (key, v) in record {
                    map.insert(key, self.write_value(class, v)?);
                }
                serde_json::Value::Object(map)
            }
            Value::Node(id) => {
                let name = self.add_node(id)?;
                let mut map = Map::new();
                map.insert(CLASS_KEY.to_owned(), REF.into());
                map.insert(ID_KEY.to_owned(), name.into());
                serde_json::Value::Object(map)
            }
        })
    }
}

fn parse_root_ids(
    index: usize,
    map: &Map<String, serde_json::Value>,
) -> Result<Vec<String>, SerializerError> {
    let malformed = SerializerError::MalformedRecord {
        index,
        reason: "root list ids must be an array of strings",
    };
    let ids = map
        .get(IDS_KEY)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| malformed.clone())?;
    ids.iter()
        .map(|id| id.as_str().map(str::to_owned).ok_or_else(|| malformed.clone()))
        .collect()
}

fn resolve_record(
    index: usize,
    map: &Map<String, serde_json::Value>,
    by_name: &HashMap<&str, NodeId>,
) -> Result<Record, SerializerError> {
    map.iter()
        .filter(|(key, _)| *key != CLASS_KEY && *key != ID_KEY)
        .map(|(key, value)| Ok::<_, SerializerError>((key.clone(), resolve_value(index, value, by_name)?)))
        .collect()
}

fn resolve_value(
    index: usize,
    value: &serde_json::Value,
    by_name: &HashMap<&str, NodeId>,
) -> Result<Value, SerializerError> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(index, v, by_name))
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            if map.get(CLASS_KEY).and_then(serde_json::Value::as_str) == Some(REF) {
                let name = map
                    .get(ID_KEY)
                    .and_then(serde_json::Value::as_str)
                    .ok_or(SerializerError::MalformedRecord {
                        index,
                        reason: "reference without a string id",
                    })?;
                let id = by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| SerializerError::DanglingReference(name.to_owned()))?;
                Value::Node(id)
            } else {
                Value::Object(
                    map.iter()
                        .map(|(k, v)| Ok::<_, SerializerError>((k.clone(), resolve_value(index, v, by_name)?)))
                        .collect::<Result<Record, SerializerError>>()?,
                )
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtins_enumerate_in_registration_order() {
        let serializer = Serializer::with_builtins();
        let names: Vec<_> = serializer.enumerate_classes().collect();
        assert_eq!(
            names,
            [
                "ImageProcessingPipeline",
                "PointSampler",
                "ManualColor",
                "SimpleCropDetector",
                "SimpleExpander",
                "BorderColorFiller",
                "ImageViewer",
                "SimpleCropper",
            ]
        );
    }

    #[test]
    fn renamed_class_is_used_for_instances() {
        let mut serializer = Serializer::new();
        serializer.add_class_named::<BorderColorFiller>("Filler");
        let node = AnyNode::from(BorderColorFiller::default());
        assert_eq!(serializer.class_name_from_instance(&node), Some("Filler"));
        assert!(serializer.lookup_class("Filler").is_some());
        assert!(serializer.lookup_class("BorderColorFiller").is_none());
    }

    #[test]
    fn ids_count_per_class_in_walk_order() {
        let serializer = Serializer::with_builtins();
        let mut graph = NodeGraph::new();
        let a = graph.insert(BorderColorFiller::default());
        let b = graph.insert(ImageViewer::default());
        let c = graph.insert(BorderColorFiller::default());
        let pipeline = graph.insert(ImageProcessingPipeline::new(vec![a, b, c]));

        let records = serializer.serialize_all(&graph, &[pipeline]).unwrap();
        let ids: Vec<_> = records
            .iter()
            .map(|r| r.get("id").and_then(serde_json::Value::as_str))
            .collect();
        assert_eq!(
            ids,
            [
                None,
                Some("ImageProcessingPipeline1"),
                Some("BorderColorFiller1"),
                Some("ImageViewer1"),
                Some("BorderColorFiller2"),
            ]
        );
        assert_eq!(
            records[0],
            json!({ "class": "_rootRefs", "ids": ["ImageProcessingPipeline1"] })
        );
        assert_eq!(
            records[1],
            json!({
                "class": "ImageProcessingPipeline",
                "id": "ImageProcessingPipeline1",
                "pipeline": [
                    { "class": "_ref", "id": "BorderColorFiller1" },
                    { "class": "_ref", "id": "ImageViewer1" },
                    { "class": "_ref", "id": "BorderColorFiller2" },
                ],
            })
        );
    }

    #[test]
    fn unregistered_class_fails_to_serialize() {
        let serializer = Serializer::new();
        let mut graph = NodeGraph::new();
        let id = graph.insert(BorderColorFiller::default());
        assert_eq!(
            serializer.serialize_all(&graph, &[id]),
            Err(SerializerError::UnregisteredClass("BorderColorFiller".to_owned()))
        );
    }

    #[test]
    fn missing_reference_target_fails_to_serialize() {
        let serializer = Serializer::with_builtins();
        let mut graph = NodeGraph::new();
        let ghost = NodeId::next();
        let pipeline = graph.insert(ImageProcessingPipeline::new(vec![ghost]));
        assert_eq!(
            serializer.serialize_all(&graph, &[pipeline]),
            Err(SerializerError::UnknownNode(ghost))
        );
    }

    #[test]
    fn records_without_root_list_return_all_nodes() {
        let serializer = Serializer::with_builtins();
        let mut graph = NodeGraph::new();
        let roots = serializer
            .deserialize_all(
                &mut graph,
                &[
                    json!({ "class": "BorderColorFiller", "id": "BorderColorFiller1" }),
                    json!({ "class": "ImageViewer", "id": "ImageViewer1" }),
                ],
            )
            .unwrap();
        assert_eq!(roots.len(), 2);
        assert!(graph.get(roots[0]).unwrap().as_viewer().is_none());
        assert!(graph.get(roots[1]).unwrap().as_viewer().is_some());
    }

    #[test]
    fn malformed_records_are_rejected() {
        let serializer = Serializer::with_builtins();
        let mut graph = NodeGraph::new();
        let cases = [
            (json!([1]), "record is not an object"),
            (json!({ "id": "x" }), "missing or non-string class"),
            (json!({ "class": "ImageViewer" }), "missing or non-string id"),
            (json!({ "class": "_rootRefs", "ids": [1] }), "root list ids must be an array of strings"),
        ];
        for (record, reason) in cases {
            assert_eq!(
                serializer.deserialize_all(&mut graph, &[record]),
                Err(SerializerError::MalformedRecord { index: 0, reason })
            );
        }
        assert!(graph.is_empty());
    }
}
