//! Integration test: node graphs survive a serialize/deserialize round trip.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use imagerocket_pipeline::{
    AnyNode, Node, NodeClass, NodeGraph, NodeId, PipelineConfig, PipelineDocument, PipelineError,
    PixelBuffer, Record, Serializer, SerializerError, Value, build_default_pipeline,
};
use serde_json::json;

/// A node that stores one arbitrary value, used to build reference shapes
/// the built-in nodes cannot express.
#[derive(Debug)]
struct RefHolder {
    id: NodeId,
    value: Value,
}

impl Default for RefHolder {
    fn default() -> Self {
        Self {
            id: NodeId::next(),
            value: Value::Null,
        }
    }
}

impl Node for RefHolder {
    fn id(&self) -> NodeId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&self) -> Record {
        Record::new().with("value", self.value.clone())
    }

    fn deserialize(&mut self, record: &Record) {
        self.value = record.get("value").cloned().unwrap_or_default();
    }

    fn process_image(
        &self,
        _graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        Ok(buffer)
    }
}

impl NodeClass for RefHolder {
    const CLASS_NAME: &'static str = "RefHolder";
}

impl From<RefHolder> for AnyNode {
    fn from(node: RefHolder) -> Self {
        Self::plugin(node)
    }
}

fn serializer() -> Serializer {
    let mut serializer = Serializer::with_builtins();
    serializer.add_class::<RefHolder>();
    serializer
}

fn holder(graph: &mut NodeGraph, value: Value) -> NodeId {
    graph.insert(RefHolder {
        id: NodeId::next(),
        value,
    })
}

fn set_value(graph: &mut NodeGraph, id: NodeId, value: Value) {
    let node = graph.get_mut(id).unwrap().as_node_mut();
    node.deserialize(&Record::new().with("value", value));
}

fn value_of(graph: &NodeGraph, id: NodeId) -> Value {
    graph
        .get(id)
        .unwrap()
        .as_node()
        .serialize()
        .get("value")
        .cloned()
        .unwrap()
}

/// `a -> [b, c]`, `b -> { next: c }`, `c -> a`.
fn shared_and_cyclic(graph: &mut NodeGraph) -> (NodeId, NodeId, NodeId) {
    let c = holder(graph, Value::Null);
    let b = holder(graph, Record::new().with("next", c).into());
    let a = holder(graph, Value::Array(vec![b.into(), c.into()]));
    set_value(graph, c, a.into());
    (a, b, c)
}

#[test]
fn shared_and_cyclic_references_round_trip() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();
    let (a, _, _) = shared_and_cyclic(&mut graph);

    let records = serializer.serialize_all(&graph, &[a]).unwrap();
    assert_eq!(
        records,
        vec![
            json!({ "class": "_rootRefs", "ids": ["RefHolder1"] }),
            json!({
                "class": "RefHolder",
                "id": "RefHolder1",
                "value": [
                    { "class": "_ref", "id": "RefHolder2" },
                    { "class": "_ref", "id": "RefHolder3" },
                ],
            }),
            json!({
                "class": "RefHolder",
                "id": "RefHolder2",
                "value": { "next": { "class": "_ref", "id": "RefHolder3" } },
            }),
            json!({
                "class": "RefHolder",
                "id": "RefHolder3",
                "value": { "class": "_ref", "id": "RefHolder1" },
            }),
        ]
    );

    let mut restored = NodeGraph::new();
    let roots = serializer.deserialize_all(&mut restored, &records).unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(restored.len(), 3);

    let a2 = roots[0];
    let children = value_of(&restored, a2);
    let children = children.as_array().unwrap();
    let b2 = children[0].as_node().unwrap();
    let c2 = children[1].as_node().unwrap();

    // The shared node is one node, and the cycle closes on the new root.
    let b_next = value_of(&restored, b2).as_object().unwrap().get("next").cloned();
    assert_eq!(b_next, Some(Value::Node(c2)));
    assert_eq!(value_of(&restored, c2), Value::Node(a2));

    // Nothing points back into the original graph.
    assert!(!graph.contains(a2) && !graph.contains(b2) && !graph.contains(c2));

    // Serializing the copy reproduces the same records.
    assert_eq!(serializer.serialize_all(&restored, &[a2]).unwrap(), records);
}

#[test]
fn root_order_and_duplicates_are_preserved() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();
    let (a, b, _) = shared_and_cyclic(&mut graph);

    let records = serializer.serialize_all(&graph, &[b, a, b]).unwrap();
    assert_eq!(
        records[0],
        json!({ "class": "_rootRefs", "ids": ["RefHolder1", "RefHolder3", "RefHolder1"] })
    );

    let mut restored = NodeGraph::new();
    let roots = serializer.deserialize_all(&mut restored, &records).unwrap();
    assert_eq!(roots.len(), 3);
    assert_eq!(roots[0], roots[2]);
    assert_ne!(roots[0], roots[1]);
    assert_eq!(restored.len(), 3);
}

#[test]
fn non_finite_numbers_are_unsupported() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();
    let id = holder(&mut graph, Value::Array(vec![Value::Float(f64::NAN)]));
    let err = serializer.serialize_all(&graph, &[id]).unwrap_err();
    assert!(matches!(err, SerializerError::UnsupportedValue { ref class, .. } if class == "RefHolder"));
}

#[test]
fn reserved_property_names_are_unsupported() {
    #[derive(Debug)]
    struct Clash(NodeId);

    impl Default for Clash {
        fn default() -> Self {
            Self(NodeId::next())
        }
    }

    impl Node for Clash {
        fn id(&self) -> NodeId {
            self.0
        }
        fn class_name(&self) -> &'static str {
            "Clash"
        }
        fn serialize(&self) -> Record {
            Record::new().with("id", 1)
        }
        fn deserialize(&mut self, _record: &Record) {}
        fn process_image(
            &self,
            _graph: &NodeGraph,
            buffer: PixelBuffer,
        ) -> Result<PixelBuffer, PipelineError> {
            Ok(buffer)
        }
    }

    impl NodeClass for Clash {
        const CLASS_NAME: &'static str = "Clash";
    }

    impl From<Clash> for AnyNode {
        fn from(node: Clash) -> Self {
            Self::plugin(node)
        }
    }

    let mut serializer = Serializer::new();
    serializer.add_class::<Clash>();
    let mut graph = NodeGraph::new();
    let id = graph.insert(Clash::default());
    let err = serializer.serialize_all(&graph, &[id]).unwrap_err();
    assert!(matches!(err, SerializerError::UnsupportedValue { .. }));
}

#[test]
fn failed_deserialize_leaves_graph_untouched() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();

    let unknown_class = [
        json!({ "class": "RefHolder", "id": "RefHolder1" }),
        json!({ "class": "Teleporter", "id": "Teleporter1" }),
    ];
    assert_eq!(
        serializer.deserialize_all(&mut graph, &unknown_class),
        Err(SerializerError::UnknownClass("Teleporter".to_owned()))
    );

    let dangling = [json!({
        "class": "RefHolder",
        "id": "RefHolder1",
        "value": { "class": "_ref", "id": "RefHolder9" },
    })];
    assert_eq!(
        serializer.deserialize_all(&mut graph, &dangling),
        Err(SerializerError::DanglingReference("RefHolder9".to_owned()))
    );

    let duplicate = [
        json!({ "class": "RefHolder", "id": "RefHolder1" }),
        json!({ "class": "ImageViewer", "id": "RefHolder1" }),
    ];
    assert_eq!(
        serializer.deserialize_all(&mut graph, &duplicate),
        Err(SerializerError::DuplicateId("RefHolder1".to_owned()))
    );

    let unknown_root = [
        json!({ "class": "_rootRefs", "ids": ["RefHolder2"] }),
        json!({ "class": "RefHolder", "id": "RefHolder1" }),
    ];
    assert_eq!(
        serializer.deserialize_all(&mut graph, &unknown_root),
        Err(SerializerError::DanglingReference("RefHolder2".to_owned()))
    );

    assert!(graph.is_empty());
}

#[test]
fn references_resolve_regardless_of_record_order() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();
    // The pipeline refers forward to a node defined after it.
    let records = [
        json!({
            "class": "ImageProcessingPipeline",
            "id": "ImageProcessingPipeline1",
            "pipeline": [{ "class": "_ref", "id": "ImageViewer1" }],
        }),
        json!({ "class": "ImageViewer", "id": "ImageViewer1" }),
    ];
    let nodes = serializer.deserialize_all(&mut graph, &records).unwrap();
    let pipeline = graph.get(nodes[0]).and_then(AnyNode::as_pipeline).unwrap();
    assert_eq!(pipeline.nodes(), vec![nodes[1]]);
}

#[test]
fn serialized_clone_duplicates_whole_pipeline() {
    let serializer = serializer();
    let mut graph = NodeGraph::new();
    let config = PipelineConfig {
        expand: 9,
        tolerance: 3,
    };
    let original = build_default_pipeline(&mut graph, &config);
    let before = graph.len();

    let copy = serializer.serialized_clone(&mut graph, original).unwrap();
    assert_ne!(copy, original);
    assert_eq!(graph.len(), before * 2);

    let original_nodes = graph.get(original).and_then(AnyNode::as_pipeline).unwrap().nodes();
    let copied_nodes = graph.get(copy).and_then(AnyNode::as_pipeline).unwrap().nodes();
    assert_eq!(original_nodes.len(), copied_nodes.len());
    assert!(copied_nodes.iter().all(|id| !original_nodes.contains(id)));

    let expander = copied_nodes
        .iter()
        .find_map(|&id| match graph.get(id) {
            Some(AnyNode::SimpleExpander(e)) => Some(e),
            _ => None,
        })
        .unwrap();
    assert_eq!(expander.expand_by(), 9);

    let detector = copied_nodes
        .iter()
        .find_map(|&id| match graph.get(id) {
            Some(AnyNode::SimpleCropDetector(d)) => Some(d),
            _ => None,
        })
        .unwrap();
    assert_eq!(detector.tolerance(), 3);
}

#[test]
fn pipeline_document_survives_json_text() {
    let serializer = Serializer::with_builtins();
    let mut graph = NodeGraph::new();
    let root = build_default_pipeline(&mut graph, &PipelineConfig::default());

    let document = serializer.capture(&graph, root).unwrap();
    let text = serde_json::to_string_pretty(&document).unwrap();
    let parsed: PipelineDocument = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, document);

    let mut restored = NodeGraph::new();
    let restored_root = serializer.restore(&mut restored, &parsed).unwrap();
    assert_eq!(
        serializer.capture(&restored, restored_root).unwrap(),
        document
    );

    let empty = PipelineDocument::default();
    assert_eq!(
        serializer.restore(&mut restored, &empty),
        Err(SerializerError::MissingRoot)
    );
}
