//! Sequential pipeline node and the default crop pipeline.

use crate::buffer::PixelBuffer;
use crate::detect::SimpleCropDetector;
use crate::expand::SimpleExpander;
use crate::fill::BorderColorFiller;
use crate::model::ModelBridge;
use crate::node::{Node, NodeClass, NodeGraph, NodeId};
use crate::sampler::{ManualColor, PointSampler};
use crate::schema::{EditorKind, PropertySchema, Schema};
use crate::types::{PipelineConfig, PipelineError};
use crate::value::{Record, Value};
use crate::viewer::ImageViewer;

const PIPELINE: &str = "pipeline";

/// Runs an ordered list of child nodes over each buffer.
///
/// The child list lives in the node's model under `pipeline`, so a host
/// editing the list through [`model_bridge`](Node::model_bridge) and the
/// node itself see the same order.
#[derive(Debug)]
pub struct ImageProcessingPipeline {
    id: NodeId,
    bridge: ModelBridge,
}

impl ImageProcessingPipeline {
    /// A pipeline over `nodes`, in processing order.
    #[must_use]
    pub fn new(nodes: Vec<NodeId>) -> Self {
        let schema = Schema::new(vec![PropertySchema::new(
            PIPELINE,
            EditorKind::ProcessNodeList,
            "Pipeline",
        )]);
        let initial = Record::new().with(PIPELINE, node_list(&nodes));
        Self {
            id: NodeId::next(),
            bridge: ModelBridge::new(initial, schema),
        }
    }

    /// Child nodes in processing order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.bridge
            .get(PIPELINE)
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_node).collect())
            .unwrap_or_default()
    }

    /// Replace the child list.
    pub fn set_nodes(&self, nodes: Vec<NodeId>) {
        self.bridge.model().set(PIPELINE, node_list(&nodes));
    }

    /// Append a child.
    pub fn push(&self, id: NodeId) {
        let mut nodes = self.nodes();
        nodes.push(id);
        self.set_nodes(nodes);
    }

    /// Insert a child at `index`, clamped to the end of the list.
    pub fn insert(&self, index: usize, id: NodeId) {
        let mut nodes = self.nodes();
        nodes.insert(index.min(nodes.len()), id);
        self.set_nodes(nodes);
    }

    /// Remove the first occurrence of `id`. Returns `false` if absent.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut nodes = self.nodes();
        let Some(pos) = nodes.iter().position(|&n| n == id) else {
            return false;
        };
        nodes.remove(pos);
        self.set_nodes(nodes);
        true
    }

    /// Move the child at `from` to position `to`. Returns `false` if either
    /// index is out of range.
    pub fn move_node(&self, from: usize, to: usize) -> bool {
        let mut nodes = self.nodes();
        if from >= nodes.len() || to >= nodes.len() {
            return false;
        }
        let id = nodes.remove(from);
        nodes.insert(to, id);
        self.set_nodes(nodes);
        true
    }
}

impl Default for ImageProcessingPipeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn node_list(nodes: &[NodeId]) -> Value {
    Value::Array(nodes.iter().copied().map(Value::Node).collect())
}

impl Node for ImageProcessingPipeline {
    fn id(&self) -> NodeId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&self) -> Record {
        self.bridge.export_to_model()
    }

    fn deserialize(&mut self, record: &Record) {
        if let Some(value) = record.get(PIPELINE)
            && value
                .as_array()
                .is_none_or(|items| items.iter().any(|v| v.as_node().is_none()))
        {
            tracing::warn!(pipeline = %self.id, "ignoring non-node entries in pipeline list");
        }
        self.bridge.patch_model(record);
    }

    fn model_bridge(&self) -> Option<ModelBridge> {
        Some(self.bridge.pair())
    }

    fn process_image(
        &self,
        graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        self.nodes()
            .into_iter()
            .try_fold(buffer, |buffer, child| graph.process(child, buffer))
    }
}

impl NodeClass for ImageProcessingPipeline {
    const CLASS_NAME: &'static str = "ImageProcessingPipeline";
}

/// Build the stock crop pipeline in `graph` and return its id.
///
/// Stages: point sampler (top-left pixel), crop detector, expander, manual
/// color override (unset), border filler, viewer.
pub fn build_default_pipeline(graph: &mut NodeGraph, config: &PipelineConfig) -> NodeId {
    let detector = SimpleCropDetector::default();
    detector.set_tolerance(config.tolerance);
    let expander = SimpleExpander::default();
    expander.set_expand_by(config.expand);

    let nodes = vec![
        graph.insert(PointSampler::default()),
        graph.insert(detector),
        graph.insert(expander),
        graph.insert(ManualColor::default()),
        graph.insert(BorderColorFiller::default()),
        graph.insert(ImageViewer::default()),
    ];
    graph.insert(ImageProcessingPipeline::new(nodes))
}
