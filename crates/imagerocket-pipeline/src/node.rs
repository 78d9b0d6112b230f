//! Nodes and the graph that owns them.
//!
//! Every node kind implements [`Node`]. Built-in kinds are variants of
//! [`AnyNode`] so the common path is a plain `match`; other kinds are
//! boxed into [`AnyNode::Plugin`]. Nodes refer to each other by
//! [`NodeId`] and live in a [`NodeGraph`] arena, which lets a pipeline
//! reference shared or cyclic structures without shared ownership.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::buffer::PixelBuffer;
use crate::cropper::SimpleCropper;
use crate::detect::SimpleCropDetector;
use crate::expand::SimpleExpander;
use crate::fill::BorderColorFiller;
use crate::model::ModelBridge;
use crate::pipeline::ImageProcessingPipeline;
use crate::sampler::{BorderColorSampler, ManualColor, PointSampler};
use crate::types::PipelineError;
use crate::value::Record;
use crate::viewer::ImageViewer;

/// Seeded from the wall clock so ids from separate runs rarely collide.
static NEXT_ID: LazyLock<AtomicU64> = LazyLock::new(|| {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(0));
    AtomicU64::new(millis)
});

/// Process-unique node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate the next id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id. Only useful for ids obtained from [`NodeId::raw`].
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hints a host uses to present a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeFeature {
    /// The node's current configuration leaves buffers unchanged.
    NoEffect,
    /// The node never modifies buffers.
    PassThrough,
    /// The node has something to show the user.
    Interactive,
}

/// A node's feature set.
pub type Features = BTreeSet<NodeFeature>;

/// A serializable, optionally configurable unit of pipeline behavior.
pub trait Node: fmt::Debug {
    /// This node's identity.
    fn id(&self) -> NodeId;

    /// The name the node's type declares for itself.
    fn class_name(&self) -> &'static str;

    /// The node's state as a record. Values may reference other nodes.
    fn serialize(&self) -> Record;

    /// Replace the node's state from a record produced by
    /// [`serialize`](Self::serialize). Referenced nodes may not have been
    /// deserialized yet.
    fn deserialize(&mut self, record: &Record);

    /// The host-facing side of the node's configuration, if it has one.
    fn model_bridge(&self) -> Option<ModelBridge> {
        None
    }

    /// Presentation hints for the node's current configuration.
    fn features(&self) -> Features {
        Features::new()
    }

    /// Run the node over one buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the node references nodes that are not
    /// in `graph` or re-enters a node that is already running.
    fn process_image(
        &self,
        graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError>;

    /// The node as a border color sampler, if it is one.
    fn as_sampler(&self) -> Option<&dyn BorderColorSampler> {
        None
    }
}

/// A node type that can be registered with the serializer.
pub trait NodeClass: Node + Default + Into<AnyNode> + 'static {
    /// Default registration name.
    const CLASS_NAME: &'static str;
}

/// Any node: one variant per built-in kind plus boxed plug-ins.
#[derive(Debug)]
pub enum AnyNode {
    /// Sequential pipeline.
    Pipeline(ImageProcessingPipeline),
    /// Point border color sampler.
    PointSampler(PointSampler),
    /// Fixed border color.
    ManualColor(ManualColor),
    /// Border crop detector.
    SimpleCropDetector(SimpleCropDetector),
    /// Crop rectangle expander.
    SimpleExpander(SimpleExpander),
    /// Crop and border fill.
    BorderColorFiller(BorderColorFiller),
    /// Snapshot viewer.
    ImageViewer(ImageViewer),
    /// All-in-one cropper.
    SimpleCropper(SimpleCropper),
    /// Externally defined node kind.
    Plugin(Box<dyn Node>),
}

impl AnyNode {
    /// Box an externally defined node.
    #[must_use]
    pub fn plugin(node: impl Node + 'static) -> Self {
        Self::Plugin(Box::new(node))
    }

    /// Shared access to the node's behavior.
    #[must_use]
    pub fn as_node(&self) -> &dyn Node {
        match self {
            Self::Pipeline(n) => n,
            Self::PointSampler(n) => n,
            Self::ManualColor(n) => n,
            Self::SimpleCropDetector(n) => n,
            Self::SimpleExpander(n) => n,
            Self::BorderColorFiller(n) => n,
            Self::ImageViewer(n) => n,
            Self::SimpleCropper(n) => n,
            Self::Plugin(n) => n.as_ref(),
        }
    }

    /// Exclusive access to the node's behavior.
    pub fn as_node_mut(&mut self) -> &mut (dyn Node + 'static) {
        match self {
            Self::Pipeline(n) => n,
            Self::PointSampler(n) => n,
            Self::ManualColor(n) => n,
            Self::SimpleCropDetector(n) => n,
            Self::SimpleExpander(n) => n,
            Self::BorderColorFiller(n) => n,
            Self::ImageViewer(n) => n,
            Self::SimpleCropper(n) => n,
            Self::Plugin(n) => n.as_mut(),
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.as_node().id()
    }

    /// The pipeline, if this is one.
    #[must_use]
    pub const fn as_pipeline(&self) -> Option<&ImageProcessingPipeline> {
        match self {
            Self::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    /// The pipeline, if this is one.
    pub const fn as_pipeline_mut(&mut self) -> Option<&mut ImageProcessingPipeline> {
        match self {
            Self::Pipeline(p) => Some(p),
            _ => None,
        }
    }

    /// The viewer, if this is one.
    #[must_use]
    pub const fn as_viewer(&self) -> Option<&ImageViewer> {
        match self {
            Self::ImageViewer(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_node {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnyNode {
                fn from(node: $ty) -> Self {
                    Self::$variant(node)
                }
            }
        )*
    };
}

impl_from_node!(
    Pipeline(ImageProcessingPipeline),
    PointSampler(PointSampler),
    ManualColor(ManualColor),
    SimpleCropDetector(SimpleCropDetector),
    SimpleExpander(SimpleExpander),
    BorderColorFiller(BorderColorFiller),
    ImageViewer(ImageViewer),
    SimpleCropper(SimpleCropper),
);

/// Arena of nodes keyed by id.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, AnyNode>,
    /// Nodes currently inside `process_image`, innermost last.
    active: RefCell<Vec<NodeId>>,
}

impl NodeGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    pub fn insert(&mut self, node: impl Into<AnyNode>) -> NodeId {
        let node = node.into();
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&AnyNode> {
        self.nodes.get(&id)
    }

    /// Look up a node for modification.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AnyNode> {
        self.nodes.get_mut(&id)
    }

    /// Remove a node. References to it elsewhere are left dangling.
    pub fn remove(&mut self, id: NodeId) -> Option<AnyNode> {
        self.nodes.remove(&id)
    }

    /// Returns `true` if the node is in the graph.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &AnyNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Run one node over a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingNode`] if `id` is not in the graph,
    /// [`PipelineError::Reentrant`] if the node is already running further
    /// up the stack, or whatever the node itself reports.
    pub fn process(&self, id: NodeId, buffer: PixelBuffer) -> Result<PixelBuffer, PipelineError> {
        let node = self.get(id).ok_or(PipelineError::MissingNode(id))?;
        if self.active.borrow().contains(&id) {
            return Err(PipelineError::Reentrant(id));
        }
        self.active.borrow_mut().push(id);
        let result = node.as_node().process_image(self, buffer);
        self.active.borrow_mut().pop();
        result
    }

    /// Run one node over each buffer in turn.
    ///
    /// # Errors
    ///
    /// Stops at the first buffer that fails; see [`process`](Self::process).
    pub fn process_images(
        &self,
        id: NodeId,
        buffers: Vec<PixelBuffer>,
    ) -> Result<Vec<PixelBuffer>, PipelineError> {
        buffers
            .into_iter()
            .map(|buffer| self.process(id, buffer))
            .collect()
    }
}
