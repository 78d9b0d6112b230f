//! imagerocket-pipeline: border-cropping pipeline core (sans-IO).
//!
//! Crops images to their content through a chain of configurable nodes:
//! sample border color -> detect crop rectangle -> expand -> fill.
//!
//! Nodes live in a [`NodeGraph`] and keep their settings in a reactive
//! [`ModelBridge`]. Whole graphs serialize to flat, reference-linked JSON
//! records through the [`Serializer`] and restore from them.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers. Decoding, encoding and files live in `imagerocket-io`.

pub mod buffer;
pub mod cropper;
pub mod detect;
pub mod expand;
pub mod fill;
pub mod model;
pub mod node;
pub mod pipeline;
pub mod sampler;
pub mod scheduler;
pub mod schema;
pub mod serializer;
pub mod types;
pub mod value;
pub mod viewer;

pub use buffer::{BufferError, ByteBuffer, PixelBuffer, SurfaceBuffer};
pub use cropper::SimpleCropper;
pub use detect::{ColorMatch, ColorMatchKind, SimpleCropDetector, detect_crop_rect};
pub use expand::{Side, SimpleExpander, expand_rect};
pub use fill::{BorderColorFiller, MAX_FILL_PIXELS, crop_and_fill, fill_rect};
pub use model::{HandlerId, Model, ModelBridge, ModelObserver};
pub use node::{AnyNode, Features, Node, NodeClass, NodeFeature, NodeGraph, NodeId};
pub use pipeline::{ImageProcessingPipeline, build_default_pipeline};
pub use sampler::{BorderColorSampler, ManualColor, PointSampler};
pub use scheduler::Scheduler;
pub use schema::{EditorKind, EditorType, PropertySchema, Schema};
pub use serializer::{PipelineDocument, Serializer, SerializerError};
pub use types::{
    Color, CropParameters, PipelineConfig, PipelineError, Rect, RgbaImage, SideAmounts,
};
pub use value::{Record, Value};
pub use viewer::ImageViewer;

/// Crop one buffer with the default pipeline.
///
/// Builds a throwaway graph holding the stock pipeline configured from
/// `config`, runs it, and drains the calling thread's scheduler so node
/// status updates do not pile up.
///
/// # Errors
///
/// Returns [`PipelineError`] if a node fails. The stock nodes only fail on
/// broken graphs, so in practice this succeeds.
pub fn crop(buffer: PixelBuffer, config: &PipelineConfig) -> Result<PixelBuffer, PipelineError> {
    let mut graph = NodeGraph::new();
    let root = build_default_pipeline(&mut graph, config);
    let result = graph.process(root, buffer);
    Scheduler::current().run_until_idle();
    result
}
