//! All-in-one cropper.

use crate::buffer::PixelBuffer;
use crate::detect::{ColorMatchKind, detect_crop_rect};
use crate::expand::expand_rect;
use crate::fill::crop_and_fill;
use crate::node::{Node, NodeClass, NodeGraph, NodeId};
use crate::sampler::apply_sampler;
use crate::types::{PipelineError, SideAmounts};
use crate::value::{Record, Value};

/// Samples, detects, expands and materializes in one step.
///
/// The border color comes from a referenced sampler node; without one the
/// buffer's current border color is used. Expansion is uniform and only
/// applied when positive.
#[derive(Debug)]
pub struct SimpleCropper {
    id: NodeId,
    sampler: Option<NodeId>,
    expand: i64,
}

impl SimpleCropper {
    /// A cropper using `sampler` and expanding by `expand`.
    #[must_use]
    pub fn new(sampler: Option<NodeId>, expand: i64) -> Self {
        Self {
            id: NodeId::next(),
            sampler,
            expand,
        }
    }

    /// The referenced sampler node.
    #[must_use]
    pub const fn sampler(&self) -> Option<NodeId> {
        self.sampler
    }

    /// Replace the sampler reference.
    pub const fn set_sampler(&mut self, sampler: Option<NodeId>) {
        self.sampler = sampler;
    }

    /// Uniform expansion.
    #[must_use]
    pub const fn expand(&self) -> i64 {
        self.expand
    }

    /// Set the uniform expansion.
    pub const fn set_expand(&mut self, expand: i64) {
        self.expand = expand;
    }
}

impl Default for SimpleCropper {
    fn default() -> Self {
        Self::new(None, 0)
    }
}

impl Node for SimpleCropper {
    fn id(&self) -> NodeId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&self) -> Record {
        Record::new()
            .with("borderColorSampler", self.sampler)
            .with("expand", self.expand)
    }

    fn deserialize(&mut self, record: &Record) {
        self.sampler = match record.get("borderColorSampler") {
            Some(Value::Node(id)) => Some(*id),
            None | Some(Value::Null) => None,
            Some(other) => {
                tracing::warn!(node = %self.id, value = ?other, "discarding non-node sampler reference");
                None
            }
        };
        self.expand = record
            .get("expand")
            .and_then(Value::as_i64)
            .unwrap_or_default();
    }

    fn process_image(
        &self,
        graph: &NodeGraph,
        mut buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        if let Some(id) = self.sampler {
            let node = graph.get(id).ok_or(PipelineError::MissingNode(id))?;
            if let Some(sampler) = node.as_node().as_sampler() {
                buffer = apply_sampler(sampler, buffer);
            } else {
                tracing::warn!(node = %self.id, sampler = %id, "referenced node is not a sampler");
            }
        }

        let mut bytes = buffer.into_byte_buffer();
        let border = bytes.crop_parameters().border_color();
        let crop = detect_crop_rect(&bytes, border, &ColorMatchKind::Exact);
        let expanded = if self.expand > 0 {
            expand_rect(crop, SideAmounts::uniform(self.expand))
        } else {
            crop
        };
        tracing::debug!(%crop, %expanded, "cropper rectangles");

        let params = bytes.crop_parameters_mut();
        params.set_crop_rect(crop);
        params.set_expanded_rect(expanded);
        crop_and_fill(bytes.into())
    }
}

impl NodeClass for SimpleCropper {
    const CLASS_NAME: &'static str = "SimpleCropper";
}
