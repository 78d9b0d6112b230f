//! Border color samplers.
//!
//! A sampler picks the color the crop detector treats as "border" and
//! stores it in the buffer's crop parameters. A sampler that has nothing to
//! report leaves the buffer untouched.

use crate::buffer::PixelBuffer;
use crate::model::ModelBridge;
use crate::node::{Features, Node, NodeClass, NodeFeature, NodeGraph, NodeId};
use crate::schema::{EditorKind, PropertySchema, Schema};
use crate::types::{Color, PipelineError};
use crate::value::{Record, Value};

/// Extracts a border color from a buffer.
pub trait BorderColorSampler {
    /// The border color, or `None` to leave the buffer's color unchanged.
    fn extract_color(&self, buffer: &PixelBuffer) -> Option<Color>;
}

/// Run `sampler` and store its color on the buffer.
#[must_use]
pub fn apply_sampler(sampler: &dyn BorderColorSampler, mut buffer: PixelBuffer) -> PixelBuffer {
    if let Some(color) = sampler.extract_color(&buffer) {
        buffer.crop_parameters_mut().set_border_color(color);
    }
    buffer
}

/// `round(value * (extent - 1))`, or 0 when the value is unset.
#[expect(clippy::cast_possible_truncation)]
fn normalized_offset(value: Option<f64>, extent: u32) -> i64 {
    value.map_or(0, |v| (v * f64::from(extent.saturating_sub(1))).round() as i64)
}

fn clamp_to_extent(offset: i64, extent: u32) -> u32 {
    u32::try_from(offset.clamp(0, i64::from(extent) - 1)).unwrap_or(0)
}

/// Samples a single pixel.
///
/// The position is `normalizedX`/`normalizedY` (0..1 across the buffer)
/// plus `pixelX`/`pixelY`, clamped to the buffer. After each sample the
/// unclamped position and the color are written back as `lastX`, `lastY`
/// and `lastColor` so a host can show where the color came from.
#[derive(Debug)]
pub struct PointSampler {
    id: NodeId,
    bridge: ModelBridge,
}

impl PointSampler {
    /// Move the sample point in normalized coordinates.
    pub fn set_normalized(&self, x: f64, y: f64) {
        let model = self.bridge.model();
        model.set("normalizedX", x);
        model.set("normalizedY", y);
    }

    /// Move the sample point by a pixel offset.
    pub fn set_pixel_offset(&self, x: i64, y: i64) {
        let model = self.bridge.model();
        model.set("pixelX", x);
        model.set("pixelY", y);
    }

    /// Unclamped position of the last sample.
    #[must_use]
    pub fn last_position(&self) -> Option<(i64, i64)> {
        Some((
            self.bridge.get("lastX").as_i64()?,
            self.bridge.get("lastY").as_i64()?,
        ))
    }

    /// Color of the last sample.
    #[must_use]
    pub fn last_color(&self) -> Option<Color> {
        self.bridge.get("lastColor").as_color()
    }
}

impl Default for PointSampler {
    fn default() -> Self {
        let schema = Schema::new(vec![
            PropertySchema::new("normalizedX", EditorKind::Double, "X coordinate normalized to [0, 1]")
                .range(0.0, 1.0)
                .step(0.01),
            PropertySchema::new("normalizedY", EditorKind::Double, "Y coordinate normalized to [0, 1]")
                .range(0.0, 1.0)
                .step(0.01),
            PropertySchema::new("pixelX", EditorKind::Int, "X offset in pixels"),
            PropertySchema::new("pixelY", EditorKind::Int, "Y offset in pixels"),
            PropertySchema::new("lastX", EditorKind::Int, "Last X")
                .optional()
                .read_only()
                .transient(),
            PropertySchema::new("lastY", EditorKind::Int, "Last Y")
                .optional()
                .read_only()
                .transient(),
            PropertySchema::new("lastColor", EditorKind::Color, "Last border color")
                .optional()
                .read_only()
                .transient()
                .with_alpha(),
        ]);
        let initial = Record::new()
            .with("normalizedX", 0.0)
            .with("normalizedY", 0.0)
            .with("pixelX", 0)
            .with("pixelY", 0)
            .with("lastX", Value::Null)
            .with("lastY", Value::Null)
            .with("lastColor", Value::Null);
        Self {
            id: NodeId::next(),
            bridge: ModelBridge::new(initial, schema),
        }
    }
}

impl BorderColorSampler for PointSampler {
    fn extract_color(&self, buffer: &PixelBuffer) -> Option<Color> {
        let (width, height) = (buffer.width(), buffer.height());
        if width == 0 || height == 0 {
            return None;
        }
        let model = self.bridge.model();
        let x = normalized_offset(model.get("normalizedX").as_f64(), width)
            .saturating_add(model.get("pixelX").as_i64().unwrap_or(0));
        let y = normalized_offset(model.get("normalizedY").as_f64(), height)
            .saturating_add(model.get("pixelY").as_i64().unwrap_or(0));

        let color = buffer.pixel(clamp_to_extent(x, width), clamp_to_extent(y, height))?;
        model.set("lastColor", color);
        model.set("lastX", x);
        model.set("lastY", y);
        Some(color)
    }
}

impl Node for PointSampler {
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
        self.bridge.patch_model(record);
    }

    fn model_bridge(&self) -> Option<ModelBridge> {
        Some(self.bridge.pair())
    }

    fn process_image(
        &self,
        _graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        Ok(apply_sampler(self, buffer))
    }

    fn as_sampler(&self) -> Option<&dyn BorderColorSampler> {
        Some(self)
    }
}

impl NodeClass for PointSampler {
    const CLASS_NAME: &'static str = "PointSampler";
}

/// A fixed, user-chosen border color. Unset means "keep whatever an
/// earlier sampler chose".
#[derive(Debug)]
pub struct ManualColor {
    id: NodeId,
    bridge: ModelBridge,
}

impl ManualColor {
    /// The configured color.
    #[must_use]
    pub fn color(&self) -> Option<Color> {
        self.bridge.get("color").as_color()
    }

    /// Set or clear the color.
    pub fn set_color(&self, color: Option<Color>) {
        self.bridge.model().set("color", color);
    }
}

impl Default for ManualColor {
    fn default() -> Self {
        let schema = Schema::new(vec![
            PropertySchema::new("color", EditorKind::Color, "Border color")
                .optional()
                .with_alpha(),
        ]);
        Self {
            id: NodeId::next(),
            bridge: ModelBridge::new(Record::new().with("color", Value::Null), schema),
        }
    }
}

impl BorderColorSampler for ManualColor {
    fn extract_color(&self, _buffer: &PixelBuffer) -> Option<Color> {
        self.color()
    }
}

impl Node for ManualColor {
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
        if let Some(value) = record.get("color")
            && !value.is_null()
            && value.as_color().is_none()
        {
            tracing::warn!(node = %self.id, ?value, "discarding invalid color");
            self.set_color(None);
            return;
        }
        self.bridge.patch_model(record);
    }

    fn model_bridge(&self) -> Option<ModelBridge> {
        Some(self.bridge.pair())
    }

    fn features(&self) -> Features {
        if self.color().is_some() {
            Features::new()
        } else {
            Features::from([NodeFeature::NoEffect])
        }
    }

    fn process_image(
        &self,
        _graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        Ok(apply_sampler(self, buffer))
    }

    fn as_sampler(&self) -> Option<&dyn BorderColorSampler> {
        Some(self)
    }
}

impl NodeClass for ManualColor {
    const CLASS_NAME: &'static str = "ManualColor";
}
