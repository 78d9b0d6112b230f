//! Crop detection: shrink a rectangle past uniform border strips.
//!
//! Starting from the whole buffer, each side in turn (left, top, right,
//! bottom) moves inward while the one-pixel strip along it matches the
//! border color. Each side sees the bounds the previous sides left behind,
//! and detection stops once the rectangle collapses. A buffer made
//! entirely of border color therefore collapses on the left pass and
//! yields `[width, 0, width, height]`.
//!
//! # Strategy pattern
//!
//! What counts as "matches the border color" is a [`ColorMatch`]
//! strategy, selected at runtime with [`ColorMatchKind`].

use crate::buffer::{ByteBuffer, PixelBuffer};
use crate::model::ModelBridge;
use crate::node::{Node, NodeClass, NodeGraph, NodeId};
use crate::schema::{EditorKind, PropertySchema, Schema};
use crate::types::{Color, PipelineError, Rect};
use crate::value::Record;

/// Selects how pixels are compared against the border color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMatchKind {
    /// Bit-for-bit equality of the packed pixel.
    #[default]
    Exact,

    /// Every channel within the given absolute difference.
    Tolerant(u8),
}

impl ColorMatchKind {
    /// `Exact` for zero, `Tolerant` otherwise.
    #[must_use]
    pub const fn from_tolerance(tolerance: u8) -> Self {
        if tolerance == 0 {
            Self::Exact
        } else {
            Self::Tolerant(tolerance)
        }
    }
}

/// Trait for border color comparison strategies.
pub trait ColorMatch {
    /// Returns `true` if `pixel` counts as border.
    fn matches(&self, pixel: Color, border: Color) -> bool;
}

impl ColorMatch for ColorMatchKind {
    fn matches(&self, pixel: Color, border: Color) -> bool {
        match *self {
            Self::Exact => pixel == border,
            Self::Tolerant(tolerance) => pixel.max_channel_difference(border) <= tolerance,
        }
    }
}

fn to_coord(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Find the crop rectangle of `buffer` against `border`.
#[must_use]
pub fn detect_crop_rect(buffer: &ByteBuffer, border: Color, matcher: &impl ColorMatch) -> Rect {
    let pitch = buffer.word_pitch();
    let words = buffer.words();
    let is_border = |x: usize, y: usize| {
        words
            .get(x + y * pitch)
            .is_some_and(|&w| matcher.matches(Color::from_word(w), border))
    };
    let column_is_border = |x: usize, top: usize, bottom: usize| (top..bottom).all(|y| is_border(x, y));
    let row_is_border = |y: usize, left: usize, right: usize| (left..right).all(|x| is_border(x, y));

    let mut left = 0;
    let mut top = 0;
    let mut right = buffer.width() as usize;
    let mut bottom = buffer.height() as usize;

    while left < right && top < bottom && column_is_border(left, top, bottom) {
        left += 1;
    }
    while left < right && top < bottom && row_is_border(top, left, right) {
        top += 1;
    }
    while left < right && top < bottom && column_is_border(right - 1, top, bottom) {
        right -= 1;
    }
    while left < right && top < bottom && row_is_border(bottom - 1, left, right) {
        bottom -= 1;
    }

    Rect::new(to_coord(left), to_coord(top), to_coord(right), to_coord(bottom))
}

/// Detects the crop rectangle against the buffer's border color.
///
/// `tolerance` is the largest per-channel difference still treated as
/// border; 0 compares packed pixels exactly.
#[derive(Debug)]
pub struct SimpleCropDetector {
    id: NodeId,
    bridge: ModelBridge,
}

impl SimpleCropDetector {
    /// Current per-channel tolerance.
    #[must_use]
    pub fn tolerance(&self) -> u8 {
        self.bridge
            .get("tolerance")
            .as_i64()
            .and_then(|t| u8::try_from(t.clamp(0, 255)).ok())
            .unwrap_or(0)
    }

    /// Set the per-channel tolerance.
    pub fn set_tolerance(&self, tolerance: u8) {
        self.bridge.model().set("tolerance", i64::from(tolerance));
    }
}

impl Default for SimpleCropDetector {
    fn default() -> Self {
        let schema = Schema::new(vec![
            PropertySchema::new("tolerance", EditorKind::Int, "Color tolerance")
                .range(0.0, 255.0)
                .step(1.0),
        ]);
        Self {
            id: NodeId::next(),
            bridge: ModelBridge::new(Record::new().with("tolerance", 0), schema),
        }
    }
}

impl Node for SimpleCropDetector {
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
        if let Some(value) = record.get("tolerance")
            && !value.as_i64().is_some_and(|t| (0..=255).contains(&t))
        {
            tracing::warn!(node = %self.id, ?value, "tolerance outside 0..=255 will be clamped");
        }
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
        let mut bytes = buffer.into_byte_buffer();
        let border = bytes.crop_parameters().border_color();
        let matcher = ColorMatchKind::from_tolerance(self.tolerance());
        let rect = detect_crop_rect(&bytes, border, &matcher);
        tracing::debug!(%rect, %border, "detected crop rectangle");
        bytes.crop_parameters_mut().set_crop_rect(rect);
        Ok(bytes.into())
    }
}

impl NodeClass for SimpleCropDetector {
    const CLASS_NAME: &'static str = "SimpleCropDetector";
}
