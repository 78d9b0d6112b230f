//! Shared types for the imagerocket pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferError;
use crate::node::NodeId;

/// Re-export `RgbaImage` so downstream crates can build surface-backed
/// buffers without depending on `image` directly.
pub use image::RgbaImage;

/// A packed 32-bit pixel.
///
/// The four channel bytes sit in memory in R, G, B, A order and are read
/// as one native-endian word, so comparing two colors is a single integer
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(u32);

impl Color {
    /// Fully opaque black, the default border color.
    pub const OPAQUE_BLACK: Self = Self::from_rgba(0, 0, 0, 255);

    /// Pack four channel values into a pixel word.
    #[must_use]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(u32::from_ne_bytes([r, g, b, a]))
    }

    /// Wrap a raw pixel word.
    #[must_use]
    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    /// The raw pixel word.
    #[must_use]
    pub const fn word(self) -> u32 {
        self.0
    }

    /// Channel values in `[r, g, b, a]` order.
    #[must_use]
    pub const fn channels(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    /// Largest absolute per-channel difference between two colors.
    #[must_use]
    pub fn max_channel_difference(self, other: Self) -> u8 {
        self.channels()
            .iter()
            .zip(other.channels())
            .map(|(a, b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::OPAQUE_BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.channels();
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

/// An axis-aligned rectangle in pixel coordinates.
///
/// `right` and `bottom` are exclusive. Coordinates are signed: an expanded
/// rectangle may reach past any edge of its buffer, and a collapsed one
/// may have zero (or, after a negative expansion, negative) extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub left: i64,
    /// Top edge (inclusive).
    pub top: i64,
    /// Right edge (exclusive).
    pub right: i64,
    /// Bottom edge (exclusive).
    pub bottom: i64,
}

impl Rect {
    /// Create a rectangle from its four edges.
    #[must_use]
    pub const fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The rectangle `[0, 0, width, height]` covering a whole buffer.
    #[must_use]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, i64::from(width), i64::from(height))
    }

    /// Horizontal extent (`right - left`), negative for inverted rectangles.
    /// Saturates at the `i64` range.
    #[must_use]
    pub const fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    /// Vertical extent (`bottom - top`), negative for inverted rectangles.
    /// Saturates at the `i64` range.
    #[must_use]
    pub const fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Grow each side outward by the given amount (negative amounts shrink).
    /// Edges saturate at the `i64` range.
    #[must_use]
    pub const fn expanded(&self, amounts: SideAmounts) -> Self {
        Self::new(
            self.left.saturating_sub(amounts.left),
            self.top.saturating_sub(amounts.top),
            self.right.saturating_add(amounts.right),
            self.bottom.saturating_add(amounts.bottom),
        )
    }

    /// The edges as `[left, top, right, bottom]`.
    #[must_use]
    pub const fn to_array(self) -> [i64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// One amount per rectangle side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideAmounts {
    /// Amount applied to the left edge.
    pub left: i64,
    /// Amount applied to the top edge.
    pub top: i64,
    /// Amount applied to the right edge.
    pub right: i64,
    /// Amount applied to the bottom edge.
    pub bottom: i64,
}

impl SideAmounts {
    /// The same amount on every side.
    #[must_use]
    pub const fn uniform(amount: i64) -> Self {
        Self {
            left: amount,
            top: amount,
            right: amount,
            bottom: amount,
        }
    }

    /// Returns `true` if every side is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }
}

/// Per-buffer crop metadata, kept separate from pixel storage.
///
/// Coordinates are always relative to the buffer that currently owns the
/// parameters. The expanded rectangle is only stored once an expander sets
/// it; until then (and after every new crop rectangle) it reads as the crop
/// rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropParameters {
    crop_rect: Rect,
    expanded_rect: Option<Rect>,
    border_color: Color,
}

impl CropParameters {
    /// Parameters for a fresh `width` x `height` buffer: the crop rectangle
    /// covers the whole buffer and the border color is opaque black.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            crop_rect: Rect::from_size(width, height),
            expanded_rect: None,
            border_color: Color::OPAQUE_BLACK,
        }
    }

    /// Reset the crop rectangle to cover a `width` x `height` buffer and
    /// drop any expanded rectangle. The border color is kept.
    pub fn init_crop_rect(&mut self, width: u32, height: u32) {
        self.crop_rect = Rect::from_size(width, height);
        self.expanded_rect = None;
    }

    /// The detected crop rectangle.
    #[must_use]
    pub const fn crop_rect(&self) -> Rect {
        self.crop_rect
    }

    /// Replace the crop rectangle. Any stored expanded rectangle is
    /// discarded because it was derived from the previous crop.
    pub const fn set_crop_rect(&mut self, rect: Rect) {
        self.crop_rect = rect;
        self.expanded_rect = None;
    }

    /// The expanded rectangle, or the crop rectangle if none was set.
    #[must_use]
    pub fn expanded_rect(&self) -> Rect {
        self.expanded_rect.unwrap_or(self.crop_rect)
    }

    /// Whether an expanded rectangle has been stored explicitly.
    #[must_use]
    pub const fn has_expanded_rect(&self) -> bool {
        self.expanded_rect.is_some()
    }

    /// Store an expanded rectangle.
    pub const fn set_expanded_rect(&mut self, rect: Rect) {
        self.expanded_rect = Some(rect);
    }

    /// The sampled border color.
    #[must_use]
    pub const fn border_color(&self) -> Color {
        self.border_color
    }

    /// Replace the border color.
    pub const fn set_border_color(&mut self, color: Color) {
        self.border_color = color;
    }
}

impl fmt::Display for CropParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; {}; {}",
            self.border_color,
            self.crop_rect,
            self.expanded_rect()
        )
    }
}

/// Configuration for the default pipeline.
///
/// Only the knobs a host is expected to tweak without editing a pipeline
/// document are exposed here; everything else uses each node's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Border width added around the detected crop rectangle.
    pub expand: i64,

    /// Per-channel tolerance used by the crop detector (0 = exact match).
    pub tolerance: u8,
}

impl PipelineConfig {
    /// Default border width.
    pub const DEFAULT_EXPAND: i64 = 4;

    /// Default detector tolerance.
    pub const DEFAULT_TOLERANCE: u8 = 0;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expand: Self::DEFAULT_EXPAND,
            tolerance: Self::DEFAULT_TOLERANCE,
        }
    }
}

/// Errors that can occur while running nodes over a buffer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A node id was referenced that is not part of the graph.
    #[error("node {0} is not part of the graph")]
    MissingNode(NodeId),

    /// A node was asked to process a buffer while already processing one,
    /// which only happens when a pipeline (indirectly) contains itself.
    #[error("node {0} is already processing a buffer (cyclic pipeline)")]
    Reentrant(NodeId),

    /// A node failed to build a buffer.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// A crop rectangle is too large to materialize.
    #[error("crop rectangle {rect} exceeds the {max_pixels}-pixel limit")]
    ExtentTooLarge {
        /// The rectangle that was asked for.
        rect: Rect,
        /// The largest buffer, in pixels, that will be allocated.
        max_pixels: u64,
    },
}
