//! Crop and border fill.
//!
//! Materializes the expanded rectangle as a new buffer. Parts of the
//! rectangle that overhang the source are filled with the border color;
//! the rest is copied row by row.

use crate::buffer::{ByteBuffer, PixelBuffer};
use crate::node::{Node, NodeClass, NodeGraph, NodeId};
use crate::types::{Color, PipelineError, Rect};
use crate::value::Record;

/// Largest buffer, in pixels, that materializing a crop will allocate.
pub const MAX_FILL_PIXELS: u64 = 1 << 28;

fn to_index(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(0)
}

/// Crop `buffer` to its expanded rectangle.
///
/// Returns the input unchanged when the rectangle already covers exactly
/// the whole buffer. Otherwise the result has the rectangle's size, keeps
/// the border color, and its crop rectangle covers the whole new buffer.
/// An inverted or empty rectangle yields an empty buffer.
///
/// # Errors
///
/// Returns [`PipelineError::ExtentTooLarge`] if the rectangle holds more
/// than [`MAX_FILL_PIXELS`] pixels.
pub fn crop_and_fill(buffer: PixelBuffer) -> Result<PixelBuffer, PipelineError> {
    let params = buffer.crop_parameters();
    let rect = params.expanded_rect();
    if rect == Rect::from_size(buffer.width(), buffer.height()) {
        return Ok(buffer);
    }

    let source = buffer.into_byte_buffer();
    let mut dest = fill_rect(&source, rect, params.border_color())?;
    let mut dest_params = params;
    dest_params.init_crop_rect(dest.width(), dest.height());
    dest.set_crop_parameters(dest_params);
    tracing::debug!(
        %rect,
        width = dest.width(),
        height = dest.height(),
        "materialized crop"
    );
    Ok(dest.into())
}

/// Size of the buffer `rect` materializes into. Inverted axes are empty.
fn extent(rect: Rect) -> Result<(u32, u32), PipelineError> {
    let too_large = || PipelineError::ExtentTooLarge {
        rect,
        max_pixels: MAX_FILL_PIXELS,
    };
    let width = u32::try_from(rect.width().max(0)).map_err(|_| too_large())?;
    let height = u32::try_from(rect.height().max(0)).map_err(|_| too_large())?;
    if u64::from(width) * u64::from(height) > MAX_FILL_PIXELS {
        return Err(too_large());
    }
    Ok((width, height))
}

/// Copy `rect` out of `source` into a new tightly packed buffer, filling
/// any overhang with `border`.
///
/// # Errors
///
/// Returns [`PipelineError::ExtentTooLarge`] if the rectangle holds more
/// than [`MAX_FILL_PIXELS`] pixels or an edge length does not fit in `u32`.
pub fn fill_rect(
    source: &ByteBuffer,
    rect: Rect,
    border: Color,
) -> Result<ByteBuffer, PipelineError> {
    let (width, height) = extent(rect)?;
    let mut dest = ByteBuffer::allocate(width, height);
    if width == 0 || height == 0 {
        return Ok(dest);
    }

    let source_width = i64::from(source.width());
    let source_height = i64::from(source.height());
    let kept_width = to_index(rect.right.min(source_width) - rect.left.max(0));
    let kept_height = to_index(rect.bottom.min(source_height) - rect.top.max(0));

    // Offsets of the kept region in destination and source.
    let dx = to_index(rect.left.saturating_neg());
    let dy = to_index(rect.top.saturating_neg());
    let sx = to_index(rect.left);
    let sy = to_index(rect.top);

    let fill = border.word();
    let source_pitch = source.word_pitch();
    let source_words = source.words();

    for (y, row) in dest.words_mut().chunks_exact_mut(width as usize).enumerate() {
        if kept_width == 0 || y < dy || y >= dy + kept_height {
            row.fill(fill);
            continue;
        }
        let (left, rest) = row.split_at_mut(dx);
        let (kept, right) = rest.split_at_mut(kept_width);
        left.fill(fill);
        right.fill(fill);

        let start = (sy + y - dy) * source_pitch + sx;
        if let Some(src) = source_words.get(start..start + kept_width) {
            kept.copy_from_slice(src);
        }
    }
    Ok(dest)
}

/// Materializes the expanded crop rectangle.
#[derive(Debug)]
pub struct BorderColorFiller {
    id: NodeId,
}

impl Default for BorderColorFiller {
    fn default() -> Self {
        Self { id: NodeId::next() }
    }
}

impl Node for BorderColorFiller {
    fn id(&self) -> NodeId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn serialize(&self) -> Record {
        Record::new()
    }

    fn deserialize(&mut self, _record: &Record) {}

    fn process_image(
        &self,
        _graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        crop_and_fill(buffer)
    }
}

impl NodeClass for BorderColorFiller {
    const CLASS_NAME: &'static str = "BorderColorFiller";
}
