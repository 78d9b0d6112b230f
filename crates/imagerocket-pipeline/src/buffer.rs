//! Packed-pixel buffers.
//!
//! Two storage variants exist. [`ByteBuffer`] holds raw 32-bit words with
//! an explicit row stride and is what the pixel algorithms work on.
//! [`SurfaceBuffer`] wraps an [`RgbaImage`], the form decoders produce and
//! encoders consume. Both carry optional [`CropParameters`] that are
//! initialized lazily to cover the whole buffer, and converting between
//! them copies the parameters by value.

use image::Rgba;

use crate::types::{Color, CropParameters, RgbaImage};

/// Errors raised when constructing a buffer from caller-supplied storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The row stride is not a whole number of pixels.
    #[error("pitch {pitch} is not a multiple of 4 bytes")]
    UnalignedPitch {
        /// The rejected stride in bytes.
        pitch: usize,
    },

    /// The row stride is shorter than one row of pixels.
    #[error("pitch {pitch} is smaller than a {width}-pixel row")]
    PitchTooSmall {
        /// The rejected stride in bytes.
        pitch: usize,
        /// Buffer width in pixels.
        width: u32,
    },

    /// The storage does not hold `height` rows at the given stride.
    #[error("buffer needs {needed} words, got {actual}")]
    TooSmall {
        /// Words required by the declared geometry.
        needed: usize,
        /// Words supplied.
        actual: usize,
    },
}

/// A raw-memory buffer addressed in 32-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    words: Vec<u32>,
    width: u32,
    height: u32,
    pitch: usize,
    crop: Option<CropParameters>,
}

impl ByteBuffer {
    /// A zero-filled `width` x `height` buffer with a tight pitch.
    #[must_use]
    pub fn allocate(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            words: vec![0; len],
            width,
            height,
            pitch: width as usize * 4,
            crop: None,
        }
    }

    /// Wrap existing words.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError`] if `pitch` is not a multiple of 4, is shorter
    /// than one row, or `words` holds fewer than `pitch / 4 * height` words.
    pub fn from_words(
        words: Vec<u32>,
        width: u32,
        height: u32,
        pitch: usize,
    ) -> Result<Self, BufferError> {
        if pitch % 4 != 0 {
            return Err(BufferError::UnalignedPitch { pitch });
        }
        if pitch < width as usize * 4 {
            return Err(BufferError::PitchTooSmall { pitch, width });
        }
        let needed = pitch / 4 * height as usize;
        if words.len() < needed {
            return Err(BufferError::TooSmall {
                needed,
                actual: words.len(),
            });
        }
        Ok(Self {
            words,
            width,
            height,
            pitch,
            crop: None,
        })
    }

    /// Wrap tightly packed RGBA bytes (four bytes per pixel, no padding).
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::TooSmall`] if `bytes` holds fewer than
    /// `width * height` pixels.
    pub fn from_rgba_bytes(bytes: &[u8], width: u32, height: u32) -> Result<Self, BufferError> {
        let words = bytes
            .chunks_exact(4)
            .map(|px| u32::from_ne_bytes([px[0], px[1], px[2], px[3]]))
            .collect();
        Self::from_words(words, width, height, width as usize * 4)
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes.
    #[must_use]
    pub const fn pitch(&self) -> usize {
        self.pitch
    }

    /// Row stride in words.
    #[must_use]
    pub const fn word_pitch(&self) -> usize {
        self.pitch / 4
    }

    /// The backing words, including any row padding.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Mutable access to the backing words.
    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// The backing storage as native-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    /// Word index of pixel `(x, y)`.
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        x as usize + y as usize * self.word_pitch()
    }

    /// One row of pixels, without padding.
    #[must_use]
    pub fn row(&self, y: u32) -> &[u32] {
        let start = self.index(0, y);
        self.words
            .get(start..start + self.width as usize)
            .unwrap_or_default()
    }

    /// The pixel at `(x, y)`, or `None` outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.words.get(self.index(x, y)).copied().map(Color::from_word)
    }

    /// Crop parameters, computed for the whole buffer when never set.
    #[must_use]
    pub fn crop_parameters(&self) -> CropParameters {
        self.crop
            .clone()
            .unwrap_or_else(|| CropParameters::new(self.width, self.height))
    }

    /// Mutable crop parameters, initialized on first access.
    pub fn crop_parameters_mut(&mut self) -> &mut CropParameters {
        let (width, height) = (self.width, self.height);
        self.crop
            .get_or_insert_with(|| CropParameters::new(width, height))
    }

    /// Replace the crop parameters.
    pub fn set_crop_parameters(&mut self, params: CropParameters) {
        self.crop = Some(params);
    }

    /// Convert to a surface buffer. Row padding is dropped.
    #[must_use]
    pub fn to_surface_buffer(&self) -> SurfaceBuffer {
        let image = RgbaImage::from_fn(self.width, self.height, |x, y| {
            let word = self.words.get(self.index(x, y)).copied().unwrap_or(0);
            Rgba(word.to_ne_bytes())
        });
        SurfaceBuffer {
            image,
            crop: self.crop.clone(),
        }
    }
}

/// A buffer backed by a decoded [`RgbaImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBuffer {
    image: RgbaImage,
    crop: Option<CropParameters>,
}

impl SurfaceBuffer {
    /// Wrap an image.
    #[must_use]
    pub const fn new(image: RgbaImage) -> Self {
        Self { image, crop: None }
    }

    /// The wrapped image.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Unwrap into the image, discarding crop parameters.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Crop parameters, computed for the whole buffer when never set.
    #[must_use]
    pub fn crop_parameters(&self) -> CropParameters {
        self.crop
            .clone()
            .unwrap_or_else(|| CropParameters::new(self.width(), self.height()))
    }

    /// Mutable crop parameters, initialized on first access.
    pub fn crop_parameters_mut(&mut self) -> &mut CropParameters {
        let (width, height) = self.image.dimensions();
        self.crop
            .get_or_insert_with(|| CropParameters::new(width, height))
    }

    /// Replace the crop parameters.
    pub fn set_crop_parameters(&mut self, params: CropParameters) {
        self.crop = Some(params);
    }

    /// Convert to a raw word buffer with a tight pitch.
    #[must_use]
    pub fn to_byte_buffer(&self) -> ByteBuffer {
        let (width, height) = self.image.dimensions();
        let words = self
            .image
            .pixels()
            .map(|px| u32::from_ne_bytes(px.0))
            .collect();
        ByteBuffer {
            words,
            width,
            height,
            pitch: width as usize * 4,
            crop: self.crop.clone(),
        }
    }
}

/// A buffer in either representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelBuffer {
    /// Raw words.
    Bytes(ByteBuffer),
    /// Decoded image surface.
    Surface(SurfaceBuffer),
}

impl PixelBuffer {
    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Bytes(b) => b.width(),
            Self::Surface(s) => s.width(),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Bytes(b) => b.height(),
            Self::Surface(s) => s.height(),
        }
    }

    /// Row stride in bytes.
    #[must_use]
    pub fn pitch(&self) -> usize {
        match self {
            Self::Bytes(b) => b.pitch(),
            Self::Surface(s) => s.width() as usize * 4,
        }
    }

    /// Row stride in words.
    #[must_use]
    pub fn word_pitch(&self) -> usize {
        self.pitch() / 4
    }

    /// The pixel at `(x, y)`, or `None` outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        match self {
            Self::Bytes(b) => b.pixel(x, y),
            Self::Surface(s) => s
                .image
                .get_pixel_checked(x, y)
                .map(|px| Color::from_word(u32::from_ne_bytes(px.0))),
        }
    }

    /// Crop parameters, computed for the whole buffer when never set.
    #[must_use]
    pub fn crop_parameters(&self) -> CropParameters {
        match self {
            Self::Bytes(b) => b.crop_parameters(),
            Self::Surface(s) => s.crop_parameters(),
        }
    }

    /// Mutable crop parameters, initialized on first access.
    pub fn crop_parameters_mut(&mut self) -> &mut CropParameters {
        match self {
            Self::Bytes(b) => b.crop_parameters_mut(),
            Self::Surface(s) => s.crop_parameters_mut(),
        }
    }

    /// Replace the crop parameters.
    pub fn set_crop_parameters(&mut self, params: CropParameters) {
        match self {
            Self::Bytes(b) => b.set_crop_parameters(params),
            Self::Surface(s) => s.set_crop_parameters(params),
        }
    }

    /// The raw word representation. Already-raw buffers are moved, not
    /// copied.
    #[must_use]
    pub fn into_byte_buffer(self) -> ByteBuffer {
        match self {
            Self::Bytes(b) => b,
            Self::Surface(s) => s.to_byte_buffer(),
        }
    }

    /// The surface representation. Already-surface buffers are moved, not
    /// copied.
    #[must_use]
    pub fn into_surface_buffer(self) -> SurfaceBuffer {
        match self {
            Self::Bytes(b) => b.to_surface_buffer(),
            Self::Surface(s) => s,
        }
    }
}

impl From<ByteBuffer> for PixelBuffer {
    fn from(buffer: ByteBuffer) -> Self {
        Self::Bytes(buffer)
    }
}

impl From<SurfaceBuffer> for PixelBuffer {
    fn from(buffer: SurfaceBuffer) -> Self {
        Self::Surface(buffer)
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        Self::Surface(SurfaceBuffer::new(image))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Rect;

    #[test]
    fn allocate_is_zeroed_with_tight_pitch() {
        let buf = ByteBuffer::allocate(3, 2);
        assert_eq!(buf.pitch(), 12);
        assert_eq!(buf.word_pitch(), 3);
        assert_eq!(buf.words(), &[0; 6]);
    }

    #[test]
    fn from_words_validates_geometry() {
        assert_eq!(
            ByteBuffer::from_words(vec![0; 8], 2, 2, 10),
            Err(BufferError::UnalignedPitch { pitch: 10 })
        );
        assert_eq!(
            ByteBuffer::from_words(vec![0; 8], 4, 2, 8),
            Err(BufferError::PitchTooSmall { pitch: 8, width: 4 })
        );
        assert_eq!(
            ByteBuffer::from_words(vec![0; 7], 2, 2, 16),
            Err(BufferError::TooSmall {
                needed: 8,
                actual: 7
            })
        );
        assert!(ByteBuffer::from_words(vec![0; 8], 2, 2, 16).is_ok());
    }

    #[test]
    fn pixel_respects_padded_pitch() {
        // 2x2 image stored with one padding word per row.
        let words = vec![1, 2, 99, 3, 4, 99];
        let buf = ByteBuffer::from_words(words, 2, 2, 12).unwrap();
        assert_eq!(buf.pixel(1, 1), Some(Color::from_word(4)));
        assert_eq!(buf.pixel(2, 0), None);
        assert_eq!(buf.row(1), &[3, 4]);
    }

    #[test]
    fn crop_parameters_initialize_lazily() {
        let mut buf = ByteBuffer::allocate(5, 4);
        assert_eq!(buf.crop_parameters().crop_rect(), Rect::new(0, 0, 5, 4));

        buf.crop_parameters_mut().set_crop_rect(Rect::new(1, 1, 2, 2));
        assert_eq!(buf.crop_parameters().crop_rect(), Rect::new(1, 1, 2, 2));
    }

    #[test]
    fn conversions_preserve_pixels_and_crop() {
        let red = Color::from_rgba(255, 0, 0, 255);
        let words = vec![red.word(), 0, 7, 99, 1, 2, 3, 99];
        let mut bytes = ByteBuffer::from_words(words, 3, 2, 16).unwrap();
        bytes.crop_parameters_mut().set_border_color(red);

        let surface = bytes.to_surface_buffer();
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(surface.crop_parameters().border_color(), red);

        let back = surface.to_byte_buffer();
        assert_eq!(back.pitch(), 12);
        assert_eq!(back.words(), &[red.word(), 0, 7, 1, 2, 3]);
        assert_eq!(back.crop_parameters(), bytes.crop_parameters());
    }

    #[test]
    fn into_byte_buffer_moves_raw_storage() {
        let buf = ByteBuffer::allocate(4, 4);
        let ptr = buf.words().as_ptr();
        let moved = PixelBuffer::from(buf).into_byte_buffer();
        assert_eq!(moved.words().as_ptr(), ptr);
    }

    #[test]
    fn from_rgba_bytes_packs_channels() {
        let buf = ByteBuffer::from_rgba_bytes(&[1, 2, 3, 4, 5, 6, 7, 8], 2, 1).unwrap();
        assert_eq!(buf.pixel(0, 0), Some(Color::from_rgba(1, 2, 3, 4)));
        assert_eq!(buf.pixel(1, 0), Some(Color::from_rgba(5, 6, 7, 8)));
        assert_eq!(buf.to_bytes(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
