//! imagerocket-io: file and codec boundary for imagerocket.
//!
//! Decodes image files into [`PixelBuffer`]s, encodes results back to PNG,
//! and persists pipeline documents as JSON. Everything that touches the
//! filesystem or a codec lives here so the pipeline core stays sans-IO.
//!
//! [`PixelBuffer`]: imagerocket_pipeline::PixelBuffer

pub mod codec;
pub mod document;

use std::path::PathBuf;

use imagerocket_pipeline::SerializerError;

pub use codec::{decode, encode_png, load_image, save_png};
pub use document::{load_document, read_pipeline, save_document, write_pipeline};

/// Errors from reading or writing images and pipeline documents.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The input bytes were empty.
    #[error("image data is empty")]
    EmptyInput,

    /// The buffer has no pixels, which PNG cannot represent.
    #[error("cannot encode a {width}x{height} image")]
    EmptyImage {
        /// Buffer width.
        width: u32,
        /// Buffer height.
        height: u32,
    },

    /// Decoding or encoding failed.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// The pipeline document is not valid JSON of the expected shape.
    #[error("invalid pipeline document: {0}")]
    Json(#[from] serde_json::Error),

    /// The pipeline document does not describe a valid graph.
    #[error(transparent)]
    Serializer(#[from] SerializerError),
}
