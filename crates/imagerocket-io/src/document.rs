//! Pipeline document files.
//!
//! A document is the JSON object `{ "pipeline": [records...] }` produced by
//! [`Serializer::capture`].

use std::path::Path;

use imagerocket_pipeline::{NodeGraph, NodeId, PipelineDocument, Serializer};

use crate::IoError;

/// Read a pipeline document from a JSON file.
///
/// # Errors
///
/// Returns [`IoError::Read`] if the file cannot be read, or
/// [`IoError::Json`] if it is not a document.
pub fn load_document(path: &Path) -> Result<PipelineDocument, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document: PipelineDocument = serde_json::from_str(&text)?;
    tracing::debug!(
        path = %path.display(),
        records = document.pipeline.len(),
        "loaded pipeline document"
    );
    Ok(document)
}

/// Write a pipeline document as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`IoError::Json`] if serialization fails, or
/// [`IoError::Write`] if the file cannot be written.
pub fn save_document(document: &PipelineDocument, path: &Path) -> Result<(), IoError> {
    let mut text = serde_json::to_string_pretty(document)?;
    text.push('\n');
    std::fs::write(path, text).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a document and rebuild its graph into `graph`, returning the root.
///
/// # Errors
///
/// See [`load_document`]; additionally [`IoError::Serializer`] if the
/// records do not form a valid graph. `graph` is untouched on error.
pub fn read_pipeline(
    path: &Path,
    serializer: &Serializer,
    graph: &mut NodeGraph,
) -> Result<NodeId, IoError> {
    let document = load_document(path)?;
    Ok(serializer.restore(graph, &document)?)
}

/// Capture the graph under `root` and write it to `path`.
///
/// # Errors
///
/// Returns [`IoError::Serializer`] if the graph cannot be serialized,
/// otherwise see [`save_document`].
pub fn write_pipeline(
    path: &Path,
    serializer: &Serializer,
    graph: &NodeGraph,
    root: NodeId,
) -> Result<(), IoError> {
    let document = serializer.capture(graph, root)?;
    save_document(&document, path)
}
