//! Snapshot viewer.

use std::cell::RefCell;

use crate::buffer::PixelBuffer;
use crate::node::{Features, Node, NodeClass, NodeFeature, NodeGraph, NodeId};
use crate::types::PipelineError;
use crate::value::Record;

/// Passes buffers through unchanged, keeping a copy of each one so a host
/// can display or export it.
#[derive(Debug)]
pub struct ImageViewer {
    id: NodeId,
    snapshots: RefCell<Vec<PixelBuffer>>,
}

impl ImageViewer {
    /// Number of buffers seen since the last [`take_snapshots`](Self::take_snapshots).
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.borrow().len()
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<PixelBuffer> {
        self.snapshots.borrow().last().cloned()
    }

    /// Drain every snapshot, oldest first.
    pub fn take_snapshots(&self) -> Vec<PixelBuffer> {
        std::mem::take(&mut *self.snapshots.borrow_mut())
    }
}

impl Default for ImageViewer {
    fn default() -> Self {
        Self {
            id: NodeId::next(),
            snapshots: RefCell::new(Vec::new()),
        }
    }
}

impl Node for ImageViewer {
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

    fn features(&self) -> Features {
        Features::from([NodeFeature::PassThrough, NodeFeature::Interactive])
    }

    fn process_image(
        &self,
        _graph: &NodeGraph,
        buffer: PixelBuffer,
    ) -> Result<PixelBuffer, PipelineError> {
        self.snapshots.borrow_mut().push(buffer.clone());
        Ok(buffer)
    }
}

impl NodeClass for ImageViewer {
    const CLASS_NAME: &'static str = "ImageViewer";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;

    #[test]
    fn keeps_a_copy_of_each_buffer() {
        let viewer = ImageViewer::default();
        let graph = NodeGraph::new();
        let a = PixelBuffer::from(ByteBuffer::allocate(1, 1));
        let b = PixelBuffer::from(ByteBuffer::allocate(2, 2));

        assert_eq!(viewer.process_image(&graph, a.clone()).unwrap(), a);
        assert_eq!(viewer.process_image(&graph, b.clone()).unwrap(), b);
        assert_eq!(viewer.snapshot_count(), 2);
        assert_eq!(viewer.latest(), Some(b.clone()));

        assert_eq!(viewer.take_snapshots(), vec![a, b]);
        assert_eq!(viewer.snapshot_count(), 0);
    }

    #[test]
    fn reports_pass_through_and_interactive() {
        let features = ImageViewer::default().features();
        assert!(features.contains(&NodeFeature::PassThrough));
        assert!(features.contains(&NodeFeature::Interactive));
    }
}
