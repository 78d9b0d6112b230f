//! Integration test: images and pipeline documents on disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use imagerocket_io::{
    IoError, load_document, load_image, read_pipeline, save_document, save_png, write_pipeline,
};
use imagerocket_pipeline::{
    AnyNode, NodeGraph, PipelineConfig, PipelineDocument, RgbaImage, Serializer,
    build_default_pipeline, crop,
};

fn framed_scan() -> RgbaImage {
    RgbaImage::from_fn(16, 12, |x, y| {
        if (6..10).contains(&x) && (4..8).contains(&y) {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    })
}

#[test]
fn cropped_png_survives_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.cropped.png");

    let out = crop(framed_scan().into(), &PipelineConfig::default()).unwrap();
    save_png(&out, &path).unwrap();

    let reloaded = load_image(&path).unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), (12, 12));
    assert_eq!(reloaded.pixel(4, 4), out.pixel(4, 4));
    assert_eq!(reloaded.pixel(0, 0), out.pixel(0, 0));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.png");
    let err = load_image(&path).unwrap_err();
    assert!(matches!(err, IoError::Read { path: ref p, .. } if *p == path));
}

#[test]
fn pipeline_survives_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.json");
    let serializer = Serializer::with_builtins();

    let mut graph = NodeGraph::new();
    let config = PipelineConfig {
        expand: 7,
        tolerance: 2,
    };
    let root = build_default_pipeline(&mut graph, &config);
    write_pipeline(&path, &serializer, &graph, root).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("{\n  \"pipeline\": ["));
    assert!(text.contains("\"_rootRefs\""));

    let mut restored = NodeGraph::new();
    let restored_root = read_pipeline(&path, &serializer, &mut restored).unwrap();
    assert_eq!(restored.len(), graph.len());
    let pipeline = restored
        .get(restored_root)
        .and_then(AnyNode::as_pipeline)
        .unwrap();
    assert_eq!(pipeline.nodes().len(), 6);

    assert_eq!(
        serializer.capture(&restored, restored_root).unwrap(),
        load_document(&path).unwrap()
    );
}

#[test]
fn invalid_documents_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let serializer = Serializer::with_builtins();
    let mut graph = NodeGraph::new();

    let not_json = dir.path().join("garbage.json");
    std::fs::write(&not_json, "pipeline = []").unwrap();
    assert!(matches!(
        read_pipeline(&not_json, &serializer, &mut graph),
        Err(IoError::Json(_))
    ));

    let empty = dir.path().join("empty.json");
    save_document(&PipelineDocument::default(), &empty).unwrap();
    assert!(matches!(
        read_pipeline(&empty, &serializer, &mut graph),
        Err(IoError::Serializer(_))
    ));

    assert!(graph.is_empty());
}
