//! FFmpeg backend integration tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and return early when they are missing.

use std::path::Path;

use endframe::{
    EndframeError, ExtractOptions, FfmpegBackend, FrameExtractor, HandleRegistry, HandleTarget,
    MediaBackend, MediaEvent, MediaResource, VideoFile,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn sample_stream_path() -> &'static str {
    "tests/fixtures/sample_stream.ts"
}

fn ffmpeg_extractor() -> (FrameExtractor, std::sync::Arc<HandleRegistry>) {
    let registry = HandleRegistry::new();
    let extractor = FrameExtractor::new(
        FfmpegBackend::shared(registry.clone()),
        registry.clone(),
        ExtractOptions::new(),
    );
    (extractor, registry)
}

#[tokio::test]
async fn last_frames_of_a_sample_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let (extractor, registry) = ffmpeg_extractor();
    let results = extractor
        .extract(&VideoFile::new(path), 3)
        .await
        .expect("Failed to extract frames");

    let names: Vec<&str> = results.iter().map(|result| result.file_name()).collect();
    assert_eq!(
        names,
        ["sample_video_end_3.png", "sample_video_end_2.png", "sample_video_end_1.png"]
    );

    for pair in results.windows(2) {
        assert!(pair[0].timestamp() >= pair[1].timestamp());
    }
    let last_frame = 5.0 - 1.0 / 30.0;
    assert!(
        results[0].timestamp() >= last_frame - 1e-3,
        "got {}",
        results[0].timestamp()
    );
    assert!(results[0].timestamp() <= 5.0);

    let image = image::load_from_memory(results[0].image_data()).expect("valid PNG");
    assert_eq!(image.width(), 320);
    assert_eq!(image.height(), 240);

    assert_eq!(registry.live_count(), 3);
    for result in &results {
        result.release(&registry);
    }
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn transport_streams_are_supported() {
    let path = sample_stream_path();
    if !Path::new(path).exists() {
        return;
    }

    let (extractor, _) = ffmpeg_extractor();
    let results = extractor
        .extract(&VideoFile::new(path), 1)
        .await
        .expect("Failed to extract frame");

    // The clip is 3 s at 25 fps but its timestamps start around 1.4 s, so
    // the last frame must be measured from the stream start.
    let last_frame = 3.0 - 1.0 / 25.0;
    assert_eq!(results[0].file_name(), "sample_stream_end.png");
    assert!(
        results[0].timestamp() >= last_frame - 1e-3,
        "got {}",
        results[0].timestamp()
    );
    assert!(results[0].timestamp() <= 3.0);
}

#[tokio::test]
async fn missing_file_is_a_decode_error() {
    let (extractor, registry) = ffmpeg_extractor();

    let error = extractor
        .extract(&VideoFile::new("this_file_does_not_exist.mp4"), 1)
        .await
        .unwrap_err();

    assert!(matches!(error, EndframeError::DecodeError { .. }), "got {error}");
    assert!(error.to_string().contains("this_file_does_not_exist.mp4"));
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn garbage_file_is_a_decode_error() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let (extractor, _) = ffmpeg_extractor();
    let error = extractor
        .extract(&VideoFile::new(&invalid_file_path), 1)
        .await
        .unwrap_err();

    assert!(matches!(error, EndframeError::DecodeError { .. }), "got {error}");
}

#[test]
fn loading_outside_a_runtime_reports_an_error() {
    let registry = HandleRegistry::new();
    let mut resource = FfmpegBackend::new(registry.clone()).create_resource();
    let mut events = resource.subscribe();
    let source = registry.allocate(HandleTarget::File("clip.mp4".into()));

    resource.load(&source);

    match events.try_recv() {
        Ok(MediaEvent::Error(reason)) => assert!(reason.contains("tokio runtime"), "{reason}"),
        other => panic!("expected an error event, got {other:?}"),
    }
}
