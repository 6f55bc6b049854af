//! FFmpeg-backed tests.
//!
//! Tests that need media read `tests/fixtures/sample_video.mp4` and return
//! early when it is absent.

#![cfg(feature = "ffmpeg")]

use std::path::Path;

use movie_ingest::{
    ChunkedWriteIterator, ConversionOptions, FfmpegLogLevel, HandleOptions, HandleState,
    IngestError, InMemoryWriter, MovieConverter, VideoHandle, compute_timestamps,
    get_ffmpeg_log_level, set_ffmpeg_log_level,
};
use serde_json::json;

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

#[test]
fn open_nonexistent_file() {
    let result = VideoHandle::open("this_file_does_not_exist.mp4");
    assert!(matches!(result, Err(IngestError::ResourceUnavailable { .. })));
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let result = VideoHandle::open(&invalid_file_path);
    assert!(matches!(result, Err(IngestError::ResourceUnavailable { .. })));
}

#[test]
fn log_level_round_trips() {
    set_ffmpeg_log_level(FfmpegLogLevel::Error);
    assert_eq!(get_ffmpeg_log_level(), Some(FfmpegLogLevel::Error));
}

#[test]
fn sample_video_properties() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let handle = VideoHandle::open(path).expect("Failed to open test video");
    assert!(handle.frame_count() > 0);
    assert!(handle.frames_per_second() > 0.0);
    let shape = handle.frame_shape();
    assert!(shape.height > 0 && shape.width > 0);
    assert!(shape.channels == 1 || shape.channels == 3);
}

#[test]
fn sample_video_random_access() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut handle = VideoHandle::open(path).expect("Failed to open test video");
    let last = handle.frame_count() - 1;
    let shape = handle.frame_shape();
    for index in [0, last / 2, last, 1] {
        let frame = handle.read_frame(index).expect("In-range read failed");
        assert_eq!(frame.shape(), shape);
    }
    assert!(matches!(
        handle.read_frame(last + 1),
        Err(IngestError::FrameOutOfRange { .. })
    ));
}

#[test]
fn sample_video_full_pass() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut handle = VideoHandle::open_with(path, HandleOptions::new().with_stub_mode(true))
        .expect("Failed to open test video");
    let expected = handle.frame_count();
    let count = handle
        .frames()
        .expect("Iteration should start")
        .filter(Result::is_ok)
        .count() as u64;
    assert_eq!(count, expected);
    assert_eq!(handle.state(), HandleState::Exhausted);
}

#[test]
fn sample_video_timestamps() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut handle = VideoHandle::open(path).expect("Failed to open test video");
    let series = compute_timestamps(&mut handle).expect("Timestamp scan failed");
    assert_eq!(series.len() as u64, handle.frame_count());
    assert_eq!(series.first(), Some(0.0));

    let frames = ChunkedWriteIterator::new(handle, movie_ingest::ChunkPlan::Eager {
        total_frames: series.len() as u64,
    })
    .expect("Iterator creation failed");
    assert_eq!(frames.take(3).count(), 3);
}

#[test]
fn sample_video_converts_in_stub_mode() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut writer = InMemoryWriter::new();
    let options = ConversionOptions::new()
        .with_reference_mode(false)
        .with_stub_mode(true)
        .with_memory_budget_bytes(1);
    let report = MovieConverter::from_paths(&[path])
        .run(&mut writer, &json!({}), &options)
        .expect("Conversion failed");

    assert_eq!(report.series[0].name, "Video: sample_video");
    let frames: usize = writer.series()[0].chunks().iter().map(|chunk| chunk.len()).sum();
    assert_eq!(frames as u64, report.series[0].frame_count);
}

#[test]
fn sample_video_random_access_matches_sequential_pass() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut handle = VideoHandle::open(path).expect("Failed to open test video");
    compute_timestamps(&mut handle).expect("Timestamp scan failed");
    let frame_count = handle.frame_count();
    if frame_count < 4 {
        return;
    }
    let wanted = [1, frame_count / 2, frame_count - 1];
    let random: Vec<_> = wanted
        .iter()
        .map(|&index| handle.read_frame(index).expect("In-range read failed"))
        .collect();

    let sequential: Vec<_> = handle
        .frames()
        .expect("Iteration should start")
        .enumerate()
        .filter(|(index, _)| wanted.contains(&(*index as u64)))
        .map(|(_, frame)| frame.expect("Sequential read failed"))
        .collect();

    assert_eq!(sequential.len(), wanted.len());
    for (from_seek, in_order) in random.iter().zip(&sequential) {
        assert_eq!(from_seek.pixels(), in_order.pixels());
    }
}
