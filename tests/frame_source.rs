//! Frame source integration tests.
//!
//! These run against in-memory synthetic videos, so no fixtures are needed.

use movie_ingest::{
    FrameShape, HandleOptions, HandleState, IngestError, STUB_FRAME_LIMIT, SyntheticVideo,
    VideoHandle, is_sentinel,
};

fn small_shape() -> FrameShape {
    FrameShape::new(4, 6, 3)
}

#[test]
fn open_reports_stream_properties() {
    let handle = VideoHandle::open_source(SyntheticVideo::new(12, 30.0, small_shape()))
        .expect("Failed to open synthetic video");
    assert_eq!(handle.frame_count(), 12);
    assert_eq!(handle.frames_per_second(), 30.0);
    assert_eq!(handle.frame_shape(), small_shape());
    assert_eq!(handle.bytes_per_frame(), 72);
    assert_eq!(handle.cursor(), 0);
    assert_eq!(handle.state(), HandleState::Open);
}

#[test]
fn read_frame_within_range_never_fails() {
    let mut handle = VideoHandle::open_source(SyntheticVideo::new(8, 25.0, small_shape()))
        .expect("Failed to open synthetic video");
    for index in [0, 7, 3, 3, 4, 0] {
        let frame = handle.read_frame(index).expect("In-range read failed");
        let pixels = frame.pixels().expect("Frame should have decoded");
        assert_eq!(frame.shape(), small_shape());
        assert!(pixels.iter().all(|&sample| sample == SyntheticVideo::fill_value(index)));
    }
}

#[test]
fn read_frame_out_of_range_always_fails() {
    let mut handle = VideoHandle::open_source(SyntheticVideo::new(8, 25.0, small_shape()))
        .expect("Failed to open synthetic video");
    for index in [8, 9, 1_000] {
        let result = handle.read_frame(index);
        assert!(
            matches!(
                result,
                Err(IngestError::FrameOutOfRange {
                    frame_number,
                    total_frames: 8,
                }) if frame_number == index
            ),
            "Expected FrameOutOfRange for {index}, got {result:?}",
        );
    }
}

#[test]
fn random_access_leaves_cursor_alone() {
    let mut handle = VideoHandle::open_source(SyntheticVideo::new(8, 25.0, small_shape()))
        .expect("Failed to open synthetic video");
    handle.read_frame(6).expect("Read failed");
    assert_eq!(handle.cursor(), 0);
    let first = handle
        .frames()
        .expect("Iteration should start")
        .next()
        .expect("Stream should not be empty")
        .expect("Frame 0 failed");
    assert_eq!(first.pixels().map(|pixels| pixels[[0, 0, 0]]), Some(0));
}

#[test]
fn close_is_idempotent() {
    let video = SyntheticVideo::new(5, 25.0, small_shape());
    let mut handle = VideoHandle::open_source(video.clone()).expect("Failed to open");
    assert_eq!(video.live_decoders(), 1);

    handle.close();
    assert_eq!(handle.state(), HandleState::Closed);
    assert_eq!(video.live_decoders(), 0);

    handle.close();
    assert_eq!(handle.state(), HandleState::Closed);
    assert_eq!(video.live_decoders(), 0);
    assert_eq!(handle.frame_count(), 5);
}

#[test]
fn closed_handle_rejects_reads_until_reopened() {
    let mut handle =
        VideoHandle::open_source(SyntheticVideo::new(5, 25.0, small_shape())).expect("Failed to open");
    handle.close();
    assert!(matches!(handle.read_frame(0), Err(IngestError::HandleClosed)));
    assert!(matches!(handle.frames(), Err(IngestError::HandleClosed)));

    handle.reopen().expect("Reopen failed");
    assert_eq!(handle.state(), HandleState::Open);
    assert!(handle.read_frame(4).is_ok());
}

#[test]
fn corrupt_frame_becomes_sentinel_in_place() {
    let video = SyntheticVideo::new(10, 25.0, small_shape()).with_corrupt_frame(5);
    let mut handle = VideoHandle::open_source(video).expect("Failed to open");
    let frames: Vec<_> = handle
        .frames()
        .expect("Iteration should start")
        .collect::<Result<_, _>>()
        .expect("A corrupt mid-stream frame must not fail the stream");

    assert_eq!(frames.len(), 10);
    for (index, frame) in frames.iter().enumerate() {
        assert_eq!(frame.shape(), small_shape());
        let array = frame.to_f32();
        if index == 5 {
            assert!(frame.is_corrupt());
            assert!(is_sentinel(&array));
        } else {
            assert!(!is_sentinel(&array));
            assert!(array.iter().all(|&sample| sample == index as f32));
        }
    }
}

#[test]
fn unreadable_first_frame_makes_source_unavailable() {
    let video = SyntheticVideo::new(10, 25.0, small_shape()).with_corrupt_frame(0);
    let result = VideoHandle::open_source(video.clone());
    assert!(matches!(result, Err(IngestError::ResourceUnavailable { .. })));
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn empty_and_unopenable_sources_are_unavailable() {
    let empty = VideoHandle::open_source(SyntheticVideo::new(0, 25.0, small_shape()));
    let error = empty.expect_err("An empty video must not open");
    assert!(
        error.to_string().contains("no readable frames"),
        "Unexpected message: {error}",
    );

    let refused =
        VideoHandle::open_source(SyntheticVideo::new(3, 25.0, small_shape()).unopenable());
    assert!(matches!(refused, Err(IngestError::ResourceUnavailable { .. })));
}

#[test]
fn full_pass_exhausts_and_releases() {
    let video = SyntheticVideo::new(6, 25.0, small_shape());
    let mut handle = VideoHandle::open_source(video.clone()).expect("Failed to open");

    let count = handle.frames().expect("Iteration should start").count();
    assert_eq!(count, 6);
    assert_eq!(handle.state(), HandleState::Exhausted);
    assert_eq!(handle.cursor(), 0);
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn second_pass_without_reopen_is_rejected() {
    let mut handle =
        VideoHandle::open_source(SyntheticVideo::new(6, 25.0, small_shape())).expect("Failed to open");
    assert_eq!(handle.frames().expect("First pass").count(), 6);

    assert!(matches!(handle.frames(), Err(IngestError::HandleExhausted)));
    assert_eq!(handle.state(), HandleState::Exhausted);

    handle.reopen().expect("Reopen failed");
    assert_eq!(handle.frames().expect("Pass after reopen").count(), 6);
}

#[test]
fn corrupt_frame_does_not_force_a_seek() {
    let video = SyntheticVideo::new(10, 25.0, small_shape()).with_corrupt_frame(5);
    let mut handle = VideoHandle::open_source(video.clone()).expect("Failed to open");
    let seeks_after_open = video.seeks();

    let corrupt = handle
        .frames()
        .expect("Iteration should start")
        .filter(|frame| frame.as_ref().is_ok_and(|frame| frame.is_corrupt()))
        .count();

    assert_eq!(corrupt, 1);
    // Only the rewind to frame 0; decoding continues straight past frame 5.
    assert_eq!(video.seeks(), seeks_after_open + 1);
}

#[test]
fn failed_read_stops_iteration() {
    let video = SyntheticVideo::new(10, 25.0, small_shape()).with_failing_read(4);
    let mut handle = VideoHandle::open_source(video.clone()).expect("Failed to open");

    let results: Vec<_> = handle.frames().expect("Iteration should start").collect();
    assert_eq!(results.len(), 5);
    assert!(results[..4].iter().all(Result::is_ok));
    assert!(matches!(results[4], Err(IngestError::IoError(_))));
    assert_eq!(handle.state(), HandleState::Closed);
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn failed_read_is_not_masked_as_corrupt() {
    let video = SyntheticVideo::new(10, 25.0, small_shape()).with_failing_read(7);
    let mut handle = VideoHandle::open_source(video).expect("Failed to open");
    assert!(matches!(handle.read_frame(7), Err(IngestError::IoError(_))));
    assert!(handle.read_frame(6).expect("Read failed").pixels().is_some());
}

#[test]
fn dropping_iterator_early_releases_decoder() {
    let video = SyntheticVideo::new(20, 25.0, small_shape());
    let mut handle = VideoHandle::open_source(video.clone()).expect("Failed to open");

    let taken = handle.frames().expect("Iteration should start").take(3).count();
    assert_eq!(taken, 3);
    assert_eq!(handle.state(), HandleState::Closed);
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn dropping_handle_releases_decoder() {
    let video = SyntheticVideo::new(4, 25.0, small_shape());
    {
        let _handle = VideoHandle::open_source(video.clone()).expect("Failed to open");
        assert_eq!(video.live_decoders(), 1);
    }
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn stub_mode_truncates_to_ten_frames() {
    let mut handle = VideoHandle::open_source_with(
        SyntheticVideo::new(50, 25.0, small_shape()),
        HandleOptions::new().with_stub_mode(true),
    )
    .expect("Failed to open");
    assert!(handle.is_stub());
    assert_eq!(handle.frame_count(), STUB_FRAME_LIMIT);
    assert!(matches!(
        handle.read_frame(STUB_FRAME_LIMIT),
        Err(IngestError::FrameOutOfRange { .. })
    ));
    assert_eq!(handle.frames().expect("Iteration should start").count(), 10);
}

#[test]
fn stub_mode_keeps_short_videos_whole() {
    let handle = VideoHandle::open_source_with(
        SyntheticVideo::new(4, 25.0, small_shape()),
        HandleOptions::new().with_stub_mode(true),
    )
    .expect("Failed to open");
    assert_eq!(handle.frame_count(), 4);
}

#[test]
fn frames_export_as_images() {
    let mut handle = VideoHandle::open_source(
        SyntheticVideo::new(3, 25.0, small_shape()).with_corrupt_frame(2),
    )
    .expect("Failed to open");
    let image = handle
        .read_frame(1)
        .expect("Read failed")
        .to_image()
        .expect("Image conversion failed");
    assert_eq!((image.width(), image.height()), (6, 4));

    let corrupt = handle.read_frame(2).expect("Read failed");
    assert!(corrupt.to_image().is_err());
}
