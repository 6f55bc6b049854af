//! Chunked write iterator tests.

use movie_ingest::{
    ChunkPlan, ChunkedWriteIterator, FrameShape, HandleOptions, IngestError, SyntheticVideo,
    VideoHandle,
};

fn shape() -> FrameShape {
    FrameShape::new(4, 4, 3)
}

fn budget_plan(frames_per_chunk: u64) -> ChunkPlan {
    ChunkPlan::MemoryBudget {
        budget_bytes: frames_per_chunk * 48,
        frames_per_chunk,
    }
}

fn first_sample(frame: &movie_ingest::FrameBuffer) -> Option<u8> {
    frame.pixels().map(|pixels| pixels[[0, 0, 0]])
}

#[test]
fn fifty_frames_in_chunks_of_ten() {
    let handle = VideoHandle::open_source(SyntheticVideo::new(50, 25.0, shape()))
        .expect("Failed to open synthetic video");
    let chunks = ChunkedWriteIterator::new(handle, budget_plan(10))
        .expect("Iterator creation failed")
        .chunks()
        .collect::<Result<Vec<_>, _>>()
        .expect("Chunking failed");

    assert_eq!(chunks.len(), 5);
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, chunk_index as u64);
        assert_eq!(chunk.len(), 10);
        assert_eq!(chunk.start_frame, chunk_index as u64 * 10);
    }

    let order: Vec<_> = chunks
        .iter()
        .flat_map(|chunk| chunk.frames.iter())
        .map(first_sample)
        .collect();
    let expected: Vec<_> = (0..50).map(|index| Some(index as u8)).collect();
    assert_eq!(order, expected);
}

#[test]
fn trailing_chunk_holds_the_remainder() {
    let handle = VideoHandle::open_source(SyntheticVideo::new(25, 25.0, shape()))
        .expect("Failed to open");
    let sizes: Vec<_> = ChunkedWriteIterator::new(handle, budget_plan(10))
        .expect("Iterator creation failed")
        .chunks()
        .map(|chunk| chunk.map(|chunk| chunk.len()))
        .collect::<Result<_, _>>()
        .expect("Chunking failed");
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[test]
fn eager_plan_yields_one_chunk() {
    let handle =
        VideoHandle::open_source(SyntheticVideo::new(12, 25.0, shape())).expect("Failed to open");
    let chunks: Vec<_> = ChunkedWriteIterator::new(handle, ChunkPlan::Eager { total_frames: 12 })
        .expect("Iterator creation failed")
        .chunks()
        .collect::<Result<_, _>>()
        .expect("Chunking failed");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 12);
}

#[test]
fn frames_arrive_one_at_a_time_in_order() {
    let handle =
        VideoHandle::open_source(SyntheticVideo::new(8, 25.0, shape())).expect("Failed to open");
    let mut frames = ChunkedWriteIterator::new(handle, budget_plan(3)).expect("Iterator creation failed");

    assert_eq!(frames.size_hint(), (0, Some(8)));
    let first = frames.next().expect("Stream ended early").expect("Frame failed");
    assert_eq!(first_sample(&first), Some(0));
    assert_eq!(frames.frames_yielded(), 1);

    let rest: Vec<_> = frames.by_ref().collect::<Result<_, _>>().expect("Iteration failed");
    assert_eq!(rest.len(), 7);
    assert!(frames.next().is_none());
    assert!(frames.next().is_none());
}

#[test]
fn shapes_describe_the_destination_dataset() {
    let handle =
        VideoHandle::open_source(SyntheticVideo::new(30, 25.0, shape())).expect("Failed to open");
    let frames = ChunkedWriteIterator::new(handle, budget_plan(10)).expect("Iterator creation failed");
    assert_eq!(frames.frame_count(), 30);
    assert_eq!(frames.chunk_shape(), vec![10, 4, 4, 3]);
    assert_eq!(frames.maxshape(), vec![30, 4, 4, 3]);
}

#[test]
fn stub_handles_stream_ten_frames() {
    let handle = VideoHandle::open_source_with(
        SyntheticVideo::new(50, 25.0, shape()),
        HandleOptions::new().with_stub_mode(true),
    )
    .expect("Failed to open");
    let count = ChunkedWriteIterator::new(handle, budget_plan(4))
        .expect("Iterator creation failed")
        .count();
    assert_eq!(count, 10);
}

#[test]
fn decoder_released_after_last_frame() {
    let video = SyntheticVideo::new(6, 25.0, shape());
    let handle = VideoHandle::open_source(video.clone()).expect("Failed to open");
    let mut frames = ChunkedWriteIterator::new(handle, budget_plan(2)).expect("Iterator creation failed");

    assert_eq!(frames.by_ref().count(), 6);
    assert_eq!(video.live_decoders(), 0);
    drop(frames);
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn dropping_early_releases_decoder() {
    let video = SyntheticVideo::new(40, 25.0, shape());
    let handle = VideoHandle::open_source(video.clone()).expect("Failed to open");
    let mut chunks = ChunkedWriteIterator::new(handle, budget_plan(10))
        .expect("Iterator creation failed")
        .chunks();

    let first = chunks.next().expect("No chunk").expect("Chunk failed");
    assert_eq!(first.len(), 10);
    assert_eq!(video.live_decoders(), 1);

    drop(chunks);
    assert_eq!(video.live_decoders(), 0);
}

#[test]
fn corrupt_frames_keep_their_slot() {
    let video = SyntheticVideo::new(10, 25.0, shape()).with_corrupt_frame(5);
    let handle = VideoHandle::open_source(video).expect("Failed to open");
    let chunks: Vec<_> = ChunkedWriteIterator::new(handle, budget_plan(4))
        .expect("Iterator creation failed")
        .chunks()
        .collect::<Result<_, _>>()
        .expect("Chunking failed");

    let corrupt: Vec<_> = chunks
        .iter()
        .flat_map(|chunk| chunk.frames.iter())
        .enumerate()
        .filter(|(_, frame)| frame.is_corrupt())
        .map(|(index, _)| index)
        .collect();
    assert_eq!(corrupt, vec![5]);
    assert_eq!(chunks[1].frames[1].shape(), shape());
}

#[test]
fn exhausted_or_closed_handles_cannot_stream() {
    let mut handle =
        VideoHandle::open_source(SyntheticVideo::new(3, 25.0, shape())).expect("Failed to open");
    assert_eq!(handle.frames().expect("First pass").count(), 3);
    assert!(matches!(
        ChunkedWriteIterator::new(handle, budget_plan(1)),
        Err(IngestError::HandleExhausted)
    ));

    let mut handle =
        VideoHandle::open_source(SyntheticVideo::new(3, 25.0, shape())).expect("Failed to open");
    handle.close();
    assert!(matches!(
        ChunkedWriteIterator::new(handle, budget_plan(1)),
        Err(IngestError::HandleClosed)
    ));
}
