//! Benchmarks for chunked streaming, timestamp scans and sizing.
//!
//! Run with: cargo bench
//!
//! Synthetic sources need no fixtures. The FFmpeg benchmark reads
//! `tests/fixtures/sample_video.mp4` and is skipped when it is absent.

use std::path::Path;

use criterion::{BenchmarkId, Criterion};
use movie_ingest::{
    BufferSizingPolicy, ChunkPlan, ChunkedWriteIterator, FrameShape, SizingRequest,
    SyntheticVideo, VideoHandle, compute_timestamps, is_regular,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn benchmark_chunked_iteration(criterion: &mut Criterion) {
    let shape = FrameShape::new(120, 160, 3);
    let mut group = criterion.benchmark_group("chunked iteration (300 frames)");

    for frames_per_chunk in [1_u64, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(frames_per_chunk),
            &frames_per_chunk,
            |bencher, &frames_per_chunk| {
                bencher.iter(|| {
                    let handle = VideoHandle::open_source(SyntheticVideo::new(300, 30.0, shape))
                        .unwrap();
                    let plan = ChunkPlan::MemoryBudget {
                        budget_bytes: frames_per_chunk * shape.byte_size(Default::default()),
                        frames_per_chunk,
                    };
                    ChunkedWriteIterator::new(handle, plan)
                        .unwrap()
                        .chunks()
                        .map(|chunk| chunk.unwrap().len())
                        .sum::<usize>()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_timestamps(criterion: &mut Criterion) {
    let timestamps: Vec<f64> = (0..100_000).map(|index| index as f64 / 30.0).collect();
    criterion.bench_function("is_regular (100k timestamps)", |bencher| {
        bencher.iter(|| is_regular(&timestamps, 9));
    });

    criterion.bench_function("compute_timestamps (synthetic, 10k frames)", |bencher| {
        bencher.iter(|| {
            let mut handle =
                VideoHandle::open_source(SyntheticVideo::new(10_000, 30.0, FrameShape::new(1, 1, 1)))
                    .unwrap();
            compute_timestamps(&mut handle).unwrap()
        });
    });
}

fn benchmark_sizing(criterion: &mut Criterion) {
    let policy = BufferSizingPolicy::new();
    let request = SizingRequest {
        file_size_bytes: 250_000_000,
        frame_count: 108_000,
        bytes_per_frame: 640 * 480 * 3,
        chunk_data: false,
        memory_budget_bytes: None,
        explicit_chunk_shape: None,
    };
    criterion.bench_function("sizing decision", |bencher| {
        bencher.iter(|| policy.plan(&request, 16_000_000_000).unwrap());
    });
}

#[cfg(feature = "ffmpeg")]
fn benchmark_ffmpeg_stream(criterion: &mut Criterion) {
    movie_ingest::set_ffmpeg_log_level(movie_ingest::FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    criterion.bench_function("stream sample video (stub)", |bencher| {
        bencher.iter(|| {
            let handle = VideoHandle::open_with(
                SAMPLE_VIDEO,
                movie_ingest::HandleOptions::new().with_stub_mode(true),
            )
            .unwrap();
            ChunkedWriteIterator::new(handle, ChunkPlan::Eager { total_frames: 10 })
                .unwrap()
                .count()
        });
    });
}

#[cfg(not(feature = "ffmpeg"))]
fn benchmark_ffmpeg_stream(_criterion: &mut Criterion) {
    let _ = Path::new(SAMPLE_VIDEO);
}

criterion::criterion_group!(
    benches,
    benchmark_chunked_iteration,
    benchmark_timestamps,
    benchmark_sizing,
    benchmark_ffmpeg_stream,
);
criterion::criterion_main!(benches);
