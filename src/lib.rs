//! # movie-ingest
//!
//! Stream behavioural video recordings into a scientific data container,
//! frame by frame, without ever loading a whole movie into memory.
//!
//! `movie-ingest` opens videos through FFmpeg (via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)), derives per-frame
//! timestamps, decides between rate-based and explicit timing, sizes write
//! chunks against available memory, and hands either a file link or a lazy
//! frame stream to a [`DestinationWriter`].
//!
//! ## Quick Start
//!
//! ### Convert a batch of movies
//!
//! ```no_run
//! use movie_ingest::{ConversionOptions, JsonManifestWriter, MovieConverter};
//! use serde_json::json;
//!
//! let mut writer = JsonManifestWriter::create("out", false)?;
//! let options = ConversionOptions::new()
//!     .with_reference_mode(false)
//!     .with_memory_budget_bytes(512 * 1024 * 1024);
//! let report = MovieConverter::from_paths(&["session1.avi", "session2.avi"])
//!     .run(&mut writer, &json!({}), &options)?;
//! writer.finish()?;
//! println!("{} series, {} warnings", report.series.len(), report.warnings.len());
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```
//!
//! ### Read frames from one movie
//!
//! ```no_run
//! use movie_ingest::VideoHandle;
//!
//! let mut handle = VideoHandle::open("session1.avi")?;
//! println!("{} frames at {} fps", handle.frame_count(), handle.frames_per_second());
//! for frame in handle.frames()? {
//!     let frame = frame?;
//!     if frame.is_corrupt() {
//!         println!("frame could not be decoded");
//!     }
//! }
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```
//!
//! ### Classify timestamps
//!
//! ```
//! use movie_ingest::is_regular;
//!
//! assert!(is_regular(&[0.0, 40.0, 80.0, 120.0], 9));
//! assert!(!is_regular(&[0.0, 40.0, 85.0, 120.0], 9));
//! ```
//!
//! ## Resource model
//!
//! A [`VideoHandle`] owns exactly one decoder and cannot be cloned. Iterating
//! borrows it mutably, and a [`ChunkedWriteIterator`] takes it by value, so one
//! handle never feeds two iterations. Decoders are released after the last
//! frame, when an iterator is dropped early, and when the handle is dropped.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` (default) | FFmpeg decoding backend and the `movie-ingest` binary |
//!
//! Without `ffmpeg` the crate still builds and runs against any
//! [`VideoSource`], including the in-memory [`SyntheticVideo`].

pub mod chunked;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod handle;
pub mod metadata;
pub mod progress;
pub mod sizing;
pub mod synthetic;
pub mod timestamps;
mod utilities;
pub mod writer;

pub use chunked::{ChunkedWriteIterator, FrameChunk, FrameChunks};
pub use config::{CompressionCodec, ConversionOptions, SeriesPlacement};
pub use converter::{ConversionReport, MovieConverter, SeriesMode, SeriesSummary};
#[cfg(feature = "ffmpeg")]
pub use decoder::{FfmpegDecoder, FfmpegSource};
pub use decoder::{FrameCountOrigin, FrameDecoder, StreamInfo, VideoSource};
pub use error::IngestError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{FrameBuffer, FrameDtype, FrameShape, is_sentinel};
pub use handle::{FrameIter, HandleOptions, HandleState, STUB_FRAME_LIMIT, VideoHandle};
pub use metadata::{MergeOptions, deep_update, default_movie_metadata};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use sizing::{
    BufferSizingPolicy, ChunkPlan, FixedMemory, MemoryPressureWarning, MemoryProbe,
    SizingDecision, SizingRequest, SystemMemory,
};
pub use synthetic::SyntheticVideo;
pub use timestamps::{SeriesTiming, TimestampSeries, compute_timestamps, is_regular};
pub use writer::{
    DestinationWriter, EmbeddedSeriesRecord, ExternalSeriesRecord, InMemoryWriter,
    JsonManifestWriter, SeriesDescription, WrittenSeries,
};
