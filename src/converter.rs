//! Conversion orchestration.
//!
//! [`MovieConverter`] turns a list of video sources into series on a
//! [`DestinationWriter`]. For every source, in order, it:
//!
//! 1. opens a [`VideoHandle`] (truncated in stub mode),
//! 2. computes timestamps and offsets them by the file's start time,
//! 3. stores timing as a rate when the timestamps are regular and as an
//!    explicit array otherwise,
//! 4. links the file (reference mode) or streams its frames through a
//!    [`ChunkedWriteIterator`] sized by the [`BufferSizingPolicy`] (embedded
//!    mode).
//!
//! ```
//! use movie_ingest::{
//!     ConversionOptions, FrameShape, InMemoryWriter, MovieConverter, SyntheticVideo,
//! };
//! use serde_json::json;
//!
//! let video = SyntheticVideo::new(50, 25.0, FrameShape::new(8, 8, 3)).with_path("cam.avi");
//! let mut writer = InMemoryWriter::new();
//! let report = MovieConverter::new(vec![Box::new(video)])
//!     .run(&mut writer, &json!({}), &ConversionOptions::new())?;
//! assert_eq!(report.series.len(), 1);
//! assert_eq!(writer.series()[0].description().name, "Video: cam");
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
#[cfg(feature = "ffmpeg")]
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;

use crate::chunked::ChunkedWriteIterator;
use crate::config::ConversionOptions;
#[cfg(feature = "ffmpeg")]
use crate::decoder::FfmpegSource;
use crate::decoder::VideoSource;
use crate::error::IngestError;
use crate::handle::{HandleOptions, VideoHandle};
use crate::metadata::{deep_update, default_movie_metadata, movie_description};
use crate::progress::{OperationType, ProgressTracker};
use crate::sizing::{
    BufferSizingPolicy, ChunkPlan, MemoryPressureWarning, MemoryProbe, SizingRequest,
    SystemMemory,
};
use crate::timestamps::{SeriesTiming, compute_timestamps};
use crate::writer::{DestinationWriter, EmbeddedSeriesRecord, ExternalSeriesRecord};

/// How a series was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMode {
    /// Linked to its video file.
    External,
    /// Frames embedded in the destination.
    Embedded,
}

/// What happened to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    /// Series name.
    pub name: String,
    /// Source location.
    pub source: PathBuf,
    /// Frames covered by the series.
    pub frame_count: u64,
    /// Nominal frame rate of the source.
    pub frames_per_second: f64,
    /// Start time of the series, in seconds.
    pub starting_time: f64,
    /// `true` if timing was stored as a rate.
    pub regular: bool,
    /// Linked or embedded.
    pub mode: SeriesMode,
    /// Chunk plan used for embedded series.
    pub chunk_plan: Option<ChunkPlan>,
}

/// The outcome of [`MovieConverter::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    /// One entry per source, in order.
    pub series: Vec<SeriesSummary>,
    /// Eager-loading overrides raised along the way.
    pub warnings: Vec<MemoryPressureWarning>,
}

/// Converts a batch of videos into destination series.
pub struct MovieConverter {
    sources: Vec<Box<dyn VideoSource>>,
    memory: Box<dyn MemoryProbe>,
}

impl Debug for MovieConverter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let locations: Vec<_> = self.sources.iter().map(|source| source.location()).collect();
        f.debug_struct("MovieConverter")
            .field("sources", &locations)
            .finish_non_exhaustive()
    }
}

impl MovieConverter {
    /// A converter over `sources`, querying the system for available memory.
    pub fn new(sources: Vec<Box<dyn VideoSource>>) -> Self {
        Self {
            sources,
            memory: Box::new(SystemMemory),
        }
    }

    /// A converter over video files decoded with FFmpeg.
    #[cfg(feature = "ffmpeg")]
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self::new(
            paths
                .iter()
                .map(|path| Box::new(FfmpegSource::new(path)) as Box<dyn VideoSource>)
                .collect(),
        )
    }

    /// Append one more source.
    #[must_use]
    pub fn with_source<S: VideoSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Replace the memory probe used by the sizing policy.
    #[must_use]
    pub fn with_memory_probe<M: MemoryProbe + 'static>(mut self, probe: M) -> Self {
        self.memory = Box::new(probe);
        self
    }

    /// Number of sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Default metadata for the sources: one `Behavior.Movies` entry each.
    pub fn default_metadata(&self) -> Value {
        let locations: Vec<_> = self.sources.iter().map(|source| source.location()).collect();
        default_movie_metadata(&locations)
    }

    /// Convert every source into `writer`.
    ///
    /// `metadata` is deep-merged over [`default_metadata`](Self::default_metadata);
    /// `Behavior.Movies[i]` describes source `i`.
    ///
    /// # Errors
    ///
    /// Stops at the first source that fails. Earlier sources stay written.
    ///
    /// - [`IngestError::InvalidStartingTimes`] if `starting_times` does not
    ///   match the source count or holds a non-finite value.
    /// - [`IngestError::ResourceUnavailable`] if a source cannot be opened.
    /// - [`IngestError::MissingExternalPath`] in reference mode for a source
    ///   that is not a file.
    /// - Anything the writer returns.
    pub fn run(
        self,
        writer: &mut dyn DestinationWriter,
        metadata: &Value,
        options: &ConversionOptions,
    ) -> Result<ConversionReport, IngestError> {
        let merged = deep_update(&self.default_metadata(), metadata);
        let file_count = self.sources.len();

        let explicit_starts = options.starting_times.is_some();
        let mut starting_times = match &options.starting_times {
            Some(times) => {
                validate_starting_times(times, file_count)?;
                times.clone()
            }
            None => vec![0.0],
        };

        let policy = BufferSizingPolicy::new().with_inflation_factor(options.inflation_factor);
        let mut chunk_data = options.chunk_data;
        let mut report = ConversionReport::default();
        let mut files = ProgressTracker::new(
            options.progress.clone(),
            OperationType::FileConversion,
            Some(file_count as u64),
            1,
        );

        let handle_options = HandleOptions::new().with_stub_mode(options.stub_mode);
        for (index, source) in self.sources.into_iter().enumerate() {
            let location = source.location().to_path_buf();
            let description = movie_description(&merged, index, &location)?;
            log::debug!(
                "Converting {} as \"{}\" ({} of {file_count})",
                location.display(),
                description.name,
                index + 1
            );

            let mut handle = VideoHandle::open_boxed(source, handle_options)?;
            let starting_time = starting_times[index];
            let timestamps = compute_timestamps(&mut handle)?.shifted(starting_time);
            if !explicit_starts {
                starting_times.push(timestamps.last().unwrap_or(starting_time));
            }

            let frame_count = handle.frame_count();
            let frames_per_second = handle.frames_per_second();
            let timing = SeriesTiming::derive(timestamps, frames_per_second);
            let regular = timing.is_rate();
            let name = description.name.clone();

            let (mode, chunk_plan) = if options.reference_mode {
                let external_file = handle
                    .source()
                    .external_path()
                    .map(|path| path.to_path_buf())
                    .ok_or_else(|| IngestError::MissingExternalPath(location.display().to_string()))?;
                handle.close();
                writer.add_external_series(ExternalSeriesRecord {
                    description,
                    timing,
                    external_file,
                    placement: options.placement.clone(),
                })?;
                (SeriesMode::External, None)
            } else {
                let request = SizingRequest {
                    file_size_bytes: handle.source().byte_size()?,
                    frame_count,
                    bytes_per_frame: handle.bytes_per_frame(),
                    chunk_data,
                    memory_budget_bytes: options.memory_budget_bytes,
                    explicit_chunk_shape: options.explicit_chunk_shape.clone(),
                };
                let decision = policy.plan(&request, self.memory.available_memory())?;
                if let Some(warning) = decision.warning {
                    chunk_data = true;
                    report.warnings.push(warning);
                }

                let tracker = ProgressTracker::new(
                    options.progress.clone(),
                    OperationType::FrameWriting,
                    Some(frame_count),
                    options.batch_size,
                )
                .with_file(name.clone());
                let plan = decision.plan;
                let frames = ChunkedWriteIterator::new(handle, plan.clone())?.with_progress(tracker);
                let record = EmbeddedSeriesRecord {
                    description,
                    timing,
                    compression: options.compression,
                    chunk_shape: frames.chunk_shape(),
                    maxshape: frames.maxshape(),
                    placement: options.placement.clone(),
                };
                writer.add_embedded_series(record, frames)?;
                (SeriesMode::Embedded, Some(plan))
            };

            report.series.push(SeriesSummary {
                name,
                source: location,
                frame_count,
                frames_per_second,
                starting_time,
                regular,
                mode,
                chunk_plan,
            });
            files.advance();
        }

        Ok(report)
    }
}

fn validate_starting_times(times: &[f64], file_count: usize) -> Result<(), IngestError> {
    if times.len() != file_count || times.iter().any(|time| !time.is_finite()) {
        return Err(IngestError::InvalidStartingTimes {
            expected: file_count,
            actual: times.len(),
        });
    }
    Ok(())
}
