//! Error types for the `movie-ingest` crate.
//!
//! This module defines [`IngestError`], the unified error type returned by
//! every fallible operation in the crate. Errors carry the context needed to
//! tell a missing file from a bad index or a misconfigured conversion without
//! extra logging at the call site.
//!
//! Two outcomes that look like errors are deliberately *not* variants here:
//! a memory-pressure override is reported as a
//! [`MemoryPressureWarning`](crate::MemoryPressureWarning) value, and a
//! mid-stream decode failure becomes a
//! [`FrameBuffer::Corrupt`](crate::FrameBuffer::Corrupt) frame.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use ndarray::ShapeError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `movie-ingest` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The source could not be opened, has no readable frames, or its first
    /// frame cannot be decoded. Not transient; never retried.
    #[error("Video at {path} is unavailable: {reason}")]
    ResourceUnavailable {
        /// Path (or synthetic name) of the source.
        path: PathBuf,
        /// Why the source was rejected.
        reason: String,
    },

    /// The requested frame index is at or past the handle's frame count.
    #[error("Frame {frame_number} is out of range (video has {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame index that was requested.
        frame_number: u64,
        /// The frame count reported by the handle.
        total_frames: u64,
    },

    /// The handle has been released and must be reopened before use.
    #[error("Video handle is closed")]
    HandleClosed,

    /// The handle already completed a full pass; reopen it to iterate again.
    #[error("Video handle was exhausted by a previous iteration; reopen it to read again")]
    HandleExhausted,

    /// The decoder failed to produce a frame.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// An explicit chunk shape was empty or contained a zero extent.
    #[error("Invalid chunk shape {0:?}: every extent must be at least 1")]
    InvalidChunkShape(Vec<usize>),

    /// Starting times did not line up with the files being converted.
    #[error("Expected {expected} finite starting times (one per file), got {actual}")]
    InvalidStartingTimes {
        /// Number of files in the conversion.
        expected: usize,
        /// Number of usable starting times supplied.
        actual: usize,
    },

    /// A timestamp series was not finite and non-decreasing.
    #[error("Invalid timestamp series: {0}")]
    InvalidTimestamps(String),

    /// Reference mode needs a file path to link to.
    #[error("Source {0} has no file path to reference")]
    MissingExternalPath(String),

    /// User-supplied metadata had the wrong structure.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The destination writer rejected a record.
    #[error("Destination write failed: {0}")]
    WriteError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error while reading sources or writing outputs.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while exporting a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A JSON (de)serialisation error.
    #[error("JSON error: {0}")]
    JsonError(#[from] JsonError),

    /// Decoded pixel data did not fit the declared frame shape.
    #[error("Frame shape mismatch: {0}")]
    ShapeError(#[from] ShapeError),
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for IngestError {
    fn from(error: ffmpeg_next::Error) -> Self {
        IngestError::FfmpegError(error.to_string())
    }
}
