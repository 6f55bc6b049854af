//! Buffer sizing: how many frames go into each streamed write.
//!
//! [`BufferSizingPolicy::plan`] turns a [`SizingRequest`] and the amount of
//! available memory into a [`ChunkPlan`]:
//!
//! 1. An explicit chunk shape is used verbatim.
//! 2. Otherwise the uncompressed size is estimated as the encoded file size
//!    times the inflation factor (70 by default).
//! 3. If eager loading was requested but the estimate does not fit in
//!    available memory, chunked mode is forced and a
//!    [`MemoryPressureWarning`] is returned alongside the plan.
//! 4. Chunked plans hold `floor(budget / bytes_per_frame)` frames per chunk,
//!    never fewer than one.

use std::fmt::{Display, Formatter, Result as FmtResult};

use sysinfo::System;

use crate::error::IngestError;
use crate::frame::FrameShape;

/// Ratio between uncompressed frame data and encoded file size observed on
/// typical behavioural recordings.
pub const DEFAULT_INFLATION_FACTOR: u64 = 70;

/// Memory budget for one chunk when none is configured (1 GB).
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 1_000_000_000;

/// How a video's frames are grouped for streamed writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPlan {
    /// The whole video in one chunk.
    Eager {
        /// Frames in the video.
        total_frames: u64,
    },
    /// As many frames per chunk as fit in `budget_bytes`.
    MemoryBudget {
        /// Budget the chunk size was derived from.
        budget_bytes: u64,
        /// `max(1, floor(budget_bytes / bytes_per_frame))`.
        frames_per_chunk: u64,
    },
    /// A caller-supplied chunk shape; its first extent counts frames.
    ExplicitShape(Vec<usize>),
}

impl ChunkPlan {
    /// Frames per chunk, always at least one.
    pub fn frames_per_chunk(&self) -> u64 {
        match self {
            ChunkPlan::Eager { total_frames } => (*total_frames).max(1),
            ChunkPlan::MemoryBudget {
                frames_per_chunk, ..
            } => (*frames_per_chunk).max(1),
            ChunkPlan::ExplicitShape(shape) => {
                shape.first().map_or(1, |&frames| frames.max(1) as u64)
            }
        }
    }

    /// Full destination chunk shape: `[frames, height, width, channels]`, or
    /// the explicit shape as given.
    pub fn chunk_shape(&self, frame_shape: FrameShape) -> Vec<usize> {
        match self {
            ChunkPlan::ExplicitShape(shape) => shape.clone(),
            _ => vec![
                self.frames_per_chunk() as usize,
                frame_shape.height,
                frame_shape.width,
                frame_shape.channels,
            ],
        }
    }

    /// `true` unless the plan loads the whole video at once.
    pub fn is_chunked(&self) -> bool {
        !matches!(self, ChunkPlan::Eager { .. })
    }
}

/// Advisory raised when eager loading was requested but would not fit in
/// memory, so chunked mode was forced. Conversion continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPressureWarning {
    /// Estimated uncompressed size in bytes.
    pub estimated_bytes: u64,
    /// Memory available when the decision was made, in bytes.
    pub available_bytes: u64,
}

impl Display for MemoryPressureWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Not enough memory (estimated {:.2} GB) to load movie file as array ({:.2} GB available); forcing chunked writes",
            self.estimated_bytes as f64 / 1e9,
            self.available_bytes as f64 / 1e9,
        )
    }
}

/// Inputs to a sizing decision for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingRequest {
    /// Size of the encoded file in bytes.
    pub file_size_bytes: u64,
    /// Frames that will be written.
    pub frame_count: u64,
    /// Bytes one decoded frame occupies.
    pub bytes_per_frame: u64,
    /// `false` requests eager (single-chunk) loading.
    pub chunk_data: bool,
    /// Budget override for one chunk, in bytes.
    pub memory_budget_bytes: Option<u64>,
    /// Chunk shape override.
    pub explicit_chunk_shape: Option<Vec<usize>>,
}

/// The outcome of [`BufferSizingPolicy::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingDecision {
    /// The plan to stream with.
    pub plan: ChunkPlan,
    /// Present when eager loading was overridden.
    pub warning: Option<MemoryPressureWarning>,
}

/// Chooses chunk sizes for streamed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizingPolicy {
    inflation_factor: u64,
}

impl Default for BufferSizingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSizingPolicy {
    /// A policy using [`DEFAULT_INFLATION_FACTOR`].
    pub fn new() -> Self {
        Self {
            inflation_factor: DEFAULT_INFLATION_FACTOR,
        }
    }

    /// Override the compressed-to-uncompressed inflation factor.
    #[must_use]
    pub fn with_inflation_factor(mut self, factor: u64) -> Self {
        self.inflation_factor = factor;
        self
    }

    /// The inflation factor in use.
    pub fn inflation_factor(&self) -> u64 {
        self.inflation_factor
    }

    /// Estimated in-memory size of a decoded file of `file_size_bytes`.
    pub fn estimate_uncompressed(&self, file_size_bytes: u64) -> u64 {
        file_size_bytes.saturating_mul(self.inflation_factor)
    }

    /// Decide how to chunk one video.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidChunkShape`] if an explicit shape is empty or has
    /// a zero extent.
    pub fn plan(
        &self,
        request: &SizingRequest,
        available_memory: u64,
    ) -> Result<SizingDecision, IngestError> {
        if let Some(shape) = &request.explicit_chunk_shape {
            if shape.is_empty() || shape.contains(&0) {
                return Err(IngestError::InvalidChunkShape(shape.clone()));
            }
            log::debug!("Using explicit chunk shape {shape:?}");
            return Ok(SizingDecision {
                plan: ChunkPlan::ExplicitShape(shape.clone()),
                warning: None,
            });
        }

        let estimate = self.estimate_uncompressed(request.file_size_bytes);
        let mut chunk_data = request.chunk_data;
        let mut warning = None;
        if !chunk_data && estimate >= available_memory {
            let advisory = MemoryPressureWarning {
                estimated_bytes: estimate,
                available_bytes: available_memory,
            };
            log::warn!("{advisory}");
            warning = Some(advisory);
            chunk_data = true;
        }

        let plan = if chunk_data {
            let budget_bytes = request
                .memory_budget_bytes
                .unwrap_or(DEFAULT_MEMORY_BUDGET_BYTES);
            let frames_per_chunk = frames_within_budget(budget_bytes, request.bytes_per_frame);
            log::debug!(
                "Chunking at {frames_per_chunk} frames ({budget_bytes} byte budget, {} bytes per frame)",
                request.bytes_per_frame
            );
            ChunkPlan::MemoryBudget {
                budget_bytes,
                frames_per_chunk,
            }
        } else {
            ChunkPlan::Eager {
                total_frames: request.frame_count,
            }
        };

        Ok(SizingDecision { plan, warning })
    }
}

/// `max(1, floor(budget_bytes / bytes_per_frame))`.
pub fn frames_within_budget(budget_bytes: u64, bytes_per_frame: u64) -> u64 {
    budget_bytes
        .checked_div(bytes_per_frame)
        .unwrap_or(budget_bytes)
        .max(1)
}

/// Reports how much memory is available for decoded frames.
pub trait MemoryProbe {
    /// Available memory in bytes.
    fn available_memory(&self) -> u64;
}

/// Queries the operating system on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_memory(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

/// A constant amount of memory, for reproducible runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn available_memory(&self) -> u64 {
        self.0
    }
}
