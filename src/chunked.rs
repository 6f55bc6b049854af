//! Chunked write iteration.
//!
//! A [`ChunkedWriteIterator`] takes ownership of a [`VideoHandle`] and yields
//! its frames one at a time, in temporal order, for a streaming writer to
//! consume. Because it owns the handle, the decoder's lifetime spans exactly
//! the iteration: it is released after the last frame, or immediately if the
//! iterator is dropped early. The iterator is single-pass and cannot be
//! restarted.
//!
//! Writers that want whole chunks call [`ChunkedWriteIterator::chunks`],
//! which groups frames according to the [`ChunkPlan`] while holding only one
//! chunk in memory at a time.
//!
//! ```
//! use movie_ingest::{ChunkPlan, ChunkedWriteIterator, FrameShape, SyntheticVideo, VideoHandle};
//!
//! let handle = VideoHandle::open_source(SyntheticVideo::new(50, 25.0, FrameShape::new(4, 4, 3)))?;
//! let plan = ChunkPlan::MemoryBudget { budget_bytes: 480, frames_per_chunk: 10 };
//! let chunks = ChunkedWriteIterator::new(handle, plan)?
//!     .chunks()
//!     .collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(chunks.len(), 5);
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::error::IngestError;
use crate::frame::{FrameBuffer, FrameShape};
use crate::handle::{HandleState, VideoHandle};
use crate::progress::ProgressTracker;
use crate::sizing::ChunkPlan;

/// A lazy, finite, single-pass stream of frames sized by a [`ChunkPlan`].
pub struct ChunkedWriteIterator {
    handle: VideoHandle,
    plan: ChunkPlan,
    frames_yielded: u64,
    finished: bool,
    progress: Option<ProgressTracker>,
}

impl Debug for ChunkedWriteIterator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ChunkedWriteIterator")
            .field("handle", &self.handle)
            .field("plan", &self.plan)
            .field("frames_yielded", &self.frames_yielded)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ChunkedWriteIterator {
    /// Take ownership of `handle` and stream its frames under `plan`.
    ///
    /// # Errors
    ///
    /// [`IngestError::HandleClosed`] or [`IngestError::HandleExhausted`] if the
    /// handle holds no decoder.
    pub fn new(handle: VideoHandle, plan: ChunkPlan) -> Result<Self, IngestError> {
        handle.ensure_fresh()?;
        if handle.cursor() != 0 {
            log::debug!(
                "Chunked iteration over {} starts at frame {}",
                handle.source().location().display(),
                handle.cursor()
            );
        }
        Ok(Self {
            handle,
            plan,
            frames_yielded: 0,
            finished: false,
            progress: None,
        })
    }

    pub(crate) fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.progress = Some(tracker);
        self
    }

    /// The plan frames are grouped by.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Frames the full stream will yield.
    pub fn frame_count(&self) -> u64 {
        self.handle.frame_count()
    }

    /// Shape of each yielded frame.
    pub fn frame_shape(&self) -> FrameShape {
        self.handle.frame_shape()
    }

    /// Frames yielded so far.
    pub fn frames_yielded(&self) -> u64 {
        self.frames_yielded
    }

    /// Destination chunk shape for this stream.
    pub fn chunk_shape(&self) -> Vec<usize> {
        self.plan.chunk_shape(self.handle.frame_shape())
    }

    /// Full dataset shape: `[frames, height, width, channels]`.
    pub fn maxshape(&self) -> Vec<usize> {
        let shape = self.handle.frame_shape();
        vec![
            self.handle.frame_count() as usize,
            shape.height,
            shape.width,
            shape.channels,
        ]
    }

    /// Group the remaining frames into chunks of
    /// [`frames_per_chunk`](ChunkPlan::frames_per_chunk).
    pub fn chunks(self) -> FrameChunks {
        let frames_per_chunk = self.plan.frames_per_chunk() as usize;
        FrameChunks {
            frames: self,
            frames_per_chunk,
            next_index: 0,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(tracker) = self.progress.as_mut() {
            tracker.finish();
        }
    }
}

impl Iterator for ChunkedWriteIterator {
    type Item = Result<FrameBuffer, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.handle.advance() {
            Some(Ok(frame)) => {
                self.frames_yielded += 1;
                if let Some(tracker) = self.progress.as_mut() {
                    tracker.advance();
                }
                Some(Ok(frame))
            }
            Some(Err(error)) => {
                self.finish();
                Some(Err(error))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining = self
            .handle
            .frame_count()
            .saturating_sub(self.frames_yielded) as usize;
        (0, Some(remaining))
    }
}

impl Drop for ChunkedWriteIterator {
    fn drop(&mut self) {
        if self.handle.state() == HandleState::Open {
            log::debug!(
                "Chunked iteration over {} stopped after {} of {} frames",
                self.handle.source().location().display(),
                self.frames_yielded,
                self.handle.frame_count()
            );
            self.handle.close();
        }
    }
}

/// A contiguous run of frames destined for one write.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameChunk {
    /// Position of this chunk in the stream, from 0.
    pub index: u64,
    /// Index of the first frame in the chunk.
    pub start_frame: u64,
    /// The frames, in temporal order.
    pub frames: Vec<FrameBuffer>,
}

impl FrameChunk {
    /// Number of frames in the chunk.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` if the chunk holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Groups a [`ChunkedWriteIterator`] into [`FrameChunk`]s.
///
/// Every chunk but the last holds exactly `frames_per_chunk` frames. After an
/// error no further chunks are produced.
#[derive(Debug)]
pub struct FrameChunks {
    frames: ChunkedWriteIterator,
    frames_per_chunk: usize,
    next_index: u64,
    done: bool,
}

impl FrameChunks {
    /// Frames per full chunk.
    pub fn frames_per_chunk(&self) -> usize {
        self.frames_per_chunk
    }
}

impl Iterator for FrameChunks {
    type Item = Result<FrameChunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start_frame = self.frames.frames_yielded();
        let mut frames = Vec::with_capacity(self.frames_per_chunk.min(1024));
        while frames.len() < self.frames_per_chunk {
            match self.frames.next() {
                Some(Ok(frame)) => frames.push(frame),
                Some(Err(error)) => {
                    self.done = true;
                    return Some(Err(error));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if frames.is_empty() {
            return None;
        }
        let chunk = FrameChunk {
            index: self.next_index,
            start_frame,
            frames,
        };
        self.next_index += 1;
        Some(Ok(chunk))
    }
}
