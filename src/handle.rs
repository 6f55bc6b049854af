//! The frame source: an explicitly scoped video handle.
//!
//! A [`VideoHandle`] is a small state machine over one decoder session:
//!
//! ```text
//!            open / reopen                 advance past last frame
//!  Closed ─────────────────▶ Open ─────────────────────────────────▶ Exhausted
//!    ▲                        │                                          │
//!    └──────── close ─────────┘◀────────────── reopen ───────────────────┘
//! ```
//!
//! The handle cannot be cloned, and iterating borrows it mutably (or, for
//! [`ChunkedWriteIterator`](crate::ChunkedWriteIterator), takes it by value),
//! so at most one iteration is ever active over a decoder. The decoder is
//! released when the last frame has been produced, when an iterator is dropped
//! early, on [`close`](VideoHandle::close), and when the handle is dropped.

use std::fmt::{Debug, Formatter, Result as FmtResult};
#[cfg(feature = "ffmpeg")]
use std::path::Path;

#[cfg(feature = "ffmpeg")]
use crate::decoder::FfmpegSource;
use crate::decoder::{FrameDecoder, StreamInfo, VideoSource};
use crate::error::IngestError;
use crate::frame::{FrameBuffer, FrameDtype, FrameShape};

/// Frame count ceiling applied in stub mode.
pub const STUB_FRAME_LIMIT: u64 = 10;

/// Options applied when a handle is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOptions {
    /// Truncate the video to at most [`STUB_FRAME_LIMIT`] frames, for fast
    /// dry runs.
    pub stub_mode: bool,
}

impl HandleOptions {
    /// Default options: the full video.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable stub mode.
    #[must_use]
    pub fn with_stub_mode(mut self, stub_mode: bool) -> Self {
        self.stub_mode = stub_mode;
        self
    }
}

/// Observable lifecycle state of a [`VideoHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No decoder is held. Reopen to read again.
    Closed,
    /// A decoder is held and frames can be read.
    Open,
    /// A full pass completed and the decoder was released. Reopen to read again.
    Exhausted,
}

enum Session {
    Closed,
    Open {
        decoder: Box<dyn FrameDecoder>,
        /// Frame the decoder will produce next, if known.
        decoder_position: Option<u64>,
    },
    Exhausted,
}

/// An open, decodable video.
///
/// # Example
///
/// ```
/// use movie_ingest::{FrameShape, SyntheticVideo, VideoHandle};
///
/// let mut handle = VideoHandle::open_source(SyntheticVideo::new(3, 30.0, FrameShape::new(2, 2, 3)))?;
/// let frames: Vec<_> = handle.frames()?.collect::<Result<_, _>>()?;
/// assert_eq!(frames.len(), 3);
///
/// // The pass released the decoder; a second pass needs an explicit reopen.
/// assert!(handle.frames().is_err());
/// handle.reopen()?;
/// assert_eq!(handle.frames()?.count(), 3);
/// # Ok::<(), movie_ingest::IngestError>(())
/// ```
pub struct VideoHandle {
    source: Box<dyn VideoSource>,
    options: HandleOptions,
    info: StreamInfo,
    frame_count: u64,
    cursor: u64,
    session: Session,
}

impl Debug for VideoHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoHandle")
            .field("location", &self.source.location())
            .field("state", &self.state())
            .field("frame_count", &self.frame_count)
            .field("cursor", &self.cursor)
            .field("stub_mode", &self.options.stub_mode)
            .finish_non_exhaustive()
    }
}

impl VideoHandle {
    /// Open a video file through FFmpeg.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ResourceUnavailable`] if the file cannot be
    /// opened, reports zero frames, or its first frame cannot be decoded.
    #[cfg(feature = "ffmpeg")]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        Self::open_source_with(FfmpegSource::new(path), HandleOptions::default())
    }

    /// Open a video file through FFmpeg with explicit options.
    #[cfg(feature = "ffmpeg")]
    pub fn open_with<P: AsRef<Path>>(path: P, options: HandleOptions) -> Result<Self, IngestError> {
        Self::open_source_with(FfmpegSource::new(path), options)
    }

    /// Open any [`VideoSource`].
    pub fn open_source<S: VideoSource + 'static>(source: S) -> Result<Self, IngestError> {
        Self::open_source_with(source, HandleOptions::default())
    }

    /// Open any [`VideoSource`] with explicit options.
    pub fn open_source_with<S: VideoSource + 'static>(
        source: S,
        options: HandleOptions,
    ) -> Result<Self, IngestError> {
        Self::open_boxed(Box::new(source), options)
    }

    pub(crate) fn open_boxed(
        source: Box<dyn VideoSource>,
        options: HandleOptions,
    ) -> Result<Self, IngestError> {
        log::debug!("Opening video handle for {}", source.location().display());
        let (decoder, decoder_position) = start_session(source.as_ref())?;
        let info = decoder.info().clone();
        let frame_count = if options.stub_mode {
            info.frame_count.min(STUB_FRAME_LIMIT)
        } else {
            info.frame_count
        };

        Ok(Self {
            source,
            options,
            info,
            frame_count,
            cursor: 0,
            session: Session::Open {
                decoder,
                decoder_position,
            },
        })
    }

    /// Number of frames this handle will produce (capped in stub mode).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Nominal frames per second reported by the container.
    pub fn frames_per_second(&self) -> f64 {
        self.info.frames_per_second
    }

    /// Shape of every frame.
    pub fn frame_shape(&self) -> FrameShape {
        self.info.frame_shape
    }

    /// Sample type of every decoded frame.
    pub fn frame_dtype(&self) -> FrameDtype {
        self.info.frame_dtype
    }

    /// Bytes one decoded frame occupies.
    pub fn bytes_per_frame(&self) -> u64 {
        self.info.frame_shape.byte_size(self.info.frame_dtype)
    }

    /// Everything resolved about the stream at open time.
    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    /// Index of the frame the next sequential step will produce.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        match self.session {
            Session::Closed => HandleState::Closed,
            Session::Open { .. } => HandleState::Open,
            Session::Exhausted => HandleState::Exhausted,
        }
    }

    /// Whether the handle was opened in stub mode.
    pub fn is_stub(&self) -> bool {
        self.options.stub_mode
    }

    /// The source this handle reads from.
    pub fn source(&self) -> &dyn VideoSource {
        self.source.as_ref()
    }

    /// Decode frame `index` without disturbing the sequential cursor.
    ///
    /// A frame after the first that fails to decode comes back as
    /// [`FrameBuffer::Corrupt`] so output keeps its shape.
    ///
    /// # Errors
    ///
    /// - [`IngestError::FrameOutOfRange`] if `index >= frame_count()`.
    /// - [`IngestError::ResourceUnavailable`] if frame 0 cannot be decoded.
    /// - Any error from the stream itself (a failed seek or read), which no
    ///   placeholder can stand in for.
    /// - [`IngestError::HandleClosed`] / [`IngestError::HandleExhausted`] if
    ///   no decoder is held.
    pub fn read_frame(&mut self, index: u64) -> Result<FrameBuffer, IngestError> {
        if index >= self.frame_count {
            return Err(IngestError::FrameOutOfRange {
                frame_number: index,
                total_frames: self.frame_count,
            });
        }
        self.decode_at(index)
    }

    /// Release the decoder. Calling this on a handle that holds no decoder
    /// does nothing.
    pub fn close(&mut self) {
        if let Session::Open { .. } = self.session {
            log::debug!("Releasing decoder for {}", self.source.location().display());
            self.session = Session::Closed;
            self.cursor = 0;
        }
    }

    /// Acquire a fresh decoder after [`close`](VideoHandle::close) or a
    /// completed pass. Does nothing if the handle is already open.
    pub fn reopen(&mut self) -> Result<(), IngestError> {
        if let Session::Open { .. } = self.session {
            return Ok(());
        }
        log::debug!("Reopening {}", self.source.location().display());
        let (decoder, decoder_position) = start_session(self.source.as_ref())?;
        self.session = Session::Open {
            decoder,
            decoder_position,
        };
        self.cursor = 0;
        Ok(())
    }

    /// Iterate over every frame in order, once.
    ///
    /// The returned iterator holds the handle's only decoder for its whole
    /// lifetime. Completing the pass leaves the handle
    /// [`Exhausted`](HandleState::Exhausted); dropping the iterator early
    /// leaves it [`Closed`](HandleState::Closed).
    ///
    /// # Errors
    ///
    /// [`IngestError::HandleExhausted`] after a completed pass and
    /// [`IngestError::HandleClosed`] after a close; call
    /// [`reopen`](VideoHandle::reopen) first.
    pub fn frames(&mut self) -> Result<FrameIter<'_>, IngestError> {
        self.ensure_fresh()?;
        Ok(FrameIter {
            handle: self,
            finished: false,
        })
    }

    pub(crate) fn ensure_fresh(&self) -> Result<(), IngestError> {
        match self.session {
            Session::Open { .. } => Ok(()),
            Session::Closed => Err(IngestError::HandleClosed),
            Session::Exhausted => Err(IngestError::HandleExhausted),
        }
    }

    /// Produce the frame under the cursor and advance. Reaching the end
    /// releases the decoder, resets the cursor, and yields `None`.
    pub(crate) fn advance(&mut self) -> Option<Result<FrameBuffer, IngestError>> {
        match self.session {
            Session::Open { .. } => {}
            Session::Closed => return Some(Err(IngestError::HandleClosed)),
            Session::Exhausted => return None,
        }

        if self.cursor >= self.frame_count {
            log::debug!(
                "Finished {} after {} frames",
                self.source.location().display(),
                self.frame_count
            );
            self.session = Session::Exhausted;
            self.cursor = 0;
            return None;
        }

        let index = self.cursor;
        self.cursor += 1;
        match self.decode_at(index) {
            Ok(frame) => Some(Ok(frame)),
            Err(error) => {
                self.close();
                Some(Err(error))
            }
        }
    }

    /// Run `operation` against the open decoder, then reset both the decoder
    /// and the cursor to frame 0.
    pub(crate) fn with_rewound_decoder<T>(
        &mut self,
        operation: impl FnOnce(&mut dyn FrameDecoder) -> Result<T, IngestError>,
    ) -> Result<T, IngestError> {
        let (decoder, decoder_position) = match &mut self.session {
            Session::Open {
                decoder,
                decoder_position,
            } => (decoder, decoder_position),
            Session::Closed => return Err(IngestError::HandleClosed),
            Session::Exhausted => return Err(IngestError::HandleExhausted),
        };
        let result = operation(decoder.as_mut());
        *decoder_position = None;
        self.cursor = 0;
        result
    }

    fn decode_at(&mut self, index: u64) -> Result<FrameBuffer, IngestError> {
        let (decoder, decoder_position) = match &mut self.session {
            Session::Open {
                decoder,
                decoder_position,
            } => (decoder, decoder_position),
            Session::Closed => return Err(IngestError::HandleClosed),
            Session::Exhausted => return Err(IngestError::HandleExhausted),
        };

        let outcome = if *decoder_position == Some(index) {
            decoder.decode_next()
        } else {
            decoder.seek(index).and_then(|()| decoder.decode_next())
        };

        let reason = match outcome {
            Ok(Some(pixels)) => {
                *decoder_position = Some(index + 1);
                return Ok(FrameBuffer::Pixels(pixels));
            }
            Ok(None) => {
                *decoder_position = None;
                "decoder reached the end of the stream early".to_string()
            }
            // Only this frame was lost; the decoder has moved past it.
            Err(IngestError::VideoDecodeError(reason)) => {
                *decoder_position = Some(index + 1);
                reason
            }
            Err(error) => {
                *decoder_position = None;
                if index > 0 {
                    return Err(error);
                }
                error.to_string()
            }
        };

        if index == 0 {
            return Err(IngestError::ResourceUnavailable {
                path: self.source.location().to_path_buf(),
                reason: format!("first frame is unreadable: {reason}"),
            });
        }

        log::warn!(
            "Frame {index} of {} could not be decoded ({reason}); substituting a corrupt-frame placeholder",
            self.source.location().display()
        );
        Ok(FrameBuffer::Corrupt {
            index,
            shape: self.info.frame_shape,
        })
    }
}

impl Drop for VideoHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a decoder and prove the source is usable: it must report at least
/// one frame and its first frame must decode.
fn start_session(
    source: &dyn VideoSource,
) -> Result<(Box<dyn FrameDecoder>, Option<u64>), IngestError> {
    let unavailable = |reason: String| IngestError::ResourceUnavailable {
        path: source.location().to_path_buf(),
        reason,
    };

    let mut decoder = source.open_decoder()?;
    if decoder.info().frame_count == 0 {
        return Err(unavailable("video has no readable frames".to_string()));
    }

    match decoder.seek(0).and_then(|()| decoder.decode_next()) {
        Ok(Some(_)) => Ok((decoder, Some(1))),
        Ok(None) => Err(unavailable("unable to read the first frame".to_string())),
        Err(error) => Err(unavailable(format!("unable to read the first frame: {error}"))),
    }
}

/// A single pass over a [`VideoHandle`]'s frames, in order.
///
/// Created by [`VideoHandle::frames`]. Yields `Result<FrameBuffer, _>`; after
/// the first error the iterator is finished.
#[derive(Debug)]
pub struct FrameIter<'a> {
    handle: &'a mut VideoHandle,
    finished: bool,
}

impl Iterator for FrameIter<'_> {
    type Item = Result<FrameBuffer, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.handle.advance();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining = self.handle.frame_count().saturating_sub(self.handle.cursor()) as usize;
        (0, Some(remaining))
    }
}

impl Drop for FrameIter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.handle.close();
        }
    }
}
