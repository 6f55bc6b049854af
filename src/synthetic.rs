//! In-memory video sources.
//!
//! [`SyntheticVideo`] generates frames on demand without touching disk. It
//! backs dry runs and tests, and can simulate the failure modes real
//! recordings exhibit: frames that fail to decode, reads that fail outright,
//! unreadable first frames, sources that cannot be opened, and irregular frame
//! timing.
//!
//! Every frame `i` is filled with the value `i % 256`, so consumers can check
//! ordering by looking at any sample.
//!
//! ```
//! use movie_ingest::{FrameShape, SyntheticVideo, VideoHandle};
//!
//! let video = SyntheticVideo::new(10, 25.0, FrameShape::new(4, 4, 3)).with_corrupt_frame(5);
//! let mut handle = VideoHandle::open_source(video)?;
//! assert!(handle.read_frame(5)?.is_corrupt());
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```

use std::{
    cell::Cell,
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};

use ndarray::Array3;

use crate::decoder::{FrameCountOrigin, FrameDecoder, StreamInfo, VideoSource};
use crate::error::IngestError;
use crate::frame::{FrameDtype, FrameShape};

/// Counters shared by a video and all of its clones.
#[derive(Debug, Default)]
struct Activity {
    live_decoders: Cell<usize>,
    decoded_frames: Cell<u64>,
    seeks: Cell<u64>,
    packets_scanned: Cell<u64>,
}

impl Activity {
    fn bump(counter: &Cell<u64>, by: u64) {
        counter.set(counter.get() + by);
    }
}

/// A generated video with configurable defects.
///
/// Clones share their activity counters, so a test can hand one clone to a
/// handle and use another to check what the handle did with it.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    location: PathBuf,
    on_disk: bool,
    frame_count: u64,
    frames_per_second: f64,
    shape: FrameShape,
    corrupt_frames: BTreeSet<u64>,
    timestamps: Option<Vec<f64>>,
    byte_size: Option<u64>,
    unopenable: bool,
    failing_reads: BTreeSet<u64>,
    activity: Rc<Activity>,
}

impl SyntheticVideo {
    /// A video of `frame_count` frames of `shape` at `frames_per_second`.
    pub fn new(frame_count: u64, frames_per_second: f64, shape: FrameShape) -> Self {
        Self {
            location: PathBuf::from("synthetic.avi"),
            on_disk: false,
            frame_count,
            frames_per_second,
            shape,
            corrupt_frames: BTreeSet::new(),
            timestamps: None,
            byte_size: None,
            unopenable: false,
            failing_reads: BTreeSet::new(),
            activity: Rc::new(Activity::default()),
        }
    }

    /// Pretend the video lives at `path`, making it linkable in reference mode.
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.location = path.as_ref().to_path_buf();
        self.on_disk = true;
        self
    }

    /// Make frame `index` fail to decode.
    #[must_use]
    pub fn with_corrupt_frame(mut self, index: u64) -> Self {
        self.corrupt_frames.insert(index);
        self
    }

    /// Make reading frame `index` fail with an I/O error, as a truncated or
    /// unreachable file would, rather than with a decode error.
    #[must_use]
    pub fn with_failing_read(mut self, index: u64) -> Self {
        self.failing_reads.insert(index);
        self
    }

    /// Use explicit per-frame timestamps (seconds) instead of `i / fps`.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: Vec<f64>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    /// Report `bytes` as the encoded file size. Defaults to one seventieth of
    /// the raw frame data, roughly what a compressed recording occupies.
    #[must_use]
    pub fn with_byte_size(mut self, bytes: u64) -> Self {
        self.byte_size = Some(bytes);
        self
    }

    /// Make every open attempt fail.
    #[must_use]
    pub fn unopenable(mut self) -> Self {
        self.unopenable = true;
        self
    }

    /// Number of decoders over this video (or its clones) currently alive.
    pub fn live_decoders(&self) -> usize {
        self.activity.live_decoders.get()
    }

    /// Frames any decoder over this video has attempted to decode.
    pub fn decoded_frames(&self) -> u64 {
        self.activity.decoded_frames.get()
    }

    /// Seeks performed by any decoder over this video.
    pub fn seeks(&self) -> u64 {
        self.activity.seeks.get()
    }

    /// Packets read by timestamp scans over this video.
    pub fn packets_scanned(&self) -> u64 {
        self.activity.packets_scanned.get()
    }

    /// The fill value of frame `index`.
    pub fn fill_value(index: u64) -> u8 {
        (index % 256) as u8
    }
}

impl VideoSource for SyntheticVideo {
    fn open_decoder(&self) -> Result<Box<dyn FrameDecoder>, IngestError> {
        if self.unopenable {
            return Err(IngestError::ResourceUnavailable {
                path: self.location.clone(),
                reason: "synthetic source refuses to open".to_string(),
            });
        }
        let live = &self.activity.live_decoders;
        live.set(live.get() + 1);
        Ok(Box::new(SyntheticDecoder {
            info: StreamInfo {
                frame_count: self.frame_count,
                frame_count_origin: FrameCountOrigin::Exact,
                frames_per_second: self.frames_per_second,
                frame_shape: self.shape,
                frame_dtype: FrameDtype::U8,
                codec: "synthetic".to_string(),
            },
            corrupt_frames: self.corrupt_frames.clone(),
            failing_reads: self.failing_reads.clone(),
            timestamps: self.timestamps.clone(),
            position: 0,
            activity: Rc::clone(&self.activity),
        }))
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn external_path(&self) -> Option<&Path> {
        self.on_disk.then_some(self.location.as_path())
    }

    fn byte_size(&self) -> Result<u64, IngestError> {
        Ok(self.byte_size.unwrap_or_else(|| {
            (self.shape.byte_size(FrameDtype::U8) * self.frame_count / 70).max(1)
        }))
    }
}

struct SyntheticDecoder {
    info: StreamInfo,
    corrupt_frames: BTreeSet<u64>,
    failing_reads: BTreeSet<u64>,
    timestamps: Option<Vec<f64>>,
    position: u64,
    activity: Rc<Activity>,
}

impl FrameDecoder for SyntheticDecoder {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), IngestError> {
        Activity::bump(&self.activity.seeks, 1);
        self.position = frame_number.min(self.info.frame_count);
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<Array3<u8>>, IngestError> {
        let index = self.position;
        if index >= self.info.frame_count {
            return Ok(None);
        }
        if self.failing_reads.contains(&index) {
            return Err(IngestError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("synthetic read of frame {index} failed"),
            )));
        }
        Activity::bump(&self.activity.decoded_frames, 1);
        self.position += 1;
        if self.corrupt_frames.contains(&index) {
            return Err(IngestError::VideoDecodeError(format!(
                "synthetic frame {index} is corrupt"
            )));
        }
        Ok(Some(Array3::from_elem(
            self.info.frame_shape.as_tuple(),
            SyntheticVideo::fill_value(index),
        )))
    }

    fn scan_timestamps(&mut self, limit: Option<u64>) -> Result<Vec<f64>, IngestError> {
        self.position = 0;
        let available = self
            .timestamps
            .as_ref()
            .map_or(self.info.frame_count, |explicit| explicit.len() as u64);
        let wanted = limit.map_or(available, |limit| limit.min(available));
        let timestamps: Vec<f64> = match &self.timestamps {
            Some(explicit) => explicit.iter().copied().take(wanted as usize).collect(),
            None => (0..wanted)
                .map(|index| index as f64 / self.info.frames_per_second)
                .collect(),
        };
        Activity::bump(&self.activity.packets_scanned, timestamps.len() as u64);
        Ok(timestamps)
    }
}

impl Drop for SyntheticDecoder {
    fn drop(&mut self) {
        let live = &self.activity.live_decoders;
        live.set(live.get().saturating_sub(1));
    }
}
