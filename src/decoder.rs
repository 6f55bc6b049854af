//! Decoding capability seam.
//!
//! [`VideoSource`] describes *where* frames come from and can open any number
//! of independent decoders over it; [`FrameDecoder`] is one open decoding
//! session. [`VideoHandle`](crate::VideoHandle) owns at most one decoder at a
//! time and drives it through the [`FrameDecoder`] methods only, so the
//! backend (FFmpeg, or the in-memory [`SyntheticVideo`](crate::SyntheticVideo))
//! is chosen once when the source is built and never re-examined per call.
//!
//! With the `ffmpeg` feature (on by default), [`FfmpegSource`] decodes real
//! container files through `ffmpeg-next`.

use std::path::Path;

use ndarray::Array3;

use crate::error::IngestError;
use crate::frame::{FrameDtype, FrameShape};

/// How a decoder arrived at its frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCountOrigin {
    /// Read from the container's own frame count field.
    Container,
    /// Estimated from container duration and nominal frame rate.
    Estimated,
    /// Known exactly (in-memory sources).
    Exact,
}

/// Stream properties resolved once when a decoder is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Total decodable frames.
    pub frame_count: u64,
    /// How `frame_count` was obtained.
    pub frame_count_origin: FrameCountOrigin,
    /// Nominal frames per second reported by the container.
    pub frames_per_second: f64,
    /// Shape of every decoded frame.
    pub frame_shape: FrameShape,
    /// Sample type of every decoded frame.
    pub frame_dtype: FrameDtype,
    /// Codec name (e.g. `"mjpeg"`, `"h264"`, or `"synthetic"`).
    pub codec: String,
}

/// One open decoding session.
///
/// Decoders are positional: [`seek`](FrameDecoder::seek) chooses the frame the
/// next [`decode_next`](FrameDecoder::decode_next) returns, and each
/// successful `decode_next` advances that position by one. Implementations are
/// not required to be thread-safe and are never shared.
pub trait FrameDecoder {
    /// Properties resolved at open time.
    fn info(&self) -> &StreamInfo;

    /// Position the decoder so the next [`decode_next`](FrameDecoder::decode_next)
    /// yields frame `frame_number`.
    fn seek(&mut self, frame_number: u64) -> Result<(), IngestError>;

    /// Decode the frame at the current position and advance by one.
    ///
    /// Returns `Ok(None)` when the stream has no more frames.
    /// [`IngestError::VideoDecodeError`] means only the current frame was
    /// lost: the position still advances by one and decoding can continue.
    /// Any other error is a failure of the stream itself; the position is then
    /// unspecified and the caller must seek.
    fn decode_next(&mut self) -> Result<Option<Array3<u8>>, IngestError>;

    /// Presentation time of every frame in display order, in seconds relative
    /// to the first frame, without decoding pixels. With a `limit`, only the
    /// first `limit` frames are wanted and the scan stops early. Leaves the
    /// decoder positioned at frame 0.
    fn scan_timestamps(&mut self, limit: Option<u64>) -> Result<Vec<f64>, IngestError>;
}

/// Something a [`VideoHandle`](crate::VideoHandle) can open (and reopen).
pub trait VideoSource {
    /// Open a fresh, independent decoder positioned at frame 0.
    fn open_decoder(&self) -> Result<Box<dyn FrameDecoder>, IngestError>;

    /// Path used for naming and error messages.
    fn location(&self) -> &Path;

    /// Path a destination can link to in reference mode. `None` when the
    /// source does not exist on disk.
    fn external_path(&self) -> Option<&Path> {
        Some(self.location())
    }

    /// Size of the encoded source in bytes, the input to buffer sizing.
    fn byte_size(&self) -> Result<u64, IngestError>;
}

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg_backend::{FfmpegDecoder, FfmpegSource};

#[cfg(feature = "ffmpeg")]
mod ffmpeg_backend {
    use std::path::{Path, PathBuf};

    use ffmpeg_next::{
        Error as FfmpegError, Packet, Rational,
        codec::context::Context as CodecContext,
        decoder::Video as VideoDecoder,
        format::{Pixel, context::Input},
        frame::Video as VideoFrame,
        media::Type,
        software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    };
    use ndarray::Array3;

    use super::{FrameCountOrigin, FrameDecoder, StreamInfo, VideoSource};
    use crate::error::IngestError;
    use crate::frame::{FrameDtype, FrameShape};
    use crate::utilities::{
        frame_rank, frame_to_buffer, pts_to_seconds, pts_to_seek_timestamp, usable_frame_rate,
    };

    /// `AV_NOPTS_VALUE`.
    const NO_PTS: i64 = i64::MIN;

    /// Packets read past a scan limit so that reordered B-frames still sort
    /// into the first `limit` display positions.
    const REORDER_MARGIN: u64 = 16;

    /// A video file decoded through FFmpeg.
    #[derive(Debug, Clone)]
    pub struct FfmpegSource {
        path: PathBuf,
    }

    impl FfmpegSource {
        /// Describe the file at `path`. Nothing is opened until a handle asks.
        pub fn new<P: AsRef<Path>>(path: P) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }
    }

    impl VideoSource for FfmpegSource {
        fn open_decoder(&self) -> Result<Box<dyn FrameDecoder>, IngestError> {
            Ok(Box::new(FfmpegDecoder::open(&self.path)?))
        }

        fn location(&self) -> &Path {
            &self.path
        }

        fn byte_size(&self) -> Result<u64, IngestError> {
            Ok(std::fs::metadata(&self.path)?.len())
        }
    }

    /// An open FFmpeg demuxer + decoder + pixel converter for one video stream.
    pub struct FfmpegDecoder {
        input_context: Input,
        decoder: VideoDecoder,
        scaler: ScalingContext,
        stream_index: usize,
        time_base: Rational,
        start_pts: i64,
        info: StreamInfo,
        decoded_frame: VideoFrame,
        converted_frame: VideoFrame,
        /// Frame index the next `decode_next` must return.
        next_frame: u64,
        /// A frame decoded ahead of the one requested (the requested one was
        /// missing from the stream).
        pending: Option<(u64, Array3<u8>)>,
        eof_sent: bool,
        /// Every frame's PTS in display order, once a complete packet scan
        /// has run. Decoded frames are indexed by their rank in this table.
        frame_pts: Option<Vec<i64>>,
        /// Display index of the next decoded frame while no table is known.
        /// Only sequential decoding from frame 0 happens without a table.
        sequential_rank: u64,
    }

    impl FfmpegDecoder {
        /// Open `path` and resolve stream properties and pixel conversion once.
        pub fn open(path: &Path) -> Result<Self, IngestError> {
            let unavailable = |reason: String| IngestError::ResourceUnavailable {
                path: path.to_path_buf(),
                reason,
            };

            crate::ffmpeg::initialize()
                .map_err(|error| unavailable(format!("FFmpeg initialisation failed: {error}")))?;

            let input_context =
                ffmpeg_next::format::input(&path).map_err(|error| unavailable(error.to_string()))?;

            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or_else(|| unavailable("no video stream found".to_string()))?;
            let stream_index = stream.index();
            let time_base = stream.time_base();
            let start_pts = match stream.start_time() {
                NO_PTS => 0,
                pts => pts,
            };

            let decoder_context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| unavailable(format!("unreadable codec parameters: {error}")))?;
            let decoder = decoder_context
                .decoder()
                .video()
                .map_err(|error| unavailable(format!("no decoder for stream: {error}")))?;

            let average = stream.avg_frame_rate();
            let nominal = stream.rate();
            let frames_per_second = usable_frame_rate(&[
                (average.numerator(), average.denominator()),
                (nominal.numerator(), nominal.denominator()),
            ])
            .ok_or_else(|| unavailable("stream reports no usable frame rate".to_string()))?;

            let (frame_count, frame_count_origin) = if stream.frames() > 0 {
                (stream.frames() as u64, FrameCountOrigin::Container)
            } else {
                let duration_seconds = if stream.duration() > 0 {
                    pts_to_seconds(stream.duration(), time_base)
                } else {
                    input_context.duration().max(0) as f64 / 1_000_000.0
                };
                (
                    (duration_seconds * frames_per_second).round() as u64,
                    FrameCountOrigin::Estimated,
                )
            };

            let (output_pixel, channels) = match decoder.format() {
                Pixel::GRAY8
                | Pixel::GRAY16BE
                | Pixel::GRAY16LE
                | Pixel::MONOBLACK
                | Pixel::MONOWHITE => (Pixel::GRAY8, 1),
                _ => (Pixel::RGB24, 3),
            };

            let scaler = ScalingContext::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                output_pixel,
                decoder.width(),
                decoder.height(),
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| unavailable(format!("unsupported pixel format: {error}")))?;

            let codec = decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            let info = StreamInfo {
                frame_count,
                frame_count_origin,
                frames_per_second,
                frame_shape: FrameShape::new(
                    decoder.height() as usize,
                    decoder.width() as usize,
                    channels,
                ),
                frame_dtype: FrameDtype::U8,
                codec,
            };

            log::debug!(
                "Opened {} (stream={stream_index}, frames={frame_count} {:?}, fps={frames_per_second:.3}, shape={})",
                path.display(),
                frame_count_origin,
                info.frame_shape,
            );

            Ok(Self {
                input_context,
                decoder,
                scaler,
                stream_index,
                time_base,
                start_pts,
                info,
                decoded_frame: VideoFrame::empty(),
                converted_frame: VideoFrame::empty(),
                next_frame: 0,
                pending: None,
                eof_sent: false,
                frame_pts: None,
                sequential_rank: 0,
            })
        }

        /// Move the demuxer to the keyframe at or before `pts` and drop any
        /// decoder state.
        fn position_at(&mut self, pts: i64) -> Result<(), IngestError> {
            let target = pts_to_seek_timestamp(pts, self.time_base);
            self.input_context.seek(target, ..target)?;
            self.decoder.flush();
            self.pending = None;
            self.eof_sent = false;
            Ok(())
        }

        /// Read packet timestamps from the start of the stream, sorted into
        /// display order. With a `limit` the scan stops a few packets past
        /// it. The flag is `true` when the whole stream was read.
        fn scan_packet_pts(&mut self, limit: Option<u64>) -> Result<(Vec<i64>, bool), IngestError> {
            self.position_at(self.start_pts)?;
            let budget = limit.map(|limit| limit.saturating_add(REORDER_MARGIN));

            let mut pts_values: Vec<i64> = Vec::new();
            let mut packet = Packet::empty();
            let complete = loop {
                if budget.is_some_and(|budget| pts_values.len() as u64 >= budget) {
                    break false;
                }
                match packet.read(&mut self.input_context) {
                    Ok(()) => {
                        if packet.stream() != self.stream_index {
                            continue;
                        }
                        if let Some(pts) = packet.pts().or(packet.dts()) {
                            pts_values.push(pts);
                        }
                    }
                    Err(FfmpegError::Eof) => break true,
                    Err(error) => return Err(IngestError::from(error)),
                }
            };

            // Packets arrive in decode order; frames are wanted in display order.
            pts_values.sort_unstable();
            log::debug!(
                "Scanned {} packet timestamps (complete={complete})",
                pts_values.len()
            );
            Ok((pts_values, complete))
        }

        fn convert_decoded(&mut self) -> Result<Array3<u8>, IngestError> {
            self.scaler
                .run(&self.decoded_frame, &mut self.converted_frame)
                .map_err(|error| IngestError::VideoDecodeError(error.to_string()))?;
            let shape = self.info.frame_shape;
            let buffer =
                frame_to_buffer(&self.converted_frame, shape.width, shape.height, shape.channels);
            Ok(Array3::from_shape_vec(shape.as_tuple(), buffer)?)
        }

        fn missing(&self, target: u64) -> IngestError {
            IngestError::VideoDecodeError(format!("frame {target} is missing from the stream"))
        }
    }

    impl FrameDecoder for FfmpegDecoder {
        fn info(&self) -> &StreamInfo {
            &self.info
        }

        fn seek(&mut self, frame_number: u64) -> Result<(), IngestError> {
            if frame_number > 0 && self.frame_pts.is_none() {
                let (table, _) = self.scan_packet_pts(None)?;
                self.frame_pts = Some(table);
            }
            let target_pts = if frame_number == 0 {
                Some(self.start_pts)
            } else {
                self.frame_pts
                    .as_deref()
                    .and_then(|table| table.get(frame_number as usize).copied())
            };

            self.next_frame = frame_number;
            self.sequential_rank = frame_number;
            match target_pts {
                Some(pts) => {
                    log::debug!("Seeking to frame {frame_number} (pts={pts})");
                    self.position_at(pts)
                }
                None => {
                    log::debug!("Frame {frame_number} lies past the last packet");
                    self.decoder.flush();
                    self.pending = None;
                    self.eof_sent = true;
                    Ok(())
                }
            }
        }

        fn decode_next(&mut self) -> Result<Option<Array3<u8>>, IngestError> {
            let target = self.next_frame;

            if let Some(pending_number) = self.pending.as_ref().map(|(number, _)| *number) {
                self.next_frame += 1;
                if pending_number > target {
                    return Err(self.missing(target));
                }
                if let Some((_, pixels)) = self.pending.take() {
                    return Ok(Some(pixels));
                }
            }

            let mut packet = Packet::empty();
            loop {
                if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                    let pts = self
                        .decoded_frame
                        .timestamp()
                        .or(self.decoded_frame.pts())
                        .unwrap_or(self.start_pts);
                    let frame_number = match self.frame_pts.as_deref() {
                        Some(table) if !table.is_empty() => frame_rank(table, pts, target),
                        _ => self.sequential_rank,
                    };
                    self.sequential_rank = frame_number + 1;

                    if frame_number < target {
                        continue;
                    }
                    self.next_frame += 1;
                    let pixels = self.convert_decoded()?;
                    if frame_number > target {
                        self.pending = Some((frame_number, pixels));
                        return Err(self.missing(target));
                    }
                    return Ok(Some(pixels));
                }

                if self.eof_sent {
                    return Ok(None);
                }

                match packet.read(&mut self.input_context) {
                    Ok(()) => {
                        if packet.stream() != self.stream_index {
                            continue;
                        }
                        if let Err(error) = self.decoder.send_packet(&packet) {
                            // A damaged packet only costs the frames it carried.
                            log::debug!("Dropping undecodable packet: {error}");
                        }
                    }
                    Err(FfmpegError::Eof) => {
                        self.decoder.send_eof()?;
                        self.eof_sent = true;
                    }
                    Err(error) => return Err(IngestError::from(error)),
                }
            }
        }

        fn scan_timestamps(&mut self, limit: Option<u64>) -> Result<Vec<f64>, IngestError> {
            let (table, complete) = self.scan_packet_pts(limit)?;
            let first = table.first().copied().unwrap_or(0);
            let wanted = limit.map_or(table.len(), |limit| table.len().min(limit as usize));
            let timestamps = table[..wanted]
                .iter()
                .map(|&pts| pts_to_seconds(pts - first, self.time_base))
                .collect();

            if complete {
                self.frame_pts = Some(table);
            }
            self.seek(0)?;
            Ok(timestamps)
        }
    }
}
