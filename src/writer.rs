//! Destination writers.
//!
//! The converter hands every series to a [`DestinationWriter`]. Reference-mode
//! series arrive as a single [`ExternalSeriesRecord`]; embedded series arrive
//! as an [`EmbeddedSeriesRecord`] together with the [`ChunkedWriteIterator`]
//! that produces their frames, which the writer drains at its own pace.
//!
//! Two writers ship with the crate:
//!
//! - [`InMemoryWriter`] keeps everything it receives. Useful for dry runs and
//!   for inspecting a conversion.
//! - [`JsonManifestWriter`] describes every series in a `manifest.json` and
//!   streams embedded frames, one chunk at a time, into raw little-endian
//!   `f32` sidecar files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::chunked::{ChunkedWriteIterator, FrameChunk};
use crate::config::{CompressionCodec, SeriesPlacement};
use crate::error::IngestError;
use crate::frame::FrameShape;
use crate::timestamps::SeriesTiming;

/// File name of the manifest written by [`JsonManifestWriter`].
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Name, description and unit of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescription {
    /// Unique series name, e.g. `"Video: mouse_cam"`.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Unit of the stored values.
    pub unit: String,
}

/// A series that links to its video file instead of storing frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSeriesRecord {
    /// Name, description and unit.
    pub description: SeriesDescription,
    /// Rate or explicit timestamps.
    pub timing: SeriesTiming,
    /// The linked video file.
    pub external_file: PathBuf,
    /// Where the series goes.
    pub placement: SeriesPlacement,
}

/// A series whose frames are embedded in the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedSeriesRecord {
    /// Name, description and unit.
    pub description: SeriesDescription,
    /// Rate or explicit timestamps.
    pub timing: SeriesTiming,
    /// Requested compression for the frame data.
    pub compression: CompressionCodec,
    /// Destination chunk shape.
    pub chunk_shape: Vec<usize>,
    /// Full data shape: `[frames, height, width, channels]`.
    pub maxshape: Vec<usize>,
    /// Where the series goes.
    pub placement: SeriesPlacement,
}

/// Receives converted series.
pub trait DestinationWriter {
    /// Record a series that links to an external file.
    fn add_external_series(&mut self, record: ExternalSeriesRecord) -> Result<(), IngestError>;

    /// Record a series and consume `frames`, its lazy frame stream.
    ///
    /// Implementations should pull frames incrementally; the stream's decoder
    /// is released once it is drained or dropped.
    fn add_embedded_series(
        &mut self,
        record: EmbeddedSeriesRecord,
        frames: ChunkedWriteIterator,
    ) -> Result<(), IngestError>;
}

/// A series as stored by [`InMemoryWriter`].
#[derive(Debug, Clone, PartialEq)]
pub enum WrittenSeries {
    /// A reference-mode series.
    External(ExternalSeriesRecord),
    /// An embedded series and the chunks drained from its stream.
    Embedded {
        /// The series record.
        record: EmbeddedSeriesRecord,
        /// Chunks in stream order.
        chunks: Vec<FrameChunk>,
    },
}

impl WrittenSeries {
    /// Name, description and unit of the series.
    pub fn description(&self) -> &SeriesDescription {
        match self {
            WrittenSeries::External(record) => &record.description,
            WrittenSeries::Embedded { record, .. } => &record.description,
        }
    }

    /// Timing of the series.
    pub fn timing(&self) -> &SeriesTiming {
        match self {
            WrittenSeries::External(record) => &record.timing,
            WrittenSeries::Embedded { record, .. } => &record.timing,
        }
    }

    /// Placement of the series.
    pub fn placement(&self) -> &SeriesPlacement {
        match self {
            WrittenSeries::External(record) => &record.placement,
            WrittenSeries::Embedded { record, .. } => &record.placement,
        }
    }

    /// Stored chunks; empty for external series.
    pub fn chunks(&self) -> &[FrameChunk] {
        match self {
            WrittenSeries::External(_) => &[],
            WrittenSeries::Embedded { chunks, .. } => chunks,
        }
    }
}

/// Keeps every series in memory, in the order received.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    series: Vec<WrittenSeries>,
}

impl InMemoryWriter {
    /// An empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn series(&self) -> &[WrittenSeries] {
        &self.series
    }

    /// Number of series written.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Consume the writer, returning the series.
    pub fn into_series(self) -> Vec<WrittenSeries> {
        self.series
    }
}

impl DestinationWriter for InMemoryWriter {
    fn add_external_series(&mut self, record: ExternalSeriesRecord) -> Result<(), IngestError> {
        self.series.push(WrittenSeries::External(record));
        Ok(())
    }

    fn add_embedded_series(
        &mut self,
        record: EmbeddedSeriesRecord,
        frames: ChunkedWriteIterator,
    ) -> Result<(), IngestError> {
        let chunks = frames.chunks().collect::<Result<Vec<_>, _>>()?;
        self.series.push(WrittenSeries::Embedded { record, chunks });
        Ok(())
    }
}

/// Writes a JSON manifest plus one raw `f32` sidecar per embedded series.
///
/// Sidecars hold frames back to back in `[frame, row, column, channel]` order,
/// little-endian. Corrupt frames are written as NaN. Sidecars are not
/// compressed; the record's codec is kept as `requested_compression` for the
/// container that ingests them. Call [`finish`](JsonManifestWriter::finish)
/// to write the manifest.
#[derive(Debug)]
pub struct JsonManifestWriter {
    directory: PathBuf,
    acquisition: Vec<Value>,
    modules: BTreeMap<String, (String, Vec<Value>)>,
    series_written: usize,
    overwrite: bool,
}

impl JsonManifestWriter {
    /// Prepare `directory` for output, creating it if needed.
    ///
    /// # Errors
    ///
    /// [`IngestError::WriteError`] if a manifest already exists there and
    /// `overwrite` is `false` (sidecars are checked the same way as they are
    /// written); [`IngestError::IoError`] if the directory
    /// cannot be created.
    pub fn create<P: AsRef<Path>>(directory: P, overwrite: bool) -> Result<Self, IngestError> {
        let directory = directory.as_ref().to_path_buf();
        let manifest = directory.join(MANIFEST_FILE_NAME);
        if manifest.exists() && !overwrite {
            return Err(IngestError::WriteError(format!(
                "{} already exists",
                manifest.display()
            )));
        }
        fs::create_dir_all(&directory)?;
        log::debug!("Writing manifest output to {}", directory.display());
        Ok(Self {
            directory,
            acquisition: Vec::new(),
            modules: BTreeMap::new(),
            series_written: 0,
            overwrite,
        })
    }

    /// The output directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `manifest.json` and return its path.
    ///
    /// # Errors
    ///
    /// I/O or serialisation failures.
    pub fn finish(self) -> Result<PathBuf, IngestError> {
        let processing: serde_json::Map<String, Value> = self
            .modules
            .into_iter()
            .map(|(name, (description, series))| {
                (
                    name,
                    json!({ "description": description, "data_interfaces": series }),
                )
            })
            .collect();
        let manifest = json!({
            "acquisition": self.acquisition,
            "processing": processing,
        });

        let path = self.directory.join(MANIFEST_FILE_NAME);
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, &manifest)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    fn place(&mut self, placement: &SeriesPlacement, entry: Value) {
        match placement {
            SeriesPlacement::Acquisition => self.acquisition.push(entry),
            SeriesPlacement::ProcessingModule { name, description } => self
                .modules
                .entry(name.clone())
                .or_insert_with(|| (description.clone(), Vec::new()))
                .1
                .push(entry),
        }
    }

    fn sidecar_name(&self, series_name: &str) -> String {
        let slug: String = series_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{:03}_{slug}.f32", self.series_written)
    }
}

impl DestinationWriter for JsonManifestWriter {
    fn add_external_series(&mut self, record: ExternalSeriesRecord) -> Result<(), IngestError> {
        let mut entry = series_json(&record.description, &record.timing);
        entry["format"] = json!("external");
        entry["external_file"] = json!([record.external_file.display().to_string()]);
        self.place(&record.placement, entry);
        self.series_written += 1;
        Ok(())
    }

    fn add_embedded_series(
        &mut self,
        record: EmbeddedSeriesRecord,
        frames: ChunkedWriteIterator,
    ) -> Result<(), IngestError> {
        let file_name = self.sidecar_name(&record.description.name);
        let path = self.directory.join(&file_name);
        if path.exists() && !self.overwrite {
            return Err(IngestError::WriteError(format!(
                "{} already exists",
                path.display()
            )));
        }
        let mut sidecar = BufWriter::new(File::create(&path)?);

        let mut frames_written = 0_u64;
        let mut chunks_written = 0_u64;
        let mut corrupt_frames = Vec::new();
        for chunk in frames.chunks() {
            let chunk = chunk?;
            for (offset, frame) in chunk.frames.iter().enumerate() {
                if frame.is_corrupt() {
                    corrupt_frames.push(chunk.start_frame + offset as u64);
                }
                for value in frame.to_f32().iter() {
                    sidecar.write_all(&value.to_le_bytes())?;
                }
                frames_written += 1;
            }
            chunks_written += 1;
        }
        sidecar.flush()?;
        log::debug!(
            "Streamed {frames_written} frames in {chunks_written} chunks to {}",
            path.display()
        );

        let mut entry = series_json(&record.description, &record.timing);
        entry["format"] = json!("raw");
        entry["data"] = json!({
            "file": file_name,
            "dtype": "float32",
            "byte_order": "little",
            "shape": record.maxshape,
            "chunk_shape": record.chunk_shape,
            "requested_compression": record.compression.name(),
            "frames_written": frames_written,
            "chunks_written": chunks_written,
            "corrupt_frames": corrupt_frames,
        });
        self.place(&record.placement, entry);
        self.series_written += 1;
        Ok(())
    }
}

fn series_json(description: &SeriesDescription, timing: &SeriesTiming) -> Value {
    let mut entry = json!({
        "name": description.name,
        "description": description.description,
        "unit": description.unit,
    });
    match timing {
        SeriesTiming::Rate {
            starting_time,
            rate,
        } => {
            entry["starting_time"] = json!(starting_time);
            entry["rate"] = json!(rate);
        }
        SeriesTiming::Timestamps(series) => {
            entry["timestamps"] = json!(series.values());
        }
    }
    entry
}

/// Byte length of a sidecar holding `frame_count` frames of `shape`.
pub fn sidecar_len(frame_count: u64, shape: FrameShape) -> u64 {
    frame_count * shape.element_count() as u64 * std::mem::size_of::<f32>() as u64
}
