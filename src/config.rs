//! Conversion configuration.
//!
//! [`ConversionOptions`] is a builder that carries every knob of a movie
//! conversion without widening the signature of
//! [`MovieConverter::run`](crate::MovieConverter::run).
//!
//! ```
//! use movie_ingest::{CompressionCodec, ConversionOptions};
//!
//! let options = ConversionOptions::new()
//!     .with_reference_mode(false)
//!     .with_memory_budget_bytes(256 * 1024 * 1024)
//!     .with_compression(CompressionCodec::Lzf)
//!     .with_starting_times(vec![0.0, 120.5]);
//! assert!(!options.reference_mode);
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

use crate::progress::{NoOpProgress, ProgressCallback};
use crate::sizing::DEFAULT_INFLATION_FACTOR;

/// Compression requested from the destination for embedded frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCodec {
    /// DEFLATE at the writer's default level.
    #[default]
    Gzip,
    /// LZF: fast, lighter compression.
    Lzf,
    /// Store uncompressed.
    None,
}

impl CompressionCodec {
    /// Name as understood by container writers.
    pub fn name(self) -> &'static str {
        match self {
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Lzf => "lzf",
            CompressionCodec::None => "none",
        }
    }
}

impl Display for CompressionCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionCodec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "gzip" | "deflate" => Ok(CompressionCodec::Gzip),
            "lzf" => Ok(CompressionCodec::Lzf),
            "none" | "off" => Ok(CompressionCodec::None),
            other => Err(format!("unsupported compression codec: {other}")),
        }
    }
}

/// Where in the destination a series is placed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SeriesPlacement {
    /// Raw acquired data. The default.
    #[default]
    Acquisition,
    /// A named processing module, created with `description` if missing.
    ProcessingModule {
        /// Module name.
        name: String,
        /// Module description.
        description: String,
    },
}

/// Description given to processing modules when none is supplied.
pub const DEFAULT_MODULE_DESCRIPTION: &str = "Processed data";

impl SeriesPlacement {
    /// Place series in processing module `name`, with an optional description.
    pub fn module(name: impl Into<String>, description: Option<String>) -> Self {
        SeriesPlacement::ProcessingModule {
            name: name.into(),
            description: description.unwrap_or_else(|| DEFAULT_MODULE_DESCRIPTION.to_string()),
        }
    }
}

/// Settings for one conversion run.
#[derive(Clone)]
pub struct ConversionOptions {
    /// Truncate each video to at most ten frames.
    pub stub_mode: bool,
    /// Link to the video files instead of embedding decoded frames.
    pub reference_mode: bool,
    /// Stream frames in chunks (`true`) or load each video eagerly. Eager
    /// loading is overridden when it would not fit in memory.
    pub chunk_data: bool,
    /// Start time of each file in seconds, one per file. When absent the first
    /// file starts at 0 and each later file starts at the previous file's
    /// last timestamp.
    pub starting_times: Option<Vec<f64>>,
    /// Memory budget for one chunk, in bytes.
    pub memory_budget_bytes: Option<u64>,
    /// Chunk shape override, used verbatim.
    pub explicit_chunk_shape: Option<Vec<usize>>,
    /// Compression for embedded data.
    pub compression: CompressionCodec,
    /// Encoded-to-decoded size ratio used to estimate memory needs.
    pub inflation_factor: u64,
    /// Destination placement of every series.
    pub placement: SeriesPlacement,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
}

impl Debug for ConversionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConversionOptions")
            .field("stub_mode", &self.stub_mode)
            .field("reference_mode", &self.reference_mode)
            .field("chunk_data", &self.chunk_data)
            .field("starting_times", &self.starting_times)
            .field("memory_budget_bytes", &self.memory_budget_bytes)
            .field("explicit_chunk_shape", &self.explicit_chunk_shape)
            .field("compression", &self.compression)
            .field("inflation_factor", &self.inflation_factor)
            .field("placement", &self.placement)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionOptions {
    /// Defaults: full videos, reference mode, chunked writes, gzip, no
    /// explicit starting times, inflation factor 70, acquisition placement.
    pub fn new() -> Self {
        Self {
            stub_mode: false,
            reference_mode: true,
            chunk_data: true,
            starting_times: None,
            memory_budget_bytes: None,
            explicit_chunk_shape: None,
            compression: CompressionCodec::Gzip,
            inflation_factor: DEFAULT_INFLATION_FACTOR,
            placement: SeriesPlacement::Acquisition,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Truncate every video to at most ten frames.
    #[must_use]
    pub fn with_stub_mode(mut self, stub_mode: bool) -> Self {
        self.stub_mode = stub_mode;
        self
    }

    /// Link (`true`) or embed (`false`).
    #[must_use]
    pub fn with_reference_mode(mut self, reference_mode: bool) -> Self {
        self.reference_mode = reference_mode;
        self
    }

    /// Request chunked (`true`) or eager (`false`) loading.
    #[must_use]
    pub fn with_chunk_data(mut self, chunk_data: bool) -> Self {
        self.chunk_data = chunk_data;
        self
    }

    /// Explicit start times, one per file, in seconds.
    #[must_use]
    pub fn with_starting_times(mut self, starting_times: Vec<f64>) -> Self {
        self.starting_times = Some(starting_times);
        self
    }

    /// Per-chunk memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Explicit chunk shape, overriding budget-based sizing.
    #[must_use]
    pub fn with_chunk_shape(mut self, shape: Vec<usize>) -> Self {
        self.explicit_chunk_shape = Some(shape);
        self
    }

    /// Compression codec for embedded data.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    /// Override the memory estimate's inflation factor.
    #[must_use]
    pub fn with_inflation_factor(mut self, factor: u64) -> Self {
        self.inflation_factor = factor;
        self
    }

    /// Destination placement.
    #[must_use]
    pub fn with_placement(mut self, placement: SeriesPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Report frame progress every `size` frames (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_parses_aliases() {
        assert_eq!("GZIP".parse(), Ok(CompressionCodec::Gzip));
        assert_eq!("deflate".parse(), Ok(CompressionCodec::Gzip));
        assert_eq!("off".parse(), Ok(CompressionCodec::None));
        assert!("zstd".parse::<CompressionCodec>().is_err());
    }

    #[test]
    fn module_placement_defaults_description() {
        assert_eq!(
            SeriesPlacement::module("behavior", None),
            SeriesPlacement::ProcessingModule {
                name: "behavior".to_string(),
                description: DEFAULT_MODULE_DESCRIPTION.to_string(),
            }
        );
    }

    #[test]
    fn debug_lists_settings() {
        let debug = format!("{:?}", ConversionOptions::new().with_batch_size(0));
        assert!(debug.contains("reference_mode: true"));
        assert!(debug.contains("batch_size: 1"));
    }
}
