//! Timestamp derivation and regularity classification.
//!
//! [`compute_timestamps`] reads the presentation time of every frame of a
//! [`VideoHandle`] and returns a [`TimestampSeries`]. A series whose
//! consecutive differences are all equal (after rounding to
//! [`DEFAULT_TOLERANCE_DECIMALS`] places) is *regular* and can be stored as a
//! start time plus a constant rate; anything else must be stored as an
//! explicit array. [`SeriesTiming::derive`] makes that choice.
//!
//! ```
//! use movie_ingest::{TimestampSeries, is_regular};
//!
//! assert!(is_regular(&[0.0, 40.0, 80.0, 120.0], 9));
//! assert!(!is_regular(&[0.0, 40.0, 85.0, 120.0], 9));
//!
//! let series = TimestampSeries::new(vec![0.0, 0.04, 0.08])?;
//! assert!(series.is_regular());
//! # Ok::<(), movie_ingest::IngestError>(())
//! ```

use crate::error::IngestError;
use crate::handle::VideoHandle;
use crate::utilities::round_to_decimals;

/// Decimal places consecutive differences are rounded to before comparison.
pub const DEFAULT_TOLERANCE_DECIMALS: u32 = 9;

/// Per-frame timestamps in seconds, finite and non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampSeries {
    values: Vec<f64>,
}

impl TimestampSeries {
    /// Validate and wrap `values`.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidTimestamps`] if any value is not finite or a
    /// value is smaller than its predecessor.
    pub fn new(values: Vec<f64>) -> Result<Self, IngestError> {
        if let Some(position) = values.iter().position(|value| !value.is_finite()) {
            return Err(IngestError::InvalidTimestamps(format!(
                "timestamp {position} is not finite"
            )));
        }
        if let Some(position) = values.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(IngestError::InvalidTimestamps(format!(
                "timestamp {} ({}) precedes timestamp {} ({})",
                position + 1,
                values[position + 1],
                position,
                values[position]
            )));
        }
        Ok(Self { values })
    }

    /// The timestamps, one per frame.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of timestamps.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when the series holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First timestamp, if any.
    pub fn first(&self) -> Option<f64> {
        self.values.first().copied()
    }

    /// Last timestamp, if any.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// A copy with `offset` seconds added to every timestamp.
    #[must_use]
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            values: self.values.iter().map(|value| value + offset).collect(),
        }
    }

    /// Regularity at the default tolerance. See [`is_regular`].
    pub fn is_regular(&self) -> bool {
        is_regular(&self.values, DEFAULT_TOLERANCE_DECIMALS)
    }

    /// Consume the series, returning the raw values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// `true` iff every consecutive difference of `timestamps`, rounded to
/// `tolerance_decimals` decimal places, is the same value.
///
/// Fewer than two timestamps have no interval to compare and are not regular.
pub fn is_regular(timestamps: &[f64], tolerance_decimals: u32) -> bool {
    let mut intervals = timestamps
        .windows(2)
        .map(|pair| round_to_decimals(pair[1] - pair[0], tolerance_decimals));
    match intervals.next() {
        Some(first) => intervals.all(|interval| interval == first),
        None => false,
    }
}

/// Read the timestamp of every frame of `handle`, relative to its first frame.
///
/// Costs one pass over the stream's packets, or only the first few in stub
/// mode. The handle's cursor is back at frame 0 afterwards. If the stream
/// reports fewer timestamps than the handle has frames, the remainder are
/// extrapolated at the nominal frame rate; if it reports more, the series is
/// truncated.
///
/// # Errors
///
/// [`IngestError::HandleClosed`] / [`IngestError::HandleExhausted`] when the
/// handle holds no decoder, or any decoder error from the scan.
pub fn compute_timestamps(handle: &mut VideoHandle) -> Result<TimestampSeries, IngestError> {
    let frame_count = handle.frame_count() as usize;
    let frames_per_second = handle.frames_per_second();
    let limit = handle.is_stub().then_some(frame_count as u64);
    let mut values = handle.with_rewound_decoder(|decoder| decoder.scan_timestamps(limit))?;

    if let Some(&origin) = values.first() {
        values.iter_mut().for_each(|value| *value -= origin);
    }

    if values.len() > frame_count {
        values.truncate(frame_count);
    } else if values.len() < frame_count {
        log::debug!(
            "Stream reported {} timestamps for {frame_count} frames; extrapolating at {frames_per_second} fps",
            values.len()
        );
        let interval = if frames_per_second > 0.0 {
            1.0 / frames_per_second
        } else {
            0.0
        };
        while values.len() < frame_count {
            let next = values.last().map_or(0.0, |last| last + interval);
            values.push(next);
        }
    }

    TimestampSeries::new(values)
}

/// How a series' timing is stored in the destination: the "derived sampling
/// description".
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesTiming {
    /// Constant-rate frames starting at `starting_time` seconds.
    Rate {
        /// Time of the first frame, in seconds.
        starting_time: f64,
        /// Frames per second.
        rate: f64,
    },
    /// One explicit timestamp per frame, in seconds.
    Timestamps(TimestampSeries),
}

impl SeriesTiming {
    /// Choose rate-based timing for a regular `series` (using `nominal_rate`)
    /// and explicit timestamps otherwise.
    pub fn derive(series: TimestampSeries, nominal_rate: f64) -> Self {
        if series.is_regular() {
            SeriesTiming::Rate {
                starting_time: series.first().unwrap_or(0.0),
                rate: nominal_rate,
            }
        } else {
            SeriesTiming::Timestamps(series)
        }
    }

    /// `true` for [`SeriesTiming::Rate`].
    pub fn is_rate(&self) -> bool {
        matches!(self, SeriesTiming::Rate { .. })
    }
}
