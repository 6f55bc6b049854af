//! Progress reporting.
//!
//! Long embedded-mode conversions decode every frame of every file. Attach a
//! [`ProgressCallback`] through
//! [`ConversionOptions::with_progress`](crate::ConversionOptions::with_progress)
//! to observe them.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use movie_ingest::{ConversionOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}%", info.operation);
//!         }
//!     }
//! }
//!
//! let options = ConversionOptions::new()
//!     .with_reference_mode(false)
//!     .with_progress(Arc::new(PrintProgress));
//! ```
//!
//! Callbacks observe only. The one way to stop a stream early is to drop the
//! iterator that drives it, which releases its decoder.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of work being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Frames handed to a destination writer.
    FrameWriting,
    /// Files finished by a conversion.
    FileConversion,
}

/// A snapshot of progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What is being reported.
    pub operation: OperationType,
    /// Items (frames or files) finished so far.
    pub current: u64,
    /// Items expected, if known.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, from throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// The file being processed, by its display name.
    pub current_file: Option<String>,
}

/// Receives progress updates. Must be `Send + Sync` so a single callback can
/// be shared between conversions.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` items and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing and fires the callback on batch boundaries.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
    current_file: Option<String>,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
            current_file: None,
        }
    }

    pub(crate) fn with_file(mut self, name: impl Into<String>) -> Self {
        self.current_file = Some(name.into());
        self
    }

    /// Record one finished item.
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        self.items_since_last_report += 1;
        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    /// Emit a final report regardless of batching.
    pub(crate) fn finish(&mut self) {
        self.report();
        self.items_since_last_report = 0;
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();
        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32) * 100.0);
        let estimated_remaining = if self.current > 0 {
            self.total.map(|total| {
                let remaining = total.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_file: self.current_file.clone(),
        });
    }
}
