//! FFmpeg initialisation and log level control.
//!
//! FFmpeg writes its own diagnostics to stderr, independently of the Rust
//! [`log`](https://crates.io/crates/log) facade this crate uses. Long
//! conversions over slightly damaged recordings can produce a warning per
//! packet, so callers usually want to turn it down:
//!
//! ```no_run
//! use movie_ingest::FfmpegLogLevel;
//!
//! movie_ingest::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::sync::Once;

use ffmpeg_next::util::log::Level;

/// FFmpeg's internal log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors (damaged packets, failed frames).
    Error,
    /// Warnings; FFmpeg's default.
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic | Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info | Level::Verbose => FfmpegLogLevel::Info,
            Level::Debug | Level::Trace => FfmpegLogLevel::Debug,
        }
    }

    /// Parse a level name as accepted on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" | "off" => Some(FfmpegLogLevel::Quiet),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "debug" => Some(FfmpegLogLevel::Debug),
            _ => None,
        }
    }
}

/// Set FFmpeg's stderr verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Current FFmpeg stderr verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}

static INIT: Once = Once::new();

/// Initialise FFmpeg once per process.
pub(crate) fn initialize() -> Result<(), ffmpeg_next::Error> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = ffmpeg_next::init();
    });
    result
}
