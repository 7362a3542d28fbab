//! Decoder log level configuration.
//!
//! FFmpeg prints its own diagnostics to stderr, separately from the Rust
//! [`log`](https://crates.io/crates/log) facade. Corrupt or truncated
//! end-of-stream data in particular makes it noisy, so hosts usually want to
//! quiet it without importing `ffmpeg-next` themselves.
//!
//! # Example
//!
//! ```no_run
//! use endframe::DecoderLogLevel;
//!
//! endframe::set_decoder_log_level(DecoderLogLevel::Error);
//! assert_eq!(endframe::get_decoder_log_level(), Some(DecoderLogLevel::Error));
//! ```

use std::str::FromStr;

use ffmpeg_next::util::log::Level;

/// FFmpeg log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl DecoderLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            DecoderLogLevel::Quiet => Level::Quiet,
            DecoderLogLevel::Fatal => Level::Fatal,
            DecoderLogLevel::Error => Level::Error,
            DecoderLogLevel::Warning => Level::Warning,
            DecoderLogLevel::Info => Level::Info,
            DecoderLogLevel::Debug => Level::Debug,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => DecoderLogLevel::Quiet,
            Level::Panic | Level::Fatal => DecoderLogLevel::Fatal,
            Level::Error => DecoderLogLevel::Error,
            Level::Warning => DecoderLogLevel::Warning,
            Level::Info | Level::Verbose => DecoderLogLevel::Info,
            Level::Debug | Level::Trace => DecoderLogLevel::Debug,
        }
    }
}

impl FromStr for DecoderLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(DecoderLogLevel::Quiet),
            "fatal" => Ok(DecoderLogLevel::Fatal),
            "error" => Ok(DecoderLogLevel::Error),
            "warning" | "warn" => Ok(DecoderLogLevel::Warning),
            "info" => Ok(DecoderLogLevel::Info),
            "debug" => Ok(DecoderLogLevel::Debug),
            other => Err(format!("unknown decoder log level: {other}")),
        }
    }
}

/// Set FFmpeg's log verbosity. Does not affect the `log` facade.
pub fn set_decoder_log_level(level: DecoderLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Current FFmpeg log verbosity, if it maps to a known level.
pub fn get_decoder_log_level() -> Option<DecoderLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(DecoderLogLevel::from_ffmpeg_level)
}
