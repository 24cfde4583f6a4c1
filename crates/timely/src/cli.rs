use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TIMELY_GIT_SHA"),
    ", ",
    env!("TIMELY_BUILD_DATE"),
    ")"
);

/// Plays a sound file so that it starts at a given wall-clock instant.
///
/// Sample usage: `timely --start-us 1700000000000000 song.flac`
#[derive(Parser, Debug)]
#[command(name = "timely", version = VERSION)]
pub struct Args {
    /// Audio file to play
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// Time to start playing in µs since the Unix epoch, or 0 for now
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..))]
    pub start_us: i64,

    /// Audio host API name (e.g. ALSA, JACK, CoreAudio, WASAPI), or the default host
    #[arg(long)]
    pub host_api: Option<String>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices; exits unless a file is given too
    #[arg(long)]
    pub list_devices: bool,

    /// Cyclic buffer size in bytes (bounds how far ahead decoding may run)
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub buffer_bytes: usize,

    /// Sleep period (ms) while waiting for buffer space or for playback to drain
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// Requested output latency in milliseconds
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,
}
