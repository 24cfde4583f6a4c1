//! Timed PCM playback: plays decoded audio so each sample sounds at a given
//! wall-clock instant, bridging the device clock and Unix time through a
//! byte-addressed cyclic buffer.

pub mod clock;
pub mod config;
pub mod cyclic;
pub mod decode;
pub mod device;
pub mod error;
pub mod feeder;
pub mod pipeline;
pub mod playback;
pub mod session;
pub mod smoother;

pub use clock::{ClockOrigin, SampleEncoding, StreamParameters};
pub use config::SyncConfig;
pub use error::SyncError;
pub use feeder::{FeedStats, Feeder};
pub use playback::PlaybackCallback;
pub use session::{PlaybackSession, StreamState};
