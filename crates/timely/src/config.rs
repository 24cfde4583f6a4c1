use std::path::PathBuf;
use std::time::Duration;

pub use timely_player::config::SyncConfig;

use crate::cli::Args;

#[derive(Clone, Debug)]
pub struct TimelyPlayConfig {
    pub path: PathBuf,
    /// Wall-clock start in µs; `None` plays from "now".
    pub start_us: Option<i64>,
    pub host_api: Option<String>,
    pub device: Option<String>,
    pub sync: SyncConfig,
}

impl TimelyPlayConfig {
    /// Build a play config from CLI args. Returns `None` when no file was given.
    pub fn from_args(args: &Args) -> Option<Self> {
        let path = args.path.clone()?;
        Some(Self {
            path,
            start_us: (args.start_us != 0).then_some(args.start_us),
            host_api: normalize_name(args.host_api.clone()),
            device: normalize_name(args.device.clone()),
            sync: SyncConfig {
                buffer_bytes: args.buffer_bytes,
                poll_interval: Duration::from_millis(args.poll_ms.max(1)),
                suggested_latency: Duration::from_millis(args.latency_ms),
                ..SyncConfig::default()
            },
        })
    }
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
