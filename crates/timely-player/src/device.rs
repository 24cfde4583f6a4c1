//! Output host/device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing hosts and their output devices
//! - selecting a host by name and a device by substring match
//! - choosing an output config that carries the decoded stream unchanged

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::clock::StreamParameters;

/// Pick a CPAL host.
///
/// - If `name` is `Some`, chooses the available host whose id name matches
///   (case-insensitive).
/// - Otherwise, returns the default host.
pub fn pick_host(name: Option<&str>) -> Result<cpal::Host> {
    let Some(name) = name else {
        return Ok(cpal::default_host());
    };
    let id = cpal::available_hosts()
        .into_iter()
        .find(|id| matches_host_name(id.name(), name))
        .ok_or_else(|| anyhow!("Invalid host api: {name}"))?;
    cpal::host_from_id(id).with_context(|| format!("host api {} unavailable", id.name()))
}

/// Pick a CPAL output device.
///
/// - If `needle` is `Some`, chooses the first output device whose name contains the substring
///   (case-insensitive).
/// - Otherwise, returns the host default output device.
///
/// Returns an error if no matching device exists or if the host reports no output devices.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("Invalid output device: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick an output config carrying `params` without conversion.
///
/// The range must have the stream's channel count and sample format and contain its
/// sample rate; this path never resamples or transcodes.
pub fn pick_output_config(
    device: &cpal::Device,
    params: &StreamParameters,
) -> Result<cpal::SupportedStreamConfig> {
    let format = params.encoding.cpal_format();
    device
        .supported_output_configs()
        .context("query supported output configs")?
        .find(|range| {
            range_accepts(
                range.channels(),
                range.sample_format(),
                range.min_sample_rate(),
                range.max_sample_rate(),
                params,
            )
        })
        .map(|range| range.with_sample_rate(params.sample_rate))
        .ok_or_else(|| {
            anyhow!(
                "device does not support {} Hz, {} channel(s), {:?}",
                params.sample_rate,
                params.channels,
                format
            )
        })
}

fn range_accepts(
    channels: u16,
    format: cpal::SampleFormat,
    min_rate: u32,
    max_rate: u32,
    params: &StreamParameters,
) -> bool {
    channels == params.channels
        && format == params.encoding.cpal_format()
        && (min_rate..=max_rate).contains(&params.sample_rate)
}

/// Pick a fixed callback buffer size close to `latency`.
///
/// If the device reports a range, the latency in frames is clamped into it. If
/// `Unknown`, return `None` so CPAL uses the device default.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    latency: Duration,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            frames_for_latency(config.sample_rate(), latency, *min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn frames_for_latency(rate: u32, latency: Duration, min: u32, max: u32) -> u32 {
    let frames = (rate as f64 * latency.as_secs_f64()).round() as u32;
    frames.clamp(min.min(max), max)
}

/// Print available hosts and their output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices() -> Result<()> {
    println!("Output devices:");
    for id in cpal::available_hosts() {
        let host = match cpal::host_from_id(id) {
            Ok(host) => host,
            Err(e) => {
                tracing::warn!(host = id.name(), "host unavailable: {e}");
                continue;
            }
        };
        let default_name = host
            .default_output_device()
            .and_then(|d| d.description().ok().map(|desc| desc.name().to_string()));
        let devices = match host.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(host = id.name(), "cannot enumerate devices: {e}");
                continue;
            }
        };
        for d in devices {
            let Ok(desc) = d.description() else { continue };
            let name = desc.name().to_string();
            let max_channels = d
                .supported_output_configs()
                .map(|ranges| ranges.map(|r| r.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            let default_cfg = d.default_output_config().ok();
            let is_default = default_name.as_deref() == Some(name.as_str());
            println!(
                "[{}] {}{}: maxOutputChannels={}, defaultSampleRate={}, bufferSize={}",
                id.name(),
                name,
                if is_default { " (default)" } else { "" },
                max_channels,
                default_cfg
                    .as_ref()
                    .map(|c| c.sample_rate().to_string())
                    .unwrap_or_else(|| "?".to_string()),
                default_cfg
                    .as_ref()
                    .map(|c| describe_buffer_size(c.buffer_size()))
                    .unwrap_or_else(|| "?".to_string()),
            );
        }
    }
    Ok(())
}

fn describe_buffer_size(size: &cpal::SupportedBufferSize) -> String {
    match size {
        cpal::SupportedBufferSize::Range { min, max } => format!("{min}..{max} frames"),
        cpal::SupportedBufferSize::Unknown => "unknown".to_string(),
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_host_name(name: &str, wanted: &str) -> bool {
    name.eq_ignore_ascii_case(wanted.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SampleEncoding;

    fn params() -> StreamParameters {
        StreamParameters::new(44_100, 2, SampleEncoding::I16).unwrap()
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn matches_host_name_requires_whole_name() {
        assert!(matches_host_name("ALSA", "alsa"));
        assert!(matches_host_name("CoreAudio", " coreaudio "));
        assert!(!matches_host_name("JACK", "JA"));
    }

    #[test]
    fn range_accepts_exact_layout_only() {
        let p = params();
        assert!(range_accepts(2, cpal::SampleFormat::I16, 8_000, 192_000, &p));
        assert!(range_accepts(2, cpal::SampleFormat::I16, 44_100, 44_100, &p));
        assert!(!range_accepts(1, cpal::SampleFormat::I16, 8_000, 192_000, &p));
        assert!(!range_accepts(2, cpal::SampleFormat::F32, 8_000, 192_000, &p));
        assert!(!range_accepts(2, cpal::SampleFormat::I16, 48_000, 96_000, &p));
    }

    #[test]
    fn frames_for_latency_rounds_and_clamps() {
        assert_eq!(frames_for_latency(44_100, Duration::from_millis(50), 64, 8192), 2205);
        assert_eq!(frames_for_latency(48_000, Duration::from_millis(50), 64, 1024), 1024);
        assert_eq!(frames_for_latency(48_000, Duration::from_micros(100), 64, 1024), 64);
    }
}
