//! Timestamped audio decode stage.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - derive [`StreamParameters`] for the output stream
//! - decode packets into interleaved native-endian bytes, each tagged with its
//!   position in the stream (µs)

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{AudioBufferRef, RawSample, RawSampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::{Sample, SampleFormat};
use symphonia::core::units::{Time, TimeBase};

use crate::clock::{SampleEncoding, StreamParameters};

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Total duration in milliseconds when the container knows it.
    pub duration_ms: Option<u64>,
}

/// One decoded packet, borrowed from the decoder's scratch buffer.
pub struct DecodedBlock<'a> {
    pub bytes: &'a [u8],
    /// Presentation time of the first sample, relative to the stream start.
    pub stream_us: i64,
}

/// Reusable interleaving buffer for one sample type.
struct RawScratch<S: Sample + RawSample> {
    buf: Option<RawSampleBuffer<S>>,
    frames: usize,
}

impl<S: Sample + RawSample + ConvertibleSample> RawScratch<S> {
    fn new() -> Self {
        Self {
            buf: None,
            frames: 0,
        }
    }

    fn fill(&mut self, decoded: AudioBufferRef<'_>) -> &[u8] {
        let needed = decoded.capacity();
        if needed > self.frames {
            self.buf = None;
            self.frames = needed;
        }
        let spec = *decoded.spec();
        let buf = self
            .buf
            .get_or_insert_with(|| RawSampleBuffer::new(needed as u64, spec));
        buf.copy_interleaved_ref(decoded);
        buf.as_bytes()
    }
}

enum Scratch {
    U8(RawScratch<u8>),
    I16(RawScratch<i16>),
    I32(RawScratch<i32>),
    F32(RawScratch<f32>),
}

impl Scratch {
    fn for_encoding(encoding: SampleEncoding) -> Self {
        match encoding {
            SampleEncoding::U8 => Scratch::U8(RawScratch::new()),
            SampleEncoding::I16 => Scratch::I16(RawScratch::new()),
            SampleEncoding::I32 => Scratch::I32(RawScratch::new()),
            SampleEncoding::F32 => Scratch::F32(RawScratch::new()),
        }
    }

    fn fill(&mut self, decoded: AudioBufferRef<'_>) -> &[u8] {
        match self {
            Scratch::U8(s) => s.fill(decoded),
            Scratch::I16(s) => s.fill(decoded),
            Scratch::I32(s) => s.fill(decoded),
            Scratch::F32(s) => s.fill(decoded),
        }
    }
}

/// Pull-based decoder yielding timestamped PCM blocks.
pub struct TimedDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: TimeBase,
    params: StreamParameters,
    max_frames_per_packet: Option<u64>,
    info: SourceInfo,
    scratch: Scratch,
}

impl TimedDecoder {
    /// Open `path`, pick the first decodable track and prepare its decoder.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("probe input format")?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("could not find audio stream with suitable codec"))?;

        let track_id = track.id;
        let codec_params: CodecParameters = track.codec_params.clone();
        let params = stream_parameters_from_codec_params(&codec_params)?;
        let time_base = codec_params
            .time_base
            .unwrap_or_else(|| TimeBase::new(1, params.sample_rate));

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .context("open decoder")?;

        let info = SourceInfo {
            codec: codec_name_from_params(&codec_params),
            duration_ms: duration_ms_from_codec_params(&codec_params),
        };

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            params,
            max_frames_per_packet: codec_params.max_frames_per_packet,
            info,
            scratch: Scratch::for_encoding(params.encoding),
        })
    }

    pub fn params(&self) -> StreamParameters {
        self.params
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Largest block the container promises to produce, in bytes, if known.
    pub fn max_block_bytes(&self) -> Option<usize> {
        self.max_frames_per_packet
            .map(|frames| frames as usize * self.params.bytes_per_sample())
    }

    /// Seek so that decoding resumes at or before `position_us` of stream time.
    ///
    /// Uses accurate seeking, which never lands past the requested position.
    /// Non-positive positions leave the reader at the start.
    pub fn seek_to_us(&mut self, position_us: i64) -> Result<()> {
        if position_us <= 0 {
            return Ok(());
        }
        let secs = (position_us / 1_000_000) as u64;
        let frac = (position_us % 1_000_000) as f64 / 1_000_000.0;
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(secs, frac),
                    track_id: Some(self.track_id),
                },
            )
            .context("seek failed")?;
        self.decoder.reset();
        Ok(())
    }

    /// Decode the next packet of the selected track.
    ///
    /// Returns `Ok(None)` at end of stream. A packet that fails to decode is logged
    /// and skipped; any other error is returned.
    pub fn next_block(&mut self) -> Result<Option<DecodedBlock<'_>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    tracing::warn!("stream reset required; ending playback");
                    return Ok(None);
                }
                Err(e) => return Err(e).context("read packet"),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let stream_us = stream_us_from_ts(packet.ts(), self.time_base);
                    let bytes = self.scratch.fill(decoded);
                    return Ok(Some(DecodedBlock { bytes, stream_us }));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::warn!(ts = packet.ts(), "decode error, packet dropped: {msg}");
                }
                Err(e) => return Err(e).context("decode packet"),
            }
        }
    }
}

/// Map codec parameters onto the output stream layout.
///
/// Only mono and stereo are accepted. Integer widths the device path does not
/// carry directly are widened to the next supported encoding.
pub fn stream_parameters_from_codec_params(params: &CodecParameters) -> Result<StreamParameters> {
    let channels = params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    if channels == 0 || channels > 2 {
        return Err(anyhow!("audio format is not stereo or mono ({channels} channels)"));
    }
    let rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let encoding = encoding_from_sample_format(params.sample_format)?;
    StreamParameters::new(rate, channels as u16, encoding).map_err(Into::into)
}

fn encoding_from_sample_format(format: Option<SampleFormat>) -> Result<SampleEncoding> {
    match format {
        Some(SampleFormat::U8) => Ok(SampleEncoding::U8),
        Some(SampleFormat::S16) => Ok(SampleEncoding::I16),
        Some(SampleFormat::S24 | SampleFormat::S32) => Ok(SampleEncoding::I32),
        Some(SampleFormat::F32 | SampleFormat::F64) | None => Ok(SampleEncoding::F32),
        Some(other) => Err(anyhow!("can't convert sample format {other:?}")),
    }
}

/// Convert a packet timestamp in `time_base` units to microseconds.
fn stream_us_from_ts(ts: u64, time_base: TimeBase) -> i64 {
    if time_base.denom == 0 {
        return 0;
    }
    let us = ts as i128 * 1_000_000 * time_base.numer as i128 / time_base.denom as i128;
    us as i64
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label for logs.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_U8 => "PCM_U8",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
