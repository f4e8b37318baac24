//! Stream Capture (C1, §4.1)
//!
//! Pulls decoded PCM from a station stream URL, bounded by a safety ceiling
//! and terminated early on silence or an abrupt spectral change.

use crate::error::{PipelineError, Result};
use crate::silence::{SilenceDetector, WindowVerdict};
use std::time::Duration;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    SilenceDetected,
    SpectralChangeDetected,
    MaxDurationReached,
    Error,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Mono PCM, 16-bit.
    pub pcm: Vec<i16>,
    pub sample_rate: u32,
    pub captured_duration: Duration,
    pub termination_reason: TerminationReason,
}

/// Minimum viable capture; shorter buffers are treated as capture failure (§4.1).
const MIN_CAPTURE_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct CaptureParams {
    pub max_duration: Duration,
    pub silence_threshold: f32,
    pub min_silence_seconds: f32,
    pub spectral_change_threshold: f32,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(180),
            silence_threshold: 0.02,
            min_silence_seconds: 3.0,
            spectral_change_threshold: 0.5,
        }
    }
}

/// Decode PCM out of `source` (an open, readable/seekable-enough stream
/// handle) until a termination condition fires.
///
/// The transport (opening the HTTP/ICY connection) is the caller's
/// responsibility; this function only owns decoding and the
/// silence/spectral-change/max-duration state machine described in §4.1.
pub fn capture_from_source(
    source: Box<dyn MediaSource>,
    extension_hint: Option<&str>,
    params: CaptureParams,
) -> Result<CaptureResult> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PipelineError::Capture(format!("format probe failed: {e}")))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PipelineError::Capture("no audio track in stream".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| PipelineError::Capture("stream has no sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PipelineError::Capture(format!("decoder creation failed: {e}")))?;

    let detector = SilenceDetector::new(
        params.silence_threshold,
        params.min_silence_seconds,
        params.spectral_change_threshold,
    );

    let mut pcm: Vec<i16> = Vec::new();
    let max_samples = (sample_rate as f64 * params.max_duration.as_secs_f64()) as usize;
    let mut cumulative_silence_seconds = 0.0f32;
    let mut previous_window: Option<Vec<i16>> = None;
    let mut termination = TerminationReason::MaxDurationReached;
    let mut chunks_since_analysis = 0u32;

    'decode: loop {
        let packet = match format_reader.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(_) => {
                termination = TerminationReason::Error;
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mono = convert_to_mono_i16(&decoded);
        pcm.extend_from_slice(&mono);

        chunks_since_analysis += 1;
        if chunks_since_analysis >= 5 {
            chunks_since_analysis = 0;
            let window_size = detector.window_size_samples();
            if pcm.len() >= window_size {
                let window = &pcm[pcm.len() - window_size..];
                let verdict = detector.analyze_window(
                    window,
                    previous_window.as_deref(),
                    sample_rate,
                    cumulative_silence_seconds,
                );
                match verdict {
                    WindowVerdict::SilenceDetected => {
                        termination = TerminationReason::SilenceDetected;
                        break 'decode;
                    }
                    WindowVerdict::SpectralChangeDetected => {
                        termination = TerminationReason::SpectralChangeDetected;
                        break 'decode;
                    }
                    WindowVerdict::Continue => {
                        let window_seconds = window.len() as f32 / sample_rate as f32;
                        let rms_below = window.iter().all(|&s| (s as f32).abs() < params.silence_threshold * i16::MAX as f32);
                        cumulative_silence_seconds = if rms_below {
                            cumulative_silence_seconds + window_seconds
                        } else {
                            0.0
                        };
                    }
                }
                previous_window = Some(window.to_vec());
            }
        }

        if pcm.len() >= max_samples {
            termination = TerminationReason::MaxDurationReached;
            pcm.truncate(max_samples);
            break;
        }
    }

    let captured_duration = Duration::from_secs_f64(pcm.len() as f64 / sample_rate as f64);

    if captured_duration.as_secs_f64() < MIN_CAPTURE_SECONDS && termination != TerminationReason::Error {
        return Ok(CaptureResult {
            pcm,
            sample_rate,
            captured_duration,
            termination_reason: TerminationReason::Error,
        });
    }

    Ok(CaptureResult {
        pcm,
        sample_rate,
        captured_duration,
        termination_reason: termination,
    })
}

fn convert_to_mono_i16(buffer: &AudioBufferRef) -> Vec<i16> {
    fn to_f32<S: Sample>(s: S) -> f32
    where
        f32: FromSample<S>,
    {
        f32::from_sample(s)
    }

    let channels = buffer.spec().channels.count();
    let frames = buffer.frames();
    let mut mono = Vec::with_capacity(frames);

    for frame_idx in 0..frames {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            let sample = match buffer {
                AudioBufferRef::U8(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U16(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U24(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::U32(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S8(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S16(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S24(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::S32(buf) => to_f32(buf.chan(ch)[frame_idx]),
                AudioBufferRef::F32(buf) => buf.chan(ch)[frame_idx],
                AudioBufferRef::F64(buf) => buf.chan(ch)[frame_idx] as f32,
            };
            sum += sample;
        }
        let avg = sum / channels as f32;
        mono.push((avg * 32767.0).clamp(-32768.0, 32767.0) as i16);
    }

    mono
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_spec_defaults() {
        let p = CaptureParams::default();
        assert_eq!(p.max_duration, Duration::from_secs(180));
    }
}
