//! Feature Extractor (C2, §4.2)
//!
//! Produces a typed `Features` record from decoded PCM: chromaprint (when
//! available), a deterministic content hash for exact local matching,
//! per-segment fingerprints for mid-stream captures, and a music/speech
//! classification.

use crate::fingerprint;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("no audio samples supplied")]
    NoAudio,

    #[error("fingerprinter unavailable: {0}")]
    ExtractorUnavailable(String),
}

/// One overlapping slice of the capture buffer, fingerprinted independently
/// so a track captured mid-stream can still be matched (§4.2, §4.3).
#[derive(Debug, Clone)]
pub struct SegmentFingerprint {
    pub hash: String,
    pub raw: Vec<u8>,
    pub offset_seconds: f32,
    pub algorithm: &'static str,
}

#[derive(Debug, Clone)]
pub struct Features {
    pub duration_seconds: f32,
    pub chromaprint: Option<String>,
    pub content_hash: String,
    pub content_raw: Vec<u8>,
    pub segments: Vec<SegmentFingerprint>,
    pub is_music: bool,
    pub music_confidence: f32,
}

const FRAME_SAMPLES: usize = 4410;
const SEGMENT_SECONDS: f32 = 30.0;
const SEGMENT_OVERLAP_SECONDS: f32 = 15.0;

/// Extract features from mono PCM. `want_chromaprint` mirrors whether
/// `fpcalc`-equivalent fingerprinting was requested by the caller; when
/// true and generation fails because the audio is too short or the
/// library errors, `ExtractorUnavailable` is raised per §4.2's contract.
pub fn extract(pcm: &[i16], sample_rate: u32, want_chromaprint: bool) -> Result<Features, FeatureError> {
    if pcm.is_empty() {
        return Err(FeatureError::NoAudio);
    }

    let duration_seconds = pcm.len() as f32 / sample_rate as f32;

    let chromaprint_value = if want_chromaprint {
        match fingerprint::chromaprint(pcm, sample_rate) {
            Ok(fp) => Some(fp),
            Err(fingerprint::FingerprintError::AudioTooShort) => None,
            Err(e) => return Err(FeatureError::ExtractorUnavailable(e.to_string())),
        }
    } else {
        None
    };

    let (content_hash, content_raw) = content_digest(pcm, sample_rate);
    let segments = segment_fingerprints(pcm, sample_rate);
    let (is_music, music_confidence) = classify_music_speech(pcm, sample_rate);

    Ok(Features {
        duration_seconds,
        chromaprint: chromaprint_value,
        content_hash,
        content_raw,
        segments,
        is_music,
        music_confidence,
    })
}

/// Deterministic short digest over coarse spectral summary statistics
/// (per-frame RMS energy + 85-255Hz formant-band energy, proxies for
/// chroma/MFCC/spectral-centroid), used as the exact-match key (§4.2, §4.3).
fn content_digest(pcm: &[i16], sample_rate: u32) -> (String, Vec<u8>) {
    let summary = spectral_summary_bytes(pcm, sample_rate);
    let mut hasher = Sha256::new();
    hasher.update(&summary);
    let digest = hasher.finalize();
    (format!("{digest:x}"), summary)
}

fn spectral_summary_bytes(pcm: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    for frame in pcm.chunks(FRAME_SAMPLES) {
        let rms = rms_energy(frame);
        let formant = goertzel_band_energy(frame, sample_rate, 85.0, 255.0);
        bytes.extend_from_slice(&rms.to_le_bytes());
        bytes.extend_from_slice(&formant.to_le_bytes());
    }
    bytes
}

fn segment_fingerprints(pcm: &[i16], sample_rate: u32) -> Vec<SegmentFingerprint> {
    let segment_samples = (SEGMENT_SECONDS * sample_rate as f32) as usize;
    let step_samples = ((SEGMENT_SECONDS - SEGMENT_OVERLAP_SECONDS) * sample_rate as f32) as usize;
    if segment_samples == 0 || step_samples == 0 || pcm.len() < segment_samples {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0;
    while start + segment_samples <= pcm.len() {
        let slice = &pcm[start..start + segment_samples];
        let (hash, raw) = content_digest(slice, sample_rate);
        segments.push(SegmentFingerprint {
            hash,
            raw,
            offset_seconds: start as f32 / sample_rate as f32,
            algorithm: "content_hash",
        });
        start += step_samples;
    }
    segments
}

/// Music/speech discrimination per §4.2: strong 85-255Hz formant energy
/// without periodic onsets reads as speech; regular onset periodicity
/// (a beat) reads as music.
fn classify_music_speech(pcm: &[i16], sample_rate: u32) -> (bool, f32) {
    let frame_energies: Vec<f32> = pcm.chunks(FRAME_SAMPLES).map(rms_energy).collect();
    let beat_regularity = onset_periodicity(&frame_energies);
    let formant_ratio = {
        let formant: f32 = pcm
            .chunks(FRAME_SAMPLES)
            .map(|f| goertzel_band_energy(f, sample_rate, 85.0, 255.0))
            .sum();
        let total: f32 = frame_energies.iter().map(|&e| e * e).sum::<f32>().max(1e-6);
        (formant / total).min(1.0)
    };

    let music_score = (beat_regularity * (1.0 - formant_ratio)).clamp(0.0, 1.0);
    (music_score >= 0.5, music_score)
}

/// Autocorrelation-based regularity of the frame energy envelope: high
/// when a periodic beat is present, low for freely varying speech energy.
fn onset_periodicity(energies: &[f32]) -> f32 {
    if energies.len() < 4 {
        return 0.0;
    }
    let mean = energies.iter().sum::<f32>() / energies.len() as f32;
    let variance: f32 = energies.iter().map(|&e| (e - mean).powi(2)).sum::<f32>() / energies.len() as f32;
    if variance < 1e-9 {
        return 0.0;
    }

    let max_lag = (energies.len() / 2).max(1);
    let mut best = 0.0f32;
    for lag in 1..max_lag {
        let mut acc = 0.0f32;
        let mut count = 0;
        for i in 0..energies.len() - lag {
            acc += (energies[i] - mean) * (energies[i + lag] - mean);
            count += 1;
        }
        if count == 0 {
            continue;
        }
        let normalized = (acc / count as f32) / variance;
        if normalized > best {
            best = normalized;
        }
    }
    best.clamp(0.0, 1.0)
}

fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    ((sum_squares / samples.len() as f64).sqrt()) as f32
}

/// Single-bin Goertzel energy for the band `[low_hz, high_hz)`, sampled at
/// the band's center frequency — cheap narrowband energy estimate without
/// pulling in a full FFT dependency.
fn goertzel_band_energy(samples: &[i16], sample_rate: u32, low_hz: f32, high_hz: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let center_hz = (low_hz + high_hz) / 2.0;
    let omega = 2.0 * std::f32::consts::PI * center_hz / sample_rate as f32;
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;
    for &sample in samples {
        let s = sample as f32 / 32768.0 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }

    (s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_no_audio() {
        let result = extract(&[], 44100, false);
        assert!(matches!(result, Err(FeatureError::NoAudio)));
    }

    #[test]
    fn identical_pcm_yields_identical_content_hash() {
        let pcm: Vec<i16> = (0..44100).map(|i| ((i % 100) as i16) * 100).collect();
        let a = extract(&pcm, 44100, false).unwrap();
        let b = extract(&pcm, 44100, false).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn differing_pcm_yields_differing_content_hash() {
        let silence = vec![0i16; 44100];
        let tone: Vec<i16> = (0..44100)
            .map(|i| ((i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin() * 10000.0) as i16)
            .collect();
        let a = extract(&silence, 44100, false).unwrap();
        let b = extract(&tone, 44100, false).unwrap();
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn short_buffer_produces_no_segments() {
        let pcm = vec![0i16; 44100 * 5];
        let features = extract(&pcm, 44100, false).unwrap();
        assert!(features.segments.is_empty());
    }

    #[test]
    fn long_buffer_produces_overlapping_segments() {
        let pcm = vec![0i16; 44100 * 90];
        let features = extract(&pcm, 44100, false).unwrap();
        assert!(!features.segments.is_empty());
    }

    #[test]
    fn rms_energy_of_silence_is_zero() {
        assert_eq!(rms_energy(&[0, 0, 0]), 0.0);
    }
}
