//! Chromaprint fingerprint generation from in-memory PCM
//!
//! Feature Extractor (C2, §4.2) delegates the `chromaprint` field of
//! `Features` to this module. Uses chromaprint-sys-next directly, same as
//! AcoustID's own `fpcalc` utility would, so the result is acceptable to
//! the AcoustID lookup endpoint.

use once_cell::sync::Lazy;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Chromaprint error: {0}")]
    Chromaprint(String),

    #[error("Audio too short (minimum 10 seconds required)")]
    AudioTooShort,

    #[error("Resample error: {0}")]
    Resample(String),
}

/// Serializes chromaprint_new()/chromaprint_free() calls; the FFTW backend
/// is not reentrant across threads.
static CHROMAPRINT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const TARGET_SAMPLE_RATE: u32 = 44100;
const MIN_SECONDS: usize = 10;

/// Resample mono PCM to 44.1kHz if it isn't already there.
pub fn resample_to_44100(pcm: &[i16], sample_rate: u32) -> Result<(Vec<i16>, u32), FingerprintError> {
    if sample_rate == TARGET_SAMPLE_RATE {
        return Ok((pcm.to_vec(), sample_rate));
    }

    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let samples_f32: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = TARGET_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples_f32.len(), 1)
        .map_err(|e| FingerprintError::Resample(e.to_string()))?;

    let waves_in = vec![samples_f32];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| FingerprintError::Resample(e.to_string()))?;

    let resampled: Vec<i16> = waves_out[0]
        .iter()
        .map(|&s| (s * 32768.0).clamp(-32768.0, 32767.0) as i16)
        .collect();

    Ok((resampled, TARGET_SAMPLE_RATE))
}

/// Generate a Chromaprint fingerprint (compressed base64-ish string, as
/// AcoustID expects) from mono PCM.
pub fn chromaprint(pcm: &[i16], sample_rate: u32) -> Result<String, FingerprintError> {
    let min_samples = sample_rate as usize * MIN_SECONDS;
    if pcm.len() < min_samples {
        return Err(FingerprintError::AudioTooShort);
    }

    let (resampled, resampled_rate) = resample_to_44100(pcm, sample_rate)?;
    generate(&resampled, resampled_rate)
}

fn generate(pcm: &[i16], sample_rate: u32) -> Result<String, FingerprintError> {
    use chromaprint_sys_next::*;

    let _guard = CHROMAPRINT_LOCK.lock().unwrap();

    unsafe {
        let ctx = chromaprint_new(1);
        if ctx.is_null() {
            return Err(FingerprintError::Chromaprint("failed to create context".to_string()));
        }

        if chromaprint_start(ctx, sample_rate as i32, 1) != 1 {
            chromaprint_free(ctx);
            return Err(FingerprintError::Chromaprint("start failed".to_string()));
        }

        if chromaprint_feed(ctx, pcm.as_ptr(), pcm.len() as i32) != 1 {
            chromaprint_free(ctx);
            return Err(FingerprintError::Chromaprint("feed failed".to_string()));
        }

        if chromaprint_finish(ctx) != 1 {
            chromaprint_free(ctx);
            return Err(FingerprintError::Chromaprint("finish failed".to_string()));
        }

        let mut fp_ptr: *mut i8 = std::ptr::null_mut();
        if chromaprint_get_fingerprint(ctx, &mut fp_ptr) != 1 || fp_ptr.is_null() {
            chromaprint_free(ctx);
            return Err(FingerprintError::Chromaprint("get_fingerprint failed".to_string()));
        }

        let c_str = std::ffi::CStr::from_ptr(fp_ptr);
        let fingerprint = c_str
            .to_str()
            .map_err(|e| {
                chromaprint_dealloc(fp_ptr as *mut std::ffi::c_void);
                chromaprint_free(ctx);
                FingerprintError::Chromaprint(format!("utf-8 conversion failed: {e}"))
            })?
            .to_string();

        chromaprint_dealloc(fp_ptr as *mut std::ffi::c_void);
        chromaprint_free(ctx);

        Ok(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_audio_shorter_than_ten_seconds() {
        let pcm = vec![0i16; 44100 * 5];
        let result = chromaprint(&pcm, 44100);
        assert!(matches!(result, Err(FingerprintError::AudioTooShort)));
    }

    #[test]
    fn accepts_ten_seconds_at_native_rate() {
        let pcm = vec![0i16; 44100 * 10];
        let result = chromaprint(&pcm, 44100);
        assert!(result.is_ok());
    }

    #[test]
    fn resample_is_noop_at_target_rate() {
        let pcm = vec![1, 2, 3, 4];
        let (out, rate) = resample_to_44100(&pcm, 44100).unwrap();
        assert_eq!(out, pcm);
        assert_eq!(rate, 44100);
    }
}
