//! External Recognizers (C5, §4.5)
//!
//! Ordered fallback chain: AcoustID, then AudD. Each recognizer is a plain
//! struct with an inherent async method (no trait object — the chain is
//! driven by `run_chain`, not dynamic dispatch), matching how the source
//! client structs were written.
//!
//! MusicBrainz-by-metadata (§4.5 step 2, `musicbrainz::lookup_by_metadata`)
//! is not wired into `run_chain`: it only ever fires when a caller already
//! has a `{title, artist}` hint, and nothing upstream of this pipeline
//! extracts one (no ICY/SHOUTcast tag reader exists in this codebase, and
//! the original's own equivalent guard reads from a dict key nothing ever
//! populates either). The function stays exported and tested on its own.

pub mod acoustid;
pub mod audd;
pub mod musicbrainz;

use crate::error::Result;
use crate::features::Features;
use sodav_common::Config;
use std::time::Duration;

/// Confidence floor for accepting an external match (§4.5, P7).
pub const CONFIDENCE_FLOOR: f64 = 0.7;

/// Timeout applied to each recognizer call (§5).
pub const RECOGNIZER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub label: Option<String>,
    pub release_date: Option<String>,
    pub duration_seconds: Option<f64>,
    pub musicbrainz_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecognitionEnvelope {
    pub track_info: TrackInfo,
    pub confidence: f64,
    pub source: &'static str,
}

/// Run the ordered fallback chain: AcoustID -> AudD.
/// Returns the first envelope whose confidence clears `CONFIDENCE_FLOOR`;
/// a disabled recognizer (config flag off, or no API key) is skipped, not
/// treated as an error (§7).
pub async fn run_chain(
    http: &reqwest::Client,
    config: &Config,
    features: &Features,
    pcm: &[i16],
    sample_rate: u32,
) -> Result<Option<RecognitionEnvelope>> {
    if !config.external_detection_enabled {
        return Ok(None);
    }

    if config.acoustid_enabled {
        if let Some(api_key) = &config.acoustid_api_key {
            if let Some(chromaprint) = &features.chromaprint {
                let envelope = tokio::time::timeout(
                    RECOGNIZER_TIMEOUT,
                    acoustid::lookup(http, api_key, chromaprint, features.duration_seconds),
                )
                .await;
                match envelope {
                    Ok(Ok(Some(envelope))) if envelope.confidence >= CONFIDENCE_FLOOR => {
                        return Ok(Some(envelope));
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(category = "EXTERNAL_DETECTION", error = %e, "AcoustID lookup failed");
                    }
                    Err(_) => {
                        tracing::warn!(category = "EXTERNAL_DETECTION", "AcoustID lookup timed out");
                    }
                }
            }
        }
    }

    if config.audd_enabled {
        if let Some(api_key) = &config.audd_api_key {
            let envelope =
                tokio::time::timeout(RECOGNIZER_TIMEOUT, audd::lookup(http, api_key, pcm, sample_rate)).await;
            match envelope {
                Ok(Ok(Some(envelope))) if envelope.confidence >= CONFIDENCE_FLOOR => {
                    return Ok(Some(envelope));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(category = "EXTERNAL_DETECTION", error = %e, "AudD lookup failed");
                }
                Err(_) => {
                    tracing::warn!(category = "EXTERNAL_DETECTION", "AudD lookup timed out");
                }
            }
        }
    }

    Ok(None)
}
