//! AcoustID recognizer (§4.5 step 1, §6)

use super::{RecognitionEnvelope, TrackInfo};
use crate::error::{PipelineError, Result};
use serde::Deserialize;

const LOOKUP_URL: &str = "https://api.acoustid.org/v2/lookup";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: String,
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    score: f64,
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    releasegroups: Vec<ReleaseGroup>,
    #[serde(rename = "externalIds", default)]
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(default)]
    isrc: Vec<String>,
}

/// `GET /v2/lookup?client=…&meta=recordings+releasegroups+compress&fingerprint=…&duration=…`.
/// Accepts the top result when `score >= 0.7` (enforced by the caller via
/// `CONFIDENCE_FLOOR`); this function just shapes the response.
pub async fn lookup(
    http: &reqwest::Client,
    api_key: &str,
    chromaprint: &str,
    duration_seconds: f32,
) -> Result<Option<RecognitionEnvelope>> {
    let response = http
        .get(LOOKUP_URL)
        .query(&[
            ("client", api_key),
            ("meta", "recordings+releasegroups+compress"),
            ("fingerprint", chromaprint),
            ("duration", &(duration_seconds.round() as i64).to_string()),
        ])
        .send()
        .await?;

    let parsed: LookupResponse = response.json().await?;

    if parsed.status != "ok" {
        return Err(PipelineError::Recognizer {
            source: "acoustid",
            message: format!("unexpected status: {}", parsed.status),
        });
    }

    let Some(top) = parsed.results.into_iter().max_by(|a, b| {
        a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return Ok(None);
    };

    let Some(recording) = top.recordings.into_iter().next() else {
        return Ok(Some(RecognitionEnvelope {
            track_info: TrackInfo::default(),
            confidence: top.score,
            source: "acoustid",
        }));
    };

    let artist = recording.artists.into_iter().next().map(|a| a.name);
    let album = recording.releasegroups.into_iter().next().and_then(|rg| rg.title);
    let isrc = recording
        .external_ids
        .and_then(|ids| ids.isrc.into_iter().next());

    Ok(Some(RecognitionEnvelope {
        track_info: TrackInfo {
            title: recording.title,
            artist,
            album,
            isrc,
            label: None,
            release_date: None,
            duration_seconds: Some(duration_seconds as f64),
            musicbrainz_id: None,
        },
        confidence: top.score,
        source: "acoustid",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_ok_response() {
        let body = r#"{"status":"ok","results":[{"score":0.82,"recordings":[]}]}"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "ok");
        assert_eq!(parsed.results.len(), 1);
        assert!((parsed.results[0].score - 0.82).abs() < 1e-9);
    }

    #[test]
    fn deserializes_recording_with_isrc() {
        let body = r#"{
            "status":"ok",
            "results":[{
                "score":0.91,
                "recordings":[{
                    "title":"Song",
                    "artists":[{"name":"Artist"}],
                    "releasegroups":[{"title":"Album"}],
                    "externalIds":{"isrc":["USABC1234567"]}
                }]
            }]
        }"#;
        let parsed: LookupResponse = serde_json::from_str(body).unwrap();
        let recording = &parsed.results[0].recordings[0];
        assert_eq!(recording.title.as_deref(), Some("Song"));
        assert_eq!(
            recording.external_ids.as_ref().unwrap().isrc[0],
            "USABC1234567"
        );
    }
}
