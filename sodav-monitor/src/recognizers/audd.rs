//! AudD recognizer (§4.5 step 3, §6)

use super::{RecognitionEnvelope, TrackInfo};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use serde_json::Value;

const ENDPOINT: &str = "https://api.audd.io/";

#[derive(Debug, Deserialize)]
struct AuddResponse {
    status: String,
    #[serde(default)]
    result: Option<AuddResult>,
}

#[derive(Debug, Deserialize)]
struct AuddResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    spotify: Option<Value>,
    #[serde(default)]
    musicbrainz: Option<Value>,
    #[serde(default)]
    deezer: Option<Value>,
    #[serde(rename = "isrc", default)]
    isrc: Option<String>,
}

/// `POST https://api.audd.io/` multipart with `api_token`,
/// `return=spotify,musicbrainz,deezer,isrc`, and `file` (WAV bytes of the
/// captured window). Accept when `status == "success"` and `result` is
/// present (§4.5).
pub async fn lookup(
    http: &reqwest::Client,
    api_key: &str,
    pcm: &[i16],
    sample_rate: u32,
) -> Result<Option<RecognitionEnvelope>> {
    let wav_bytes = encode_wav(pcm, sample_rate)?;

    let form = reqwest::multipart::Form::new()
        .text("api_token", api_key.to_string())
        .text("return", "spotify,musicbrainz,deezer,isrc")
        .part("file", reqwest::multipart::Part::bytes(wav_bytes).file_name("capture.wav"));

    let response = http.post(ENDPOINT).multipart(form).send().await?;
    let parsed: AuddResponse = response.json().await?;

    if parsed.status != "success" {
        return Ok(None);
    }

    let Some(result) = parsed.result else {
        return Ok(None);
    };

    let confidence = match result.score.as_ref() {
        Some(Value::Number(n)) => {
            let raw = n.as_f64().unwrap_or(0.0);
            if (1.0..=100.0).contains(&raw) { raw / 100.0 } else { raw }
        }
        _ => 0.8,
    };

    let musicbrainz_id = result
        .musicbrainz
        .as_ref()
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(Some(RecognitionEnvelope {
        track_info: TrackInfo {
            title: result.title,
            artist: result.artist,
            album: result.album,
            isrc: result.isrc,
            label: result.label,
            release_date: result.release_date,
            duration_seconds: None,
            musicbrainz_id,
        },
        confidence,
        source: "audd",
    }))
}

fn encode_wav(pcm: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| PipelineError::Extraction(format!("wav encode failed: {e}")))?;
        for &sample in pcm {
            writer
                .write_sample(sample)
                .map_err(|e| PipelineError::Extraction(format!("wav encode failed: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| PipelineError::Extraction(format!("wav encode failed: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wav_produces_riff_header() {
        let pcm = vec![0i16; 1000];
        let bytes = encode_wav(&pcm, 44100).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
    }

    #[test]
    fn score_in_percent_range_is_divided_by_100() {
        let body = r#"{"status":"success","result":{"score":88}}"#;
        let parsed: AuddResponse = serde_json::from_str(body).unwrap();
        let score = parsed.result.unwrap().score.unwrap();
        assert_eq!(score.as_f64().unwrap(), 88.0);
    }

    #[test]
    fn missing_result_is_none() {
        let body = r#"{"status":"success","result":null}"#;
        let parsed: AuddResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.result.is_none());
    }
}
