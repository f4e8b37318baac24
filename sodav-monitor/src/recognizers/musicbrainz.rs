//! MusicBrainz-by-metadata recognizer (§4.5 step 2, §6)
//!
//! Not part of `run_chain`'s automatic fallback order — it needs a
//! `{title, artist}` hint that nothing upstream of this pipeline produces.
//! Kept as a directly callable, directly tested recognizer for a future
//! caller that does have one.

use super::{RecognitionEnvelope, TrackInfo};
use crate::error::Result;
use serde::Deserialize;

const SEARCH_URL: &str = "https://musicbrainz.org/ws/2/recording";
const USER_AGENT: &str = "SODAV-Monitor/1.0 (contact@sodav.sn)";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    recordings: Vec<RecordingHit>,
}

#[derive(Debug, Deserialize)]
struct RecordingHit {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IsrcLookupResponse {
    #[serde(default)]
    isrcs: Vec<String>,
}

/// `GET /ws/2/recording?query=recording:"T" AND artist:"A"&limit=1&fmt=json`.
/// Confidence is the mean of the title and artist normalized string
/// similarities against the best hit (§4.5).
pub async fn lookup_by_metadata(
    http: &reqwest::Client,
    title: &str,
    artist: &str,
) -> Result<Option<RecognitionEnvelope>> {
    let query = format!("recording:\"{title}\" AND artist:\"{artist}\"");

    let response = http
        .get(SEARCH_URL)
        .header("User-Agent", USER_AGENT)
        .query(&[("query", query.as_str()), ("limit", "1"), ("fmt", "json")])
        .send()
        .await?;

    let parsed: SearchResponse = response.json().await?;

    let Some(hit) = parsed.recordings.into_iter().next() else {
        return Ok(None);
    };

    let hit_artist = hit.artist_credit.first().map(|a| a.name.clone()).unwrap_or_default();
    let title_similarity = normalized_similarity(title, &hit.title);
    let artist_similarity = normalized_similarity(artist, &hit_artist);
    let confidence = (title_similarity + artist_similarity) / 2.0;

    let isrc = fetch_isrc(http, &hit.id).await.unwrap_or(None);
    let release = hit.releases.into_iter().next();

    Ok(Some(RecognitionEnvelope {
        track_info: TrackInfo {
            title: Some(hit.title),
            artist: Some(hit_artist),
            album: release.as_ref().and_then(|r| r.title.clone()),
            isrc,
            label: None,
            release_date: release.and_then(|r| r.date),
            duration_seconds: None,
            musicbrainz_id: Some(hit.id),
        },
        confidence,
        source: "musicbrainz",
    }))
}

/// Optional follow-up: `GET recording/{id}?inc=isrcs&fmt=json`.
async fn fetch_isrc(http: &reqwest::Client, recording_id: &str) -> Result<Option<String>> {
    let url = format!("{SEARCH_URL}/{recording_id}");
    let response = http
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .query(&[("inc", "isrcs"), ("fmt", "json")])
        .send()
        .await?;
    let parsed: IsrcLookupResponse = response.json().await?;
    Ok(parsed.isrcs.into_iter().next())
}

/// Case-insensitive Jaro-Winkler similarity in `[0.0, 1.0]`.
fn normalized_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_fully_similar() {
        assert_eq!(normalized_similarity("Song Title", "song title"), 1.0);
    }

    #[test]
    fn dissimilar_strings_score_low() {
        assert!(normalized_similarity("Song Title", "zzz") < 0.6);
    }

    #[test]
    fn deserializes_search_response_with_artist_credit() {
        let body = r#"{
            "recordings":[{
                "id":"abc-123",
                "title":"Song",
                "artist-credit":[{"name":"Artist"}],
                "releases":[{"title":"Album","date":"2020-01-01"}]
            }]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.recordings[0].title, "Song");
        assert_eq!(parsed.recordings[0].artist_credit[0].name, "Artist");
    }
}
