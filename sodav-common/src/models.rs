//! Shared domain models (§3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Default artist name applied when none is supplied (§4.6).
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Default track title applied when none is supplied (§3).
pub const UNKNOWN_TRACK: &str = "Unknown Track";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub country: Option<String>,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub artist_id: Uuid,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub label: Option<String>,
    pub release_date: Option<String>,
    pub duration_seconds: Option<f64>,
    pub primary_fingerprint_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fingerprint algorithm tag (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintAlgorithm {
    Md5,
    Chromaprint,
    ContentHash,
}

impl FingerprintAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            FingerprintAlgorithm::Md5 => "md5",
            FingerprintAlgorithm::Chromaprint => "chromaprint",
            FingerprintAlgorithm::ContentHash => "content_hash",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "md5" => Some(FingerprintAlgorithm::Md5),
            "chromaprint" => Some(FingerprintAlgorithm::Chromaprint),
            "content_hash" => Some(FingerprintAlgorithm::ContentHash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Fingerprint {
    pub id: Uuid,
    pub track_id: Uuid,
    pub hash: String,
    pub raw_data: Vec<u8>,
    pub offset_seconds: f64,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

/// Radio station lifecycle status (§3, P8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationStatus {
    Active,
    Inactive,
    Error,
    Maintenance,
}

impl StationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StationStatus::Active => "Active",
            StationStatus::Inactive => "Inactive",
            StationStatus::Error => "Error",
            StationStatus::Maintenance => "Maintenance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(StationStatus::Active),
            "Inactive" => Some(StationStatus::Inactive),
            "Error" => Some(StationStatus::Error),
            "Maintenance" => Some(StationStatus::Maintenance),
            _ => None,
        }
    }
}

/// Number of consecutive failed checks that trips a station into `Error` (P8).
pub const CONSECUTIVE_ERROR_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RadioStation {
    pub id: Uuid,
    pub name: String,
    pub stream_url: String,
    pub status: String,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_detection_time: Option<DateTime<Utc>>,
    pub consecutive_error_count: i64,
    pub country: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RadioStation {
    pub fn status(&self) -> Option<StationStatus> {
        StationStatus::from_str(&self.status)
    }
}

/// Identification method recorded alongside a detection (§4.4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    LocalExact,
    LocalApproximate,
    AcoustId,
    MusicBrainzMetadata,
    AudD,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::LocalExact => "local_exact",
            DetectionMethod::LocalApproximate => "local_approximate",
            DetectionMethod::AcoustId => "acoustid",
            DetectionMethod::MusicBrainzMetadata => "musicbrainz_metadata",
            DetectionMethod::AudD => "audd",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackDetection {
    pub id: Uuid,
    pub track_id: Uuid,
    pub station_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub play_duration_seconds: f64,
    pub is_estimated: bool,
    pub confidence: f64,
    pub fingerprint_hash: Option<String>,
    pub detection_method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackStats {
    pub track_id: Uuid,
    pub total_plays: i64,
    pub total_play_time_seconds: f64,
    pub last_detected: Option<DateTime<Utc>>,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArtistStats {
    pub artist_id: Uuid,
    pub total_plays: i64,
    pub total_play_time_seconds: f64,
    pub last_detected: Option<DateTime<Utc>>,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StationTrackStats {
    pub station_id: Uuid,
    pub track_id: Uuid,
    pub play_count: i64,
    pub total_play_time_seconds: f64,
    pub last_played: Option<DateTime<Utc>>,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StationStats {
    pub station_id: Uuid,
    pub detection_count: i64,
    pub last_detected: Option<DateTime<Utc>>,
    pub avg_confidence: f64,
}

/// Running-average update per §4.8 step 1-4: `(avg * old_count + value) / (old_count + 1)`.
pub fn running_average(old_avg: f64, old_count: i64, value: f64) -> f64 {
    (old_avg * old_count as f64 + value) / (old_count as f64 + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_matches_batch_mean() {
        let values = [1.0, 0.5, 0.8, 0.9];
        let mut avg = 0.0;
        for (i, v) in values.iter().enumerate() {
            avg = running_average(avg, i as i64, *v);
        }
        let batch_mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((avg - batch_mean).abs() < 1e-9);
    }

    #[test]
    fn station_status_round_trips() {
        for s in [
            StationStatus::Active,
            StationStatus::Inactive,
            StationStatus::Error,
            StationStatus::Maintenance,
        ] {
            assert_eq!(StationStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn fingerprint_algorithm_round_trips() {
        for a in [
            FingerprintAlgorithm::Md5,
            FingerprintAlgorithm::Chromaprint,
            FingerprintAlgorithm::ContentHash,
        ] {
            assert_eq!(FingerprintAlgorithm::from_str(a.as_str()), Some(a));
        }
    }
}
