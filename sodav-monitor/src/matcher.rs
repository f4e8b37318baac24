//! Local Matcher (C4, §4.4)
//!
//! Tries the Fingerprint Store's exact path first, then the approximate
//! path, and returns a typed match envelope or nothing.

use crate::error::Result;
use crate::features::Features;
use crate::store::{self, DEFAULT_APPROXIMATE_THRESHOLD};
use sodav_common::models::{FingerprintAlgorithm, Track};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    LocalExact,
    LocalApproximate,
}

impl MatchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::LocalExact => "local_exact",
            MatchMethod::LocalApproximate => "local_approximate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalMatch {
    pub track: Track,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Resolve `Features` against the local store: exact content-hash hit first
/// (confidence 1.0), then approximate match, then `None` (§4.4).
pub async fn find_local_match(pool: &SqlitePool, features: &Features) -> Result<Option<LocalMatch>> {
    if let Some(fingerprint) = store::find_by_hash(pool, &features.content_hash).await? {
        let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(fingerprint.track_id)
            .fetch_optional(pool)
            .await
            .map_err(sodav_common::Error::from)?;

        if let Some(track) = track {
            return Ok(Some(LocalMatch {
                track,
                confidence: 1.0,
                method: MatchMethod::LocalExact,
            }));
        }
    }

    if let Some((track, similarity)) = store::approximate_match(
        pool,
        FingerprintAlgorithm::ContentHash,
        &features.content_raw,
        DEFAULT_APPROXIMATE_THRESHOLD,
    )
    .await?
    {
        return Ok(Some(LocalMatch {
            track,
            confidence: similarity,
            method: MatchMethod::LocalApproximate,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_strings_match_detection_method_tags() {
        assert_eq!(MatchMethod::LocalExact.as_str(), "local_exact");
        assert_eq!(MatchMethod::LocalApproximate.as_str(), "local_approximate");
    }
}
