//! Fingerprint Store (C3, §4.3)
//!
//! Owns the `fingerprints` table: exact-hash lookup (the O(1) primary path),
//! approximate matching over fixed-length content hashes, and idempotent
//! attachment that keeps a Track's `primary_fingerprint_hash` in sync.

use crate::error::{PipelineError, Result};
use chrono::Utc;
use sodav_common::models::{Fingerprint, FingerprintAlgorithm, Track};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Similarity floor for `approximate_match` (§4.3 default).
pub const DEFAULT_APPROXIMATE_THRESHOLD: f64 = 0.85;

pub async fn find_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<Fingerprint>> {
    let row = sqlx::query_as::<_, Fingerprint>("SELECT * FROM fingerprints WHERE hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await
        .map_err(sodav_common::Error::from)?;
    Ok(row)
}

/// Best approximate candidate for `raw` among fingerprints of the same
/// `algorithm` and byte length, by normalized Hamming similarity (§4.3,
/// Open Question 2: a fixed-length Hamming comparison replaces the
/// source's ordinal-cosine similarity, which doesn't make sense for a
/// fingerprint metric).
///
/// Ties break by offset proximity to zero, then by the older fingerprint id.
pub async fn approximate_match(
    pool: &SqlitePool,
    algorithm: FingerprintAlgorithm,
    raw: &[u8],
    threshold: f64,
) -> Result<Option<(Track, f64)>> {
    let candidates = sqlx::query_as::<_, Fingerprint>(
        "SELECT * FROM fingerprints WHERE algorithm = ? AND length(raw_data) = ?",
    )
    .bind(algorithm.as_str())
    .bind(raw.len() as i64)
    .fetch_all(pool)
    .await
    .map_err(sodav_common::Error::from)?;

    let mut best: Option<(Fingerprint, f64)> = None;
    for candidate in candidates {
        let similarity = hamming_similarity(raw, &candidate.raw_data);
        if similarity < threshold {
            continue;
        }
        best = match best {
            None => Some((candidate, similarity)),
            Some((ref current, current_sim)) => {
                if similarity > current_sim
                    || (similarity == current_sim && is_better_tiebreak(&candidate, current))
                {
                    Some((candidate, similarity))
                } else {
                    best
                }
            }
        };
    }

    let Some((fingerprint, similarity)) = best else {
        return Ok(None);
    };

    let track = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
        .bind(fingerprint.track_id)
        .fetch_optional(pool)
        .await
        .map_err(sodav_common::Error::from)?
        .ok_or_else(|| PipelineError::Extraction("fingerprint references missing track".to_string()))?;

    Ok(Some((track, similarity)))
}

/// Lower offset-from-zero wins; on a further tie, the older (smaller
/// creation timestamp, then lower id) fingerprint wins (§4.3, §4.4).
fn is_better_tiebreak(candidate: &Fingerprint, current: &Fingerprint) -> bool {
    let candidate_offset = candidate.offset_seconds.abs();
    let current_offset = current.offset_seconds.abs();
    if candidate_offset != current_offset {
        return candidate_offset < current_offset;
    }
    if candidate.created_at != current.created_at {
        return candidate.created_at < current.created_at;
    }
    candidate.id < current.id
}

fn hamming_similarity(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let differing_bits: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum();
    let total_bits = (a.len() * 8) as f64;
    1.0 - (differing_bits as f64 / total_bits)
}

/// Attach a fingerprint to a track, idempotent on `(track_id, algorithm, hash)`.
/// The first fingerprint ever attached to a track becomes its primary.
pub async fn attach(
    pool: &SqlitePool,
    track_id: Uuid,
    hash: &str,
    raw: &[u8],
    offset_seconds: f64,
    algorithm: FingerprintAlgorithm,
) -> Result<Fingerprint> {
    if let Some(existing) = sqlx::query_as::<_, Fingerprint>(
        "SELECT * FROM fingerprints WHERE track_id = ? AND algorithm = ? AND hash = ?",
    )
    .bind(track_id)
    .bind(algorithm.as_str())
    .bind(hash)
    .fetch_optional(pool)
    .await
    .map_err(sodav_common::Error::from)?
    {
        return Ok(existing);
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await.map_err(sodav_common::Error::from)?;

    sqlx::query(
        "INSERT INTO fingerprints (id, track_id, hash, raw_data, offset_seconds, algorithm, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(track_id)
    .bind(hash)
    .bind(raw)
    .bind(offset_seconds)
    .bind(algorithm.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(sodav_common::Error::from)?;

    sqlx::query(
        "UPDATE tracks SET primary_fingerprint_hash = COALESCE(primary_fingerprint_hash, ?), updated_at = ?
         WHERE id = ?",
    )
    .bind(hash)
    .bind(now)
    .bind(track_id)
    .execute(&mut *tx)
    .await
    .map_err(sodav_common::Error::from)?;

    tx.commit().await.map_err(sodav_common::Error::from)?;

    Ok(Fingerprint {
        id,
        track_id,
        hash: hash.to_string(),
        raw_data: raw.to_vec(),
        offset_seconds,
        algorithm: algorithm.as_str().to_string(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_are_fully_similar() {
        let a = vec![0xABu8, 0xCD, 0xEF];
        assert_eq!(hamming_similarity(&a, &a), 1.0);
    }

    #[test]
    fn fully_inverted_bytes_are_not_similar() {
        let a = vec![0x00u8, 0x00];
        let b = vec![0xFFu8, 0xFF];
        assert_eq!(hamming_similarity(&a, &b), 0.0);
    }

    #[test]
    fn one_flipped_bit_reduces_similarity_slightly() {
        let a = vec![0b0000_0000u8; 8];
        let mut b = a.clone();
        b[0] = 0b0000_0001;
        let similarity = hamming_similarity(&a, &b);
        assert!(similarity > 0.98 && similarity < 1.0);
    }

    #[test]
    fn mismatched_lengths_are_not_similar() {
        assert_eq!(hamming_similarity(&[1, 2, 3], &[1, 2]), 0.0);
    }
}
