//! End-to-end scenarios from the detection pipeline's testable-properties
//! list: local exact match, ISRC duplicate collapse, and short-gap vs.
//! long-gap resume merging.

use chrono::Utc;
use sodav_common::db;
use sodav_common::models::FingerprintAlgorithm;
use sodav_monitor::features::Features;
use sodav_monitor::matcher::{self, MatchMethod};
use sodav_monitor::recognizers::TrackInfo;
use sodav_monitor::resolver;
use sodav_monitor::store;
use sodav_monitor::tracker::PlayDurationTracker;
use sqlx::SqlitePool;
use std::time::Duration as StdDuration;
use uuid::Uuid;

async fn memory_pool() -> SqlitePool {
    db::connect("sqlite::memory:", 1).await.unwrap()
}

fn empty_features(content_hash: &str) -> Features {
    Features {
        duration_seconds: 30.0,
        chromaprint: None,
        content_hash: content_hash.to_string(),
        content_raw: vec![0xAB; 32],
        segments: Vec::new(),
        is_music: true,
        music_confidence: 0.9,
    }
}

/// Scenario 1: a Track with a known primary fingerprint hash exists; a
/// capture whose content hash matches it resolves as a local exact match
/// with confidence 1.0.
#[tokio::test]
async fn scenario_clean_match_from_local_store() {
    let pool = memory_pool().await;

    let artist_id = Uuid::new_v4();
    let track_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO artists (id, name, created_at, updated_at) VALUES (?, 'X', ?, ?)")
        .bind(artist_id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO tracks (id, title, artist_id, created_at, updated_at) VALUES (?, 'Y', ?, ?, ?)",
    )
    .bind(track_id)
    .bind(artist_id)
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();

    store::attach(&pool, track_id, "H", &[1, 2, 3, 4], 0.0, FingerprintAlgorithm::ContentHash)
        .await
        .unwrap();

    let features = empty_features("H");
    let result = matcher::find_local_match(&pool, &features).await.unwrap();

    let matched = result.expect("expected a local match");
    assert_eq!(matched.track.id, track_id);
    assert_eq!(matched.confidence, 1.0);
    assert_eq!(matched.method, MatchMethod::LocalExact);
}

/// Scenario 6: two external hits carrying the same ISRC in different
/// hyphenation/casing, with different titles, collapse onto one Track
/// and the second cycle backfills any still-missing optional field.
#[tokio::test]
async fn scenario_isrc_duplicate_collapses_to_one_track() {
    let pool = memory_pool().await;
    let artist = resolver::get_or_create_artist(&pool, Some("Artist")).await.unwrap();

    let first = resolver::get_or_create_track(
        &pool,
        artist.id,
        &TrackInfo {
            title: Some("Song".to_string()),
            isrc: Some("US-ABC-12-34567".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let second = resolver::get_or_create_track(
        &pool,
        artist.id,
        &TrackInfo {
            title: Some("Song (Remastered)".to_string()),
            isrc: Some("usabc1234567".to_string()),
            album: Some("Greatest Hits".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.album.as_deref(), Some("Greatest Hits"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

/// Scenario 2 (P4): stop_tracking(silence=true) followed by start_tracking
/// within the merge threshold yields one session whose accumulated
/// duration is the sum of both uninterrupted runs, and whose original
/// start time survives the resume.
#[tokio::test]
async fn short_gap_resume_merges_into_one_session() {
    let tracker = PlayDurationTracker::new(2, 1);
    let station = Uuid::new_v4();
    let track = Uuid::new_v4();

    let original_start = tracker.start_tracking(station, track);
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    let outcome = tracker.stop_tracking(station, track, true).unwrap();
    assert!(outcome.duration.num_milliseconds() >= 250);

    tokio::time::sleep(StdDuration::from_millis(200)).await;
    let resumed_start = tracker.start_tracking(station, track);
    assert_eq!(original_start, resumed_start);

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    let final_outcome = tracker.stop_tracking(station, track, false).unwrap();
    assert!(final_outcome.duration.num_milliseconds() >= 550);
}

/// Scenario 3: a gap longer than the merge threshold does not merge —
/// the interrupted entry has already expired from the tracker's view by
/// the time the second `start_tracking` arrives, so a fresh session begins.
#[tokio::test]
async fn long_gap_does_not_merge() {
    let tracker = PlayDurationTracker::new(0, 1);
    let station = Uuid::new_v4();
    let track = Uuid::new_v4();

    let original_start = tracker.start_tracking(station, track);
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    tracker.stop_tracking(station, track, true).unwrap();

    // merge_threshold is effectively zero, so any measurable gap exceeds it.
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    let resumed_start = tracker.start_tracking(station, track);
    assert_ne!(original_start, resumed_start);
}
