//! Stats Updater (C8, §4.8)
//!
//! Single transaction per detection: upserts the per-track/artist/station
//! aggregates and the hourly/daily/monthly buckets, then stamps the
//! station's `last_detection_time`. Wrapped in `retry::retry_on_lock` to
//! stand in for SERIALIZABLE-with-retry on SQLite (§5).
//!
//! The station's lifecycle fields (`status`, `consecutive_error_count`,
//! `last_check`, `last_success`) are a separate unit of work — they
//! reflect whether a check cycle *ran*, not whether it found a track — and
//! are owned by `sodav_common::stations::record_check_result` (§15),
//! called once per cycle by the orchestrator regardless of whether this
//! function runs at all.

use crate::retry::retry_on_lock;
use crate::tracker::MIN_DURATION_SECONDS;
use chrono::{DateTime, Timelike, Utc};
use sodav_common::models::running_average;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Record one finalized detection's effect on every aggregate (§4.8 steps 1-6).
/// Detections shorter than `MIN_DURATION_SECONDS` are skipped for the
/// per-entity/bucket aggregates (P5) but still stamp the station's
/// `last_detection_time`, since the station plainly produced a signal.
pub async fn record_detection(
    pool: &SqlitePool,
    artist_id: Uuid,
    track_id: Uuid,
    station_id: Uuid,
    detected_at: DateTime<Utc>,
    play_duration_seconds: f64,
    confidence: f64,
) -> sodav_common::Result<()> {
    retry_on_lock(|| async {
        let mut tx = pool.begin().await?;

        if play_duration_seconds >= MIN_DURATION_SECONDS as f64 {
            upsert_track_stats(&mut tx, track_id, detected_at, play_duration_seconds, confidence).await?;
            upsert_artist_stats(&mut tx, artist_id, detected_at, play_duration_seconds, confidence).await?;
            upsert_station_track_stats(&mut tx, station_id, track_id, detected_at, play_duration_seconds, confidence)
                .await?;
            upsert_station_stats(&mut tx, station_id, detected_at, confidence).await?;
            upsert_buckets(&mut tx, artist_id, track_id, detected_at, play_duration_seconds).await?;
        }

        sqlx::query("UPDATE radio_stations SET last_detection_time = ?, updated_at = ? WHERE id = ?")
            .bind(detected_at)
            .bind(Utc::now())
            .bind(station_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    })
    .await
}

async fn upsert_track_stats(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    track_id: Uuid,
    detected_at: DateTime<Utc>,
    play_duration_seconds: f64,
    confidence: f64,
) -> sodav_common::Result<()> {
    let existing: Option<(i64, f64, f64)> = sqlx::query_as(
        "SELECT total_plays, total_play_time_seconds, avg_confidence FROM track_stats WHERE track_id = ?",
    )
    .bind(track_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (old_plays, old_time, old_avg) = existing.unwrap_or((0, 0.0, 0.0));
    let new_avg = running_average(old_avg, old_plays, confidence);

    sqlx::query(
        "INSERT INTO track_stats (track_id, total_plays, total_play_time_seconds, last_detected, avg_confidence)
         VALUES (?, 1, ?, ?, ?)
         ON CONFLICT(track_id) DO UPDATE SET
           total_plays = total_plays + 1,
           total_play_time_seconds = total_play_time_seconds + excluded.total_play_time_seconds,
           last_detected = excluded.last_detected,
           avg_confidence = ?",
    )
    .bind(track_id)
    .bind(play_duration_seconds)
    .bind(detected_at)
    .bind(new_avg)
    .bind(new_avg)
    .execute(&mut **tx)
    .await?;

    let _ = old_time;
    Ok(())
}

async fn upsert_artist_stats(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    artist_id: Uuid,
    detected_at: DateTime<Utc>,
    play_duration_seconds: f64,
    confidence: f64,
) -> sodav_common::Result<()> {
    let existing: Option<(i64, f64)> =
        sqlx::query_as("SELECT total_plays, avg_confidence FROM artist_stats WHERE artist_id = ?")
            .bind(artist_id)
            .fetch_optional(&mut **tx)
            .await?;

    let (old_plays, old_avg) = existing.unwrap_or((0, 0.0));
    let new_avg = running_average(old_avg, old_plays, confidence);

    sqlx::query(
        "INSERT INTO artist_stats (artist_id, total_plays, total_play_time_seconds, last_detected, avg_confidence)
         VALUES (?, 1, ?, ?, ?)
         ON CONFLICT(artist_id) DO UPDATE SET
           total_plays = total_plays + 1,
           total_play_time_seconds = total_play_time_seconds + excluded.total_play_time_seconds,
           last_detected = excluded.last_detected,
           avg_confidence = ?",
    )
    .bind(artist_id)
    .bind(play_duration_seconds)
    .bind(detected_at)
    .bind(new_avg)
    .bind(new_avg)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_station_track_stats(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    station_id: Uuid,
    track_id: Uuid,
    detected_at: DateTime<Utc>,
    play_duration_seconds: f64,
    confidence: f64,
) -> sodav_common::Result<()> {
    let existing: Option<(i64, f64)> = sqlx::query_as(
        "SELECT play_count, avg_confidence FROM station_track_stats WHERE station_id = ? AND track_id = ?",
    )
    .bind(station_id)
    .bind(track_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (old_count, old_avg) = existing.unwrap_or((0, 0.0));
    let new_avg = running_average(old_avg, old_count, confidence);

    sqlx::query(
        "INSERT INTO station_track_stats (station_id, track_id, play_count, total_play_time_seconds, last_played, avg_confidence)
         VALUES (?, ?, 1, ?, ?, ?)
         ON CONFLICT(station_id, track_id) DO UPDATE SET
           play_count = play_count + 1,
           total_play_time_seconds = total_play_time_seconds + excluded.total_play_time_seconds,
           last_played = excluded.last_played,
           avg_confidence = ?",
    )
    .bind(station_id)
    .bind(track_id)
    .bind(play_duration_seconds)
    .bind(detected_at)
    .bind(new_avg)
    .bind(new_avg)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_station_stats(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    station_id: Uuid,
    detected_at: DateTime<Utc>,
    confidence: f64,
) -> sodav_common::Result<()> {
    let existing: Option<(i64, f64)> =
        sqlx::query_as("SELECT detection_count, avg_confidence FROM station_stats WHERE station_id = ?")
            .bind(station_id)
            .fetch_optional(&mut **tx)
            .await?;

    let (old_count, old_avg) = existing.unwrap_or((0, 0.0));
    let new_avg = running_average(old_avg, old_count, confidence);

    sqlx::query(
        "INSERT INTO station_stats (station_id, detection_count, last_detected, avg_confidence)
         VALUES (?, 1, ?, ?)
         ON CONFLICT(station_id) DO UPDATE SET
           detection_count = detection_count + 1,
           last_detected = excluded.last_detected,
           avg_confidence = ?",
    )
    .bind(station_id)
    .bind(detected_at)
    .bind(new_avg)
    .bind(new_avg)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_buckets(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    artist_id: Uuid,
    track_id: Uuid,
    detected_at: DateTime<Utc>,
    play_duration_seconds: f64,
) -> sodav_common::Result<()> {
    let hour_bucket = floor_hour(detected_at);
    let day_bucket = detected_at.format("%Y-%m-%d").to_string();
    let month_bucket = detected_at.format("%Y-%m").to_string();

    sqlx::query(
        "INSERT INTO detection_hourly (bucket, count) VALUES (?, 1)
         ON CONFLICT(bucket) DO UPDATE SET count = count + 1",
    )
    .bind(hour_bucket)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO detection_daily (bucket, count) VALUES (?, 1)
         ON CONFLICT(bucket) DO UPDATE SET count = count + 1",
    )
    .bind(&day_bucket)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO detection_monthly (bucket, count) VALUES (?, 1)
         ON CONFLICT(bucket) DO UPDATE SET count = count + 1",
    )
    .bind(&month_bucket)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO track_daily (track_id, bucket, count) VALUES (?, ?, 1)
         ON CONFLICT(track_id, bucket) DO UPDATE SET count = count + 1",
    )
    .bind(track_id)
    .bind(&day_bucket)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO track_monthly (track_id, bucket, count) VALUES (?, ?, 1)
         ON CONFLICT(track_id, bucket) DO UPDATE SET count = count + 1",
    )
    .bind(track_id)
    .bind(&month_bucket)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO artist_daily (artist_id, bucket, count, total_play_time_seconds) VALUES (?, ?, 1, ?)
         ON CONFLICT(artist_id, bucket) DO UPDATE SET
           count = count + 1,
           total_play_time_seconds = total_play_time_seconds + excluded.total_play_time_seconds",
    )
    .bind(artist_id)
    .bind(&day_bucket)
    .bind(play_duration_seconds)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO artist_monthly (artist_id, bucket, count, total_play_time_seconds) VALUES (?, ?, 1, ?)
         ON CONFLICT(artist_id, bucket) DO UPDATE SET
           count = count + 1,
           total_play_time_seconds = total_play_time_seconds + excluded.total_play_time_seconds",
    )
    .bind(artist_id)
    .bind(&month_bucket)
    .bind(play_duration_seconds)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn floor_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Transition any station with no detection in the last hour to `Inactive`
/// (§4.8 step 6, second half). Run periodically by the Station Orchestrator.
pub async fn mark_stale_stations_inactive(pool: &SqlitePool) -> sodav_common::Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::hours(1);
    let result = sqlx::query(
        "UPDATE radio_stations SET status = 'Inactive', updated_at = ?
         WHERE status = 'Active' AND (last_detection_time IS NULL OR last_detection_time < ?)",
    )
    .bind(Utc::now())
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn floor_hour_zeroes_minutes_and_seconds() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 14, 37, 52).unwrap();
        let floored = floor_hour(dt);
        assert_eq!(floored.minute(), 0);
        assert_eq!(floored.second(), 0);
        assert_eq!(floored.hour(), 14);
    }

    #[tokio::test]
    async fn recording_first_detection_initializes_all_aggregates() {
        let pool = sodav_common::db::connect("sqlite::memory:", 1).await.unwrap();
        let artist_id = Uuid::new_v4();
        let track_id = Uuid::new_v4();
        let station_id = Uuid::new_v4();

        sqlx::query("INSERT INTO artists (id, name) VALUES (?, 'A')")
            .bind(artist_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO tracks (id, title, artist_id) VALUES (?, 'T', ?)")
            .bind(track_id)
            .bind(artist_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO radio_stations (id, name, stream_url) VALUES (?, 'S', 'http://x')")
            .bind(station_id)
            .execute(&pool)
            .await
            .unwrap();

        record_detection(&pool, artist_id, track_id, station_id, Utc::now(), 30.0, 0.9)
            .await
            .unwrap();

        let total_plays: i64 = sqlx::query_scalar("SELECT total_plays FROM track_stats WHERE track_id = ?")
            .bind(track_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total_plays, 1);
    }

    #[tokio::test]
    async fn short_detection_is_skipped_from_aggregates() {
        let pool = sodav_common::db::connect("sqlite::memory:", 1).await.unwrap();
        let artist_id = Uuid::new_v4();
        let track_id = Uuid::new_v4();
        let station_id = Uuid::new_v4();

        sqlx::query("INSERT INTO artists (id, name) VALUES (?, 'A')")
            .bind(artist_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO tracks (id, title, artist_id) VALUES (?, 'T', ?)")
            .bind(track_id)
            .bind(artist_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO radio_stations (id, name, stream_url) VALUES (?, 'S', 'http://x')")
            .bind(station_id)
            .execute(&pool)
            .await
            .unwrap();

        record_detection(&pool, artist_id, track_id, station_id, Utc::now(), 2.0, 0.9)
            .await
            .unwrap();

        let row: Option<i64> = sqlx::query_scalar("SELECT total_plays FROM track_stats WHERE track_id = ?")
            .bind(track_id)
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(row.is_none());
    }
}
