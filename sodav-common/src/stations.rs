//! Station repository: the `radio_stations` lifecycle operation (§15).
//!
//! The original performs "record the outcome of a check" as one unit of
//! work — bump or reset `consecutive_error_count`, flip `status`, and set
//! `last_check`/`last_success` — rather than as separate partial updates
//! from whichever caller happens to notice success or failure.

use crate::models::StationStatus;
use crate::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Record the outcome of one check cycle for `station_id`, atomically:
/// `success` resets `consecutive_error_count` to 0, sets `last_check` and
/// `last_success`, and marks the station `Active`; failure increments the
/// counter, sets only `last_check`, and trips the station to `Error` once
/// `CONSECUTIVE_ERROR_THRESHOLD` consecutive failures have accrued (P8).
pub async fn record_check_result(pool: &SqlitePool, station_id: Uuid, success: bool) -> Result<()> {
    let now = Utc::now();

    if success {
        sqlx::query(
            "UPDATE radio_stations
             SET consecutive_error_count = 0, status = ?, last_check = ?, last_success = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(StationStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(station_id)
        .execute(pool)
        .await?;

        return Ok(());
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT consecutive_error_count FROM radio_stations WHERE id = ?")
        .bind(station_id)
        .fetch_optional(pool)
        .await?;

    let Some((count,)) = row else {
        return Ok(());
    };

    let new_count = count + 1;
    let status = if new_count >= crate::models::CONSECUTIVE_ERROR_THRESHOLD as i64 {
        StationStatus::Error
    } else {
        StationStatus::Active
    };

    sqlx::query(
        "UPDATE radio_stations
         SET consecutive_error_count = ?, status = ?, last_check = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(new_count)
    .bind(status.as_str())
    .bind(now)
    .bind(now)
    .bind(station_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seeded_station(pool: &SqlitePool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO radio_stations (id, name, stream_url) VALUES (?, 'S', 'http://x')")
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn three_failures_trip_to_error() {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let station_id = seeded_station(&pool).await;

        for _ in 0..3 {
            record_check_result(&pool, station_id, false).await.unwrap();
        }

        let (status, count): (String, i64) =
            sqlx::query_as("SELECT status, consecutive_error_count FROM radio_stations WHERE id = ?")
                .bind(station_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "Error");
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn success_after_errors_resets_counter_and_last_success() {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let station_id = seeded_station(&pool).await;

        for _ in 0..3 {
            record_check_result(&pool, station_id, false).await.unwrap();
        }
        record_check_result(&pool, station_id, true).await.unwrap();

        let (status, count, last_success): (String, i64, Option<chrono::DateTime<Utc>>) = sqlx::query_as(
            "SELECT status, consecutive_error_count, last_success FROM radio_stations WHERE id = ?",
        )
        .bind(station_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(status, "Active");
        assert_eq!(count, 0);
        assert!(last_success.is_some());
    }
}
