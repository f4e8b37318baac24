//! Database schema bootstrap and connection pool
//!
//! Schema migrations proper are out of scope (§1); this module only
//! creates the tables the core needs on a fresh database so tests and
//! local runs don't depend on an external migration tool.

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Open a connection pool against `database_url` and ensure the schema exists.
///
/// `pool_size` should be at least `max_concurrent + 2` per §5.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables used by the detection pipeline core if they don't already exist.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT,
            label TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist_id TEXT NOT NULL REFERENCES artists(id),
            album TEXT,
            isrc TEXT,
            label TEXT,
            release_date TEXT,
            duration_seconds REAL,
            primary_fingerprint_hash TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_title_artist ON tracks(title, artist_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
            hash TEXT NOT NULL,
            raw_data BLOB NOT NULL,
            offset_seconds REAL NOT NULL DEFAULT 0,
            algorithm TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(track_id, algorithm, hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints(hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_algorithm ON fingerprints(algorithm)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS radio_stations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            stream_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Active',
            last_check TIMESTAMP,
            last_success TIMESTAMP,
            last_detection_time TIMESTAMP,
            consecutive_error_count INTEGER NOT NULL DEFAULT 0,
            country TEXT,
            language TEXT,
            region TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_detections (
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL REFERENCES tracks(id),
            station_id TEXT NOT NULL REFERENCES radio_stations(id),
            detected_at TIMESTAMP NOT NULL,
            end_time TIMESTAMP,
            play_duration_seconds REAL NOT NULL,
            is_estimated INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL,
            fingerprint_hash TEXT,
            detection_method TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_detections_track ON track_detections(track_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_detections_station ON track_detections(station_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_stats (
            track_id TEXT PRIMARY KEY REFERENCES tracks(id),
            total_plays INTEGER NOT NULL DEFAULT 0,
            total_play_time_seconds REAL NOT NULL DEFAULT 0,
            last_detected TIMESTAMP,
            avg_confidence REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_stats (
            artist_id TEXT PRIMARY KEY REFERENCES artists(id),
            total_plays INTEGER NOT NULL DEFAULT 0,
            total_play_time_seconds REAL NOT NULL DEFAULT 0,
            last_detected TIMESTAMP,
            avg_confidence REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_track_stats (
            station_id TEXT NOT NULL REFERENCES radio_stations(id),
            track_id TEXT NOT NULL REFERENCES tracks(id),
            play_count INTEGER NOT NULL DEFAULT 0,
            total_play_time_seconds REAL NOT NULL DEFAULT 0,
            last_played TIMESTAMP,
            avg_confidence REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (station_id, track_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_stats (
            station_id TEXT PRIMARY KEY REFERENCES radio_stations(id),
            detection_count INTEGER NOT NULL DEFAULT 0,
            last_detected TIMESTAMP,
            avg_confidence REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detection_hourly (
            bucket TIMESTAMP PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detection_daily (
            bucket TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detection_monthly (
            bucket TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_daily (
            track_id TEXT NOT NULL REFERENCES tracks(id),
            bucket TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (track_id, bucket)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_monthly (
            track_id TEXT NOT NULL REFERENCES tracks(id),
            bucket TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (track_id, bucket)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_daily (
            artist_id TEXT NOT NULL REFERENCES artists(id),
            bucket TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            total_play_time_seconds REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (artist_id, bucket)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_monthly (
            artist_id TEXT NOT NULL REFERENCES artists(id),
            bucket TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            total_play_time_seconds REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (artist_id, bucket)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creates_on_fresh_memory_db() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='track_detections'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        create_schema(&pool).await.unwrap();
    }
}
