//! Track / Artist Resolver (C6, §4.6)

use crate::error::Result;
use crate::recognizers::TrackInfo;
use chrono::Utc;
use sodav_common::isrc::normalize_isrc;
use sodav_common::models::{Artist, Track, UNKNOWN_ARTIST, UNKNOWN_TRACK};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Get-or-create an artist by exact (case-sensitive) name. Blank/whitespace
/// names normalize to `UNKNOWN_ARTIST` (§4.6).
pub async fn get_or_create_artist(pool: &SqlitePool, name: Option<&str>) -> Result<Artist> {
    let name = normalize_name(name, UNKNOWN_ARTIST);

    if let Some(existing) = sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE name = ?")
        .bind(&name)
        .fetch_optional(pool)
        .await
        .map_err(sodav_common::Error::from)?
    {
        return Ok(existing);
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query("INSERT INTO artists (id, name, country, label, created_at, updated_at) VALUES (?, ?, NULL, NULL, ?, ?)")
        .bind(id)
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(sodav_common::Error::from)?;

    Ok(Artist {
        id,
        name,
        country: None,
        label: None,
        created_at: now,
        updated_at: now,
    })
}

/// Get-or-create a track by `(title, artist_id)` and, when a valid ISRC is
/// supplied, also by that ISRC. Newly-supplied optional fields merge into
/// previously-null columns on an existing row (§4.6).
pub async fn get_or_create_track(
    pool: &SqlitePool,
    artist_id: Uuid,
    info: &TrackInfo,
) -> Result<Track> {
    let title = normalize_name(info.title.as_deref(), UNKNOWN_TRACK);
    let isrc = info.isrc.as_deref().and_then(normalize_isrc);

    let existing = if let Some(isrc) = &isrc {
        sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE isrc = ?")
            .bind(isrc)
            .fetch_optional(pool)
            .await
            .map_err(sodav_common::Error::from)?
    } else {
        None
    };

    let existing = match existing {
        Some(track) => Some(track),
        None => {
            sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE title = ? AND artist_id = ?")
                .bind(&title)
                .bind(artist_id)
                .fetch_optional(pool)
                .await
                .map_err(sodav_common::Error::from)?
        }
    };

    if let Some(track) = existing {
        return merge_missing_fields(pool, track, info, isrc.as_deref()).await;
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO tracks (id, title, artist_id, album, isrc, label, release_date, duration_seconds, primary_fingerprint_hash, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(id)
    .bind(&title)
    .bind(artist_id)
    .bind(&info.album)
    .bind(&isrc)
    .bind(&info.label)
    .bind(&info.release_date)
    .bind(info.duration_seconds)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(sodav_common::Error::from)?;

    Ok(Track {
        id,
        title,
        artist_id,
        album: info.album.clone(),
        isrc,
        label: info.label.clone(),
        release_date: info.release_date.clone(),
        duration_seconds: info.duration_seconds,
        primary_fingerprint_hash: None,
        created_at: now,
        updated_at: now,
    })
}

async fn merge_missing_fields(
    pool: &SqlitePool,
    mut track: Track,
    info: &TrackInfo,
    isrc: Option<&str>,
) -> Result<Track> {
    let mut changed = false;

    if track.album.is_none() && info.album.is_some() {
        track.album = info.album.clone();
        changed = true;
    }
    if track.isrc.is_none() {
        if let Some(isrc) = isrc {
            track.isrc = Some(isrc.to_string());
            changed = true;
        }
    }
    if track.label.is_none() && info.label.is_some() {
        track.label = info.label.clone();
        changed = true;
    }
    if track.release_date.is_none() && info.release_date.is_some() {
        track.release_date = info.release_date.clone();
        changed = true;
    }

    if !changed {
        return Ok(track);
    }

    track.updated_at = Utc::now();
    sqlx::query(
        "UPDATE tracks SET album = ?, isrc = ?, label = ?, release_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&track.album)
    .bind(&track.isrc)
    .bind(&track.label)
    .bind(&track.release_date)
    .bind(track.updated_at)
    .bind(track.id)
    .execute(pool)
    .await
    .map_err(sodav_common::Error::from)?;

    Ok(track)
}

fn normalize_name(name: Option<&str>, fallback: &str) -> String {
    match name.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_normalizes_to_fallback() {
        assert_eq!(normalize_name(Some("   "), UNKNOWN_ARTIST), UNKNOWN_ARTIST);
        assert_eq!(normalize_name(None, UNKNOWN_ARTIST), UNKNOWN_ARTIST);
    }

    #[test]
    fn non_blank_name_is_trimmed() {
        assert_eq!(normalize_name(Some("  X  "), UNKNOWN_ARTIST), "X");
    }
}
