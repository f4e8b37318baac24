//! Station Orchestrator (C9, §4.9, §5)
//!
//! Fans out to N Active stations per cycle, bounded by `max_concurrent`,
//! and drives each station through C1→C2→(C4|C5)→C6→C7→C8. Sleeps between
//! cycles for `interval_seconds - elapsed`, polling a shutdown signal so
//! SIGINT/SIGTERM returns promptly (§4.9).

use crate::capture::{CaptureParams, TerminationReason};
use crate::error::{PipelineError, Result};
use crate::features;
use crate::matcher;
use crate::recognizers;
use crate::resolver;
use crate::stats;
use crate::store;
use crate::tracker::{PlayDurationTracker, INTERRUPTED_TTL_SECONDS};
use crate::transport;
use chrono::{Duration as ChronoDuration, Utc};
use sodav_common::models::{DetectionMethod, FingerprintAlgorithm, RadioStation};
use sodav_common::stations::record_check_result;
use sodav_common::Config;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Wall-time budget per station per cycle (§5: 2x the capture ceiling).
fn per_task_timeout(max_duration: Duration) -> Duration {
    max_duration * 2
}

pub struct Orchestrator {
    pool: SqlitePool,
    http: reqwest::Client,
    config: Config,
    tracker: Arc<PlayDurationTracker>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            http: reqwest::Client::new(),
            config,
            tracker: Arc::new(PlayDurationTracker::default()),
        }
    }

    /// Run cycles until `shutdown` is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let interval = Duration::from_secs(self.config.interval_seconds);
        let max_duration = CaptureParams::default().max_duration;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let cycle_started = tokio::time::Instant::now();
            if let Err(e) = self.run_cycle(&shutdown, max_duration).await {
                tracing::error!(category = "DETECTION", error = %e, "cycle failed");
            }

            let elapsed = cycle_started.elapsed();
            let sleep_for = interval.saturating_sub(elapsed);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        Ok(())
    }

    async fn run_cycle(&self, shutdown: &CancellationToken, max_duration: Duration) -> Result<()> {
        let stations = fetch_active_stations(&self.pool).await?;

        for group in stations.chunks(self.config.max_concurrent.max(1)) {
            if shutdown.is_cancelled() {
                break;
            }

            let tasks = group.iter().cloned().map(|station| {
                let pool = self.pool.clone();
                let http = self.http.clone();
                let config = self.config.clone();
                let tracker = self.tracker.clone();
                async move {
                    let station_id = station.id;
                    let outcome = tokio::time::timeout(
                        per_task_timeout(max_duration),
                        run_station_once(&pool, &http, &config, &tracker, &station),
                    )
                    .await;

                    match outcome {
                        Ok(Ok(())) => {
                            let _ = record_check_result(&pool, station_id, true).await;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(category = "DETECTION", station = %station_id, error = %e, "station cycle failed");
                            let _ = record_check_result(&pool, station_id, false).await;
                        }
                        Err(_) => {
                            tracing::warn!(category = "DETECTION", station = %station_id, "station cycle timed out");
                            let _ = record_check_result(&pool, station_id, false).await;
                        }
                    }
                }
            });

            futures::future::join_all(tasks).await;

            if let Err(e) = self
                .tracker
                .cleanup_interrupted(&self.pool, ChronoDuration::seconds(INTERRUPTED_TTL_SECONDS))
                .await
            {
                tracing::warn!(category = "DETECTION", error = %e, "cleanup_interrupted failed");
            }
        }

        if let Err(e) = stats::mark_stale_stations_inactive(&self.pool).await {
            tracing::warn!(category = "DETECTION", error = %e, "mark_stale_stations_inactive failed");
        }

        Ok(())
    }
}

async fn fetch_active_stations(pool: &SqlitePool) -> Result<Vec<RadioStation>> {
    let stations = sqlx::query_as::<_, RadioStation>("SELECT * FROM radio_stations WHERE status = 'Active'")
        .fetch_all(pool)
        .await
        .map_err(sodav_common::Error::from)?;
    Ok(stations)
}

/// One full pipeline pass for a single station: capture, extract,
/// classify, match (local then external), resolve, track, and record.
async fn run_station_once(
    pool: &SqlitePool,
    http: &reqwest::Client,
    config: &Config,
    tracker: &Arc<PlayDurationTracker>,
    station: &RadioStation,
) -> Result<()> {
    let params = CaptureParams::default();
    let capture = transport::capture_station(station.stream_url.clone(), params).await?;

    if capture.termination_reason == TerminationReason::Error {
        return Err(PipelineError::Capture("capture terminated with error".to_string()));
    }

    let features = features::extract(&capture.pcm, capture.sample_rate, true)
        .map_err(|e| PipelineError::Extraction(e.to_string()))?;

    if !features.is_music {
        tracing::info!(category = "DETECTION", station = %station.id, "speech detected, discarding cycle");
        return Ok(());
    }

    let local_match = matcher::find_local_match(pool, &features).await?;

    let (track_id_for_tracking, artist_id, confidence, method, fingerprint_for_detection) = match local_match {
        Some(m) => {
            let artist_id = m.track.artist_id;
            let track_id = m.track.id;
            (track_id, artist_id, m.confidence, m.method.as_str(), Some(features.content_hash.clone()))
        }
        None => {
            let envelope =
                recognizers::run_chain(http, config, &features, &capture.pcm, capture.sample_rate).await?;

            let Some(envelope) = envelope else {
                tracing::info!(category = "EXTERNAL_DETECTION", station = %station.id, "no external match accepted");
                return Ok(());
            };

            let artist = resolver::get_or_create_artist(pool, envelope.track_info.artist.as_deref()).await?;
            let track = resolver::get_or_create_track(pool, artist.id, &envelope.track_info).await?;

            store::attach(
                pool,
                track.id,
                &features.content_hash,
                &features.content_raw,
                0.0,
                FingerprintAlgorithm::ContentHash,
            )
            .await?;

            let method = match envelope.source {
                "acoustid" => DetectionMethod::AcoustId.as_str(),
                "musicbrainz" => DetectionMethod::MusicBrainzMetadata.as_str(),
                _ => DetectionMethod::AudD.as_str(),
            };

            (track.id, artist.id, envelope.confidence, method, Some(features.content_hash.clone()))
        }
    };

    handle_identified_track(
        pool,
        tracker,
        station.id,
        track_id_for_tracking,
        artist_id,
        confidence,
        method,
        fingerprint_for_detection.as_deref(),
    )
    .await
}

/// Reconcile this cycle's identification against the tracker's state
/// machine: finalize a prior different track if one was playing, then
/// start/continue the current one and persist via C7/C8.
#[allow(clippy::too_many_arguments)]
async fn handle_identified_track(
    pool: &SqlitePool,
    tracker: &Arc<PlayDurationTracker>,
    station_id: Uuid,
    track_id: Uuid,
    artist_id: Uuid,
    confidence: f64,
    method: &'static str,
    fingerprint_hash: Option<&str>,
) -> Result<()> {
    if let Some(previous_track_id) = tracker.active_track_for_station(station_id) {
        if previous_track_id != track_id {
            if let Some(outcome) = tracker.stop_tracking(station_id, previous_track_id, false) {
                if let Some(detection_id) = outcome.detection_id {
                    finalize_detection(pool, detection_id, outcome.duration).await?;
                }
            }
        }
    }

    if !tracker.is_active(station_id, track_id) {
        tracker.start_tracking(station_id, track_id);
    } else {
        tracker.update_tracking(station_id, track_id);
    }

    let detection = tracker
        .create_detection(pool, station_id, track_id, confidence, fingerprint_hash, method)
        .await
        .map_err(PipelineError::Common)?;

    if let Some(detection) = detection {
        stats::record_detection(
            pool,
            artist_id,
            track_id,
            station_id,
            detection.detected_at,
            detection.play_duration_seconds,
            confidence,
        )
        .await
        .map_err(PipelineError::Common)?;
    }

    Ok(())
}

async fn finalize_detection(pool: &SqlitePool, detection_id: Uuid, duration: ChronoDuration) -> Result<()> {
    let clamped = sodav_common::time::clamp_play_duration(duration);
    sqlx::query(
        "UPDATE track_detections SET end_time = ?, play_duration_seconds = ?, is_estimated = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(clamped.duration.num_seconds() as f64)
    .bind(clamped.is_estimated)
    .bind(detection_id)
    .execute(pool)
    .await
    .map_err(sodav_common::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sodav_common::db;

    #[test]
    fn per_task_timeout_is_double_max_duration() {
        let d = Duration::from_secs(180);
        assert_eq!(per_task_timeout(d), Duration::from_secs(360));
    }

    /// `fetch_active_stations` only returns stations whose status is
    /// Active, so a station `record_check_result` has tripped to Error
    /// drops out of the next cycle's fan-out.
    #[tokio::test]
    async fn errored_station_is_excluded_from_active_fetch() {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let station_id = Uuid::new_v4();

        sqlx::query("INSERT INTO radio_stations (id, name, stream_url) VALUES (?, 'S', 'http://x')")
            .bind(station_id)
            .execute(&pool)
            .await
            .unwrap();

        for _ in 0..3 {
            record_check_result(&pool, station_id, false).await.unwrap();
        }

        let active = fetch_active_stations(&pool).await.unwrap();
        assert!(active.iter().all(|s| s.id != station_id));
    }
}
