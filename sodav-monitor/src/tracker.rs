//! Play-Duration Tracker (C7, §4.7) — the stateful core
//!
//! Two in-memory maps keyed by `(station_id, track_id)`, guarded by a
//! single lock per §5: `active` (currently playing) and `interrupted`
//! (recently stopped, kept briefly for a possible resume).

use chrono::{DateTime, Duration, Utc};
use sodav_common::models::TrackDetection;
use sodav_common::time::clamp_play_duration;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

type Key = (Uuid, Uuid);

#[derive(Debug, Clone)]
struct ActiveEntry {
    /// Original session start — becomes `detected_at` on the finalized row.
    start_time: DateTime<Utc>,
    /// When the current (post-resume, if any) run began accumulating.
    session_start: DateTime<Utc>,
    last_update: DateTime<Utc>,
    accumulated: Duration,
    is_resumed: bool,
    detection_id: Option<Uuid>,
}

/// Outcome of `stop_tracking`: the session's total accumulated duration
/// and the detection row (if any) that was already persisted for it.
#[derive(Debug, Clone, Copy)]
pub struct StopOutcome {
    pub duration: Duration,
    pub detection_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct InterruptedEntry {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    accumulated: Duration,
    detection_id: Option<Uuid>,
}

/// Default merge threshold in seconds (§4.7).
pub const MERGE_THRESHOLD_SECONDS: i64 = 10;
/// Default minimum duration to count toward statistics (§4.7).
pub const MIN_DURATION_SECONDS: i64 = 5;
/// Default TTL for parked interrupted entries (§4.7).
pub const INTERRUPTED_TTL_SECONDS: i64 = 60;

pub struct PlayDurationTracker {
    active: Mutex<HashMap<Key, ActiveEntry>>,
    interrupted: Mutex<HashMap<Key, InterruptedEntry>>,
    merge_threshold: Duration,
    min_duration: Duration,
}

/// A currently-tracked (station, track) pair, for introspection/diagnostics.
#[derive(Debug, Clone)]
pub struct ActiveTrackView {
    pub station_id: Uuid,
    pub track_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub current_duration: Duration,
    pub is_resumed: bool,
}

impl Default for PlayDurationTracker {
    fn default() -> Self {
        Self::new(MERGE_THRESHOLD_SECONDS, MIN_DURATION_SECONDS)
    }
}

impl PlayDurationTracker {
    pub fn new(merge_threshold_seconds: i64, min_duration_seconds: i64) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            interrupted: Mutex::new(HashMap::new()),
            merge_threshold: Duration::seconds(merge_threshold_seconds),
            min_duration: Duration::seconds(min_duration_seconds),
        }
    }

    /// Start (or resume) tracking a `(station_id, track_id)` pair. Returns
    /// the session's `detected_at` — the original start time, preserved
    /// across a resume.
    pub fn start_tracking(&self, station_id: Uuid, track_id: Uuid) -> DateTime<Utc> {
        let key = (station_id, track_id);
        let now = Utc::now();

        let resumed = self.interrupted.lock().unwrap().remove(&key);
        if let Some(interrupted) = resumed {
            if now - interrupted.end_time <= self.merge_threshold {
                let start_time = interrupted.start_time;
                self.active.lock().unwrap().insert(
                    key,
                    ActiveEntry {
                        start_time,
                        session_start: now,
                        last_update: now,
                        accumulated: interrupted.accumulated,
                        is_resumed: true,
                        detection_id: interrupted.detection_id,
                    },
                );
                return start_time;
            }
            // Gap too long: this interrupted entry just expires; fall through
            // to a fresh start below. It is not re-inserted.
        }

        self.active.lock().unwrap().insert(
            key,
            ActiveEntry {
                start_time: now,
                session_start: now,
                last_update: now,
                accumulated: Duration::zero(),
                is_resumed: false,
                detection_id: None,
            },
        );
        now
    }

    /// Heartbeat only — refreshes `last_update`, never grows duration.
    pub fn update_tracking(&self, station_id: Uuid, track_id: Uuid) {
        let key = (station_id, track_id);
        if let Some(entry) = self.active.lock().unwrap().get_mut(&key) {
            entry.last_update = Utc::now();
        }
    }

    /// Whether `(station_id, track_id)` currently has an active session.
    pub fn is_active(&self, station_id: Uuid, track_id: Uuid) -> bool {
        self.active.lock().unwrap().contains_key(&(station_id, track_id))
    }

    /// The track id currently active for `station_id`, if any (a station
    /// tracks at most one active key at a time in practice).
    pub fn active_track_for_station(&self, station_id: Uuid) -> Option<Uuid> {
        self.active
            .lock()
            .unwrap()
            .keys()
            .find(|(s, _)| *s == station_id)
            .map(|(_, t)| *t)
    }

    /// Stop tracking. On silence, parks the entry in `interrupted` for a
    /// possible resume; otherwise (e.g. a positive track change) the
    /// session ends definitively.
    pub fn stop_tracking(&self, station_id: Uuid, track_id: Uuid, is_silence: bool) -> Option<StopOutcome> {
        let key = (station_id, track_id);
        let entry = self.active.lock().unwrap().remove(&key)?;
        let now = Utc::now();
        let session_duration = now - entry.session_start;
        let total_duration = entry.accumulated + session_duration;

        if is_silence {
            self.interrupted.lock().unwrap().insert(
                key,
                InterruptedEntry {
                    start_time: entry.start_time,
                    end_time: now,
                    accumulated: total_duration,
                    detection_id: entry.detection_id,
                },
            );
        }

        Some(StopOutcome {
            duration: total_duration,
            detection_id: entry.detection_id,
        })
    }

    /// Create or update the TrackDetection row for the active session.
    /// A session that already has a `detection_id` (whether freshly
    /// resumed or simply re-confirmed on a later cycle) extends that row;
    /// otherwise a new row is inserted. Keying off `detection_id` rather
    /// than the resume flag means a continuously-playing track's row keeps
    /// growing instead of a new row being inserted on every re-confirmation.
    pub async fn create_detection(
        &self,
        pool: &SqlitePool,
        station_id: Uuid,
        track_id: Uuid,
        confidence: f64,
        fingerprint_hash: Option<&str>,
        detection_method: &str,
    ) -> sodav_common::Result<Option<TrackDetection>> {
        let key = (station_id, track_id);
        let now = Utc::now();

        let (start_time, session_start, accumulated, detection_id) = {
            let guard = self.active.lock().unwrap();
            let Some(entry) = guard.get(&key) else {
                return Ok(None);
            };
            (entry.start_time, entry.session_start, entry.accumulated, entry.detection_id)
        };

        let total_duration = accumulated + (now - session_start);
        let clamped = clamp_play_duration(total_duration);

        let detection = if let Some(detection_id) = detection_id {
            sqlx::query(
                "UPDATE track_detections SET end_time = ?, play_duration_seconds = ?, is_estimated = ? WHERE id = ?",
            )
            .bind(now)
            .bind(clamped.duration.num_seconds() as f64)
            .bind(clamped.is_estimated)
            .bind(detection_id)
            .execute(pool)
            .await?;

            sqlx::query_as::<_, TrackDetection>("SELECT * FROM track_detections WHERE id = ?")
                .bind(detection_id)
                .fetch_one(pool)
                .await?
        } else {
            self.insert_detection(
                pool,
                track_id,
                station_id,
                start_time,
                now,
                clamped,
                confidence,
                fingerprint_hash,
                detection_method,
            )
            .await?
        };

        if let Some(entry) = self.active.lock().unwrap().get_mut(&key) {
            entry.detection_id = Some(detection.id);
        }

        Ok(Some(detection))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_detection(
        &self,
        pool: &SqlitePool,
        track_id: Uuid,
        station_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        clamped: sodav_common::time::ClampedDuration,
        confidence: f64,
        fingerprint_hash: Option<&str>,
        detection_method: &str,
    ) -> sodav_common::Result<TrackDetection> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO track_detections (id, track_id, station_id, detected_at, end_time, play_duration_seconds, is_estimated, confidence, fingerprint_hash, detection_method, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(track_id)
        .bind(station_id)
        .bind(start_time)
        .bind(end_time)
        .bind(clamped.duration.num_seconds() as f64)
        .bind(clamped.is_estimated)
        .bind(confidence)
        .bind(fingerprint_hash)
        .bind(detection_method)
        .bind(end_time)
        .execute(pool)
        .await?;

        Ok(TrackDetection {
            id,
            track_id,
            station_id,
            detected_at: start_time,
            end_time: Some(end_time),
            play_duration_seconds: clamped.duration.num_seconds() as f64,
            is_estimated: clamped.is_estimated,
            confidence,
            fingerprint_hash: fingerprint_hash.map(str::to_string),
            detection_method: detection_method.to_string(),
            created_at: end_time,
        })
    }

    /// Drop interrupted entries older than `max_age`, finalizing the
    /// underlying detection row when the accumulated duration clears
    /// `min_duration_seconds` (§4.7).
    pub async fn cleanup_interrupted(&self, pool: &SqlitePool, max_age: Duration) -> sodav_common::Result<()> {
        let now = Utc::now();
        let expired: Vec<(Key, InterruptedEntry)> = {
            let mut guard = self.interrupted.lock().unwrap();
            let expired_keys: Vec<Key> = guard
                .iter()
                .filter(|(_, entry)| now - entry.end_time > max_age)
                .map(|(k, _)| *k)
                .collect();
            expired_keys
                .into_iter()
                .filter_map(|k| guard.remove(&k).map(|v| (k, v)))
                .collect()
        };

        for (_, entry) in expired {
            if entry.accumulated >= self.min_duration {
                if let Some(detection_id) = entry.detection_id {
                    let clamped = clamp_play_duration(entry.accumulated);
                    sqlx::query(
                        "UPDATE track_detections SET end_time = ?, play_duration_seconds = ?, is_estimated = ? WHERE id = ?",
                    )
                    .bind(entry.end_time)
                    .bind(clamped.duration.num_seconds() as f64)
                    .bind(clamped.is_estimated)
                    .bind(detection_id)
                    .execute(pool)
                    .await?;
                }
            }
        }

        Ok(())
    }

    pub fn get_active_tracks(&self) -> Vec<ActiveTrackView> {
        let now = Utc::now();
        self.active
            .lock()
            .unwrap()
            .iter()
            .map(|((station_id, track_id), entry)| ActiveTrackView {
                station_id: *station_id,
                track_id: *track_id,
                start_time: entry.start_time,
                current_duration: now - entry.start_time,
                is_resumed: entry.is_resumed,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_start_has_zero_accumulated_duration() {
        let tracker = PlayDurationTracker::default();
        let station = Uuid::new_v4();
        let track = Uuid::new_v4();
        let start = tracker.start_tracking(station, track);
        assert!(Utc::now() - start < Duration::seconds(1));
    }

    #[test]
    fn stop_without_silence_does_not_park_entry() {
        let tracker = PlayDurationTracker::default();
        let station = Uuid::new_v4();
        let track = Uuid::new_v4();
        tracker.start_tracking(station, track);
        let duration = tracker.stop_tracking(station, track, false);
        assert!(duration.is_some());
        assert!(tracker.interrupted.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_with_silence_parks_entry_for_resume() {
        let tracker = PlayDurationTracker::default();
        let station = Uuid::new_v4();
        let track = Uuid::new_v4();
        tracker.start_tracking(station, track);
        tracker.stop_tracking(station, track, true);
        assert_eq!(tracker.interrupted.lock().unwrap().len(), 1);
    }

    #[test]
    fn resume_within_threshold_restores_original_start_time() {
        let tracker = PlayDurationTracker::default();
        let station = Uuid::new_v4();
        let track = Uuid::new_v4();
        let original_start = tracker.start_tracking(station, track);
        tracker.stop_tracking(station, track, true);
        let resumed_start = tracker.start_tracking(station, track);
        assert_eq!(original_start, resumed_start);
    }

    #[test]
    fn stopping_unknown_key_returns_none() {
        let tracker = PlayDurationTracker::default();
        let result = tracker.stop_tracking(Uuid::new_v4(), Uuid::new_v4(), true);
        assert!(result.is_none());
    }

    #[test]
    fn get_active_tracks_reflects_current_sessions() {
        let tracker = PlayDurationTracker::default();
        let station = Uuid::new_v4();
        let track = Uuid::new_v4();
        tracker.start_tracking(station, track);
        let views = tracker.get_active_tracks();
        assert_eq!(views.len(), 1);
        assert!(!views[0].is_resumed);
    }
}
