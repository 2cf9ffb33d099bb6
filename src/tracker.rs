use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::alert::{AlertCandidate, FilteredAlert};
use crate::clock::Clock;
use crate::config::{ConfigError, TrackerSettings};
use crate::detection::Detection;
use crate::geometry::BoundingBox;
use crate::throttle::{
    AlertThrottle, CameraAlertHistory, GlobalSuppressionTable, RandomSource, SeededRandom,
};
use crate::tracking::{Assignment, AssociationEngine, GridCell, IdentityStore, PersonId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraStats {
    pub frames: u64,
    pub persons_created: u64,
    pub persons_evicted: u64,
    pub alerts_allowed: u64,
    /// Keyed by `SuppressionReason::kind`.
    pub alerts_suppressed: BTreeMap<&'static str, u64>,
}

impl CameraStats {
    pub fn total_suppressed(&self) -> u64 {
        self.alerts_suppressed.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct PersonSnapshot {
    pub id: PersonId,
    pub bbox: BoundingBox,
    pub frames_tracked: u64,
    pub movement_score: f32,
    pub total_alerts: u32,
    pub idle_secs: f64,
    /// Grid cell the person stayed in longest, with the seconds spent there.
    pub longest_dwell: Option<(GridCell, f64)>,
}

#[derive(Debug, Clone)]
pub struct CameraSnapshot {
    pub camera_id: String,
    pub persons: Vec<PersonSnapshot>,
    pub alerts_in_window: usize,
    pub cooldown_remaining_secs: Option<f64>,
    pub stats: CameraStats,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub assignment: Assignment,
    pub alert: Option<FilteredAlert>,
}

pub struct CameraTracker {
    camera_id: String,
    settings: TrackerSettings,
    store: IdentityStore,
    history: CameraAlertHistory,
    rng: Box<dyn RandomSource>,
    stats: CameraStats,
}

impl CameraTracker {
    pub fn new(camera_id: String, settings: TrackerSettings, rng: Box<dyn RandomSource>) -> Self {
        Self {
            camera_id,
            settings,
            store: IdentityStore::new(),
            history: CameraAlertHistory::new(),
            rng,
            stats: CameraStats::default(),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn set_random_source(&mut self, rng: Box<dyn RandomSource>) {
        self.rng = rng;
    }

    fn apply_settings(&mut self, settings: TrackerSettings) {
        if settings != self.settings {
            tracing::info!(camera = %self.camera_id, "tracker settings updated");
            self.settings = settings;
        }
    }

    pub fn update(&mut self, detections: &[Detection], now: f64) -> Assignment {
        let tracking = &self.settings.tracking;
        self.stats.frames += 1;
        if !tracking.enabled {
            return Assignment::new();
        }

        let evicted = self.store.evict_stale(now, tracking.person_memory_secs);
        let before = self.store.len();
        let assignment =
            AssociationEngine::new(tracking).associate(&mut self.store, detections, now);
        let created = self.store.len() - before;

        self.stats.persons_evicted += evicted as u64;
        self.stats.persons_created += created as u64;

        if evicted > 0 || created > 0 {
            tracing::debug!(
                camera = %self.camera_id,
                evicted,
                created,
                tracked = self.store.len(),
                "identity store changed"
            );
        }

        assignment
    }

    pub fn filter_alert(
        &mut self,
        alert: AlertCandidate,
        assignment: &Assignment,
        global: &GlobalSuppressionTable,
        now: f64,
        hour: u32,
    ) -> FilteredAlert {
        let label = alert.label();
        if !self.settings.tracking.enabled {
            self.stats.alerts_allowed += 1;
            tracing::info!(
                camera = %self.camera_id,
                alert = %label,
                "alert passed, tracking disabled"
            );
            return FilteredAlert::Allowed(alert);
        }

        let result = AlertThrottle {
            tracking: &self.settings.tracking,
            alerts: &self.settings.alerts,
            store: &mut self.store,
            history: &mut self.history,
            global,
            rng: self.rng.as_mut(),
        }
        .filter(alert, assignment, now, hour);

        match &result {
            FilteredAlert::Allowed(_) => {
                self.stats.alerts_allowed += 1;
                tracing::info!(camera = %self.camera_id, alert = %label, "alert allowed");
            }
            FilteredAlert::Suppressed(reason) => {
                *self.stats.alerts_suppressed.entry(reason.kind()).or_insert(0) += 1;
                tracing::info!(
                    camera = %self.camera_id,
                    alert = %label,
                    reason = %reason,
                    "alert suppressed"
                );
            }
        }

        result
    }

    pub fn snapshot(&self, now: f64) -> CameraSnapshot {
        CameraSnapshot {
            camera_id: self.camera_id.clone(),
            persons: self
                .store
                .iter()
                .map(|p| PersonSnapshot {
                    id: p.id,
                    bbox: p.bbox,
                    frames_tracked: p.frames_tracked,
                    movement_score: p.movement_score(),
                    total_alerts: p.total_alerts(),
                    idle_secs: now - p.last_seen,
                    longest_dwell: p.longest_dwell(),
                })
                .collect(),
            alerts_in_window: self.history.alerts_in_window(),
            cooldown_remaining_secs: self
                .history
                .cooldown_until()
                .filter(|until| *until > now)
                .map(|until| until - now),
            stats: self.stats.clone(),
        }
    }
}

/// Per-camera random sources are derived from one seed so runs replay.
fn camera_seed(seed: u64, camera_id: &str) -> u64 {
    camera_id
        .bytes()
        .fold(seed, |acc, b| acc.rotate_left(5) ^ u64::from(b))
}

pub struct Tracker {
    defaults: TrackerSettings,
    cameras: RwLock<HashMap<String, Arc<Mutex<CameraTracker>>>>,
    global: GlobalSuppressionTable,
    clock: Arc<dyn Clock>,
    rng_seed: Option<u64>,
}

impl Tracker {
    /// `defaults` apply to cameras that were never configured explicitly.
    pub fn new(
        defaults: TrackerSettings,
        global: GlobalSuppressionTable,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        defaults.validate()?;
        Ok(Self {
            defaults,
            cameras: RwLock::new(HashMap::new()),
            global,
            clock,
            rng_seed: None,
        })
    }

    pub fn with_rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn global(&self) -> &GlobalSuppressionTable {
        &self.global
    }

    pub fn camera_ids(&self) -> Vec<String> {
        let cameras = self.cameras.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = cameras.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn new_camera(&self, camera_id: &str, settings: TrackerSettings) -> Arc<Mutex<CameraTracker>> {
        let rng = SeededRandom::new(self.rng_seed.map(|seed| camera_seed(seed, camera_id)));
        tracing::info!(camera = %camera_id, "created person tracker");
        Arc::new(Mutex::new(CameraTracker::new(
            camera_id.to_string(),
            settings,
            Box::new(rng),
        )))
    }

    fn camera(&self, camera_id: &str) -> Arc<Mutex<CameraTracker>> {
        if let Some(camera) = self
            .cameras
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(camera_id)
        {
            return Arc::clone(camera);
        }

        let mut cameras = self.cameras.write().unwrap_or_else(PoisonError::into_inner);
        let camera = cameras
            .entry(camera_id.to_string())
            .or_insert_with(|| self.new_camera(camera_id, self.defaults.clone()));
        Arc::clone(camera)
    }

    pub fn with_camera<R>(&self, camera_id: &str, f: impl FnOnce(&mut CameraTracker) -> R) -> R {
        let camera = self.camera(camera_id);
        let mut guard = camera.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Replace a camera's settings. Tracked persons and alert history are kept.
    pub fn configure(&self, camera_id: &str, settings: TrackerSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.with_camera(camera_id, |camera| camera.apply_settings(settings));
        Ok(())
    }

    pub fn update(&self, camera_id: &str, detections: &[Detection]) -> Assignment {
        let now = self.clock.now();
        self.with_camera(camera_id, |camera| camera.update(detections, now))
    }

    pub fn filter_alert(
        &self,
        camera_id: &str,
        alert: AlertCandidate,
        assignment: &Assignment,
    ) -> FilteredAlert {
        let now = self.clock.now();
        let hour = self.clock.local_hour();
        self.with_camera(camera_id, |camera| {
            camera.filter_alert(alert, assignment, &self.global, now, hour)
        })
    }

    /// `update` followed by `filter_alert` under a single camera lock.
    pub fn process(
        &self,
        camera_id: &str,
        detections: &[Detection],
        alert: Option<AlertCandidate>,
    ) -> FrameOutcome {
        let now = self.clock.now();
        let hour = self.clock.local_hour();
        self.with_camera(camera_id, |camera| {
            let assignment = camera.update(detections, now);
            let alert = alert
                .map(|alert| camera.filter_alert(alert, &assignment, &self.global, now, hour));
            FrameOutcome { assignment, alert }
        })
    }

    pub fn snapshot(&self, camera_id: &str) -> Option<CameraSnapshot> {
        let camera = self
            .cameras
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(camera_id)
            .cloned()?;
        let now = self.clock.now();
        let guard = camera.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.snapshot(now))
    }
}
