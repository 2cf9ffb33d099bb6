use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::alert::{HANDS_UP, WEAPON};
use crate::detection::PERSON_CLASS;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no cameras configured")]
    NoCameras,
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn ensure(ok: bool, field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason.into(),
        })
    }
}

fn non_negative(value: f64, field: &'static str) -> Result<(), ConfigError> {
    ensure(
        value.is_finite() && value >= 0.0,
        field,
        format!("must be a non-negative number, got {value}"),
    )
}

fn default_max_distance() -> f32 {
    200.0
}

fn default_min_iou() -> f32 {
    0.1
}

fn default_person_memory() -> f64 {
    3600.0
}

fn default_monitored_class() -> String {
    PERSON_CLASS.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackingConfig {
    /// When off, alerts bypass person tracking and throttling.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Center distance in pixels beyond which a match is forbidden.
    #[serde(default = "default_max_distance")]
    pub max_distance_threshold: f32,
    #[serde(default = "default_min_iou")]
    pub min_iou_threshold: f32,
    #[serde(default = "default_true")]
    pub use_spatial: bool,
    /// Seconds a person is remembered after its last match.
    #[serde(default = "default_person_memory")]
    pub person_memory_secs: f64,
    #[serde(default = "default_monitored_class")]
    pub monitored_class: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_distance_threshold: default_max_distance(),
            min_iou_threshold: default_min_iou(),
            use_spatial: true,
            person_memory_secs: default_person_memory(),
            monitored_class: default_monitored_class(),
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.max_distance_threshold.is_finite() && self.max_distance_threshold > 0.0,
            "tracking.max_distance_threshold",
            format!("must be positive, got {}", self.max_distance_threshold),
        )?;
        ensure(
            (0.0..=1.0).contains(&self.min_iou_threshold),
            "tracking.min_iou_threshold",
            format!("must be within 0..=1, got {}", self.min_iou_threshold),
        )?;
        non_negative(self.person_memory_secs, "tracking.person_memory_secs")?;
        ensure(
            !self.monitored_class.trim().is_empty(),
            "tracking.monitored_class",
            "must not be empty",
        )
    }
}

fn default_business_start() -> u32 {
    8
}

fn default_business_end() -> u32 {
    18
}

/// Inclusive local-hour range, e.g. 8..=18.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusinessHours {
    #[serde(default = "default_business_start")]
    pub start_hour: u32,
    #[serde(default = "default_business_end")]
    pub end_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: default_business_start(),
            end_hour: default_business_end(),
        }
    }
}

impl BusinessHours {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            self.start_hour <= 23 && self.end_hour <= 23,
            "alerts.business_hours",
            format!(
                "hours must be within 0..=23, got {}..={}",
                self.start_hour, self.end_hour
            ),
        )
    }
}

fn default_damping_probability() -> f64 {
    0.7
}

fn default_damped_types() -> Vec<String> {
    vec![HANDS_UP.to_string()]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DampingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_damping_probability")]
    pub probability: f64,
    #[serde(default = "default_damped_types")]
    pub alert_types: Vec<String>,
}

impl Default for DampingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probability: default_damping_probability(),
            alert_types: default_damped_types(),
        }
    }
}

fn default_alert_interval() -> f64 {
    1200.0
}

fn default_max_alerts() -> u32 {
    2
}

fn default_camera_cooldown() -> f64 {
    3600.0
}

fn default_type_multipliers() -> HashMap<String, f64> {
    HashMap::from([(HANDS_UP.to_string(), 3.0)])
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertConfig {
    /// Base person cooldown and camera rate-limit window, in seconds.
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: f64,
    #[serde(default = "default_max_alerts")]
    pub max_alerts_per_interval: u32,
    #[serde(default = "default_camera_cooldown")]
    pub camera_cooldown_secs: f64,
    #[serde(default)]
    pub business_hours: BusinessHours,
    #[serde(default)]
    pub damping: DampingConfig,
    /// Extra multiplier on the base interval for specific alert types.
    #[serde(default = "default_type_multipliers")]
    pub type_multipliers: HashMap<String, f64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_interval_secs: default_alert_interval(),
            max_alerts_per_interval: default_max_alerts(),
            camera_cooldown_secs: default_camera_cooldown(),
            business_hours: BusinessHours::default(),
            damping: DampingConfig::default(),
            type_multipliers: default_type_multipliers(),
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative(self.alert_interval_secs, "alerts.alert_interval_secs")?;
        non_negative(self.camera_cooldown_secs, "alerts.camera_cooldown_secs")?;
        ensure(
            self.max_alerts_per_interval > 0,
            "alerts.max_alerts_per_interval",
            "must be at least 1",
        )?;
        self.business_hours.validate()?;
        ensure(
            (0.0..=1.0).contains(&self.damping.probability),
            "alerts.damping.probability",
            format!("must be within 0..=1, got {}", self.damping.probability),
        )?;
        for factor in self.type_multipliers.values() {
            non_negative(*factor, "alerts.type_multipliers")?;
        }
        Ok(())
    }

    pub fn type_multiplier(&self, alert_type: &str) -> f64 {
        self.type_multipliers.get(alert_type).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackerSettings {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracking.validate()?;
        self.alerts.validate()
    }
}

fn default_extract_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    /// Newline-delimited JSON detector output for this camera.
    pub feed: PathBuf,
    #[serde(default = "default_extract_interval_ms")]
    pub extract_interval_ms: u64,
    #[serde(default = "default_true")]
    pub loop_feed: bool,
    #[serde(default)]
    pub tracking: Option<TrackingConfig>,
    #[serde(default)]
    pub alerts: Option<AlertConfig>,
}

pub fn default_global_suppression() -> HashMap<String, f64> {
    HashMap::from([(HANDS_UP.to_string(), 1200.0), (WEAPON.to_string(), 600.0)])
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Process-wide minimum seconds between two alerts of the same type.
    #[serde(default = "default_global_suppression")]
    pub global_suppression: HashMap<String, f64>,
    /// Seed for the damping random source; entropy when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        if config.cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults().validate()?;
        for interval in self.global_suppression.values() {
            non_negative(*interval, "global_suppression")?;
        }
        for camera in &self.cameras {
            self.settings_for(camera).validate()?;
        }
        Ok(())
    }

    pub fn defaults(&self) -> TrackerSettings {
        TrackerSettings {
            tracking: self.tracking.clone(),
            alerts: self.alerts.clone(),
        }
    }

    /// Camera overrides replace the corresponding top-level section.
    pub fn settings_for(&self, camera: &CameraConfig) -> TrackerSettings {
        TrackerSettings {
            tracking: camera
                .tracking
                .clone()
                .unwrap_or_else(|| self.tracking.clone()),
            alerts: camera.alerts.clone().unwrap_or_else(|| self.alerts.clone()),
        }
    }
}
