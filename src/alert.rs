use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

use crate::geometry::BoundingBox;
use crate::tracking::PersonId;

pub const HANDS_UP: &str = "Hands_Up";
pub const WEAPON: &str = "Weapon";
pub const NO_ALERT: &str = "No_Alert";

#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub alert_types: BTreeSet<String>,
    pub bounding_boxes: Vec<BoundingBox>,
}

impl AlertCandidate {
    pub fn new<I, S>(alert_types: I, bounding_boxes: Vec<BoundingBox>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alert_types: alert_types.into_iter().map(Into::into).collect(),
            bounding_boxes,
        }
    }

    /// The box used to resolve which person the alert is about.
    pub fn primary_box(&self) -> Option<BoundingBox> {
        self.bounding_boxes.iter().copied().find(BoundingBox::is_valid)
    }

    pub fn contains(&self, alert_type: &str) -> bool {
        self.alert_types.contains(alert_type)
    }

    pub fn label(&self) -> String {
        self.alert_types
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlert {
    #[serde(default)]
    pub type_of_alert: Option<String>,
    #[serde(default, rename = "Image_bb")]
    pub image_bb: Option<Vec<Vec<f32>>>,
}

impl RawAlert {
    /// `None` for "No_Alert" or an empty type list. Malformed boxes are
    /// dropped; an alert left without boxes is still a valid candidate.
    pub fn into_candidate(self) -> Option<AlertCandidate> {
        let alert_types: BTreeSet<String> = self
            .type_of_alert
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != NO_ALERT)
            .map(str::to_string)
            .collect();

        if alert_types.is_empty() {
            return None;
        }

        let bounding_boxes = self
            .image_bb
            .unwrap_or_default()
            .iter()
            .filter_map(|coords| BoundingBox::from_slice(coords))
            .collect();

        Some(AlertCandidate {
            alert_types,
            bounding_boxes,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuppressionReason {
    CameraCooldown { remaining_secs: f64 },
    CameraRateLimit { alerts_in_window: usize },
    BusinessHoursDamping,
    PersonCooldown {
        person: PersonId,
        alert_type: String,
        remaining_secs: f64,
    },
    GlobalSuppression {
        alert_type: String,
        remaining_secs: f64,
    },
}

impl SuppressionReason {
    pub fn kind(&self) -> &'static str {
        match self {
            SuppressionReason::CameraCooldown { .. } => "camera_cooldown",
            SuppressionReason::CameraRateLimit { .. } => "camera_rate_limit",
            SuppressionReason::BusinessHoursDamping => "business_hours_damping",
            SuppressionReason::PersonCooldown { .. } => "person_cooldown",
            SuppressionReason::GlobalSuppression { .. } => "global_suppression",
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionReason::CameraCooldown { remaining_secs } => {
                write!(f, "camera in cooldown for {remaining_secs:.1}s")
            }
            SuppressionReason::CameraRateLimit { alerts_in_window } => {
                write!(f, "camera reached {alerts_in_window} alerts in window")
            }
            SuppressionReason::BusinessHoursDamping => {
                write!(f, "random business-hours damping")
            }
            SuppressionReason::PersonCooldown {
                person,
                alert_type,
                remaining_secs,
            } => write!(
                f,
                "{alert_type} cooldown for person {person}, {remaining_secs:.1}s left"
            ),
            SuppressionReason::GlobalSuppression {
                alert_type,
                remaining_secs,
            } => write!(
                f,
                "global suppression for {alert_type}, {remaining_secs:.1}s left"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilteredAlert {
    Allowed(AlertCandidate),
    Suppressed(SuppressionReason),
}

impl FilteredAlert {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilteredAlert::Allowed(_))
    }

    pub fn reason(&self) -> Option<&SuppressionReason> {
        match self {
            FilteredAlert::Allowed(_) => None,
            FilteredAlert::Suppressed(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_alert_parsing() {
        let raw: RawAlert = serde_json::from_str(
            r#"{"type_of_alert": "Hands_Up, Weapon", "Image_bb": [[10, 10, 50, 100], [1, 2]]}"#,
        )
        .unwrap();
        let alert = raw.into_candidate().unwrap();

        assert!(alert.contains(HANDS_UP));
        assert!(alert.contains(WEAPON));
        assert_eq!(alert.bounding_boxes.len(), 1);
        assert_eq!(alert.label(), "Hands_Up,Weapon");
        assert_eq!(
            alert.primary_box(),
            Some(BoundingBox::new(10.0, 10.0, 50.0, 100.0))
        );
    }

    #[test]
    fn test_no_alert_is_none() {
        let raw: RawAlert = serde_json::from_str(r#"{"type_of_alert": "No_Alert"}"#).unwrap();
        assert!(raw.into_candidate().is_none());
        assert!(RawAlert::default().into_candidate().is_none());
    }

    #[test]
    fn test_alert_without_boxes_is_kept() {
        let raw: RawAlert = serde_json::from_str(r#"{"type_of_alert": "Weapon"}"#).unwrap();
        let alert = raw.into_candidate().unwrap();
        assert!(alert.primary_box().is_none());
    }
}
