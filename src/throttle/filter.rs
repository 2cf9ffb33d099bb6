use crate::alert::{AlertCandidate, FilteredAlert, SuppressionReason};
use crate::config::{AlertConfig, TrackingConfig};
use crate::tracking::{Assignment, IdentityStore, PersonId, TrackedPerson};

use super::camera::CameraAlertHistory;
use super::damping::{should_damp, RandomSource};
use super::global::GlobalSuppressionTable;

/// Movement score (px/s) above which a person counts as active.
pub const ACTIVITY_THRESHOLD: f32 = 10.0;
const ACTIVE_FACTOR: f64 = 1.5;
const BUSINESS_HOURS_FACTOR: f64 = 1.5;
const REPEAT_STEP: f64 = 0.25;
const MAX_REPEAT_FACTOR: f64 = 5.0;
/// Confidence given to persons created from an alert box.
const ANONYMOUS_CONFIDENCE: f32 = 1.0;

/// Cooldown for `alert_type` on `person`, grown by repeat alerts, activity
/// and business hours.
pub fn dynamic_interval(
    config: &AlertConfig,
    person: &TrackedPerson,
    alert_type: &str,
    business_hours: bool,
) -> f64 {
    let base = config.alert_interval_secs * config.type_multiplier(alert_type);
    let count = person.alert_record(alert_type).count as f64;
    let repeat = (1.0 + REPEAT_STEP * count).min(MAX_REPEAT_FACTOR);
    let movement = if person.movement_score() > ACTIVITY_THRESHOLD {
        ACTIVE_FACTOR
    } else {
        1.0
    };
    let business = if business_hours {
        BUSINESS_HOURS_FACTOR
    } else {
        1.0
    };
    base * repeat * movement * business
}

/// A person assigned in this frame wins (lowest detection index first);
/// otherwise the best IoU match against the alert's primary box. Alerts
/// without a usable box never resolve.
pub fn resolve_person(
    store: &IdentityStore,
    alert: &AlertCandidate,
    assignment: &Assignment,
    min_iou: f32,
) -> Option<PersonId> {
    let bbox = alert.primary_box()?;

    if let Some(id) = assignment.values().find(|id| store.contains(id)) {
        return Some(*id);
    }

    store.best_overlap(&bbox, min_iou).map(|(id, iou)| {
        tracing::debug!(person = %id, iou, "alert resolved by overlap");
        id
    })
}

/// Gates run in order (camera rate limit, damping, person cooldown, global
/// suppression) and the first denial wins. State is only recorded once every
/// gate passed; the camera cooldown set by the rate limit is the one write a
/// denial makes.
pub struct AlertThrottle<'a> {
    pub tracking: &'a TrackingConfig,
    pub alerts: &'a AlertConfig,
    pub store: &'a mut IdentityStore,
    pub history: &'a mut CameraAlertHistory,
    pub global: &'a GlobalSuppressionTable,
    pub rng: &'a mut dyn RandomSource,
}

impl AlertThrottle<'_> {
    pub fn filter(
        &mut self,
        alert: AlertCandidate,
        assignment: &Assignment,
        now: f64,
        hour: u32,
    ) -> FilteredAlert {
        if let Err(reason) = self.history.check(
            now,
            self.alerts.alert_interval_secs,
            self.alerts.max_alerts_per_interval,
            self.alerts.camera_cooldown_secs,
        ) {
            return FilteredAlert::Suppressed(reason);
        }

        if should_damp(self.alerts, &alert, hour, &mut *self.rng) {
            return FilteredAlert::Suppressed(SuppressionReason::BusinessHoursDamping);
        }

        let business_hours = self.alerts.business_hours.contains(hour);
        let person = resolve_person(
            &*self.store,
            &alert,
            assignment,
            self.tracking.min_iou_threshold,
        );

        if let Some(person) = person.and_then(|id| self.store.get(&id)) {
            if let Err(reason) = self.person_ready(person, &alert, now, business_hours) {
                return FilteredAlert::Suppressed(reason);
            }
        }

        // Held until the alert is recorded so two cameras cannot both pass.
        let global_table = self.global;
        let mut global = global_table.lock();
        if let Err(reason) = global.check(&alert.alert_types, now) {
            return FilteredAlert::Suppressed(reason);
        }

        let person = match person {
            Some(id) => Some(id),
            None => alert.primary_box().map(|bbox| {
                let id = self.store.upsert(None, bbox, ANONYMOUS_CONFIDENCE, now);
                tracing::debug!(person = %id, "new person from alert");
                id
            }),
        };
        if let Some(tracked) = person.and_then(|id| self.store.get_mut(&id)) {
            for alert_type in &alert.alert_types {
                tracked.record_alert(alert_type, now);
            }
        }
        global.record(&alert.alert_types, now);
        self.history.record(now);

        FilteredAlert::Allowed(alert)
    }

    fn person_ready(
        &self,
        person: &TrackedPerson,
        alert: &AlertCandidate,
        now: f64,
        business_hours: bool,
    ) -> Result<(), SuppressionReason> {
        for alert_type in &alert.alert_types {
            let Some(last) = person.alert_record(alert_type).last_alert else {
                continue;
            };
            let interval = dynamic_interval(self.alerts, person, alert_type, business_hours);
            let elapsed = now - last;
            if elapsed < interval {
                return Err(SuppressionReason::PersonCooldown {
                    person: person.id,
                    alert_type: alert_type.clone(),
                    remaining_secs: interval - elapsed,
                });
            }
        }
        Ok(())
    }
}
