use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::alert::SuppressionReason;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalEntry {
    pub last_alert: Option<f64>,
    pub min_interval_secs: f64,
    pub trigger_count: u64,
}

impl GlobalEntry {
    fn remaining(&self, now: f64) -> Option<f64> {
        let last = self.last_alert?;
        let elapsed = now - last;
        (elapsed < self.min_interval_secs).then(|| self.min_interval_secs - elapsed)
    }
}

#[derive(Debug, Default)]
pub struct GlobalSuppression {
    entries: HashMap<String, GlobalEntry>,
}

impl GlobalSuppression {
    /// Deny when any of `alert_types` fired globally less than its minimum
    /// interval ago. Types without an entry have no global cooldown.
    pub fn check(&self, alert_types: &BTreeSet<String>, now: f64) -> Result<(), SuppressionReason> {
        for alert_type in alert_types {
            let remaining = self
                .entries
                .get(alert_type)
                .and_then(|entry| entry.remaining(now));
            if let Some(remaining_secs) = remaining {
                return Err(SuppressionReason::GlobalSuppression {
                    alert_type: alert_type.clone(),
                    remaining_secs,
                });
            }
        }
        Ok(())
    }

    pub fn record(&mut self, alert_types: &BTreeSet<String>, now: f64) {
        for alert_type in alert_types {
            let entry = self.entries.entry(alert_type.clone()).or_default();
            entry.last_alert = Some(now);
            entry.trigger_count += 1;
        }
    }

    pub fn entry(&self, alert_type: &str) -> Option<GlobalEntry> {
        self.entries.get(alert_type).copied()
    }
}

/// Cloneable handle to the process-wide [`GlobalSuppression`] table.
#[derive(Debug, Clone, Default)]
pub struct GlobalSuppressionTable {
    inner: Arc<Mutex<GlobalSuppression>>,
}

impl GlobalSuppressionTable {
    pub fn new<I, S>(intervals: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let entries = intervals
            .into_iter()
            .map(|(alert_type, secs)| {
                (
                    alert_type.into(),
                    GlobalEntry {
                        min_interval_secs: secs,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(GlobalSuppression { entries })),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, GlobalSuppression> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entry(&self, alert_type: &str) -> Option<GlobalEntry> {
        self.lock().entry(alert_type)
    }

    /// Replace the minimum intervals, keeping last-alert times and counts.
    /// Types missing from `intervals` fall back to no global cooldown.
    pub fn set_intervals(&self, intervals: &HashMap<String, f64>) {
        let mut table = self.lock();
        for (alert_type, entry) in table.entries.iter_mut() {
            entry.min_interval_secs = intervals.get(alert_type).copied().unwrap_or(0.0);
        }
        for (alert_type, secs) in intervals {
            table
                .entries
                .entry(alert_type.clone())
                .or_default()
                .min_interval_secs = *secs;
        }
    }
}
