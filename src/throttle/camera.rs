use std::collections::VecDeque;

use crate::alert::SuppressionReason;

#[derive(Debug, Default, Clone)]
pub struct CameraAlertHistory {
    alerts: VecDeque<f64>,
    cooldown_until: Option<f64>,
}

impl CameraAlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate-limit gate. A camera in cooldown is denied without looking at its
    /// history; a camera that reached `max_alerts` within `window_secs` is
    /// denied and put into cooldown for `cooldown_secs`.
    pub fn check(
        &mut self,
        now: f64,
        window_secs: f64,
        max_alerts: u32,
        cooldown_secs: f64,
    ) -> Result<(), SuppressionReason> {
        if let Some(until) = self.cooldown_until.filter(|until| now < *until) {
            return Err(SuppressionReason::CameraCooldown {
                remaining_secs: until - now,
            });
        }

        while let Some(&oldest) = self.alerts.front() {
            if now - oldest < window_secs {
                break;
            }
            self.alerts.pop_front();
        }

        if self.alerts.len() >= max_alerts as usize {
            self.cooldown_until = Some(now + cooldown_secs);
            return Err(SuppressionReason::CameraRateLimit {
                alerts_in_window: self.alerts.len(),
            });
        }

        Ok(())
    }

    pub fn record(&mut self, now: f64) {
        self.alerts.push_back(now);
    }

    pub fn cooldown_until(&self) -> Option<f64> {
        self.cooldown_until
    }

    pub fn in_cooldown(&self, now: f64) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn alerts_in_window(&self) -> usize {
        self.alerts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_then_cooldown() {
        let mut history = CameraAlertHistory::new();

        assert!(history.check(0.0, 60.0, 2, 3600.0).is_ok());
        history.record(0.0);
        assert!(history.check(10.0, 60.0, 2, 3600.0).is_ok());
        history.record(10.0);

        assert_eq!(
            history.check(20.0, 60.0, 2, 3600.0),
            Err(SuppressionReason::CameraRateLimit {
                alerts_in_window: 2
            })
        );
        assert_eq!(history.cooldown_until(), Some(3620.0));

        match history.check(21.0, 60.0, 2, 3600.0) {
            Err(SuppressionReason::CameraCooldown { remaining_secs }) => {
                assert_eq!(remaining_secs, 3599.0)
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
        assert_eq!(history.cooldown_until(), Some(3620.0));
    }

    #[test]
    fn test_window_prunes_old_alerts() {
        let mut history = CameraAlertHistory::new();
        history.record(0.0);
        history.record(30.0);

        assert!(history.check(61.0, 60.0, 2, 3600.0).is_ok());
        assert_eq!(history.alerts_in_window(), 1);
        assert!(!history.in_cooldown(61.0));
    }

    #[test]
    fn test_cooldown_elapses() {
        let mut history = CameraAlertHistory::new();
        history.record(0.0);
        assert!(history.check(1.0, 60.0, 1, 100.0).is_err());
        assert!(history.in_cooldown(50.0));
        assert!(history.check(102.0, 60.0, 1, 100.0).is_ok());
    }
}
