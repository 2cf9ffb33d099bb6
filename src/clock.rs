use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Timelike;

/// Wall-clock source for the tracker. Timestamps are seconds since the Unix
/// epoch; the local hour drives the business-hours factors.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
    fn local_hour(&self) -> u32;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn local_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(f64, u32)>,
}

impl ManualClock {
    pub fn new(start: f64, hour: u32) -> Self {
        Self {
            state: Mutex::new((start, hour)),
        }
    }

    pub fn advance(&self, secs: f64) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0 += secs;
    }

    pub fn set(&self, now: f64) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0 = now;
    }

    pub fn set_hour(&self, hour: u32) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1 = hour;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    fn local_hour(&self) -> u32 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}
