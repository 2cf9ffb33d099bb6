use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::geometry::BoundingBox;

pub type PersonId = Uuid;

pub const POSITION_HISTORY_LEN: usize = 10;
pub const DWELL_GRID_SIZE: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub col: i32,
    pub row: i32,
}

impl GridCell {
    fn of(x: f32, y: f32) -> Self {
        Self {
            col: (x / DWELL_GRID_SIZE).floor() as i32,
            row: (y / DWELL_GRID_SIZE).floor() as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertRecord {
    pub last_alert: Option<f64>,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct TrackedPerson {
    pub id: PersonId,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub first_seen: f64,
    pub last_seen: f64,
    pub frames_tracked: u64,
    positions: VecDeque<PositionSample>,
    movement_score: f32,
    dwell: HashMap<GridCell, f64>,
    alerts: HashMap<String, AlertRecord>,
}

impl TrackedPerson {
    pub fn new(bbox: BoundingBox, confidence: f32, now: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            bbox,
            confidence,
            first_seen: now,
            last_seen: now,
            frames_tracked: 1,
            positions: VecDeque::with_capacity(POSITION_HISTORY_LEN),
            movement_score: 0.0,
            dwell: HashMap::new(),
            alerts: HashMap::new(),
        }
    }

    pub fn observe(&mut self, bbox: BoundingBox, confidence: f32, now: f64) {
        let elapsed = (now - self.last_seen).max(0.0);

        self.bbox = bbox;
        self.confidence = confidence;
        self.last_seen = now;
        self.frames_tracked += 1;

        let (x, y) = bbox.center();
        self.positions.push_back(PositionSample {
            x,
            y,
            timestamp: now,
        });
        while self.positions.len() > POSITION_HISTORY_LEN {
            self.positions.pop_front();
        }
        self.movement_score = movement_score(&self.positions);

        *self.dwell.entry(GridCell::of(x, y)).or_insert(0.0) += elapsed;
    }

    /// Average speed in pixels per second over the position history.
    pub fn movement_score(&self) -> f32 {
        self.movement_score
    }

    pub fn positions(&self) -> impl Iterator<Item = &PositionSample> {
        self.positions.iter()
    }

    pub fn longest_dwell(&self) -> Option<(GridCell, f64)> {
        self.dwell
            .iter()
            .map(|(cell, secs)| (*cell, *secs))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    }

    pub fn alert_record(&self, alert_type: &str) -> AlertRecord {
        self.alerts.get(alert_type).copied().unwrap_or_default()
    }

    pub fn record_alert(&mut self, alert_type: &str, now: f64) {
        let record = self.alerts.entry(alert_type.to_string()).or_default();
        record.last_alert = Some(now);
        record.count += 1;
    }

    pub fn total_alerts(&self) -> u32 {
        self.alerts.values().map(|r| r.count).sum()
    }
}

fn movement_score(positions: &VecDeque<PositionSample>) -> f32 {
    let mut total = 0.0f64;
    let mut pairs = 0u32;

    for (prev, curr) in positions.iter().zip(positions.iter().skip(1)) {
        let dt = curr.timestamp - prev.timestamp;
        if dt <= 0.0 {
            continue;
        }
        let dist = ((curr.x - prev.x).powi(2) + (curr.y - prev.y).powi(2)).sqrt() as f64;
        total += dist / dt;
        pairs += 1;
    }

    if pairs == 0 {
        return 0.0;
    }
    (total / pairs as f64) as f32
}
