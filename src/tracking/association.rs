use std::collections::BTreeMap;

use crate::config::TrackingConfig;
use crate::detection::Detection;
use crate::geometry::BoundingBox;

use super::identity::IdentityStore;
use super::person::PersonId;

pub type Assignment = BTreeMap<usize, PersonId>;

const FORBIDDEN: f32 = -1.0;
const NON_SPATIAL_SIMILARITY: f32 = 0.5;
/// Distance-only scores are discounted relative to overlap.
const DISTANCE_WEIGHT: f32 = 0.8;

struct SimilarityMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl SimilarityMatrix {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![FORBIDDEN; rows * cols],
        }
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        self.values[row * self.cols + col] = value;
    }

    /// First maximal cell in row-major order.
    fn argmax(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &value) in self.values.iter().enumerate() {
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((idx, value));
            }
        }
        best.map(|(idx, value)| (idx / self.cols, idx % self.cols, value))
    }

    fn mask(&mut self, row: usize, col: usize) {
        for c in 0..self.cols {
            self.values[row * self.cols + c] = FORBIDDEN;
        }
        for r in 0..self.rows {
            self.values[r * self.cols + col] = FORBIDDEN;
        }
    }
}

pub struct AssociationEngine<'a> {
    config: &'a TrackingConfig,
}

impl<'a> AssociationEngine<'a> {
    pub fn new(config: &'a TrackingConfig) -> Self {
        Self { config }
    }

    fn is_trackable(&self, detection: &Detection) -> bool {
        detection.bbox.is_some() && detection.is_class(&self.config.monitored_class)
    }

    fn similarity(&self, person_bbox: &BoundingBox, detection: &Detection) -> f32 {
        let Some(bbox) = detection.bbox.filter(|_| self.is_trackable(detection)) else {
            return f32::NEG_INFINITY;
        };

        if !self.config.use_spatial {
            return NON_SPATIAL_SIMILARITY;
        }

        let max_distance = self.config.max_distance_threshold;
        let distance = person_bbox.center_distance(&bbox);
        if distance > max_distance {
            return FORBIDDEN;
        }

        let iou = person_bbox.iou(&bbox);
        if iou > self.config.min_iou_threshold {
            iou
        } else {
            DISTANCE_WEIGHT * (1.0 - distance / max_distance).max(0.0)
        }
    }

    /// Stale persons must already have been evicted.
    pub fn associate(
        &self,
        store: &mut IdentityStore,
        detections: &[Detection],
        now: f64,
    ) -> Assignment {
        let mut assignment = Assignment::new();

        if !store.is_empty() && !detections.is_empty() {
            let person_ids: Vec<PersonId> = store.iter().map(|p| p.id).collect();
            let mut matrix = SimilarityMatrix::new(person_ids.len(), detections.len());

            for (i, person) in store.iter().enumerate() {
                for (j, detection) in detections.iter().enumerate() {
                    let score = self.similarity(&person.bbox, detection);
                    tracing::trace!(person = %person.id, detection = j, score, "similarity");
                    matrix.set(i, j, score);
                }
            }

            while let Some((i, j, score)) = matrix.argmax() {
                if score < 0.0 {
                    break;
                }

                let detection = &detections[j];
                let Some(bbox) = detection.bbox else {
                    matrix.mask(i, j);
                    continue;
                };

                let id = store.upsert(Some(person_ids[i]), bbox, detection.confidence, now);
                tracing::debug!(person = %id, detection = j, score, "matched detection");
                assignment.insert(j, id);
                matrix.mask(i, j);
            }
        }

        for (j, detection) in detections.iter().enumerate() {
            if assignment.contains_key(&j) || !self.is_trackable(detection) {
                continue;
            }
            if let Some(bbox) = detection.bbox {
                let id = store.upsert(None, bbox, detection.confidence, now);
                assignment.insert(j, id);
            }
        }

        assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn person(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new("person", 0.9, BoundingBox::new(x1, y1, x2, y2))
    }

    fn config() -> TrackingConfig {
        TrackingConfig {
            max_distance_threshold: 100.0,
            min_iou_threshold: 0.3,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_store_spawns_persons() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let assignment = engine.associate(&mut store, &[person(10.0, 10.0, 50.0, 100.0)], 0.0);

        assert_eq!(assignment.len(), 1);
        assert!(store.contains(&assignment[&0]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overlapping_detection_keeps_identity() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let first = engine.associate(&mut store, &[person(10.0, 10.0, 50.0, 100.0)], 0.0);
        let second = engine.associate(&mut store, &[person(12.0, 11.0, 52.0, 101.0)], 1.0);

        assert_eq!(first[&0], second[&0]);
        assert_eq!(store.len(), 1);
        let tracked = store.get(&second[&0]).unwrap();
        assert_eq!(tracked.bbox, BoundingBox::new(12.0, 11.0, 52.0, 101.0));
        assert_eq!(tracked.frames_tracked, 2);
    }

    #[test]
    fn test_far_detection_spawns_new_person() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let first = engine.associate(&mut store, &[person(0.0, 0.0, 40.0, 90.0)], 0.0);
        let second = engine.associate(&mut store, &[person(400.0, 0.0, 440.0, 90.0)], 1.0);

        assert_ne!(first[&0], second[&0]);
        assert_eq!(store.len(), 2);
        // unmatched person is untouched
        let untouched = store.get(&first[&0]).unwrap();
        assert_eq!(untouched.last_seen, 0.0);
        assert_eq!(untouched.frames_tracked, 1);
    }

    #[test]
    fn test_distance_fallback_matches_without_overlap() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let first = engine.associate(&mut store, &[person(0.0, 0.0, 20.0, 20.0)], 0.0);
        // no overlap, centers 30 px apart
        let second = engine.associate(&mut store, &[person(30.0, 0.0, 50.0, 20.0)], 1.0);

        assert_eq!(first[&0], second[&0]);
    }

    #[test]
    fn test_non_person_detections_ignored() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let detections = vec![
            Detection::new("knife", 0.8, BoundingBox::new(10.0, 10.0, 20.0, 20.0)),
            person(10.0, 10.0, 50.0, 100.0),
            Detection {
                class_name: "person".into(),
                confidence: 0.5,
                bbox: None,
            },
        ];
        let assignment = engine.associate(&mut store, &detections, 0.0);
        assert_eq!(assignment.keys().copied().collect::<Vec<_>>(), vec![1]);

        let again = engine.associate(&mut store, &detections, 1.0);
        assert_eq!(again.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(again[&1], assignment[&1]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_assignment_is_one_to_one_and_total() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let frame1 = vec![
            person(0.0, 0.0, 40.0, 90.0),
            person(60.0, 0.0, 100.0, 90.0),
            person(300.0, 0.0, 340.0, 90.0),
        ];
        engine.associate(&mut store, &frame1, 0.0);

        let frame2 = vec![
            person(30.0, 0.0, 70.0, 90.0),
            person(31.0, 0.0, 71.0, 90.0),
            person(32.0, 0.0, 72.0, 90.0),
            person(33.0, 0.0, 73.0, 90.0),
            person(305.0, 0.0, 345.0, 90.0),
        ];
        let assignment = engine.associate(&mut store, &frame2, 1.0);

        assert_eq!(assignment.len(), frame2.len());
        let ids: HashSet<_> = assignment.values().collect();
        assert_eq!(ids.len(), frame2.len());
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_non_spatial_matches_first_available() {
        let config = TrackingConfig {
            use_spatial: false,
            ..config()
        };
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let first = engine.associate(&mut store, &[person(0.0, 0.0, 10.0, 10.0)], 0.0);
        // far away, still matched when topology is ignored
        let second = engine.associate(&mut store, &[person(900.0, 900.0, 910.0, 910.0)], 1.0);

        assert_eq!(first[&0], second[&0]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_best_pair_wins() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        let first = engine.associate(
            &mut store,
            &[person(0.0, 0.0, 40.0, 90.0), person(50.0, 0.0, 90.0, 90.0)],
            0.0,
        );

        // detection 0 overlaps person B almost exactly, detection 1 is near A
        let second = engine.associate(
            &mut store,
            &[person(51.0, 0.0, 91.0, 90.0), person(5.0, 0.0, 45.0, 90.0)],
            1.0,
        );

        assert_eq!(second[&0], first[&1]);
        assert_eq!(second[&1], first[&0]);
    }

    #[test]
    fn test_degenerate_box_does_not_panic() {
        let config = config();
        let engine = AssociationEngine::new(&config);
        let mut store = IdentityStore::new();

        engine.associate(&mut store, &[person(10.0, 10.0, 10.0, 10.0)], 0.0);
        let assignment = engine.associate(&mut store, &[person(10.0, 10.0, 10.0, 10.0)], 1.0);

        assert_eq!(assignment.len(), 1);
        assert_eq!(store.len(), 1);
    }
}
