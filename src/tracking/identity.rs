use crate::geometry::BoundingBox;

use super::person::{PersonId, TrackedPerson};

/// Persons currently tracked by one camera, in creation order. The order
/// fixes the rows of the similarity matrix.
#[derive(Debug, Default)]
pub struct IdentityStore {
    persons: Vec<TrackedPerson>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn get(&self, id: &PersonId) -> Option<&TrackedPerson> {
        self.persons.iter().find(|p| p.id == *id)
    }

    pub fn get_mut(&mut self, id: &PersonId) -> Option<&mut TrackedPerson> {
        self.persons.iter_mut().find(|p| p.id == *id)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedPerson> {
        self.persons.iter()
    }

    pub fn evict_stale(&mut self, now: f64, memory_secs: f64) -> usize {
        let before = self.persons.len();
        self.persons.retain(|p| {
            let keep = now - p.last_seen <= memory_secs;
            if !keep {
                tracing::debug!(
                    person = %p.id,
                    frames = p.frames_tracked,
                    idle_secs = format!("{:.1}", now - p.last_seen),
                    "evicting stale person"
                );
            }
            keep
        });
        before - self.persons.len()
    }

    /// Update the person `id` with a new observation, or create a new person
    /// when `id` is unset or no longer tracked. Returns the person's id.
    pub fn upsert(
        &mut self,
        id: Option<PersonId>,
        bbox: BoundingBox,
        confidence: f32,
        now: f64,
    ) -> PersonId {
        if let Some(person) = id.and_then(|id| self.get_mut(&id)) {
            person.observe(bbox, confidence, now);
            return person.id;
        }

        let person = TrackedPerson::new(bbox, confidence, now);
        let id = person.id;
        tracing::debug!(person = %id, bbox = ?bbox, "new person");
        self.persons.push(person);
        id
    }

    pub fn best_overlap(&self, bbox: &BoundingBox, min_iou: f32) -> Option<(PersonId, f32)> {
        let mut best: Option<(PersonId, f32)> = None;
        for person in &self.persons {
            let iou = person.bbox.iou(bbox);
            if iou > min_iou && best.map_or(true, |(_, b)| iou > b) {
                best = Some((person.id, iou));
            }
        }
        best
    }
}
