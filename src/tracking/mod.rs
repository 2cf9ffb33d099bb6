mod association;
mod identity;
mod person;

pub use association::{Assignment, AssociationEngine};
pub use identity::IdentityStore;
pub use person::{AlertRecord, GridCell, PersonId, PositionSample, TrackedPerson};
