pub mod archetypes;
pub mod cache;
pub mod db;
pub mod error;
pub mod relationship;
pub mod service;
pub mod types;

pub use cache::PersonalityCache;
pub use error::PersonalityError;
pub use relationship::RelationshipStore;
pub use service::PersonalityStore;
pub use types::{Personality, PersonalityBehaviors, PersonalityTraits, RelationshipState};
