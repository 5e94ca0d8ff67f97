pub mod categorizer;
pub mod emotion;
pub mod goal;
pub mod llm;
pub mod llm_json;
pub mod personality;
pub mod preference;

pub use categorizer::MemoryCategorizer;
pub use emotion::{DetectedEmotion, EmotionDetector};
pub use goal::{DetectedGoal, GoalDetector};
pub use personality::{PersonalityDetector, PersonalityDirective};
pub use preference::{CommunicationPreferences, PreferenceExtractor};
