use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The eight 0–10 trait scales that shape a personality's voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityTraits {
    pub humor_level: u8,
    pub formality_level: u8,
    pub enthusiasm_level: u8,
    pub empathy_level: u8,
    pub directness_level: u8,
    pub curiosity_level: u8,
    pub supportiveness_level: u8,
    pub playfulness_level: u8,
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self {
            humor_level: 5,
            formality_level: 5,
            enthusiasm_level: 5,
            empathy_level: 7,
            directness_level: 5,
            curiosity_level: 5,
            supportiveness_level: 7,
            playfulness_level: 5,
        }
    }
}

impl PersonalityTraits {
    /// Apply named adjustments (clamped to 0–10). Unknown names are ignored.
    pub fn apply(&mut self, adjustments: &std::collections::HashMap<String, u8>) {
        for (name, value) in adjustments {
            let value = (*value).min(10);
            match name.as_str() {
                "humor_level" => self.humor_level = value,
                "formality_level" => self.formality_level = value,
                "enthusiasm_level" => self.enthusiasm_level = value,
                "empathy_level" => self.empathy_level = value,
                "directness_level" => self.directness_level = value,
                "curiosity_level" => self.curiosity_level = value,
                "supportiveness_level" => self.supportiveness_level = value,
                "playfulness_level" => self.playfulness_level = value,
                _ => {}
            }
        }
    }
}

/// The five behavior toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityBehaviors {
    pub asks_questions: bool,
    pub uses_examples: bool,
    pub shares_opinions: bool,
    pub challenges_user: bool,
    pub celebrates_wins: bool,
}

impl Default for PersonalityBehaviors {
    fn default() -> Self {
        Self {
            asks_questions: true,
            uses_examples: true,
            shares_opinions: false,
            challenges_user: false,
            celebrates_wins: true,
        }
    }
}

impl PersonalityBehaviors {
    pub fn apply(&mut self, adjustments: &std::collections::HashMap<String, bool>) {
        for (name, value) in adjustments {
            match name.as_str() {
                "asks_questions" => self.asks_questions = *value,
                "uses_examples" => self.uses_examples = *value,
                "shares_opinions" => self.shares_opinions = *value,
                "challenges_user" => self.challenges_user = *value,
                "celebrates_wins" => self.celebrates_wins = *value,
                _ => {}
            }
        }
    }
}

/// A personality definition. User-owned rows are scoped to their owner;
/// rows owned by the synthetic system user are global and resolvable by
/// name from any user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub archetype: Option<String>,
    pub relationship_type: String,
    pub traits: PersonalityTraits,
    pub behaviors: PersonalityBehaviors,
    pub backstory: Option<String>,
    pub custom_instructions: Option<String>,
    pub speaking_style: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Personality {
    pub fn is_global(&self) -> bool {
        self.owner_user_id == lumen_core::types::system_user_id()
    }
}

/// One reached relationship milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(rename = "type")]
    pub kind: String,
    pub reached_at: String,
    pub message: String,
}

/// Relationship metrics, unique per `(user, personality)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipState {
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub total_messages: u32,
    pub depth_score: f32,
    pub trust_level: f32,
    pub days_known: i64,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub milestones: Vec<Milestone>,
    pub positive_reactions: u32,
    pub negative_reactions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn trait_apply_clamps_and_ignores_unknown() {
        let mut traits = PersonalityTraits::default();
        let mut adjustments = HashMap::new();
        adjustments.insert("humor_level".to_string(), 13u8);
        adjustments.insert("nonsense_level".to_string(), 9u8);
        traits.apply(&adjustments);
        assert_eq!(traits.humor_level, 10);
    }

    #[test]
    fn behavior_apply_flips_named_toggle() {
        let mut behaviors = PersonalityBehaviors::default();
        let mut adjustments = HashMap::new();
        adjustments.insert("challenges_user".to_string(), true);
        behaviors.apply(&adjustments);
        assert!(behaviors.challenges_user);
    }
}
