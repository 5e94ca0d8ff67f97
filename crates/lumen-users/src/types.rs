use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One detected emotion, persisted for trend analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub emotion: String,
    pub confidence: f32,
    pub intensity: String,
    pub indicators: Vec<String>,
    /// First 100 chars of the triggering message.
    pub message_snippet: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Paused,
    Abandoned,
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Paused => write!(f, "paused"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "paused" => Ok(Self::Paused),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown goal status: {other}")),
        }
    }
}

/// A tracked user goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub status: GoalStatus,
    /// 0–100 percent.
    pub progress: f32,
    pub target_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_mentioned_at: Option<DateTime<Utc>>,
    pub mention_count: u32,
    pub motivation: Option<String>,
    pub obstacles: Vec<String>,
    pub milestones: Vec<String>,
    pub progress_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only goal history event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProgressEntry {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub user_id: Uuid,
    /// mention | update | milestone | setback | completion
    pub kind: String,
    pub content: String,
    pub sentiment: Option<String>,
    pub emotion: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// What one turn's background goal tracking produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoalTrackingOutcome {
    pub new_goals: Vec<Goal>,
    pub progress_updates: Vec<GoalProgressEntry>,
    pub completions: Vec<String>,
}
