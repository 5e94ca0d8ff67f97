use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lumen_core::config::DetectionMethod;

use crate::llm::AnalysisLlm;
use crate::llm_json::extract_object;

/// Keyword-overlap score needed to match a message to an existing goal.
pub const GOAL_MATCH_THRESHOLD: f32 = 0.3;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid goal pattern"))
        .collect()
}

static EXPLICIT_GOAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(my goal|my dream|my aspiration) is to",
        r"i want to (learn|achieve|accomplish|become|get|reach)",
        r"i'm (planning|hoping|trying|working) to",
        r"i'd like to",
        r"i'm going to",
        r"i'm aiming (to|for)",
        r"i aspire to",
        r"i'm determined to",
    ])
});

static IMPLICIT_GOAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(starting|beginning|committing to)",
        r"(working on|focusing on) .*(goal|project|learning)",
        r"decided to",
        r"(planning|preparing) for",
    ])
});

static POSITIVE_PROGRESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(made|making) (good |great |)progress",
        r"(finished|completed|done with)",
        r"(finally |just |)(achieved|accomplished|reached)",
        r"(getting|got) (better|closer|good) at",
        r"(improved|improving)",
        r"(mastered|learned)",
        r"milestone",
        r"on track",
    ])
});

static NEGATIVE_PROGRESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(struggling|stuck|having trouble) (with|on)",
        r"(not making|no) progress",
        r"(behind|falling behind) (on|schedule)",
        r"(obstacle|setback)",
        r"can't (seem to|figure out)",
        r"frustrated (with|by)",
        r"gave up (on|)",
        r"off track",
    ])
});

static NEUTRAL_PROGRESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(still working|continuing) (on|with)",
        r"(currently|right now) (learning|practicing|studying)",
        r"(been|was) (working|practicing|studying)",
        r"(today|yesterday|this week) i (worked|practiced|studied)",
    ])
});

static COMPLETION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(finally |just |)(finished|completed|accomplished|achieved)",
        r"(reached|hit|met) (my |the |)goal",
        r"(done|finished) with",
        r"goal (achieved|completed|met)",
        r"(successfully|finally) (became|got|reached|earned)",
        r"proud to (say|announce)",
    ])
});

static CATEGORIES: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            "learning",
            compile(&[
                r"learn|study|practice|course|class|tutorial|training|education|skill",
                r"(certification|certificate|degree|diploma)",
                r"(programming|coding|language|spanish|french|german|chinese|japanese)",
            ]),
        ),
        (
            "health",
            compile(&[
                r"(lose|gain) weight",
                r"(exercise|workout|gym|fitness|running|jogging)",
                r"(diet|nutrition|eating|healthy)",
                r"(sleep|meditation|yoga)",
                r"(quit|stop) (smoking|drinking)",
            ]),
        ),
        (
            "career",
            compile(&[
                r"(job|career|work|employment)",
                r"(promotion|raise|salary)",
                r"(interview|application|resume)",
                r"(start|launch) (business|company|startup)",
            ]),
        ),
        (
            "financial",
            compile(&[
                r"(save|saving|savings)",
                r"(invest|investment|stocks)",
                r"(budget|budgeting|money)",
                r"(debt|loan|mortgage)",
                r"(emergency fund|retirement)",
            ]),
        ),
        (
            "creative",
            compile(&[
                r"(write|writing|novel|book|story)",
                r"(paint|painting|draw|drawing|art)",
                r"(music|song|instrument|guitar|piano)",
                r"(photography|photo)",
            ]),
        ),
        (
            "social",
            compile(&[
                r"(make|meet) (friends|people)",
                r"(social|socialize|socializing)",
                r"(community|volunteer|volunteering)",
                r"(network|networking)",
            ]),
        ),
        (
            "personal",
            compile(&[
                r"(relationship|dating|marriage)",
                r"(family|friends)",
                r"(hobby|interest|passion)",
                r"(travel|trip|vacation)",
                r"(move|moving|relocate)",
            ]),
        ),
    ]
});

static TITLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(my goal is to|i want to|i'm planning to|i'd like to|i need to|i should|i will|i'm going to|i'm trying to|i'm hoping to|i'm working to)\s+",
    )
    .expect("invalid title prefix pattern")
});

static MOTIVATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[r"because", r"so that", r"in order to", r"for my"])
});

static OBSTACLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(problem|issue|challenge|obstacle|difficulty) (is|with|:)",
        r"(struggling|stuck) (with|on|because)",
        r"(too|very) (hard|difficult|challenging)",
    ])
});

const TITLE_STOPWORDS: &[&str] = &["i", "me", "my", "the", "a", "an", "to", "for", "in", "on", "at", "by"];

/// A freshly declared goal extracted from one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedGoal {
    pub title: String,
    pub category: String,
    pub confidence: f32,
    pub motivation: Option<String>,
}

/// A mention of an existing goal: progress, setback, or completion.
#[derive(Debug, Clone, Serialize)]
pub struct GoalMention {
    pub goal_index: usize,
    /// mention | update | setback | completion
    pub progress_type: String,
    /// positive | negative | neutral
    pub sentiment: String,
    pub match_score: f32,
}

/// Detects new goal declarations and mentions of existing goals.
pub struct GoalDetector {
    method: DetectionMethod,
    llm: Option<Arc<AnalysisLlm>>,
}

#[derive(Deserialize)]
struct LlmGoal {
    title: String,
    category: String,
    confidence: f32,
    #[serde(default)]
    motivation: Option<String>,
}

impl GoalDetector {
    pub fn new(method: DetectionMethod, llm: Option<Arc<AnalysisLlm>>) -> Self {
        Self { method, llm }
    }

    /// Detect a new goal declaration, if the message contains one.
    pub async fn detect_goal(&self, message: &str) -> Option<DetectedGoal> {
        match self.method {
            DetectionMethod::Pattern => detect_goal_patterns(message),
            DetectionMethod::Llm => self.detect_goal_llm(message).await,
            DetectionMethod::Hybrid => match self.detect_goal_llm(message).await {
                Some(goal) => Some(goal),
                None => detect_goal_patterns(message),
            },
        }
    }

    async fn detect_goal_llm(&self, message: &str) -> Option<DetectedGoal> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            r#"Does this message declare a new personal goal?

Message: "{message}"

Categories: learning, health, career, financial, creative, social, personal.

Return ONLY valid JSON. If no goal:
{{"title": "", "category": "personal", "confidence": 0.0}}
If a goal is declared:
{{"title": "short goal title", "category": "learning", "confidence": 0.9, "motivation": "why, if stated"}}"#
        );

        let response = match llm
            .complete("You are a goal detection system. Output only valid JSON.", &prompt)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM goal detection failed");
                return None;
            }
        };

        let parsed: LlmGoal = extract_object(&response)?;
        if parsed.title.trim().is_empty() || parsed.confidence < 0.5 {
            return None;
        }
        Some(DetectedGoal {
            title: parsed.title,
            category: parsed.category,
            confidence: parsed.confidence.min(1.0),
            motivation: parsed.motivation,
        })
    }

    /// Match a message against the user's active goals by keyword overlap.
    /// Goals are referenced by index into `goal_titles`.
    pub fn detect_progress_mentions(message: &str, goal_titles: &[String]) -> Vec<GoalMention> {
        let lower = message.to_lowercase();
        let mut mentions = Vec::new();

        for (index, title) in goal_titles.iter().enumerate() {
            let keywords = title_keywords(title);
            if keywords.is_empty() {
                continue;
            }
            let hits = keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .count();
            let match_score = hits as f32 / keywords.len() as f32;
            if match_score < GOAL_MATCH_THRESHOLD {
                continue;
            }

            let (progress_type, sentiment) = analyze_progress_sentiment(&lower);
            mentions.push(GoalMention {
                goal_index: index,
                progress_type,
                sentiment,
                match_score,
            });
        }

        mentions
    }

    pub fn detect_completion(message: &str) -> bool {
        let lower = message.to_lowercase();
        COMPLETION.iter().any(|p| p.is_match(&lower))
    }

    pub fn extract_obstacle(message: &str) -> Option<String> {
        let lower = message.to_lowercase();
        OBSTACLE
            .iter()
            .any(|p| p.is_match(&lower))
            .then(|| message.to_string())
    }
}

/// Rule-based new-goal detection.
pub fn detect_goal_patterns(message: &str) -> Option<DetectedGoal> {
    let lower = message.to_lowercase();

    let confidence = if EXPLICIT_GOAL.iter().any(|p| p.is_match(&lower)) {
        0.9
    } else if IMPLICIT_GOAL.iter().any(|p| p.is_match(&lower)) {
        0.6
    } else {
        return None;
    };

    let category = detect_category(&lower);
    let title = extract_title(message);
    let motivation = MOTIVATION
        .iter()
        .any(|p| p.is_match(&lower))
        .then(|| message.to_string());

    debug!(%title, %category, confidence, "detected goal declaration");
    Some(DetectedGoal {
        title,
        category,
        confidence,
        motivation,
    })
}

fn detect_category(message: &str) -> String {
    let mut best: Option<(usize, &str)> = None;
    for (category, patterns) in CATEGORIES.iter() {
        let score = patterns.iter().filter(|p| p.is_match(message)).count();
        if score > 0 && best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, category));
        }
    }
    best.map(|(_, c)| c.to_string())
        .unwrap_or_else(|| "personal".to_string())
}

fn extract_title(message: &str) -> String {
    let lower = message.to_lowercase();
    let cleaned = TITLE_PREFIX.replace(&lower, "");
    let first_sentence = cleaned.split('.').next().unwrap_or(&cleaned).trim();

    let mut title: String = first_sentence.chars().take(100).collect();
    if let Some(first) = title.get(0..1).map(str::to_uppercase) {
        title.replace_range(0..1, &first);
    }
    title
}

/// Key words from a goal title, for mention matching.
fn title_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3 && !TITLE_STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

fn analyze_progress_sentiment(message: &str) -> (String, String) {
    // Completion first: its wording overlaps the positive-progress set.
    if COMPLETION.iter().any(|p| p.is_match(message)) {
        return ("completion".to_string(), "positive".to_string());
    }
    if POSITIVE_PROGRESS.iter().any(|p| p.is_match(message)) {
        return ("update".to_string(), "positive".to_string());
    }
    if NEGATIVE_PROGRESS.iter().any(|p| p.is_match(message)) {
        return ("setback".to_string(), "negative".to_string());
    }
    if NEUTRAL_PROGRESS.iter().any(|p| p.is_match(message)) {
        return ("mention".to_string(), "neutral".to_string());
    }
    ("mention".to_string(), "neutral".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_explicit_goal() {
        let goal = detect_goal_patterns("I want to learn Spanish before my trip").unwrap();
        assert_eq!(goal.category, "learning");
        assert!(goal.confidence >= 0.9);
        assert!(goal.title.to_lowercase().contains("learn spanish"));
    }

    #[test]
    fn detects_implicit_goal_with_lower_confidence() {
        let goal = detect_goal_patterns("decided to start saving for retirement").unwrap();
        assert_eq!(goal.category, "financial");
        assert!((goal.confidence - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn plain_statement_is_not_a_goal() {
        assert!(detect_goal_patterns("the weather is nice today").is_none());
    }

    #[test]
    fn matches_existing_goal_by_keywords() {
        let goals = vec!["Learn spanish for travel".to_string()];
        let mentions =
            GoalDetector::detect_progress_mentions("I practiced spanish today and made great progress", &goals);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].sentiment, "positive");
        assert_eq!(mentions[0].progress_type, "update");
    }

    #[test]
    fn setback_sentiment_detected() {
        let goals = vec!["Learn spanish".to_string()];
        let mentions =
            GoalDetector::detect_progress_mentions("I'm struggling with spanish grammar", &goals);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].progress_type, "setback");
        assert_eq!(mentions[0].sentiment, "negative");
    }

    #[test]
    fn unrelated_message_matches_nothing() {
        let goals = vec!["Learn spanish".to_string()];
        let mentions = GoalDetector::detect_progress_mentions("what time is it?", &goals);
        assert!(mentions.is_empty());
    }

    #[test]
    fn completion_detected() {
        assert!(GoalDetector::detect_completion("I finally reached my goal!"));
        assert!(!GoalDetector::detect_completion("still a long way to go"));
    }
}
