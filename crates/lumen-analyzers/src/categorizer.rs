use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use lumen_core::config::DetectionMethod;
use lumen_core::types::MemoryType;

use crate::llm::AnalysisLlm;
use crate::llm_json::extract_object;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid categorizer pattern"))
        .collect()
}

static CATEGORY_PATTERNS: LazyLock<Vec<(&'static str, MemoryType, Vec<Regex>)>> =
    LazyLock::new(|| {
        vec![
            (
                "personal_fact",
                MemoryType::Fact,
                compile(&[
                    r"(i am|i'm|my name is) ",
                    r"i (work|live|study) (at|in|as)",
                    r"i have a? (job|career|degree|certification)",
                    r"(my age|i'm \d+ years old)",
                    r"(my (hometown|city|country))",
                    r"(single|married|divorced|in a relationship)",
                ]),
            ),
            (
                "preference",
                MemoryType::Preference,
                compile(&[
                    r"i (like|love|enjoy|prefer)",
                    r"i (hate|dislike|can't stand)",
                    r"(my favorite|i'm a fan of)",
                    r"i (always|never|usually) (eat|drink|watch|read|listen)",
                    r"(allergic to|vegetarian|vegan)",
                ]),
            ),
            (
                "goal",
                MemoryType::Fact,
                compile(&[
                    r"i want to",
                    r"i'm (planning|hoping|trying) to",
                    r"(my goal|my dream) is",
                    r"i'm working (on|toward)",
                    r"i aspire to",
                ]),
            ),
            (
                "event",
                MemoryType::Event,
                compile(&[
                    r"(yesterday|last (week|month|year))",
                    r"(i went to|i visited|i traveled)",
                    r"(remember when|back when)",
                    r"(i met|i saw|i did)",
                    r"(celebration|party|wedding)",
                    r"(graduated|got married|had a baby)",
                ]),
            ),
            (
                "relationship",
                MemoryType::Fact,
                compile(&[
                    r"my (wife|husband|partner|boyfriend|girlfriend)",
                    r"my (mom|dad|mother|father|parent)",
                    r"my (son|daughter|child|kid)",
                    r"my (brother|sister|sibling)",
                    r"my (friend|colleague|boss|coworker)",
                ]),
            ),
            (
                "challenge",
                MemoryType::Context,
                compile(&[
                    r"(struggling|having trouble|difficulty) with",
                    r"(problem|issue|challenge) (with|is)",
                    r"(frustrated|stuck|overwhelmed) (with|by)",
                    r"(worry|worried|anxious) about",
                ]),
            ),
            (
                "achievement",
                MemoryType::Event,
                compile(&[
                    r"(got|received|earned) (a|the|my) (promotion|raise|award)",
                    r"(finished|completed|accomplished)",
                    r"(proud|excited) (of|about)",
                    r"(won|achieved|succeeded)",
                    r"(certificate|degree|diploma)",
                ]),
            ),
            (
                "knowledge",
                MemoryType::Context,
                compile(&[
                    r"(did you know|fun fact)",
                    r"(learned|discovered|found out) that",
                    r"(according to|based on)",
                ]),
            ),
        ]
    });

static PEOPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\bmy (?:wife|husband|partner|boyfriend|girlfriend|mom|dad|mother|father|son|daughter|brother|sister|friend|colleague|boss|coworker) (?:is |named |called )?)([A-Z][a-z]+)")
        .expect("invalid people pattern")
});

static PLACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:in|at|to|from) ([A-Z][a-z]+(?: [A-Z][a-z]+)?)\b")
        .expect("invalid places pattern")
});

static DATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(yesterday|today|tomorrow|last (?:week|month|year)|next (?:week|month|year)|\d{4})\b")
        .expect("invalid dates pattern")
});

/// Topic words: long-ish lowercase nouns, minus filler.
static TOPIC_STOPWORDS: &[&str] = &[
    "about", "after", "again", "because", "before", "being", "could", "every",
    "really", "should", "since", "something", "their", "there", "these",
    "thing", "things", "think", "those", "today", "weekend", "where", "which",
    "while", "would",
];

/// How a memory was categorized.
#[derive(Debug, Clone)]
pub struct Categorization {
    pub memory_type: MemoryType,
    pub category: String,
    pub confidence: f32,
}

/// Assigns a category and extracts entities for stored memories.
pub struct MemoryCategorizer {
    method: DetectionMethod,
    llm: Option<Arc<AnalysisLlm>>,
}

#[derive(Deserialize)]
struct LlmCategory {
    category: String,
    #[serde(rename = "type")]
    kind: String,
    confidence: f32,
}

impl MemoryCategorizer {
    pub fn new(method: DetectionMethod, llm: Option<Arc<AnalysisLlm>>) -> Self {
        Self { method, llm }
    }

    pub async fn categorize(&self, content: &str) -> Categorization {
        match self.method {
            DetectionMethod::Pattern => self.categorize_patterns(content),
            DetectionMethod::Llm => match self.categorize_llm(content).await {
                Some(c) => c,
                None => self.categorize_patterns(content),
            },
            DetectionMethod::Hybrid => match self.categorize_llm(content).await {
                Some(c) => c,
                None => self.categorize_patterns(content),
            },
        }
    }

    /// Rule-based categorization: highest-scoring pattern family wins.
    pub fn categorize_patterns(&self, content: &str) -> Categorization {
        let lower = content.to_lowercase();

        let mut best: Option<(usize, &str, MemoryType)> = None;
        for (category, memory_type, patterns) in CATEGORY_PATTERNS.iter() {
            let score = patterns.iter().filter(|p| p.is_match(&lower)).count();
            if score > 0 && best.map(|(s, _, _)| score > s).unwrap_or(true) {
                best = Some((score, category, *memory_type));
            }
        }

        match best {
            Some((score, category, memory_type)) => Categorization {
                memory_type,
                category: category.to_string(),
                confidence: (0.5 + score as f32 * 0.15).min(0.95),
            },
            None => Categorization {
                memory_type: MemoryType::Context,
                category: "knowledge".to_string(),
                confidence: 0.3,
            },
        }
    }

    async fn categorize_llm(&self, content: &str) -> Option<Categorization> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            r#"Categorize this memory about a user.

Memory: "{content}"

Categories: personal_fact, preference, goal, event, relationship, challenge, achievement, knowledge.
Types: fact, preference, event, context.

Return ONLY valid JSON:
{{"category": "name", "type": "fact", "confidence": 0.0-1.0}}"#
        );

        let response = match llm
            .complete("You are a memory categorization system. Output only valid JSON.", &prompt)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM categorization failed");
                return None;
            }
        };

        let parsed: LlmCategory = extract_object(&response)?;
        let memory_type: MemoryType = parsed.kind.parse().ok()?;
        Some(Categorization {
            memory_type,
            category: parsed.category,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        })
    }

    /// Entities worth indexing alongside a memory: people, places, dates,
    /// recurring topic words.
    pub fn extract_entities(&self, content: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();

        for capture in PEOPLE.captures_iter(content) {
            if let Some(name) = capture.get(1) {
                entities.push(name.as_str().to_string());
            }
        }
        for capture in PLACES.captures_iter(content) {
            if let Some(place) = capture.get(1) {
                entities.push(place.as_str().to_string());
            }
        }
        for m in DATES.find_iter(&content.to_lowercase()) {
            entities.push(m.as_str().to_string());
        }
        for word in content.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.len() > 5
                && !TOPIC_STOPWORDS.contains(&word)
                && !entities.iter().any(|e| e.eq_ignore_ascii_case(word))
            {
                entities.push(word.to_string());
            }
        }

        entities.dedup();
        entities.truncate(10);
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorizer() -> MemoryCategorizer {
        MemoryCategorizer::new(DetectionMethod::Pattern, None)
    }

    #[test]
    fn categorizes_preference() {
        let c = categorizer().categorize_patterns("I love hiking in the mountains");
        assert_eq!(c.memory_type, MemoryType::Preference);
        assert_eq!(c.category, "preference");
    }

    #[test]
    fn categorizes_personal_fact() {
        let c = categorizer().categorize_patterns("I work at a hospital in Denver");
        assert_eq!(c.memory_type, MemoryType::Fact);
        assert_eq!(c.category, "personal_fact");
    }

    #[test]
    fn categorizes_event() {
        let c = categorizer().categorize_patterns("Last year I went to Japan for two weeks");
        assert_eq!(c.memory_type, MemoryType::Event);
    }

    #[test]
    fn unmatched_content_defaults_to_knowledge() {
        let c = categorizer().categorize_patterns("mlkjqsdf");
        assert_eq!(c.category, "knowledge");
        assert_eq!(c.memory_type, MemoryType::Context);
    }

    #[test]
    fn extracts_people_and_places() {
        let entities = categorizer()
            .extract_entities("My sister Emma lives in New York since 2019");
        assert!(entities.iter().any(|e| e == "Emma"));
        assert!(entities.iter().any(|e| e == "New York"));
        assert!(entities.iter().any(|e| e == "2019"));
    }
}
