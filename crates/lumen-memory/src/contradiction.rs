use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use lumen_analyzers::llm::AnalysisLlm;
use lumen_analyzers::llm_json::extract_object;
use lumen_core::config::DetectionMethod;

/// Opposite-sentiment preference statements ("I love X" / "I hate X").
static POSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(i\s+like|i\s+love|i\s+enjoy|i\s+prefer|my\s+favorite|i'm\s+interested\s+in|i'm\s+into)\b",
        r"\b(yes|yeah|yep|sure|definitely|absolutely)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid positive pattern"))
    .collect()
});

static NEGATIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(i\s+don't\s+like|i\s+hate|i\s+dislike|i\s+don't\s+enjoy|i\s+don't\s+prefer|not\s+my\s+favorite)\b",
        r"\b(i\s+do\s+not\s+like|i\s+do\s+not\s+enjoy)\b",
        r"\b(no|nope|nah|not\s+really|don't|never)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid negative pattern"))
    .collect()
});

/// Words removed before comparing subjects, so "I really like X" and
/// "I don't like X" reduce to the same topic words.
static STOPWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(i|like|love|hate|dislike|enjoy|don't|do|really|very|much|a|lot|not|my|favorite|yes|no)\b")
        .expect("invalid stopword pattern")
});

const LLM_SYSTEM_PROMPT: &str =
    "You are a semantic contradiction detection expert. Output only valid JSON.";

/// Decides whether a new memory contradicts an existing one.
///
/// Advisory by policy: any failure in the LLM path falls through to the
/// pattern check (hybrid) or to `false` - a failed check never blocks a store.
pub struct ContradictionDetector {
    method: DetectionMethod,
    llm: Option<Arc<AnalysisLlm>>,
}

#[derive(Deserialize)]
struct LlmVerdict {
    contradicts: bool,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

impl ContradictionDetector {
    pub fn new(method: DetectionMethod, llm: Option<Arc<AnalysisLlm>>) -> Self {
        Self { method, llm }
    }

    pub async fn is_contradictory(&self, old: &str, new: &str) -> bool {
        match self.method {
            DetectionMethod::Pattern => check_patterns(old, new),
            DetectionMethod::Llm => self.check_llm(old, new).await.unwrap_or(false),
            DetectionMethod::Hybrid => match self.check_llm(old, new).await {
                Some(verdict) => verdict,
                None => {
                    debug!("LLM contradiction check unavailable, using pattern fallback");
                    check_patterns(old, new)
                }
            },
        }
    }

    /// `None` means the LLM path produced no usable verdict.
    async fn check_llm(&self, old: &str, new: &str) -> Option<bool> {
        let llm = self.llm.as_ref()?;

        let prompt = format!(
            r#"Analyze if these two statements contradict each other.

Statement 1: "{old}"
Statement 2: "{new}"

Consider opposite sentiments about the same topic, conflicting facts about
the same subject, and semantic meaning rather than keywords. Temporal
statements ("I used to like X") and specific-vs-general statements are not
contradictions.

Return ONLY valid JSON:
{{
  "contradicts": true or false,
  "confidence": 0.0-1.0,
  "reasoning": "brief explanation"
}}"#
        );

        let response = match llm.complete(LLM_SYSTEM_PROMPT, &prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM contradiction detection failed");
                return None;
            }
        };

        let verdict: LlmVerdict = extract_object(&response)?;
        // Low-confidence verdicts are treated as no verdict at all.
        if verdict.confidence < 0.7 {
            debug!(confidence = verdict.confidence, "LLM contradiction confidence too low");
            return None;
        }
        debug!(
            contradicts = verdict.contradicts,
            confidence = verdict.confidence,
            reasoning = %verdict.reasoning,
            "LLM contradiction verdict"
        );
        Some(verdict.contradicts)
    }
}

/// Pattern check: opposite sentiment over a shared subject.
pub fn check_patterns(content1: &str, content2: &str) -> bool {
    let c1 = content1.to_lowercase();
    let c2 = content2.to_lowercase();

    let positive_1 = POSITIVE_PATTERNS.iter().any(|p| p.is_match(&c1));
    let negative_1 = NEGATIVE_PATTERNS.iter().any(|p| p.is_match(&c1));
    let positive_2 = POSITIVE_PATTERNS.iter().any(|p| p.is_match(&c2));
    let negative_2 = NEGATIVE_PATTERNS.iter().any(|p| p.is_match(&c2));

    let subject1 = STOPWORDS.replace_all(&c1, "");
    let subject2 = STOPWORDS.replace_all(&c2, "");

    let words1: std::collections::HashSet<&str> =
        subject1.split_whitespace().filter(|w| w.len() > 2).collect();
    let words2: std::collections::HashSet<&str> =
        subject2.split_whitespace().filter(|w| w.len() > 2).collect();

    if words1.intersection(&words2).next().is_none() {
        return false;
    }

    (positive_1 && negative_2) || (negative_1 && positive_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_opposite_preference() {
        assert!(check_patterns("I love chocolate", "I don't like chocolate"));
        assert!(check_patterns("I hate mornings", "I enjoy mornings"));
    }

    #[test]
    fn different_subjects_do_not_contradict() {
        assert!(!check_patterns("I love chocolate", "I don't like mornings"));
    }

    #[test]
    fn same_sentiment_does_not_contradict() {
        assert!(!check_patterns("I love chocolate", "I really like chocolate"));
    }

    #[tokio::test]
    async fn pattern_method_never_calls_llm() {
        let detector = ContradictionDetector::new(DetectionMethod::Pattern, None);
        assert!(
            detector
                .is_contradictory("I love chocolate", "I don't like chocolate")
                .await
        );
    }

    #[tokio::test]
    async fn hybrid_without_llm_falls_back_to_patterns() {
        let detector = ContradictionDetector::new(DetectionMethod::Hybrid, None);
        assert!(
            detector
                .is_contradictory("I like tea", "I dislike tea")
                .await
        );
    }
}
