use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lumen_core::config::DetectionMethod;

use crate::llm::AnalysisLlm;
use crate::llm_json::extract_object;

/// Minimum score to report an emotion at all.
const CONFIDENCE_THRESHOLD: f32 = 0.3;

const KEYWORD_WEIGHT: f32 = 0.4;
const EMOJI_WEIGHT: f32 = 0.5;
const PHRASE_WEIGHT: f32 = 0.6;

/// A detected emotion with scoring metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEmotion {
    pub emotion: String,
    pub confidence: f32,
    /// low | medium | high
    pub intensity: String,
    /// Which signal kinds fired: keyword, emoji, phrase.
    pub indicators: Vec<String>,
}

struct Lexicon {
    name: &'static str,
    keywords: Vec<(Regex, f32)>,
    emojis: &'static [(&'static str, f32)],
    phrases: Vec<(Regex, f32)>,
}

fn phrases(items: &[(&str, f32)]) -> Vec<(Regex, f32)> {
    items
        .iter()
        .map(|(p, w)| (Regex::new(p).expect("invalid emotion phrase"), *w))
        .collect()
}

fn keywords(items: &[(&str, f32)]) -> Vec<(Regex, f32)> {
    items
        .iter()
        .map(|(k, w)| {
            let pattern = format!(r"\b{}\b", regex::escape(k));
            (Regex::new(&pattern).expect("invalid emotion keyword"), *w)
        })
        .collect()
}

static LEXICONS: LazyLock<Vec<Lexicon>> = LazyLock::new(|| {
    vec![
        Lexicon {
            name: "sad",
            keywords: keywords(&[
                ("sad", 0.8), ("depressed", 0.9), ("down", 0.7), ("upset", 0.7),
                ("crying", 0.9), ("unhappy", 0.8), ("miserable", 0.9),
                ("heartbroken", 1.0), ("lonely", 0.8), ("hurt", 0.7),
                ("devastated", 1.0), ("grief", 0.9),
            ]),
            emojis: &[("😢", 0.9), ("😭", 1.0), ("😔", 0.8), ("😞", 0.8), ("💔", 0.9)],
            phrases: phrases(&[
                (r"i('m| am) (so |really |very |)sad", 0.9),
                (r"feel(ing|s|) (so |really |)(down|depressed)", 0.9),
                (r"can't stop (crying|thinking about)", 0.9),
                (r"passed away|died", 0.9),
            ]),
        },
        Lexicon {
            name: "angry",
            keywords: keywords(&[
                ("angry", 0.9), ("furious", 1.0), ("mad", 0.8), ("pissed", 0.9),
                ("outraged", 1.0), ("livid", 1.0), ("rage", 1.0), ("hate", 0.8),
            ]),
            emojis: &[("😠", 0.9), ("😡", 1.0), ("🤬", 1.0), ("💢", 0.9)],
            phrases: phrases(&[
                (r"i('m| am) (so |really |)angry", 0.9),
                (r"this is (ridiculous|unacceptable)", 1.0),
                (r"makes me (so |)angry", 0.9),
                (r"fed up|sick of", 0.8),
            ]),
        },
        Lexicon {
            name: "frustrated",
            keywords: keywords(&[
                ("frustrated", 0.9), ("annoyed", 0.8), ("irritated", 0.8),
                ("struggling", 0.7), ("stuck", 0.7), ("overwhelmed", 0.8),
                ("exhausted", 0.7), ("stressed", 0.7),
            ]),
            emojis: &[("😤", 0.9), ("😒", 0.8), ("🙄", 0.7), ("😫", 0.8), ("😩", 0.8)],
            phrases: phrases(&[
                (r"(so |really |)frustrated", 0.9),
                (r"nothing (is |)working", 0.8),
                (r"tried (everything|for hours)", 0.8),
                (r"been (trying|working) (on this |)for (hours|days)", 0.9),
            ]),
        },
        Lexicon {
            name: "happy",
            keywords: keywords(&[
                ("happy", 0.9), ("great", 0.7), ("wonderful", 0.8), ("amazing", 0.9),
                ("fantastic", 0.9), ("awesome", 0.8), ("delighted", 0.9),
                ("joyful", 0.9),
            ]),
            emojis: &[("😊", 0.8), ("😃", 0.9), ("😄", 0.9), ("😁", 0.9), ("🙂", 0.7)],
            phrases: phrases(&[
                (r"i('m| am) (so |really |)happy", 0.9),
                (r"this is (great|wonderful|amazing)", 0.8),
                (r"feel(ing|s|) (great|wonderful|happy)", 0.8),
            ]),
        },
        Lexicon {
            name: "excited",
            keywords: keywords(&[
                ("excited", 1.0), ("thrilled", 1.0), ("pumped", 0.9), ("stoked", 0.9),
                ("eager", 0.8), ("enthusiastic", 0.9), ("yay", 0.9), ("woohoo", 1.0),
            ]),
            emojis: &[("🎉", 1.0), ("🥳", 1.0), ("😆", 0.8), ("🙌", 0.8)],
            phrases: phrases(&[
                (r"(so |really |)excited", 1.0),
                (r"can't wait", 0.9),
                (r"(just |)got (the |)(job|offer|promotion|news)", 0.9),
                (r"omg|oh my god", 0.8),
            ]),
        },
        Lexicon {
            name: "anxious",
            keywords: keywords(&[
                ("worried", 0.9), ("nervous", 0.9), ("anxious", 1.0), ("scared", 0.9),
                ("afraid", 0.9), ("terrified", 1.0), ("panic", 1.0),
            ]),
            emojis: &[("😰", 1.0), ("😨", 0.9), ("😟", 0.8), ("😥", 0.8)],
            phrases: phrases(&[
                (r"i('m| am) (so |really |)worried", 0.9),
                (r"(feeling|feel) anxious", 1.0),
                (r"(what if|scared that)", 0.8),
                (r"(having|getting) (a |)panic (attack|)", 1.0),
            ]),
        },
        Lexicon {
            name: "confused",
            keywords: keywords(&[
                ("confused", 0.9), ("lost", 0.7), ("puzzled", 0.8), ("baffled", 0.9),
                ("unclear", 0.7), ("bewildered", 0.9),
            ]),
            emojis: &[("😕", 0.9), ("😵", 0.8), ("🤔", 0.7), ("🤷", 0.8)],
            phrases: phrases(&[
                (r"(so |really |)confused", 0.9),
                (r"don't understand", 0.8),
                (r"(not|doesn't) make sense", 0.8),
            ]),
        },
        Lexicon {
            name: "grateful",
            keywords: keywords(&[
                ("thank", 0.8), ("thanks", 0.8), ("grateful", 1.0),
                ("appreciate", 0.9), ("thankful", 0.9), ("blessed", 0.8),
            ]),
            emojis: &[("🙏", 1.0), ("🤗", 0.8), ("💝", 0.7)],
            phrases: phrases(&[
                (r"thank you (so much|very much|)", 0.9),
                (r"(really |)appreciate (it|this|that|your help)", 0.9),
                (r"you('re| are) (the |)best", 0.8),
            ]),
        },
        Lexicon {
            name: "disappointed",
            keywords: keywords(&[("disappointed", 1.0), ("letdown", 0.9), ("failed", 0.8)]),
            emojis: &[("😞", 0.9), ("😔", 0.8)],
            phrases: phrases(&[
                (r"(so |really |)disappointed", 1.0),
                (r"(didn't|did not) (work out|go well)", 0.8),
                (r"expected (more|better)", 0.8),
            ]),
        },
        Lexicon {
            name: "proud",
            keywords: keywords(&[
                ("proud", 1.0), ("accomplished", 0.9), ("achieved", 0.8),
                ("succeeded", 0.9),
            ]),
            emojis: &[("💪", 0.8), ("🏆", 0.9), ("⭐", 0.7)],
            phrases: phrases(&[
                (r"(so |really |)proud", 1.0),
                (r"(finally |just |)(did|finished|completed) it", 0.8),
            ]),
        },
        Lexicon {
            name: "lonely",
            keywords: keywords(&[
                ("lonely", 1.0), ("alone", 0.8), ("isolated", 0.9),
                ("abandoned", 0.9),
            ]),
            emojis: &[("🥺", 0.9), ("💔", 0.7)],
            phrases: phrases(&[
                (r"(so |really |)lonely", 1.0),
                (r"feel(ing|) alone", 0.9),
                (r"nobody (cares|understands)", 0.9),
            ]),
        },
        Lexicon {
            name: "hopeful",
            keywords: keywords(&[
                ("hopeful", 1.0), ("optimistic", 0.9), ("hoping", 0.8),
            ]),
            emojis: &[("🤞", 0.9), ("🌈", 0.8), ("☀️", 0.6)],
            phrases: phrases(&[
                (r"(feeling |)hopeful", 1.0),
                (r"things (will|might) (get |)better", 0.8),
                (r"looking forward to", 0.8),
                (r"(fingers |)crossed", 0.7),
            ]),
        },
    ]
});

const HIGH_INTENSITY: &[&str] = &["so", "very", "really", "extremely", "incredibly", "super", "absolutely"];
const LOW_INTENSITY: &[&str] = &["a bit", "somewhat", "kind of", "kinda", "slightly", "a little"];

const NEGATIVE_EMOTIONS: &[&str] = &["sad", "angry", "frustrated", "anxious", "disappointed", "lonely"];

/// Per-turn emotion detector. Advisory: every failure yields `None`.
pub struct EmotionDetector {
    method: DetectionMethod,
    llm: Option<Arc<AnalysisLlm>>,
}

#[derive(Deserialize)]
struct LlmEmotion {
    emotion: String,
    confidence: f32,
    #[serde(default)]
    intensity: Option<String>,
}

impl EmotionDetector {
    pub fn new(method: DetectionMethod, llm: Option<Arc<AnalysisLlm>>) -> Self {
        Self { method, llm }
    }

    pub async fn detect(&self, message: &str) -> Option<DetectedEmotion> {
        if message.trim().len() < 3 {
            return None;
        }
        match self.method {
            DetectionMethod::Pattern => detect_patterns(message),
            DetectionMethod::Llm => self.detect_llm(message).await,
            DetectionMethod::Hybrid => match self.detect_llm(message).await {
                Some(e) => Some(e),
                None => detect_patterns(message),
            },
        }
    }

    async fn detect_llm(&self, message: &str) -> Option<DetectedEmotion> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            r#"Identify the dominant emotion in this message, if any.

Message: "{message}"

Known emotions: sad, angry, frustrated, happy, excited, anxious, confused, grateful, disappointed, proud, lonely, hopeful.

Return ONLY valid JSON:
{{"emotion": "name or none", "confidence": 0.0-1.0, "intensity": "low|medium|high"}}"#
        );

        let response = match llm
            .complete("You are an emotion detection system. Output only valid JSON.", &prompt)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM emotion detection failed");
                return None;
            }
        };

        let parsed: LlmEmotion = extract_object(&response)?;
        if parsed.emotion == "none" || parsed.confidence < CONFIDENCE_THRESHOLD {
            return None;
        }
        if !LEXICONS.iter().any(|l| l.name == parsed.emotion) {
            debug!(emotion = %parsed.emotion, "LLM returned unknown emotion");
            return None;
        }
        Some(DetectedEmotion {
            emotion: parsed.emotion,
            confidence: parsed.confidence.min(1.0),
            intensity: parsed.intensity.unwrap_or_else(|| "medium".to_string()),
            indicators: vec!["llm".to_string()],
        })
    }
}

/// Keyword/emoji/phrase scoring over the lexicon tables.
pub fn detect_patterns(message: &str) -> Option<DetectedEmotion> {
    let lower = message.to_lowercase();

    let mut best: Option<(f32, &'static str, Vec<String>)> = None;

    for lexicon in LEXICONS.iter() {
        let mut score = 0.0f32;
        let mut indicators: Vec<String> = Vec::new();

        for (keyword, weight) in &lexicon.keywords {
            if keyword.is_match(&lower) {
                score += weight * KEYWORD_WEIGHT;
                indicators.push("keyword".to_string());
            }
        }
        for (emoji, weight) in lexicon.emojis {
            if message.contains(emoji) {
                score += weight * EMOJI_WEIGHT;
                indicators.push("emoji".to_string());
            }
        }
        for (pattern, weight) in &lexicon.phrases {
            if pattern.is_match(&lower) {
                score += weight * PHRASE_WEIGHT;
                indicators.push("phrase".to_string());
            }
        }

        if score > 0.0 && best.as_ref().map(|(s, _, _)| score > *s).unwrap_or(true) {
            best = Some((score, lexicon.name, indicators));
        }
    }

    let (score, name, mut indicators) = best?;
    if score < CONFIDENCE_THRESHOLD {
        return None;
    }
    indicators.sort();
    indicators.dedup();

    Some(DetectedEmotion {
        emotion: name.to_string(),
        confidence: score.min(1.0),
        intensity: detect_intensity(&lower),
        indicators,
    })
}

fn detect_intensity(message: &str) -> String {
    if HIGH_INTENSITY.iter().any(|m| message.contains(m)) {
        "high".to_string()
    } else if LOW_INTENSITY.iter().any(|m| message.contains(m)) {
        "low".to_string()
    } else {
        "medium".to_string()
    }
}

/// Trend over an emotion history (chronological order).
#[derive(Debug, Clone, Serialize)]
pub struct EmotionTrend {
    pub dominant_emotion: Option<String>,
    /// improving | stable | declining | insufficient_data
    pub recent_trend: String,
    pub needs_attention: bool,
}

pub fn analyze_trend(history: &[String]) -> EmotionTrend {
    if history.is_empty() {
        return EmotionTrend {
            dominant_emotion: None,
            recent_trend: "stable".to_string(),
            needs_attention: false,
        };
    }

    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for emotion in history {
        *counts.entry(emotion.as_str()).or_default() += 1;
    }
    let dominant = counts
        .iter()
        .max_by_key(|(_, c)| **c)
        .map(|(e, _)| e.to_string());

    let is_negative = |e: &String| NEGATIVE_EMOTIONS.contains(&e.as_str());

    // Compare negatives in the last 5 against the previous 5.
    let recent_trend = if history.len() >= 10 {
        let recent = &history[history.len() - 5..];
        let previous = &history[history.len() - 10..history.len() - 5];
        let recent_negative = recent.iter().filter(|e| is_negative(e)).count();
        let previous_negative = previous.iter().filter(|e| is_negative(e)).count();
        match recent_negative.cmp(&previous_negative) {
            std::cmp::Ordering::Less => "improving",
            std::cmp::Ordering::Greater => "declining",
            std::cmp::Ordering::Equal => "stable",
        }
    } else {
        "insufficient_data"
    }
    .to_string();

    let window_start = history.len().saturating_sub(5);
    let needs_attention = history[window_start..]
        .iter()
        .filter(|e| is_negative(e))
        .count()
        >= 3;

    EmotionTrend {
        dominant_emotion: dominant,
        recent_trend,
        needs_attention,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sadness_from_phrase() {
        let detected = detect_patterns("I'm so sad, my cat passed away").unwrap();
        assert_eq!(detected.emotion, "sad");
        assert_eq!(detected.intensity, "high");
        assert!(detected.confidence >= 0.3);
    }

    #[test]
    fn detects_excitement_from_emoji() {
        let detected = detect_patterns("got the offer 🎉🎉").unwrap();
        assert_eq!(detected.emotion, "excited");
        assert!(detected.indicators.contains(&"emoji".to_string()));
    }

    #[test]
    fn neutral_message_yields_none() {
        assert!(detect_patterns("the meeting is at 3pm").is_none());
    }

    #[test]
    fn short_input_yields_none() {
        assert!(detect_patterns("ok").is_none());
    }

    #[test]
    fn low_intensity_modifier_detected() {
        let detected = detect_patterns("I'm a bit worried about tomorrow").unwrap();
        assert_eq!(detected.emotion, "anxious");
        assert_eq!(detected.intensity, "low");
    }

    #[tokio::test]
    async fn hybrid_without_llm_uses_patterns() {
        let detector = EmotionDetector::new(DetectionMethod::Hybrid, None);
        let detected = detector.detect("I'm really frustrated with this").await.unwrap();
        assert_eq!(detected.emotion, "frustrated");
    }

    #[test]
    fn trend_declines_with_recent_negatives() {
        let mut history: Vec<String> = vec!["happy"; 5].into_iter().map(String::from).collect();
        history.extend(vec!["sad".to_string(), "sad".to_string(), "angry".to_string(), "sad".to_string(), "lonely".to_string()]);
        let trend = analyze_trend(&history);
        assert_eq!(trend.recent_trend, "declining");
        assert!(trend.needs_attention);
    }

    #[test]
    fn trend_with_short_history_is_insufficient() {
        let history = vec!["happy".to_string(), "sad".to_string()];
        assert_eq!(analyze_trend(&history).recent_trend, "insufficient_data");
    }
}
