use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hard-enforced communication preferences. `None` means unchanged - a
/// detection only ever narrows the fields it actually saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationPreferences {
    pub language: Option<String>,
    pub formality: Option<String>,
    pub tone: Option<String>,
    pub emoji_usage: Option<bool>,
    pub response_length: Option<String>,
    pub explanation_style: Option<String>,
}

impl CommunicationPreferences {
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.formality.is_none()
            && self.tone.is_none()
            && self.emoji_usage.is_none()
            && self.response_length.is_none()
            && self.explanation_style.is_none()
    }

    /// Merge detected fields over stored ones. Returns true if anything
    /// actually changed - all-unchanged detections are a skip, not a write.
    pub fn merge_from(&mut self, detected: &CommunicationPreferences) -> bool {
        let mut changed = false;
        macro_rules! merge_field {
            ($field:ident) => {
                if let Some(v) = &detected.$field {
                    if self.$field.as_ref() != Some(v) {
                        self.$field = Some(v.clone());
                        changed = true;
                    }
                }
            };
        }
        merge_field!(language);
        merge_field!(formality);
        merge_field!(tone);
        merge_field!(response_length);
        merge_field!(explanation_style);
        if let Some(v) = detected.emoji_usage {
            if self.emoji_usage != Some(v) {
                self.emoji_usage = Some(v);
                changed = true;
            }
        }
        changed
    }
}

fn compile(table: &[(&str, &[&str])]) -> Vec<(String, Vec<Regex>)> {
    table
        .iter()
        .map(|(value, patterns)| {
            (
                value.to_string(),
                patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("invalid preference pattern"))
                    .collect(),
            )
        })
        .collect()
}

static LANGUAGE: LazyLock<Vec<(String, Vec<Regex>)>> = LazyLock::new(|| {
    compile(&[
        (
            "spanish",
            &[r"speak spanish", r"talk in spanish", r"use spanish", r"en español"],
        ),
        (
            "french",
            &[r"speak french", r"talk in french", r"use french", r"en français"],
        ),
        (
            "german",
            &[r"speak german", r"talk in german", r"use german", r"auf deutsch"],
        ),
        (
            "english",
            &[r"speak english", r"talk in english", r"use english", r"in english"],
        ),
    ])
});

static FORMALITY: LazyLock<Vec<(String, Vec<Regex>)>> = LazyLock::new(|| {
    compile(&[
        (
            "casual",
            &[
                r"(speak|talk|be) (more )?casual",
                r"(speak|talk) informally",
                r"don't be (so )?formal",
                r"keep it casual",
            ],
        ),
        (
            "formal",
            &[
                r"(speak|talk|be) (more )?formal",
                r"(speak|talk) formally",
                r"use formal language",
                r"be polite and formal",
            ],
        ),
        (
            "professional",
            &[
                r"(speak|talk|be) professional",
                r"business (tone|language)",
                r"professional manner",
            ],
        ),
    ])
});

static TONE: LazyLock<Vec<(String, Vec<Regex>)>> = LazyLock::new(|| {
    compile(&[
        (
            "enthusiastic",
            &[
                r"be (more )?enthusiastic",
                r"be (more )?energetic",
                r"show (more )?enthusiasm",
                r"be upbeat",
            ],
        ),
        (
            "calm",
            &[r"be (more )?calm", r"be (more )?measured", r"speak calmly"],
        ),
        (
            "friendly",
            &[r"be (more )?friendly", r"be (more )?warm", r"friendly (tone|manner)"],
        ),
        (
            "neutral",
            &[r"be (more )?neutral", r"be objective", r"keep it neutral"],
        ),
    ])
});

static EMOJI_ON: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"use emojis",
        r"add emojis",
        r"include emojis",
        r"i (like|love|prefer) emojis",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid emoji pattern"))
    .collect()
});

static EMOJI_OFF: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"no emojis",
        r"don't use emojis",
        r"without emojis",
        r"skip (the )?emojis",
        r"i (don't like|hate|dislike) emojis",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid emoji pattern"))
    .collect()
});

static LENGTH: LazyLock<Vec<(String, Vec<Regex>)>> = LazyLock::new(|| {
    compile(&[
        (
            "brief",
            &[
                r"(be|keep it) (more )?brief",
                r"short (answers|responses)",
                r"keep it short",
                r"concise (answers|responses)",
            ],
        ),
        (
            "detailed",
            &[
                r"(be|give) (more )?detailed",
                r"long(er)? (answers|responses|explanations)",
                r"in-depth (answers|responses)",
                r"thorough (answers|responses)",
            ],
        ),
        (
            "balanced",
            &[r"balanced (answers|responses)", r"medium length", r"not too (long|short)"],
        ),
    ])
});

static EXPLANATION: LazyLock<Vec<(String, Vec<Regex>)>> = LazyLock::new(|| {
    compile(&[
        (
            "simple",
            &[
                r"explain (it )?simply",
                r"simple (terms|explanations|language)",
                r"like i'm (five|5|a beginner)",
                r"layman's terms",
            ],
        ),
        (
            "technical",
            &[
                r"(be|get) technical",
                r"technical (terms|explanations|details)",
                r"use technical language",
            ],
        ),
        (
            "analogies",
            &[r"use analogies", r"with analogies", r"use metaphors", r"compare it to"],
        ),
    ])
});

/// Pattern-only extractor for communication preferences.
pub struct PreferenceExtractor;

impl PreferenceExtractor {
    /// Detect preference directives in one user message. `None` when the
    /// message carries no preference at all.
    pub fn extract(message: &str) -> Option<CommunicationPreferences> {
        let lower = message.to_lowercase();

        let prefs = CommunicationPreferences {
            language: match_table(&lower, &LANGUAGE),
            formality: match_table(&lower, &FORMALITY),
            tone: match_table(&lower, &TONE),
            emoji_usage: if EMOJI_OFF.iter().any(|p| p.is_match(&lower)) {
                Some(false)
            } else if EMOJI_ON.iter().any(|p| p.is_match(&lower)) {
                Some(true)
            } else {
                None
            },
            response_length: match_table(&lower, &LENGTH),
            explanation_style: match_table(&lower, &EXPLANATION),
        };

        if prefs.is_empty() {
            None
        } else {
            debug!(?prefs, "detected communication preferences");
            Some(prefs)
        }
    }
}

fn match_table(message: &str, table: &[(String, Vec<Regex>)]) -> Option<String> {
    table
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(message)))
        .map(|(value, _)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_language_directive() {
        let prefs = PreferenceExtractor::extract("Please speak spanish from now on").unwrap();
        assert_eq!(prefs.language.as_deref(), Some("spanish"));
    }

    #[test]
    fn detects_emoji_off_over_on() {
        // "don't use emojis" contains "use emojis"; negative wins.
        let prefs = PreferenceExtractor::extract("please don't use emojis").unwrap();
        assert_eq!(prefs.emoji_usage, Some(false));
    }

    #[test]
    fn detects_multiple_fields() {
        let prefs =
            PreferenceExtractor::extract("be more casual and keep it short please").unwrap();
        assert_eq!(prefs.formality.as_deref(), Some("casual"));
        assert_eq!(prefs.response_length.as_deref(), Some("brief"));
    }

    #[test]
    fn plain_message_detects_nothing() {
        assert!(PreferenceExtractor::extract("what's the weather today?").is_none());
    }

    #[test]
    fn merge_reports_no_change_for_same_values() {
        let mut stored = CommunicationPreferences {
            formality: Some("casual".to_string()),
            ..Default::default()
        };
        let detected = CommunicationPreferences {
            formality: Some("casual".to_string()),
            ..Default::default()
        };
        assert!(!stored.merge_from(&detected));

        let changed = CommunicationPreferences {
            formality: Some("formal".to_string()),
            ..Default::default()
        };
        assert!(stored.merge_from(&changed));
        assert_eq!(stored.formality.as_deref(), Some("formal"));
    }
}
