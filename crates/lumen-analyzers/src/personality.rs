use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lumen_core::config::DetectionMethod;

use crate::llm::AnalysisLlm;
use crate::llm_json::extract_object;

/// Trait value applied when the user asks for more of something.
const TRAIT_HIGH: u8 = 8;
/// Trait value applied when the user asks for less.
const TRAIT_LOW: u8 = 3;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid personality pattern"))
        .collect()
}

static ARCHETYPES: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            "wise_mentor",
            compile(&[
                r"(be |act |)like a (wise |)mentor",
                r"guide me|be my guide",
                r"(wise|thoughtful) (advisor|mentor)",
                r"help me (grow|learn|develop)",
                r"challenge me",
            ]),
        ),
        (
            "supportive_friend",
            compile(&[
                r"(be |act |)like a (good |best |supportive |)friend",
                r"just (listen|be there)",
                r"(warm|caring) (friend|companion)",
                r"don'?t judge( me|)",
            ]),
        ),
        (
            "professional_coach",
            compile(&[
                r"(be |act |)like a (professional |)coach",
                r"hold me accountable",
                r"focus on (my |)goals",
                r"(push|motivate) me",
            ]),
        ),
        (
            "creative_partner",
            compile(&[
                r"(be |act |)like a creative partner",
                r"brainstorm( with me|)",
                r"explore ideas",
                r"think outside the box",
            ]),
        ),
        (
            "calm_therapist",
            compile(&[
                r"(be |act |)like a (calm |)therapist",
                r"help me process",
                r"(safe|judgment.?free) space",
                r"listen (without judgment|patiently)",
            ]),
        ),
        (
            "enthusiastic_cheerleader",
            compile(&[
                r"(be |act |)like a cheerleader",
                r"(be my |)biggest fan",
                r"celebrate (with me|everything)",
                r"(hype|pump) me up",
            ]),
        ),
        (
            "pragmatic_advisor",
            compile(&[
                r"(be |act |)like a (pragmatic |practical |)advisor",
                r"(straight|straight.?forward|direct) advice",
                r"no.?nonsense",
                r"get to the point",
            ]),
        ),
        (
            "curious_student",
            compile(&[
                r"(be |act |)like a (curious |)student",
                r"learn (with|alongside) me",
                r"(explore|discover) together",
            ]),
        ),
    ]
});

struct TraitPatterns {
    name: &'static str,
    increase: Vec<Regex>,
    decrease: Vec<Regex>,
}

static TRAITS: LazyLock<Vec<TraitPatterns>> = LazyLock::new(|| {
    vec![
        TraitPatterns {
            name: "humor_level",
            increase: compile(&[
                r"be (more |)humorous",
                r"(make|tell) (more |)jokes",
                r"be (funnier|playful)",
                r"lighten( the mood| up|)",
            ]),
            decrease: compile(&[r"more serious", r"(less|no) (humor|jokes)", r"stop (joking|being funny)"]),
        },
        TraitPatterns {
            name: "formality_level",
            increase: compile(&[r"more formal", r"use proper (language|grammar)", r"less casual"]),
            decrease: compile(&[r"more casual", r"less formal", r"(loosen|relax) up", r"use (slang|casual language)"]),
        },
        TraitPatterns {
            name: "enthusiasm_level",
            increase: compile(&[
                r"more (enthusiastic|energetic|excited)",
                r"show more (energy|excitement)",
                r"pump up the energy",
            ]),
            decrease: compile(&[
                r"more (calm|reserved|measured)",
                r"tone down( the energy|)",
                r"less (excited|enthusiastic)",
            ]),
        },
        TraitPatterns {
            name: "empathy_level",
            increase: compile(&[
                r"more (empathetic|compassionate|understanding)",
                r"show more (empathy|compassion)",
                r"understand (my |)feelings",
            ]),
            decrease: compile(&[
                r"more (logical|rational|objective)",
                r"less (emotional|empathetic)",
                r"focus on (logic|facts)",
            ]),
        },
        TraitPatterns {
            name: "directness_level",
            increase: compile(&[
                r"more (direct|straightforward|blunt)",
                r"don'?t (sugarcoat|beat around)",
                r"cut to the chase",
            ]),
            decrease: compile(&[
                r"more (gentle|tactful|diplomatic)",
                r"less (direct|blunt|harsh)",
                r"be softer",
            ]),
        },
        TraitPatterns {
            name: "curiosity_level",
            increase: compile(&[r"ask (more|lots of) questions", r"more (curious|inquisitive)", r"(explore|dig) deeper"]),
            decrease: compile(&[r"(stop |)asking so many questions", r"less (curious|inquisitive|nosy)"]),
        },
        TraitPatterns {
            name: "supportiveness_level",
            increase: compile(&[r"more (supportive|encouraging)", r"encourage me", r"believe in me"]),
            decrease: compile(&[r"challenge me more", r"more critical", r"push (me |)harder", r"less (supportive|encouraging)"]),
        },
        TraitPatterns {
            name: "playfulness_level",
            increase: compile(&[r"more (playful|fun)", r"(have|add) more fun", r"more (creative|imaginative)"]),
            decrease: compile(&[r"less (playful|silly)", r"more focused", r"(stop |)playing around"]),
        },
    ]
});

static RELATIONSHIPS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        ("friend", compile(&[r"be my friend", r"like a friend"])),
        ("mentor", compile(&[r"be my mentor", r"mentor me"])),
        ("coach", compile(&[r"be my coach", r"coach me"])),
        ("therapist", compile(&[r"be my therapist"])),
        ("partner", compile(&[r"be my partner", r"creative partner"])),
        ("advisor", compile(&[r"be my advisor", r"advise me"])),
    ]
});

/// A personality change requested in natural language ("be more playful").
/// Empty maps mean no change of that kind was requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalityDirective {
    pub archetype: Option<String>,
    pub relationship_type: Option<String>,
    pub traits: HashMap<String, u8>,
    pub behaviors: HashMap<String, bool>,
    pub custom_instructions: Option<String>,
}

impl PersonalityDirective {
    pub fn is_empty(&self) -> bool {
        self.archetype.is_none()
            && self.relationship_type.is_none()
            && self.traits.is_empty()
            && self.behaviors.is_empty()
            && self.custom_instructions.is_none()
    }
}

/// Detects personality directives in user messages.
pub struct PersonalityDetector {
    method: DetectionMethod,
    llm: Option<Arc<AnalysisLlm>>,
}

#[derive(Deserialize)]
struct LlmDirective {
    #[serde(default)]
    archetype: Option<String>,
    #[serde(default)]
    traits: HashMap<String, u8>,
    #[serde(default)]
    custom_instructions: Option<String>,
}

impl PersonalityDetector {
    pub fn new(method: DetectionMethod, llm: Option<Arc<AnalysisLlm>>) -> Self {
        Self { method, llm }
    }

    pub async fn detect(&self, message: &str) -> Option<PersonalityDirective> {
        match self.method {
            DetectionMethod::Pattern => detect_patterns(message),
            DetectionMethod::Llm => self.detect_llm(message).await,
            DetectionMethod::Hybrid => match self.detect_llm(message).await {
                Some(d) => Some(d),
                None => detect_patterns(message),
            },
        }
    }

    async fn detect_llm(&self, message: &str) -> Option<PersonalityDirective> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            r#"Does this message ask the assistant to change its personality or behavior?

Message: "{message}"

Archetypes: wise_mentor, supportive_friend, professional_coach, creative_partner, calm_therapist, enthusiastic_cheerleader, pragmatic_advisor, curious_student.
Traits (0-10): humor_level, formality_level, enthusiasm_level, empathy_level, directness_level, curiosity_level, supportiveness_level, playfulness_level.

Return ONLY valid JSON. If no personality request, return {{}}.
{{"archetype": "name or omit", "traits": {{"humor_level": 8}}, "custom_instructions": "or omit"}}"#
        );

        let response = match llm
            .complete(
                "You detect personality configuration requests. Output only valid JSON.",
                &prompt,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM personality detection failed");
                return None;
            }
        };

        let parsed: LlmDirective = extract_object(&response)?;
        let directive = PersonalityDirective {
            archetype: parsed.archetype.filter(|a| {
                ARCHETYPES.iter().any(|(name, _)| *name == a.as_str())
            }),
            relationship_type: None,
            traits: parsed
                .traits
                .into_iter()
                .filter(|(_, v)| *v <= 10)
                .collect(),
            behaviors: HashMap::new(),
            custom_instructions: parsed.custom_instructions,
        };
        if directive.is_empty() {
            None
        } else {
            Some(directive)
        }
    }
}

/// Rule-based directive detection.
pub fn detect_patterns(message: &str) -> Option<PersonalityDirective> {
    let lower = message.to_lowercase();
    let mut directive = PersonalityDirective::default();

    for (archetype, patterns) in ARCHETYPES.iter() {
        if patterns.iter().any(|p| p.is_match(&lower)) {
            directive.archetype = Some(archetype.to_string());
            break;
        }
    }

    for trait_patterns in TRAITS.iter() {
        if trait_patterns.increase.iter().any(|p| p.is_match(&lower)) {
            directive
                .traits
                .insert(trait_patterns.name.to_string(), TRAIT_HIGH);
        } else if trait_patterns.decrease.iter().any(|p| p.is_match(&lower)) {
            directive
                .traits
                .insert(trait_patterns.name.to_string(), TRAIT_LOW);
        }
    }

    for (relationship, patterns) in RELATIONSHIPS.iter() {
        if patterns.iter().any(|p| p.is_match(&lower)) {
            directive.relationship_type = Some(relationship.to_string());
            break;
        }
    }

    if directive.is_empty() {
        None
    } else {
        debug!(?directive, "detected personality directive");
        Some(directive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_archetype_request() {
        let directive = detect_patterns("please act like a wise mentor").unwrap();
        assert_eq!(directive.archetype.as_deref(), Some("wise_mentor"));
    }

    #[test]
    fn detects_trait_increase() {
        let directive = detect_patterns("be more playful with me").unwrap();
        assert_eq!(directive.traits.get("playfulness_level"), Some(&TRAIT_HIGH));
    }

    #[test]
    fn detects_trait_decrease() {
        let directive = detect_patterns("stop joking around, be more serious").unwrap();
        assert_eq!(directive.traits.get("humor_level"), Some(&TRAIT_LOW));
    }

    #[test]
    fn plain_message_is_no_directive() {
        assert!(detect_patterns("what's for dinner tonight?").is_none());
    }
}
