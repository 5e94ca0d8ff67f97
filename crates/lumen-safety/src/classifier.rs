use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use lumen_analyzers::llm::AnalysisLlm;
use lumen_analyzers::llm_json::extract_object;

/// Pattern confidence below this triggers the LLM judge.
const JUDGE_CONFIDENCE_THRESHOLD: f32 = 0.7;
/// Judge verdicts above this are adopted outright.
const JUDGE_ADOPT_THRESHOLD: f32 = 0.85;
/// At most this many indicators are kept per classification.
const MAX_INDICATORS: usize = 5;

/// Content risk labels, ordered by restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentLabel {
    Safe,
    Suggestive,
    ExplicitConsensualAdult,
    ExplicitFetish,
    Nonconsensual,
    MinorRisk,
}

impl ContentLabel {
    /// Ordinal risk: SAFE < SUGGESTIVE < EXPLICIT < FETISH < NONCONSENSUAL < MINOR_RISK.
    pub fn risk_level(self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::Suggestive => 1,
            Self::ExplicitConsensualAdult => 2,
            Self::ExplicitFetish => 3,
            Self::Nonconsensual => 4,
            Self::MinorRisk => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Suggestive => "SUGGESTIVE",
            Self::ExplicitConsensualAdult => "EXPLICIT_CONSENSUAL_ADULT",
            Self::ExplicitFetish => "EXPLICIT_FETISH",
            Self::Nonconsensual => "NONCONSENSUAL",
            Self::MinorRisk => "MINOR_RISK",
        }
    }
}

impl std::fmt::Display for ContentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentLabel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAFE" => Ok(Self::Safe),
            "SUGGESTIVE" => Ok(Self::Suggestive),
            "EXPLICIT_CONSENSUAL_ADULT" => Ok(Self::ExplicitConsensualAdult),
            "EXPLICIT_FETISH" => Ok(Self::ExplicitFetish),
            "NONCONSENSUAL" => Ok(Self::Nonconsensual),
            "MINOR_RISK" => Ok(Self::MinorRisk),
            other => Err(format!("unknown content label: {other}")),
        }
    }
}

/// Hit counts for the five pattern families.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PatternScores {
    pub anatomy: usize,
    pub sexual_acts: usize,
    pub fetish: usize,
    pub suggestive: usize,
    pub explicit_request: usize,
}

impl PatternScores {
    fn active_families(&self) -> usize {
        [
            self.anatomy,
            self.sexual_acts,
            self.fetish,
            self.suggestive,
            self.explicit_request,
        ]
        .iter()
        .filter(|&&v| v > 0)
        .count()
    }
}

/// The Layer-4 judge verdict, cached by normalized-text hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub label: ContentLabel,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

/// Full classification result with per-layer diagnostics for audit.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub label: ContentLabel,
    pub confidence: f32,
    pub indicators: Vec<String>,
    pub normalized_text: String,
    pub scores: PatternScores,
    pub judge: Option<JudgeVerdict>,
}

// ── Layer 1: normalization tables ─────────────────────────────────────────────

const EMOJI_MAP: &[(&str, &str)] = &[
    ("🍆", "penis"),
    ("🍌", "penis"),
    ("🍑", "butt"),
    ("💦", "cum"),
    ("👅", "tongue"),
    ("🔥", "hot"),
    ("😈", "naughty"),
    ("💋", "kiss"),
    ("🥵", "horny"),
    ("😏", "suggestive"),
    ("💕", "love"),
    ("❤️", "love"),
    ("🛏️", "bed"),
    ("🌶️", "spicy"),
    ("🔞", "adult"),
];

const LEETSPEAK_MAP: &[(char, char)] = &[
    ('0', 'o'),
    ('1', 'i'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('7', 't'),
    ('8', 'b'),
    ('@', 'a'),
    ('$', 's'),
    ('!', 'i'),
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SPACED_4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-z])\s+([a-z])\s+([a-z])\s+([a-z])\b").unwrap());
static SPACED_3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-z])\s+([a-z])\s+([a-z])\b").unwrap());
static SPACED_2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-z])\s+([a-z])\b").unwrap());

// ── Layer 2: hard rules ───────────────────────────────────────────────────────

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("invalid classifier pattern"))
        .collect()
}

static AGE_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(teens?|teenagers?|underage|minors?|children|child|kids?|youth)\b",
        r"\b(school|student|high school|middle school|elementary)\b",
        // "18" survives normalization as "ib" (leetspeak map), so match both.
        r"\b(barely legal|just turned (18|ib)|fresh (18|ib))\b",
        r"\b(\d+)[\s-]?(year|yr)[\s-]?old\b",
        r"\b(loli|shota|pedo|pedophile)\b",
    ])
});

static COERCION_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(forced|rape|assault|molest|abuse)\b",
        r"\b(drugged|unconscious|passed out)\b",
        r"\b(coerce|manipulate|blackmail|threaten)\b",
        r"\b(non[\s-]?consensual|against will|without consent)\b",
        r"\b(kidnap|capture|restrain)\b",
    ])
});

static CLINICAL_CONTEXT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(medical|clinical|doctor|patient|diagnosis|treatment)\b",
        r"\b(examination|procedure|symptom|condition|disease)\b",
        r"\b(therapy|counseling|health|anatomy|biology)\b",
        r"\b(education|educational|textbook|academic)\b",
    ])
});

// ── Layer 3: pattern families ─────────────────────────────────────────────────

static EXPLICIT_ANATOMY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(penis|cock|dick|shaft|balls|testicles)\b",
        r"\b(vagina|pussy|cunt|clit|labia)\b",
        r"\b(breasts?|tits?|nipples?|boobs)\b",
        r"\b(anus|butthole|asshole)\b",
        r"\b(genitals?|privates)\b",
    ])
});

static SEXUAL_ACTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(sex|intercourse|penetration|fucking)\b",
        r"\b(blowjob|fellatio|cunnilingus|oral sex)\b",
        r"\b(masturbat\w*|handjob|fingering)\b",
        r"\b(orgasm|climax|cum|ejaculat\w*)\b",
        r"\b(anal|vaginal)\b",
    ])
});

static FETISH_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(bdsm|bondage|domination|submission|sadism|masochism)\b",
        r"\b(fetish|kink|kinky)\b",
        r"\b(slave|master|mistress|dom|sub)\b",
        r"\b(whip|chain|collar|leash|gag)\b",
        r"\b(humiliation|degradation)\b",
        r"\b(foot fetish|worship)\b",
        r"\b(latex|leather|rubber)\b",
    ])
});

static SUGGESTIVE_CONTENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(flirt|flirty|seduce|tease|arousal)\b",
        r"\b(sexy|hot|attractive|gorgeous|handsome)\b",
        r"\b(kiss|caress|embrace|cuddle)\b",
        r"\b(desire|lust|passion|romance|romantic)\b",
        r"\b(intimate|intimacy|sensual)\b",
        r"\b(naked|nude|undress|strip)\b",
        r"\b(bedroom|fantasies|fantasy)\b",
    ])
});

static EXPLICIT_REQUESTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(write|create|generate|describe|tell me).{0,40}(sex|explicit|nsfw|porn)\b",
        r"\b(roleplay|role[\s-]?play).{0,40}(sexual|explicit|adult|nsfw)\b",
        r"\b(erotic|adult) (story|content|scene|roleplay)\b",
        r"\b(make it|be|get) (more )?(explicit|sexual|dirty|nasty)\b",
        r"\b(bedroom|sexual) (activities|activity|things)\b",
    ])
});

const JUDGE_SYSTEM_PROMPT: &str = r#"You are a content safety classifier. Classify messages into one of 6 categories.

CRITICAL RULES:
1. MINOR_RISK - ALWAYS flag any mention of minors, age ambiguity, "teen", "school", "young"
2. NONCONSENSUAL - ALWAYS flag any coercion, force, "rape", "drugged", "against will"
3. Be strict on safety - when in doubt, choose the MORE restrictive category

Categories in order of restriction: SAFE, SUGGESTIVE, EXPLICIT_CONSENSUAL_ADULT, EXPLICIT_FETISH, NONCONSENSUAL, MINOR_RISK.

Respond with JSON only, no other text:
{"label": "CATEGORY_NAME", "confidence": 0.0-1.0, "reasoning": "1-2 sentence explanation"}"#;

/// Four-layer content classifier: normalization, hard rules, pattern
/// scoring, optional LLM judge for borderline cases.
///
/// Layers 1–3 are pure functions; only the judge suspends. Hard-rule
/// verdicts terminate early and can never be overridden by the judge.
pub struct ContentClassifier {
    judge: Option<Arc<AnalysisLlm>>,
    judge_cache: Mutex<HashMap<String, JudgeVerdict>>,
}

impl ContentClassifier {
    pub fn new(judge: Option<Arc<AnalysisLlm>>) -> Self {
        if judge.is_some() {
            info!("content classifier initialized with 4-layer detection (LLM judge enabled)");
        } else {
            info!("content classifier initialized with 3-layer detection (LLM judge disabled)");
        }
        Self {
            judge,
            judge_cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn classify(&self, text: &str) -> Classification {
        if text.trim().len() < 3 {
            return Classification {
                label: ContentLabel::Safe,
                confidence: 1.0,
                indicators: Vec::new(),
                normalized_text: text.to_string(),
                scores: PatternScores::default(),
                judge: None,
            };
        }

        // Layer 1
        let normalized = normalize(text);

        // Layer 2: hard rules terminate immediately.
        let minor_indicators = collect_indicators(&normalized, &AGE_INDICATORS, "age_indicator");
        if !minor_indicators.is_empty() {
            warn!(indicators = ?minor_indicators, "minor-risk content detected");
            return Classification {
                label: ContentLabel::MinorRisk,
                confidence: 1.0,
                indicators: minor_indicators,
                normalized_text: normalized,
                scores: PatternScores::default(),
                judge: None,
            };
        }

        let coercion_indicators =
            collect_indicators(&normalized, &COERCION_INDICATORS, "coercion");
        if !coercion_indicators.is_empty() {
            warn!(indicators = ?coercion_indicators, "nonconsensual content detected");
            return Classification {
                label: ContentLabel::Nonconsensual,
                confidence: 1.0,
                indicators: coercion_indicators,
                normalized_text: normalized,
                scores: PatternScores::default(),
                judge: None,
            };
        }

        if CLINICAL_CONTEXT.iter().any(|p| p.is_match(&normalized)) {
            debug!("clinical context, classifying as safe");
            return Classification {
                label: ContentLabel::Safe,
                confidence: 0.9,
                indicators: vec!["clinical_context".to_string()],
                normalized_text: normalized,
                scores: PatternScores::default(),
                judge: None,
            };
        }

        // Layer 3
        let (label, confidence, indicators, scores) = classify_patterns(&normalized);
        let mut result = Classification {
            label,
            confidence,
            indicators,
            normalized_text: normalized,
            scores,
            judge: None,
        };

        // Layer 4: judge for borderline cases only.
        if self.judge.is_some() && should_use_judge(confidence, &scores) {
            debug!(confidence, "pattern result is borderline, invoking judge");
            if let Some(verdict) = self.run_judge(&result).await {
                result = blend(result, verdict);
            }
        }

        result
    }

    async fn run_judge(&self, pattern: &Classification) -> Option<JudgeVerdict> {
        let judge = self.judge.as_ref()?;

        let cache_key = hex::encode(Sha256::digest(pattern.normalized_text.as_bytes()));
        if let Some(cached) = self.judge_cache.lock().unwrap().get(&cache_key) {
            debug!("judge cache hit");
            return Some(cached.clone());
        }

        let prompt = format!(
            r#"Classify this message into exactly ONE category:

Message: "{}"

Pattern analysis suggests: {} (confidence: {:.2})

Respond with JSON only:
{{"label": "CATEGORY_NAME", "confidence": 0.0-1.0, "reasoning": "brief explanation"}}"#,
            pattern.normalized_text, pattern.label, pattern.confidence
        );

        let response = match judge.complete(JUDGE_SYSTEM_PROMPT, &prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "LLM judge failed, keeping pattern result");
                return None;
            }
        };

        let verdict: JudgeVerdict = extract_object(&response)?;
        if !(0.0..=1.0).contains(&verdict.confidence) {
            warn!(confidence = verdict.confidence, "judge confidence out of range");
            return None;
        }

        self.judge_cache
            .lock()
            .unwrap()
            .insert(cache_key, verdict.clone());
        Some(verdict)
    }
}

/// Layer 1: canonicalize obfuscation attempts.
pub fn normalize(text: &str) -> String {
    // Unicode NFKC
    let mut text: String = text.nfkc().collect();

    // Emoji → semantic words
    for (emoji, word) in EMOJI_MAP {
        if text.contains(emoji) {
            text = text.replace(emoji, &format!(" {word} "));
        }
    }

    // Collapse whitespace, lowercase
    let text = WHITESPACE.replace_all(text.trim(), " ").to_lowercase();

    // Leetspeak
    let text: String = text
        .chars()
        .map(|c| {
            LEETSPEAK_MAP
                .iter()
                .find(|(leet, _)| *leet == c)
                .map(|(_, plain)| *plain)
                .unwrap_or(c)
        })
        .collect();

    // De-space single-letter runs (s e x → sex), longest first
    let text = SPACED_4.replace_all(&text, "$1$2$3$4");
    let text = SPACED_3.replace_all(&text, "$1$2$3");
    let text = SPACED_2.replace_all(&text, "$1$2");

    text.into_owned()
}

fn collect_indicators(text: &str, patterns: &[Regex], tag: &str) -> Vec<String> {
    patterns
        .iter()
        .filter_map(|p| p.find(text).map(|m| format!("{tag}: {}", m.as_str())))
        .collect()
}

fn count_hits(text: &str, patterns: &[Regex], tag: &str, indicators: &mut Vec<String>) -> usize {
    let mut total = 0;
    for pattern in patterns {
        let hits = pattern.find_iter(text).count();
        if hits > 0 {
            total += hits;
            if let Some(m) = pattern.find(text) {
                indicators.push(format!("{tag}: {}", m.as_str()));
            }
        }
    }
    total
}

/// Layer 3: family scoring and the fixed decision ladder.
fn classify_patterns(text: &str) -> (ContentLabel, f32, Vec<String>, PatternScores) {
    let mut indicators = Vec::new();

    let mut scores = PatternScores {
        anatomy: count_hits(text, &EXPLICIT_ANATOMY, "anatomy", &mut indicators),
        sexual_acts: count_hits(text, &SEXUAL_ACTS, "sexual_act", &mut indicators),
        fetish: count_hits(text, &FETISH_INDICATORS, "fetish", &mut indicators),
        suggestive: count_hits(text, &SUGGESTIVE_CONTENT, "suggestive", &mut indicators),
        explicit_request: 0,
    };

    // Explicit requests are the strongest signal, weighted ×3.
    for pattern in EXPLICIT_REQUESTS.iter() {
        if pattern.is_match(text) {
            scores.explicit_request += 3;
            indicators.push("explicit_request".to_string());
        }
    }

    indicators.truncate(MAX_INDICATORS);

    let total_explicit = scores.anatomy + scores.sexual_acts;

    if scores.fetish >= 1 {
        let confidence = (0.65 + scores.fetish as f32 * 0.15).min(1.0);
        return (ContentLabel::ExplicitFetish, confidence, indicators, scores);
    }
    if total_explicit >= 3 || scores.explicit_request >= 3 {
        let confidence = (0.7 + total_explicit as f32 * 0.05).min(1.0);
        return (
            ContentLabel::ExplicitConsensualAdult,
            confidence,
            indicators,
            scores,
        );
    }
    if total_explicit >= 1 || scores.explicit_request >= 1 {
        return (ContentLabel::ExplicitConsensualAdult, 0.6, indicators, scores);
    }
    if scores.suggestive >= 2 {
        let confidence = (0.6 + scores.suggestive as f32 * 0.1).min(0.9);
        return (ContentLabel::Suggestive, confidence, indicators, scores);
    }

    (ContentLabel::Safe, 0.95, Vec::new(), scores)
}

/// Judge triggers: low confidence, mixed signals, borderline counts.
fn should_use_judge(confidence: f32, scores: &PatternScores) -> bool {
    if confidence < JUDGE_CONFIDENCE_THRESHOLD {
        return true;
    }
    if scores.active_families() >= 3 {
        return true;
    }
    let total_explicit = scores.anatomy + scores.sexual_acts;
    if (1..=2).contains(&total_explicit) {
        return true;
    }
    scores.suggestive == 1
}

/// Blend the judge's verdict with the pattern result. Pattern wins ties
/// to avoid false negatives.
fn blend(mut pattern: Classification, verdict: JudgeVerdict) -> Classification {
    if verdict.confidence > JUDGE_ADOPT_THRESHOLD {
        debug!(label = %verdict.label, "judge high confidence, adopting verdict");
        pattern.label = verdict.label;
        pattern.confidence = verdict.confidence;
        pattern.indicators.push(format!("llm: {}", verdict.reasoning));
        pattern.judge = Some(verdict);
        return pattern;
    }

    if verdict.label == pattern.label {
        pattern.confidence = (pattern.confidence + 0.2).min(1.0);
        pattern.indicators.push("llm: confirmed".to_string());
        pattern.judge = Some(verdict);
        return pattern;
    }

    if verdict.label.risk_level() > pattern.label.risk_level() {
        debug!(label = %verdict.label, "judge escalated to higher risk");
        pattern.confidence = (pattern.confidence + verdict.confidence) / 2.0;
        pattern.label = verdict.label;
        pattern.indicators.push(format!("llm: {}", verdict.reasoning));
        pattern.judge = Some(verdict);
        return pattern;
    }

    pattern.indicators.push("llm: disagreed".to_string());
    pattern.judge = Some(verdict);
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ContentClassifier {
        ContentClassifier::new(None)
    }

    #[tokio::test]
    async fn safe_text_is_safe() {
        let result = classifier().classify("What's the capital of France?").await;
        assert_eq!(result.label, ContentLabel::Safe);
        assert!(result.confidence >= 0.9);
    }

    #[tokio::test]
    async fn minor_risk_dominates() {
        let result = classifier().classify("explicit sex story about a teen").await;
        assert_eq!(result.label, ContentLabel::MinorRisk);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn coercion_is_nonconsensual() {
        let result = classifier().classify("a story where she is drugged").await;
        assert_eq!(result.label, ContentLabel::Nonconsensual);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn clinical_context_short_circuits_safe() {
        let result = classifier()
            .classify("the doctor performed a medical examination of the penis")
            .await;
        assert_eq!(result.label, ContentLabel::Safe);
        assert!(result.indicators.contains(&"clinical_context".to_string()));
    }

    #[tokio::test]
    async fn fetish_outranks_explicit() {
        let result = classifier().classify("let's explore some bdsm bondage play").await;
        assert_eq!(result.label, ContentLabel::ExplicitFetish);
    }

    #[tokio::test]
    async fn suggestive_needs_two_hits() {
        let result = classifier().classify("you're so romantic and charming, let's cuddle").await;
        assert_eq!(result.label, ContentLabel::Suggestive);
    }

    #[tokio::test]
    async fn leetspeak_is_normalized() {
        assert_eq!(normalize("s3x"), "sex");
    }

    #[tokio::test]
    async fn spaced_letters_are_joined() {
        assert_eq!(normalize("s e x"), "sex");
    }

    #[tokio::test]
    async fn emoji_are_mapped() {
        let normalized = normalize("🍆💦");
        assert!(normalized.contains("penis"));
        assert!(normalized.contains("cum"));
    }

    #[tokio::test]
    async fn empty_text_is_safe() {
        let result = classifier().classify("").await;
        assert_eq!(result.label, ContentLabel::Safe);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn risk_ordering_is_monotonic() {
        assert!(ContentLabel::MinorRisk.risk_level() > ContentLabel::Nonconsensual.risk_level());
        assert!(ContentLabel::Nonconsensual.risk_level() > ContentLabel::ExplicitFetish.risk_level());
        assert!(ContentLabel::ExplicitFetish.risk_level() > ContentLabel::ExplicitConsensualAdult.risk_level());
        assert!(ContentLabel::Suggestive.risk_level() > ContentLabel::Safe.risk_level());
    }

    #[test]
    fn blend_adopts_high_confidence_judge() {
        let pattern = Classification {
            label: ContentLabel::Suggestive,
            confidence: 0.6,
            indicators: vec![],
            normalized_text: String::new(),
            scores: PatternScores::default(),
            judge: None,
        };
        let verdict = JudgeVerdict {
            label: ContentLabel::Safe,
            confidence: 0.95,
            reasoning: "clearly benign".to_string(),
        };
        let blended = blend(pattern, verdict);
        assert_eq!(blended.label, ContentLabel::Safe);
    }

    #[test]
    fn blend_boosts_on_agreement() {
        let pattern = Classification {
            label: ContentLabel::Suggestive,
            confidence: 0.6,
            indicators: vec![],
            normalized_text: String::new(),
            scores: PatternScores::default(),
            judge: None,
        };
        let verdict = JudgeVerdict {
            label: ContentLabel::Suggestive,
            confidence: 0.7,
            reasoning: String::new(),
        };
        let blended = blend(pattern, verdict);
        assert_eq!(blended.label, ContentLabel::Suggestive);
        assert!((blended.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn blend_escalates_to_higher_risk() {
        let pattern = Classification {
            label: ContentLabel::Suggestive,
            confidence: 0.6,
            indicators: vec![],
            normalized_text: String::new(),
            scores: PatternScores::default(),
            judge: None,
        };
        let verdict = JudgeVerdict {
            label: ContentLabel::ExplicitConsensualAdult,
            confidence: 0.8,
            reasoning: String::new(),
        };
        let blended = blend(pattern, verdict);
        assert_eq!(blended.label, ContentLabel::ExplicitConsensualAdult);
        assert!((blended.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn blend_keeps_pattern_when_judge_says_safer() {
        let pattern = Classification {
            label: ContentLabel::ExplicitConsensualAdult,
            confidence: 0.8,
            indicators: vec![],
            normalized_text: String::new(),
            scores: PatternScores::default(),
            judge: None,
        };
        let verdict = JudgeVerdict {
            label: ContentLabel::Safe,
            confidence: 0.7,
            reasoning: String::new(),
        };
        let blended = blend(pattern, verdict);
        assert_eq!(blended.label, ContentLabel::ExplicitConsensualAdult);
    }
}
