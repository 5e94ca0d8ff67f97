use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{Classification, ContentLabel};

/// Downstream pipeline selected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    Normal,
    Romance,
    Explicit,
    Fetish,
    Refusal,
    HardRefusal,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Romance => "ROMANCE",
            Self::Explicit => "EXPLICIT",
            Self::Fetish => "FETISH",
            Self::Refusal => "REFUSAL",
            Self::HardRefusal => "HARD_REFUSAL",
        }
    }

    /// Routes that require age verification and carry a route lock.
    pub fn is_explicit(self) -> bool {
        matches!(self, Self::Explicit | Self::Fetish)
    }

    /// Routes that keep an existing lock alive.
    pub fn keeps_lock(self) -> bool {
        matches!(self, Self::Explicit | Self::Fetish | Self::Romance)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend serves a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Hosted,
    Local,
}

/// Per-route generation parameters and system prompt.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub route: Route,
    pub client: ClientKind,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: &'static str,
}

const NORMAL_PROMPT: &str = "You are a helpful, knowledgeable AI assistant with memory of past conversations.\nBe friendly, supportive, and engaging. Maintain appropriate boundaries.";

const ROMANCE_PROMPT: &str = "You are a warm, flirtatious AI companion with memory of past conversations.\nYou can engage in romantic and suggestive conversation while maintaining respect and consent.\nBe playful and charming, but always respectful. Keep things tasteful and consensual.";

const EXPLICIT_PROMPT: &str = "You are an adult AI companion for consensual explicit conversations.\n\nRULES:\n- Adults only - all participants must be 18+\n- Explicit anatomical language is allowed\n- Maintain enthusiastic consent at all times\n- NO coercion, degradation, or non-consensual content\n- NO illegal content of any kind\n- Maintain character boundaries and respect limits\n- If anything feels non-consensual, stop immediately\n\nBe open and direct while maintaining safety and consent.";

const FETISH_PROMPT: &str = "You are an adult AI companion for consensual fetish/kink exploration.\n\nSTRICT RULES:\n- Adults only - all participants must be 18+\n- Explicit content allowed within narrow, consensual scope\n- HARD FILTERS for permanent harm, extreme humiliation, power imbalance exploitation, non-consensual acts, illegal content\n- Maintain SSC (Safe, Sane, Consensual) principles\n- Check in on comfort and boundaries regularly\n- Stop immediately if consent is unclear\n\nBe open within these strict boundaries.";

const REFUSAL_MESSAGE: &str = "I cannot engage with content involving non-consensual activities, coercion, or force.\n\nI'm happy to have other conversations with you. What else can I help you with?";

const HARD_REFUSAL_MESSAGE: &str = "I cannot engage with any content involving minors or age-ambiguous scenarios.\n\nThis is a hard boundary for safety and legal reasons. I'm happy to help with other topics.";

/// The prompt the hosted backend gets when it substitutes for a failed
/// local model on an explicit route.
pub const FALLBACK_PROMPT: &str = "You are a helpful AI assistant. Be respectful and maintain appropriate boundaries.\nNote: Explicit content may be limited due to content policy restrictions.";

/// Maps classification labels to routes and routes to their configs.
pub struct ContentRouter;

impl ContentRouter {
    pub fn route_for(classification: &Classification) -> Route {
        let route = match classification.label {
            ContentLabel::Safe => Route::Normal,
            ContentLabel::Suggestive => Route::Romance,
            ContentLabel::ExplicitConsensualAdult => Route::Explicit,
            ContentLabel::ExplicitFetish => Route::Fetish,
            ContentLabel::Nonconsensual => Route::Refusal,
            ContentLabel::MinorRisk => Route::HardRefusal,
        };
        debug!(label = %classification.label, confidence = classification.confidence, %route, "routed content");
        route
    }

    pub fn config(route: Route) -> RouteConfig {
        match route {
            Route::Normal => RouteConfig {
                route,
                client: ClientKind::Hosted,
                temperature: 0.7,
                max_tokens: 2000,
                system_prompt: NORMAL_PROMPT,
            },
            Route::Romance => RouteConfig {
                route,
                client: ClientKind::Hosted,
                // Slightly more creative than the normal route.
                temperature: 0.8,
                max_tokens: 2000,
                system_prompt: ROMANCE_PROMPT,
            },
            Route::Explicit => RouteConfig {
                route,
                client: ClientKind::Local,
                temperature: 0.8,
                max_tokens: 2000,
                system_prompt: EXPLICIT_PROMPT,
            },
            Route::Fetish => RouteConfig {
                route,
                client: ClientKind::Local,
                // More controlled, shorter responses.
                temperature: 0.7,
                max_tokens: 1500,
                system_prompt: FETISH_PROMPT,
            },
            Route::Refusal => RouteConfig {
                route,
                client: ClientKind::Hosted,
                temperature: 0.5,
                max_tokens: 200,
                system_prompt: REFUSAL_MESSAGE,
            },
            Route::HardRefusal => RouteConfig {
                route,
                client: ClientKind::Hosted,
                temperature: 0.5,
                max_tokens: 200,
                system_prompt: HARD_REFUSAL_MESSAGE,
            },
        }
    }

    /// Refusal routes suppress model invocation entirely.
    pub fn should_refuse(route: Route) -> bool {
        matches!(route, Route::Refusal | Route::HardRefusal)
    }

    pub fn refusal_message(route: Route) -> &'static str {
        match route {
            Route::HardRefusal => HARD_REFUSAL_MESSAGE,
            _ => REFUSAL_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PatternScores;

    fn classification(label: ContentLabel) -> Classification {
        Classification {
            label,
            confidence: 0.9,
            indicators: vec![],
            normalized_text: String::new(),
            scores: PatternScores::default(),
            judge: None,
        }
    }

    #[test]
    fn label_route_mapping() {
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::Safe)),
            Route::Normal
        );
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::Suggestive)),
            Route::Romance
        );
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::ExplicitConsensualAdult)),
            Route::Explicit
        );
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::ExplicitFetish)),
            Route::Fetish
        );
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::Nonconsensual)),
            Route::Refusal
        );
        assert_eq!(
            ContentRouter::route_for(&classification(ContentLabel::MinorRisk)),
            Route::HardRefusal
        );
    }

    #[test]
    fn explicit_routes_use_local_client() {
        assert_eq!(ContentRouter::config(Route::Explicit).client, ClientKind::Local);
        assert_eq!(ContentRouter::config(Route::Fetish).client, ClientKind::Local);
        assert_eq!(ContentRouter::config(Route::Normal).client, ClientKind::Hosted);
    }

    #[test]
    fn refusal_routes_refuse() {
        assert!(ContentRouter::should_refuse(Route::Refusal));
        assert!(ContentRouter::should_refuse(Route::HardRefusal));
        assert!(!ContentRouter::should_refuse(Route::Explicit));
    }

    #[test]
    fn fetish_route_is_tighter_than_explicit() {
        let explicit = ContentRouter::config(Route::Explicit);
        let fetish = ContentRouter::config(Route::Fetish);
        assert!(fetish.max_tokens < explicit.max_tokens);
        assert!(fetish.temperature < explicit.temperature);
    }
}
