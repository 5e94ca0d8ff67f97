use lumen_analyzers::emotion::{DetectedEmotion, EmotionTrend};
use lumen_analyzers::preference::CommunicationPreferences;
use lumen_buffer::BufferedMessage;
use lumen_llm::provider::ChatMessage;
use lumen_memory::Memory;
use lumen_personality::archetypes::persona_line;
use lumen_personality::{Personality, RelationshipState};
use lumen_users::types::{Goal, GoalTrackingOutcome};

/// Goal material injected into the prompt: the active list plus any
/// signals the current turn produced.
#[derive(Debug, Clone, Default)]
pub struct GoalPromptContext {
    pub active: Vec<Goal>,
    pub signals: Option<GoalTrackingOutcome>,
}

/// Assembles the system prompt: persona, memories, summary, personality
/// instructions, emotion guidance, goals, hard-enforced preferences,
/// general instructions - in that fixed order.
pub struct PromptBuilder {
    persona: String,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build_system_prompt(
        &self,
        personality: Option<&Personality>,
        relevant_memories: &[Memory],
        conversation_summary: Option<&str>,
        preferences: &CommunicationPreferences,
        detected_emotion: Option<&DetectedEmotion>,
        emotion_trend: Option<&EmotionTrend>,
        relationship: Option<&RelationshipState>,
        goals: &GoalPromptContext,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(self.persona_section(personality));

        if !relevant_memories.is_empty() {
            parts.push("\nRelevant memories from past conversations:".to_string());
            for memory in relevant_memories {
                parts.push(format!("- {} ({})", memory.content, memory.memory_type));
            }
        }

        if let Some(summary) = conversation_summary {
            parts.push(format!("\nRecent conversation summary:\n{summary}"));
        }

        if let Some(personality) = personality {
            let instructions = personality_instructions(personality, relationship);
            if !instructions.is_empty() {
                parts.push("\nYOUR PERSONALITY & ROLE:".to_string());
                parts.extend(instructions);
            }
        }

        let emotion_lines = emotion_instructions(detected_emotion, emotion_trend);
        if !emotion_lines.is_empty() {
            parts.push("\nEMOTIONAL CONTEXT & RESPONSE GUIDANCE:".to_string());
            parts.extend(emotion_lines);
        }

        let goal_lines = goal_instructions(goals);
        if !goal_lines.is_empty() {
            parts.push("\nUSER'S GOALS & PROGRESS:".to_string());
            parts.extend(goal_lines);
        }

        let pref_lines = preference_instructions(preferences);
        if !pref_lines.is_empty() {
            parts.push("\nCRITICAL COMMUNICATION REQUIREMENTS (MUST FOLLOW):".to_string());
            parts.extend(pref_lines);
        }

        parts.push("\nGeneral Instructions:".to_string());
        parts.push("- Be helpful and conversational".to_string());
        parts.push("- Reference relevant memories naturally when appropriate".to_string());
        parts.push("- Remember context from this conversation".to_string());
        parts.push("- If you don't know something, be honest about it".to_string());

        parts.join("\n")
    }

    fn persona_section(&self, personality: Option<&Personality>) -> String {
        let Some(personality) = personality else {
            return format!("You are {}.", self.persona);
        };

        let mut lines = Vec::new();
        match &personality.archetype {
            Some(archetype) => lines.push(format!("You are {}.", persona_line(archetype))),
            None => lines.push(format!("You are a helpful AI {}.", personality.relationship_type)),
        }
        if let Some(backstory) = &personality.backstory {
            lines.push(format!("\nYour context: {backstory}"));
        }
        if let Some(instructions) = &personality.custom_instructions {
            lines.push(format!("\nSpecial instructions: {instructions}"));
        }
        lines.join("\n")
    }

    /// The full message list for one completion: system, history without
    /// the current message, then the current user message.
    pub fn build_chat_messages(
        system_prompt: &str,
        history: &[BufferedMessage],
        current_user_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        for msg in history {
            if msg.content == current_user_message {
                continue;
            }
            messages.push(ChatMessage::new(msg.role, msg.content.clone()));
        }
        messages.push(ChatMessage::user(current_user_message));
        messages
    }
}

fn personality_instructions(
    personality: &Personality,
    relationship: Option<&RelationshipState>,
) -> Vec<String> {
    let mut lines = Vec::new();

    let relationship_framing = match personality.relationship_type.as_str() {
        "friend" => "We have a friendship",
        "mentor" => "I am your mentor",
        "coach" => "I am your coach",
        "therapist" => "I am your therapist",
        "partner" => "We are creative partners",
        "advisor" => "I am your advisor",
        _ => "I am your assistant",
    };
    lines.push(format!("Relationship: {relationship_framing}"));

    if let Some(state) = relationship {
        if state.total_messages > 0 {
            lines.push(format!(
                "History: {} conversations, {} days together (depth: {:.1}/10)",
                state.total_messages, state.days_known, state.depth_score
            ));
            if state.depth_score < 2.0 {
                lines.push(
                    "  We're just getting to know each other. Be welcoming and establish rapport."
                        .to_string(),
                );
            } else if state.depth_score < 5.0 {
                lines.push(
                    "  We have a developing relationship. Reference our history naturally."
                        .to_string(),
                );
            } else if state.depth_score >= 7.0 {
                lines.push(
                    "  We have a deep connection. Speak with familiarity and warmth.".to_string(),
                );
            }
        }
    }

    if let Some(style) = &personality.speaking_style {
        lines.push(format!("Speaking style: {style}"));
    }

    let traits = &personality.traits;
    let mut trait_lines = Vec::new();
    trait_lines.push(match traits.humor_level {
        0..=3 => "Be serious and professional. Avoid jokes or humor.",
        8..=10 => "Use humor frequently! Make jokes, be playful, and keep things light.",
        6..=7 => "Use occasional humor when appropriate to keep things engaging.",
        _ => "",
    });
    trait_lines.push(match traits.formality_level {
        0..=3 => "Be very casual and relaxed. Use contractions, be conversational.",
        8..=10 => "Maintain high formality. Use proper grammar, avoid contractions.",
        6..=7 => "Be professional but approachable. Balanced formality.",
        _ => "",
    });
    trait_lines.push(match traits.enthusiasm_level {
        0..=3 => "Be calm, measured, and reserved in your responses.",
        8..=10 => "Show high energy and excitement! Be enthusiastic!",
        6..=7 => "Show moderate enthusiasm and positive energy.",
        _ => "",
    });
    trait_lines.push(match traits.empathy_level {
        0..=3 => "Focus on logic and facts. Be objective and analytical.",
        8..=10 => "Be highly empathetic. Tune into emotions, validate feelings.",
        6..=7 => "Balance empathy with logic. Be understanding but also practical.",
        _ => "",
    });
    trait_lines.push(match traits.directness_level {
        0..=3 => "Be gentle and tactful. Soften difficult truths, be diplomatic.",
        8..=10 => "Be very direct and straightforward. Get to the point.",
        6..=7 => "Be direct but considerate. Clear communication without being harsh.",
        _ => "",
    });
    trait_lines.push(match traits.curiosity_level {
        0..=3 => "Wait for the user to provide information. Be responsive rather than proactive.",
        8..=10 => "Ask lots of questions! Be very curious and explore topics deeply.",
        6..=7 => "Ask clarifying questions when appropriate to better understand.",
        _ => "",
    });
    trait_lines.push(match traits.supportiveness_level {
        0..=3 => "Challenge and push. Be critical when needed, focus on improvement.",
        8..=10 => "Be highly supportive and encouraging. Celebrate everything.",
        6..=7 => "Be supportive and encouraging while also being honest.",
        _ => "",
    });
    trait_lines.push(match traits.playfulness_level {
        0..=3 => "Stay serious and focused. Stick to the task at hand.",
        8..=10 => "Be playful and creative! Use imagination, have fun with conversations.",
        6..=7 => "Add occasional playfulness and creativity to keep things interesting.",
        _ => "",
    });
    let trait_lines: Vec<&str> = trait_lines.into_iter().filter(|l| !l.is_empty()).collect();
    if !trait_lines.is_empty() {
        lines.push("\nPersonality traits:".to_string());
        lines.extend(trait_lines.iter().map(|l| format!("  - {l}")));
    }

    let behaviors = &personality.behaviors;
    let mut behavior_lines = Vec::new();
    behavior_lines.push(if behaviors.asks_questions {
        "Ask questions to better understand the user"
    } else {
        "Avoid asking questions unless absolutely necessary"
    });
    behavior_lines.push(if behaviors.uses_examples {
        "Use examples and illustrations to clarify points"
    } else {
        "Explain directly without examples"
    });
    behavior_lines.push(if behaviors.shares_opinions {
        "Share your opinions and perspectives when relevant"
    } else {
        "Stay neutral and objective, avoid sharing opinions"
    });
    behavior_lines.push(if behaviors.challenges_user {
        "Challenge the user to grow and think differently"
    } else {
        "Be supportive without challenging or pushing"
    });
    behavior_lines.push(if behaviors.celebrates_wins {
        "Celebrate achievements and positive moments"
    } else {
        "Acknowledge wins briefly, stay focused on next steps"
    });
    lines.push("\nBehavioral guidelines:".to_string());
    lines.extend(behavior_lines.iter().map(|l| format!("  - {l}")));

    lines
}

fn emotion_instructions(
    detected: Option<&DetectedEmotion>,
    trend: Option<&EmotionTrend>,
) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(emotion) = detected {
        if emotion.confidence > 0.5 {
            if let Some(strategy) = emotion_strategy(&emotion.emotion) {
                lines.push(format!(
                    "Detected emotion: {} (confidence: {:.0}%, intensity: {})",
                    emotion.emotion,
                    emotion.confidence * 100.0,
                    emotion.intensity
                ));
                lines.extend(strategy.iter().map(|s| format!("  {s}")));
            }
        }
    }

    if let Some(trend) = trend {
        if let Some(dominant) = &trend.dominant_emotion {
            lines.push(format!(
                "Emotion pattern: user has been mostly {dominant} recently (trend: {})",
                trend.recent_trend
            ));
            if trend.needs_attention {
                lines.push(
                    "  The user has shown multiple negative emotions recently. Be extra supportive and check in on their wellbeing if appropriate."
                        .to_string(),
                );
            }
            match trend.recent_trend.as_str() {
                "improving" => lines.push(
                    "  Their emotional state is improving. Acknowledge progress!".to_string(),
                ),
                "declining" => lines.push(
                    "  Their emotional state may be declining. Be extra sensitive and supportive."
                        .to_string(),
                ),
                _ => {}
            }
        }
    }

    lines
}

fn emotion_strategy(emotion: &str) -> Option<&'static [&'static str]> {
    match emotion {
        "sad" => Some(&[
            "The user is feeling sad. Be gentle, supportive, and empathetic.",
            "Acknowledge their feelings without dismissing them.",
            "Avoid being overly cheerful - meet them where they are emotionally.",
        ]),
        "angry" => Some(&[
            "The user is angry. Stay calm and professional.",
            "Validate their feelings without inflaming the situation.",
            "Be solution-focused and avoid defensive language.",
        ]),
        "frustrated" => Some(&[
            "The user is frustrated. Be patient and understanding.",
            "Break down complex issues into manageable steps.",
            "Offer clear, structured solutions.",
        ]),
        "anxious" => Some(&[
            "The user is anxious or worried. Provide calm reassurance.",
            "Break information into clear, manageable pieces.",
            "Offer practical steps they can take to feel more in control.",
        ]),
        "happy" => Some(&[
            "The user is happy! Match their positive energy.",
            "Be warm and enthusiastic in your response.",
        ]),
        "excited" => Some(&[
            "The user is excited! Share their enthusiasm!",
            "Be energetic and celebratory in your response.",
        ]),
        "grateful" => Some(&[
            "The user is expressing gratitude. Be warm and gracious.",
            "Accept their thanks humbly - you're here to help.",
        ]),
        "confused" => Some(&[
            "The user is confused. Provide clear, simple explanations.",
            "Break down complex concepts into digestible pieces.",
        ]),
        "disappointed" => Some(&[
            "The user is disappointed. Be supportive and encouraging.",
            "Help them see alternative paths or solutions.",
        ]),
        "proud" => Some(&[
            "The user is proud of an accomplishment! Celebrate with them!",
            "Recognize their hard work and success.",
        ]),
        "lonely" => Some(&[
            "The user is feeling lonely. Be warm and present.",
            "Engage meaningfully - show genuine interest in them.",
        ]),
        "hopeful" => Some(&[
            "The user is feeling hopeful. Nurture that optimism!",
            "Help them build on their hope with practical steps.",
        ]),
        _ => None,
    }
}

fn goal_instructions(context: &GoalPromptContext) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(signals) = &context.signals {
        if !signals.new_goals.is_empty() {
            let titles: Vec<&str> = signals.new_goals.iter().map(|g| g.title.as_str()).collect();
            lines.push(format!("NEW GOAL(S) DETECTED: {}", titles.join(", ")));
            lines.push("- Acknowledge their new goal(s) and show enthusiasm".to_string());
            lines.push("- Offer to help them plan or break it down into steps".to_string());
        }
        if !signals.completions.is_empty() {
            lines.push(format!("GOAL COMPLETED: {}", signals.completions.join(", ")));
            lines.push("- Celebrate this achievement enthusiastically!".to_string());
        }
        for update in &signals.progress_updates {
            match update.sentiment.as_deref() {
                Some("positive") => {
                    lines.push("- Positive progress mentioned: encourage them and acknowledge their hard work".to_string());
                }
                Some("negative") => {
                    lines.push("- They're struggling with a goal: show empathy and help them problem-solve".to_string());
                }
                _ => {}
            }
        }
    }

    if !context.active.is_empty() {
        lines.push("User's active goals:".to_string());
        for goal in context.active.iter().take(5) {
            lines.push(format!(
                "- {} ({}) - {:.0}% complete",
                goal.title, goal.category, goal.progress
            ));
        }
        lines.push("Goal-aware guidance:".to_string());
        lines.push("- Reference their goals naturally when relevant".to_string());
        lines.push("- Celebrate wins, no matter how small".to_string());
        lines.push("- Help them stay motivated and overcome obstacles".to_string());
    }

    lines
}

/// Hard-enforced communication preferences override all other tonal
/// guidance.
fn preference_instructions(prefs: &CommunicationPreferences) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(language) = &prefs.language {
        if language != "english" {
            let mut capitalized = language.clone();
            if let Some(first) = capitalized.get(0..1).map(str::to_uppercase) {
                capitalized.replace_range(0..1, &first);
            }
            lines.push(format!(
                "LANGUAGE: You MUST respond ENTIRELY in {capitalized}. Do not use English unless specifically requested."
            ));
        }
    }
    match prefs.formality.as_deref() {
        Some("casual") => lines.push(
            "FORMALITY: Use casual, informal language. Use contractions. Be relaxed and friendly."
                .to_string(),
        ),
        Some("formal") => lines.push(
            "FORMALITY: Use formal, polite language. Avoid contractions. Maintain professional tone."
                .to_string(),
        ),
        Some("professional") => lines.push(
            "FORMALITY: Use professional business language. Be polite and respectful.".to_string(),
        ),
        _ => {}
    }
    match prefs.tone.as_deref() {
        Some("enthusiastic") => lines.push(
            "TONE: Be enthusiastic and energetic! Show excitement and positivity!".to_string(),
        ),
        Some("calm") => {
            lines.push("TONE: Maintain a calm, measured, and relaxed tone.".to_string())
        }
        Some("friendly") => lines.push("TONE: Be warm, friendly, and welcoming.".to_string()),
        Some("neutral") => {
            lines.push("TONE: Remain neutral and objective. Avoid emotional language.".to_string())
        }
        _ => {}
    }
    match prefs.emoji_usage {
        Some(true) => lines.push("EMOJIS: Include relevant emojis in your responses.".to_string()),
        Some(false) => lines.push("EMOJIS: Do NOT use any emojis. Keep responses text-only.".to_string()),
        None => {}
    }
    match prefs.response_length.as_deref() {
        Some("brief") => lines.push(
            "LENGTH: Keep responses BRIEF and CONCISE. 2-3 sentences maximum unless more detail is absolutely necessary."
                .to_string(),
        ),
        Some("detailed") => lines.push(
            "LENGTH: Provide DETAILED and THOROUGH responses with examples and explanations."
                .to_string(),
        ),
        Some("balanced") => lines.push(
            "LENGTH: Provide balanced responses - comprehensive but concise.".to_string(),
        ),
        _ => {}
    }
    match prefs.explanation_style.as_deref() {
        Some("simple") => lines.push(
            "STYLE: Explain everything in SIMPLE terms. Use everyday language, not jargon."
                .to_string(),
        ),
        Some("technical") => lines.push(
            "STYLE: Use TECHNICAL language and terminology with precise explanations.".to_string(),
        ),
        Some("analogies") => lines.push(
            "STYLE: Use ANALOGIES and METAPHORS to explain concepts.".to_string(),
        ),
        _ => {}
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumen_core::types::{MemoryType, Role};
    use uuid::Uuid;

    fn memory(content: &str) -> Memory {
        Memory {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            personality_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            content: content.to_string(),
            memory_type: MemoryType::Preference,
            category: None,
            importance: 0.8,
            related_entities: Vec::new(),
            access_count: 0,
            last_accessed: None,
            decay_factor: 1.0,
            is_active: true,
            superseded_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            similarity: Some(0.9),
        }
    }

    #[test]
    fn memories_appear_with_type_tags() {
        let builder = PromptBuilder::new("a helpful assistant");
        let prompt = builder.build_system_prompt(
            None,
            &[memory("My favorite color is purple")],
            None,
            &CommunicationPreferences::default(),
            None,
            None,
            None,
            &GoalPromptContext::default(),
        );
        assert!(prompt.contains("My favorite color is purple (preference)"));
        assert!(prompt.contains("Relevant memories"));
    }

    #[test]
    fn preferences_are_hard_enforced() {
        let builder = PromptBuilder::new("a helpful assistant");
        let prefs = CommunicationPreferences {
            response_length: Some("brief".to_string()),
            emoji_usage: Some(false),
            ..Default::default()
        };
        let prompt = builder.build_system_prompt(
            None,
            &[],
            None,
            &prefs,
            None,
            None,
            None,
            &GoalPromptContext::default(),
        );
        assert!(prompt.contains("MUST FOLLOW"));
        assert!(prompt.contains("BRIEF"));
        assert!(prompt.contains("Do NOT use any emojis"));
    }

    #[test]
    fn low_confidence_emotion_is_omitted() {
        let builder = PromptBuilder::new("a helpful assistant");
        let emotion = DetectedEmotion {
            emotion: "sad".to_string(),
            confidence: 0.4,
            intensity: "low".to_string(),
            indicators: vec![],
        };
        let prompt = builder.build_system_prompt(
            None,
            &[],
            None,
            &CommunicationPreferences::default(),
            Some(&emotion),
            None,
            None,
            &GoalPromptContext::default(),
        );
        assert!(!prompt.contains("Detected emotion"));
    }

    #[test]
    fn chat_messages_exclude_current_from_history() {
        let history = vec![
            BufferedMessage::new(Role::User, "hello"),
            BufferedMessage::new(Role::Assistant, "hi there"),
            BufferedMessage::new(Role::User, "what is my favorite color?"),
        ];
        let messages =
            PromptBuilder::build_chat_messages("system", &history, "what is my favorite color?");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hello");
        assert_eq!(messages[3].content, "what is my favorite color?");
        assert_eq!(messages[3].role, Role::User);
    }

    #[test]
    fn general_instructions_always_present() {
        let builder = PromptBuilder::new("a helpful assistant");
        let prompt = builder.build_system_prompt(
            None,
            &[],
            None,
            &CommunicationPreferences::default(),
            None,
            None,
            None,
            &GoalPromptContext::default(),
        );
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(prompt.contains("General Instructions:"));
    }
}
