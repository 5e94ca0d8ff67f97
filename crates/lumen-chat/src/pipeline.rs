use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use lumen_core::types::{Role, User};
use lumen_llm::provider::{ChatRequest, LlmClient, ProviderError};
use lumen_llm::stream::StreamEvent;
use lumen_personality::Personality;
use lumen_safety::audit::{AuditAction, AuditRecord};
use lumen_safety::classifier::Classification;
use lumen_safety::router::{ClientKind, ContentRouter, Route, FALLBACK_PROMPT};

use crate::background::BackgroundJob;
use crate::context::ChatContext;
use crate::events::ChatEvent;
use crate::prompt::{GoalPromptContext, PromptBuilder};

/// Out-of-band endpoint named in age-verification events.
pub const AGE_VERIFY_ENDPOINT: &str = "/content/age-verify";
/// Buffered events between the pipeline and the transport encoder.
const EVENT_BUFFER: usize = 64;
/// Canned refusals are streamed in blocks of this many characters so the
/// event shape matches a generated response.
const REFUSAL_CHUNK_CHARS: usize = 40;

const GENERIC_LLM_ERROR: &str =
    "I'm having trouble connecting to my language model. Please try again.";

/// One inbound chat turn, already validated and authenticated.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub message: String,
    pub conversation_id: Option<Uuid>,
    pub personality_name: Option<String>,
    /// Caller-supplied persona override for non-explicit routes.
    pub system_prompt: Option<String>,
}

/// Run one turn, returning the receiving end of its event stream.
///
/// The returned channel yields `Thinking`/`Chunk` events as the turn
/// progresses and ends with `Done` (or `Error`). Dropping the receiver
/// stops streaming; post-response analysis still runs to completion.
pub fn stream_chat(
    ctx: Arc<ChatContext>,
    user: User,
    request: ChatTurnRequest,
) -> mpsc::Receiver<ChatEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        run_turn(ctx, user, request, tx).await;
    });
    rx
}

async fn emit(tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[instrument(skip_all, fields(user_id = %user.id))]
async fn run_turn(
    ctx: Arc<ChatContext>,
    user: User,
    request: ChatTurnRequest,
    tx: mpsc::Sender<ChatEvent>,
) {
    let conversation_id = request.conversation_id.unwrap_or_else(Uuid::new_v4);

    // Turns within one conversation are serialized end-to-end.
    let lock = ctx.turn_lock(conversation_id);
    let _turn = lock.lock().await;

    // Resolve the addressed personality; unknown names end the turn.
    let personality = match ctx
        .personalities
        .resolve(user.id, request.personality_name.as_deref())
        .await
    {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "personality resolution failed");
            emit(&tx, ChatEvent::error(conversation_id, "Unknown personality.")).await;
            return;
        }
    };

    if let Err(e) = ctx
        .vector_store
        .ensure_conversation(conversation_id, user.id, personality.id)
    {
        warn!(error = %e, "failed to ensure conversation");
        emit(&tx, ChatEvent::error(conversation_id, "An unexpected error occurred. Please try again.")).await;
        return;
    }

    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "processing_start",
            serde_json::json!({"message": "Processing your message..."}),
        ),
    )
    .await;

    // The user turn enters working memory and the durable log immediately.
    ctx.buffer
        .append(conversation_id, Role::User, &request.message)
        .await;
    if let Err(e) = ctx
        .vector_store
        .log_message(conversation_id, Role::User, &request.message)
    {
        warn!(error = %e, "failed to log user message");
    }

    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "analyzing",
            serde_json::json!({"message": "Analyzing message (parallel detection)..."}),
        ),
    )
    .await;

    // ── Parallel fan-out ─────────────────────────────────────────────────────
    // Five independent tasks; a failure in any one becomes a null result
    // and never cancels the others.
    let message = request.message.clone();
    let (preferences, directed_personality, detected_emotion, relationship, active_goals) = tokio::join!(
        async {
            match ctx.prefs.extract_and_update(user.id, &message) {
                Ok(Some(updated)) => Some(updated),
                Ok(None) => ctx.prefs.get(user.id).ok(),
                Err(e) => {
                    warn!(error = %e, "preference update failed");
                    None
                }
            }
        },
        async {
            let directive = ctx.personality_detector.detect(&message).await?;
            match ctx
                .personalities
                .apply_directive(user.id, &personality, &directive)
                .await
            {
                Ok(updated) => Some(updated),
                Err(e) => {
                    warn!(error = %e, "personality directive failed");
                    None
                }
            }
        },
        async {
            let emotion = ctx.emotion_detector.detect(&message).await?;
            if let Err(e) =
                ctx.emotions
                    .record(user.id, Some(conversation_id), &emotion, &message)
            {
                warn!(error = %e, "emotion persistence failed");
            }
            Some(emotion)
        },
        async {
            match ctx.relationships.record_message(user.id, personality.id) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(error = %e, "relationship update failed");
                    None
                }
            }
        },
        async {
            match ctx.goals.list(user.id, false) {
                Ok(goals) => goals,
                Err(e) => {
                    warn!(error = %e, "goal load failed");
                    Vec::new()
                }
            }
        },
    );

    // The just-detected personality wins over the one loaded at turn start.
    let final_personality: Personality = directed_personality
        .clone()
        .unwrap_or_else(|| personality.clone());

    if directed_personality.is_some() {
        emit(
            &tx,
            ChatEvent::thinking(
                conversation_id,
                "personality_detected",
                serde_json::json!({
                    "message": "Updated personality preferences",
                    "archetype": final_personality.archetype,
                }),
            ),
        )
        .await;
    }
    if let Some(emotion) = &detected_emotion {
        emit(
            &tx,
            ChatEvent::thinking(
                conversation_id,
                "emotion_detected",
                serde_json::json!({
                    "message": format!("Detected emotion: {}", emotion.emotion),
                    "emotion": emotion.emotion,
                    "confidence": emotion.confidence,
                    "intensity": emotion.intensity,
                }),
            ),
        )
        .await;
    }

    let emotion_trend = if detected_emotion.is_some() {
        ctx.emotions.trends(user.id, 30).ok()
    } else {
        None
    };

    // ── Classification & routing ─────────────────────────────────────────────
    // Every turn is classified, even under a route lock - safe input must
    // be able to break out of explicit mode.
    let classification = ctx.classifier.classify(&request.message).await;
    let candidate = ContentRouter::route_for(&classification);
    let route = ctx
        .route_sessions
        .apply_route(conversation_id, user.id, candidate);
    let route_locked = ctx.route_sessions.is_route_locked(conversation_id);
    let age_verified = ctx.route_sessions.is_age_verified(conversation_id);

    if ctx
        .route_sessions
        .requires_age_verification(conversation_id, route)
    {
        let attempts = ctx.route_sessions.track_explicit_attempt(conversation_id);
        warn!(%conversation_id, attempts, %route, "age verification required");

        ctx.audit.log(&audit_record(
            conversation_id,
            &user,
            &request.message,
            &classification,
            route,
            route_locked,
            false,
            AuditAction::AgeVerifyRequired,
            None,
        ));

        emit(
            &tx,
            ChatEvent::AgeVerificationRequired {
                conversation_id,
                route: route.to_string(),
                instructions: "Please confirm you are 18+ years old to continue".to_string(),
                api_endpoint: AGE_VERIFY_ENDPOINT.to_string(),
                timestamp: chrono::Utc::now(),
            },
        )
        .await;
        emit(&tx, ChatEvent::done(conversation_id)).await;
        return;
    }

    if ContentRouter::should_refuse(route) {
        let refusal = ContentRouter::refusal_message(route);
        warn!(%conversation_id, label = %classification.label, "refusing content");

        ctx.audit.log(&audit_record(
            conversation_id,
            &user,
            &request.message,
            &classification,
            route,
            route_locked,
            age_verified,
            AuditAction::Refuse,
            Some(classification.label.to_string()),
        ));

        emit(
            &tx,
            ChatEvent::thinking(
                conversation_id,
                "content_refused",
                serde_json::json!({"message": format!("Content refused: {}", classification.label)}),
            ),
        )
        .await;

        // Streamed in blocks so the event shape matches generation.
        let chars: Vec<char> = refusal.chars().collect();
        for block in chars.chunks(REFUSAL_CHUNK_CHARS) {
            let chunk: String = block.iter().collect();
            if !emit(&tx, ChatEvent::chunk(conversation_id, chunk)).await {
                return;
            }
        }
        emit(&tx, ChatEvent::done(conversation_id)).await;
        return;
    }

    // ── Memory retrieval ─────────────────────────────────────────────────────
    // The one foreground store dependency: failure aborts the turn.
    let memories = match ctx
        .retriever
        .retrieve_relevant(user.id, personality.id, &request.message)
        .await
    {
        Ok(memories) => memories,
        Err(e) => {
            warn!(error = %e, "memory retrieval failed");
            emit(&tx, ChatEvent::error(conversation_id, "An unexpected error occurred. Please try again.")).await;
            return;
        }
    };

    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "memories_retrieved",
            serde_json::json!({
                "message": format!("Found {} relevant memories", memories.len()),
                "count": memories.len(),
            }),
        ),
    )
    .await;

    // ── Prompt assembly ──────────────────────────────────────────────────────
    let summary = ctx.buffer.summary(conversation_id).await;
    let recent = ctx.buffer.recent(conversation_id, None).await;
    let preferences = preferences.unwrap_or_default();
    let goal_context = GoalPromptContext {
        active: active_goals,
        signals: None,
    };

    let builder = PromptBuilder::new(ctx.config.chat.system_persona.clone());
    let built_prompt = match &request.system_prompt {
        Some(custom) => custom.clone(),
        None => builder.build_system_prompt(
            Some(&final_personality),
            &memories,
            summary.as_deref(),
            &preferences,
            detected_emotion.as_ref(),
            emotion_trend.as_ref(),
            relationship.as_ref(),
            &goal_context,
        ),
    };

    let route_config = ContentRouter::config(route);
    // Explicit routes run on their fixed system prompt, not the built one.
    let system_prompt = if route.keeps_lock() {
        route_config.system_prompt.to_string()
    } else {
        built_prompt
    };

    let messages = PromptBuilder::build_chat_messages(&system_prompt, &recent, &request.message);

    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "content_routed",
            serde_json::json!({
                "message": format!("Content routed to {route}"),
                "label": classification.label.to_string(),
                "confidence": classification.confidence,
                "route": route.to_string(),
            }),
        ),
    )
    .await;

    ctx.audit.log(&audit_record(
        conversation_id,
        &user,
        &request.message,
        &classification,
        route,
        route_locked,
        age_verified,
        AuditAction::Generate,
        None,
    ));

    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "generating_response",
            serde_json::json!({"message": "Generating response..."}),
        ),
    )
    .await;

    // ── Streaming ────────────────────────────────────────────────────────────
    let (client, model) = select_backend(&ctx, route_config.client);
    let llm_request = ChatRequest {
        model,
        messages: messages.clone(),
        temperature: route_config.temperature,
        max_tokens: route_config.max_tokens,
    };

    let outcome = stream_response(&client, &llm_request, conversation_id, &tx).await;
    let outcome = match outcome {
        Ok(outcome) => Ok(outcome),
        Err(e) if route.is_explicit() && e.is_connection() => {
            // Local runtime unreachable: retry on the hosted backend with
            // the safer prompt.
            warn!(error = %e, "local model unavailable, falling back to hosted");
            emit(
                &tx,
                ChatEvent::thinking(
                    conversation_id,
                    "model_fallback",
                    serde_json::json!({
                        "message": "Local model unavailable, using fallback model with safety restrictions"
                    }),
                ),
            )
            .await;

            ctx.audit.log(&audit_record(
                conversation_id,
                &user,
                &request.message,
                &classification,
                route,
                route_locked,
                age_verified,
                AuditAction::GenerateFallback,
                None,
            ));

            let mut fallback_messages = messages;
            if let Some(first) = fallback_messages.first_mut() {
                if first.role == Role::System {
                    first.content = FALLBACK_PROMPT.to_string();
                }
            }
            let fallback_request = ChatRequest {
                model: ctx.config.hosted.model.clone(),
                messages: fallback_messages,
                temperature: ctx.config.hosted.temperature,
                max_tokens: ctx.config.hosted.max_tokens,
            };
            stream_response(&ctx.hosted, &fallback_request, conversation_id, &tx).await
        }
        Err(e) => Err(e),
    };

    let (assistant_text, disconnected) = match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "generation failed");
            emit(&tx, ChatEvent::error(conversation_id, GENERIC_LLM_ERROR)).await;
            return;
        }
    };

    // The assistant turn is only recorded once its stream completed.
    if !disconnected && !assistant_text.is_empty() {
        ctx.buffer
            .append(conversation_id, Role::Assistant, &assistant_text)
            .await;
        if let Err(e) =
            ctx.vector_store
                .log_message(conversation_id, Role::Assistant, &assistant_text)
        {
            warn!(error = %e, "failed to log assistant message");
        }
    }

    // ── Post-response analysis ───────────────────────────────────────────────
    // Fire-and-forget: goal tracking and memory extraction run on the
    // worker with their own store handles; failures never surface here.
    emit(
        &tx,
        ChatEvent::thinking(
            conversation_id,
            "background_analysis",
            serde_json::json!({"message": "Running background analysis (goals, memories)..."}),
        ),
    )
    .await;
    ctx.background.submit(BackgroundJob {
        conversation_id,
        user_id: user.id,
        personality_id: personality.id,
        user_message: request.message.clone(),
        detected_emotion: detected_emotion.map(|e| e.emotion),
    });

    if !disconnected {
        emit(&tx, ChatEvent::done(conversation_id)).await;
        info!(%conversation_id, "turn complete");
    }
}

fn select_backend(ctx: &ChatContext, kind: ClientKind) -> (Arc<dyn LlmClient>, String) {
    match kind {
        ClientKind::Hosted => (Arc::clone(&ctx.hosted), ctx.config.hosted.model.clone()),
        ClientKind::Local => (Arc::clone(&ctx.local), ctx.config.local.model.clone()),
    }
}

/// Stream one completion, forwarding text deltas as `Chunk` events.
///
/// Returns the full buffered text plus whether the client disconnected
/// mid-stream. Errors before any content was produced propagate so the
/// caller can decide on fallback.
async fn stream_response(
    client: &Arc<dyn LlmClient>,
    request: &ChatRequest,
    conversation_id: Uuid,
    tx: &mpsc::Sender<ChatEvent>,
) -> Result<(String, bool), ProviderError> {
    let (provider_tx, mut provider_rx) = mpsc::channel::<StreamEvent>(32);

    let client = Arc::clone(client);
    let owned_request = request.clone();
    let provider = tokio::spawn(async move { client.stream_chat(&owned_request, provider_tx).await });

    let mut full = String::new();
    let mut disconnected = false;
    let mut stream_error: Option<String> = None;

    while let Some(event) = provider_rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => {
                full.push_str(&text);
                if !emit(tx, ChatEvent::chunk(conversation_id, text)).await {
                    disconnected = true;
                    break;
                }
            }
            StreamEvent::Done { .. } => break,
            StreamEvent::Error { message } => {
                stream_error = Some(message);
                break;
            }
        }
    }
    drop(provider_rx);

    match provider.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            if full.is_empty() {
                return Err(e);
            }
            warn!(error = %e, "provider error after partial stream");
        }
        Err(e) => {
            warn!(error = %e, "provider task panicked");
            if full.is_empty() {
                return Err(ProviderError::Parse("provider task failed".to_string()));
            }
        }
    }

    if let Some(message) = stream_error {
        if full.is_empty() {
            return Err(ProviderError::Connection(message));
        }
        warn!(error = %message, "stream error after partial content");
    }

    Ok((full, disconnected))
}

#[allow(clippy::too_many_arguments)]
fn audit_record(
    conversation_id: Uuid,
    user: &User,
    message: &str,
    classification: &Classification,
    route: Route,
    route_locked: bool,
    age_verified: bool,
    action: AuditAction,
    reason: Option<String>,
) -> AuditRecord {
    AuditRecord::new(
        conversation_id,
        user.id,
        message,
        classification,
        route,
        route_locked,
        age_verified,
        action,
        reason,
    )
}
