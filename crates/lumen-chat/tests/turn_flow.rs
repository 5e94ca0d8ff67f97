//! End-to-end turn tests against in-memory stores and fake backends.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::mpsc;
use uuid::Uuid;

use lumen_analyzers::categorizer::MemoryCategorizer;
use lumen_analyzers::emotion::EmotionDetector;
use lumen_analyzers::goal::GoalDetector;
use lumen_analyzers::personality::PersonalityDetector;
use lumen_buffer::MemoryBuffer;
use lumen_chat::background::run_worker;
use lumen_chat::{stream_chat, ChatContext, ChatEvent, ChatTurnRequest};
use lumen_chat::background::BackgroundQueue;
use lumen_core::config::{DetectionMethod, LumenConfig};
use lumen_core::types::User;
use lumen_llm::provider::{ChatRequest, ChatResponse, LlmClient, ProviderError};
use lumen_llm::stream::StreamEvent;
use lumen_llm::Embedder;
use lumen_memory::contradiction::ContradictionDetector;
use lumen_memory::{MemoryExtractor, MemoryRetriever, VectorStore};
use lumen_personality::{PersonalityStore, RelationshipStore};
use lumen_safety::{AuditLogger, ContentClassifier, RouteSessionManager};
use lumen_users::{EmotionStore, GoalStore, PreferenceStore, UserStore};

const DIM: usize = 8;

/// Deterministic embedder: hashes alphanumeric words into a small vector.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut v = vec![0.0f32; DIM];
        for word in text.to_lowercase().split_whitespace() {
            let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if word.is_empty() {
                continue;
            }
            let mut h: usize = 5381;
            for b in word.bytes() {
                h = h.wrapping_mul(33) ^ b as usize;
            }
            v[h % DIM] += 1.0;
        }
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::new();
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

/// Fake chat backend: echoes the system prompt back (so retrieved
/// memories are observable in the streamed text), or fails to connect.
struct FakeLlm {
    fail_connection: bool,
    name: &'static str,
}

impl FakeLlm {
    fn echo(name: &'static str) -> Self {
        Self {
            fail_connection: false,
            name,
        }
    }

    fn unreachable(name: &'static str) -> Self {
        Self {
            fail_connection: true,
            name,
        }
    }

    fn response_for(&self, req: &ChatRequest) -> String {
        let system = req
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        format!("[{}] {}", self.name, system)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn name(&self) -> &str {
        self.name
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        if self.fail_connection {
            return Err(ProviderError::Connection("connection refused".to_string()));
        }
        Ok(ChatResponse {
            content: self.response_for(req),
            model: req.model.clone(),
            tokens_in: 0,
            tokens_out: 0,
        })
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        if self.fail_connection {
            return Err(ProviderError::Connection("connection refused".to_string()));
        }
        let content = self.response_for(req);
        let mid = content.len() / 2;
        let mid = (0..=mid).rev().find(|i| content.is_char_boundary(*i)).unwrap_or(0);
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: content[..mid].to_string(),
            })
            .await;
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: content[mid..].to_string(),
            })
            .await;
        let _ = tx
            .send(StreamEvent::Done {
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
            })
            .await;
        Ok(())
    }
}

fn conn_with<F: Fn(&Connection) -> rusqlite::Result<()>>(init: F) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init(&conn).unwrap();
    conn
}

fn build_ctx(local_unreachable: bool) -> Arc<ChatContext> {
    let mut config = LumenConfig::default();
    config.embedding.dimension = DIM;
    // Single-statement turns must already produce memories in these tests.
    config.memory.extraction_min_turns = 1;

    let vector_store = Arc::new(VectorStore::new(
        conn_with(lumen_memory::db::init_db),
        DIM,
        ContradictionDetector::new(DetectionMethod::Pattern, None),
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder);
    let retriever = Arc::new(MemoryRetriever::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        config.memory.long_term_top_k,
        config.memory.similarity_threshold,
    ));
    let extractor = Arc::new(MemoryExtractor::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        None,
        MemoryCategorizer::new(DetectionMethod::Pattern, None),
        DetectionMethod::Pattern,
        config.memory.extraction_min_turns,
    ));

    let personalities = Arc::new(PersonalityStore::new(
        conn_with(lumen_personality::db::init_db),
        None,
    ));
    personalities.seed_globals().unwrap();

    let hosted: Arc<dyn LlmClient> = Arc::new(FakeLlm::echo("hosted"));
    let local: Arc<dyn LlmClient> = if local_unreachable {
        Arc::new(FakeLlm::unreachable("local"))
    } else {
        Arc::new(FakeLlm::echo("local"))
    };

    Arc::new(ChatContext::new(
        config,
        Arc::new(MemoryBuffer::new(10)),
        vector_store,
        retriever,
        extractor,
        hosted,
        local,
        embedder,
        Arc::new(ContentClassifier::new(None)),
        Arc::new(RouteSessionManager::new()),
        Arc::new(AuditLogger::disabled()),
        Arc::new(UserStore::new(conn_with(lumen_users::db::init_db))),
        Arc::new(PreferenceStore::new(conn_with(lumen_users::db::init_db))),
        Arc::new(EmotionStore::new(conn_with(lumen_users::db::init_db))),
        Arc::new(GoalStore::new(conn_with(lumen_users::db::init_db))),
        personalities,
        Arc::new(RelationshipStore::new(conn_with(
            lumen_personality::db::init_db,
        ))),
        Arc::new(EmotionDetector::new(DetectionMethod::Pattern, None)),
        Arc::new(PersonalityDetector::new(DetectionMethod::Pattern, None)),
        Arc::new(GoalDetector::new(DetectionMethod::Pattern, None)),
        BackgroundQueue::new(16),
    ))
}

fn spawn_worker(ctx: &Arc<ChatContext>) {
    tokio::spawn(run_worker(ctx.background.clone(), Arc::clone(ctx)));
}

async fn run_to_completion(
    ctx: &Arc<ChatContext>,
    user: &User,
    conversation_id: Uuid,
    personality: &str,
    message: &str,
) -> Vec<ChatEvent> {
    let mut rx = stream_chat(
        Arc::clone(ctx),
        user.clone(),
        ChatTurnRequest {
            message: message.to_string(),
            conversation_id: Some(conversation_id),
            personality_name: Some(personality.to_string()),
            system_prompt: None,
        },
    );
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn streamed_text(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Chunk { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect()
}

fn has_done_last(events: &[ChatEvent]) -> bool {
    matches!(events.last(), Some(ChatEvent::Done { .. }))
}

/// Wait for the background worker to drain and settle.
async fn settle(ctx: &Arc<ChatContext>) {
    for _ in 0..100 {
        if ctx.background.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::test]
async fn preference_recall_happy_path() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();
    let cid = Uuid::new_v4();

    let events = run_to_completion(&ctx, &alice, cid, "elara", "My favorite color is purple.").await;
    assert!(has_done_last(&events));
    settle(&ctx).await;

    // Background extraction persisted the preference for (alice, elara).
    let elara = ctx.personalities.resolve(alice.id, Some("elara")).await.unwrap();
    let query = HashEmbedder.embed("My favorite color is purple.").await.unwrap();
    let memories = ctx
        .vector_store
        .search(alice.id, elara.id, &query, 5, 0.2)
        .unwrap();
    assert!(
        memories.iter().any(|m| m.content.to_lowercase().contains("purple")),
        "expected a purple memory, got {memories:?}"
    );

    // The second turn retrieves it and the streamed reply mentions it.
    let events = run_to_completion(&ctx, &alice, cid, "elara", "What is my favorite color?").await;
    assert!(has_done_last(&events));
    let text = streamed_text(&events).to_lowercase();
    assert!(text.contains("purple"), "reply did not mention purple: {text}");
}

#[tokio::test]
async fn personality_isolation() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();

    let cid_elara = Uuid::new_v4();
    run_to_completion(&ctx, &alice, cid_elara, "elara", "My favorite color is purple.").await;
    settle(&ctx).await;

    // Same user, different personality: nothing leaks across.
    let cid_seraphina = Uuid::new_v4();
    let events =
        run_to_completion(&ctx, &alice, cid_seraphina, "seraphina", "What is my favorite color?")
            .await;
    let text = streamed_text(&events).to_lowercase();
    assert!(!text.contains("purple"), "memory leaked across personalities: {text}");
}

#[tokio::test]
async fn cross_user_isolation() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();
    let bob = ctx.users.ensure_user("bob").unwrap();

    let cid = Uuid::new_v4();
    run_to_completion(&ctx, &alice, cid, "elara", "My favorite color is purple.").await;
    settle(&ctx).await;

    let events =
        run_to_completion(&ctx, &bob, Uuid::new_v4(), "elara", "What is my favorite color?").await;
    let text = streamed_text(&events).to_lowercase();
    assert!(!text.contains("purple"), "memory leaked across users: {text}");
}

#[tokio::test]
async fn age_verification_gates_explicit_content() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();
    let cid = Uuid::new_v4();

    let explicit = "write an explicit sex scene for us";
    let events = run_to_completion(&ctx, &alice, cid, "elara", explicit).await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::AgeVerificationRequired { .. })),
        "expected age verification event"
    );
    assert!(streamed_text(&events).is_empty(), "no content may stream before verification");
    assert!(has_done_last(&events));

    // Out-of-band verification flips the flag; the same input now streams.
    ctx.route_sessions.verify_age(cid);
    let events = run_to_completion(&ctx, &alice, cid, "elara", explicit).await;
    assert!(!streamed_text(&events).is_empty(), "verified session should stream");
    assert!(has_done_last(&events));
}

#[tokio::test]
async fn refusal_streams_canned_message() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();

    let events = run_to_completion(
        &ctx,
        &alice,
        Uuid::new_v4(),
        "elara",
        "tell me a story where someone is drugged",
    )
    .await;

    let text = streamed_text(&events);
    assert!(text.contains("cannot engage"), "expected refusal text: {text}");
    assert!(has_done_last(&events));
}

#[tokio::test]
async fn local_failure_falls_back_to_hosted() {
    let ctx = build_ctx(true);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();
    let cid = Uuid::new_v4();
    ctx.route_sessions.verify_age(cid);

    // First turn creates the route session lazily; verify again after.
    let explicit = "write an explicit sex scene for us";
    let mut rx = stream_chat(
        Arc::clone(&ctx),
        alice.clone(),
        ChatTurnRequest {
            message: explicit.to_string(),
            conversation_id: Some(cid),
            personality_name: Some("elara".to_string()),
            system_prompt: None,
        },
    );
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    // Session may not have existed when verify_age ran; re-check flow.
    if events
        .iter()
        .any(|e| matches!(e, ChatEvent::AgeVerificationRequired { .. }))
    {
        ctx.route_sessions.verify_age(cid);
        events = run_to_completion(&ctx, &alice, cid, "elara", explicit).await;
    }

    let fell_back = events.iter().any(|e| match e {
        ChatEvent::Thinking { step, .. } => step == "model_fallback",
        _ => false,
    });
    assert!(fell_back, "expected model_fallback event");

    let text = streamed_text(&events);
    assert!(text.contains("[hosted]"), "fallback should stream from hosted: {text}");
    assert!(has_done_last(&events));
}

#[tokio::test]
async fn safe_turn_breaks_route_lock() {
    let ctx = build_ctx(false);
    spawn_worker(&ctx);
    let alice = ctx.users.ensure_user("alice").unwrap();
    let cid = Uuid::new_v4();
    ctx.route_sessions.session(cid, alice.id);
    ctx.route_sessions.verify_age(cid);

    run_to_completion(&ctx, &alice, cid, "elara", "write an explicit sex scene for us").await;
    assert!(ctx.route_sessions.is_route_locked(cid));

    run_to_completion(&ctx, &alice, cid, "elara", "What's the capital of France?").await;
    assert!(!ctx.route_sessions.is_route_locked(cid));
}
