use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use lumen_analyzers::emotion::EmotionDetector;
use lumen_analyzers::goal::GoalDetector;
use lumen_analyzers::personality::PersonalityDetector;
use lumen_buffer::ConversationBuffer;
use lumen_core::config::LumenConfig;
use lumen_llm::{Embedder, LlmClient};
use lumen_memory::{MemoryExtractor, MemoryRetriever, VectorStore};
use lumen_personality::{PersonalityStore, RelationshipStore};
use lumen_safety::{AuditLogger, ContentClassifier, RouteSessionManager};
use lumen_users::{EmotionStore, GoalStore, PreferenceStore, UserStore};

use crate::background::BackgroundQueue;

/// The per-application object graph the orchestrator works against.
///
/// Built once at startup, passed explicitly as `Arc<ChatContext>` - every
/// collaborator is a small trait object or store so tests can swap in
/// in-memory fakes. Dependencies point one way: the orchestrator holds
/// analyzers and stores; none of them hold it back.
pub struct ChatContext {
    pub config: LumenConfig,

    // Conversation state
    pub buffer: Arc<dyn ConversationBuffer>,
    pub vector_store: Arc<VectorStore>,
    pub retriever: Arc<MemoryRetriever>,
    pub extractor: Arc<MemoryExtractor>,

    // Model backends
    pub hosted: Arc<dyn LlmClient>,
    pub local: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn Embedder>,

    // Safety
    pub classifier: Arc<ContentClassifier>,
    pub route_sessions: Arc<RouteSessionManager>,
    pub audit: Arc<AuditLogger>,

    // User-scoped stores
    pub users: Arc<UserStore>,
    pub prefs: Arc<PreferenceStore>,
    pub emotions: Arc<EmotionStore>,
    pub goals: Arc<GoalStore>,
    pub personalities: Arc<PersonalityStore>,
    pub relationships: Arc<RelationshipStore>,

    // Per-turn detectors
    pub emotion_detector: Arc<EmotionDetector>,
    pub personality_detector: Arc<PersonalityDetector>,
    pub goal_detector: Arc<GoalDetector>,

    // Post-response work
    pub background: BackgroundQueue,

    /// Per-conversation turn serialization: turn N+1 does not start until
    /// turn N has finished emitting.
    turn_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ChatContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LumenConfig,
        buffer: Arc<dyn ConversationBuffer>,
        vector_store: Arc<VectorStore>,
        retriever: Arc<MemoryRetriever>,
        extractor: Arc<MemoryExtractor>,
        hosted: Arc<dyn LlmClient>,
        local: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<ContentClassifier>,
        route_sessions: Arc<RouteSessionManager>,
        audit: Arc<AuditLogger>,
        users: Arc<UserStore>,
        prefs: Arc<PreferenceStore>,
        emotions: Arc<EmotionStore>,
        goals: Arc<GoalStore>,
        personalities: Arc<PersonalityStore>,
        relationships: Arc<RelationshipStore>,
        emotion_detector: Arc<EmotionDetector>,
        personality_detector: Arc<PersonalityDetector>,
        goal_detector: Arc<GoalDetector>,
        background: BackgroundQueue,
    ) -> Self {
        Self {
            config,
            buffer,
            vector_store,
            retriever,
            extractor,
            hosted,
            local,
            embedder,
            classifier,
            route_sessions,
            audit,
            users,
            prefs,
            emotions,
            goals,
            personalities,
            relationships,
            emotion_detector,
            personality_detector,
            goal_detector,
            background,
            turn_locks: DashMap::new(),
        }
    }

    /// The mutex serializing turns for one conversation.
    pub fn turn_lock(&self, conversation_id: Uuid) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
