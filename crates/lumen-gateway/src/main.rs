use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{info, warn};

use lumen_analyzers::categorizer::MemoryCategorizer;
use lumen_analyzers::emotion::EmotionDetector;
use lumen_analyzers::goal::GoalDetector;
use lumen_analyzers::llm::AnalysisLlm;
use lumen_analyzers::personality::PersonalityDetector;
use lumen_buffer::{ConversationBuffer, MemoryBuffer, RedisBuffer};
use lumen_chat::background::{run_worker, BackgroundQueue};
use lumen_chat::ChatContext;
use lumen_core::config::LumenConfig;
use lumen_llm::{Embedder, HttpEmbedder, LlmClient, LocalClient, OpenAiClient};
use lumen_memory::consolidation::{consolidation_loop, Consolidator};
use lumen_memory::contradiction::ContradictionDetector;
use lumen_memory::{MemoryExtractor, MemoryRetriever, VectorStore};
use lumen_personality::{PersonalityCache, PersonalityStore, RelationshipStore};
use lumen_safety::{AuditLogger, ContentClassifier, RouteSessionManager};
use lumen_users::{EmotionStore, GoalStore, PreferenceStore, UserStore};

mod app;
mod auth;
mod http;
mod rate_limit;

/// Each store gets its own connection to the shared database file.
fn open_db(path: &str, init: fn(&Connection) -> rusqlite::Result<()>) -> anyhow::Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    init(&conn)?;
    Ok(conn)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: LUMEN_CONFIG env > ~/.lumen/lumen.toml > defaults
    let config_path = std::env::var("LUMEN_CONFIG").ok();
    let config = LumenConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        LumenConfig::default()
    });

    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    if matches!(environment.as_str(), "production" | "prod") {
        config.validate_production()?;
        info!("production configuration validated");
    }

    let db_path = config.database.path.clone();

    // ── Model backends ───────────────────────────────────────────────────────
    let hosted: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
        config.hosted.api_key.clone(),
        Some(config.hosted.base_url.clone()),
    ));
    let local: Arc<dyn LlmClient> = Arc::new(LocalClient::new(config.local.base_url.clone()));
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        config.embedding.base_url.clone(),
        config.embedding.api_key.clone(),
        config.embedding.model.clone(),
        config.embedding.dimension,
    ));

    // Analysis side-calls run on the hosted backend with its model.
    let analysis_llm = Arc::new(AnalysisLlm::new(
        Arc::clone(&hosted),
        config.hosted.model.clone(),
    ));

    // ── Redis-backed components (optional) ───────────────────────────────────
    let redis_url = config
        .redis
        .enabled
        .then_some(config.redis.url.clone())
        .flatten();

    let buffer: Arc<dyn ConversationBuffer> = match &redis_url {
        Some(url) => match RedisBuffer::connect(url, config.memory.short_term_size, 86_400).await {
            Ok(buffer) => {
                info!("short-term buffer backed by redis");
                Arc::new(buffer)
            }
            Err(e) => {
                warn!("redis unavailable ({e}), using in-process buffer");
                Arc::new(MemoryBuffer::new(config.memory.short_term_size))
            }
        },
        None => Arc::new(MemoryBuffer::new(config.memory.short_term_size)),
    };

    let personality_cache = match &redis_url {
        Some(url) => match PersonalityCache::connect(url).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!("personality cache unavailable ({e})");
                None
            }
        },
        None => None,
    };

    // ── Stores ───────────────────────────────────────────────────────────────
    let contradiction = ContradictionDetector::new(
        config.analysis.contradiction_detection_method,
        Some(Arc::clone(&analysis_llm)),
    );
    let vector_store = Arc::new(VectorStore::new(
        open_db(&db_path, lumen_memory::db::init_db)?,
        config.embedding.dimension,
        contradiction,
    ));
    let retriever = Arc::new(MemoryRetriever::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        config.memory.long_term_top_k,
        config.memory.similarity_threshold,
    ));
    let extractor = Arc::new(MemoryExtractor::new(
        Arc::clone(&vector_store),
        Arc::clone(&embedder),
        Some(Arc::clone(&analysis_llm)),
        MemoryCategorizer::new(
            config.analysis.memory_categorization_method,
            Some(Arc::clone(&analysis_llm)),
        ),
        config.memory.extraction_method,
        config.memory.extraction_min_turns,
    ));

    let users = Arc::new(UserStore::new(open_db(&db_path, lumen_users::db::init_db)?));
    let prefs = Arc::new(PreferenceStore::new(open_db(&db_path, lumen_users::db::init_db)?));
    let emotions = Arc::new(EmotionStore::new(open_db(&db_path, lumen_users::db::init_db)?));
    let goals = Arc::new(GoalStore::new(open_db(&db_path, lumen_users::db::init_db)?));

    let personalities = Arc::new(PersonalityStore::new(
        open_db(&db_path, lumen_personality::db::init_db)?,
        personality_cache,
    ));
    personalities.seed_globals()?;
    let relationships = Arc::new(RelationshipStore::new(open_db(
        &db_path,
        lumen_personality::db::init_db,
    )?));

    // ── Safety ───────────────────────────────────────────────────────────────
    let judge = config
        .safety
        .llm_judge_enabled
        .then(|| Arc::clone(&analysis_llm));
    let classifier = Arc::new(ContentClassifier::new(judge));
    let route_sessions = Arc::new(RouteSessionManager::new());
    let audit = Arc::new(AuditLogger::open(&config.safety.audit_log_path));

    // ── Detectors ────────────────────────────────────────────────────────────
    let emotion_detector = Arc::new(EmotionDetector::new(
        config.analysis.emotion_detection_method,
        Some(Arc::clone(&analysis_llm)),
    ));
    let personality_detector = Arc::new(PersonalityDetector::new(
        config.analysis.personality_detection_method,
        Some(Arc::clone(&analysis_llm)),
    ));
    let goal_detector = Arc::new(GoalDetector::new(
        config.analysis.goal_detection_method,
        Some(Arc::clone(&analysis_llm)),
    ));

    let background = BackgroundQueue::new(config.chat.background_queue_size);

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let consolidation = config.consolidation.clone();

    let ctx = Arc::new(ChatContext::new(
        config,
        Arc::clone(&buffer),
        Arc::clone(&vector_store),
        retriever,
        extractor,
        hosted,
        local,
        embedder,
        classifier,
        Arc::clone(&route_sessions),
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
        background.clone(),
    ));

    // ── Background tasks ─────────────────────────────────────────────────────
    tokio::spawn(run_worker(background, Arc::clone(&ctx)));

    if consolidation.enabled {
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&vector_store),
            consolidation.max_users_per_run,
            consolidation.max_memories_per_user,
            consolidation.semantic_threshold,
        ));
        tokio::spawn(consolidation_loop(
            consolidator,
            consolidation.interval_minutes,
        ));
    }

    // Hourly sweep of idle buffers and route sessions.
    {
        let buffer = Arc::clone(&buffer);
        let route_sessions = Arc::clone(&route_sessions);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let buffers = buffer.cleanup_expired().await;
                let sessions = route_sessions.cleanup_expired();
                if buffers + sessions > 0 {
                    info!(buffers, sessions, "idle-state sweep complete");
                }
            }
        });
    }

    let state = Arc::new(app::AppState::new(ctx));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("lumen gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
