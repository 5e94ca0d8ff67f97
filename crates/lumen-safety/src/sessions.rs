use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::router::Route;

/// How many messages an explicit route stays locked once entered.
pub const ROUTE_LOCK_COUNT: u32 = 5;
/// Sessions idle longer than this are swept.
pub const SESSION_TIMEOUT_HOURS: i64 = 24;

/// Volatile per-conversation routing state.
#[derive(Debug, Clone)]
pub struct RouteSession {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub age_verified: bool,
    pub age_verified_at: Option<DateTime<Utc>>,
    pub current_route: Route,
    pub lock_remaining: u32,
    pub explicit_attempts_without_verification: u32,
    pub last_label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RouteSession {
    fn new(conversation_id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user_id,
            age_verified: false,
            age_verified_at: None,
            current_route: Route::Normal,
            lock_remaining: 0,
            explicit_attempts_without_verification: 0,
            last_label: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owns the per-conversation route state machine and age-verification
/// flags. Map access is thread-safe; all updates for one conversation
/// happen on that conversation's (serialized) turn.
pub struct RouteSessionManager {
    sessions: DashMap<Uuid, RouteSession>,
    lock_count: u32,
}

impl RouteSessionManager {
    pub fn new() -> Self {
        Self::with_lock_count(ROUTE_LOCK_COUNT)
    }

    pub fn with_lock_count(lock_count: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            lock_count,
        }
    }

    /// Get or create the session for a conversation.
    pub fn session(&self, conversation_id: Uuid, user_id: Uuid) -> RouteSession {
        let mut entry = self
            .sessions
            .entry(conversation_id)
            .or_insert_with(|| RouteSession::new(conversation_id, user_id));
        entry.updated_at = Utc::now();
        entry.clone()
    }

    /// Apply the route state machine for one turn and return the
    /// effective route.
    ///
    /// While locked, explicit/romance candidates stay on the locked route
    /// (decrementing the counter); a safe candidate breaks the lock in
    /// one step. Entering an explicit route arms the lock.
    pub fn apply_route(&self, conversation_id: Uuid, user_id: Uuid, candidate: Route) -> Route {
        let mut session = self
            .sessions
            .entry(conversation_id)
            .or_insert_with(|| RouteSession::new(conversation_id, user_id));

        let route = if session.lock_remaining > 0 && candidate.keeps_lock() {
            session.lock_remaining -= 1;
            debug!(
                %conversation_id,
                remaining = session.lock_remaining,
                route = %session.current_route,
                "route locked, continuing"
            );
            session.current_route
        } else if session.lock_remaining > 0 && candidate == Route::Normal {
            info!(%conversation_id, was = %session.current_route, "safe content broke route lock");
            session.lock_remaining = 0;
            Route::Normal
        } else {
            if candidate.is_explicit() {
                session.lock_remaining = self.lock_count;
                info!(%conversation_id, route = %candidate, count = self.lock_count, "route locked");
            }
            candidate
        };

        // Refusal turns never become the sticky route - a locked explicit
        // conversation resumes where it was once the refusal passes.
        if !matches!(route, Route::Refusal | Route::HardRefusal) {
            session.current_route = route;
        }
        session.last_label = Some(route.as_str().to_string());
        session.updated_at = Utc::now();
        route
    }

    /// Explicit routes require a verified session.
    pub fn requires_age_verification(&self, conversation_id: Uuid, route: Route) -> bool {
        if !route.is_explicit() {
            return false;
        }
        !self
            .sessions
            .get(&conversation_id)
            .map(|s| s.age_verified)
            .unwrap_or(false)
    }

    /// Grant verification. Only reachable from the out-of-band endpoint -
    /// never from chat-text parsing.
    pub fn verify_age(&self, conversation_id: Uuid) {
        if let Some(mut session) = self.sessions.get_mut(&conversation_id) {
            session.age_verified = true;
            session.age_verified_at = Some(Utc::now());
            session.explicit_attempts_without_verification = 0;
            session.updated_at = Utc::now();
            info!(%conversation_id, "age verified");
        }
    }

    pub fn is_age_verified(&self, conversation_id: Uuid) -> bool {
        self.sessions
            .get(&conversation_id)
            .map(|s| s.age_verified)
            .unwrap_or(false)
    }

    /// Count an explicit attempt on an unverified session.
    pub fn track_explicit_attempt(&self, conversation_id: Uuid) -> u32 {
        match self.sessions.get_mut(&conversation_id) {
            Some(mut session) => {
                session.explicit_attempts_without_verification += 1;
                session.explicit_attempts_without_verification
            }
            None => 0,
        }
    }

    pub fn is_route_locked(&self, conversation_id: Uuid) -> bool {
        self.sessions
            .get(&conversation_id)
            .map(|s| s.lock_remaining > 0)
            .unwrap_or(false)
    }

    pub fn clear(&self, conversation_id: Uuid) {
        self.sessions.remove(&conversation_id);
    }

    /// Sweep sessions idle past the timeout. Returns how many.
    pub fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(SESSION_TIMEOUT_HOURS);
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.updated_at >= cutoff);
        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, "swept expired route sessions");
        }
        removed
    }
}

impl Default for RouteSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn explicit_route_arms_the_lock() {
        let manager = RouteSessionManager::new();
        let (cid, uid) = ids();

        let route = manager.apply_route(cid, uid, Route::Explicit);
        assert_eq!(route, Route::Explicit);
        assert!(manager.is_route_locked(cid));
        assert_eq!(manager.session(cid, uid).lock_remaining, ROUTE_LOCK_COUNT);
    }

    #[test]
    fn lock_holds_and_decrements_for_mild_content() {
        let manager = RouteSessionManager::new();
        let (cid, uid) = ids();

        manager.apply_route(cid, uid, Route::Explicit);
        for expected_remaining in (1..ROUTE_LOCK_COUNT).rev() {
            let route = manager.apply_route(cid, uid, Route::Romance);
            assert_eq!(route, Route::Explicit);
            assert_eq!(manager.session(cid, uid).lock_remaining, expected_remaining);
        }
    }

    #[test]
    fn safe_content_breaks_the_lock_in_one_step() {
        let manager = RouteSessionManager::new();
        let (cid, uid) = ids();

        manager.apply_route(cid, uid, Route::Explicit);
        let route = manager.apply_route(cid, uid, Route::Normal);
        assert_eq!(route, Route::Normal);
        assert!(!manager.is_route_locked(cid));
        assert_eq!(manager.session(cid, uid).lock_remaining, 0);
    }

    #[test]
    fn refusal_candidate_overrides_lock() {
        let manager = RouteSessionManager::new();
        let (cid, uid) = ids();

        manager.apply_route(cid, uid, Route::Explicit);
        let route = manager.apply_route(cid, uid, Route::HardRefusal);
        assert_eq!(route, Route::HardRefusal);

        // The refusal is not sticky: the locked conversation resumes.
        let route = manager.apply_route(cid, uid, Route::Romance);
        assert_eq!(route, Route::Explicit);
    }

    #[test]
    fn age_verification_gates_explicit_routes() {
        let manager = RouteSessionManager::new();
        let (cid, uid) = ids();
        manager.session(cid, uid);

        assert!(manager.requires_age_verification(cid, Route::Explicit));
        assert!(!manager.requires_age_verification(cid, Route::Normal));

        assert_eq!(manager.track_explicit_attempt(cid), 1);
        assert_eq!(manager.track_explicit_attempt(cid), 2);

        manager.verify_age(cid);
        assert!(!manager.requires_age_verification(cid, Route::Fetish));
        assert_eq!(
            manager
                .session(cid, uid)
                .explicit_attempts_without_verification,
            0
        );
    }

    #[test]
    fn lock_rearms_after_expiry() {
        let manager = RouteSessionManager::with_lock_count(1);
        let (cid, uid) = ids();

        manager.apply_route(cid, uid, Route::Explicit);
        // One locked turn exhausts the counter.
        manager.apply_route(cid, uid, Route::Romance);
        assert!(!manager.is_route_locked(cid));

        // Next explicit turn re-arms.
        let route = manager.apply_route(cid, uid, Route::Explicit);
        assert_eq!(route, Route::Explicit);
        assert!(manager.is_route_locked(cid));
    }
}
