use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use lumen_analyzers::personality::PersonalityDirective;
use lumen_core::types::system_user_id;

use crate::archetypes;
use crate::cache::PersonalityCache;
use crate::error::{PersonalityError, Result};
use crate::types::{Personality, PersonalityBehaviors, PersonalityTraits};

/// Name given to the per-user personality created on first contact.
const DEFAULT_NAME: &str = "default";
/// Globals seeded at startup: name → archetype.
const GLOBAL_SEEDS: &[(&str, &str)] = &[
    ("elara", "supportive_friend"),
    ("seraphina", "creative_partner"),
];

/// Personality definitions: user-owned rows plus globals owned by the
/// synthetic system user. Global lookups go through the optional Redis
/// read-through cache.
pub struct PersonalityStore {
    db: Mutex<Connection>,
    cache: Option<Arc<PersonalityCache>>,
}

impl PersonalityStore {
    pub fn new(conn: Connection, cache: Option<Arc<PersonalityCache>>) -> Self {
        Self {
            db: Mutex::new(conn),
            cache,
        }
    }

    /// Seed the global personalities. Idempotent; called at startup.
    pub fn seed_globals(&self) -> Result<()> {
        for (name, archetype) in GLOBAL_SEEDS {
            if self.get_owned(system_user_id(), name)?.is_none() {
                self.create(system_user_id(), name, Some(archetype), None, None)?;
                info!(name, archetype, "seeded global personality");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn create(
        &self,
        owner_user_id: Uuid,
        name: &str,
        archetype: Option<&str>,
        backstory: Option<&str>,
        custom_instructions: Option<&str>,
    ) -> Result<Personality> {
        let preset = match archetype {
            Some(a) => Some(archetypes::by_name(a).ok_or_else(|| {
                PersonalityError::UnknownArchetype {
                    name: a.to_string(),
                }
            })?),
            None => None,
        };

        if self.get_owned(owner_user_id, name)?.is_some() {
            return Err(PersonalityError::NameTaken {
                name: name.to_string(),
            });
        }

        let personality = Personality {
            id: Uuid::new_v4(),
            owner_user_id,
            name: name.to_string(),
            archetype: archetype.map(String::from),
            relationship_type: preset
                .as_ref()
                .map(|p| p.relationship_type.to_string())
                .unwrap_or_else(|| "assistant".to_string()),
            traits: preset
                .as_ref()
                .map(|p| p.traits)
                .unwrap_or_default(),
            behaviors: preset
                .as_ref()
                .map(|p| p.behaviors)
                .unwrap_or_default(),
            backstory: backstory.map(String::from),
            custom_instructions: custom_instructions.map(String::from),
            speaking_style: preset.map(|p| p.speaking_style.to_string()),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.insert(&personality)?;
        Ok(personality)
    }

    /// Resolve the personality a request addresses.
    ///
    /// With a name: the user's own definition shadows a global of the same
    /// name. Without one: the user's per-user default (created on first use).
    pub async fn resolve(&self, user_id: Uuid, name: Option<&str>) -> Result<Personality> {
        match name {
            Some(name) => {
                if let Some(own) = self.get_owned(user_id, name)? {
                    return Ok(own);
                }
                self.resolve_global(name).await
            }
            None => match self.get_owned(user_id, DEFAULT_NAME)? {
                Some(p) => Ok(p),
                None => {
                    debug!(%user_id, "creating default personality");
                    self.create(user_id, DEFAULT_NAME, Some("balanced_companion"), None, None)
                }
            },
        }
    }

    async fn resolve_global(&self, name: &str) -> Result<Personality> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(name).await {
                return Ok(cached);
            }
        }

        let personality =
            self.get_owned(system_user_id(), name)?
                .ok_or_else(|| PersonalityError::NotFound {
                    name: name.to_string(),
                })?;

        if let Some(cache) = &self.cache {
            cache.put(&personality).await;
        }
        Ok(personality)
    }

    /// Apply a detected directive to the user's active personality.
    ///
    /// Globals are immutable: directing a global personality first clones
    /// it into a user-owned row of the same name, which shadows the global
    /// from then on.
    #[instrument(skip(self, directive), fields(%user_id, personality = %active.name))]
    pub async fn apply_directive(
        &self,
        user_id: Uuid,
        active: &Personality,
        directive: &PersonalityDirective,
    ) -> Result<Personality> {
        let mut target = if active.is_global() {
            let mut clone = active.clone();
            clone.id = Uuid::new_v4();
            clone.owner_user_id = user_id;
            clone.version = 1;
            clone.created_at = Utc::now();
            self.insert(&clone)?;
            debug!(name = %clone.name, "cloned global personality for user");
            clone
        } else {
            active.clone()
        };

        if let Some(archetype) = &directive.archetype {
            let preset = archetypes::by_name(archetype).ok_or_else(|| {
                PersonalityError::UnknownArchetype {
                    name: archetype.clone(),
                }
            })?;
            target.archetype = Some(archetype.clone());
            target.relationship_type = preset.relationship_type.to_string();
            target.traits = preset.traits;
            target.behaviors = preset.behaviors;
            target.speaking_style = Some(preset.speaking_style.to_string());
        }

        target.traits.apply(&directive.traits);
        target.behaviors.apply(&directive.behaviors);
        if let Some(relationship) = &directive.relationship_type {
            target.relationship_type = relationship.clone();
        }
        if let Some(instructions) = &directive.custom_instructions {
            target.custom_instructions = Some(instructions.clone());
        }
        target.version += 1;
        target.updated_at = Utc::now();

        self.update_row(&target)?;
        if let Some(cache) = &self.cache {
            cache.invalidate(&target.name).await;
        }
        Ok(target)
    }

    /// Update mutable fields of a user-owned personality by name.
    pub async fn update(
        &self,
        user_id: Uuid,
        name: &str,
        directive: &PersonalityDirective,
    ) -> Result<Personality> {
        let existing = self
            .get_owned(user_id, name)?
            .ok_or_else(|| PersonalityError::NotFound {
                name: name.to_string(),
            })?;
        self.apply_directive(user_id, &existing, directive).await
    }

    pub async fn delete(&self, user_id: Uuid, name: &str) -> Result<()> {
        let changed = {
            let db = self.db.lock().unwrap();
            db.execute(
                "DELETE FROM personalities WHERE owner_user_id = ?1 AND name = ?2",
                rusqlite::params![user_id.to_string(), name],
            )?
        };
        if changed == 0 {
            return Err(PersonalityError::NotFound {
                name: name.to_string(),
            });
        }
        if let Some(cache) = &self.cache {
            cache.invalidate(name).await;
        }
        Ok(())
    }

    /// The user's own personalities plus the globals.
    pub fn list(&self, user_id: Uuid) -> Result<Vec<Personality>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{PERSONALITY_SELECT} WHERE owner_user_id IN (?1, ?2) ORDER BY name"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![user_id.to_string(), system_user_id().to_string()],
            row_to_personality,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Personality>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{PERSONALITY_SELECT} WHERE id = ?1"),
            rusqlite::params![id.to_string()],
            row_to_personality,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PersonalityError::Database(e)),
        }
    }

    fn get_owned(&self, owner: Uuid, name: &str) -> Result<Option<Personality>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{PERSONALITY_SELECT} WHERE owner_user_id = ?1 AND name = ?2"),
            rusqlite::params![owner.to_string(), name],
            row_to_personality,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PersonalityError::Database(e)),
        }
    }

    fn insert(&self, p: &Personality) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO personalities
             (id, owner_user_id, name, archetype, relationship_type, traits, behaviors,
              backstory, custom_instructions, speaking_style, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                p.id.to_string(),
                p.owner_user_id.to_string(),
                p.name,
                p.archetype,
                p.relationship_type,
                serde_json::to_string(&p.traits)?,
                serde_json::to_string(&p.behaviors)?,
                p.backstory,
                p.custom_instructions,
                p.speaking_style,
                p.version,
                p.created_at.to_rfc3339(),
                p.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_row(&self, p: &Personality) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE personalities SET archetype = ?1, relationship_type = ?2, traits = ?3,
                    behaviors = ?4, backstory = ?5, custom_instructions = ?6,
                    speaking_style = ?7, version = ?8, updated_at = ?9
             WHERE id = ?10",
            rusqlite::params![
                p.archetype,
                p.relationship_type,
                serde_json::to_string(&p.traits)?,
                serde_json::to_string(&p.behaviors)?,
                p.backstory,
                p.custom_instructions,
                p.speaking_style,
                p.version,
                p.updated_at.to_rfc3339(),
                p.id.to_string(),
            ],
        )?;
        Ok(())
    }
}

const PERSONALITY_SELECT: &str = "SELECT id, owner_user_id, name, archetype, relationship_type, traits, behaviors,
        backstory, custom_instructions, speaking_style, version, created_at, updated_at
 FROM personalities";

fn row_to_personality(row: &rusqlite::Row<'_>) -> rusqlite::Result<Personality> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let traits_json: String = row.get(5)?;
    let behaviors_json: String = row.get(6)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(Personality {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        owner_user_id: Uuid::parse_str(&owner).unwrap_or_default(),
        name: row.get(2)?,
        archetype: row.get(3)?,
        relationship_type: row.get(4)?,
        traits: serde_json::from_str::<PersonalityTraits>(&traits_json).unwrap_or_default(),
        behaviors: serde_json::from_str::<PersonalityBehaviors>(&behaviors_json)
            .unwrap_or_default(),
        backstory: row.get(7)?,
        custom_instructions: row.get(8)?,
        speaking_style: row.get(9)?,
        version: row.get::<_, i64>(10)? as u32,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> PersonalityStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        PersonalityStore::new(conn, None)
    }

    #[tokio::test]
    async fn globals_resolve_from_any_user() {
        let store = store();
        store.seed_globals().unwrap();

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let from_alice = store.resolve(alice, Some("elara")).await.unwrap();
        let from_bob = store.resolve(bob, Some("elara")).await.unwrap();
        assert_eq!(from_alice.id, from_bob.id);
        assert!(from_alice.is_global());
    }

    #[tokio::test]
    async fn unnamed_resolution_creates_default() {
        let store = store();
        let user = Uuid::new_v4();
        let p = store.resolve(user, None).await.unwrap();
        assert_eq!(p.name, "default");
        assert_eq!(p.archetype.as_deref(), Some("balanced_companion"));

        let again = store.resolve(user, None).await.unwrap();
        assert_eq!(p.id, again.id);
    }

    #[tokio::test]
    async fn directive_on_global_clones_per_user() {
        let store = store();
        store.seed_globals().unwrap();
        let user = Uuid::new_v4();

        let global = store.resolve(user, Some("elara")).await.unwrap();
        let mut directive = PersonalityDirective::default();
        directive.traits.insert("humor_level".to_string(), 9);

        let updated = store.apply_directive(user, &global, &directive).await.unwrap();
        assert_eq!(updated.owner_user_id, user);
        assert_eq!(updated.traits.humor_level, 9);

        // The user now sees their shadowed copy; others still get the global.
        let mine = store.resolve(user, Some("elara")).await.unwrap();
        assert_eq!(mine.id, updated.id);
        let theirs = store.resolve(Uuid::new_v4(), Some("elara")).await.unwrap();
        assert_eq!(theirs.id, global.id);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let store = store();
        let user = Uuid::new_v4();
        store.create(user, "muse", Some("creative_partner"), None, None).unwrap();
        assert!(matches!(
            store.create(user, "muse", None, None, None),
            Err(PersonalityError::NameTaken { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_personality_is_not_found() {
        let store = store();
        assert!(matches!(
            store.resolve(Uuid::new_v4(), Some("nope")).await,
            Err(PersonalityError::NotFound { .. })
        ));
    }
}
