#![allow(clippy::missing_docs_in_private_items)]
//! `EventActor` and `EventSubject` (spec §3.1): explicit edge rows linking
//! events to the entities that acted in or are the subject of them. These
//! rows are the relational source of truth; the Graph Materializer mirrors
//! them into `ACTED_IN`/`ABOUT` edges, which are a derived index only
//! (spec §9 "back-references between entities and events").

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Owner,
    Contributor,
    Reviewer,
    Stakeholder,
    Other,
}

stored_object!(EventActor, "event_actor", {
    event_id: String,
    entity_id: String,
    role: ActorRole
});

stored_object!(EventSubject, "event_subject", {
    event_id: String,
    entity_id: String
});

impl EventActor {
    pub fn new(event_id: String, entity_id: String, role: ActorRole) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{event_id}::{entity_id}"),
            created_at: now,
            updated_at: now,
            event_id,
            entity_id,
            role,
        }
    }

    pub async fn for_event(db: &SurrealDbClient, event_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM event_actor WHERE event_id = $event_id")
            .bind(("event_id", event_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn for_entity(db: &SurrealDbClient, entity_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM event_actor WHERE entity_id = $entity_id")
            .bind(("entity_id", entity_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }
}

impl EventSubject {
    pub fn new(event_id: String, entity_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{event_id}::{entity_id}"),
            created_at: now,
            updated_at: now,
            event_id,
            entity_id,
        }
    }

    pub async fn for_event(db: &SurrealDbClient, event_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM event_subject WHERE event_id = $event_id")
            .bind(("event_id", event_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn for_entity(db: &SurrealDbClient, entity_id: &str) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM event_subject WHERE entity_id = $entity_id")
            .bind(("entity_id", entity_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }
}
