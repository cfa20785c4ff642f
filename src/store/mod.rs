// SPDX-License-Identifier: MPL-2.0

//! Persistence seam for the engagement service.
//!
//! Reads go through the [`EngagementStore`] and [`ContentStore`] traits. Every
//! mutation is expressed as a [`WriteBatch`] and handed to [`Store::commit`],
//! which applies the whole batch or nothing. Ledger rows and the counters that
//! mirror them are always written in the same batch.

mod batch;
mod content;
mod db;
mod engagements;
mod memory;
mod profiles;
mod schema;
mod sqlite;

pub use batch::{WriteBatch, WriteOp};
pub use db::Db;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::model::{
    Comment, CounterSnapshot, Engagement, EngagementKind, EntityRef, Post, Profile, Reply,
};
use async_trait::async_trait;
use thiserror::Error;

/// Ids bound per `IN (...)` query, well under SQLite's variable limit
const ID_CHUNK: usize = 500;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("counter {field} does not exist on {entity}")]
    InvalidCounter { field: &'static str, entity: String },
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
    #[error("database path error: {0}")]
    Path(String),
    #[error("store task failed: {0}")]
    Task(String),
}

/// Compare the live ids of a set of rows with the ids a batch was planned
/// against. Order does not matter.
fn ensure_unchanged(
    what: &str,
    mut live: Vec<String>,
    expected: &[String],
) -> Result<(), StoreError> {
    let mut expected = expected.to_vec();
    live.sort();
    expected.sort();

    if live != expected {
        return Err(StoreError::Conflict(format!(
            "{what} changed since the delete was planned ({} expected, {} found)",
            expected.len(),
            live.len()
        )));
    }
    Ok(())
}

/// Read access to the engagement ledger.
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Look up the record for `(actor, target, kind)`, the ledger's natural key.
    async fn find_engagement(
        &self,
        actor: &str,
        target: &str,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>, StoreError>;

    /// Every record `actor` holds against any of `targets`, in a single query.
    async fn engagements_by_actor(
        &self,
        actor: &str,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError>;

    /// Every record against any of `targets`, whoever the actor.
    async fn engagements_for_targets(
        &self,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError>;
}

/// Read access to posts, comments, replies and profiles.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn profile(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    async fn post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    async fn comment(&self, id: &str) -> Result<Option<Comment>, StoreError>;

    async fn reply(&self, id: &str) -> Result<Option<Reply>, StoreError>;

    /// Comments on a post, oldest first
    async fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, StoreError>;

    /// Replies to any of the given comments, oldest first
    async fn replies_for_comments(&self, comment_ids: &[String])
    -> Result<Vec<Reply>, StoreError>;

    async fn widget(&self, post_id: &str) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Read access to the denormalized counters. Writes go through
/// [`WriteOp::Increment`] and [`WriteOp::IncrementProfile`], each a single
/// `col = col + delta` update applied inside [`Store::commit`].
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current counters of a post, comment or reply
    async fn counters(&self, entity: &EntityRef) -> Result<Option<CounterSnapshot>, StoreError>;
}

/// A complete backend: reads plus all-or-nothing batch commits.
#[async_trait]
pub trait Store: EngagementStore + ContentStore + CounterStore {
    /// Apply every operation in `batch`, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Short name for logs
    fn backend_tag(&self) -> &'static str;
}
