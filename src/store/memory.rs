// SPDX-License-Identifier: MPL-2.0

use crate::model::{
    Comment, CounterField, CounterSnapshot, Engagement, EngagementCounters, EngagementKind,
    EntityRef, Post, Profile, Reply, TargetType,
};
use crate::store::{
    ContentStore, CounterStore, EngagementStore, Store, StoreError, WriteBatch, WriteOp,
    ensure_unchanged,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    profiles: HashMap<String, Profile>,
    posts: HashMap<String, Post>,
    comments: HashMap<String, Comment>,
    replies: HashMap<String, Reply>,
    engagements: HashMap<String, Engagement>,
    widgets: HashMap<String, serde_json::Value>,
}

impl MemoryState {
    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertEngagement(record) => {
                let slot = record.kind.slot();
                let duplicate = self.engagements.values().any(|e| {
                    e.actor == record.actor && e.target == record.target && e.kind.slot() == slot
                });
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "{slot} by {} on {} already recorded",
                        record.actor, record.target
                    )));
                }
                self.engagements.insert(record.id.clone(), record);
            }
            WriteOp::DeleteEngagement { id } => self.delete_engagement(&id)?,
            WriteOp::DeleteEngagements { ids } => {
                for id in ids {
                    self.delete_engagement(&id)?;
                }
            }
            WriteOp::Increment {
                entity,
                field,
                delta,
            } => self.increment(&entity, field, delta)?,
            WriteOp::IncrementProfile {
                profile,
                field,
                delta,
            } => {
                let row = self
                    .profiles
                    .get_mut(&profile)
                    .ok_or_else(|| StoreError::NotFound(format!("Profile:{profile}")))?;
                *row.counter_mut(field) += delta;
            }
            WriteOp::InsertProfile(profile) => {
                if self.profiles.contains_key(&profile.id) {
                    return Err(StoreError::Conflict(format!(
                        "profile {} already exists",
                        profile.id
                    )));
                }
                self.profiles.insert(profile.id.clone(), profile);
            }
            WriteOp::InsertPost(post) => {
                self.posts.insert(post.id.clone(), post);
            }
            WriteOp::InsertComment(comment) => {
                self.comments.insert(comment.id.clone(), comment);
            }
            WriteOp::InsertReply(reply) => {
                self.replies.insert(reply.id.clone(), reply);
            }
            WriteOp::DeletePost { id } => {
                self.posts
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("Post:{id}")))?;
            }
            WriteOp::DeleteComments { ids } => {
                for id in ids {
                    self.comments.remove(&id).ok_or_else(|| {
                        StoreError::Conflict(format!("comment {id} was already removed"))
                    })?;
                }
            }
            WriteOp::DeleteReplies { ids } => {
                for id in ids {
                    self.replies.remove(&id).ok_or_else(|| {
                        StoreError::Conflict(format!("reply {id} was already removed"))
                    })?;
                }
            }
            WriteOp::PutWidget { post, config } => {
                self.widgets.insert(post, config);
            }
            WriteOp::DeleteWidget { post } => {
                self.widgets.remove(&post);
            }
            WriteOp::ExpectComments { post, ids } => {
                let live = self
                    .comments
                    .values()
                    .filter(|c| c.post == post)
                    .map(|c| c.id.clone())
                    .collect();
                ensure_unchanged("comments", live, &ids)?;
            }
            WriteOp::ExpectReplies { comments, ids } => {
                let live = self
                    .replies
                    .values()
                    .filter(|r| comments.contains(&r.comment))
                    .map(|r| r.id.clone())
                    .collect();
                ensure_unchanged("replies", live, &ids)?;
            }
            WriteOp::ExpectEngagements { targets, ids } => {
                let live = self
                    .engagements
                    .values()
                    .filter(|e| targets.contains(&e.target))
                    .map(|e| e.id.clone())
                    .collect();
                ensure_unchanged("engagements", live, &ids)?;
            }
        }
        Ok(())
    }

    fn delete_engagement(&mut self, id: &str) -> Result<(), StoreError> {
        self.engagements
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::Conflict(format!("engagement {id} was already removed")))
    }

    fn increment(
        &mut self,
        entity: &EntityRef,
        field: CounterField,
        delta: i64,
    ) -> Result<(), StoreError> {
        if !field.applies_to(entity.target_type) {
            return Err(StoreError::InvalidCounter {
                field: field.column(),
                entity: entity.to_string(),
            });
        }

        let not_found = || StoreError::NotFound(entity.to_string());
        let (counters, comment_count) = match entity.target_type {
            TargetType::Post => {
                let post = self.posts.get_mut(&entity.id).ok_or_else(not_found)?;
                (&mut post.counters, Some(&mut post.comment_count))
            }
            TargetType::Comment => {
                let comment = self.comments.get_mut(&entity.id).ok_or_else(not_found)?;
                (&mut comment.counters, Some(&mut comment.comment_count))
            }
            TargetType::Reply => {
                let reply = self.replies.get_mut(&entity.id).ok_or_else(not_found)?;
                (&mut reply.counters, None)
            }
        };

        let slot = match field {
            CounterField::Comment => comment_count,
            other => counters.field_mut(other),
        };
        if let Some(value) = slot {
            *value += delta;
        }
        Ok(())
    }

    fn counters(&self, entity: &EntityRef) -> Option<CounterSnapshot> {
        let (engagement, comment_count): (EngagementCounters, Option<i64>) =
            match entity.target_type {
                TargetType::Post => self
                    .posts
                    .get(&entity.id)
                    .map(|p| (p.counters, Some(p.comment_count)))?,
                TargetType::Comment => self
                    .comments
                    .get(&entity.id)
                    .map(|c| (c.counters, Some(c.comment_count)))?,
                TargetType::Reply => self.replies.get(&entity.id).map(|r| (r.counters, None))?,
            };
        Some(CounterSnapshot {
            engagement,
            comment_count,
        })
    }
}

/// In-process store with the same commit semantics as [`crate::store::SqliteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_commits: AtomicBool,
    commit_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail before touching any state
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn commit_calls(&self) -> u64 {
        self.commit_calls.load(Ordering::Relaxed)
    }

    /// Every ledger row, oldest first
    pub async fn all_engagements(&self) -> Vec<Engagement> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state.engagements.values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        records
    }
}

fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn find_engagement(
        &self,
        actor: &str,
        target: &str,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .engagements
            .values()
            .find(|e| e.actor == actor && e.target == target && e.kind == kind)
            .cloned())
    }

    async fn engagements_by_actor(
        &self,
        actor: &str,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError> {
        let state = self.state.lock().await;
        let records = state
            .engagements
            .values()
            .filter(|e| e.actor == actor && targets.contains(&e.target))
            .cloned()
            .collect();
        Ok(sorted(records, |e: &Engagement| (e.created_at, e.id.clone())))
    }

    async fn engagements_for_targets(
        &self,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError> {
        let state = self.state.lock().await;
        let records = state
            .engagements
            .values()
            .filter(|e| targets.contains(&e.target))
            .cloned()
            .collect();
        Ok(sorted(records, |e: &Engagement| (e.created_at, e.id.clone())))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.state.lock().await.profiles.get(id).cloned())
    }

    async fn post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.state.lock().await.posts.get(id).cloned())
    }

    async fn comment(&self, id: &str) -> Result<Option<Comment>, StoreError> {
        Ok(self.state.lock().await.comments.get(id).cloned())
    }

    async fn reply(&self, id: &str) -> Result<Option<Reply>, StoreError> {
        Ok(self.state.lock().await.replies.get(id).cloned())
    }

    async fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, StoreError> {
        let state = self.state.lock().await;
        let comments = state
            .comments
            .values()
            .filter(|c| c.post == post_id)
            .cloned()
            .collect();
        Ok(sorted(comments, |c: &Comment| (c.created_at, c.id.clone())))
    }

    async fn replies_for_comments(
        &self,
        comment_ids: &[String],
    ) -> Result<Vec<Reply>, StoreError> {
        let state = self.state.lock().await;
        let replies = state
            .replies
            .values()
            .filter(|r| comment_ids.contains(&r.comment))
            .cloned()
            .collect();
        Ok(sorted(replies, |r: &Reply| (r.created_at, r.id.clone())))
    }

    async fn widget(&self, post_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.lock().await.widgets.get(post_id).cloned())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn counters(&self, entity: &EntityRef) -> Result<Option<CounterSnapshot>, StoreError> {
        Ok(self.state.lock().await.counters(entity))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.commit_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Task("commit failure injected".to_string()));
        }

        let mut state = self.state.lock().await;
        // Stage on a copy so a failing op leaves nothing behind
        let mut staged = state.clone();
        for op in batch {
            staged.apply(op)?;
        }
        *state = staged;
        Ok(())
    }

    fn backend_tag(&self) -> &'static str {
        "memory"
    }
}
