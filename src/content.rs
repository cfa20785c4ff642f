// SPDX-License-Identifier: MPL-2.0

//! Profiles, posts, comments and replies.
//!
//! Creation applies the counter increments that the cascade coordinator later
//! cancels: author `postCount`/`commentCount`/`replyCount`, and the parent
//! `commentCount` for every comment and reply below it.

use crate::error::{ServiceError, require};
use crate::ledger::EngagementLedger;
use crate::model::{Comment, CounterField, EntityRef, Post, Profile, ProfileCounter, Reply};
use crate::projector::CounterProjector;
use crate::store::{ContentStore, Store, WriteBatch, WriteOp};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn Store>,
}

impl ContentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register_profile(&self, id: &str, name: &str) -> Result<Profile, ServiceError> {
        let profile = Profile::new(require("id", id)?, require("name", name)?);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertProfile(profile.clone()));
        self.store.commit(batch).await?;

        info!(profile = %profile.id, "profile registered");
        Ok(profile)
    }

    pub async fn create_post(
        &self,
        author: &str,
        title: &str,
        body: &str,
    ) -> Result<Post, ServiceError> {
        let author = require("author", author)?;
        let title = require("title", title)?;
        self.require_profile(author).await?;

        let post = Post::new(author, title, body);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertPost(post.clone()));
        CounterProjector::stage_profile_delta(&mut batch, author, ProfileCounter::Post, 1);
        self.store.commit(batch).await?;

        info!(post = %post.id, author, "post created");
        Ok(post)
    }

    pub async fn create_comment(
        &self,
        author: &str,
        post_id: &str,
        body: &str,
    ) -> Result<Comment, ServiceError> {
        let author = require("author", author)?;
        let body = require("body", body)?;
        self.require_profile(author).await?;
        let post = self.post(require("postId", post_id)?).await?;

        let comment = Comment::new(&post.id, author, body);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertComment(comment.clone()));
        batch.increment(&EntityRef::post(&post.id), CounterField::Comment, 1);
        CounterProjector::stage_profile_delta(&mut batch, author, ProfileCounter::Comment, 1);
        let record = EngagementLedger::comment_engagement(author, &comment.id, &post.author);
        if let Some(record) = record {
            batch.insert_engagement(record);
        }
        self.store.commit(batch).await?;

        info!(comment = %comment.id, post = %post.id, author, "comment created");
        Ok(comment)
    }

    pub async fn create_reply(
        &self,
        author: &str,
        comment_id: &str,
        body: &str,
    ) -> Result<Reply, ServiceError> {
        let author = require("author", author)?;
        let body = require("body", body)?;
        self.require_profile(author).await?;
        let comment = self.comment(require("commentId", comment_id)?).await?;

        let reply = Reply::new(&comment, author, body);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertReply(reply.clone()));
        batch.increment(&EntityRef::comment(&comment.id), CounterField::Comment, 1);
        batch.increment(&EntityRef::post(&comment.post), CounterField::Comment, 1);
        CounterProjector::stage_profile_delta(&mut batch, author, ProfileCounter::Reply, 1);
        let record = EngagementLedger::reply_engagement(author, &reply.id, &comment.author);
        if let Some(record) = record {
            batch.insert_engagement(record);
        }
        self.store.commit(batch).await?;

        info!(reply = %reply.id, comment = %comment.id, author, "reply created");
        Ok(reply)
    }

    /// Replace the widget configuration attached to a post
    pub async fn set_widget(
        &self,
        post_id: &str,
        config: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let post = self.post(require("postId", post_id)?).await?;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutWidget {
            post: post.id,
            config,
        });
        self.store.commit(batch).await?;
        Ok(())
    }

    pub async fn profile(&self, id: &str) -> Result<Profile, ServiceError> {
        self.store
            .profile(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Profile:{id}")))
    }

    pub async fn post(&self, id: &str) -> Result<Post, ServiceError> {
        self.store
            .post(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post:{id}")))
    }

    pub async fn comment(&self, id: &str) -> Result<Comment, ServiceError> {
        self.store
            .comment(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Comment:{id}")))
    }

    async fn require_profile(&self, id: &str) -> Result<(), ServiceError> {
        self.profile(id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EngagementKind, TargetType};
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, ContentService) {
        let store = Arc::new(MemoryStore::new());
        let content = ContentService::new(store.clone());
        for (id, name) in [("bob", "Bob"), ("dana", "Dana"), ("erin", "Erin")] {
            content.register_profile(id, name).await.unwrap();
        }
        (store, content)
    }

    #[tokio::test]
    async fn test_post_creation_counts_for_author() {
        let (_store, content) = setup().await;
        content
            .create_post("bob", "Laundry lockers", "24h drop-off")
            .await
            .unwrap();
        assert_eq!(content.profile("bob").await.unwrap().post_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_author_cannot_post() {
        let (_store, content) = setup().await;
        let err = content
            .create_post("mallory", "Spam", "...")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_profile_is_a_conflict() {
        let (_store, content) = setup().await;
        let err = content.register_profile("bob", "Bobby").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Store(crate::store::StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_and_reply_bump_counters_and_ledger() {
        let (store, content) = setup().await;
        let post = content
            .create_post("bob", "Tool library", "Borrow a drill")
            .await
            .unwrap();
        let comment = content
            .create_comment("dana", &post.id, "Insurance?")
            .await
            .unwrap();
        content
            .create_reply("erin", &comment.id, "Deposit model")
            .await
            .unwrap();

        let post = content.post(&post.id).await.unwrap();
        assert_eq!(post.comment_count, 2);
        assert_eq!(content.comment(&comment.id).await.unwrap().comment_count, 1);
        assert_eq!(content.profile("dana").await.unwrap().comment_count, 1);
        assert_eq!(content.profile("erin").await.unwrap().reply_count, 1);

        let records = store.all_engagements().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.kind == EngagementKind::Comment
            && r.target == comment.id
            && r.target_type == TargetType::Comment
            && r.recipient == "bob"));
        assert!(records
            .iter()
            .any(|r| r.kind == EngagementKind::Reply && r.recipient == "dana"));
    }

    #[tokio::test]
    async fn test_commenting_on_own_post_records_no_engagement() {
        let (store, content) = setup().await;
        let post = content
            .create_post("bob", "Meal prep", "Weekly boxes")
            .await
            .unwrap();
        content
            .create_comment("bob", &post.id, "Pricing soon")
            .await
            .unwrap();

        assert!(store.all_engagements().await.is_empty());
        assert_eq!(content.post(&post.id).await.unwrap().comment_count, 1);
    }

    #[tokio::test]
    async fn test_widget_requires_existing_post() {
        let (store, content) = setup().await;
        let err = content
            .set_widget("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let post = content
            .create_post("bob", "Pop-up cinema", "Rooftops")
            .await
            .unwrap();
        content
            .set_widget(&post.id, serde_json::json!({ "poll": true }))
            .await
            .unwrap();
        assert!(store.widget(&post.id).await.unwrap().is_some());
    }
}
