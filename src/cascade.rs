// SPDX-License-Identifier: MPL-2.0

//! Cascading deletes for posts, comments and replies.
//!
//! A delete runs in two phases. Planning collects the doomed descendants and
//! every ledger row that points at them, then tallies who authored and who
//! engaged. Execution turns the plan into one [`WriteBatch`]: guards that the
//! thread still matches the plan, the deletes, and the compensating
//! decrements that cancel what creation and engagement added. The batch
//! commits as a unit, so a failure leaves nothing applied. A comment, reply or
//! engagement that lands between planning and commit trips a guard; the
//! coordinator then plans again.

use crate::error::{ServiceError, require};
use crate::model::{
    Comment, CounterField, Engagement, EngagementKind, EntityRef, ProfileCounter, Reply,
    TargetType,
};
use crate::projector::CounterProjector;
use crate::store::{ContentStore, EngagementStore, Store, StoreError, WriteBatch, WriteOp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Plans per delete before a changing thread is reported as a conflict
const MAX_ATTEMPTS: u32 = 3;

/// How many live ledger rows of each kind one actor contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementTally {
    pub upvote: i64,
    pub downvote: i64,
    pub bookmark: i64,
    pub repost: i64,
    pub comment: i64,
    pub reply: i64,
}

impl EngagementTally {
    fn add(&mut self, kind: EngagementKind) {
        let slot = match kind {
            EngagementKind::Upvote => &mut self.upvote,
            EngagementKind::Downvote => &mut self.downvote,
            EngagementKind::Bookmark => &mut self.bookmark,
            EngagementKind::Repost => &mut self.repost,
            EngagementKind::Comment => &mut self.comment,
            EngagementKind::Reply => &mut self.reply,
        };
        *slot += 1;
    }
}

/// Everything a cascading delete removes and compensates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadePlan {
    pub root: EntityRef,
    /// Post row to delete along with its widget, for post deletes
    pub post: Option<String>,
    /// Author whose `postCount` drops, for post deletes
    pub post_author: Option<String>,
    pub comments: Vec<String>,
    pub replies: Vec<String>,
    pub engagements: Vec<String>,
    pub actor_tallies: BTreeMap<String, EngagementTally>,
    pub comment_authors: BTreeMap<String, i64>,
    pub reply_authors: BTreeMap<String, i64>,
    /// Upvotes received on the removed content, per recipient
    pub received_upvotes: BTreeMap<String, i64>,
    /// `commentCount` reductions on surviving ancestors
    pub parent_adjustments: Vec<(EntityRef, i64)>,
}

impl CascadePlan {
    fn new(root: EntityRef) -> Self {
        Self {
            root,
            post: None,
            post_author: None,
            comments: Vec::new(),
            replies: Vec::new(),
            engagements: Vec::new(),
            actor_tallies: BTreeMap::new(),
            comment_authors: BTreeMap::new(),
            reply_authors: BTreeMap::new(),
            received_upvotes: BTreeMap::new(),
            parent_adjustments: Vec::new(),
        }
    }

    fn add_comments(&mut self, comments: &[Comment]) {
        for comment in comments {
            self.comments.push(comment.id.clone());
            *self.comment_authors.entry(comment.author.clone()).or_default() += 1;
        }
    }

    fn add_replies(&mut self, replies: &[Reply]) {
        for reply in replies {
            self.replies.push(reply.id.clone());
            *self.reply_authors.entry(reply.author.clone()).or_default() += 1;
        }
    }

    fn add_engagements(&mut self, records: &[Engagement]) {
        for record in records {
            self.engagements.push(record.id.clone());
            self.actor_tallies
                .entry(record.actor.clone())
                .or_default()
                .add(record.kind);
            if record.kind == EngagementKind::Upvote {
                *self
                    .received_upvotes
                    .entry(record.recipient.clone())
                    .or_default() += 1;
            }
        }
    }

    /// Ids of every entity whose ledger rows go with the plan
    fn targets(&self) -> Vec<String> {
        self.post
            .iter()
            .chain(&self.comments)
            .chain(&self.replies)
            .cloned()
            .collect()
    }

    /// Guards, then deletes, then compensating decrements
    pub fn to_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();

        if let Some(post) = &self.post {
            batch.push(WriteOp::ExpectComments {
                post: post.clone(),
                ids: self.comments.clone(),
            });
        }
        if !self.comments.is_empty() {
            batch.push(WriteOp::ExpectReplies {
                comments: self.comments.clone(),
                ids: self.replies.clone(),
            });
        }
        batch.push(WriteOp::ExpectEngagements {
            targets: self.targets(),
            ids: self.engagements.clone(),
        });

        batch.delete_engagements(self.engagements.clone());
        batch.delete_replies(self.replies.clone());
        batch.delete_comments(self.comments.clone());
        if let Some(post) = &self.post {
            batch.push(WriteOp::DeletePost { id: post.clone() });
            batch.push(WriteOp::DeleteWidget { post: post.clone() });
        }

        for (parent, removed) in &self.parent_adjustments {
            batch.increment(parent, CounterField::Comment, -removed);
        }
        if let Some(author) = &self.post_author {
            CounterProjector::stage_profile_delta(&mut batch, author, ProfileCounter::Post, -1);
        }
        for (author, count) in &self.comment_authors {
            CounterProjector::stage_profile_delta(
                &mut batch,
                author,
                ProfileCounter::Comment,
                -count,
            );
        }
        for (author, count) in &self.reply_authors {
            CounterProjector::stage_profile_delta(
                &mut batch,
                author,
                ProfileCounter::Reply,
                -count,
            );
        }
        for (recipient, count) in &self.received_upvotes {
            CounterProjector::stage_profile_delta(
                &mut batch,
                recipient,
                ProfileCounter::Upvote,
                -count,
            );
        }

        batch
    }
}

/// Summary of a completed cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub root: EntityRef,
    pub comments: usize,
    pub replies: usize,
    pub engagements: usize,
}

impl CascadeReport {
    pub fn message(&self) -> String {
        format!(
            "{} deleted with {} comments, {} replies and {} engagements",
            self.root.target_type, self.comments, self.replies, self.engagements
        )
    }
}

#[derive(Clone)]
pub struct CascadeCoordinator {
    store: Arc<dyn Store>,
}

impl CascadeCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn plan_post_delete(&self, post_id: &str) -> Result<CascadePlan, ServiceError> {
        let post_id = require("postId", post_id)?;
        let post = self
            .store
            .post(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post:{post_id}")))?;

        let mut plan = CascadePlan::new(EntityRef::post(&post.id));
        plan.post = Some(post.id.clone());
        plan.post_author = Some(post.author.clone());

        let comments = self.store.comments_for_post(&post.id).await?;
        plan.add_comments(&comments);
        let replies = self.store.replies_for_comments(&plan.comments).await?;
        plan.add_replies(&replies);

        let records = self.store.engagements_for_targets(&plan.targets()).await?;
        plan.add_engagements(&records);

        Ok(plan)
    }

    pub async fn plan_comment_delete(&self, comment_id: &str) -> Result<CascadePlan, ServiceError> {
        let comment_id = require("commentId", comment_id)?;
        let comment = self
            .store
            .comment(comment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Comment:{comment_id}")))?;

        let mut plan = CascadePlan::new(EntityRef::comment(&comment.id));
        plan.add_comments(std::slice::from_ref(&comment));
        let replies = self.store.replies_for_comments(&plan.comments).await?;
        plan.add_replies(&replies);
        plan.parent_adjustments
            .push((EntityRef::post(&comment.post), 1 + replies.len() as i64));

        let records = self.store.engagements_for_targets(&plan.targets()).await?;
        plan.add_engagements(&records);

        Ok(plan)
    }

    pub async fn plan_reply_delete(&self, reply_id: &str) -> Result<CascadePlan, ServiceError> {
        let reply_id = require("replyId", reply_id)?;
        let reply = self
            .store
            .reply(reply_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Reply:{reply_id}")))?;

        let mut plan = CascadePlan::new(EntityRef::reply(&reply.id));
        plan.add_replies(std::slice::from_ref(&reply));
        plan.parent_adjustments
            .push((EntityRef::comment(&reply.comment), 1));
        plan.parent_adjustments.push((EntityRef::post(&reply.post), 1));

        let records = self.store.engagements_for_targets(&plan.targets()).await?;
        plan.add_engagements(&records);

        Ok(plan)
    }

    /// Delete a post with all of its comments, replies, ledger rows and widget
    pub async fn delete_post(&self, post_id: &str) -> Result<CascadeReport, ServiceError> {
        self.delete(EntityRef::post(post_id)).await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<CascadeReport, ServiceError> {
        self.delete(EntityRef::comment(comment_id)).await
    }

    pub async fn delete_reply(&self, reply_id: &str) -> Result<CascadeReport, ServiceError> {
        self.delete(EntityRef::reply(reply_id)).await
    }

    async fn plan(&self, root: &EntityRef) -> Result<CascadePlan, ServiceError> {
        match root.target_type {
            TargetType::Post => self.plan_post_delete(&root.id).await,
            TargetType::Comment => self.plan_comment_delete(&root.id).await,
            TargetType::Reply => self.plan_reply_delete(&root.id).await,
        }
    }

    /// Plan and commit, planning again when the thread moved underneath
    async fn delete(&self, root: EntityRef) -> Result<CascadeReport, ServiceError> {
        let mut attempt = 1;
        loop {
            let plan = self.plan(&root).await?;
            match self.execute(plan).await {
                Err(ServiceError::Store(StoreError::Conflict(reason)))
                    if attempt < MAX_ATTEMPTS =>
                {
                    warn!(%root, attempt, %reason, "thread changed during cascade, replanning");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn execute(&self, plan: CascadePlan) -> Result<CascadeReport, ServiceError> {
        let batch = plan.to_batch();
        self.store.commit(batch).await?;

        let report = CascadeReport {
            root: plan.root,
            comments: plan.comments.len(),
            replies: plan.replies.len(),
            engagements: plan.engagements.len(),
        };
        info!(
            root = %report.root,
            comments = report.comments,
            replies = report.replies,
            engagements = report.engagements,
            actors = plan.actor_tallies.len(),
            "cascade delete committed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentService;
    use crate::ledger::{EngagementLedger, ToggleRequest};
    use crate::model::{Post, Profile};
    use crate::store::{MemoryStore, SqliteStore};

    struct Fixture {
        store: Arc<dyn Store>,
        content: ContentService,
        ledger: EngagementLedger,
        cascade: CascadeCoordinator,
    }

    async fn fixture(store: Arc<dyn Store>) -> Fixture {
        let content = ContentService::new(store.clone());
        for id in ["alice", "bob", "dana", "erin"] {
            content.register_profile(id, id).await.unwrap();
        }
        Fixture {
            ledger: EngagementLedger::new(store.clone()),
            cascade: CascadeCoordinator::new(store.clone()),
            content,
            store,
        }
    }

    async fn profiles(store: &dyn Store) -> Vec<Profile> {
        let mut out = Vec::new();
        for id in ["alice", "bob", "dana", "erin"] {
            out.push(store.profile(id).await.unwrap().unwrap());
        }
        out
    }

    async fn toggle(
        f: &Fixture,
        actor: &str,
        entity: &EntityRef,
        recipient: &str,
        kind: EngagementKind,
    ) {
        f.ledger
            .toggle(&ToggleRequest {
                actor: actor.to_string(),
                target: entity.id.clone(),
                recipient: recipient.to_string(),
                target_type: entity.target_type,
                kind,
            })
            .await
            .unwrap();
    }

    /// Post P by bob, comment C by dana, reply R by erin, engagement on all three
    async fn busy_thread(f: &Fixture) -> (Post, Comment, Reply) {
        let post = f
            .content
            .create_post("bob", "Kiosk coworking", "Desks in malls")
            .await
            .unwrap();
        let comment = f
            .content
            .create_comment("dana", &post.id, "Noise?")
            .await
            .unwrap();
        let reply = f
            .content
            .create_reply("erin", &comment.id, "Booths")
            .await
            .unwrap();

        let p = EntityRef::post(&post.id);
        let c = EntityRef::comment(&comment.id);
        let r = EntityRef::reply(&reply.id);
        toggle(f, "alice", &p, "bob", EngagementKind::Upvote).await;
        toggle(f, "alice", &p, "bob", EngagementKind::Bookmark).await;
        toggle(f, "erin", &p, "bob", EngagementKind::Repost).await;
        toggle(f, "dana", &p, "bob", EngagementKind::Downvote).await;
        toggle(f, "alice", &c, "dana", EngagementKind::Upvote).await;
        toggle(f, "bob", &c, "dana", EngagementKind::Upvote).await;
        toggle(f, "bob", &r, "erin", EngagementKind::Upvote).await;
        toggle(f, "dana", &r, "erin", EngagementKind::Downvote).await;
        (post, comment, reply)
    }

    async fn assert_post_cascade_conserves(store: Arc<dyn Store>) {
        let f = fixture(store).await;
        let before = profiles(f.store.as_ref()).await;

        let (post, comment, reply) = busy_thread(&f).await;
        assert_ne!(profiles(f.store.as_ref()).await, before);

        let report = f.cascade.delete_post(&post.id).await.unwrap();
        assert_eq!(report.comments, 1);
        assert_eq!(report.replies, 1);
        // 8 toggles plus the comment and reply notifications
        assert_eq!(report.engagements, 10);

        assert_eq!(profiles(f.store.as_ref()).await, before);
        let leftover = f
            .store
            .engagements_for_targets(&[post.id.clone(), comment.id.clone(), reply.id.clone()])
            .await
            .unwrap();
        assert!(leftover.is_empty());
        assert!(f.store.post(&post.id).await.unwrap().is_none());
        assert!(f.store.comment(&comment.id).await.unwrap().is_none());
        assert!(f.store.reply(&reply.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_cascade_restores_profiles_memory() {
        assert_post_cascade_conserves(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_post_cascade_restores_profiles_sqlite() {
        assert_post_cascade_conserves(Arc::new(SqliteStore::open_in_memory().unwrap())).await;
    }

    /// A comment written after planning must stop the stale plan, and a fresh
    /// delete must take the new comment with it
    async fn assert_late_comment_is_not_orphaned(store: Arc<dyn Store>) {
        let f = fixture(store).await;
        let before = profiles(f.store.as_ref()).await;
        let (post, _comment, _reply) = busy_thread(&f).await;

        let plan = f.cascade.plan_post_delete(&post.id).await.unwrap();
        let late = f
            .content
            .create_comment("alice", &post.id, "Still open?")
            .await
            .unwrap();

        let err = f.store.commit(plan.to_batch()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "{err}");
        assert!(f.store.post(&post.id).await.unwrap().is_some());
        assert_eq!(
            f.store.profile("alice").await.unwrap().unwrap().comment_count,
            1
        );

        let report = f.cascade.delete_post(&post.id).await.unwrap();
        assert_eq!(report.comments, 2);
        assert!(f.store.comment(&late.id).await.unwrap().is_none());
        let leftover = f
            .store
            .engagements_for_targets(std::slice::from_ref(&late.id))
            .await
            .unwrap();
        assert!(leftover.is_empty());
        assert_eq!(profiles(f.store.as_ref()).await, before);
    }

    #[tokio::test]
    async fn test_late_comment_is_not_orphaned_memory() {
        assert_late_comment_is_not_orphaned(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_late_comment_is_not_orphaned_sqlite() {
        assert_late_comment_is_not_orphaned(Arc::new(SqliteStore::open_in_memory().unwrap()))
            .await;
    }

    #[tokio::test]
    async fn test_late_reply_and_toggle_fail_stale_comment_plan() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let (_post, comment, _reply) = busy_thread(&f).await;

        let plan = f.cascade.plan_comment_delete(&comment.id).await.unwrap();
        f.content
            .create_reply("alice", &comment.id, "Quiet hours")
            .await
            .unwrap();
        let err = f.store.commit(plan.to_batch()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let plan = f.cascade.plan_comment_delete(&comment.id).await.unwrap();
        toggle(
            &f,
            "erin",
            &EntityRef::comment(&comment.id),
            "dana",
            EngagementKind::Bookmark,
        )
        .await;
        let err = f.store.commit(plan.to_batch()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let report = f.cascade.delete_comment(&comment.id).await.unwrap();
        assert_eq!(report.replies, 2);
        let erin = f.store.profile("erin").await.unwrap().unwrap();
        assert_eq!(erin.reply_count, 0);
    }

    #[tokio::test]
    async fn test_post_plan_tallies_actors_and_authors() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let (post, _comment, _reply) = busy_thread(&f).await;

        let plan = f.cascade.plan_post_delete(&post.id).await.unwrap();
        assert_eq!(plan.post_author.as_deref(), Some("bob"));
        assert_eq!(plan.comment_authors.get("dana"), Some(&1));
        assert_eq!(plan.reply_authors.get("erin"), Some(&1));
        assert_eq!(plan.actor_tallies["alice"].upvote, 2);
        assert_eq!(plan.actor_tallies["alice"].bookmark, 1);
        assert_eq!(plan.actor_tallies["bob"].upvote, 2);
        assert_eq!(plan.actor_tallies["dana"].downvote, 2);
        assert_eq!(plan.actor_tallies["dana"].comment, 1);
        assert_eq!(plan.actor_tallies["erin"].repost, 1);
        assert_eq!(plan.received_upvotes.get("bob"), Some(&1));
        assert_eq!(plan.received_upvotes.get("dana"), Some(&2));
        assert_eq!(plan.received_upvotes.get("erin"), Some(&1));
    }

    #[tokio::test]
    async fn test_widget_goes_with_post() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let post = f
            .content
            .create_post("bob", "Bike valet", "Event parking")
            .await
            .unwrap();
        f.content
            .set_widget(&post.id, serde_json::json!({ "cta": "join" }))
            .await
            .unwrap();

        f.cascade.delete_post(&post.id).await.unwrap();
        assert!(f.store.widget(&post.id).await.unwrap().is_none());
        assert_eq!(f.store.profile("bob").await.unwrap().unwrap().post_count, 0);
    }

    #[tokio::test]
    async fn test_comment_cascade_adjusts_post_and_authors() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let (post, comment, reply) = busy_thread(&f).await;
        let second = f
            .content
            .create_comment("erin", &post.id, "Love it")
            .await
            .unwrap();

        let report = f.cascade.delete_comment(&comment.id).await.unwrap();
        assert_eq!(report.replies, 1);

        let post = f.store.post(&post.id).await.unwrap().unwrap();
        assert_eq!(post.comment_count, 1);
        // Post engagement is untouched
        assert_eq!(post.counters.upvote_count, 1);

        let dana = f.store.profile("dana").await.unwrap().unwrap();
        assert_eq!(dana.comment_count, 0);
        assert_eq!(dana.upvote_count, 0);
        let erin = f.store.profile("erin").await.unwrap().unwrap();
        assert_eq!(erin.reply_count, 0);
        assert_eq!(erin.comment_count, 1);
        assert_eq!(erin.upvote_count, 0);

        let leftover = f
            .store
            .engagements_for_targets(&[comment.id.clone(), reply.id.clone()])
            .await
            .unwrap();
        assert!(leftover.is_empty());
        assert!(f.store.comment(&second.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reply_cascade_adjusts_both_ancestors() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let (post, comment, reply) = busy_thread(&f).await;

        f.cascade.delete_reply(&reply.id).await.unwrap();

        assert_eq!(f.store.post(&post.id).await.unwrap().unwrap().comment_count, 1);
        assert_eq!(
            f.store.comment(&comment.id).await.unwrap().unwrap().comment_count,
            0
        );
        let erin = f.store.profile("erin").await.unwrap().unwrap();
        assert_eq!(erin.reply_count, 0);
        assert_eq!(erin.upvote_count, 0);
    }

    #[tokio::test]
    async fn test_failed_cascade_leaves_everything_in_place() {
        let memory = Arc::new(MemoryStore::new());
        let f = fixture(memory.clone()).await;
        let (post, comment, _reply) = busy_thread(&f).await;
        let before = profiles(f.store.as_ref()).await;
        let ledger_rows = memory.all_engagements().await.len();

        memory.set_fail_commits(true);
        assert!(f.cascade.delete_post(&post.id).await.is_err());
        memory.set_fail_commits(false);

        assert_eq!(profiles(f.store.as_ref()).await, before);
        assert_eq!(memory.all_engagements().await.len(), ledger_rows);
        assert!(f.store.comment(&comment.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let f = fixture(Arc::new(MemoryStore::new())).await;
        let err = f.cascade.delete_post("nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = f.cascade.delete_comment("nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_report_message_names_root() {
        let report = CascadeReport {
            root: EntityRef {
                target_type: TargetType::Comment,
                id: "c1".to_string(),
            },
            comments: 1,
            replies: 2,
            engagements: 3,
        };
        assert_eq!(
            report.message(),
            "Comment deleted with 1 comments, 2 replies and 3 engagements"
        );
    }
}
