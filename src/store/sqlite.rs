// SPDX-License-Identifier: MPL-2.0

use crate::model::{
    Comment, CounterSnapshot, Engagement, EngagementKind, EntityRef, Post, Profile, Reply,
};
use crate::store::content::ContentTable;
use crate::store::engagements::EngagementTable;
use crate::store::profiles::ProfileTable;
use crate::store::{
    ContentStore, CounterStore, Db, EngagementStore, Store, StoreError, WriteBatch, WriteOp,
};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// SQLite-backed store. Blocking calls run on the tokio blocking pool and
/// every batch commits inside a single transaction.
#[derive(Clone)]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Db::open_in_memory()?))
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.conn()?;
            f(&*conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Evaluate `f` inside a transaction that is only committed if it succeeds
    async fn transact<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Connection) -> Result<(), StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.conn()?;
            let tx = conn.transaction()?;
            f(&*tx)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn apply(conn: &Connection, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::InsertEngagement(record) => EngagementTable::new(conn).insert(&record),
        WriteOp::DeleteEngagement { id } => EngagementTable::new(conn).delete(&id),
        WriteOp::DeleteEngagements { ids } => EngagementTable::new(conn).delete_many(&ids),
        WriteOp::Increment {
            entity,
            field,
            delta,
        } => ContentTable::new(conn).increment(&entity, field, delta),
        WriteOp::IncrementProfile {
            profile,
            field,
            delta,
        } => ProfileTable::new(conn).increment(&profile, field, delta),
        WriteOp::InsertProfile(profile) => ProfileTable::new(conn).insert(&profile),
        WriteOp::InsertPost(post) => ContentTable::new(conn).insert_post(&post),
        WriteOp::InsertComment(comment) => ContentTable::new(conn).insert_comment(&comment),
        WriteOp::InsertReply(reply) => ContentTable::new(conn).insert_reply(&reply),
        WriteOp::DeletePost { id } => ContentTable::new(conn).delete_post(&id),
        WriteOp::DeleteComments { ids } => ContentTable::new(conn).delete_comments(&ids),
        WriteOp::DeleteReplies { ids } => ContentTable::new(conn).delete_replies(&ids),
        WriteOp::PutWidget { post, config } => ContentTable::new(conn).put_widget(&post, &config),
        WriteOp::DeleteWidget { post } => ContentTable::new(conn).delete_widget(&post),
        WriteOp::ExpectComments { post, ids } => {
            ContentTable::new(conn).expect_comments(&post, &ids)
        }
        WriteOp::ExpectReplies { comments, ids } => {
            ContentTable::new(conn).expect_replies(&comments, &ids)
        }
        WriteOp::ExpectEngagements { targets, ids } => {
            EngagementTable::new(conn).expect_on_targets(&targets, &ids)
        }
    }
}

#[async_trait]
impl EngagementStore for SqliteStore {
    async fn find_engagement(
        &self,
        actor: &str,
        target: &str,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>, StoreError> {
        let (actor, target) = (actor.to_string(), target.to_string());
        self.read(move |conn| EngagementTable::new(conn).find(&actor, &target, kind))
            .await
    }

    async fn engagements_by_actor(
        &self,
        actor: &str,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError> {
        let (actor, targets) = (actor.to_string(), targets.to_vec());
        self.read(move |conn| EngagementTable::new(conn).by_actor(&actor, &targets))
            .await
    }

    async fn engagements_for_targets(
        &self,
        targets: &[String],
    ) -> Result<Vec<Engagement>, StoreError> {
        let targets = targets.to_vec();
        self.read(move |conn| EngagementTable::new(conn).for_targets(&targets))
            .await
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let id = id.to_string();
        self.read(move |conn| ProfileTable::new(conn).get(&id)).await
    }

    async fn post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let id = id.to_string();
        self.read(move |conn| ContentTable::new(conn).post(&id)).await
    }

    async fn comment(&self, id: &str) -> Result<Option<Comment>, StoreError> {
        let id = id.to_string();
        self.read(move |conn| ContentTable::new(conn).comment(&id))
            .await
    }

    async fn reply(&self, id: &str) -> Result<Option<Reply>, StoreError> {
        let id = id.to_string();
        self.read(move |conn| ContentTable::new(conn).reply(&id)).await
    }

    async fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, StoreError> {
        let post_id = post_id.to_string();
        self.read(move |conn| ContentTable::new(conn).comments_for_post(&post_id))
            .await
    }

    async fn replies_for_comments(
        &self,
        comment_ids: &[String],
    ) -> Result<Vec<Reply>, StoreError> {
        let comment_ids = comment_ids.to_vec();
        self.read(move |conn| ContentTable::new(conn).replies_for_comments(&comment_ids))
            .await
    }

    async fn widget(&self, post_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let post_id = post_id.to_string();
        self.read(move |conn| ContentTable::new(conn).widget(&post_id))
            .await
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn counters(&self, entity: &EntityRef) -> Result<Option<CounterSnapshot>, StoreError> {
        let entity = entity.clone();
        self.read(move |conn| ContentTable::new(conn).counters(&entity))
            .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        self.transact(move |conn| {
            for op in batch {
                apply(conn, op)?;
            }
            Ok(())
        })
        .await?;

        debug!(ops, "committed write batch");
        Ok(())
    }

    fn backend_tag(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CounterField, ProfileCounter, TargetType};

    fn seeded() -> (SqliteStore, Post) {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = Post::new("bob", "Solar kiosks", "Rent-to-own panels");
        {
            let conn = store.db.conn().unwrap();
            ProfileTable::new(&conn)
                .insert(&Profile::new("bob", "Bob"))
                .unwrap();
            ProfileTable::new(&conn)
                .insert(&Profile::new("alice", "Alice"))
                .unwrap();
            ContentTable::new(&conn).insert_post(&post).unwrap();
        }
        (store, post)
    }

    #[tokio::test]
    async fn test_batch_commits_ledger_and_counters_together() {
        let (store, post) = seeded();
        let record = Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Upvote,
        );

        let mut batch = WriteBatch::new();
        batch.insert_engagement(record.clone());
        batch.increment(&EntityRef::post(&post.id), CounterField::Upvote, 1);
        batch.increment_profile("bob", ProfileCounter::Upvote, 1);
        store.commit(batch).await.unwrap();

        let found = store
            .find_engagement("alice", &post.id, EngagementKind::Upvote)
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));
        let stored = store.post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.counters.upvote_count, 1);
        assert_eq!(store.profile("bob").await.unwrap().unwrap().upvote_count, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let (store, post) = seeded();
        let record = Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Bookmark,
        );

        let mut batch = WriteBatch::new();
        batch.insert_engagement(record);
        batch.increment(&EntityRef::post(&post.id), CounterField::Bookmark, 1);
        // Missing profile aborts the whole batch
        batch.increment_profile("nobody", ProfileCounter::Upvote, 1);

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let found = store
            .find_engagement("alice", &post.id, EngagementKind::Bookmark)
            .await
            .unwrap();
        assert!(found.is_none());
        let stored = store.post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.counters.bookmark_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_engagement_is_a_conflict() {
        let (store, post) = seeded();
        let first = Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Repost,
        );
        let second = Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Repost,
        );

        let mut batch = WriteBatch::new();
        batch.insert_engagement(first);
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.insert_engagement(second);
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_deleting_missing_engagement_is_a_conflict() {
        let (store, _post) = seeded();
        let mut batch = WriteBatch::new();
        batch.delete_engagement("no-such-record");
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reply_has_no_comment_counter() {
        let (store, _post) = seeded();
        let mut batch = WriteBatch::new();
        batch.increment(&EntityRef::reply("r1"), CounterField::Comment, 1);
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidCounter { .. }));
    }

    #[tokio::test]
    async fn test_engagements_by_actor_filters_targets() {
        let (store, post) = seeded();
        let comments: Vec<String> = (0..3).map(|i| format!("c{i}")).collect();
        let replies: Vec<String> = (0..3).map(|i| format!("r{i}")).collect();

        let mut batch = WriteBatch::new();
        batch.insert_engagement(Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Upvote,
        ));
        batch.insert_engagement(Engagement::new(
            "alice",
            &comments[1],
            TargetType::Comment,
            "bob",
            EngagementKind::Downvote,
        ));
        batch.insert_engagement(Engagement::new(
            "alice",
            &replies[2],
            TargetType::Reply,
            "bob",
            EngagementKind::Upvote,
        ));
        batch.insert_engagement(Engagement::new(
            "alice",
            "elsewhere",
            TargetType::Post,
            "bob",
            EngagementKind::Upvote,
        ));
        batch.insert_engagement(Engagement::new(
            "bob",
            &comments[0],
            TargetType::Comment,
            "bob",
            EngagementKind::Bookmark,
        ));
        store.commit(batch).await.unwrap();

        let mut targets = vec![post.id.clone()];
        targets.extend(comments.iter().cloned());
        targets.extend(replies.iter().cloned());

        let records = store.engagements_by_actor("alice", &targets).await.unwrap();
        let mut held: Vec<_> = records
            .iter()
            .map(|r| (r.target.as_str(), r.kind))
            .collect();
        held.sort();
        let mut expected = vec![
            ("c1", EngagementKind::Downvote),
            (post.id.as_str(), EngagementKind::Upvote),
            ("r2", EngagementKind::Upvote),
        ];
        expected.sort();
        assert_eq!(held, expected);

        let all = store.engagements_for_targets(&targets).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_large_target_lists_are_split_across_queries() {
        let (store, post) = seeded();
        let mut targets: Vec<String> = (0..40_000).map(|i| format!("r{i}")).collect();
        targets.push(post.id.clone());

        let mut batch = WriteBatch::new();
        for target in [&targets[0], &targets[20_000]] {
            batch.insert_engagement(Engagement::new(
                "alice",
                target,
                TargetType::Reply,
                "bob",
                EngagementKind::Bookmark,
            ));
        }
        batch.insert_engagement(Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Bookmark,
        ));
        store.commit(batch).await.unwrap();

        let held = store.engagements_by_actor("alice", &targets).await.unwrap();
        assert_eq!(held.len(), 3);
        assert!(held.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let all = store.engagements_for_targets(&targets).await.unwrap();
        assert_eq!(all.len(), 3);
        let replies = store.replies_for_comments(&targets).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_opposite_votes_share_one_slot() {
        let (store, post) = seeded();
        let mut batch = WriteBatch::new();
        batch.insert_engagement(Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Upvote,
        ));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.insert_engagement(Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Downvote,
        ));
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // A bookmark lives in its own slot
        let mut batch = WriteBatch::new();
        batch.insert_engagement(Engagement::new(
            "alice",
            &post.id,
            TargetType::Post,
            "bob",
            EngagementKind::Bookmark,
        ));
        store.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_expected_comments_guard_fails_the_batch() {
        let (store, post) = seeded();
        let comment = Comment::new(&post.id, "alice", "Which towns?");
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertComment(comment.clone()));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::ExpectComments {
            post: post.id.clone(),
            ids: Vec::new(),
        });
        batch.push(WriteOp::DeletePost {
            id: post.id.clone(),
        });
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.post(&post.id).await.unwrap().is_some());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::ExpectComments {
            post: post.id.clone(),
            ids: vec![comment.id.clone()],
        });
        batch.push(WriteOp::ExpectReplies {
            comments: vec![comment.id.clone()],
            ids: Vec::new(),
        });
        batch.push(WriteOp::ExpectEngagements {
            targets: vec![post.id.clone(), comment.id.clone()],
            ids: Vec::new(),
        });
        store.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_widget_round_trip_and_delete() {
        let (store, post) = seeded();
        let config = serde_json::json!({ "layout": "grid", "items": 3 });

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutWidget {
            post: post.id.clone(),
            config: config.clone(),
        });
        store.commit(batch).await.unwrap();
        assert_eq!(store.widget(&post.id).await.unwrap(), Some(config));

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::DeleteWidget {
            post: post.id.clone(),
        });
        store.commit(batch).await.unwrap();
        assert_eq!(store.widget(&post.id).await.unwrap(), None);
    }
}
