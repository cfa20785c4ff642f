// SPDX-License-Identifier: MPL-2.0

use crate::model::{
    Comment, CounterField, DeltaMap, Engagement, EntityRef, Post, Profile, ProfileCounter, Reply,
};

/// One mutation inside a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertEngagement(Engagement),
    /// Fails the batch if the record is already gone
    DeleteEngagement { id: String },
    /// Fails the batch unless every listed record is deleted
    DeleteEngagements { ids: Vec<String> },
    Increment {
        entity: EntityRef,
        field: CounterField,
        delta: i64,
    },
    IncrementProfile {
        profile: String,
        field: ProfileCounter,
        delta: i64,
    },
    InsertProfile(Profile),
    InsertPost(Post),
    InsertComment(Comment),
    InsertReply(Reply),
    DeletePost { id: String },
    DeleteComments { ids: Vec<String> },
    DeleteReplies { ids: Vec<String> },
    PutWidget {
        post: String,
        config: serde_json::Value,
    },
    /// Missing widgets are not an error
    DeleteWidget { post: String },
    /// Fails the batch unless the post's comments are exactly `ids`
    ExpectComments { post: String, ids: Vec<String> },
    /// Fails the batch unless the replies to `comments` are exactly `ids`
    ExpectReplies { comments: Vec<String>, ids: Vec<String> },
    /// Fails the batch unless the ledger rows on `targets` are exactly `ids`
    ExpectEngagements { targets: Vec<String>, ids: Vec<String> },
}

/// Ordered list of writes committed as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn insert_engagement(&mut self, record: Engagement) {
        self.push(WriteOp::InsertEngagement(record));
    }

    pub fn delete_engagement(&mut self, id: &str) {
        self.push(WriteOp::DeleteEngagement { id: id.to_string() });
    }

    pub fn delete_engagements(&mut self, ids: Vec<String>) {
        if !ids.is_empty() {
            self.push(WriteOp::DeleteEngagements { ids });
        }
    }

    pub fn increment(&mut self, entity: &EntityRef, field: CounterField, delta: i64) {
        if delta != 0 {
            self.push(WriteOp::Increment {
                entity: entity.clone(),
                field,
                delta,
            });
        }
    }

    pub fn increment_all(&mut self, entity: &EntityRef, deltas: &DeltaMap) {
        for (field, delta) in deltas.iter() {
            self.increment(entity, field, delta);
        }
    }

    pub fn increment_profile(&mut self, profile: &str, field: ProfileCounter, delta: i64) {
        if delta != 0 {
            self.push(WriteOp::IncrementProfile {
                profile: profile.to_string(),
                field,
                delta,
            });
        }
    }

    pub fn delete_comments(&mut self, ids: Vec<String>) {
        if !ids.is_empty() {
            self.push(WriteOp::DeleteComments { ids });
        }
    }

    pub fn delete_replies(&mut self, ids: Vec<String>) {
        if !ids.is_empty() {
            self.push(WriteOp::DeleteReplies { ids });
        }
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_deltas_are_not_recorded() {
        let mut batch = WriteBatch::new();
        let post = EntityRef::post("p1");
        batch.increment(&post, CounterField::Upvote, 0);
        batch.increment_profile("u1", ProfileCounter::Post, 0);
        batch.delete_comments(Vec::new());
        batch.delete_engagements(Vec::new());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_increment_all_expands_delta_map() {
        let mut batch = WriteBatch::new();
        let post = EntityRef::post("p1");
        let deltas = DeltaMap::new()
            .with(CounterField::Upvote, -1)
            .with(CounterField::Downvote, 1);
        batch.increment_all(&post, &deltas);

        assert_eq!(batch.len(), 2);
        assert!(batch.ops().contains(&WriteOp::Increment {
            entity: post.clone(),
            field: CounterField::Downvote,
            delta: 1,
        }));
    }
}
