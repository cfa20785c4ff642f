// SPDX-License-Identifier: MPL-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a ledger record says the actor did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Upvote,
    Downvote,
    Bookmark,
    Repost,
    Comment,
    Reply,
}

impl EngagementKind {
    pub const TOGGLES: [EngagementKind; 4] = [
        EngagementKind::Upvote,
        EngagementKind::Downvote,
        EngagementKind::Bookmark,
        EngagementKind::Repost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EngagementKind::Upvote => "upvote",
            EngagementKind::Downvote => "downvote",
            EngagementKind::Bookmark => "bookmark",
            EngagementKind::Repost => "repost",
            EngagementKind::Comment => "comment",
            EngagementKind::Reply => "reply",
        }
    }

    /// The vote this one excludes. Only votes have an opposite.
    pub fn opposite(self) -> Option<EngagementKind> {
        match self {
            EngagementKind::Upvote => Some(EngagementKind::Downvote),
            EngagementKind::Downvote => Some(EngagementKind::Upvote),
            _ => None,
        }
    }

    /// Uniqueness slot on a target. Both votes share one, so an actor holds at
    /// most one vote per target.
    pub fn slot(self) -> &'static str {
        match self {
            EngagementKind::Upvote | EngagementKind::Downvote => "vote",
            other => other.as_str(),
        }
    }

    /// Target counter mirrored by records of this kind
    pub fn counter(self) -> Option<CounterField> {
        match self {
            EngagementKind::Upvote => Some(CounterField::Upvote),
            EngagementKind::Downvote => Some(CounterField::Downvote),
            EngagementKind::Bookmark => Some(CounterField::Bookmark),
            EngagementKind::Repost => Some(CounterField::Repost),
            EngagementKind::Comment | EngagementKind::Reply => None,
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(EngagementKind::Upvote),
            "downvote" => Ok(EngagementKind::Downvote),
            "bookmark" => Ok(EngagementKind::Bookmark),
            "repost" => Ok(EngagementKind::Repost),
            "comment" => Ok(EngagementKind::Comment),
            "reply" => Ok(EngagementKind::Reply),
            other => Err(format!("unknown engagement type: {other}")),
        }
    }
}

/// The kind of entity an engagement points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetType {
    Post,
    Comment,
    Reply,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Post => "Post",
            TargetType::Comment => "Comment",
            TargetType::Reply => "Reply",
        }
    }

    /// Whether entities of this type carry a `commentCount`
    pub fn has_comment_count(self) -> bool {
        !matches!(self, TargetType::Reply)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Post" => Ok(TargetType::Post),
            "Comment" => Ok(TargetType::Comment),
            "Reply" => Ok(TargetType::Reply),
            other => Err(format!("unknown target type: {other}")),
        }
    }
}

/// Addresses one post, comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub target_type: TargetType,
    pub id: String,
}

impl EntityRef {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Post,
            id: id.into(),
        }
    }

    pub fn comment(id: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Comment,
            id: id.into(),
        }
    }

    pub fn reply(id: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Reply,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.id)
    }
}

/// Denormalized counters on posts, comments and replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CounterField {
    Upvote,
    Downvote,
    Bookmark,
    Repost,
    Comment,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            CounterField::Upvote => "upvote_count",
            CounterField::Downvote => "downvote_count",
            CounterField::Bookmark => "bookmark_count",
            CounterField::Repost => "repost_count",
            CounterField::Comment => "comment_count",
        }
    }

    pub fn applies_to(self, target_type: TargetType) -> bool {
        self != CounterField::Comment || target_type.has_comment_count()
    }
}

/// Aggregate counters on profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileCounter {
    Post,
    Comment,
    Reply,
    /// Upvotes received on the profile's content
    Upvote,
}

impl ProfileCounter {
    pub fn column(self) -> &'static str {
        match self {
            ProfileCounter::Post => "post_count",
            ProfileCounter::Comment => "comment_count",
            ProfileCounter::Reply => "reply_count",
            ProfileCounter::Upvote => "upvote_count",
        }
    }
}

/// Signed per-field adjustments for one entity. Zero entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaMap(BTreeMap<CounterField, i64>);

impl DeltaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: CounterField, delta: i64) {
        let entry = self.0.entry(field).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.0.remove(&field);
        }
    }

    pub fn with(mut self, field: CounterField, delta: i64) -> Self {
        self.add(field, delta);
        self
    }

    pub fn get(&self, field: CounterField) -> i64 {
        self.0.get(&field).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CounterField, i64)> + '_ {
        self.0.iter().map(|(field, delta)| (*field, *delta))
    }
}

/// One row of the engagement ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub id: String,
    pub actor: String,
    pub target: String,
    pub target_type: TargetType,
    /// Profile credited with the engagement, normally the target's author
    pub recipient: String,
    #[serde(rename = "type")]
    pub kind: EngagementKind,
    pub created_at: DateTime<Utc>,
}

impl Engagement {
    pub fn new(
        actor: &str,
        target: &str,
        target_type: TargetType,
        recipient: &str,
        kind: EngagementKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            target: target.to_string(),
            target_type,
            recipient: recipient.to_string(),
            kind,
            created_at: Utc::now(),
        }
    }
}

/// The four toggle counters every target carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCounters {
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub bookmark_count: i64,
    pub repost_count: i64,
}

impl EngagementCounters {
    pub fn get(&self, field: CounterField) -> Option<i64> {
        match field {
            CounterField::Upvote => Some(self.upvote_count),
            CounterField::Downvote => Some(self.downvote_count),
            CounterField::Bookmark => Some(self.bookmark_count),
            CounterField::Repost => Some(self.repost_count),
            CounterField::Comment => None,
        }
    }

    pub(crate) fn field_mut(&mut self, field: CounterField) -> Option<&mut i64> {
        match field {
            CounterField::Upvote => Some(&mut self.upvote_count),
            CounterField::Downvote => Some(&mut self.downvote_count),
            CounterField::Bookmark => Some(&mut self.bookmark_count),
            CounterField::Repost => Some(&mut self.repost_count),
            CounterField::Comment => None,
        }
    }
}

/// Current counter values of one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    #[serde(flatten)]
    pub engagement: EngagementCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<i64>,
}

impl CounterSnapshot {
    pub fn get(&self, field: CounterField) -> Option<i64> {
        match field {
            CounterField::Comment => self.comment_count,
            other => self.engagement.get(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub post_count: i64,
    pub comment_count: i64,
    pub reply_count: i64,
    /// Upvotes received across the profile's posts, comments and replies
    pub upvote_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            post_count: 0,
            comment_count: 0,
            reply_count: 0,
            upvote_count: 0,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn counter_mut(&mut self, field: ProfileCounter) -> &mut i64 {
        match field {
            ProfileCounter::Post => &mut self.post_count,
            ProfileCounter::Comment => &mut self.comment_count,
            ProfileCounter::Reply => &mut self.reply_count,
            ProfileCounter::Upvote => &mut self.upvote_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author: String,
    pub title: String,
    pub body: String,
    #[serde(flatten)]
    pub counters: EngagementCounters,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(author: &str, title: &str, body: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            counters: EngagementCounters::default(),
            comment_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post: String,
    pub author: String,
    pub body: String,
    #[serde(flatten)]
    pub counters: EngagementCounters,
    /// Replies under this comment
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post: &str, author: &str, body: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            post: post.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            counters: EngagementCounters::default(),
            comment_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub comment: String,
    /// Post the parent comment belongs to
    pub post: String,
    pub author: String,
    pub body: String,
    #[serde(flatten)]
    pub counters: EngagementCounters,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    pub fn new(comment: &Comment, author: &str, body: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            comment: comment.id.clone(),
            post: comment.post.clone(),
            author: author.to_string(),
            body: body.to_string(),
            counters: EngagementCounters::default(),
            created_at: Utc::now(),
        }
    }
}
