// SPDX-License-Identifier: MPL-2.0

//! Engagement ledger: one record per `(actor, target, kind)`.
//!
//! Votes are mutually exclusive per actor and target, and the store enforces
//! it: upvote and downvote share one uniqueness slot. Bookmarks and reposts
//! are independent switches. Comment/reply records are built here and staged
//! into the batch that creates the comment or reply. Every toggle commits its
//! ledger change together with the counter deltas it implies.

use crate::error::{ServiceError, require};
use crate::model::{DeltaMap, Engagement, EngagementKind, EntityRef, ProfileCounter, TargetType};
use crate::projector::CounterProjector;
use crate::store::{CounterStore, EngagementStore, Store, WriteBatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleRequest {
    pub actor: String,
    pub target: String,
    pub recipient: String,
    pub target_type: TargetType,
    pub kind: EngagementKind,
}

/// Result of a toggle, returned to the caller to update UI state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub kind: EngagementKind,
    /// Whether the engagement is now present
    pub active: bool,
    /// Counter changes applied to the target
    pub target_delta: DeltaMap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteState {
    pub upvote: bool,
    pub downvote: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub upvote: bool,
    pub downvote: bool,
    pub bookmark: bool,
    pub repost: bool,
}

impl TargetState {
    fn mark(&mut self, kind: EngagementKind) {
        match kind {
            EngagementKind::Upvote => self.upvote = true,
            EngagementKind::Downvote => self.downvote = true,
            EngagementKind::Bookmark => self.bookmark = true,
            EngagementKind::Repost => self.repost = true,
            EngagementKind::Comment | EngagementKind::Reply => {}
        }
    }

    fn votes(self) -> VoteState {
        VoteState {
            upvote: self.upvote,
            downvote: self.downvote,
        }
    }
}

/// What one actor currently has switched on across a post thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementState {
    pub post: TargetState,
    pub comments: BTreeMap<String, VoteState>,
    pub replies: BTreeMap<String, VoteState>,
}

#[derive(Clone)]
pub struct EngagementLedger {
    store: Arc<dyn Store>,
}

impl EngagementLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Switch `kind` on or off for `(actor, target)`.
    ///
    /// Repeating an engagement removes it. Casting a vote while holding the
    /// opposite vote removes the stale one first, and both deltas are applied.
    /// Self-engagement is allowed.
    pub async fn toggle(&self, request: &ToggleRequest) -> Result<ToggleOutcome, ServiceError> {
        let actor = require("actor", &request.actor)?;
        let target = require("target", &request.target)?;
        let recipient = require("recipient", &request.recipient)?;
        let kind = request.kind;
        let Some(field) = kind.counter() else {
            return Err(ServiceError::Validation(format!(
                "{kind} engagements are recorded on creation and cannot be toggled"
            )));
        };

        let entity = EntityRef {
            target_type: request.target_type,
            id: target.to_string(),
        };
        if self.store.counters(&entity).await?.is_none() {
            return Err(ServiceError::NotFound(entity.to_string()));
        }

        let mut batch = WriteBatch::new();
        let mut deltas = DeltaMap::new();
        // Received-upvote adjustments, keyed by the recipient of each record
        let mut received: Vec<(String, i64)> = Vec::new();

        let active = match self.store.find_engagement(actor, target, kind).await? {
            Some(existing) => {
                batch.delete_engagement(&existing.id);
                deltas.add(field, -1);
                if kind == EngagementKind::Upvote {
                    received.push((existing.recipient, -1));
                }
                false
            }
            None => {
                if let Some(opposite) = kind.opposite() {
                    let stale = self.store.find_engagement(actor, target, opposite).await?;
                    if let Some(stale) = stale {
                        batch.delete_engagement(&stale.id);
                        if let Some(stale_field) = opposite.counter() {
                            deltas.add(stale_field, -1);
                        }
                        if opposite == EngagementKind::Upvote {
                            received.push((stale.recipient, -1));
                        }
                    }
                }

                batch.insert_engagement(Engagement::new(
                    actor,
                    target,
                    request.target_type,
                    recipient,
                    kind,
                ));
                deltas.add(field, 1);
                if kind == EngagementKind::Upvote {
                    received.push((recipient.to_string(), 1));
                }
                true
            }
        };

        CounterProjector::stage_delta(&mut batch, &entity, &deltas);
        for (profile, delta) in &received {
            CounterProjector::stage_profile_delta(
                &mut batch,
                profile,
                ProfileCounter::Upvote,
                *delta,
            );
        }
        self.store.commit(batch).await?;

        debug!(actor, target = %entity, %kind, active, "engagement toggled");

        Ok(ToggleOutcome {
            kind,
            active,
            target_delta: deltas,
        })
    }

    /// Record for a new comment, or `None` when the author comments on their
    /// own post. The caller stages it with the comment insert.
    pub fn comment_engagement(
        actor: &str,
        comment_id: &str,
        recipient: &str,
    ) -> Option<Engagement> {
        (actor != recipient).then(|| {
            Engagement::new(
                actor,
                comment_id,
                TargetType::Comment,
                recipient,
                EngagementKind::Comment,
            )
        })
    }

    /// Record for a new reply, or `None` when the author replies to their own
    /// comment.
    pub fn reply_engagement(
        actor: &str,
        reply_id: &str,
        recipient: &str,
    ) -> Option<Engagement> {
        (actor != recipient).then(|| {
            Engagement::new(
                actor,
                reply_id,
                TargetType::Reply,
                recipient,
                EngagementKind::Reply,
            )
        })
    }

    /// Active engagements of `actor` across a post and its thread, fetched
    /// with one batched ledger lookup instead of a query per target.
    pub async fn engagement_state(
        &self,
        actor: &str,
        post_id: &str,
        comment_ids: &[String],
        reply_ids: &[String],
    ) -> Result<EngagementState, ServiceError> {
        let actor = require("actor", actor)?;
        let post_id = require("postId", post_id)?;

        let mut targets = Vec::with_capacity(1 + comment_ids.len() + reply_ids.len());
        targets.push(post_id.to_string());
        targets.extend(comment_ids.iter().cloned());
        targets.extend(reply_ids.iter().cloned());

        let records = self.store.engagements_by_actor(actor, &targets).await?;

        let mut by_target: BTreeMap<&str, TargetState> = BTreeMap::new();
        for record in &records {
            by_target
                .entry(record.target.as_str())
                .or_default()
                .mark(record.kind);
        }
        let state_of = |id: &str| by_target.get(id).copied().unwrap_or_default();

        Ok(EngagementState {
            post: state_of(post_id),
            comments: comment_ids
                .iter()
                .map(|id| (id.clone(), state_of(id).votes()))
                .collect(),
            replies: reply_ids
                .iter()
                .map(|id| (id.clone(), state_of(id).votes()))
                .collect(),
        })
    }
}
