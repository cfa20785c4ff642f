// SPDX-License-Identifier: MPL-2.0

use crate::error::ServiceError;
use crate::model::{CounterField, DeltaMap, EngagementKind, EntityRef, ProfileCounter, TargetType};
use crate::store::{ContentStore, CounterStore, EngagementStore, Store, StoreError, WriteBatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Applies counter deltas to targets and profiles.
///
/// Deltas are staged into the caller's [`WriteBatch`] so they commit with the
/// ledger change that caused them. Each one lands as a single
/// `col = col + delta` update; counters are never recomputed from a read.
#[derive(Clone)]
pub struct CounterProjector {
    store: Arc<dyn Store>,
}

/// Stored value of one counter next to what the ledger implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAudit {
    pub field: CounterField,
    pub stored: i64,
    pub expected: i64,
}

/// Read-only drift report for one entity. Nothing is repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterAudit {
    pub entity: EntityRef,
    pub fields: Vec<FieldAudit>,
}

impl CounterAudit {
    pub fn is_consistent(&self) -> bool {
        self.fields.iter().all(|f| f.stored == f.expected)
    }

    pub fn drifted(&self) -> impl Iterator<Item = &FieldAudit> {
        self.fields.iter().filter(|f| f.stored != f.expected)
    }
}

impl CounterProjector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Field-level deltas on one post, comment or reply
    pub fn stage_delta(batch: &mut WriteBatch, entity: &EntityRef, deltas: &DeltaMap) {
        batch.increment_all(entity, deltas);
    }

    pub fn stage_profile_delta(
        batch: &mut WriteBatch,
        profile_id: &str,
        field: ProfileCounter,
        delta: i64,
    ) {
        batch.increment_profile(profile_id, field, delta);
    }

    /// Compare an entity's stored counters with the ledger and its thread.
    pub async fn audit(&self, entity: &EntityRef) -> Result<CounterAudit, ServiceError> {
        let snapshot = self
            .store
            .counters(entity)
            .await?
            .ok_or_else(|| ServiceError::NotFound(entity.to_string()))?;

        let records = self
            .store
            .engagements_for_targets(std::slice::from_ref(&entity.id))
            .await?;

        let mut fields = Vec::new();
        for kind in EngagementKind::TOGGLES {
            let Some(field) = kind.counter() else {
                continue;
            };
            let expected = records.iter().filter(|r| r.kind == kind).count() as i64;
            fields.push(FieldAudit {
                field,
                stored: snapshot.get(field).unwrap_or_default(),
                expected,
            });
        }

        if let Some(stored) = snapshot.comment_count {
            let expected = self.thread_size(entity).await?;
            fields.push(FieldAudit {
                field: CounterField::Comment,
                stored,
                expected,
            });
        }

        let audit = CounterAudit {
            entity: entity.clone(),
            fields,
        };
        for drift in audit.drifted() {
            warn!(
                entity = %audit.entity,
                field = ?drift.field,
                stored = drift.stored,
                expected = drift.expected,
                "counter drift detected"
            );
        }
        Ok(audit)
    }

    /// Comments and replies currently below a post, or replies below a comment
    async fn thread_size(&self, entity: &EntityRef) -> Result<i64, StoreError> {
        match entity.target_type {
            TargetType::Post => {
                let comments = self.store.comments_for_post(&entity.id).await?;
                let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
                let replies = self.store.replies_for_comments(&ids).await?;
                Ok((comments.len() + replies.len()) as i64)
            }
            TargetType::Comment => {
                let replies = self
                    .store
                    .replies_for_comments(std::slice::from_ref(&entity.id))
                    .await?;
                Ok(replies.len() as i64)
            }
            TargetType::Reply => Ok(0),
        }
    }
}
