// SPDX-License-Identifier: MPL-2.0

use crate::model::{Engagement, EngagementKind};
use crate::store::{ID_CHUNK, StoreError, ensure_unchanged};
use rusqlite::{Connection, ErrorCode, params};

const COLUMNS: &str = "id, actor, target, target_type, recipient, kind, created_at";

/// Ledger queries against a connection or an open transaction
pub struct EngagementTable<'a> {
    conn: &'a Connection,
}

impl<'a> EngagementTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find(
        &self,
        actor: &str,
        target: &str,
        kind: EngagementKind,
    ) -> Result<Option<Engagement>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM engagements WHERE actor = ?1 AND target = ?2 AND kind = ?3"
        ))?;

        let mut rows = stmt.query(params![actor, target, kind.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_engagement(row)?)),
            None => Ok(None),
        }
    }

    /// Records held by `actor` against any of `targets`
    pub fn by_actor(&self, actor: &str, targets: &[String]) -> Result<Vec<Engagement>, StoreError> {
        let mut records = Vec::new();
        for chunk in targets.chunks(ID_CHUNK) {
            // ?1 is the actor, targets start at ?2
            let placeholders: Vec<_> = (2..=chunk.len() + 1).map(|i| format!("?{}", i)).collect();
            let query = format!(
                "SELECT {COLUMNS} FROM engagements WHERE actor = ?1 AND target IN ({})",
                placeholders.join(", ")
            );

            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&actor as &dyn rusqlite::ToSql];
            params.extend(chunk.iter().map(|s| s as &dyn rusqlite::ToSql));

            records.extend(self.collect(&query, &params)?);
        }

        Ok(Self::oldest_first(records))
    }

    /// Records against any of `targets`, from every actor
    pub fn for_targets(&self, targets: &[String]) -> Result<Vec<Engagement>, StoreError> {
        let mut records = Vec::new();
        for chunk in targets.chunks(ID_CHUNK) {
            let placeholders: Vec<_> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
            let query = format!(
                "SELECT {COLUMNS} FROM engagements WHERE target IN ({})",
                placeholders.join(", ")
            );

            let params: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            records.extend(self.collect(&query, &params)?);
        }

        Ok(Self::oldest_first(records))
    }

    /// Fails with a conflict unless the records on `targets` are exactly `expected`
    pub fn expect_on_targets(
        &self,
        targets: &[String],
        expected: &[String],
    ) -> Result<(), StoreError> {
        let live = self.for_targets(targets)?.into_iter().map(|r| r.id).collect();
        ensure_unchanged("engagements", live, expected)
    }

    pub fn insert(&self, record: &Engagement) -> Result<(), StoreError> {
        let result = self.conn.execute(
            &format!(
                "INSERT INTO engagements ({COLUMNS}, slot) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                record.id,
                record.actor,
                record.target,
                record.target_type.as_str(),
                record.recipient,
                record.kind.as_str(),
                record.created_at,
                record.kind.slot(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "{} by {} on {} already recorded",
                    record.kind.slot(),
                    record.actor,
                    record.target
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM engagements WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(StoreError::Conflict(format!(
                "engagement {id} was already removed"
            )));
        }
        Ok(())
    }

    pub fn delete_many(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            self.delete(id)?;
        }
        Ok(())
    }

    fn collect(
        &self,
        query: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Engagement>, StoreError> {
        let mut stmt = self.conn.prepare(query)?;
        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(Self::row_to_engagement(row)?);
        }

        Ok(records)
    }

    fn oldest_first(mut records: Vec<Engagement>) -> Vec<Engagement> {
        records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        records
    }

    /// Convert a database row to an Engagement
    fn row_to_engagement(row: &rusqlite::Row) -> Result<Engagement, StoreError> {
        let target_type: String = row.get(3)?;
        let kind: String = row.get(5)?;

        Ok(Engagement {
            id: row.get(0)?,
            actor: row.get(1)?,
            target: row.get(2)?,
            target_type: target_type.parse().map_err(StoreError::InvalidRow)?,
            recipient: row.get(4)?,
            kind: kind.parse().map_err(StoreError::InvalidRow)?,
            created_at: row.get(6)?,
        })
    }
}
