// SPDX-License-Identifier: MPL-2.0

use crate::model::{Profile, ProfileCounter};
use crate::store::StoreError;
use rusqlite::{Connection, OptionalExtension, params};

/// Profile queries
pub struct ProfileTable<'a> {
    conn: &'a Connection,
}

impl<'a> ProfileTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
        let result = self.conn.execute(
            r#"
            INSERT INTO profiles (
                id, name, post_count, comment_count, reply_count, upvote_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                profile.id,
                profile.name,
                profile.post_count,
                profile.comment_count,
                profile.reply_count,
                profile.upvote_count,
                profile.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "profile {} already exists",
                    profile.id
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Get profile by id
    pub fn get(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let profile = self
            .conn
            .query_row(
                r#"
                SELECT id, name, post_count, comment_count, reply_count, upvote_count, created_at
                FROM profiles
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        post_count: row.get(2)?,
                        comment_count: row.get(3)?,
                        reply_count: row.get(4)?,
                        upvote_count: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    pub fn increment(
        &self,
        id: &str,
        field: ProfileCounter,
        delta: i64,
    ) -> Result<(), StoreError> {
        let column = field.column();
        let updated = self.conn.execute(
            &format!("UPDATE profiles SET {column} = {column} + ?1 WHERE id = ?2"),
            params![delta, id],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("Profile:{id}")));
        }
        Ok(())
    }
}
