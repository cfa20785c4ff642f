// SPDX-License-Identifier: MPL-2.0

use crate::model::{
    Comment, CounterField, CounterSnapshot, EngagementCounters, EntityRef, Post, Reply, TargetType,
};
use crate::store::{ID_CHUNK, StoreError, ensure_unchanged};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

const COUNTER_COLUMNS: &str = "upvote_count, downvote_count, bookmark_count, repost_count";

fn table(target_type: TargetType) -> &'static str {
    match target_type {
        TargetType::Post => "posts",
        TargetType::Comment => "comments",
        TargetType::Reply => "replies",
    }
}

/// Post, comment, reply and widget queries
pub struct ContentTable<'a> {
    conn: &'a Connection,
}

impl<'a> ContentTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let post = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, author, title, body, {COUNTER_COLUMNS}, comment_count, created_at
                     FROM posts WHERE id = ?"
                ),
                [id],
                |row| {
                    Ok(Post {
                        id: row.get(0)?,
                        author: row.get(1)?,
                        title: row.get(2)?,
                        body: row.get(3)?,
                        counters: Self::counters_at(row, 4)?,
                        comment_count: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(post)
    }

    pub fn comment(&self, id: &str) -> Result<Option<Comment>, StoreError> {
        let comment = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, post, author, body, {COUNTER_COLUMNS}, comment_count, created_at
                     FROM comments WHERE id = ?"
                ),
                [id],
                Self::row_to_comment,
            )
            .optional()?;
        Ok(comment)
    }

    pub fn reply(&self, id: &str) -> Result<Option<Reply>, StoreError> {
        let reply = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, comment, post, author, body, {COUNTER_COLUMNS}, created_at
                     FROM replies WHERE id = ?"
                ),
                [id],
                Self::row_to_reply,
            )
            .optional()?;
        Ok(reply)
    }

    pub fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, post, author, body, {COUNTER_COLUMNS}, comment_count, created_at
             FROM comments WHERE post = ? ORDER BY created_at, id"
        ))?;

        let comments = stmt
            .query_map([post_id], Self::row_to_comment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    pub fn replies_for_comments(&self, comment_ids: &[String]) -> Result<Vec<Reply>, StoreError> {
        let mut replies = Vec::new();
        for chunk in comment_ids.chunks(ID_CHUNK) {
            let placeholders: Vec<_> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
            let query = format!(
                "SELECT id, comment, post, author, body, {COUNTER_COLUMNS}, created_at
                 FROM replies WHERE comment IN ({})",
                placeholders.join(", ")
            );

            let params: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            let mut stmt = self.conn.prepare(&query)?;
            let rows = stmt
                .query_map(params.as_slice(), Self::row_to_reply)?
                .collect::<Result<Vec<_>, _>>()?;
            replies.extend(rows);
        }

        replies.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(replies)
    }

    pub fn expect_comments(&self, post_id: &str, expected: &[String]) -> Result<(), StoreError> {
        let live = self
            .comments_for_post(post_id)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        ensure_unchanged("comments", live, expected)
    }

    pub fn expect_replies(
        &self,
        comment_ids: &[String],
        expected: &[String],
    ) -> Result<(), StoreError> {
        let live = self
            .replies_for_comments(comment_ids)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        ensure_unchanged("replies", live, expected)
    }

    pub fn counters(&self, entity: &EntityRef) -> Result<Option<CounterSnapshot>, StoreError> {
        let comment_column = if entity.target_type.has_comment_count() {
            "comment_count"
        } else {
            "NULL"
        };
        let query = format!(
            "SELECT {COUNTER_COLUMNS}, {comment_column} FROM {} WHERE id = ?",
            table(entity.target_type)
        );

        let snapshot = self
            .conn
            .query_row(&query, [&entity.id], |row| {
                Ok(CounterSnapshot {
                    engagement: Self::counters_at(row, 0)?,
                    comment_count: row.get(4)?,
                })
            })
            .optional()?;
        Ok(snapshot)
    }

    /// Atomic `col = col + delta`; a missing row fails the update
    pub fn increment(
        &self,
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

        let column = field.column();
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET {column} = {column} + ?1 WHERE id = ?2",
                table(entity.target_type)
            ),
            params![delta, entity.id],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(entity.to_string()));
        }
        Ok(())
    }

    pub fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO posts (id, author, title, body, {COUNTER_COLUMNS}, comment_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                post.id,
                post.author,
                post.title,
                post.body,
                post.counters.upvote_count,
                post.counters.downvote_count,
                post.counters.bookmark_count,
                post.counters.repost_count,
                post.comment_count,
                post.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO comments (id, post, author, body, {COUNTER_COLUMNS}, comment_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                comment.id,
                comment.post,
                comment.author,
                comment.body,
                comment.counters.upvote_count,
                comment.counters.downvote_count,
                comment.counters.bookmark_count,
                comment.counters.repost_count,
                comment.comment_count,
                comment.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_reply(&self, reply: &Reply) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO replies (id, comment, post, author, body, {COUNTER_COLUMNS}, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                reply.id,
                reply.comment,
                reply.post,
                reply.author,
                reply.body,
                reply.counters.upvote_count,
                reply.counters.downvote_count,
                reply.counters.bookmark_count,
                reply.counters.repost_count,
                reply.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete_post(&self, id: &str) -> Result<(), StoreError> {
        let deleted = self.conn.execute("DELETE FROM posts WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("Post:{id}")));
        }
        Ok(())
    }

    pub fn delete_comments(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            if self.conn.execute("DELETE FROM comments WHERE id = ?", [id])? == 0 {
                return Err(StoreError::Conflict(format!("comment {id} was already removed")));
            }
        }
        Ok(())
    }

    pub fn delete_replies(&self, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            if self.conn.execute("DELETE FROM replies WHERE id = ?", [id])? == 0 {
                return Err(StoreError::Conflict(format!("reply {id} was already removed")));
            }
        }
        Ok(())
    }

    pub fn widget(&self, post_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT config_json FROM widgets WHERE post = ?",
                [post_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn put_widget(&self, post_id: &str, config: &serde_json::Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(config)?;
        self.conn.execute(
            r#"
            INSERT INTO widgets (post, config_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(post) DO UPDATE SET
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
            params![post_id, json, Utc::now()],
        )?;
        Ok(())
    }

    pub fn delete_widget(&self, post_id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM widgets WHERE post = ?", [post_id])?;
        Ok(())
    }

    fn counters_at(
        row: &rusqlite::Row,
        start: usize,
    ) -> Result<EngagementCounters, rusqlite::Error> {
        Ok(EngagementCounters {
            upvote_count: row.get(start)?,
            downvote_count: row.get(start + 1)?,
            bookmark_count: row.get(start + 2)?,
            repost_count: row.get(start + 3)?,
        })
    }

    fn row_to_comment(row: &rusqlite::Row) -> Result<Comment, rusqlite::Error> {
        Ok(Comment {
            id: row.get(0)?,
            post: row.get(1)?,
            author: row.get(2)?,
            body: row.get(3)?,
            counters: Self::counters_at(row, 4)?,
            comment_count: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn row_to_reply(row: &rusqlite::Row) -> Result<Reply, rusqlite::Error> {
        Ok(Reply {
            id: row.get(0)?,
            comment: row.get(1)?,
            post: row.get(2)?,
            author: row.get(3)?,
            body: row.get(4)?,
            counters: Self::counters_at(row, 5)?,
            created_at: row.get(9)?,
        })
    }
}
