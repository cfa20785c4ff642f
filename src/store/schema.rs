// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the service database
pub const SCHEMA: &str = r#"
-- Database version for migrations
PRAGMA user_version = 1;

-- profiles: aggregate counters per user
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    post_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    reply_count INTEGER NOT NULL DEFAULT 0,
    upvote_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- posts: business ideas with denormalized engagement counters
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    upvote_count INTEGER NOT NULL DEFAULT 0,
    downvote_count INTEGER NOT NULL DEFAULT 0,
    bookmark_count INTEGER NOT NULL DEFAULT 0,
    repost_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    post TEXT NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    upvote_count INTEGER NOT NULL DEFAULT 0,
    downvote_count INTEGER NOT NULL DEFAULT 0,
    bookmark_count INTEGER NOT NULL DEFAULT 0,
    repost_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post, created_at);

-- replies: one level below comments, no comment_count
CREATE TABLE IF NOT EXISTS replies (
    id TEXT PRIMARY KEY,
    comment TEXT NOT NULL,
    post TEXT NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    upvote_count INTEGER NOT NULL DEFAULT 0,
    downvote_count INTEGER NOT NULL DEFAULT 0,
    bookmark_count INTEGER NOT NULL DEFAULT 0,
    repost_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_replies_comment ON replies(comment, created_at);

-- engagements: the ledger, one row per (actor, target, slot)
-- slot is 'vote' for upvote and downvote, otherwise the kind
CREATE TABLE IF NOT EXISTS engagements (
    id TEXT PRIMARY KEY,
    actor TEXT NOT NULL,
    target TEXT NOT NULL,
    target_type TEXT NOT NULL,
    recipient TEXT NOT NULL,
    kind TEXT NOT NULL,
    slot TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(actor, target, slot)
);

CREATE INDEX IF NOT EXISTS idx_engagements_target ON engagements(target, kind);
CREATE INDEX IF NOT EXISTS idx_engagements_recipient ON engagements(recipient);

-- widgets: per-post widget configuration
CREATE TABLE IF NOT EXISTS widgets (
    post TEXT PRIMARY KEY,
    config_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
