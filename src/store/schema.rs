pub const SCHEMA: &str = r#"
-- One row per identity that has claimed a handle
CREATE TABLE IF NOT EXISTS accounts (
    identity_subject TEXT PRIMARY KEY,
    username_lower TEXT NOT NULL UNIQUE,
    username_display TEXT NOT NULL,
    email TEXT,
    image_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Signups staged before the auth provider confirms the account
CREATE TABLE IF NOT EXISTS pending_identities (
    better_auth_user_id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    email_lower TEXT NOT NULL UNIQUE,
    username_lower TEXT NOT NULL UNIQUE,
    username_display TEXT NOT NULL,
    image_base64 TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

-- Handles embargoed after their owner renamed away from them
CREATE TABLE IF NOT EXISTS username_holds (
    username_lower TEXT PRIMARY KEY,
    username_display TEXT NOT NULL,
    identity_subject TEXT NOT NULL,
    created_at TEXT NOT NULL,
    release_at TEXT NOT NULL
);

-- Periodic job registrations; schedule and args are JSON
CREATE TABLE IF NOT EXISTS cron_jobs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    handler TEXT NOT NULL,
    schedule TEXT NOT NULL,
    args TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    last_run_at TEXT
);

-- Session tokens minted for the auth provider, plus trusted caller tokens
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_trusted INTEGER NOT NULL DEFAULT 0,
    subject TEXT,                      -- NULL only for trusted tokens
    email TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_identities_expires ON pending_identities(expires_at);
CREATE INDEX IF NOT EXISTS idx_username_holds_release ON username_holds(release_at);
CREATE INDEX IF NOT EXISTS idx_username_holds_subject ON username_holds(identity_subject);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_subject ON tokens(subject);
"#;
