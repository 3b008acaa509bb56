//! Table definitions, one table per collection.

pub(crate) const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS admins (
        email TEXT PRIMARY KEY NOT NULL,
        role TEXT,
        added_by TEXT,
        added_at TEXT NOT NULL,
        active INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raffles (
        id TEXT PRIMARY KEY NOT NULL,
        event_id TEXT NOT NULL,
        event_name TEXT NOT NULL DEFAULT '',
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        prize TEXT NOT NULL DEFAULT '',
        start_date TEXT,
        end_date TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_completed INTEGER NOT NULL DEFAULT 0,
        participants TEXT NOT NULL DEFAULT '[]',
        participant_posts TEXT NOT NULL DEFAULT '[]',
        winner TEXT,
        winner_id TEXT,
        winner_name TEXT,
        winner_post TEXT,
        completed_at TEXT,
        ended_at TEXT,
        is_announced INTEGER NOT NULL DEFAULT 0,
        announcement_id TEXT,
        created_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_raffles_event ON raffles (event_id)",
    r#"
    CREATE TABLE IF NOT EXISTS raffle_participants (
        id TEXT PRIMARY KEY NOT NULL,
        raffle_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        user_name TEXT,
        post_id TEXT NOT NULL,
        participated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_participants_raffle ON raffle_participants (raffle_id)",
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY NOT NULL,
        event_id TEXT,
        user_id TEXT NOT NULL,
        user_name TEXT,
        content TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_event ON posts (event_id)",
    r#"
    CREATE TABLE IF NOT EXISTS announcements (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        raffle_id TEXT,
        event_id TEXT,
        created_by TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id TEXT PRIMARY KEY NOT NULL,
        event_type TEXT NOT NULL,
        timestamp_ms INTEGER NOT NULL,
        level TEXT NOT NULL,
        actor_email TEXT,
        risk_score INTEGER NOT NULL,
        payload TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_time ON audit_logs (timestamp_ms DESC, id DESC)",
];
