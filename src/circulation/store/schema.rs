//! PostgreSQL schema for the circulation store
//!
//! Status columns hold the SMALLINT ids from `circulation::state`.
//! The three uniqueness invariants are partial unique indexes:
//! - one pending request per (book, user)
//! - one open reading history per book
//! - one active handover thread per book

use sqlx::PgPool;

pub const CREATE_BOOKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS books_tb (
    book_id            TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    status             SMALLINT NOT NULL DEFAULT 0,
    current_holder_id  BIGINT,
    created_by         BIGINT,
    max_reading_days   INTEGER NOT NULL DEFAULT 14,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_books_holder CHECK ((current_holder_id IS NOT NULL) = (status IN (20, 30)))
)
"#;

pub const CREATE_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS members_tb (
    user_id         BIGINT PRIMARY KEY,
    books_received  INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS book_requests_tb (
    request_id      TEXT PRIMARY KEY,
    book_id         TEXT NOT NULL REFERENCES books_tb(book_id) ON DELETE CASCADE,
    user_id         BIGINT NOT NULL,
    status          SMALLINT NOT NULL DEFAULT 0,
    priority_score  DOUBLE PRECISION NOT NULL,
    requested_at    TIMESTAMPTZ NOT NULL,
    processed_at    TIMESTAMPTZ,
    due_date        TIMESTAMPTZ
)
"#;

pub const CREATE_REQUESTS_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS uniq_requests_pending ON book_requests_tb (book_id, user_id) WHERE status = 0",
    "CREATE INDEX IF NOT EXISTS idx_requests_rank ON book_requests_tb (book_id, status, priority_score DESC, requested_at ASC)",
    "CREATE INDEX IF NOT EXISTS idx_requests_user ON book_requests_tb (user_id, requested_at DESC)",
];

pub const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reading_history_tb (
    history_id       TEXT PRIMARY KEY,
    book_id          TEXT NOT NULL REFERENCES books_tb(book_id) ON DELETE CASCADE,
    reader_id        BIGINT NOT NULL,
    start_date       TIMESTAMPTZ NOT NULL,
    end_date         TIMESTAMPTZ,
    due_date         TIMESTAMPTZ,
    is_completed     BOOLEAN NOT NULL DEFAULT FALSE,
    completed_at     TIMESTAMPTZ,
    next_reader_id   BIGINT,
    delivery_status  SMALLINT NOT NULL DEFAULT 0,
    delivered_at     TIMESTAMPTZ
)
"#;

pub const CREATE_HISTORY_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS uniq_history_active ON reading_history_tb (book_id) WHERE end_date IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_history_last_completed ON reading_history_tb (book_id, completed_at DESC) WHERE is_completed",
    "CREATE INDEX IF NOT EXISTS idx_history_due ON reading_history_tb (due_date) WHERE end_date IS NULL AND next_reader_id IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_history_reader ON reading_history_tb (reader_id, start_date DESC)",
];

pub const CREATE_THREADS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS handover_threads_tb (
    thread_id           TEXT PRIMARY KEY,
    book_id             TEXT NOT NULL REFERENCES books_tb(book_id) ON DELETE CASCADE,
    current_holder_id   BIGINT NOT NULL,
    next_holder_id      BIGINT NOT NULL,
    reading_history_id  TEXT REFERENCES reading_history_tb(history_id) ON DELETE SET NULL,
    status              SMALLINT NOT NULL DEFAULT 0,
    handover_due_date   TIMESTAMPTZ NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    completed_at        TIMESTAMPTZ,
    updated_at          TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_THREADS_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS uniq_threads_active ON handover_threads_tb (book_id) WHERE status = 0",
    "CREATE INDEX IF NOT EXISTS idx_threads_holder ON handover_threads_tb (current_holder_id)",
    "CREATE INDEX IF NOT EXISTS idx_threads_next_holder ON handover_threads_tb (next_holder_id)",
];

pub const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS handover_messages_tb (
    message_id         TEXT PRIMARY KEY,
    thread_id          TEXT NOT NULL REFERENCES handover_threads_tb(thread_id) ON DELETE CASCADE,
    user_id            BIGINT NOT NULL,
    message            TEXT NOT NULL,
    is_system_message  BOOLEAN NOT NULL DEFAULT FALSE,
    created_at         TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_MESSAGES_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_messages_thread ON handover_messages_tb (thread_id, created_at ASC, message_id ASC)",
];

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing circulation schema...");

    let tables = [
        CREATE_BOOKS_TABLE,
        CREATE_MEMBERS_TABLE,
        CREATE_REQUESTS_TABLE,
        CREATE_HISTORY_TABLE,
        CREATE_THREADS_TABLE,
        CREATE_MESSAGES_TABLE,
    ];
    for ddl in tables {
        sqlx::query(ddl).execute(pool).await?;
    }

    let indexes = CREATE_REQUESTS_INDEXES
        .iter()
        .chain(CREATE_HISTORY_INDEXES)
        .chain(CREATE_THREADS_INDEXES)
        .chain(CREATE_MESSAGES_INDEXES);
    for ddl in indexes {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Circulation schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::state::BookStatus;

    #[test]
    fn test_holder_check_matches_status_ids() {
        let holder_ids = format!(
            "status IN ({}, {})",
            BookStatus::Reading.id(),
            BookStatus::OnHold.id()
        );
        assert!(CREATE_BOOKS_TABLE.contains(&holder_ids));
    }

    #[test]
    fn test_uniqueness_indexes_present() {
        assert!(CREATE_REQUESTS_INDEXES[0].contains("UNIQUE"));
        assert!(CREATE_HISTORY_INDEXES[0].contains("end_date IS NULL"));
        assert!(CREATE_THREADS_INDEXES[0].contains("UNIQUE"));
    }
}
