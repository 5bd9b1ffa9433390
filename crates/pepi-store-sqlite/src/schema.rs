//! SQL schema for the PEPI SQLite store.
//!
//! Executed once at connection startup. Money columns hold integer cents;
//! timestamps are fixed-width RFC 3339 UTC text so they sort lexically.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS agents (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    badge_number  TEXT NOT NULL UNIQUE,
    email         TEXT,
    role          TEXT NOT NULL DEFAULT 'agent',   -- 'agent' | 'admin'
    user_id       TEXT NOT NULL UNIQUE,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pepi_books (
    id               TEXT PRIMARY KEY,
    year             INTEGER NOT NULL CHECK (year BETWEEN 2000 AND 2100),
    starting_amount  INTEGER NOT NULL CHECK (starting_amount BETWEEN 1 AND 10000000000000),
    is_active        INTEGER NOT NULL DEFAULT 0,
    is_closed        INTEGER NOT NULL DEFAULT 0,
    closing_balance  INTEGER,
    closed_at        TEXT,
    created_at       TEXT NOT NULL,
    CHECK (NOT (is_active AND is_closed))
);

-- At most one active book, enforced by the database itself.
CREATE UNIQUE INDEX IF NOT EXISTS pepi_books_one_active
    ON pepi_books(is_active) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS transactions (
    id                   TEXT PRIMARY KEY,
    pepi_book_id         TEXT NOT NULL REFERENCES pepi_books(id),
    transaction_type     TEXT NOT NULL,   -- 'issuance' | 'spending' | 'return'
    amount               INTEGER NOT NULL CHECK (amount BETWEEN 1 AND 10000000000000),
    receipt_number       TEXT,
    description          TEXT NOT NULL,
    agent_id             TEXT REFERENCES agents(id),
    is_initial_funding   INTEGER NOT NULL DEFAULT 0,
    status               TEXT NOT NULL DEFAULT 'pending',
    review_notes         TEXT,
    reviewed_by_user_id  TEXT,
    reviewed_at          TEXT,
    created_by           TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ci_payments (
    id                      TEXT PRIMARY KEY,
    pepi_book_id            TEXT NOT NULL REFERENCES pepi_books(id),
    paying_agent_id         TEXT NOT NULL REFERENCES agents(id),
    informant_code          TEXT NOT NULL,
    case_number             TEXT,
    purpose                 TEXT NOT NULL,
    amount                  INTEGER NOT NULL CHECK (amount BETWEEN 1 AND 10000000000000),
    receipt_number          TEXT,
    payment_date            TEXT NOT NULL,   -- YYYY-MM-DD
    ci_signature            TEXT,
    paying_agent_signature  TEXT,
    witness_signature       TEXT,
    commander_signature     TEXT,
    status                  TEXT NOT NULL DEFAULT 'pending',
    review_notes            TEXT,            -- rejection reason
    reviewed_by_user_id     TEXT,
    reviewed_at             TEXT,
    created_by              TEXT NOT NULL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fund_requests (
    id                   TEXT PRIMARY KEY,
    pepi_book_id         TEXT NOT NULL REFERENCES pepi_books(id),
    agent_id             TEXT NOT NULL REFERENCES agents(id),
    amount               INTEGER NOT NULL CHECK (amount BETWEEN 1 AND 10000000000000),
    purpose              TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'pending',
    review_notes         TEXT,               -- rejection reason
    reviewed_by_user_id  TEXT,
    reviewed_at          TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    id           TEXT PRIMARY KEY,
    user_id      TEXT,
    ip_address   TEXT,
    action       TEXT NOT NULL,
    entity_type  TEXT,
    entity_id    TEXT,
    details      TEXT NOT NULL DEFAULT 'null',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS transactions_book_idx   ON transactions(pepi_book_id, created_at);
CREATE INDEX IF NOT EXISTS transactions_agent_idx  ON transactions(agent_id);
CREATE INDEX IF NOT EXISTS ci_payments_book_idx    ON ci_payments(pepi_book_id);
CREATE INDEX IF NOT EXISTS fund_requests_book_idx  ON fund_requests(pepi_book_id);
CREATE INDEX IF NOT EXISTS audit_log_created_idx   ON audit_log(created_at);
CREATE INDEX IF NOT EXISTS audit_log_entity_idx    ON audit_log(entity_type, entity_id);

PRAGMA user_version = 1;
";
