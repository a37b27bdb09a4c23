// src/core/store/migrations.rs

//! Schema creation. Statements are idempotent so they run at every startup
//! and after an FSM restore onto a fresh file.

use crate::core::errors::SylveError;
use sqlx::sqlite::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS notes (
        id          INTEGER PRIMARY KEY,
        title       TEXT NOT NULL DEFAULT '',
        content     TEXT NOT NULL DEFAULT '',
        created_at  TEXT,
        updated_at  TEXT
    )",
    "CREATE TABLE IF NOT EXISTS options (
        id            INTEGER PRIMARY KEY CHECK (id = 1),
        cluster_name  TEXT NOT NULL DEFAULT '',
        updated_at    TEXT
    )",
    "CREATE TABLE IF NOT EXISTS backup_targets (
        id            INTEGER PRIMARY KEY,
        name          TEXT NOT NULL UNIQUE,
        ssh_host      TEXT NOT NULL,
        ssh_port      INTEGER NOT NULL DEFAULT 22,
        ssh_key_path  TEXT,
        backup_root   TEXT NOT NULL,
        description   TEXT NOT NULL DEFAULT '',
        enabled       INTEGER NOT NULL DEFAULT 1,
        created_at    TEXT,
        updated_at    TEXT
    )",
    "CREATE TABLE IF NOT EXISTS backup_jobs (
        id                  INTEGER PRIMARY KEY,
        name                TEXT NOT NULL,
        target_id           INTEGER NOT NULL REFERENCES backup_targets(id) ON UPDATE CASCADE,
        runner_node_id      INTEGER NOT NULL,
        policy_id           INTEGER,
        mode                TEXT NOT NULL,
        source_dataset      TEXT NOT NULL DEFAULT '',
        jail_root_dataset   TEXT NOT NULL DEFAULT '',
        friendly_src        TEXT NOT NULL DEFAULT '',
        dest_suffix         TEXT NOT NULL DEFAULT '',
        prune_keep_last     INTEGER NOT NULL DEFAULT 0,
        prune_target        INTEGER NOT NULL DEFAULT 0,
        stop_before_backup  INTEGER NOT NULL DEFAULT 0,
        allow_full_fallback INTEGER NOT NULL DEFAULT 1,
        cron_expr           TEXT NOT NULL,
        enabled             INTEGER NOT NULL DEFAULT 1,
        last_run_at         TEXT,
        next_run_at         TEXT,
        last_status         TEXT NOT NULL DEFAULT '',
        last_error          TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS backup_events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id           INTEGER REFERENCES backup_jobs(id),
        source_dataset   TEXT NOT NULL DEFAULT '',
        target_endpoint  TEXT NOT NULL DEFAULT '',
        mode             TEXT NOT NULL DEFAULT 'dataset',
        status           TEXT NOT NULL DEFAULT 'running',
        error            TEXT NOT NULL DEFAULT '',
        output           TEXT NOT NULL DEFAULT '',
        started_at       TEXT,
        completed_at     TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_backup_events_job_status
        ON backup_events(job_id, status)",
    "CREATE TABLE IF NOT EXISTS replication_policies (
        id              INTEGER PRIMARY KEY,
        name            TEXT NOT NULL,
        guest_type      TEXT NOT NULL,
        guest_id        INTEGER NOT NULL,
        source_node_id  INTEGER NOT NULL,
        active_node_id  INTEGER NOT NULL,
        source_mode     TEXT NOT NULL,
        failback_mode   TEXT NOT NULL,
        cron_expr       TEXT NOT NULL,
        enabled         INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS replication_policy_targets (
        policy_id  INTEGER NOT NULL REFERENCES replication_policies(id),
        node_id    INTEGER NOT NULL,
        weight     INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (policy_id, node_id)
    )",
    "CREATE TABLE IF NOT EXISTS replication_leases (
        policy_id      INTEGER PRIMARY KEY,
        guest_type     TEXT NOT NULL,
        guest_id       INTEGER NOT NULL,
        owner_node_id  INTEGER NOT NULL,
        expires_at     TEXT,
        version        INTEGER NOT NULL DEFAULT 0,
        last_reason    TEXT NOT NULL DEFAULT '',
        last_actor     TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS replication_events (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        policy_id     INTEGER,
        job_id        INTEGER,
        event_type    TEXT NOT NULL,
        status        TEXT NOT NULL DEFAULT '',
        message       TEXT NOT NULL DEFAULT '',
        created_at    TEXT,
        completed_at  TEXT
    )",
    "CREATE TABLE IF NOT EXISTS cluster_ssh_identities (
        node_uuid         TEXT PRIMARY KEY,
        node_name         TEXT NOT NULL DEFAULT '',
        public_key        TEXT NOT NULL DEFAULT '',
        private_key_path  TEXT NOT NULL DEFAULT '',
        updated_at        TEXT
    )",
];

pub async fn run(pool: &SqlitePool) -> Result<(), SylveError> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
