//! SQLite persistence for approval requests.
//!
//! One table, one connection behind a mutex.  Every status transition goes
//! through a conditional `UPDATE ... WHERE status = 'pending'` so terminal
//! states can never be overwritten, regardless of task interleaving.

use std::{
    path::Path,
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::ApprovalError;

use super::types::{ApprovalRequest, ApprovalStatus, ImpactLevel};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS approvals (
    id              TEXT PRIMARY KEY,
    created_at      TEXT NOT NULL,
    agent_id        TEXT NOT NULL,
    action_type     TEXT NOT NULL,
    action_data     TEXT NOT NULL,
    impact_level    TEXT NOT NULL,
    reason          TEXT NOT NULL,
    status          TEXT NOT NULL,
    resolver        TEXT,
    resolved_at     TEXT,
    timeout_seconds INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status, created_at);
";

/// The approval table.
pub struct ApprovalStore {
    conn: Mutex<Connection>,
}

impl ApprovalStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, ApprovalError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, ApprovalError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a request row.
    pub fn upsert(&self, request: &ApprovalRequest) -> Result<(), ApprovalError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO approvals
             (id, created_at, agent_id, action_type, action_data, impact_level,
              reason, status, resolver, resolved_at, timeout_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                request.id,
                request.created_at.to_rfc3339(),
                request.agent_id,
                request.action_type,
                serde_json::to_string(&request.action_data)?,
                request.impact_level.as_str(),
                request.reason,
                request.status.as_str(),
                request.resolver,
                request.resolved_at.map(|t| t.to_rfc3339()),
                request.timeout_seconds as i64,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single request.
    pub fn get(&self, id: &str) -> Result<Option<ApprovalRequest>, ApprovalError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, created_at, agent_id, action_type, action_data, impact_level,
                        reason, status, resolver, resolved_at, timeout_seconds
                 FROM approvals WHERE id = ?1",
                params![id],
                row_to_request,
            )
            .optional()?;
        Ok(row)
    }

    /// All pending requests, newest first.
    pub fn pending(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, agent_id, action_type, action_data, impact_level,
                    reason, status, resolver, resolved_at, timeout_seconds
             FROM approvals WHERE status = 'pending' ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_request)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// `pending → status` transition.  Returns false (without mutation) when
    /// the row is missing or already terminal.
    pub fn resolve_if_pending(
        &self,
        id: &str,
        status: ApprovalStatus,
        resolver: Option<&str>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, ApprovalError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE approvals SET status = ?2, resolver = ?3, resolved_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![
                id,
                status.as_str(),
                resolver,
                resolved_at.to_rfc3339()
            ],
        )?;
        Ok(changed == 1)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            // A poisoned mutex means a panic mid-query; the connection itself
            // is still usable for independent statements.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    let action_data: String = row.get(4)?;
    let impact: String = row.get(5)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(1)?;
    let resolved_at: Option<String> = row.get(9)?;
    let timeout: i64 = row.get(10)?;

    Ok(ApprovalRequest {
        id: row.get(0)?,
        created_at: parse_ts(&created_at),
        agent_id: row.get(2)?,
        action_type: row.get(3)?,
        action_data: serde_json::from_str(&action_data).unwrap_or(serde_json::Value::Null),
        impact_level: ImpactLevel::parse(&impact).unwrap_or(ImpactLevel::Low),
        reason: row.get(6)?,
        status: ApprovalStatus::parse(&status).unwrap_or(ApprovalStatus::Pending),
        resolver: row.get(8)?,
        resolved_at: resolved_at.map(|s| parse_ts(&s)),
        timeout_seconds: timeout as u64,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
