//! The approval queue: persistent pending requests, auto-approval rules,
//! timeout expiry, and notification callbacks.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use serde_json::Value;

use crate::error::ApprovalError;

use super::{
    rules::{AutoApprovalRules, RuleDecision},
    store::ApprovalStore,
    types::{ApprovalRequest, ApprovalStatus, ImpactLevel},
};

/// Notified (best-effort) whenever a new request enters `pending`.
pub type ApprovalCallback = Box<dyn Fn(&ApprovalRequest) + Send + Sync>;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Concurrency-safe approval queue over a SQLite store.
///
/// Mutating operations are serialised by the store's internal mutex; the
/// timeout watcher for each pending request is an independent spawned task
/// whose expiry transition is idempotent (`pending → expired` only).
pub struct ApprovalQueue {
    store: ApprovalStore,
    rules: AutoApprovalRules,
    callbacks: Mutex<Vec<ApprovalCallback>>,
    default_timeout_secs: u64,
}

impl ApprovalQueue {
    /// Open the queue backed by `approvals.db` at the given path.
    pub fn open(db_path: &Path) -> Result<Arc<Self>, ApprovalError> {
        Ok(Arc::new(Self {
            store: ApprovalStore::open(db_path)?,
            rules: AutoApprovalRules::default(),
            callbacks: Mutex::new(Vec::new()),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }))
    }

    /// In-memory queue for tests.
    pub fn open_in_memory() -> Result<Arc<Self>, ApprovalError> {
        Ok(Arc::new(Self {
            store: ApprovalStore::open_in_memory()?,
            rules: AutoApprovalRules::default(),
            callbacks: Mutex::new(Vec::new()),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }))
    }

    /// Register a callback invoked when a request enters `pending`.
    /// The list is append-only; individual callback panics are isolated.
    pub fn register_callback(&self, callback: ApprovalCallback) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Create a new request, consult the auto-approval rules, persist it, and
    /// (for pending requests) notify subscribers and arm the timeout watcher.
    pub async fn add_request(
        self: &Arc<Self>,
        agent_id: &str,
        action_type: &str,
        action_data: Value,
        impact_level: ImpactLevel,
        reason: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let timeout = timeout_seconds.unwrap_or(self.default_timeout_secs);
        let mut request = ApprovalRequest::new(
            agent_id,
            action_type,
            action_data,
            impact_level,
            reason,
            timeout,
        );

        match self.rules.evaluate(&request) {
            RuleDecision::Approve => {
                request.status = ApprovalStatus::Approved;
                request.resolver = Some("system".to_string());
                request.resolved_at = Some(Utc::now());
                log::info!("auto-approved request {}: {}", request.id, action_type);
            }
            RuleDecision::Pending => {
                log::info!(
                    "queued for approval {}: {} (impact: {})",
                    request.id,
                    action_type,
                    impact_level
                );
            }
        }

        self.store.upsert(&request)?;

        if request.status == ApprovalStatus::Pending {
            self.notify(&request);
            self.arm_timeout(&request);
        }

        Ok(request)
    }

    /// Approve a pending request.  Returns `Ok(false)` without mutation when
    /// the request is missing or already terminal.
    pub fn approve(&self, id: &str, resolver: &str) -> Result<bool, ApprovalError> {
        let resolved = self
            .store
            .resolve_if_pending(id, ApprovalStatus::Approved, Some(resolver), Utc::now())?;
        if resolved {
            log::info!("request {id} approved by {resolver}");
        }
        Ok(resolved)
    }

    /// Reject a pending request.  Same idempotence contract as [`approve`].
    pub fn reject(&self, id: &str, resolver: &str) -> Result<bool, ApprovalError> {
        let resolved = self
            .store
            .resolve_if_pending(id, ApprovalStatus::Rejected, Some(resolver), Utc::now())?;
        if resolved {
            log::info!("request {id} rejected by {resolver}");
        }
        Ok(resolved)
    }

    /// Fetch a request by id.
    pub fn get(&self, id: &str) -> Result<Option<ApprovalRequest>, ApprovalError> {
        self.store.get(id)
    }

    /// All currently pending requests, newest first.
    pub fn pending(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        self.store.pending()
    }

    fn notify(&self, request: &ApprovalRequest) {
        let Ok(callbacks) = self.callbacks.lock() else {
            return;
        };
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(request))).is_err() {
                log::error!("approval callback panicked for request {}", request.id);
            }
        }
    }

    /// Spawn the timeout watcher: after `timeout_seconds` the request expires
    /// unless it already reached a terminal state.
    fn arm_timeout(self: &Arc<Self>, request: &ApprovalRequest) {
        let queue = Arc::clone(self);
        let id = request.id.clone();
        let timeout = request.timeout_seconds;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout)).await;
            match queue
                .store
                .resolve_if_pending(&id, ApprovalStatus::Expired, None, Utc::now())
            {
                Ok(true) => log::warn!("request {id} expired after {timeout}s"),
                Ok(false) => {} // resolved before expiry
                Err(e) => log::error!("failed to expire request {id}: {e}"),
            }
        });
    }
}
