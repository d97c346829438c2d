//! Collaborator callbacks implemented outside the core.
//!
//! The engine consumes these at operation boundaries: a confirmation
//! gate before destructive actions, a usage-audit sink, and a user
//! notification channel for retryable failures.

use tracing::debug;

/// Host-application callbacks consumed by the engine.
pub trait Collaborator: Send + Sync {
    /// Ask the initiating user to confirm a destructive action.
    /// Returning false aborts the operation before any write.
    fn confirm_destructive_action(&self, prompt: &str) -> bool;

    /// Record a usage-audit entry (distinct from the change log).
    fn record_audit_entry(&self, entry: serde_json::Value);

    /// Notify an audience of users out of band.
    fn notify_users(&self, title: &str, body: &str, audience: &str);
}

/// Headless collaborator: approves everything, logs at debug level.
pub struct AutoConfirm;

impl Collaborator for AutoConfirm {
    fn confirm_destructive_action(&self, prompt: &str) -> bool {
        debug!(prompt, "auto-confirming destructive action");
        true
    }

    fn record_audit_entry(&self, entry: serde_json::Value) {
        debug!(%entry, "audit");
    }

    fn notify_users(&self, title: &str, body: &str, audience: &str) {
        debug!(title, body, audience, "notification");
    }
}
