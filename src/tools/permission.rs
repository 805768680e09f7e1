//! Permission Manager collaborator and the per-session grant cache the
//! Tool Loop consults.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use uuid::Uuid;

/// How dangerous a tool call is considered, governing when it needs user
/// approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionLevel {
    /// Auto-approved, always.
    Safe,
    /// Asked once per session, then cached.
    Cautious,
    /// Asked every single call.
    Dangerous,
    /// Never executed; synthesizes a denial result.
    Blocked,
}

impl PermissionLevel {
    /// Parse a config file's `level` string. Unrecognized values return
    /// `None` rather than defaulting, so the caller can warn and skip the
    /// override instead of silently loosening or tightening a tool.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "cautious" => Some(Self::Cautious),
            "dangerous" => Some(Self::Dangerous),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// What the Permission Manager (or a cached grant) decided for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Approve,
    Deny,
    /// The UI collaborator must be asked; the core blocks on its reply.
    Ask,
}

/// The Permission Manager collaborator. `check` takes `session_id`
/// alongside `(participant, tool_name, level)`: a `CAUTIOUS` grant is
/// scoped per-session, so whatever implements this trait needs to know
/// which session's cache to consult (see DESIGN.md).
#[async_trait]
pub trait PermissionManager: Send + Sync {
    async fn check(
        &self,
        session_id: Uuid,
        participant: &str,
        tool_name: &str,
        level: PermissionLevel,
    ) -> PermissionDecision;

    fn record(&self, session_id: Uuid, tool_name: &str, approved: bool);
}

/// Per-session cache of `CAUTIOUS` grants: once a tool is approved for a
/// session it is never asked again for that session.
#[derive(Default)]
pub struct SessionGrantCache {
    granted: RwLock<HashSet<(Uuid, String)>>,
}

impl SessionGrantCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_granted(&self, session_id: Uuid, tool_name: &str) -> bool {
        self.granted
            .read()
            .expect("grant cache lock poisoned")
            .contains(&(session_id, tool_name.to_string()))
    }

    pub fn grant(&self, session_id: Uuid, tool_name: &str) {
        self.granted
            .write()
            .expect("grant cache lock poisoned")
            .insert((session_id, tool_name.to_string()));
    }
}

/// A `PermissionManager` that consults the session grant cache for
/// `CAUTIOUS` tools and otherwise defers to a caller-supplied "ask the UI"
/// callback. `SAFE` auto-approves, `BLOCKED` auto-denies, `DANGEROUS`
/// always asks.
pub struct DefaultPermissionManager {
    cache: SessionGrantCache,
}

impl DefaultPermissionManager {
    pub fn new() -> Self {
        Self {
            cache: SessionGrantCache::new(),
        }
    }
}

impl Default for DefaultPermissionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionManager for DefaultPermissionManager {
    async fn check(
        &self,
        session_id: Uuid,
        _participant: &str,
        tool_name: &str,
        level: PermissionLevel,
    ) -> PermissionDecision {
        match level {
            PermissionLevel::Safe => PermissionDecision::Approve,
            PermissionLevel::Blocked => PermissionDecision::Deny,
            PermissionLevel::Dangerous => PermissionDecision::Ask,
            PermissionLevel::Cautious => {
                if self.cache.is_granted(session_id, tool_name) {
                    PermissionDecision::Approve
                } else {
                    PermissionDecision::Ask
                }
            }
        }
    }

    fn record(&self, session_id: Uuid, tool_name: &str, approved: bool) {
        if approved {
            self.cache.grant(session_id, tool_name);
        }
    }
}

impl DefaultPermissionManager {
    /// Cautious-level fast path: true once a prior `record(.., true)` has
    /// been observed for this (session, tool) pair.
    pub fn cached_grant(&self, session_id: Uuid, tool_name: &str) -> bool {
        self.cache.is_granted(session_id, tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn safe_always_approves() {
        let mgr = DefaultPermissionManager::new();
        let d = mgr.check(Uuid::new_v4(), "claude", "read_file", PermissionLevel::Safe).await;
        assert_eq!(d, PermissionDecision::Approve);
    }

    #[tokio::test]
    async fn blocked_always_denies() {
        let mgr = DefaultPermissionManager::new();
        let d = mgr.check(Uuid::new_v4(), "claude", "rm_rf", PermissionLevel::Blocked).await;
        assert_eq!(d, PermissionDecision::Deny);
    }

    #[tokio::test]
    async fn cautious_is_asked_once_then_approved() {
        let mgr = DefaultPermissionManager::new();
        let session = Uuid::new_v4();
        let first = mgr.check(session, "claude", "write_file", PermissionLevel::Cautious).await;
        assert_eq!(first, PermissionDecision::Ask);

        mgr.record(session, "write_file", true);

        let second = mgr.check(session, "claude", "write_file", PermissionLevel::Cautious).await;
        assert_eq!(second, PermissionDecision::Approve);
    }
}
