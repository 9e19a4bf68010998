//! Conversation-scoped state threaded through every chat.
//!
//! Each conversation owns one session. The caller creates it and passes it
//! to `Agent::chat`; resources, the pending "load more" context and the
//! audit log live here for as long as the caller keeps it.

use crate::audit::AuditLog;
use crate::pagination::PaginationContext;
use crate::resource_context::ResourceTracker;

#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: String,
    pub resources: ResourceTracker,
    /// At most one pending continuation; the latest detection wins
    pub pagination: Option<PaginationContext>,
    pub audit: AuditLog,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resources: ResourceTracker::new(),
            pagination: None,
            audit: AuditLog::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forget tracked resources and any pending continuation.
    /// The audit log is kept.
    pub fn reset_context(&mut self) {
        self.resources.clear();
        self.pagination = None;
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_context::ResourceRecord;

    #[test]
    fn test_sessions_are_independent() {
        let mut a = ConversationSession::new();
        let b = ConversationSession::new();
        assert_ne!(a.id(), b.id());

        a.resources.record(ResourceRecord::new("s3 bucket", "logs"));
        assert!(b.resources.is_empty());

        a.reset_context();
        assert!(a.resources.is_empty());
        assert!(a.pagination.is_none());
    }
}
