//! Security audit trail.
//!
//! Audit records are ordinary `tracing` events on the `gatehouse.audit`
//! target, so they follow the process log format (JSON in production) and
//! can be routed separately with an `EnvFilter` directive. Tokens, secrets
//! and raw claims never appear in a record.

use std::fmt;
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "gatehouse.audit";

/// Security-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    LoginSuccess,
    LoginFailure,
    Logout,
    TokenRefresh,
    TokenRejected,
    UnauthorizedAccess,
    ForbiddenAccess,
    CacheCleared,
    MissingSubject,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess => "login_success",
            AuditEvent::LoginFailure => "login_failure",
            AuditEvent::Logout => "logout",
            AuditEvent::TokenRefresh => "token_refresh",
            AuditEvent::TokenRejected => "token_rejected",
            AuditEvent::UnauthorizedAccess => "unauthorized_access",
            AuditEvent::ForbiddenAccess => "forbidden_access",
            AuditEvent::CacheCleared => "cache_cleared",
            AuditEvent::MissingSubject => "missing_subject",
        }
    }

    fn is_failure(self) -> bool {
        matches!(
            self,
            AuditEvent::LoginFailure
                | AuditEvent::TokenRejected
                | AuditEvent::UnauthorizedAccess
                | AuditEvent::ForbiddenAccess
                | AuditEvent::MissingSubject
        )
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record, built up and then emitted.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    event: AuditEvent,
    correlation_id: Uuid,
    user_id: Option<String>,
    username: Option<String>,
    ip_address: Option<String>,
    path: Option<String>,
    status_code: Option<u16>,
    detail: Option<String>,
}

impl AuditRecord {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            event,
            correlation_id: Uuid::new_v4(),
            user_id: None,
            username: None,
            ip_address: None,
            path: None,
            status_code: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn ip_address(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Short, non-sensitive explanation, e.g. a verification failure kind.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn event(&self) -> AuditEvent {
        self.event
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Write the record. Failures log at WARN, everything else at INFO.
    pub fn emit(self) {
        let user_id = self.user_id.as_deref().unwrap_or("");
        let username = self.username.as_deref().unwrap_or("");
        let ip_address = self.ip_address.as_deref().unwrap_or("");
        let path = self.path.as_deref().unwrap_or("");
        let detail = self.detail.as_deref().unwrap_or("");
        let status_code = self.status_code.unwrap_or(0);

        if self.event.is_failure() {
            tracing::warn!(
                target: AUDIT_TARGET,
                event_type = self.event.as_str(),
                correlation_id = %self.correlation_id,
                user_id,
                username,
                ip_address,
                path,
                status_code,
                detail,
                "Audit event"
            );
        } else {
            tracing::info!(
                target: AUDIT_TARGET,
                event_type = self.event.as_str(),
                correlation_id = %self.correlation_id,
                user_id,
                username,
                ip_address,
                path,
                status_code,
                detail,
                "Audit event"
            );
        }
    }
}
