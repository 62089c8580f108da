//! Per-request access checks for session-scoped endpoints.
//!
//! The relay does not authenticate users itself. An [`AccessGate`] is asked
//! before any session is read or driven, and deployments plug in whatever
//! identity system fronts them.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};

/// What the caller wants to do with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerb {
    /// Read events, capabilities or diagnostics.
    Get,
    /// Start runs, interrupt them or submit feedback.
    Update,
}

impl AccessVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessVerb::Get => "get",
            AccessVerb::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("Invalid or missing token")]
    Unauthenticated,
    #[error("Unauthorized")]
    Forbidden,
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn check(
        &self,
        headers: &HeaderMap,
        project: &str,
        session: &str,
        verb: AccessVerb,
    ) -> Result<(), AccessDenied>;
}

/// Lets every request through. For local development and deployments that
/// authorize upstream of the relay.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AccessGate for AllowAll {
    async fn check(
        &self,
        _headers: &HeaderMap,
        _project: &str,
        _session: &str,
        _verb: AccessVerb,
    ) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Requires a non-empty `Authorization: Bearer` credential.
///
/// Only presence is checked. An optional project allow-list narrows which
/// namespaces may be addressed at all.
///
/// `agui-relay serve --require-bearer-token [--allowed-projects ..]` installs
/// it in place of [`AllowAll`].
#[derive(Debug, Default, Clone)]
pub struct BearerTokenGate {
    allowed_projects: Option<Vec<String>>,
}

impl BearerTokenGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_projects(mut self, projects: Vec<String>) -> Self {
        self.allowed_projects = Some(projects);
        self
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl AccessGate for BearerTokenGate {
    async fn check(
        &self,
        headers: &HeaderMap,
        project: &str,
        session: &str,
        verb: AccessVerb,
    ) -> Result<(), AccessDenied> {
        if bearer_token(headers).is_none() {
            return Err(AccessDenied::Unauthenticated);
        }
        if let Some(allowed) = &self.allowed_projects {
            if !allowed.iter().any(|p| p == project) {
                tracing::debug!(project, session, verb = verb.as_str(), "project not in allow-list");
                return Err(AccessDenied::Forbidden);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&with_auth("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&with_auth("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&with_auth("Bearer ")), None);
        assert_eq!(bearer_token(&with_auth("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn allow_all_admits_anonymous_requests() {
        let result = AllowAll.check(&HeaderMap::new(), "p", "s", AccessVerb::Update).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn bearer_gate_requires_a_token() {
        let gate = BearerTokenGate::new();
        assert_eq!(
            gate.check(&HeaderMap::new(), "p", "s", AccessVerb::Get).await,
            Err(AccessDenied::Unauthenticated)
        );
        assert!(gate.check(&with_auth("Bearer t"), "p", "s", AccessVerb::Get).await.is_ok());
    }

    #[tokio::test]
    async fn bearer_gate_enforces_project_allow_list() {
        let gate = BearerTokenGate::new().with_allowed_projects(vec!["team-a".into()]);
        let headers = with_auth("Bearer t");
        assert!(gate.check(&headers, "team-a", "s", AccessVerb::Update).await.is_ok());
        assert_eq!(
            gate.check(&headers, "team-b", "s", AccessVerb::Update).await,
            Err(AccessDenied::Forbidden)
        );
    }

    #[test]
    fn denial_messages_match_the_wire_contract() {
        assert_eq!(AccessDenied::Unauthenticated.to_string(), "Invalid or missing token");
        assert_eq!(AccessDenied::Forbidden.to_string(), "Unauthorized");
    }
}
