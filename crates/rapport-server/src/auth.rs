//! Connection authentication.
//!
//! The gateway never validates credentials itself; it asks an
//! [`Authenticator`] to turn the connect token into an [`Identity`].

use std::collections::HashMap;

use async_trait::async_trait;
use rapport_core::errors::LiveError;
use rapport_core::ids::{SessionId, UserId};
use rapport_core::session::Identity;
use rapport_settings::TokenGrant;

/// Resolves a connect token to a verified identity and role.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate `token` for `session_id`.
    async fn authenticate(&self, token: &str, session_id: &SessionId)
    -> Result<Identity, LiveError>;
}

/// Fixed token table for development and tests.
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    grants: HashMap<String, TokenGrant>,
}

impl StaticTokenAuthenticator {
    /// Build from configured grants. Later duplicates win.
    pub fn new(grants: impl IntoIterator<Item = TokenGrant>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|g| (g.token.clone(), g))
                .collect(),
        }
    }

    /// Number of accepted tokens.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether no token is accepted.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(
        &self,
        token: &str,
        session_id: &SessionId,
    ) -> Result<Identity, LiveError> {
        let grant = self
            .grants
            .get(token)
            .ok_or_else(|| LiveError::Unauthorized("unknown token".into()))?;
        if !grant.sessions.is_empty() && !grant.sessions.iter().any(|s| s == session_id.as_str()) {
            return Err(LiveError::Unauthorized(format!(
                "token not valid for session {session_id}"
            )));
        }
        Ok(Identity {
            user_id: UserId::from_raw(grant.user_id.clone()),
            role: grant.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rapport_core::session::ConnectionRole;

    use super::*;

    fn grant(token: &str, user: &str, role: ConnectionRole, sessions: &[&str]) -> TokenGrant {
        TokenGrant {
            token: token.into(),
            user_id: user.into(),
            role,
            sessions: sessions.iter().map(ToString::to_string).collect(),
        }
    }

    fn auth() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new([
            grant("host-token", "alice", ConnectionRole::Host, &[]),
            grant("obs-token", "bob", ConnectionRole::Observer, &["sess_1"]),
        ])
    }

    #[tokio::test]
    async fn known_token_resolves_identity() {
        let id = auth()
            .authenticate("host-token", &SessionId::from_raw("sess_9"))
            .await
            .unwrap();
        assert_eq!(id.user_id.as_str(), "alice");
        assert!(id.is_host());
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let err = auth()
            .authenticate("nope", &SessionId::from_raw("sess_1"))
            .await
            .unwrap_err();
        assert_matches!(err, LiveError::Unauthorized(_));
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn session_scoped_token() {
        let a = auth();
        let ok = a
            .authenticate("obs-token", &SessionId::from_raw("sess_1"))
            .await
            .unwrap();
        assert_eq!(ok.role, ConnectionRole::Observer);
        let err = a
            .authenticate("obs-token", &SessionId::from_raw("sess_2"))
            .await
            .unwrap_err();
        assert_matches!(err, LiveError::Unauthorized(_));
    }

    #[test]
    fn empty_table() {
        assert!(StaticTokenAuthenticator::default().is_empty());
        assert_eq!(auth().len(), 2);
    }
}
