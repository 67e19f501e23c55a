//! Credential issuance and the access gate.
//!
//! Credentials are opaque random tokens with an issuance and expiry
//! instant; once stored they are never mutated and never revoked early.
//! The gate is a stateless per-call validator over the injected credential
//! store, so it is safe to run concurrently with issuance: the store gives
//! read-your-writes, nothing is cached here.

use std::time::Duration;

use crate::error::{AuthError, GateError, IssueError};
use crate::storage::CredentialStore;
use crate::{new_object_id, now_ms, Credential};

/// Default credential lifetime: one year.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub struct CredentialIssuer {
    store: Box<dyn CredentialStore>,
}

impl CredentialIssuer {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Mints, persists and returns a fresh credential valid for
    /// `validity` from now. A zero validity is rejected.
    pub fn issue(&self, validity: Duration) -> Result<Credential, IssueError> {
        let now = now_ms().map_err(|_| IssueError::Clock)?;
        self.issue_at(now, validity)
    }

    /// Deterministic entry point used by tests; `now_ms` stands in for the
    /// wall clock.
    pub fn issue_at(&self, now_ms: i64, validity: Duration) -> Result<Credential, IssueError> {
        let validity_ms = i64::try_from(validity.as_millis()).map_err(|_| IssueError::InvalidValidity)?;
        if validity_ms <= 0 {
            return Err(IssueError::InvalidValidity);
        }
        let credential = Credential {
            token: new_object_id(),
            issued_at_ms: now_ms,
            expires_at_ms: now_ms + validity_ms,
        };
        self.store
            .insert_credential(&credential)
            .map_err(IssueError::Store)?;
        log::info!(
            "issued credential expiring at {}",
            crate::format_civil(credential.expires_at_ms).unwrap_or_default()
        );
        Ok(credential)
    }
}

pub struct AccessGate {
    store: Box<dyn CredentialStore>,
}

impl AccessGate {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Validates a presented token: unknown tokens are invalid, an expiry
    /// instant equal to "now" is already expired. Read-only.
    pub fn authorize(&self, token: &str) -> Result<Credential, GateError> {
        let now = now_ms().map_err(|_| GateError::Clock)?;
        self.authorize_at(token, now)
    }

    pub fn authorize_at(&self, token: &str, now_ms: i64) -> Result<Credential, GateError> {
        let credential = self
            .store
            .find_credential(token)
            .map_err(GateError::Store)?
            .ok_or(AuthError::InvalidCredential)?;
        if credential.is_expired_at(now_ms) {
            return Err(AuthError::Expired.into());
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn issuer_and_gate() -> (CredentialIssuer, AccessGate) {
        let store = InMemoryStore::new();
        (
            CredentialIssuer::new(Box::new(store.clone())),
            AccessGate::new(Box::new(store)),
        )
    }

    #[test]
    fn issue_then_authorize_round_trip() {
        let (issuer, gate) = issuer_and_gate();
        let validity = Duration::from_secs(3600);
        let issued = issuer.issue_at(50_000, validity).unwrap();
        assert_eq!(
            issued.expires_at_ms - issued.issued_at_ms,
            validity.as_millis() as i64
        );

        let authorized = gate.authorize_at(&issued.token, 60_000).unwrap();
        assert_eq!(authorized, issued);
    }

    #[test]
    fn freshly_issued_credential_is_immediately_visible() {
        let (issuer, gate) = issuer_and_gate();
        let issued = issuer.issue(DEFAULT_TOKEN_VALIDITY).unwrap();
        assert!(gate.authorize(&issued.token).is_ok());
    }

    #[test]
    fn unknown_token_is_invalid() {
        let (_issuer, gate) = issuer_and_gate();
        let err = gate.authorize_at("bad-token", 0).unwrap_err();
        assert!(matches!(err, GateError::Auth(AuthError::InvalidCredential)));
    }

    #[test]
    fn expiry_boundary_is_closed() {
        let (issuer, gate) = issuer_and_gate();
        let issued = issuer.issue_at(0, Duration::from_millis(1_000)).unwrap();
        assert!(gate.authorize_at(&issued.token, 999).is_ok());
        let err = gate.authorize_at(&issued.token, 1_000).unwrap_err();
        assert!(matches!(err, GateError::Auth(AuthError::Expired)));
    }

    #[test]
    fn zero_validity_is_rejected() {
        let (issuer, _gate) = issuer_and_gate();
        assert!(matches!(
            issuer.issue_at(0, Duration::from_secs(0)),
            Err(IssueError::InvalidValidity)
        ));
    }

    #[test]
    fn tokens_are_unique_across_issuances() {
        let (issuer, _gate) = issuer_and_gate();
        let a = issuer.issue_at(0, Duration::from_secs(60)).unwrap();
        let b = issuer.issue_at(0, Duration::from_secs(60)).unwrap();
        assert_ne!(a.token, b.token);
    }
}
