//! Bearer token derivation and verification.
//!
//! A token is a pure function of the session name and the process-wide shared
//! secret: `base64(sha256(session + secret))` with the two base64 characters
//! that are unsafe in URLs and headers substituted (`/` to `_`, `+` to `-`).
//! Verification reverses the substitution and recomputes. There is no
//! revocation list and no expiry; rotating the shared secret invalidates
//! every outstanding token at once.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// A freshly derived token in both accepted presentation forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedToken {
    /// Transport-safe token carried in the `Authorization` header.
    pub token: String,
    /// Legacy combined form accepted in place of a bare session name.
    pub full: String,
}

/// Derives and verifies bearer tokens bound to a session identity.
#[derive(Debug, Clone)]
pub struct TokenService {
    secret: String,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Derives the token for `session`.
    pub fn derive(&self, session: &str) -> DerivedToken {
        let digest = Sha256::digest(format!("{}{}", session, self.secret).as_bytes());
        let token = BASE64.encode(digest).replace('/', "_").replace('+', "-");
        DerivedToken {
            full: format!("{session}:{token}"),
            token,
        }
    }

    /// Verifies a presented token against the recomputed digest for `session`.
    pub fn verify(&self, session: &str, presented: &str) -> Result<(), AuthError> {
        let decoded = presented.replace('_', "/").replace('-', "+");
        let digest = Sha256::digest(format!("{}{}", session, self.secret).as_bytes());
        if BASE64.encode(digest) == decoded {
            Ok(())
        } else {
            Err(AuthError::TokenMismatch)
        }
    }

    /// Authenticates a request from its session path segment and optional
    /// bearer value, returning the canonical session name.
    ///
    /// Two presentation forms are accepted: a bearer token paired with a
    /// session name (the path segment may itself carry a stale `:`-combined
    /// value, so only its leading segment names the session), or the legacy
    /// combined `"<session>:<token>"` form with no header at all.
    pub fn authenticate(
        &self,
        session_param: &str,
        bearer: Option<&str>,
    ) -> Result<String, AuthError> {
        if session_param.is_empty() {
            return Err(AuthError::SessionMissing);
        }

        let (session, token) = match bearer {
            Some(token) if !token.is_empty() => {
                let session = session_param.split(':').next().unwrap_or_default();
                (session, token)
            }
            _ => match session_param.split_once(':') {
                Some((session, token)) if !token.is_empty() => (session, token),
                _ => return Err(AuthError::TokenMissing),
            },
        };

        self.verify(session, token)?;
        Ok(session.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_then_verify_round_trips() {
        let service = TokenService::new("THISISMYSECURETOKEN");
        let derived = service.derive("NERDWHATS_AMERICA");
        assert!(service.verify("NERDWHATS_AMERICA", &derived.token).is_ok());
    }

    #[test]
    fn derived_token_is_transport_safe() {
        let service = TokenService::new("THISISMYSECURETOKEN");
        let derived = service.derive("NERDWHATS_AMERICA");
        assert!(!derived.token.contains('/'));
        assert!(!derived.token.contains('+'));
        assert_eq!(derived.full, format!("NERDWHATS_AMERICA:{}", derived.token));
    }

    #[test]
    fn substitution_reversal_reproduces_digest() {
        let service = TokenService::new("THISISMYSECURETOKEN");
        let derived = service.derive("NERDWHATS_AMERICA");
        let decoded = derived.token.replace('_', "/").replace('-', "+");
        let digest = Sha256::digest("NERDWHATS_AMERICATHISISMYSECURETOKEN".as_bytes());
        assert_eq!(decoded, BASE64.encode(digest));
    }

    #[test]
    fn verify_rejects_other_session_or_secret() {
        let service = TokenService::new("secret-a");
        let derived = service.derive("tenant-a");

        assert_eq!(
            service.verify("tenant-b", &derived.token),
            Err(AuthError::TokenMismatch)
        );

        let other = TokenService::new("secret-b");
        assert_eq!(
            other.verify("tenant-a", &derived.token),
            Err(AuthError::TokenMismatch)
        );
    }

    #[test]
    fn authenticate_accepts_bearer_form() {
        let service = TokenService::new("secret");
        let derived = service.derive("tenant");

        let name = service.authenticate("tenant", Some(&derived.token)).unwrap();
        assert_eq!(name, "tenant");

        // A combined value in the path still pairs with the header token.
        let name = service
            .authenticate(&format!("tenant:{}", derived.token), Some(&derived.token))
            .unwrap();
        assert_eq!(name, "tenant");
    }

    #[test]
    fn authenticate_accepts_legacy_combined_form() {
        let service = TokenService::new("secret");
        let derived = service.derive("tenant");

        let name = service.authenticate(&derived.full, None).unwrap();
        assert_eq!(name, "tenant");
    }

    #[test]
    fn authenticate_fails_without_any_token() {
        let service = TokenService::new("secret");
        assert_eq!(
            service.authenticate("tenant", None),
            Err(AuthError::TokenMissing)
        );
        assert_eq!(service.authenticate("", None), Err(AuthError::SessionMissing));
    }
}
