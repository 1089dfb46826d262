// crates/dropgate-server/src/auth.rs
// ============================================================================
// Module: Server Authentication
// Description: Bearer-token principals and webhook secret checks.
// Purpose: Resolve callers fail-closed with constant-time comparisons.
// Dependencies: dropgate-config, dropgate-core, subtle
// ============================================================================

//! ## Overview
//! Callers present `Authorization: Bearer <token>`; the token is compared in
//! constant time against every configured principal and resolves to that
//! principal's id. Payment webhooks carry a shared secret in
//! [`WEBHOOK_SECRET_HEADER`], compared the same way. Download endpoints also
//! accept a signed download token instead, so a missing bearer header is not
//! an error there.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dropgate_config::ResolvedPrincipal;
use dropgate_core::PrincipalId;
use dropgate_core::StaticRecipientDirectory;
use dropgate_core::token_fingerprint;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the payment webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-dropgate-webhook-secret";
/// Largest authorization header accepted.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Resolved principal.
    pub principal: PrincipalId,
    /// Fingerprint of the presented token.
    pub token_fingerprint: String,
}

/// Static bearer-token authenticator.
pub struct BearerAuthenticator {
    /// Known principals and their tokens.
    principals: Vec<ResolvedPrincipal>,
}

impl BearerAuthenticator {
    /// Builds an authenticator over resolved principals.
    #[must_use]
    pub const fn new(principals: Vec<ResolvedPrincipal>) -> Self {
        Self {
            principals,
        }
    }

    /// Returns a recipient directory containing every principal.
    #[must_use]
    pub fn directory(&self) -> StaticRecipientDirectory {
        StaticRecipientDirectory::new(
            self.principals.iter().map(|principal| PrincipalId::new(principal.id.clone())),
        )
    }

    /// Resolves the caller from an authorization header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the header is absent,
    /// malformed, or names no principal.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Caller, AuthError> {
        let token = parse_bearer_token(header)?;
        let mut matched: Option<&ResolvedPrincipal> = None;
        for principal in &self.principals {
            let equal: bool = principal.token.as_bytes().ct_eq(token.as_bytes()).into();
            if equal && matched.is_none() {
                matched = Some(principal);
            }
        }
        let principal =
            matched.ok_or_else(|| AuthError::Unauthenticated("invalid bearer token".to_string()))?;
        Ok(Caller {
            principal: PrincipalId::new(principal.id.clone()),
            token_fingerprint: token_fingerprint(token),
        })
    }

    /// Resolves the caller when a header is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when a present header is invalid.
    pub fn authenticate_optional(&self, header: Option<&str>) -> Result<Option<Caller>, AuthError> {
        match header {
            None => Ok(None),
            Some(_) => self.authenticate(header).map(Some),
        }
    }
}

/// Compares a presented webhook secret in constant time.
#[must_use]
pub fn webhook_secret_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|value| bool::from(expected.as_bytes().ct_eq(value.trim().as_bytes())))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token from a `Bearer` authorization header.
fn parse_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header =
        header.ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use dropgate_config::ResolvedPrincipal;
    use dropgate_core::PrincipalId;
    use dropgate_core::RecipientDirectory;
    use dropgate_core::token_fingerprint;

    use super::AuthError;
    use super::BearerAuthenticator;
    use super::webhook_secret_matches;

    fn authenticator() -> BearerAuthenticator {
        BearerAuthenticator::new(vec![
            ResolvedPrincipal {
                id: "seller-1".to_string(),
                token: "tok-seller".to_string(),
            },
            ResolvedPrincipal {
                id: "buyer-1".to_string(),
                token: "tok-buyer".to_string(),
            },
        ])
    }

    #[test]
    fn bearer_token_resolves_its_principal() {
        let caller = authenticator().authenticate(Some("Bearer tok-buyer"));
        assert_eq!(caller.map(|caller| caller.principal), Ok(PrincipalId::new("buyer-1")));
    }

    #[test]
    fn caller_carries_token_fingerprint_only() {
        let fingerprint = authenticator()
            .authenticate(Some("Bearer tok-buyer"))
            .map(|caller| caller.token_fingerprint);
        assert_eq!(fingerprint, Ok(token_fingerprint("tok-buyer")));
        assert!(fingerprint.is_ok_and(|value| !value.contains("tok-buyer")));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(authenticator().authenticate(Some("bearer tok-seller")).is_ok());
    }

    #[test]
    fn unknown_and_malformed_tokens_are_rejected() {
        let auth = authenticator();
        for header in [None, Some("Bearer nope"), Some("Basic tok-buyer"), Some("Bearer ")] {
            assert!(matches!(auth.authenticate(header), Err(AuthError::Unauthenticated(_))));
        }
    }

    #[test]
    fn optional_authentication_allows_missing_header_only() {
        let auth = authenticator();
        assert_eq!(auth.authenticate_optional(None), Ok(None));
        assert!(auth.authenticate_optional(Some("Bearer nope")).is_err());
    }

    #[test]
    fn directory_lists_configured_principals() {
        let directory = authenticator().directory();
        assert!(directory.contains(&PrincipalId::new("seller-1")));
        assert!(!directory.contains(&PrincipalId::new("stranger")));
    }

    #[test]
    fn webhook_secret_requires_exact_match() {
        assert!(webhook_secret_matches("whsec", Some("whsec")));
        assert!(!webhook_secret_matches("whsec", Some("whsec2")));
        assert!(!webhook_secret_matches("whsec", None));
    }
}
