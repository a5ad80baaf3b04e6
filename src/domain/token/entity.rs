//! Delegated token types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::binding::Namespace;
use crate::domain::identity::UserId;
use crate::domain::knowledge_base::KnowledgeBaseId;
use crate::domain::sharing::PermissionLevel;

/// Lifetime used when none is configured (ten minutes)
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 600;

/// Hard upper bound on any delegated token lifetime
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Reason a delegated token was refused
///
/// All variants render identically so callers cannot tell an expired token
/// from a forged one. The variant is for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    Invalid,
    /// Valid token whose level is below what the request needs
    InsufficientLevel,
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token rejected")
    }
}

/// What a token is being requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScope {
    KnowledgeBase(KnowledgeBaseId),
    Namespace(Namespace),
}

/// Signed payload of a delegated token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// External namespace
    pub ns: String,
    /// Permission level
    pub lvl: PermissionLevel,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

impl TokenClaims {
    pub fn new(
        subject: &UserId,
        namespace: &Namespace,
        level: PermissionLevel,
        issued_at: i64,
        lifetime_secs: i64,
    ) -> Self {
        Self {
            sub: subject.as_str().to_string(),
            ns: namespace.as_str().to_string(),
            lvl: level,
            iat: issued_at,
            exp: issued_at + lifetime_secs,
        }
    }

    /// A token is expired from the instant `now` reaches `exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// A freshly issued token handed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct DelegatedToken {
    pub token: String,
    pub subject: UserId,
    pub namespace: Namespace,
    pub level: PermissionLevel,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Claims of a token whose signature and expiry checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: UserId,
    pub namespace: Namespace,
    pub level: PermissionLevel,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<TokenClaims> for VerifiedToken {
    type Error = TokenRejection;

    fn try_from(claims: TokenClaims) -> Result<Self, Self::Error> {
        let subject = UserId::new(claims.sub).map_err(|_| TokenRejection::Invalid)?;
        let namespace = Namespace::new(claims.ns).map_err(|_| TokenRejection::Invalid)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenRejection::Invalid)?;

        Ok(Self {
            subject,
            namespace,
            level: claims.lvl,
            expires_at,
        })
    }
}

/// Clamp a configured lifetime into `1..=MAX_TOKEN_LIFETIME_SECS`
pub fn clamp_lifetime(lifetime_secs: i64) -> i64 {
    lifetime_secs.clamp(1, MAX_TOKEN_LIFETIME_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, lifetime: i64) -> TokenClaims {
        TokenClaims::new(
            &UserId::new("alice").unwrap(),
            &Namespace::new("manuals-ns").unwrap(),
            PermissionLevel::Query,
            iat,
            lifetime,
        )
    }

    #[test]
    fn test_expiry_boundary() {
        let claims = claims(1_000, 600);
        assert!(!claims.is_expired_at(1_599));
        assert!(claims.is_expired_at(1_600));
        assert!(claims.is_expired_at(1_601));
    }

    #[test]
    fn test_rejections_render_identically() {
        assert_eq!(
            TokenRejection::Expired.to_string(),
            TokenRejection::Invalid.to_string()
        );
        assert_eq!(
            TokenRejection::InsufficientLevel.to_string(),
            TokenRejection::Invalid.to_string()
        );
    }

    #[test]
    fn test_lifetime_clamped() {
        assert_eq!(clamp_lifetime(86_400), MAX_TOKEN_LIFETIME_SECS);
        assert_eq!(clamp_lifetime(0), 1);
        assert_eq!(clamp_lifetime(DEFAULT_TOKEN_LIFETIME_SECS), 600);
    }

    #[test]
    fn test_claims_serialize_compactly() {
        let json = serde_json::to_value(claims(10, 600)).unwrap();
        assert_eq!(json["ns"], "manuals-ns");
        assert_eq!(json["lvl"], "query");
        assert_eq!(json["exp"], 610);
        assert!(json.get("kb").is_none());
    }

    #[test]
    fn test_verified_token_rejects_malformed_subject() {
        let mut claims = claims(10, 600);
        claims.sub = "bad/subject".to_string();
        assert_eq!(
            VerifiedToken::try_from(claims).unwrap_err(),
            TokenRejection::Invalid
        );
    }
}
