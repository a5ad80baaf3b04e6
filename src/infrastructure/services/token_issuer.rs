//! Token issuer - mints and verifies namespace-scoped delegated tokens

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, info, instrument};

use crate::domain::binding::Namespace;
use crate::domain::identity::UserId;
use crate::domain::sharing::PermissionLevel;
use crate::domain::token::{
    clamp_lifetime, DelegatedToken, TokenClaims, TokenRejection, TokenScope, VerifiedToken,
    MAX_TOKEN_LIFETIME_SECS,
};
use crate::domain::DomainError;
use crate::infrastructure::auth::TokenSigner;
use crate::infrastructure::observability::record_token_issued;

use super::binding_service::BindingService;
use super::permission_ledger::PermissionLedger;

/// Issues delegated tokens for the external engine
///
/// Tokens carry the namespace and never the internal knowledge base id.
pub struct TokenIssuer {
    signer: Arc<dyn TokenSigner>,
    bindings: Arc<BindingService>,
    ledger: Arc<PermissionLedger>,
    lifetime_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("signer", &self.signer)
            .field("lifetime_secs", &self.lifetime_secs)
            .finish()
    }
}

impl TokenIssuer {
    /// `lifetime_secs` is clamped to the hard maximum
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        bindings: Arc<BindingService>,
        ledger: Arc<PermissionLedger>,
        lifetime_secs: i64,
    ) -> Self {
        Self {
            signer,
            bindings,
            ledger,
            lifetime_secs: clamp_lifetime(lifetime_secs),
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Issue a token for `subject` at `level`
    ///
    /// A knowledge base scope resolves its binding. A namespace scope uses
    /// the best level the subject holds on any knowledge base bound to it.
    #[instrument(skip_all, fields(subject = %subject, level = %level))]
    pub async fn issue(
        &self,
        subject: &UserId,
        scope: TokenScope,
        level: PermissionLevel,
    ) -> Result<DelegatedToken, DomainError> {
        let namespace = match scope {
            TokenScope::KnowledgeBase(knowledge_base_id) => {
                self.ledger.authorize(&knowledge_base_id, subject, level).await?;
                self.bindings.resolve(&knowledge_base_id).await?
            }
            TokenScope::Namespace(namespace) => {
                let best = self.best_level_on_namespace(&namespace, subject).await?;

                match best {
                    None => {
                        return Err(DomainError::not_found(format!(
                            "Namespace '{}' not found",
                            namespace
                        )));
                    }
                    Some(held) if !held.satisfies(level) => {
                        return Err(DomainError::forbidden(format!(
                            "'{}' access is required on namespace '{}'",
                            level, namespace
                        )));
                    }
                    Some(_) => namespace,
                }
            }
        };

        self.mint(subject, &namespace, level)
    }

    async fn best_level_on_namespace(
        &self,
        namespace: &Namespace,
        subject: &UserId,
    ) -> Result<Option<PermissionLevel>, DomainError> {
        let mut best = None;

        for knowledge_base_id in self.bindings.reverse_resolve(namespace).await? {
            let level = match self.ledger.effective_level(&knowledge_base_id, subject).await {
                Ok(level) => level,
                // Binding of a knowledge base deleted concurrently
                Err(DomainError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };
            best = best.max(level);
        }

        Ok(best)
    }

    /// Sign a token without an access check; callers have authorized already
    pub fn mint(
        &self,
        subject: &UserId,
        namespace: &Namespace,
        level: PermissionLevel,
    ) -> Result<DelegatedToken, DomainError> {
        let issued_at = Utc::now().timestamp();
        let claims = TokenClaims::new(subject, namespace, level, issued_at, self.lifetime_secs);
        let token = self.signer.sign(&claims)?;

        let to_datetime = |secs: i64| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| DomainError::internal("Token timestamp out of range"))
        };

        record_token_issued(level);
        info!(namespace = %namespace, expires_at = claims.exp, "Issued delegated token");

        Ok(DelegatedToken {
            token,
            subject: subject.clone(),
            namespace: namespace.clone(),
            level,
            issued_at: to_datetime(claims.iat)?,
            expires_at: to_datetime(claims.exp)?,
        })
    }

    /// Verify signature and expiry against the current time
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenRejection> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify against an explicit clock; expired once `now >= exp`
    pub fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedToken, TokenRejection> {
        let claims = self.signer.decode(token)?;

        if claims.exp - claims.iat > MAX_TOKEN_LIFETIME_SECS || claims.exp <= claims.iat {
            debug!("Rejected token with out-of-range lifetime");
            return Err(TokenRejection::Invalid);
        }

        if claims.is_expired_at(now) {
            return Err(TokenRejection::Expired);
        }

        VerifiedToken::try_from(claims)
    }
}
