//! Query router - forwards token-authorized queries to the engine

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::domain::query::{QueryPayload, QueryResponse, RequestKind};
use crate::domain::token::TokenRejection;
use crate::domain::DomainError;
use crate::infrastructure::engine::ExternalEngine;
use crate::infrastructure::observability::record_query_routed;

use super::namespace_limiter::NamespaceLimiter;
use super::token_issuer::TokenIssuer;

/// Routes chat, text and search requests on behalf of a token holder
///
/// The token is the capability: the ledger is not consulted again. Nothing
/// leaves the boundary until the token has been verified against the
/// level the request kind needs. No retries happen here.
pub struct QueryRouter {
    issuer: Arc<TokenIssuer>,
    limiter: Arc<NamespaceLimiter>,
    engine: Arc<ExternalEngine>,
}

impl std::fmt::Debug for QueryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRouter")
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl QueryRouter {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        limiter: Arc<NamespaceLimiter>,
        engine: Arc<ExternalEngine>,
    ) -> Self {
        Self {
            issuer,
            limiter,
            engine,
        }
    }

    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn route(
        &self,
        token: &str,
        kind: RequestKind,
        payload: &QueryPayload,
    ) -> Result<QueryResponse, DomainError> {
        let started = Instant::now();

        let verified = self.issuer.verify(token).map_err(|reason| {
            debug!(reason = ?reason, "Rejected delegated token");
            record_query_routed(kind, "unauthorized", started.elapsed());
            DomainError::unauthorized(reason)
        })?;

        if !verified.level.satisfies(kind.required_level()) {
            record_query_routed(kind, "unauthorized", started.elapsed());
            return Err(DomainError::unauthorized(TokenRejection::InsufficientLevel));
        }

        let query = payload.normalize(kind)?;

        let _permit = self.limiter.acquire(&verified.namespace).await?;

        let answer = match self.engine.query(&verified.namespace, &query, token).await {
            Ok(answer) => answer,
            Err(e) => {
                record_query_routed(kind, "upstream_error", started.elapsed());
                return Err(e);
            }
        };

        record_query_routed(kind, "ok", started.elapsed());
        info!(namespace = %verified.namespace, subject = %verified.subject, "Routed query");

        Ok(QueryResponse {
            kind,
            namespace: verified.namespace,
            answer: answer.answer,
            raw: answer.raw,
        })
    }
}
