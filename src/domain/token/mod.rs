//! Token domain - delegated, namespace-scoped access tokens

mod entity;

pub use entity::{
    clamp_lifetime, DelegatedToken, TokenClaims, TokenRejection, TokenScope, VerifiedToken,
    DEFAULT_TOKEN_LIFETIME_SECS, MAX_TOKEN_LIFETIME_SECS,
};
