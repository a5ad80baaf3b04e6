//! HS256 signing of delegated tokens with `kid`-based key rotation

use std::collections::HashMap;
use std::fmt::Debug;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;

use crate::domain::token::{TokenClaims, TokenRejection};
use crate::domain::DomainError;

/// Minimum decoded secret length in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// One HMAC key identified by `kid`
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    secret: Vec<u8>,
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"[hidden]")
            .finish()
    }
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, secret: Vec<u8>) -> Result<Self, DomainError> {
        let kid = kid.into();

        if kid.trim().is_empty() {
            return Err(DomainError::configuration("Signing key id cannot be empty"));
        }

        if secret.len() < MIN_SECRET_BYTES {
            return Err(DomainError::configuration(format!(
                "Signing key '{}' must be at least {} bytes",
                kid, MIN_SECRET_BYTES
            )));
        }

        Ok(Self { kid, secret })
    }

    /// Key from a base64url (no padding) secret, as in a JWK `k` member
    pub fn from_base64(kid: impl Into<String>, secret: &str) -> Result<Self, DomainError> {
        let kid = kid.into();
        let secret = URL_SAFE_NO_PAD.decode(secret.trim()).map_err(|e| {
            DomainError::configuration(format!("Signing key '{}' is not valid base64url: {}", kid, e))
        })?;
        Self::new(kid, secret)
    }

    /// Random key for development; tokens die with the process
    pub fn ephemeral() -> Self {
        let mut secret = vec![0u8; MIN_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut secret);
        let kid = format!("ephemeral-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        Self { kid, secret }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

/// Signs and decodes delegated token claims
///
/// Decoding only checks the signature and shape; expiry is the caller's
/// decision so the clock can be supplied explicitly.
pub trait TokenSigner: Send + Sync + Debug {
    fn sign(&self, claims: &TokenClaims) -> Result<String, DomainError>;

    fn decode(&self, token: &str) -> Result<TokenClaims, TokenRejection>;

    /// Key id used for new tokens
    fn active_kid(&self) -> &str;
}

/// HS256 signer with one active key and any number of retired verification keys
#[derive(Clone)]
pub struct JwtTokenSigner {
    active_kid: String,
    encoding_key: EncodingKey,
    decoding_keys: HashMap<String, DecodingKey>,
}

impl Debug for JwtTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kids: Vec<&String> = self.decoding_keys.keys().collect();
        kids.sort();
        f.debug_struct("JwtTokenSigner")
            .field("active_kid", &self.active_kid)
            .field("verification_kids", &kids)
            .field("encoding_key", &"[hidden]")
            .finish()
    }
}

impl JwtTokenSigner {
    pub fn new(active: SigningKey, retired: Vec<SigningKey>) -> Result<Self, DomainError> {
        let mut decoding_keys = HashMap::with_capacity(retired.len() + 1);
        decoding_keys.insert(
            active.kid.clone(),
            DecodingKey::from_secret(&active.secret),
        );

        for key in retired {
            if decoding_keys.contains_key(&key.kid) {
                return Err(DomainError::configuration(format!(
                    "Duplicate signing key id '{}'",
                    key.kid
                )));
            }
            decoding_keys.insert(key.kid.clone(), DecodingKey::from_secret(&key.secret));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(&active.secret),
            active_kid: active.kid,
            decoding_keys,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation
    }
}

impl TokenSigner for JwtTokenSigner {
    fn sign(&self, claims: &TokenClaims) -> Result<String, DomainError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.active_kid.clone());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| DomainError::internal(format!("Failed to sign token: {}", e)))
    }

    fn decode(&self, token: &str) -> Result<TokenClaims, TokenRejection> {
        let header = decode_header(token).map_err(|_| TokenRejection::Invalid)?;

        if header.alg != Algorithm::HS256 {
            return Err(TokenRejection::Invalid);
        }

        let key = header
            .kid
            .as_deref()
            .and_then(|kid| self.decoding_keys.get(kid))
            .ok_or(TokenRejection::Invalid)?;

        decode::<TokenClaims>(token, key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|_| TokenRejection::Invalid)
    }

    fn active_kid(&self) -> &str {
        &self.active_kid
    }
}
