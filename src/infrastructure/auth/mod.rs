//! Authentication infrastructure module
//!
//! Signing and decoding of delegated tokens.

mod jwt;

pub use jwt::{JwtTokenSigner, SigningKey, TokenSigner, MIN_SECRET_BYTES};
