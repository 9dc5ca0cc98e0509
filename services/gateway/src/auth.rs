//! Session authentication.
//!
//! Clients authenticate in-band with a bearer token carried by the `auth`
//! message. Tokens are HS256 JWTs whose claims name the account the
//! session acts for.

use crate::error::AppError;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use types::ids::AccountId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub account_id: AccountId,
}

pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Validate a token and resolve the account it authenticates.
    pub fn verify(&self, token: &str) -> Result<AccountId, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?;
        Ok(data.claims.account_id)
    }
}
