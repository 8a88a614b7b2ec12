use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user: String,
    pub is_admin: bool,
    pub exp: i64,
}

/// Issues and verifies signed bearer tokens carrying `{user, is_admin, exp}`.
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expire_minutes: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    Invalid,
}

impl TokenAuthority {
    pub fn new(config: &Config) -> Result<Self> {
        if config.token.secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        Ok(TokenAuthority {
            encoding_key: EncodingKey::from_secret(config.token.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.token.secret.as_bytes()),
            expire_minutes: config.token.expire_minutes,
        })
    }

    pub fn issue(&self, username: &str, is_admin: bool) -> Result<(String, i64)> {
        let expires_in = self.expire_minutes * 60;
        let exp = now_unix() + expires_in;
        let claims = Claims {
            user: username.to_string(),
            is_admin,
            exp,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, expires_in))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
