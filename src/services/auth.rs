use crate::error::{AppError, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

/// Verifies an HS256 bearer token issued by the identity service.
///
/// # Errors
/// Returns `AppError::AuthError` for any invalid, expired or malformed token.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::AuthError)
}

/// Issues a token for a user. Token issuance lives in the external identity
/// service; this mirror of its signing logic exists for tooling and tests.
///
/// # Errors
/// Returns `AppError::Internal` if signing fails.
pub fn issue_token(user_id: Uuid, secret: &str, ttl_secs: u64) -> Result<String> {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(std::time::Duration::from_secs(0))
        .as_secs() as usize
        + ttl_secs as usize;
    let claims = Claims { sub: user_id, exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|_| AppError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_token() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, "secret", 60).expect("issue");
        let claims = verify_token(&token, "secret").expect("verify");
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let token = issue_token(Uuid::new_v4(), "secret", 60).expect("issue");
        assert!(verify_token(&token, "other").is_err());
        assert!(verify_token("not-a-token", "secret").is_err());
    }
}
