use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::error::{Error, Result};
use crate::middleware::auth::Claims;

/// Mints an HS256 token accepted by the auth middleware.
pub fn issue_token(secret: &str, sub: &str, role: Option<&str>, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        role: role.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("failed to sign token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn issued_token_round_trips_claims() {
        let token = issue_token("secret", "student-7", Some("student"), Duration::minutes(5)).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "student-7");
        assert_eq!(data.claims.role.as_deref(), Some("student"));
        assert!(!data.claims.has_role(&crate::middleware::auth::GRADER_ROLES));
    }
}
