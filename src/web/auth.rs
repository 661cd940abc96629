//! Bearer-token authentication for the HTTP API.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::identity::{users, Role, User};

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// Issue a token for `user`, valid for `ttl_hours`.
pub fn generate_token(secret: &str, user: &User, ttl_hours: u64) -> Result<String> {
    let now = chrono::Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role,
        exp: now + (ttl_hours as usize) * 3600,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Other(format!("token encoding failed: {}", e)))
}

/// Validate a token's signature and expiry.
pub fn validate_token(secret: &str, token: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| Error::Unauthenticated(format!("invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Extract token from Authorization header.
pub fn extract_token(auth_header: Option<&str>) -> Result<&str> {
    let header =
        auth_header.ok_or_else(|| Error::Unauthenticated("missing Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Unauthenticated("invalid Authorization header format".to_string()))
}

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Hash a password.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, HASH_COST).map_err(|e| Error::Other(format!("password hashing failed: {}", e)))
}

/// Verify a password. A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// [`hash_password`] on the blocking thread pool, for request handlers.
pub async fn hash_password_async(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Other(format!("password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking thread pool. A failed task is a mismatch.
pub async fn verify_password_async(password: &str, hash: &str) -> bool {
    let (password, hash) = (password.to_string(), hash.to_string());
    match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!("Password verification task failed: {}", e);
            false
        }
    }
}

/// The authenticated staff member behind a request.
///
/// Rejects with `Unauthenticated` when the token is missing, invalid or
/// expired, or when its user no longer exists or was deactivated.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppContext> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, ctx: &AppContext) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = extract_token(header)?;
        let claims = validate_token(&ctx.settings.auth.jwt_secret, token)?;

        let conn = ctx.db.connect()?;
        match users::get_user(&conn, claims.user_id)? {
            Some(user) if user.is_active => Ok(CurrentUser(user)),
            Some(_) => Err(Error::Unauthenticated("account is deactivated".to_string())),
            None => Err(Error::Unauthenticated("account no longer exists".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let env = TestEnv::new();
        let token = generate_token(SECRET, &env.agent_sales, 24).unwrap();
        let claims = validate_token(SECRET, &token).unwrap();

        assert_eq!(claims.user_id, env.agent_sales.id);
        assert_eq!(claims.username, "sofia");
        assert_eq!(claims.role, Role::Agent);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_wrong_secret_and_expired_token_rejected() {
        let env = TestEnv::new();
        let token = generate_token(SECRET, &env.admin, 1).unwrap();
        assert!(matches!(
            validate_token("other-secret", &token),
            Err(Error::Unauthenticated(_))
        ));

        let past = (chrono::Utc::now().timestamp() - 7200) as usize;
        let expired = encode(
            &Header::default(),
            &Claims {
                user_id: env.admin.id,
                username: env.admin.username.clone(),
                role: Role::Admin,
                exp: past,
                iat: past - 3600,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            validate_token(SECRET, &expired),
            Err(Error::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(extract_token(None).is_err());
        assert!(extract_token(Some("Basic abc")).is_err());
        assert!(extract_token(Some("Bearer ")).is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_password_hashing_off_runtime_thread() {
        let hash = hash_password_async("password123").await.unwrap();
        assert!(verify_password_async("password123", &hash).await);
        assert!(!verify_password_async("wrongpassword", &hash).await);
        assert!(verify_password("password123", &hash));
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("password123").unwrap();
        assert!(verify_password("password123", &hash));
        assert!(!verify_password("wrongpassword", &hash));
        assert!(!verify_password("password123", "not-a-bcrypt-hash"));
    }
}
