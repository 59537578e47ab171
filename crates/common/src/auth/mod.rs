//! Authentication and authorization utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - Caller identity extraction
//! - Per-mutation authorization predicates

use crate::db::models::Role;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i32,

    pub role: Role,

    /// Request ID for tracing
    pub request_id: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Who is calling: nobody in particular, or a signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous { request_id: String },
    User(AuthContext),
}

impl Identity {
    pub fn anonymous() -> Self {
        Identity::Anonymous {
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn user(user_id: i32, role: Role) -> Self {
        Identity::User(AuthContext {
            user_id,
            role,
            request_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        match self {
            Identity::User(ctx) => Some(ctx),
            Identity::Anonymous { .. } => None,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Identity::User(ctx) => &ctx.request_id,
            Identity::Anonymous { request_id } => request_id,
        }
    }
}

/// Any signed-in, enabled user
pub fn any_normal_user(identity: &Identity) -> Result<&AuthContext> {
    identity.auth().ok_or_else(|| AppError::Unauthorized {
        message: "sign in required".to_string(),
    })
}

/// Every target belongs to the caller, or the caller is an admin and
/// `allow_admin` is set.
///
/// An empty `owners` slice passes; single-record callers check existence
/// first.
pub fn signed_self<'a>(
    identity: &'a Identity,
    owners: &[i32],
    allow_admin: bool,
) -> Result<&'a AuthContext> {
    let ctx = any_normal_user(identity)?;

    if allow_admin && ctx.is_admin() {
        return Ok(ctx);
    }

    if owners.iter().all(|owner| *owner == ctx.user_id) {
        Ok(ctx)
    } else {
        Err(AppError::forbidden(
            "not allowed to modify records owned by other users",
        ))
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// `user` or `admin`
    pub role: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> Result<i32> {
        self.sub.parse().map_err(|_| AppError::InvalidToken)
    }
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, user_id: i32, role: Role) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            role: role.into(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }
}

/// Extract the token from an `Authorization: Bearer ...` header
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves request headers to an [`Identity`]
#[derive(Clone)]
pub struct Authenticator {
    jwt: Arc<JwtManager>,
    repo: Repository,
}

impl Authenticator {
    pub fn new(jwt: Arc<JwtManager>, repo: Repository) -> Self {
        Self { jwt, repo }
    }

    /// No `Authorization` header means anonymous. A present header must
    /// carry a valid token for an existing, enabled user.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity> {
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let Some(auth_header) = headers.get("authorization") else {
            return Ok(Identity::Anonymous { request_id });
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(extract_bearer)
            .ok_or(AppError::InvalidToken)?;

        let claims = self.jwt.validate_token(token)?;
        let user_id = claims.user_id()?;

        let user = self
            .repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized {
                message: "unknown user".to_string(),
            })?;

        if user.disabled {
            return Err(AppError::Unauthorized {
                message: "user is disabled".to_string(),
            });
        }

        Ok(Identity::User(AuthContext {
            user_id: user.id,
            role: user.role(),
            request_id,
        }))
    }
}

/// Axum extractor for Identity
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    Authenticator: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        Authenticator::from_ref(state)
            .authenticate(&parts.headers)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer("abc.def"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600);

        let token = tokio_test::assert_ok!(manager.generate_token(7, Role::Admin));
        let claims = tokio_test::assert_ok!(manager.validate_token(&token));

        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(Role::from(claims.role.as_str()), Role::Admin);
    }

    #[test]
    fn test_jwt_expired_and_tampered() {
        let manager = JwtManager::new("test_secret", 3600);

        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: "1".into(),
            role: "user".into(),
            exp: now - 3600,
            iat: now - 7200,
        };
        let expired = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();
        assert!(matches!(
            manager.validate_token(&expired),
            Err(AppError::ExpiredToken)
        ));

        let other = JwtManager::new("other_secret", 3600);
        let token = other.generate_token(1, Role::User).unwrap();
        assert!(matches!(
            manager.validate_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_any_normal_user() {
        assert!(matches!(
            any_normal_user(&Identity::anonymous()),
            Err(AppError::Unauthorized { .. })
        ));
        let identity = Identity::user(3, Role::User);
        assert_eq!(any_normal_user(&identity).unwrap().user_id, 3);
    }

    #[test]
    fn test_signed_self() {
        let alice = Identity::user(1, Role::User);
        let admin = Identity::user(9, Role::Admin);

        tokio_test::assert_ok!(signed_self(&alice, &[1, 1], false));
        tokio_test::assert_ok!(signed_self(&alice, &[], false));
        assert!(matches!(
            signed_self(&alice, &[1, 2], false),
            Err(AppError::Forbidden { .. })
        ));

        assert!(matches!(
            signed_self(&admin, &[1], false),
            Err(AppError::Forbidden { .. })
        ));
        tokio_test::assert_ok!(signed_self(&admin, &[1, 2], true));

        assert!(matches!(
            signed_self(&Identity::anonymous(), &[], true),
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticator() {
        let repo = Repository::new(DbPool::sqlite_memory().await.unwrap());
        let jwt = Arc::new(JwtManager::new("test_secret", 3600));
        let auth = Authenticator::new(jwt.clone(), repo.clone());

        let anonymous = auth.authenticate(&HeaderMap::new()).await.unwrap();
        assert!(anonymous.auth().is_none());

        let user = repo.create_user("carol", None, Role::Admin).await.unwrap();
        let token = jwt.generate_token(user.id, Role::User).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));

        let identity = auth.authenticate(&headers).await.unwrap();
        let ctx = identity.auth().unwrap();
        assert_eq!(ctx.user_id, user.id);
        // role comes from the user row, not the token
        assert!(ctx.is_admin());
        assert_eq!(identity.request_id(), "req-1");

        repo.set_user_disabled(user.id, true).await.unwrap();
        assert!(matches!(
            auth.authenticate(&headers).await,
            Err(AppError::Unauthorized { .. })
        ));

        headers.insert("authorization", HeaderValue::from_static("Token nope"));
        assert!(matches!(
            auth.authenticate(&headers).await,
            Err(AppError::InvalidToken)
        ));
    }
}
