/*!
 * # Authentication and Authorization
 *
 * Bearer JWTs (HS256) identify the caller. `auth_middleware` validates the token
 * and inserts an [`AuthUser`] request extension; [`AuthRouterExt`] layers it onto
 * route groups, optionally gated by role. Workflow-level authorization (who may
 * decide a particular approval gate) lives in the approval authorization service,
 * not here.
 */

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::entities::user;
use crate::errors::ServiceError;

/// Role names carried in tokens and stored on users.
pub mod roles {
    pub const ADMIN: &str = "ADMIN";
    pub const USER: &str = "USER";
    pub const MANAGER: &str = "MANAGER";
    pub const APPROVER: &str = "APPROVER";
    pub const PROCUREMENT_MANAGER: &str = "PROCUREMENT_MANAGER";
    pub const PROCUREMENT_SPECIALIST: &str = "PROCUREMENT_SPECIALIST";

    /// Roles allowed to review supplier submissions.
    pub const REVIEWERS: &[&str] = &[ADMIN, PROCUREMENT_MANAGER, PROCUREMENT_SPECIALIST];
}

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, wanted: &[&str]) -> bool {
        wanted.iter().any(|role| self.has_role(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(roles::ADMIN)
    }

    pub fn is_reviewer(&self) -> bool {
        self.has_any_role(roles::REVIEWERS)
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, access_token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_audience: "supplier-onboarding".to_string(),
            jwt_issuer: "supplier-onboarding-auth".to_string(),
            access_token_expiration,
        }
    }
}

/// Issues and validates access tokens.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issue an access token for a stored user; the role comes from the user row.
    pub fn issue_token(&self, user: &user::Model) -> Result<String, AuthError> {
        self.issue_token_with_roles(user, vec![user.role.to_string()])
    }

    pub fn issue_token_with_roles(
        &self,
        user: &user::Model,
        roles: Vec<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth | AuthError::InvalidToken | AuthError::TokenExpired => {
                ServiceError::Unauthorized(err.to_string())
            }
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) | AuthError::InternalError(msg) => {
                ServiceError::InternalError(msg)
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

pub async fn role_middleware(
    State(allowed): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !allowed.iter().any(|role| user.has_role(role)) {
        debug!(user_id = %user.user_id, "role check failed");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingAuth)?;

    let claims = auth_service.validate_token(token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        name: claims.name,
        email: claims.email,
        roles: claims.roles,
        token_id: claims.jti,
    })
}

/// Puts the shared [`AuthService`] into request extensions for `auth_middleware`.
pub async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_any_role(self, roles: &[&str]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_any_role(self, roles: &[&str]) -> Self {
        let allowed = Arc::new(roles.iter().map(|r| r.to_string()).collect::<Vec<_>>());
        self.layer(axum::middleware::from_fn_with_state(allowed, role_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::enums::UserRole;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "k3x9Qw7Lz2Vb8Nm4Rt6Yp1Hs5Jd0Gf3Ua7Ce9Wi2Ox4Kq6Zl8Tn1Br5Mv3Xy7Pj0Ds".into(),
            Duration::from_secs(600),
        ))
    }

    fn sample_user() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            email: "manager@example.com".into(),
            name: "Mandla Manager".into(),
            role: UserRole::Manager,
            manager_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn issued_token_round_trips_identity_and_role() {
        let svc = service();
        let user = sample_user();
        let token = svc.issue_token(&user).unwrap();
        let claims = svc.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.roles, vec!["MANAGER".to_string()]);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let user = sample_user();
        let other = AuthService::new(AuthConfig::new(
            "Zl8Tn1Br5Mv3Xy7Pj0Dsk3x9Qw7Lz2Vb8Nm4Rt6Yp1Hs5Jd0Gf3Ua7Ce9Wi2Ox4Kq6".into(),
            Duration::from_secs(600),
        ));
        let token = other.issue_token(&user).unwrap();
        assert!(matches!(
            service().validate_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn missing_bearer_is_missing_auth() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_auth_from_headers(&headers, &service()),
            Err(AuthError::MissingAuth)
        ));
    }

    #[test]
    fn reviewer_roles() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            name: None,
            email: None,
            roles: vec![roles::PROCUREMENT_SPECIALIST.into()],
            token_id: "t".into(),
        };
        assert!(user.is_reviewer());
        assert!(!user.is_admin());
    }
}
