use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    /// Anything other than `admin` is a plain customer.
    pub fn from_claim(value: &str) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Customer
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "user",
            Role::Admin => "admin",
        }
    }
}

/// Caller resolved from a bearer token minted by the identity service.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Resolves the caller from an `Authorization: Bearer <jwt>` header.
    pub fn from_headers(headers: &HeaderMap, secret: &str) -> Result<Self, AppError> {
        let auth_str = headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::BadRequest("Missing Authorization header".into()))?
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::BadRequest("Invalid Authorization scheme".into()))?;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::BadRequest("Invalid or expired token".into()))?
        .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

        Ok(AuthUser {
            user_id,
            role: Role::from_claim(&claims.role),
        })
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if !user.is_admin() {
        tracing::warn!(user_id = %user.user_id, "admin route refused");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        AuthUser::from_headers(&parts.headers, state.jwt_secret.reveal())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    const SECRET: &str = "unit-secret";

    fn bearer(sub: &str, role: &str, exp: i64, secret: &str) -> HeaderMap {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: exp as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn resolves_role_from_claims() {
        let id = Uuid::new_v4();
        let later = Utc::now().timestamp() + 600;

        let admin = AuthUser::from_headers(&bearer(&id.to_string(), "admin", later, SECRET), SECRET)
            .unwrap();
        assert_eq!(admin.user_id, id);
        assert!(admin.is_admin());

        let customer =
            AuthUser::from_headers(&bearer(&id.to_string(), "user", later, SECRET), SECRET).unwrap();
        assert_eq!(customer.role, Role::Customer);
        assert!(matches!(ensure_admin(&customer), Err(AppError::Forbidden)));
    }

    #[test]
    fn rejects_bad_tokens() {
        let id = Uuid::new_v4().to_string();
        let later = Utc::now().timestamp() + 600;

        assert!(AuthUser::from_headers(&HeaderMap::new(), SECRET).is_err());
        assert!(AuthUser::from_headers(&bearer(&id, "user", later, "other"), SECRET).is_err());
        assert!(
            AuthUser::from_headers(&bearer(&id, "user", Utc::now().timestamp() - 600, SECRET), SECRET)
                .is_err()
        );
        assert!(AuthUser::from_headers(&bearer("not-a-uuid", "user", later, SECRET), SECRET).is_err());

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(AuthUser::from_headers(&basic, SECRET).is_err());
    }
}
