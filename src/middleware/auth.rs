use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The user id.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

pub fn user_id_from_token(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let claims = verify_token(token, secret)?;
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
}

/// Extracts the bearer token and places the authenticated user id in
/// request extensions for the `User` guard.
pub async fn auth_middleware(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user_id = user_id_from_token(token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, exp: i64, secret: &str) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn valid_token_resolves_to_its_subject() {
        let user_id = Uuid::new_v4();
        let token = token_for(&user_id.to_string(), far_future(), "secret");
        assert_eq!(user_id_from_token(&token, "secret").unwrap(), user_id);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for(&Uuid::new_v4().to_string(), far_future(), "secret");
        assert!(matches!(
            user_id_from_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = token_for(
            &Uuid::new_v4().to_string(),
            chrono::Utc::now().timestamp() - 7200,
            "secret",
        );
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let token = token_for("not-a-uuid", far_future(), "secret");
        assert!(matches!(
            user_id_from_token(&token, "secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
