use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};

use capsule_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))
}

/// Extract and validate the bearer JWT, then confirm the user still exists.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let claims = decode_token(&state.config.jwt_secret, bearer.token())?;

    let db = state.clone();
    let user = run_blocking(move || db.users.get_user_by_id(claims.sub))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".into()))?;

    req.extensions_mut().insert(AuthUser { id: user.id });
    Ok(next.run(req).await)
}
