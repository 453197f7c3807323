use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use vigil_gateway::auth::{extract_credential, verify_token};

use crate::error::ApiError;
use crate::permissions::Actor;
use crate::state::AppState;

/// Validate the JWT from the auth cookie or `Authorization` header and
/// attach the caller as an [`Actor`] extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_credential(req.headers(), None).ok_or(ApiError::Unauthorized)?;
    let claims = verify_token(&token, &state.jwt_secret).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(Actor::from(claims));
    Ok(next.run(req).await)
}
