pub mod auth;
pub mod payment;

pub use auth::auth_config;
pub use payment::{callback_config, payment_config};

use crate::error::{AppError, AppResult};
use crate::services::{Session, SessionManager};
use actix_web::HttpRequest;

pub(crate) const SESSION_HEADER: &str = "X-Session-Token";

/// Resolve the calling user from the session token header.
pub(crate) async fn require_session(
    req: &HttpRequest,
    sessions: &SessionManager,
) -> AppResult<Session> {
    let token = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("missing session token".to_string()))?;

    sessions
        .lookup(token)
        .await
        .ok_or_else(|| AppError::AuthError("invalid or expired session".to_string()))
}
