use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity is validated upstream (Telegram init-data HMAC, out of scope
/// here); this request is trusted to carry a real user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub user_id: i64,
    pub telegram_id: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
