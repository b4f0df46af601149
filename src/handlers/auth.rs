use super::SESSION_HEADER;
use crate::models::{CreateSessionRequest, SessionResponse};
use crate::services::{SessionManager, SubscriptionService};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/auth/session",
    tag = "auth",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionResponse),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn create_session(
    sessions: web::Data<SessionManager>,
    subscription_service: web::Data<SubscriptionService>,
    body: web::Json<CreateSessionRequest>,
) -> Result<HttpResponse> {
    // Identity was validated upstream; still refuse tokens for users that do
    // not exist.
    if let Err(e) = subscription_service.get_user(body.user_id).await {
        return Ok(e.error_response());
    }

    let session = sessions.create(body.user_id, body.telegram_id).await;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": SessionResponse {
            token: session.token,
            expires_at: session.expires_at,
        }
    })))
}

#[utoipa::path(
    delete,
    path = "/auth/session",
    tag = "auth",
    responses(
        (status = 200, description = "Session invalidated (idempotent)")
    )
)]
pub async fn invalidate_session(
    sessions: web::Data<SessionManager>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let removed = match req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(token) => sessions.invalidate(token).await,
        None => false,
    };

    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": { "removed": removed } })))
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/session", web::post().to(create_session))
            .route("/session", web::delete().to(invalidate_session)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::entities::{SubscriptionType, user_entity as users};
    use actix_web::{App, test};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

    async fn setup() -> (DatabaseConnection, SessionManager, SubscriptionService) {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1);
        let db = Database::connect(options).await.unwrap();
        database::run_migrations(&db).await.unwrap();
        (
            db.clone(),
            SessionManager::new(3600),
            SubscriptionService::new(db),
        )
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (db, sessions, subscription_service) = setup().await;
        let now = Utc::now();
        let user = users::ActiveModel {
            telegram_id: Set(42),
            username: Set("student".to_string()),
            subscription_type: Set(SubscriptionType::FreeTrial),
            plan_name: Set(None),
            subscription_expiry: Set(None),
            is_verified: Set(false),
            is_active: Set(false),
            trial_reminder_sms_sent: Set(false),
            trial_expiry_sms_sent: Set(false),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(sessions.clone()))
                .app_data(web::Data::new(subscription_service.clone()))
                .service(web::scope("/api/v1").configure(auth_config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/session")
            .set_json(CreateSessionRequest {
                user_id: user.id,
                telegram_id: 42,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let value: serde_json::Value = test::read_body_json(resp).await;
        let token = value["data"]["token"].as_str().unwrap().to_string();
        assert!(sessions.lookup(&token).await.is_some());

        let req = test::TestRequest::delete()
            .uri("/api/v1/auth/session")
            .insert_header((SESSION_HEADER, token.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(sessions.lookup(&token).await.is_none());

        // Unknown user never gets a token.
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/session")
            .set_json(CreateSessionRequest {
                user_id: 9999,
                telegram_id: 42,
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
