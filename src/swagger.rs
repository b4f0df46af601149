use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{PlanType, SubscriptionType, TransactionStatus};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "session_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Session-Token"))),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::create_session,
        handlers::auth::invalidate_session,
        handlers::payment::create_payment_request,
        handlers::payment::check_payment,
        handlers::payment::payment_status,
    ),
    components(
        schemas(
            PlanType,
            TransactionStatus,
            SubscriptionType,
            CreatePaymentRequest,
            CreatePaymentResponse,
            CheckPaymentRequest,
            CheckPaymentResponse,
            PaymentStatusResponse,
            CreateSessionRequest,
            SessionResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Session management"),
        (name = "payment", description = "Payment requests and verification")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
