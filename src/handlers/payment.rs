use super::require_session;
use crate::entities::TransactionStatus;
use crate::external::TelegramService;
use crate::models::{
    CheckPaymentRequest, CheckPaymentResponse, CreatePaymentRequest, CreatePaymentResponse,
    PaymentStatusResponse,
};
use crate::services::{PaymentService, SessionManager, SubscriptionService, VerifiedPayment};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde::Deserialize;
use serde_json::json;

/// Apply the subscription side effect for a verification result.
///
/// Only the caller whose verify won the pending->terminal transition runs the
/// updater, so a transaction activates a subscription at most once no matter
/// which trigger settled it. Notification failures are logged, never fatal.
pub(crate) async fn activate_subscription(
    verified: &VerifiedPayment,
    subscriptions: &SubscriptionService,
    telegram: &TelegramService,
) {
    if !verified.transitioned || verified.transaction.status != TransactionStatus::Success {
        return;
    }

    let transaction = &verified.transaction;
    if let Err(e) = subscriptions
        .update_subscription(transaction.user_id, transaction.plan)
        .await
    {
        log::error!(
            "Failed to apply subscription for transaction {}: {e:?}",
            transaction.id
        );
        return;
    }

    match subscriptions.get_user(transaction.user_id).await {
        Ok(user) => {
            let text = format!(
                "Your {} plan is now active. Payment reference: {}",
                transaction.plan,
                transaction.ref_id.clone().unwrap_or_default()
            );
            if let Err(e) = telegram.send_message(user.telegram_id, &text).await {
                log::warn!("Failed to notify user {}: {e:?}", transaction.user_id);
            }
        }
        Err(e) => log::warn!(
            "Could not load user {} for notification: {e:?}",
            transaction.user_id
        ),
    }
}

#[utoipa::path(
    post,
    path = "/payment/request",
    tag = "payment",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Payment request created", body = CreatePaymentResponse),
        (status = 400, description = "Unknown plan"),
        (status = 401, description = "Missing or invalid session"),
        (status = 422, description = "Gateway declined the request")
    )
)]
pub async fn create_payment_request(
    payment_service: web::Data<PaymentService>,
    sessions: web::Data<SessionManager>,
    req: HttpRequest,
    body: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse> {
    let session = match require_session(&req, &sessions).await {
        Ok(session) => session,
        Err(e) => return Ok(e.error_response()),
    };

    match payment_service
        .create_payment_request(session.user_id, &body.plan)
        .await
    {
        Ok((transaction, payment_url)) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": CreatePaymentResponse {
                transaction_id: transaction.id,
                authority: transaction.authority.unwrap_or_default(),
                amount: transaction.amount,
                payment_url,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

/// Query string the gateway appends when redirecting the payer back.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "Authority")]
    pub authority: String,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Gateway redirect target. One verification attempt per inbound call; safe
/// to receive any number of times for the same authority.
pub async fn payment_callback(
    payment_service: web::Data<PaymentService>,
    subscription_service: web::Data<SubscriptionService>,
    telegram_service: web::Data<TelegramService>,
    query: web::Query<CallbackQuery>,
) -> Result<HttpResponse> {
    // The payer backed out at the gateway; nothing to verify.
    if query.status != "OK" {
        log::info!("Payment cancelled by user, authority {}", query.authority);
        return Ok(result_page(
            "CANCELLED",
            "Payment cancelled",
            "You cancelled the payment. No money was taken.",
        ));
    }

    match payment_service.verify_payment(&query.authority).await {
        Ok(verified) => {
            activate_subscription(&verified, &subscription_service, &telegram_service).await;
            if verified.transaction.status == TransactionStatus::Success {
                let detail = format!(
                    "Payment confirmed. Reference number: {}",
                    verified.transaction.ref_id.clone().unwrap_or_default()
                );
                Ok(result_page("SUCCESS", "Payment successful", &detail))
            } else {
                Ok(result_page(
                    "FAILED",
                    "Payment not completed",
                    "The gateway did not confirm this payment.",
                ))
            }
        }
        Err(crate::error::AppError::NotFound(_)) => Ok(result_page(
            "NOT_FOUND",
            "Unknown payment",
            "We could not find this payment attempt.",
        )),
        Err(e) => {
            log::error!("Callback verification error for {}: {e:?}", query.authority);
            Ok(result_page(
                "GATEWAY_ERROR",
                "Verification delayed",
                "We could not reach the payment gateway; your payment will be re-checked automatically.",
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/payment/check",
    tag = "payment",
    request_body = CheckPaymentRequest,
    responses(
        (status = 200, description = "Current payment state", body = CheckPaymentResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Unknown authority")
    )
)]
pub async fn check_payment(
    payment_service: web::Data<PaymentService>,
    subscription_service: web::Data<SubscriptionService>,
    telegram_service: web::Data<TelegramService>,
    sessions: web::Data<SessionManager>,
    req: HttpRequest,
    body: web::Json<CheckPaymentRequest>,
) -> Result<HttpResponse> {
    let session = match require_session(&req, &sessions).await {
        Ok(session) => session,
        Err(e) => return Ok(e.error_response()),
    };

    // Pre-read: if another trigger already settled this transaction there is
    // nothing left to do and the user gets the stored outcome immediately.
    let existing = match payment_service.get_by_authority(&body.authority).await {
        Ok(Some(transaction)) if transaction.user_id == session.user_id => transaction,
        Ok(_) => {
            return Ok(crate::error::AppError::NotFound(format!(
                "no transaction for authority {}",
                body.authority
            ))
            .error_response());
        }
        Err(e) => return Ok(e.error_response()),
    };

    if existing.status != TransactionStatus::Pending {
        let response = CheckPaymentResponse {
            status: PaymentStatusResponse::from(&existing),
            message: "This payment was already processed.".to_string(),
        };
        return Ok(HttpResponse::Ok().json(json!({ "success": true, "data": response })));
    }

    match payment_service.verify_payment(&body.authority).await {
        Ok(verified) => {
            activate_subscription(&verified, &subscription_service, &telegram_service).await;
            let message = match verified.transaction.status {
                TransactionStatus::Success => "Payment confirmed.",
                TransactionStatus::Failed => "The gateway did not confirm this payment.",
                TransactionStatus::Pending => "Payment is still pending.",
            };
            let response = CheckPaymentResponse {
                status: PaymentStatusResponse::from(&verified.transaction),
                message: message.to_string(),
            };
            Ok(HttpResponse::Ok().json(json!({ "success": true, "data": response })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/payment/status/{authority}",
    tag = "payment",
    params(("authority" = String, Path, description = "Gateway authority token")),
    responses(
        (status = 200, description = "Current payment state", body = PaymentStatusResponse),
        (status = 404, description = "Unknown authority")
    )
)]
pub async fn payment_status(
    payment_service: web::Data<PaymentService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let authority = path.into_inner();
    match payment_service.get_by_authority(&authority).await {
        Ok(Some(transaction)) => {
            Ok(HttpResponse::Ok().json(PaymentStatusResponse::from(&transaction)))
        }
        Ok(None) => Ok(crate::error::AppError::NotFound(format!(
            "no transaction for authority {authority}"
        ))
        .error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

fn result_page(code: &str, heading: &str, detail: &str) -> HttpResponse {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{heading}</title></head>\n\
         <body>\n<h1>{heading}</h1>\n<p>{detail}</p>\n<p>Code: {code}</p>\n\
         <p>You can close this page and return to the bot.</p>\n</body>\n</html>"
    );
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// Authenticated payment routes, mounted under /api/v1.
pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payment")
            .route("/request", web::post().to(create_payment_request))
            .route("/check", web::post().to(check_payment))
            .route("/status/{authority}", web::get().to(payment_status)),
    );
}

/// Public gateway redirect route, mounted at the server root so the
/// registered callback URL stays stable.
pub fn callback_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/payment/callback", web::get().to(payment_callback));
}
