use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use coursebot_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{TelegramService, ZarinpalClient},
    handlers,
    middlewares::create_cors,
    services::{PaymentService, SessionManager, SubscriptionService},
    swagger::swagger_config,
    tasks,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration file");

    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let gateway = Arc::new(ZarinpalClient::new(config.gateway.clone()));
    let telegram_service = TelegramService::new(config.telegram.clone());

    let payment_service = PaymentService::new(pool.clone(), gateway);
    let subscription_service = SubscriptionService::new(pool.clone());
    let session_manager = SessionManager::new(config.session.ttl_seconds);

    tasks::spawn_all(
        payment_service.clone(),
        subscription_service.clone(),
        telegram_service.clone(),
        session_manager.clone(),
    );

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .app_data(web::Data::new(telegram_service.clone()))
            .app_data(web::Data::new(session_manager.clone()))
            .configure(swagger_config)
            .configure(handlers::callback_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::payment_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
