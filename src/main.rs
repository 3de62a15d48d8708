//! Image Service - HTTP serving tier
//!
//! Resolves read requests against stored variants, renders missing raster
//! variants inline, and enqueues optimized derivatives for the workers.

use std::io;
use std::sync::Arc;

use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use image_service::middleware::{TrafficFilter, TrafficRules};
use image_service::queue::Broker;
use image_service::storage::S3Store;
use image_service::{handlers, Config};
use sqlx::postgres::PgPoolOptions;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("failed to load configuration");

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!(%bind_address, "image service starting");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run database migrations");

    let store = S3Store::from_config(&config.s3).await;

    let broker = Broker::connect(&config.amqp)
        .await
        .expect("failed to connect to message broker");

    let traffic_rules = Arc::new(match &config.traffic_rules_path {
        Some(path) => TrafficRules::load(path).expect("failed to load traffic rules"),
        None => TrafficRules::default(),
    });

    let config_data = web::Data::new(config);
    let pool_data = web::Data::new(db_pool);
    let store_data = web::Data::new(store);
    let broker_data = web::Data::new(broker);

    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(pool_data.clone())
            .app_data(store_data.clone())
            .app_data(broker_data.clone())
            .wrap(actix_middleware::Logger::default())
            .wrap(TrafficFilter::new(traffic_rules.clone()))
            .route(
                "/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route("/upload", web::post().to(handlers::upload))
            .route("/{image_id}/{kind}", web::get().to(handlers::get))
            .route(
                "/{image_id}/{kind}/thumbnail",
                web::get().to(handlers::get_thumbnail),
            )
            .route(
                "/{image_id}/height/{height}/{kind}",
                web::get().to(handlers::get_with_height),
            )
            .route(
                "/{image_id}/width/{width}/{kind}",
                web::get().to(handlers::get_with_width),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
