// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, middleware::Logger, web};
use course_progress::config::Config;
use course_progress::db::PgStore;
use course_progress::enrollment::EnrollmentService;
use course_progress::repo::Store;
use course_progress::{auth, courses, notify};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    tracing::info!("Starting course progress service");

    dotenv::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");

    let pg = PgStore::connect(&config)
        .await
        .expect("Failed to connect to Postgres");
    pg.migrate().await.expect("Failed to run database migrations");
    let store: Arc<dyn Store> = Arc::new(pg);

    let notifier = notify::start(store.clone(), &config);
    let service = EnrollmentService::new(
        store.clone(),
        notifier,
        Duration::from_secs(config.curriculum_cache_ttl_secs),
    );

    let bind_addr = config.bind_addr.clone();
    let store_data: web::Data<dyn Store> = web::Data::from(store);
    let service_data = web::Data::new(service);
    let config_data = web::Data::new(config);

    tracing::info!("Listening on {}", bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(service_data.clone())
            .app_data(config_data.clone())
            .wrap(Logger::default())
            .configure(auth::init_routes)
            .configure(courses::init_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
