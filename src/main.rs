use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use nursing_study_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/study-tests/generate",
            post(routes::study_tests::generate_study_test),
        )
        .route(
            "/api/study-tests",
            get(routes::study_tests::list_study_tests).post(routes::study_tests::create_study_test),
        )
        .route(
            "/api/study-tests/:id",
            get(routes::study_tests::get_study_test).delete(routes::study_tests::delete_study_test),
        )
        .route(
            "/api/study-tests/:id/attempts",
            get(routes::study_tests::list_attempts).post(routes::study_tests::start_attempt),
        )
        .route(
            "/api/study-tests/:id/analytics",
            get(routes::study_tests::get_analytics),
        )
        .route(
            "/api/attempts/:id",
            get(routes::study_tests::get_attempt).delete(routes::study_tests::delete_attempt),
        )
        .route(
            "/api/attempts/:id/answers",
            post(routes::study_tests::save_answer),
        )
        .route(
            "/api/attempts/:id/submit",
            post(routes::study_tests::submit_attempt),
        )
        .route(
            "/api/settings",
            get(routes::entities::get_settings).post(routes::entities::save_settings),
        )
        .route("/api/initialize", post(routes::entities::initialize_defaults))
        .route("/api/backup", get(routes::entities::backup))
        .route(
            "/api/:collection",
            get(routes::entities::list_rows).post(routes::entities::create_row),
        )
        .route(
            "/api/:collection/:id",
            put(routes::entities::update_row).delete(routes::entities::delete_row),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
