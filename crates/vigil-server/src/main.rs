mod config;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use vigil_api::routes::protected_routes;
use vigil_api::state::AppStateInner;
use vigil_gateway::{Broadcaster, RoomRegistry, auth, connection};

use crate::config::Config;

#[derive(Clone)]
struct SocketState {
    registry: RoomRegistry,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(vigil_db::Database::open(&PathBuf::from(&config.db_path))?);

    // Gateway + shared state
    let registry = RoomRegistry::new();
    let broadcaster = Arc::new(Broadcaster::init(registry.clone()));
    let app_state = AppStateInner::new(db, broadcaster, config.jwt_secret.clone());

    let socket_routes = Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(SocketState {
            registry,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = Router::new()
        .route("/health", get(health))
        .merge(protected_routes(app_state))
        .merge(socket_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Vigil server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// The handshake never fails on credentials: an invalid or missing token
/// yields an anonymous session.
async fn ws_upgrade(
    State(state): State<SocketState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = auth::authenticate(
        &headers,
        params.get("token").map(String::as_str),
        &state.jwt_secret,
    );
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.registry, identity))
}
