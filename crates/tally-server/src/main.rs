use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tally_api::{AppState, AppStateInner, chats, groups, unseen};
use tally_gateway::connection;
use tally_gateway::rooms::RoomRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tally_server=debug,tally_api=debug,tally_gateway=debug,tally_db=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // Config
    let db_path = std::env::var("TALLY_DB_PATH").unwrap_or_else(|_| "tally.db".into());
    let host = std::env::var("TALLY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TALLY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = tally_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let registry = RoomRegistry::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        registry: registry.clone(),
    });

    // Routes
    let api_routes = Router::new()
        .route(
            "/chats/messages",
            get(chats::get_messages).post(chats::send_message),
        )
        .route("/unseen-messages/all", get(unseen::get_all_unseen))
        .route("/unseen-messages", get(unseen::get_group_unseen))
        .route(
            "/mark-personal-messages-seen",
            post(unseen::mark_personal_seen),
        )
        .route("/mark-group-messages-seen", post(unseen::mark_group_seen))
        .route("/groups", post(groups::create_group))
        .route("/groups/{group_id}", delete(groups::delete_group))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(registry);

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tally server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(registry): State<RoomRegistry>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, registry))
}
