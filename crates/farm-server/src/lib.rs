//! Assembly of the `farmconnect` server: store, relay and HTTP surface.

pub mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use farm_api::AppStateInner;
use farm_db::Database;
use farm_gateway::connection;
use farm_gateway::{Registry, Relay};
use farm_types::api::MessageResponse;

pub use config::ServerConfig;

/// Long-lived server state shared by the REST handlers and the relay.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<Database>,
    pub relay: Relay,
}

impl Services {
    /// Open the store described by `config` and seed it when asked to.
    pub fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let db = match &config.db_path {
            Some(path) => Database::open(path)?,
            None => Database::open_in_memory()?,
        };
        if config.seed_demo && farm_db::seed::seed_demo_data(&db)? {
            info!("Demo marketplace data loaded");
        }
        Ok(Self::with_database(db))
    }

    pub fn with_database(db: Database) -> Self {
        let db = Arc::new(db);
        let relay = Relay::new(db.clone(), Registry::new());
        Self { db, relay }
    }

    pub fn registry(&self) -> &Registry {
        self.relay.registry()
    }

    pub fn router(&self) -> Router {
        let ws_route = Router::new()
            .route("/ws", get(ws_upgrade))
            .with_state(self.relay.clone());

        Router::new()
            .merge(farm_api::router(AppStateInner::new(self.db.clone())))
            .merge(ws_route)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

async fn ws_upgrade(
    State(relay): State<Relay>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    // Identities are opaque: registered exactly as given
    let identity = match params.user_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            warn!("Rejected chat socket without userId");
            return (
                StatusCode::BAD_REQUEST,
                Json(MessageResponse::new("userId is required")),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| connection::handle_connection(socket, relay, identity))
}
