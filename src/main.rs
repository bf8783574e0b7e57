use std::str::FromStr;

use axum::{
    extract::Extension, http::HeaderValue, routing::{get, post}, Router
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::broadcast;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dto {
    pub mod event_dto;
    pub mod participant_dto;
    pub mod team_dto;
}
mod routes {
    pub mod events;
    pub mod participants;
    pub mod teams;
}
mod services {
    pub mod database;
    pub mod team_assignment;
    pub mod team_palette;
    pub mod websocket;
}

use config::Config;
use routes::{events, participants, teams};
use services::websocket::websocket_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("CheckInBackend=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::from_env()?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    info!("Connected to sqlite database.");
    services::database::init_schema(&pool).await?;

    let (tx, _rx) = broadcast::channel::<String>(100);

    let app = Router::new()
        .route("/events", post(events::create_event))
        .route("/events/{event_id}", get(events::get_event))
        .route("/events/{event_id}/participants", get(participants::get_participants))
        .route("/events/{event_id}/checkin", post(participants::check_in))
        .route("/events/{event_id}/teams", get(teams::get_teams).post(teams::create_teams))
        .route("/ws", get(websocket_handler))
        .layer(Extension(pool))
        .layer(Extension(tx))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Started server on {}.", config.bind_address());
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid allowed origin '{}'.", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
