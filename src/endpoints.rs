//! Request handlers mounted on the listener.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::error;
use serde_json::{Value, json};

use crate::config::ServerConfig;
use crate::lobby::Lobby;
use crate::statistics::{Event, Statistics};

#[derive(Clone)]
struct Presence {
    lobby: Arc<Lobby>,
    statistics: Arc<Statistics>,
}

pub fn presence_routes(
    config: &ServerConfig,
    lobby: Arc<Lobby>,
    statistics: Arc<Statistics>,
) -> Router {
    Router::new()
        .route("/", get(front_page))
        .route(&config.stats_route(), get(stats_history))
        .route("/rooms/{room}/{peer}", get(join_room).delete(leave_room))
        .with_state(Presence { lobby, statistics })
}

async fn front_page(State(presence): State<Presence>) -> String {
    presence.statistics.record(Event::FrontPageLoaded);
    format!("Conspire presence server v{}\n", env!("CARGO_PKG_VERSION"))
}

async fn stats_history(State(presence): State<Presence>) -> Response {
    match presence.statistics.history_json() {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("Failed to render statistics: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Heartbeat: joins the room or refreshes the peer's last-seen time.
async fn join_room(
    State(presence): State<Presence>,
    Path((room, peer)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    if room.is_empty() || peer.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    let peers = presence.lobby.join(&room, &peer);
    Ok(Json(json!({ "room": room, "peers": peers })))
}

async fn leave_room(
    State(presence): State<Presence>,
    Path((room, peer)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    let peers = presence
        .lobby
        .leave(&room, &peer)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "room": room, "peers": peers })))
}
