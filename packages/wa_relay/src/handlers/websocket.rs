use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::ws;

/// Viewer WebSocket: live events out, active chat in
pub async fn viewer_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = state.session.clone();
    let viewers = state.viewers.clone();
    let fanout = state.fanout.clone();
    let metrics = state.metrics.clone();
    let send_capacity = state.ws_config.send_channel_capacity;

    ws.on_upgrade(move |socket| {
        ws::handle_viewer_ws(socket, session, viewers, fanout, metrics, send_capacity)
    })
}
