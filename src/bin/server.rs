use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use pacmap_server::constants::TICK_MS;
use pacmap_server::engine::{GameEngine, GameEngineOptions};
use pacmap_server::geo::{Bounds, GeoPoint};
use pacmap_server::graph::GraphOptions;
use pacmap_server::osm::{bounds_of, OsmData};
use pacmap_server::repair::RepairOptions;
use pacmap_server::rng::Rng;
use pacmap_server::server_protocol::{parse_client_message, ParsedClientMessage};
use pacmap_server::server_utils::{
    normalize_seed, normalize_time_limit_ms, player_order_key, sanitize_name,
};
use pacmap_server::world::{build_world, synthetic_grid};
use rand::distr::Alphanumeric;
use rand::Rng as _;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone, Debug)]
struct LobbyPlayerInternal {
    id: String,
    name: String,
    connected: bool,
    reconnect_token: String,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    player_id: Option<String>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

/// Geometry the server builds games from: an OSM JSON file when configured,
/// otherwise a synthetic street grid.
#[derive(Clone, Debug)]
struct MapSource {
    bounds: Bounds,
    data: OsmData,
    label: String,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    players: HashMap<String, LobbyPlayerInternal>,
    active_client_by_player_id: HashMap<String, String>,
    host_id: Option<String>,
    game: Option<GameEngine>,
    map_source: MapSource,
}

impl ServerState {
    fn new(map_source: MapSource) -> Self {
        Self {
            clients: HashMap::new(),
            players: HashMap::new(),
            active_client_by_player_id: HashMap::new(),
            host_id: None,
            game: None,
            map_source,
        }
    }
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let map_source = resolve_map_source();
    println!("[server] map source: {}", map_source.label);

    let state = Arc::new(Mutex::new(ServerState::new(map_source)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        println!(
            "[server] static file root: {}",
            static_dir.to_string_lossy()
        );
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_map_source() -> MapSource {
    if let Ok(raw_path) = std::env::var("MAP_DATA_PATH") {
        let path = PathBuf::from(&raw_path);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<OsmData>(&raw) {
                Ok(data) => {
                    if let Some(bounds) = bounds_of(&data) {
                        return MapSource {
                            bounds,
                            data,
                            label: raw_path,
                        };
                    }
                    eprintln!("[server] {raw_path} holds no node coordinates, using a synthetic grid");
                }
                Err(error) => {
                    eprintln!("[server] failed to parse {raw_path}: {error}, using a synthetic grid");
                }
            },
            Err(error) => {
                eprintln!("[server] failed to read {raw_path}: {error}, using a synthetic grid");
            }
        }
    }

    let (bounds, data) = synthetic_grid(12, 12, 60.0, GeoPoint::new(25.0330, 121.5654));
    MapSource {
        bounds,
        data,
        label: "synthetic 12x12 grid".to_string(),
    }
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }
    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../dist/client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                player_id: None,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };
        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::Hello {
            name,
            reconnect_token,
        } => {
            handle_hello(state, client_id, name, reconnect_token).await;
        }
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "pong", "t": t }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::StartGame {
            seed,
            time_limit_minutes,
        } => {
            handle_start_game(state, client_id, seed, time_limit_minutes).await;
        }
        ParsedClientMessage::Input { dir } => {
            let mut guard = state.lock().await;
            if !client_is_host(&guard, client_id) {
                return;
            }
            if let Some(game) = guard.game.as_mut() {
                game.receive_input(dir);
            }
        }
        ParsedClientMessage::SetAutopilot { enabled, clever } => {
            let mut guard = state.lock().await;
            if !client_is_host(&guard, client_id) {
                send_to_client(
                    &mut guard,
                    client_id,
                    &json!({ "type": "error", "message": "only the host can toggle autopilot" }),
                    QueuePolicy::DisconnectOnFull,
                );
                return;
            }
            if let Some(game) = guard.game.as_mut() {
                game.set_autopilot(enabled, clever);
            }
        }
    }
}

async fn handle_hello(
    state: SharedState,
    client_id: &str,
    requested_name: String,
    reconnect_token: Option<String>,
) {
    let mut guard = state.lock().await;
    let name = sanitize_name(&requested_name);

    if let Some(token) = reconnect_token {
        if let Some(existing_id) = find_player_id_by_token(&guard, &token) {
            if let Some(player) = guard.players.get_mut(&existing_id) {
                player.name = name;
                player.connected = true;
            }
            bind_client_to_player(&mut guard, client_id, &existing_id);
            ensure_host_assigned(&mut guard, Some(existing_id.clone()));
            send_welcome_and_initial_state(&mut guard, client_id, &existing_id);
            return;
        }
    }

    let player_id = make_id("player");
    let token = make_reconnect_token();
    guard.players.insert(
        player_id.clone(),
        LobbyPlayerInternal {
            id: player_id.clone(),
            name,
            connected: true,
            reconnect_token: token,
        },
    );
    bind_client_to_player(&mut guard, client_id, &player_id);
    ensure_host_assigned(&mut guard, Some(player_id.clone()));
    send_welcome_and_initial_state(&mut guard, client_id, &player_id);
}

async fn handle_start_game(
    state: SharedState,
    client_id: &str,
    seed: Option<i64>,
    time_limit_minutes: Option<i64>,
) {
    let mut guard = state.lock().await;
    if guard.game.is_some() {
        return;
    }
    if !client_is_host(&guard, client_id) {
        send_to_client(
            &mut guard,
            client_id,
            &json!({ "type": "error", "message": "only the host can start" }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    }

    let seed = normalize_seed(seed, now_ms());
    let mut rng = Rng::new(seed);
    let world = match build_world(
        guard.map_source.bounds,
        &guard.map_source.data,
        &GraphOptions::default(),
        &RepairOptions::default(),
        &mut rng,
    ) {
        Ok(world) => world,
        Err(error) => {
            eprintln!("[server] world build failed: {error}");
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "error", "message": error.to_string() }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
    };
    for warning in &world.warnings {
        eprintln!("[server] world: {warning}");
    }

    let game = GameEngine::new(
        world,
        seed,
        GameEngineOptions {
            time_limit_ms_override: normalize_time_limit_ms(time_limit_minutes),
        },
    );
    let world_init = game.get_world_init();
    let config = game.config.clone();
    let started_at_ms = game.started_at_ms;
    guard.game = Some(game);

    broadcast(
        &mut guard,
        &json!({
            "type": "game_init",
            "world": world_init,
            "config": config,
            "startedAtMs": started_at_ms,
            "seed": seed,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    let Some(bound_player_id) = context.player_id else {
        return;
    };
    if state
        .active_client_by_player_id
        .get(&bound_player_id)
        .map(|active| active != client_id)
        .unwrap_or(true)
    {
        return;
    }
    state.active_client_by_player_id.remove(&bound_player_id);
    if let Some(player) = state.players.get_mut(&bound_player_id) {
        player.connected = false;
    }
    if state.host_id.as_deref() == Some(&bound_player_id) {
        state.host_id = choose_next_host(state);
    }
}

fn choose_next_host(state: &ServerState) -> Option<String> {
    let mut connected: Vec<&LobbyPlayerInternal> = state
        .players
        .values()
        .filter(|player| player.connected)
        .collect();
    connected.sort_by_key(|player| player_order_key(&player.id));
    connected.first().map(|player| player.id.clone())
}

fn ensure_host_assigned(state: &mut ServerState, preferred_player_id: Option<String>) {
    let host_connected = state
        .host_id
        .as_ref()
        .and_then(|host_id| state.players.get(host_id))
        .map(|host| host.connected)
        .unwrap_or(false);
    if host_connected {
        return;
    }
    state.host_id = preferred_player_id.or_else(|| choose_next_host(state));
}

fn send_welcome_and_initial_state(state: &mut ServerState, client_id: &str, player_id: &str) {
    let Some(player) = state.players.get(player_id).cloned() else {
        return;
    };
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "playerId": player.id,
            "reconnectToken": player.reconnect_token,
            "isHost": state.host_id.as_deref() == Some(player_id),
            "running": state.game.is_some(),
        }),
        QueuePolicy::DisconnectOnFull,
    );

    if state.game.is_none() {
        return;
    }
    let (world_init, config, started_at_ms, seed, snapshot) = {
        let Some(game) = state.game.as_mut() else {
            return;
        };
        (
            game.get_world_init(),
            game.config.clone(),
            game.started_at_ms,
            game.seed(),
            game.build_snapshot(false),
        )
    };
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "game_init",
            "world": world_init,
            "config": config,
            "startedAtMs": started_at_ms,
            "seed": seed,
        }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_client(
        state,
        client_id,
        &json!({ "type": "state", "snapshot": snapshot }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn bind_client_to_player(state: &mut ServerState, client_id: &str, player_id: &str) {
    if let Some(old_client_id) = state.active_client_by_player_id.get(player_id).cloned() {
        if old_client_id != client_id {
            if let Some(old_client) = state.clients.get_mut(&old_client_id) {
                old_client.player_id = None;
                let _ = old_client.tx.try_send(OutboundMessage::Close {
                    code: 4001,
                    reason: "superseded by new connection".to_string(),
                });
            }
        }
    }
    if let Some(ctx) = state.clients.get_mut(client_id) {
        ctx.player_id = Some(player_id.to_string());
    }
    state
        .active_client_by_player_id
        .insert(player_id.to_string(), client_id.to_string());
}

fn find_player_id_by_token(state: &ServerState, token: &str) -> Option<String> {
    state
        .players
        .values()
        .find(|player| player.reconnect_token == token)
        .map(|player| player.id.clone())
}

fn client_is_host(state: &ServerState, client_id: &str) -> bool {
    let Some(player_id) = state
        .clients
        .get(client_id)
        .and_then(|ctx| ctx.player_id.clone())
    else {
        return false;
    };
    state.host_id.as_deref() == Some(player_id.as_str())
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    let snapshot = {
        let Some(game) = state.game.as_mut() else {
            return;
        };
        game.step(TICK_MS);
        game.build_snapshot(true)
    };

    broadcast(
        state,
        &json!({ "type": "state", "snapshot": snapshot }),
        QueuePolicy::DropOnFull,
    );

    let summary = {
        let Some(game) = state.game.as_ref() else {
            return;
        };
        if game.is_ended() {
            Some(game.build_summary())
        } else {
            None
        }
    };

    if let Some(summary) = summary {
        broadcast(
            state,
            &json!({ "type": "game_over", "summary": summary }),
            QueuePolicy::DisconnectOnFull,
        );
        state.game = None;
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let client_ids: Vec<String> = state.clients.keys().cloned().collect();
    let mut failed_clients = Vec::new();
    for client_id in client_ids {
        let Some(client) = state.clients.get(&client_id) else {
            continue;
        };
        if client.player_id.is_none() {
            continue;
        }
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id);
        }
    }
    if policy == QueuePolicy::DisconnectOnFull {
        for client_id in failed_clients {
            disconnect_client_internal(state, &client_id);
        }
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({ "type": "error", "message": message }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    format!("{}_{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn make_reconnect_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
