//! Connection handlers for the Huddle server.
//!
//! This module handles the connection lifecycle and the HTTP routes.

use crate::config::{Config, LimitsConfig};
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use huddle_core::memory::{
    MemoryDirectory, MemoryMessageStore, StaticIdentities, TracingNotificationSink,
};
use huddle_core::{
    Collaborators, Hub, Identity, Membership, MessageId, MessageStore, Room, RoomId, Session,
    SessionError,
};
use huddle_protocol::{CloseCode, Encoding, MessageView};
use huddle_transport::{Connection, Frame, WebSocketConnection};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The messaging engine.
    pub hub: Arc<Hub>,
    /// Message store behind the hub.
    pub store: Arc<MemoryMessageStore>,
    /// Room directory behind the hub.
    pub directory: Arc<MemoryDirectory>,
    /// Server configuration.
    pub config: Config,
    connections: AtomicUsize,
}

impl AppState {
    /// Build the engine and seed the in-memory collaborators from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a seeded room is invalid, e.g. a direct room
    /// without exactly two members.
    pub fn new(config: Config) -> Result<Self> {
        let mut identities = StaticIdentities::new();
        for user in &config.users {
            let mut identity = Identity::new(user.id, user.username.clone());
            if let Some(avatar) = &user.avatar {
                identity = identity.with_avatar(avatar.clone());
            }
            identities.insert(user.token.clone(), identity);
        }

        let directory = Arc::new(MemoryDirectory::new());
        for seed in &config.rooms {
            let members: Vec<_> = seed.members.iter().map(|m| (m.user, m.role)).collect();
            directory
                .insert_room(Room::with_id(seed.id, seed.kind, seed.name.clone()), &members)
                .with_context(|| format!("Invalid room {}", seed.id))?;
        }

        let store = Arc::new(MemoryMessageStore::new());
        let collaborators = Collaborators {
            identities: Arc::new(identities),
            membership: directory.clone(),
            store: store.clone(),
            notifier: Arc::new(TracingNotificationSink),
        };

        info!(
            users = config.users.len(),
            rooms = config.rooms.len(),
            "Collaborators seeded"
        );

        Ok(Self {
            hub: Arc::new(Hub::new(collaborators, config.hub_config())),
            store,
            directory,
            config,
            connections: AtomicUsize::new(0),
        })
    }

    /// Reserve a connection slot, or `None` at capacity.
    fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.limits.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(self)))
    }

    /// Number of connections currently holding a slot.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// Releases its connection slot on drop.
struct ConnectionSlot(Arc<AppState>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.websocket_route(), get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/messages/:message_id", delete(delete_message_handler))
        .route("/api/rooms/:room_id/messages", get(search_handler))
        .route("/api/rooms/:room_id/unread", get(unread_handler))
        .with_state(state)
}

/// Serve `state` on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr,
        state.config.websocket_route()
    );

    serve(listener, state).await
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.hub.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": stats.sessions,
        "rooms": stats.rooms,
        "online_users": stats.online_users,
    }))
}

/// Query parameters accepted on the WebSocket route.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
}

/// Credential from an `Authorization: Bearer` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(slot) = state.try_acquire() else {
        warn!(remote = %addr, "Connection limit reached");
        metrics::record_rejected("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let credential = bearer_token(&headers).or(params.token);
    let encoding = params.encoding;

    ws.max_message_size(state.config.limits.max_frame_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let conn = WebSocketConnection::new(socket).with_remote_addr(addr);
            drive_session(
                conn,
                Arc::clone(&state.hub),
                &room_id,
                credential.as_deref(),
                encoding,
                &state.config.limits,
            )
            .await;
        })
}

/// Soft-delete a message on behalf of its sender.
async fn delete_message_handler(
    Path(message_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    let identity = match state.hub.authenticate(bearer_token(&headers).as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            debug!(error = %err, "Delete rejected");
            return StatusCode::UNAUTHORIZED;
        }
    };
    let Ok(id) = message_id.parse::<MessageId>() else {
        return StatusCode::NOT_FOUND;
    };

    match state.hub.delete_message(&identity.user_id, &id).await {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(SessionError::Reference(_)) => StatusCode::NOT_FOUND,
        Err(SessionError::NotAuthorized(_)) => StatusCode::FORBIDDEN,
        Err(err) => {
            warn!(message = %id, error = %err, "Delete failed");
            metrics::record_error(err.kind());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Query parameters of the room search route.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Resolve the caller and their membership of `room_id`.
async fn room_member(
    state: &AppState,
    headers: &HeaderMap,
    room_id: &str,
) -> Result<Membership, StatusCode> {
    let identity = state
        .hub
        .authenticate(bearer_token(headers).as_deref())
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let room: RoomId = room_id.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    state
        .directory
        .membership(&identity.user_id, &room)
        .ok_or(StatusCode::FORBIDDEN)
}

/// Search a room's messages.
async fn search_handler(
    Path(room_id): Path<String>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let membership = match room_member(&state, &headers, &room_id).await {
        Ok(membership) => membership,
        Err(status) => return status.into_response(),
    };
    let mut hits: Vec<MessageView> = Vec::new();
    for message in state.store.search(&membership.room_id, &params.q) {
        match state.store.reactions(&message.id).await {
            Ok(reactions) => hits.push(message.to_view_with_reactions(&reactions)),
            Err(err) => {
                error!(message = %message.id, error = %err, "Reaction lookup failed");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }
    Json(hits).into_response()
}

/// Unread message count for the caller.
async fn unread_handler(
    Path(room_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let membership = match room_member(&state, &headers, &room_id).await {
        Ok(membership) => membership,
        Err(status) => return status.into_response(),
    };
    let unread = state.store.unread_count(
        &membership.room_id,
        &membership.user_id,
        membership.last_read_at,
    );
    Json(serde_json::json!({
        "room_id": membership.room_id.to_string(),
        "unread": unread,
    }))
    .into_response()
}

fn encoding_label(encoding: Encoding) -> &'static str {
    match encoding {
        Encoding::Json => "json",
        Encoding::MessagePack => "msgpack",
    }
}

/// Accept, authenticate and join. The room id comes straight from the URI.
async fn open_session(
    session: &mut Session,
    room: &str,
    credential: Option<&str>,
) -> Result<(), SessionError> {
    session.accept()?;
    session.authenticate(credential).await?;
    let room: RoomId = room
        .trim()
        .parse()
        .map_err(|_| SessionError::Membership(room.to_string()))?;
    session.join(room).await
}

/// Drive one connection from accept to close and return the close code used.
///
/// Outbound events are written in `encoding`; inbound text frames decode as
/// JSON and binary frames as MessagePack.
pub async fn drive_session<C: Connection>(
    mut conn: C,
    hub: Arc<Hub>,
    room: &str,
    credential: Option<&str>,
    encoding: Encoding,
    limits: &LimitsConfig,
) -> CloseCode {
    let _metrics_guard = SessionMetricsGuard::new();
    let (mut session, mut outbox) = Session::new(Arc::clone(&hub));
    let remote = conn.remote_addr().unwrap_or_default();

    debug!(session = %session.id(), remote = %remote, "Connection accepted");

    if let Err(err) = open_session(&mut session, room, credential).await {
        metrics::record_rejected(err.kind());
        session.close().await;
        let code = err.close_code();
        if let Err(e) = conn.close(code, &err.to_string()).await {
            debug!(session = %session.id(), error = %e, "Close after rejection failed");
        }
        return code;
    }
    metrics::set_active_rooms(hub.registry().room_count());

    let kick = outbox.kick_signal();
    let mut protocol_errors = 0usize;

    let (code, reason) = loop {
        tokio::select! {
            biased;

            () = kick.notified() => {
                warn!(session = %session.id(), "Outbound delivery failed, closing");
                metrics::record_kicked();
                break (CloseCode::Policy, "outbound queue overflow");
            }

            event = outbox.recv() => {
                let Some(event) = event else {
                    break (CloseCode::Normal, "session ended");
                };
                let frame = match Frame::encode(event.as_ref(), encoding) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(session = %session.id(), error = %e, "Dropping unencodable event");
                        metrics::record_error("encode");
                        continue;
                    }
                };
                metrics::record_outbound(event.kind(), frame.len());
                if let Err(e) = conn.send(frame).await {
                    debug!(session = %session.id(), error = %e, "Send failed");
                    break (CloseCode::Normal, "connection lost");
                }
            }

            inbound = conn.recv() => {
                let frame = match inbound {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break (CloseCode::Normal, "client closed"),
                    Err(e) => {
                        warn!(session = %session.id(), error = %e, "Receive failed");
                        metrics::record_error("transport");
                        break (CloseCode::Normal, "connection lost");
                    }
                };

                if frame.len() > limits.max_frame_size {
                    warn!(session = %session.id(), size = frame.len(), "Frame too large");
                    metrics::record_error("frame_size");
                    break (CloseCode::ProtocolViolation, "frame too large");
                }

                let start = Instant::now();
                let (data, frame_encoding) = frame.payload();
                metrics::record_inbound(encoding_label(frame_encoding));
                let result = session.handle_raw(data, frame_encoding).await;
                metrics::record_latency(start.elapsed().as_secs_f64());

                match result {
                    Ok(()) => protocol_errors = 0,
                    Err(err) => {
                        metrics::record_error(err.kind());
                        if matches!(err, SessionError::Protocol(_)) {
                            protocol_errors += 1;
                            if protocol_errors > limits.max_protocol_errors {
                                break (CloseCode::ProtocolViolation, "too many malformed frames");
                            }
                        } else {
                            protocol_errors = 0;
                        }
                        if err.is_fatal() {
                            break (err.close_code(), "session terminated");
                        }
                    }
                }
            }
        }
    };

    session.close().await;
    metrics::set_active_rooms(hub.registry().room_count());

    if let Err(e) = conn.close(code, reason).await {
        debug!(session = %session.id(), error = %e, "Close failed");
    }
    debug!(session = %session.id(), code = code.as_u16(), reason, "Connection closed");
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemberSeed, RoomSeed, UserSeed};
    use huddle_core::{Role, RoomKind, UserId};
    use huddle_protocol::{ClientEvent, ErrorCode, ServerEvent};
    use huddle_transport::memory::{pair, MemoryClient, Received};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct TestServer {
        state: Arc<AppState>,
        room: RoomId,
        alice: UserId,
        bob: UserId,
    }

    fn test_server() -> TestServer {
        let alice = UserId::new();
        let bob = UserId::new();
        let carol = UserId::new();
        let room = RoomId::new();

        let mut config = Config::default();
        config.limits.max_protocol_errors = 2;
        config.limits.max_frame_size = 1024;
        config.users = [("alice", alice), ("bob", bob), ("carol", carol)]
            .into_iter()
            .map(|(name, id)| UserSeed {
                token: format!("tok-{name}"),
                id,
                username: name.to_string(),
                avatar: None,
            })
            .collect();
        config.rooms = vec![RoomSeed {
            id: room,
            kind: RoomKind::Group,
            name: Some("general".into()),
            members: vec![
                MemberSeed { user: alice, role: Role::Admin },
                MemberSeed { user: bob, role: Role::Member },
            ],
        }];

        TestServer {
            state: Arc::new(AppState::new(config).unwrap()),
            room,
            alice,
            bob,
        }
    }

    impl TestServer {
        fn connect_to(&self, room: String, token: &str) -> (MemoryClient, JoinHandle<CloseCode>) {
            let (conn, client) = pair(64);
            let state = Arc::clone(&self.state);
            let token = token.to_string();
            let handle = tokio::spawn(async move {
                drive_session(
                    conn,
                    Arc::clone(&state.hub),
                    &room,
                    Some(&token),
                    Encoding::Json,
                    &state.config.limits,
                )
                .await
            });
            (client, handle)
        }

        fn connect(&self, token: &str) -> (MemoryClient, JoinHandle<CloseCode>) {
            self.connect_to(self.room.to_string(), token)
        }

        /// Connect and consume the session's own online status.
        async fn join(&self, token: &str) -> (MemoryClient, JoinHandle<CloseCode>) {
            let (mut client, handle) = self.connect(token);
            match next_event(&mut client).await {
                ServerEvent::Status { username, is_online: true, .. } => {
                    assert_eq!(format!("tok-{username}"), token);
                }
                other => panic!("unexpected {other:?}"),
            }
            (client, handle)
        }

        async fn wait_for_sessions(&self, n: usize) {
            for _ in 0..200 {
                if self.state.hub.registry().session_count(&self.room) == n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("expected {n} sessions in the room");
        }
    }

    async fn next_event(client: &mut MemoryClient) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), client.next_event())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("connection closed")
    }

    async fn close_code(client: &mut MemoryClient) -> CloseCode {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), client.recv())
                .await
                .expect("timed out waiting for close")
            {
                Some(Received::Close { code, .. }) => return code,
                Some(Received::Frame(_)) => continue,
                None => panic!("closed without a close frame"),
            }
        }
    }

    fn send(event: &ClientEvent) -> String {
        serde_json::to_string(event).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer tok-alice".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok-alice".to_string()));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer  ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_invalid_direct_room_is_rejected() {
        let mut config = Config::default();
        config.rooms = vec![RoomSeed {
            id: RoomId::new(),
            kind: RoomKind::Direct,
            name: None,
            members: vec![MemberSeed { user: UserId::new(), role: Role::Admin }],
        }];
        assert!(AppState::new(config).is_err());
    }

    #[test]
    fn test_connection_slots() {
        let mut config = Config::default();
        config.limits.max_connections = 1;
        let state = Arc::new(AppState::new(config).unwrap());

        let slot = state.try_acquire().unwrap();
        assert!(state.try_acquire().is_none());
        assert_eq!(state.connection_count(), 1);
        drop(slot);
        assert_eq!(state.connection_count(), 0);
        assert!(state.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_rejections_close_with_policy() {
        let server = test_server();

        let (mut client, handle) = server.connect("tok-nobody");
        assert_eq!(close_code(&mut client).await, CloseCode::Policy);
        assert_eq!(handle.await.unwrap(), CloseCode::Policy);

        // carol is known but not a member
        let (mut client, handle) = server.connect("tok-carol");
        assert_eq!(close_code(&mut client).await, CloseCode::Policy);
        assert_eq!(handle.await.unwrap(), CloseCode::Policy);

        let (mut client, handle) = server.connect_to("not-a-room".into(), "tok-alice");
        assert_eq!(close_code(&mut client).await, CloseCode::Policy);
        assert_eq!(handle.await.unwrap(), CloseCode::Policy);

        assert_eq!(server.state.hub.stats().sessions, 0);
    }

    #[tokio::test]
    async fn test_message_and_read_flow() {
        let server = test_server();
        let (mut alice, _a) = server.join("tok-alice").await;
        let (mut bob, _b) = server.join("tok-bob").await;

        // Alice sees bob come online
        match next_event(&mut alice).await {
            ServerEvent::Status { user_id, is_online, .. } => {
                assert_eq!(user_id, server.bob.to_string());
                assert!(is_online);
            }
            other => panic!("unexpected {other:?}"),
        }

        alice.send_text(send(&ClientEvent::text("hello bob"))).await.unwrap();
        let message_id = match next_event(&mut bob).await {
            ServerEvent::Message { data } => {
                assert_eq!(data.content, "hello bob");
                assert_eq!(data.sender.id, server.alice.to_string());
                data.id
            }
            other => panic!("unexpected {other:?}"),
        };
        // Sender gets its own message back
        assert!(matches!(next_event(&mut alice).await, ServerEvent::Message { .. }));

        bob.send_text(send(&ClientEvent::read(message_id.clone()))).await.unwrap();
        match next_event(&mut alice).await {
            ServerEvent::Read { message_id: id, user_id, .. } => {
                assert_eq!(id, message_id);
                assert_eq!(user_id, server.bob.to_string());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_then_protocol_close() {
        let server = test_server();
        let (mut alice, handle) = server.join("tok-alice").await;

        alice.send_text("{not json").await.unwrap();
        match next_event(&mut alice).await {
            ServerEvent::Error { code, .. } => assert_eq!(code, ErrorCode::Protocol),
            other => panic!("unexpected {other:?}"),
        }

        // A good frame resets the count
        alice.send_text(send(&ClientEvent::Typing { is_typing: true })).await.unwrap();
        alice.send_text(r#"{"action":"dance"}"#).await.unwrap();
        alice.send_text("[]").await.unwrap();
        alice.send_text("nope").await.unwrap();

        assert_eq!(close_code(&mut alice).await, CloseCode::ProtocolViolation);
        assert_eq!(handle.await.unwrap(), CloseCode::ProtocolViolation);
        assert_eq!(server.state.hub.registry().session_count(&server.room), 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_closes() {
        let server = test_server();
        let (mut alice, handle) = server.connect("tok-alice");
        server.wait_for_sessions(1).await;

        alice.send_text("x".repeat(2048)).await.unwrap();
        assert_eq!(close_code(&mut alice).await, CloseCode::ProtocolViolation);
        assert_eq!(handle.await.unwrap(), CloseCode::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_hang_up_announces_offline() {
        let server = test_server();
        let (mut alice, _a) = server.join("tok-alice").await;
        let (mut bob, handle) = server.join("tok-bob").await;
        assert!(matches!(next_event(&mut alice).await, ServerEvent::Status { is_online: true, .. }));

        bob.hang_up();
        assert_eq!(handle.await.unwrap(), CloseCode::Normal);
        match next_event(&mut alice).await {
            ServerEvent::Status { user_id, is_online, .. } => {
                assert_eq!(user_id, server.bob.to_string());
                assert!(!is_online);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!server.state.hub.presence().is_online(&server.bob));
    }

    #[tokio::test]
    async fn test_msgpack_outbound() {
        let server = test_server();
        let (conn, mut client) = pair(16);
        let state = Arc::clone(&server.state);
        let room = server.room.to_string();
        tokio::spawn(async move {
            drive_session(
                conn,
                Arc::clone(&state.hub),
                &room,
                Some("tok-alice"),
                Encoding::MessagePack,
                &state.config.limits,
            )
            .await
        });
        server.wait_for_sessions(1).await;

        client.send_text(send(&ClientEvent::text("packed"))).await.unwrap();
        let mut events = Vec::new();
        for _ in 0..2 {
            match tokio::time::timeout(Duration::from_secs(2), client.recv()).await.unwrap() {
                Some(Received::Frame(frame @ Frame::Binary(_))) => {
                    let (data, encoding) = frame.payload();
                    events.push(huddle_protocol::decode::<ServerEvent>(data, encoding).unwrap());
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(&events[0], ServerEvent::Status { is_online: true, .. }));
        assert!(matches!(&events[1], ServerEvent::Message { data } if data.content == "packed"));
    }
}
