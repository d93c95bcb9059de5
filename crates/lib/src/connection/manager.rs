//! Connection manager: single authority for all live chat sockets.
//!
//! Two kinds of connection with deliberately different liveness strategies:
//! the one persistent "user" socket is kept alive with a periodic ping, while
//! per-conversation "agent" sockets are closed after an idle period (an agent
//! may hold many conversations at once; unbounded idle sockets would pile up).
//! All socket state is private to the manager; callers connect, send, and
//! observe through the registered event subscriber.

use crate::config::Config;
use crate::connection::protocol::{self, OutboundFrame};
use crate::message::{Message, Role};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Parameters for `connect`: who is connecting to whom, and as which role.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub local_id: String,
    pub remote_id: String,
    pub role: Role,
}

/// Event subscriber for one connection. A connection holds exactly one
/// active subscriber; `connect` for an existing identity replaces it
/// wholesale, so a re-focused screen never leaks its predecessor's callbacks.
#[async_trait]
pub trait ChatEvents: Send + Sync {
    async fn on_open(&self) {}
    async fn on_message(&self, _messages: Vec<Message>) {}
    async fn on_error(&self, _error: String) {}
    async fn on_close(&self) {}
}

/// Transport state. No transition back to Open without a fresh `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Connecting,
    Open,
    Closed,
}

/// Identity of a connection inside the manager.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum ConnKey {
    User,
    Agent(String),
}

struct Connection {
    /// Stable per-socket id; two `connect` calls that reuse a socket hand out
    /// handles with the same id.
    id: String,
    key: ConnKey,
    state: RwLock<SocketState>,
    events: RwLock<Arc<dyn ChatEvents>>,
    /// Sender into the socket's writer task; present only while Open.
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    /// Last inbound or outbound message, for agent idle eviction.
    last_activity: RwLock<Instant>,
    shutdown: Notify,
    closed: AtomicBool,
}

impl Connection {
    fn new(key: ConnKey, events: Arc<dyn ChatEvents>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            state: RwLock::new(SocketState::Connecting),
            events: RwLock::new(events),
            outbound: RwLock::new(None),
            last_activity: RwLock::new(Instant::now()),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn set_state(&self, state: SocketState) {
        *self.state.write().await = state;
    }

    async fn is_open(&self) -> bool {
        *self.state.read().await == SocketState::Open
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ask the connection task to shut down; idempotent.
    fn begin_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Snapshot the current subscriber without holding the lock across the
    /// callback (a callback may call back into the manager).
    async fn subscriber(&self) -> Arc<dyn ChatEvents> {
        self.events.read().await.clone()
    }

    async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    async fn send_text(&self, text: String) -> bool {
        let guard = self.outbound.read().await;
        match guard.as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }
}

/// Cheap handle to a socket returned by `connect`. Holds no strong reference;
/// a closed connection's handle simply reports not-open.
#[derive(Clone)]
pub struct SocketHandle {
    connection_id: String,
    conn: Weak<Connection>,
}

impl SocketHandle {
    fn of(conn: &Arc<Connection>) -> Self {
        Self {
            connection_id: conn.id.clone(),
            conn: Arc::downgrade(conn),
        }
    }

    /// Stable id of the underlying socket.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub async fn is_open(&self) -> bool {
        match self.conn.upgrade() {
            Some(conn) => conn.is_open().await,
            None => false,
        }
    }
}

struct ManagerInner {
    ws_base: String,
    idle_timeout: Duration,
    ping_interval: Duration,
    /// The singleton user socket, if any.
    user: RwLock<Option<Arc<Connection>>>,
    /// Agent sockets keyed by the user id being chatted with.
    agents: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ManagerInner {
    async fn lookup(&self, key: &ConnKey) -> Option<Arc<Connection>> {
        match key {
            ConnKey::User => self.user.read().await.clone(),
            ConnKey::Agent(id) => self.agents.read().await.get(id).cloned(),
        }
    }

    async fn insert(&self, conn: Arc<Connection>) {
        match conn.key.clone() {
            ConnKey::User => {
                *self.user.write().await = Some(conn);
            }
            ConnKey::Agent(id) => {
                self.agents.write().await.insert(id, conn);
            }
        }
    }

    /// Remove only when the slot still holds this exact socket; a newer
    /// connection under the same key is left alone.
    async fn remove(&self, conn: &Arc<Connection>) {
        match &conn.key {
            ConnKey::User => {
                let mut slot = self.user.write().await;
                if slot.as_ref().map_or(false, |c| Arc::ptr_eq(c, conn)) {
                    *slot = None;
                }
            }
            ConnKey::Agent(id) => {
                let mut map = self.agents.write().await;
                if map.get(id).map_or(false, |c| Arc::ptr_eq(c, conn)) {
                    map.remove(id);
                }
            }
        }
    }
}

/// Owner of all live chat sockets. Construct one per process and share it;
/// tests construct isolated instances.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        ws_base: impl Into<String>,
        idle_timeout: Duration,
        ping_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ws_base: ws_base.into(),
                idle_timeout,
                ping_interval,
                user: RwLock::new(None),
                agents: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.backend.ws_base_url.clone(),
            config.chat.idle_timeout(),
            config.chat.ping_interval(),
        )
    }

    /// Open (or reuse) the socket for this identity. Never fails
    /// synchronously; transport failures arrive via `on_error`/`on_close`.
    ///
    /// User role: at most one live socket no matter how often this is
    /// called; repeated calls replace the subscriber and, when the socket is
    /// already open, replay `on_open` so the caller's state stays consistent.
    /// Agent role: keyed by the chatted-with user id; repeated calls for the
    /// same key reuse the socket and replace its subscriber.
    pub async fn connect(
        &self,
        params: ConnectParams,
        events: Arc<dyn ChatEvents>,
    ) -> SocketHandle {
        let key = match params.role {
            Role::User => ConnKey::User,
            Role::Agent => ConnKey::Agent(params.remote_id.clone()),
        };

        if let Some(existing) = self.inner.lookup(&key).await {
            *existing.events.write().await = events;
            if existing.is_open().await {
                existing.subscriber().await.on_open().await;
            }
            return SocketHandle::of(&existing);
        }

        let conn = Arc::new(Connection::new(key, events));
        self.inner.insert(conn.clone()).await;
        let url = protocol::connect_url(
            &self.inner.ws_base,
            &params.local_id,
            &params.remote_id,
            params.role,
        );
        let inner = self.inner.clone();
        let task_conn = conn.clone();
        let role = params.role;
        tokio::spawn(async move {
            run_connection(inner, task_conn, url, role).await;
        });
        SocketHandle::of(&conn)
    }

    /// Frame and send a chat message. Silent no-op unless the relevant socket
    /// is open — the caller is responsible for checking connection state
    /// before offering send UI. An agent send resets that connection's idle
    /// timer.
    pub async fn send_chat(&self, message: &Message, remote_id: Option<&str>) {
        let conn = match remote_id {
            None => self.inner.user.read().await.clone(),
            Some(id) => self.inner.agents.read().await.get(id).cloned(),
        };
        let Some(conn) = conn else {
            log::debug!("send_chat: no connection for {:?}", remote_id);
            return;
        };
        if !conn.is_open().await {
            log::debug!("send_chat: socket not open for {:?}", conn.key);
            return;
        }
        let frame = match serde_json::to_string(&OutboundFrame::Chat {
            message: message.clone(),
        }) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("serializing chat frame failed: {}", e);
                return;
            }
        };
        if conn.send_text(frame).await {
            conn.touch().await;
        }
    }

    /// Close and remove the singleton (no id) or the keyed agent connection.
    /// Idempotent: disconnecting a connection that does not exist is a no-op.
    pub async fn disconnect(&self, remote_id: Option<&str>) {
        let conn = match remote_id {
            None => self.inner.user.write().await.take(),
            Some(id) => self.inner.agents.write().await.remove(id),
        };
        if let Some(conn) = conn {
            conn.begin_close();
        }
    }

    /// True iff the relevant socket's transport state is Open.
    pub async fn is_connected(&self, remote_id: Option<&str>, role: Role) -> bool {
        let conn = match (role, remote_id) {
            (Role::User, _) => self.inner.user.read().await.clone(),
            (Role::Agent, Some(id)) => self.inner.agents.read().await.get(id).cloned(),
            (Role::Agent, None) => None,
        };
        match conn {
            Some(conn) => conn.is_open().await,
            None => false,
        }
    }
}

/// One socket's lifetime: dial, pump frames, clean up. The connection entry
/// is removed from the manager before `on_close` fires, so a subsequent
/// `connect` transparently creates a fresh socket.
async fn run_connection(
    inner: Arc<ManagerInner>,
    conn: Arc<Connection>,
    url: String,
    role: Role,
) {
    let ws = match tokio_tungstenite::connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            log::debug!("chat socket connect to {} failed: {}", url, e);
            inner.remove(&conn).await;
            conn.set_state(SocketState::Closed).await;
            let subscriber = conn.subscriber().await;
            subscriber.on_error(e.to_string()).await;
            subscriber.on_close().await;
            return;
        }
    };
    if conn.is_closed() {
        // Disconnected while the handshake was in flight.
        inner.remove(&conn).await;
        conn.set_state(SocketState::Closed).await;
        conn.subscriber().await.on_close().await;
        return;
    }

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *conn.outbound.write().await = Some(tx);
    conn.set_state(SocketState::Open).await;
    conn.touch().await;
    conn.subscriber().await.on_open().await;

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let liveness = match role {
        Role::User => tokio::spawn(run_keep_alive(conn.clone(), inner.ping_interval)),
        Role::Agent => tokio::spawn(run_idle_eviction(conn.clone(), inner.idle_timeout)),
    };

    loop {
        tokio::select! {
            _ = conn.shutdown.notified() => break,
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(messages) = protocol::decode_inbound(&text) {
                        conn.touch().await;
                        conn.subscriber().await.on_message(messages).await;
                    } else {
                        log::debug!("ignoring unrecognized chat frame");
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    conn.subscriber().await.on_error(e.to_string()).await;
                    break;
                }
            },
        }
    }

    conn.begin_close();
    conn.set_state(SocketState::Closed).await;
    // Dropping the sender stops the writer task, which closes the transport.
    *conn.outbound.write().await = None;
    inner.remove(&conn).await;
    liveness.abort();
    let _ = writer.await;
    conn.subscriber().await.on_close().await;
}

/// User-socket keep-alive: a ping frame every interval while open. Agent
/// sockets never run this; the idle timer is their liveness check.
async fn run_keep_alive(conn: Arc<Connection>, every: Duration) {
    let frame = match serde_json::to_string(&OutboundFrame::Ping) {
        Ok(f) => f,
        Err(_) => return,
    };
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; skip it.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if conn.is_closed() {
            return;
        }
        if !conn.send_text(frame.clone()).await {
            return;
        }
    }
}

/// Agent-socket idle eviction: close the socket once no message has moved in
/// either direction for the configured window.
async fn run_idle_eviction(conn: Arc<Connection>, window: Duration) {
    loop {
        let deadline = *conn.last_activity.read().await + window;
        tokio::time::sleep_until(deadline).await;
        if conn.is_closed() {
            return;
        }
        if conn.last_activity.read().await.elapsed() >= window {
            log::debug!("idle timeout for {:?}, closing", conn.key);
            conn.begin_close();
            return;
        }
    }
}
