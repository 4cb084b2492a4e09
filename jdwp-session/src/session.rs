// Debugging session
//
// Owns one connection, the identity pool and the hook registry, and runs
// the event-dispatch loop that turns composite notifications into hook
// deliveries.

use crate::array::Array;
use crate::commands::COMPOSITE_EVENT;
use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::deferred::Deferred;
use crate::eventloop::EventPacket;
use crate::events::{CompositeReader, Event};
use crate::hook::{Hook, HookOrigin, HookTarget};
use crate::location::Location;
use crate::method::{Method, Slot};
use crate::object::Object;
use crate::poison::lock;
use crate::pool::IdentityPool;
use crate::protocol::{JdwpError, JdwpResult, ReplyPacket};
use crate::reader::PacketReader;
use crate::reftype::{Class, Field};
use crate::stackframe::Frame;
use crate::string::StringRef;
use crate::thread::Thread;
use crate::types::{FieldId, FrameId, IdSizes, MethodId, ObjectId, ReferenceTypeId};
use crate::vm::ClassIndex;
use crate::writer::PacketWriter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) struct SessionInner {
    pub(crate) conn: Connection,
    pub(crate) config: SessionConfig,
    pub(crate) pool: IdentityPool,
    pub(crate) classes: Deferred<ClassIndex>,
    hooks: Mutex<HashMap<i32, HookTarget>>,
}

/// Resolve an entity's back-reference to its session
pub(crate) fn upgrade(session: &Weak<SessionInner>) -> JdwpResult<Arc<SessionInner>> {
    session.upgrade().ok_or(JdwpError::SessionClosed)
}

impl SessionInner {
    /// Issue a request with the configured timeout, surfacing VM errors
    pub(crate) async fn request(&self, code: u16, body: Vec<u8>) -> JdwpResult<ReplyPacket> {
        let reply = self
            .conn
            .request(code, body, Some(self.config.request_timeout))
            .await?
            .ok_or(JdwpError::NoResponse)?;
        reply.check_error()?;
        Ok(reply)
    }

    pub(crate) fn writer(&self) -> PacketWriter {
        self.conn.writer()
    }

    pub(crate) fn reader<'a>(&self, data: &'a [u8]) -> PacketReader<'a> {
        self.conn.reader(data)
    }

    pub(crate) fn class(self: &Arc<Self>, id: ReferenceTypeId) -> Arc<Class> {
        self.pool
            .get_or_create(id, || Class::new(Arc::downgrade(self), id))
    }

    pub(crate) fn field(self: &Arc<Self>, class: ReferenceTypeId, id: FieldId) -> Arc<Field> {
        self.pool
            .get_or_create((class, id), || Field::new(Arc::downgrade(self), class, id))
    }

    pub(crate) fn method(self: &Arc<Self>, class: ReferenceTypeId, id: MethodId) -> Arc<Method> {
        self.pool
            .get_or_create((class, id), || Method::new(Arc::downgrade(self), class, id))
    }

    pub(crate) fn slot(
        self: &Arc<Self>,
        class: ReferenceTypeId,
        method: MethodId,
        index: i32,
    ) -> Arc<Slot> {
        self.pool.get_or_create((class, method, index), || {
            Slot::new(Arc::downgrade(self), class, method, index)
        })
    }

    pub(crate) fn location(
        self: &Arc<Self>,
        class: ReferenceTypeId,
        method: MethodId,
        index: i64,
    ) -> Arc<Location> {
        self.pool.get_or_create((class, method, index), || {
            Location::new(Arc::downgrade(self), class, method, index)
        })
    }

    pub(crate) fn thread(self: &Arc<Self>, id: ObjectId) -> Arc<Thread> {
        self.pool
            .get_or_create(id, || Thread::new(Arc::downgrade(self), id))
    }

    pub(crate) fn frame(self: &Arc<Self>, thread: ObjectId, id: FrameId) -> Arc<Frame> {
        self.pool
            .get_or_create((thread, id), || Frame::new(Arc::downgrade(self), thread, id))
    }

    pub(crate) fn object(self: &Arc<Self>, id: ObjectId) -> Arc<Object> {
        self.pool
            .get_or_create(id, || Object::new(Arc::downgrade(self), id))
    }

    pub(crate) fn array(self: &Arc<Self>, id: ObjectId) -> Arc<Array> {
        self.pool
            .get_or_create(id, || Array::new(Arc::downgrade(self), id))
    }

    pub(crate) fn string(self: &Arc<Self>, id: ObjectId) -> Arc<StringRef> {
        self.pool
            .get_or_create(id, || StringRef::new(Arc::downgrade(self), id))
    }

    /// Record a hook under the VM-assigned request id.
    ///
    /// Without an explicit target the hook gets a queue of its own.
    pub(crate) fn register_hook(
        self: &Arc<Self>,
        request_id: i32,
        event_kind: u8,
        target: Option<HookTarget>,
        origin: HookOrigin,
    ) -> Hook {
        let (target, queue) = match target {
            Some(target) => (target, None),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (HookTarget::Queue(tx), Some(rx))
            }
        };

        lock(&self.hooks, "hook registry").insert(request_id, target);
        debug!("Registered hook id={} kind={}", request_id, event_kind);

        Hook::new(Arc::downgrade(self), request_id, event_kind, origin, queue)
    }

    pub(crate) fn unregister_hook(&self, request_id: i32) {
        lock(&self.hooks, "hook registry").remove(&request_id);
    }

    fn hook_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = lock(&self.hooks, "hook registry").keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn process_event(self: &Arc<Self>, packet: &EventPacket) {
        let mut composite = match CompositeReader::new(self.reader(&packet.data)) {
            Ok(composite) => composite,
            Err(e) => {
                warn!("Malformed composite event id={}: {}", packet.id, e);
                return;
            }
        };

        while let Some(result) = composite.next_event(self) {
            match result {
                Ok(event) => self.deliver(event),
                Err(e) => warn!(
                    "Dropping rest of composite event id={}: {}",
                    packet.id, e
                ),
            }
        }
    }

    fn deliver(&self, event: Event) {
        let request_id = event.request_id();
        // Clone the target out so the registry lock is not held during delivery
        let target = lock(&self.hooks, "hook registry").get(&request_id).cloned();

        match target {
            Some(target) => target.deliver(event),
            None => debug!(
                "No hook for request id={}, dropping kind {} event",
                request_id,
                event.kind()
            ),
        }
    }
}

async fn dispatch_loop(session: Weak<SessionInner>, mut events: mpsc::UnboundedReceiver<EventPacket>) {
    info!("Event dispatch loop started");

    while let Some(packet) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.process_event(&packet);
    }

    info!("Event dispatch loop shutting down");
}

/// Consumer-facing handle on one debugging connection
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.inner.conn)
            .finish()
    }
}

impl Session {
    /// Connect over TCP with the default configuration
    pub async fn connect(host: &str, port: u16) -> JdwpResult<Self> {
        Self::connect_with_config(host, port, SessionConfig::default()).await
    }

    pub async fn connect_with_config(
        host: &str,
        port: u16,
        config: SessionConfig,
    ) -> JdwpResult<Self> {
        let conn = Connection::connect_tcp(host, port, &config).await?;
        Self::start(conn, config).await
    }

    /// Connect to a forwarded endpoint exposed as a Unix socket
    #[cfg(unix)]
    pub async fn connect_unix(
        path: impl AsRef<std::path::Path>,
        config: SessionConfig,
    ) -> JdwpResult<Self> {
        let conn = Connection::connect_unix(path, &config).await?;
        Self::start(conn, config).await
    }

    /// Run a session over an already established byte stream
    pub async fn open<S>(stream: S, config: SessionConfig) -> JdwpResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let conn = Connection::open(stream, &config).await?;
        Self::start(conn, config).await
    }

    async fn start(conn: Connection, config: SessionConfig) -> JdwpResult<Self> {
        let events = conn.subscribe(COMPOSITE_EVENT).await?;

        let inner = Arc::new(SessionInner {
            conn,
            config,
            pool: IdentityPool::new(),
            classes: Deferred::new(),
            hooks: Mutex::new(HashMap::new()),
        });
        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), events));

        info!("Debugging session ready");
        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn id_sizes(&self) -> IdSizes {
        self.inner.conn.id_sizes()
    }

    /// Request ids of the hooks currently registered
    pub fn hooks(&self) -> Vec<i32> {
        self.inner.hook_ids()
    }

    /// Resolves when the connection has ended
    pub async fn closed(&self) {
        self.inner.conn.closed().await
    }

    /// Canonical class entity for a reference type id
    pub fn class(&self, id: ReferenceTypeId) -> Arc<Class> {
        self.inner.class(id)
    }

    pub fn thread(&self, id: ObjectId) -> Arc<Thread> {
        self.inner.thread(id)
    }

    pub fn object(&self, id: ObjectId) -> Arc<Object> {
        self.inner.object(id)
    }
}
