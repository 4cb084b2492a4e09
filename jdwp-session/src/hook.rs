// Hooks
//
// A hook is a live event request on the VM, named by the request id the VM
// assigned. Matching events are routed by the session's dispatch loop to the
// hook's callback or queue.

use crate::events::Event;
use crate::eventrequest;
use crate::location::Location;
use crate::protocol::JdwpResult;
use crate::reftype::Class;
use crate::session::{upgrade, SessionInner};
use crate::thread::Thread;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

pub type HookCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Where a hook's events go.
///
/// Callbacks run on the event-dispatch task and block further delivery
/// until they return. The interrupted thread stays suspended; a callback
/// that wants it running must resume it (spawning a task for the request).
#[derive(Clone)]
pub enum HookTarget {
    Callback(HookCallback),
    Queue(mpsc::UnboundedSender<Event>),
}

impl HookTarget {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        HookTarget::Callback(Arc::new(f))
    }

    pub fn queue(tx: mpsc::UnboundedSender<Event>) -> Self {
        HookTarget::Queue(tx)
    }

    pub(crate) fn deliver(&self, event: Event) {
        match self {
            HookTarget::Callback(callback) => callback(event),
            HookTarget::Queue(tx) => {
                if tx.send(event).is_err() {
                    debug!("Hook queue receiver dropped, event discarded");
                }
            }
        }
    }
}

impl fmt::Debug for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::Callback(_) => f.write_str("Callback"),
            HookTarget::Queue(_) => f.write_str("Queue"),
        }
    }
}

/// The entity a hook was installed on
#[derive(Debug, Clone)]
pub enum HookOrigin {
    Thread(Arc<Thread>),
    Class(Arc<Class>),
    Location(Arc<Location>),
}

pub struct Hook {
    session: Weak<SessionInner>,
    request_id: i32,
    event_kind: u8,
    origin: HookOrigin,
    queue: Option<Mutex<mpsc::UnboundedReceiver<Event>>>,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("request_id", &self.request_id)
            .field("event_kind", &self.event_kind)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Hook {
    pub(crate) fn new(
        session: Weak<SessionInner>,
        request_id: i32,
        event_kind: u8,
        origin: HookOrigin,
        queue: Option<mpsc::UnboundedReceiver<Event>>,
    ) -> Self {
        Self {
            session,
            request_id,
            event_kind,
            origin,
            queue: queue.map(Mutex::new),
        }
    }

    /// Request id assigned by the VM
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn event_kind(&self) -> u8 {
        self.event_kind
    }

    pub fn origin(&self) -> &HookOrigin {
        &self.origin
    }

    /// Wait for the next event on a hook that owns its queue.
    ///
    /// Returns `None` on timeout, when the session is gone, or when the hook
    /// was created with an explicit callback or queue.
    pub async fn next_event(&self, timeout: Option<Duration>) -> Option<Event> {
        let queue = self.queue.as_ref()?;
        let mut rx = queue.lock().await;

        match timeout {
            Some(limit) => tokio::time::timeout(limit, rx.recv()).await.ok().flatten(),
            None => rx.recv().await,
        }
    }

    /// Remove the event request from the VM, then forget the hook locally.
    ///
    /// Events already decoded for this id may still be delivered; later ones
    /// are dropped.
    pub async fn clear(&self) -> JdwpResult<()> {
        let session = upgrade(&self.session)?;
        eventrequest::clear(&session, self.event_kind, self.request_id).await?;
        session.unregister_hook(self.request_id);
        Ok(())
    }
}
