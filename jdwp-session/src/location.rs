// Code locations
//
// A location is a (type, method, code index) triple, optionally annotated
// with the source line once a line table has been read. Native methods
// report index -1.

use crate::commands::event_kinds;
use crate::eventrequest::{EventRequest, Modifier};
use crate::hook::{Hook, HookOrigin, HookTarget};
use crate::method::{Method, Slot};
use crate::poison::lock;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::PacketReader;
use crate::reftype::Class;
use crate::session::{upgrade, SessionInner};
use crate::types::{MethodId, ReferenceTypeId};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

pub struct Location {
    session: Weak<SessionInner>,
    class: ReferenceTypeId,
    method: MethodId,
    index: i64,
    line: Mutex<Option<i32>>,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("class", &format_args!("{:#x}", self.class))
            .field("method", &format_args!("{:#x}", self.method))
            .field("index", &self.index)
            .field("line", &self.line())
            .finish()
    }
}

impl Location {
    pub(crate) fn new(
        session: Weak<SessionInner>,
        class: ReferenceTypeId,
        method: MethodId,
        index: i64,
    ) -> Self {
        Self {
            session,
            class,
            method,
            index,
            line: Mutex::new(None),
        }
    }

    /// Read a wire location: type tag, type id, method id, code index
    pub(crate) fn decode(r: &mut PacketReader<'_>, session: &Arc<SessionInner>) -> JdwpResult<Arc<Location>> {
        let type_tag = r.read_u8()?;
        let class = r.read_reference_type_id()?;
        let method = r.read_method_id()?;
        let index = r.read_i64()?;

        session.class(class).set_type_tag(type_tag);
        Ok(session.location(class, method, index))
    }

    pub fn class_id(&self) -> ReferenceTypeId {
        self.class
    }

    pub fn method_id(&self) -> MethodId {
        self.method
    }

    /// Bytecode offset within the method
    pub fn index(&self) -> i64 {
        self.index
    }

    /// Source line, if a line table naming this location has been read
    pub fn line(&self) -> Option<i32> {
        *lock(&self.line, "location line")
    }

    pub(crate) fn set_line(&self, line: i32) {
        *lock(&self.line, "location line") = Some(line);
    }

    /// Source line, reading the method's line table if needed.
    ///
    /// Interior locations that the table doesn't name take the line of the
    /// nearest preceding entry.
    pub async fn source_line(&self) -> JdwpResult<Option<i32>> {
        if let Some(line) = self.line() {
            return Ok(Some(line));
        }
        if self.is_native() {
            return Ok(None);
        }

        let table = self.method()?.line_table().await?;
        let line = table
            .iter()
            .filter(|(_, location)| location.index() <= self.index)
            .max_by_key(|(_, location)| location.index())
            .map(|(line, _)| *line);
        if let Some(line) = line {
            self.set_line(line);
        }
        Ok(line)
    }

    pub fn is_native(&self) -> bool {
        self.index == -1
    }

    pub fn class(&self) -> JdwpResult<Arc<Class>> {
        Ok(upgrade(&self.session)?.class(self.class))
    }

    pub fn method(&self) -> JdwpResult<Arc<Method>> {
        Ok(upgrade(&self.session)?.method(self.class, self.method))
    }

    /// Slots whose `[first_index, first_index + length]` range covers this index
    pub async fn slots(&self) -> JdwpResult<Vec<Arc<Slot>>> {
        if self.is_native() {
            return Ok(Vec::new());
        }

        let mut live = Vec::new();
        for slot in self.method()?.slots().await? {
            let first = slot.first_index().await?;
            let length = i64::from(slot.length().await?);
            if first <= self.index && self.index - first <= length {
                live.push(slot);
            }
        }
        Ok(live)
    }

    /// Install a hook firing when execution reaches this location.
    ///
    /// A method's first location hooks method entry, its last location hooks
    /// method exit, and anything in between is a breakpoint.
    pub async fn hook(self: &Arc<Self>, target: Option<HookTarget>) -> JdwpResult<Hook> {
        if self.is_native() {
            return Err(JdwpError::NotHookable);
        }

        let method = self.method()?;
        let modifiers = method.modifiers().await?;
        if modifiers.is_abstract() || modifiers.is_native() {
            return Err(JdwpError::NotHookable);
        }

        let first = method.first_location().await?;
        let last = method.last_location().await?;
        let kind = if first.is_some_and(|l| l.index() == self.index) {
            event_kinds::METHOD_ENTRY
        } else if last.is_some_and(|l| l.index() == self.index) {
            event_kinds::METHOD_EXIT
        } else {
            event_kinds::BREAKPOINT
        };

        self.install(kind, target).await
    }

    /// Hook the exit of this location's method
    pub async fn hook_exit(self: &Arc<Self>, target: Option<HookTarget>) -> JdwpResult<Hook> {
        if self.is_native() {
            return Err(JdwpError::NotHookable);
        }
        self.install(event_kinds::METHOD_EXIT, target).await
    }

    /// Breakpoint at this exact index regardless of its position in the method
    pub async fn hook_breakpoint(self: &Arc<Self>, target: Option<HookTarget>) -> JdwpResult<Hook> {
        if self.is_native() {
            return Err(JdwpError::NotHookable);
        }
        self.install(event_kinds::BREAKPOINT, target).await
    }

    async fn install(self: &Arc<Self>, kind: u8, target: Option<HookTarget>) -> JdwpResult<Hook> {
        let session = upgrade(&self.session)?;
        let type_tag = session.class(self.class).type_tag();
        debug!(
            "Hooking location {:#x}:{:#x}@{} as kind {}",
            self.class, self.method, self.index, kind
        );

        EventRequest::new(kind)
            .modifier(Modifier::LocationOnly {
                type_tag,
                class_id: self.class,
                method_id: self.method,
                index: self.index,
            })
            .install(&session, target, HookOrigin::Location(self.clone()))
            .await
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line() {
            Some(line) => write!(f, "{:#x}:{:#x}@{} (line {})", self.class, self.method, self.index, line),
            None => write!(f, "{:#x}:{:#x}@{}", self.class, self.method, self.index),
        }
    }
}
