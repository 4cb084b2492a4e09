// Methods and their local-variable slots
//
// A method's declaration (name, signature, modifiers) comes from the owning
// class's method list. The line table (6/1) and the variable table (6/5)
// are separate groups loaded on first use.

use crate::commands::{command, command_sets, method_commands};
use crate::deferred::Deferred;
use crate::location::Location;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reftype::Class;
use crate::session::{upgrade, SessionInner};
use crate::types::{tags, MethodId, Modifiers, ReferenceTypeId};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug, Default, Clone)]
struct MethodDeclaration {
    name: Option<String>,
    jni: Option<String>,
    generic: Option<String>,
    modifiers: Option<Modifiers>,
}

/// First/last executable location and the line table. `None` inside a loaded
/// member means the method has no locations (abstract or native).
#[derive(Debug, Default, Clone)]
struct LineInfo {
    first: Option<Option<Arc<Location>>>,
    last: Option<Option<Arc<Location>>>,
    lines: Option<Vec<(i32, Arc<Location>)>>,
}

#[derive(Debug, Default, Clone)]
struct SlotTable {
    arg_count: Option<i32>,
    slots: Option<Vec<Arc<Slot>>>,
}

pub struct Method {
    session: Weak<SessionInner>,
    class: ReferenceTypeId,
    id: MethodId,
    declaration: Deferred<MethodDeclaration>,
    lines: Deferred<LineInfo>,
    slots: Deferred<SlotTable>,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("class", &format_args!("{:#x}", self.class))
            .field("id", &format_args!("{:#x}", self.id))
            .field("name", &self.declaration.peek(|g| g.name.clone()))
            .finish()
    }
}

impl Method {
    pub(crate) fn new(session: Weak<SessionInner>, class: ReferenceTypeId, id: MethodId) -> Self {
        Self {
            session,
            class,
            id,
            declaration: Deferred::new(),
            lines: Deferred::new(),
            slots: Deferred::new(),
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn class_id(&self) -> ReferenceTypeId {
        self.class
    }

    pub fn class(&self) -> JdwpResult<Arc<Class>> {
        Ok(upgrade(&self.session)?.class(self.class))
    }

    pub(crate) fn set_declaration(&self, name: String, jni: String, generic: String, modifiers: Modifiers) {
        self.declaration.write(|g| {
            *g = MethodDeclaration {
                name: Some(name),
                jni: Some(jni),
                generic: Some(generic),
                modifiers: Some(modifiers),
            }
        });
    }

    async fn declared<T>(&self, name: &'static str, project: impl Fn(&MethodDeclaration) -> Option<T>) -> JdwpResult<T> {
        let class = self.class()?;
        self.declaration
            .read(name, project, || async {
                class.methods(None, None).await?;
                Ok::<_, JdwpError>(self.declaration.snapshot())
            })
            .await
    }

    pub async fn name(&self) -> JdwpResult<String> {
        self.declared("name", |g| g.name.clone()).await
    }

    /// JNI method signature, e.g. `(ILjava/lang/String;)V`
    pub async fn signature(&self) -> JdwpResult<String> {
        self.declared("jni", |g| g.jni.clone()).await
    }

    pub async fn generic_signature(&self) -> JdwpResult<String> {
        self.declared("generic", |g| g.generic.clone()).await
    }

    pub async fn modifiers(&self) -> JdwpResult<Modifiers> {
        self.declared("modifiers", |g| g.modifiers).await
    }

    /// `Class.name(signature)` rendering used in listings
    pub async fn describe(&self) -> JdwpResult<String> {
        let class = self.class()?;
        Ok(format!(
            "{}.{}{}",
            class.name().await?,
            self.name().await?,
            self.signature().await?
        ))
    }

    /// First executable location, `None` for abstract and native methods
    pub async fn first_location(&self) -> JdwpResult<Option<Arc<Location>>> {
        let session = upgrade(&self.session)?;
        self.lines
            .read("first_location", |g| g.first.clone(), || self.load_line_table(&session))
            .await
    }

    pub async fn last_location(&self) -> JdwpResult<Option<Arc<Location>>> {
        let session = upgrade(&self.session)?;
        self.lines
            .read("last_location", |g| g.last.clone(), || self.load_line_table(&session))
            .await
    }

    /// (line, location) pairs in the order the VM reported them
    pub async fn line_table(&self) -> JdwpResult<Vec<(i32, Arc<Location>)>> {
        let session = upgrade(&self.session)?;
        self.lines
            .read("line_table", |g| g.lines.clone(), || self.load_line_table(&session))
            .await
    }

    async fn load_line_table(&self, session: &Arc<SessionInner>) -> JdwpResult<LineInfo> {
        if self.modifiers().await?.is_abstract() {
            debug!("Method {:#x} is abstract, no line table", self.id);
            return Ok(LineInfo {
                first: Some(None),
                last: Some(None),
                lines: Some(Vec::new()),
            });
        }

        let mut w = session.writer();
        w.put_reference_type_id(self.class).put_method_id(self.id);

        let reply = session
            .request(
                command(command_sets::METHOD, method_commands::LINE_TABLE),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let start = r.read_i64()?;
        let end = r.read_i64()?;
        let count = r.read_count()?;

        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let index = r.read_i64()?;
            let line = r.read_i32()?;
            let location = session.location(self.class, self.id, index);
            location.set_line(line);
            lines.push((line, location));
        }

        // Native methods report -1 for both ends
        if start == -1 || end == -1 {
            return Ok(LineInfo {
                first: Some(None),
                last: Some(None),
                lines: Some(lines),
            });
        }

        Ok(LineInfo {
            first: Some(Some(session.location(self.class, self.id, start))),
            last: Some(Some(session.location(self.class, self.id, end))),
            lines: Some(lines),
        })
    }

    /// Local-variable slots, arguments included
    pub async fn slots(&self) -> JdwpResult<Vec<Arc<Slot>>> {
        let session = upgrade(&self.session)?;
        self.slots
            .read("slots", |g| g.slots.clone(), || self.load_slot_table(&session))
            .await
    }

    pub async fn arg_count(&self) -> JdwpResult<i32> {
        let session = upgrade(&self.session)?;
        self.slots
            .read("arg_count", |g| g.arg_count, || self.load_slot_table(&session))
            .await
    }

    async fn load_slot_table(&self, session: &Arc<SessionInner>) -> JdwpResult<SlotTable> {
        let mut w = session.writer();
        w.put_reference_type_id(self.class).put_method_id(self.id);

        let reply = session
            .request(
                command(command_sets::METHOD, method_commands::VARIABLE_TABLE_WITH_GENERIC),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let arg_count = r.read_i32()?;
        let count = r.read_count()?;

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            let info = SlotInfo {
                first_index: Some(r.read_i64()?),
                name: Some(r.read_string()?),
                jni: Some(r.read_string()?),
                generic: Some(r.read_string()?),
                length: Some(r.read_i32()?),
            };
            let slot = session.slot(self.class, self.id, r.read_i32()?);
            slot.info.write(|g| *g = info);
            slots.push(slot);
        }

        debug!("Loaded {} slots for method {:#x}", slots.len(), self.id);
        Ok(SlotTable {
            arg_count: Some(arg_count),
            slots: Some(slots),
        })
    }

    /// Raw bytecode of the method
    pub async fn bytecodes(&self) -> JdwpResult<Vec<u8>> {
        let session = upgrade(&self.session)?;
        let mut w = session.writer();
        w.put_reference_type_id(self.class).put_method_id(self.id);

        let reply = session
            .request(
                command(command_sets::METHOD, method_commands::BYTECODES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut code = Vec::with_capacity(count);
        for _ in 0..count {
            code.push(r.read_u8()?);
        }
        Ok(code)
    }
}

#[derive(Debug, Default, Clone)]
struct SlotInfo {
    first_index: Option<i64>,
    length: Option<i32>,
    name: Option<String>,
    jni: Option<String>,
    generic: Option<String>,
}

/// A local variable of a method, live over `[first_index, first_index + length]`
pub struct Slot {
    session: Weak<SessionInner>,
    class: ReferenceTypeId,
    method: MethodId,
    index: i32,
    info: Deferred<SlotInfo>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("name", &self.info.peek(|g| g.name.clone()))
            .finish()
    }
}

impl Slot {
    pub(crate) fn new(
        session: Weak<SessionInner>,
        class: ReferenceTypeId,
        method: MethodId,
        index: i32,
    ) -> Self {
        Self {
            session,
            class,
            method,
            index,
            info: Deferred::new(),
        }
    }

    /// Index of the variable in the frame
    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn method(&self) -> JdwpResult<Arc<Method>> {
        Ok(upgrade(&self.session)?.method(self.class, self.method))
    }

    async fn described<T>(&self, name: &'static str, project: impl Fn(&SlotInfo) -> Option<T>) -> JdwpResult<T> {
        let method = self.method()?;
        self.info
            .read(name, project, || async {
                method.slots().await?;
                Ok::<_, JdwpError>(self.info.snapshot())
            })
            .await
    }

    pub async fn name(&self) -> JdwpResult<String> {
        self.described("name", |g| g.name.clone()).await
    }

    pub async fn signature(&self) -> JdwpResult<String> {
        self.described("jni", |g| g.jni.clone()).await
    }

    pub async fn generic_signature(&self) -> JdwpResult<String> {
        self.described("generic", |g| g.generic.clone()).await
    }

    /// Code index where the variable becomes live
    pub async fn first_index(&self) -> JdwpResult<i64> {
        self.described("first_index", |g| g.first_index).await
    }

    pub async fn length(&self) -> JdwpResult<i32> {
        self.described("length", |g| g.length).await
    }

    /// Value tag taken from the signature's first character
    pub async fn tag(&self) -> JdwpResult<u8> {
        let jni = self.signature().await?;
        Ok(jni.as_bytes().first().copied().unwrap_or(tags::OBJECT))
    }
}
