// Reference types and their fields
//
// Class metadata is loaded in groups: signature (2/13), fields (2/14) and
// methods (2/15). Loading a group also fills the declaration groups of the
// fields and methods it names.

use crate::commands::{command, command_sets, event_kinds, reference_type_commands};
use crate::deferred::Deferred;
use crate::eventrequest::{EventRequest, Modifier};
use crate::hook::{Hook, HookOrigin, HookTarget};
use crate::method::Method;
use crate::protocol::{JdwpError, JdwpResult};
use crate::session::{upgrade, SessionInner};
use crate::types::{signature_to_name, type_tags, FieldId, Modifiers, ReferenceTypeId};
use crate::value::{decode_tagged, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub(crate) struct ClassSignature {
    jni: Option<String>,
    generic: Option<String>,
}

#[derive(Debug, Default, Clone)]
struct ClassFields {
    list: Option<Vec<Arc<Field>>>,
}

#[derive(Default, Clone)]
struct ClassMethods {
    list: Option<Vec<Arc<Method>>>,
    by_name: Option<HashMap<String, Vec<Arc<Method>>>>,
    by_jni: Option<HashMap<String, Vec<Arc<Method>>>>,
}

/// A class, interface or array type loaded in the target VM
pub struct Class {
    session: Weak<SessionInner>,
    id: ReferenceTypeId,
    type_tag: AtomicU8,
    signature: Deferred<ClassSignature>,
    fields: Deferred<ClassFields>,
    methods: Deferred<ClassMethods>,
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &format_args!("{:#x}", self.id))
            .field("type_tag", &self.type_tag())
            .field("jni", &self.signature.peek(|g| g.jni.clone()))
            .finish()
    }
}

impl Class {
    pub(crate) fn new(session: Weak<SessionInner>, id: ReferenceTypeId) -> Self {
        Self {
            session,
            id,
            type_tag: AtomicU8::new(type_tags::CLASS),
            signature: Deferred::new(),
            fields: Deferred::new(),
            methods: Deferred::new(),
        }
    }

    pub fn id(&self) -> ReferenceTypeId {
        self.id
    }

    /// Reference type tag (class, interface or array)
    pub fn type_tag(&self) -> u8 {
        self.type_tag.load(Ordering::Relaxed)
    }

    pub(crate) fn set_type_tag(&self, tag: u8) {
        self.type_tag.store(tag, Ordering::Relaxed);
    }

    pub(crate) fn set_signature(&self, jni: String, generic: String) {
        self.signature.write(|g| {
            g.jni = Some(jni);
            g.generic = Some(generic);
        });
    }

    /// JNI signature, e.g. `Ljava/lang/String;`
    pub async fn signature(&self) -> JdwpResult<String> {
        let session = upgrade(&self.session)?;
        self.signature
            .read("signature", |g| g.jni.clone(), || self.load_signature(&session))
            .await
    }

    /// Generic signature, empty when the type has none
    pub async fn generic_signature(&self) -> JdwpResult<String> {
        let session = upgrade(&self.session)?;
        self.signature
            .read("generic", |g| g.generic.clone(), || {
                self.load_signature(&session)
            })
            .await
    }

    /// Dotted name derived from the signature
    pub async fn name(&self) -> JdwpResult<String> {
        Ok(signature_to_name(&self.signature().await?))
    }

    async fn load_signature(&self, session: &Arc<SessionInner>) -> JdwpResult<ClassSignature> {
        let mut w = session.writer();
        w.put_reference_type_id(self.id);

        let reply = session
            .request(
                command(
                    command_sets::REFERENCE_TYPE,
                    reference_type_commands::SIGNATURE_WITH_GENERIC,
                ),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        Ok(ClassSignature {
            jni: Some(r.read_string()?),
            generic: Some(r.read_string()?),
        })
    }

    /// Every field declared by this type, static and instance
    pub async fn fields(&self) -> JdwpResult<Vec<Arc<Field>>> {
        let session = upgrade(&self.session)?;
        self.fields
            .read("fields", |g| g.list.clone(), || self.load_fields(&session))
            .await
    }

    async fn load_fields(&self, session: &Arc<SessionInner>) -> JdwpResult<ClassFields> {
        let mut w = session.writer();
        w.put_reference_type_id(self.id);

        let reply = session
            .request(
                command(
                    command_sets::REFERENCE_TYPE,
                    reference_type_commands::FIELDS_WITH_GENERIC,
                ),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut list = Vec::with_capacity(count);

        for _ in 0..count {
            let field = session.field(self.id, r.read_field_id()?);
            let declaration = FieldDeclaration {
                name: Some(r.read_string()?),
                jni: Some(r.read_string()?),
                generic: Some(r.read_string()?),
                modifiers: Some(Modifiers(r.read_i32()?)),
            };
            field.declaration.write(|g| *g = declaration);
            list.push(field);
        }

        debug!("Loaded {} fields for type {:#x}", list.len(), self.id);
        Ok(ClassFields { list: Some(list) })
    }

    /// Methods of this type, optionally filtered by name and JNI signature
    pub async fn methods(&self, name: Option<&str>, jni: Option<&str>) -> JdwpResult<Vec<Arc<Method>>> {
        let session = upgrade(&self.session)?;

        let selected = match (name, jni) {
            (Some(name), Some(jni)) => {
                let by_name = self.method_index("methods_by_name", name, |g| &g.by_name, &session).await?;
                let by_jni = self.method_index("methods_by_jni", jni, |g| &g.by_jni, &session).await?;
                by_name
                    .into_iter()
                    .filter(|m| by_jni.iter().any(|other| Arc::ptr_eq(m, other)))
                    .collect()
            }
            (Some(name), None) => {
                self.method_index("methods_by_name", name, |g| &g.by_name, &session)
                    .await?
            }
            (None, Some(jni)) => {
                self.method_index("methods_by_jni", jni, |g| &g.by_jni, &session)
                    .await?
            }
            (None, None) => {
                self.methods
                    .read("methods", |g| g.list.clone(), || self.load_methods(&session))
                    .await?
            }
        };

        Ok(selected)
    }

    async fn method_index<I>(
        &self,
        attribute: &'static str,
        key: &str,
        index: I,
        session: &Arc<SessionInner>,
    ) -> JdwpResult<Vec<Arc<Method>>>
    where
        I: Fn(&ClassMethods) -> &Option<HashMap<String, Vec<Arc<Method>>>>,
    {
        self.methods
            .read(
                attribute,
                |g| {
                    index(g)
                        .as_ref()
                        .map(|map| map.get(key).cloned().unwrap_or_default())
                },
                || self.load_methods(session),
            )
            .await
    }

    async fn load_methods(&self, session: &Arc<SessionInner>) -> JdwpResult<ClassMethods> {
        let mut w = session.writer();
        w.put_reference_type_id(self.id);

        let reply = session
            .request(
                command(
                    command_sets::REFERENCE_TYPE,
                    reference_type_commands::METHODS_WITH_GENERIC,
                ),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut list = Vec::with_capacity(count);
        let mut by_name: HashMap<String, Vec<Arc<Method>>> = HashMap::new();
        let mut by_jni: HashMap<String, Vec<Arc<Method>>> = HashMap::new();

        for _ in 0..count {
            let method = session.method(self.id, r.read_method_id()?);
            let name = r.read_string()?;
            let jni = r.read_string()?;
            let generic = r.read_string()?;
            let modifiers = Modifiers(r.read_i32()?);

            by_name.entry(name.clone()).or_default().push(method.clone());
            by_jni.entry(jni.clone()).or_default().push(method.clone());
            method.set_declaration(name, jni, generic, modifiers);
            list.push(method);
        }

        debug!("Loaded {} methods for type {:#x}", list.len(), self.id);
        Ok(ClassMethods {
            list: Some(list),
            by_name: Some(by_name),
            by_jni: Some(by_jni),
        })
    }

    /// Current values of the static fields, in declaration order
    pub async fn statics(&self) -> JdwpResult<Vec<(String, Value)>> {
        let session = upgrade(&self.session)?;

        let mut statics = Vec::new();
        for field in self.fields().await? {
            if field.modifiers().await?.is_static() {
                statics.push(field);
            }
        }

        let mut w = session.writer();
        w.put_reference_type_id(self.id).put_i32(statics.len() as i32);
        for field in &statics {
            w.put_field_id(field.id());
        }

        let reply = session
            .request(
                command(command_sets::REFERENCE_TYPE, reference_type_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut values = Vec::with_capacity(count);
        for field in statics.iter().take(count) {
            values.push((field.name().await?, decode_tagged(&mut r, &session)?));
        }

        Ok(values)
    }

    /// Hook every method entry of this class
    pub async fn hook_entries(self: &Arc<Self>, target: Option<HookTarget>) -> JdwpResult<Hook> {
        let session = upgrade(&self.session)?;

        EventRequest::new(event_kinds::METHOD_ENTRY)
            .modifier(Modifier::ClassOnly(self.id))
            .install(&session, target, HookOrigin::Class(self.clone()))
            .await
    }
}

#[derive(Debug, Default, Clone)]
struct FieldDeclaration {
    name: Option<String>,
    jni: Option<String>,
    generic: Option<String>,
    modifiers: Option<Modifiers>,
}

/// A field of a reference type; its declaration comes from the owning
/// class's field list
pub struct Field {
    session: Weak<SessionInner>,
    class: ReferenceTypeId,
    id: FieldId,
    declaration: Deferred<FieldDeclaration>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("class", &format_args!("{:#x}", self.class))
            .field("id", &format_args!("{:#x}", self.id))
            .field("name", &self.declaration.peek(|g| g.name.clone()))
            .finish()
    }
}

impl Field {
    pub(crate) fn new(session: Weak<SessionInner>, class: ReferenceTypeId, id: FieldId) -> Self {
        Self {
            session,
            class,
            id,
            declaration: Deferred::new(),
        }
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn class(&self) -> JdwpResult<Arc<Class>> {
        Ok(upgrade(&self.session)?.class(self.class))
    }

    async fn declared<T>(&self, name: &'static str, project: impl Fn(&FieldDeclaration) -> Option<T>) -> JdwpResult<T> {
        let class = self.class()?;
        self.declaration
            .read(name, project, || async {
                class.fields().await?;
                Ok::<_, JdwpError>(self.declaration.snapshot())
            })
            .await
    }

    pub async fn name(&self) -> JdwpResult<String> {
        self.declared("name", |g| g.name.clone()).await
    }

    /// JNI type signature, e.g. `I` or `Ljava/lang/String;`
    pub async fn signature(&self) -> JdwpResult<String> {
        self.declared("jni", |g| g.jni.clone()).await
    }

    pub async fn generic_signature(&self) -> JdwpResult<String> {
        self.declared("generic", |g| g.generic.clone()).await
    }

    pub async fn modifiers(&self) -> JdwpResult<Modifiers> {
        self.declared("modifiers", |g| g.modifiers).await
    }

    pub async fn is_static(&self) -> JdwpResult<bool> {
        Ok(self.modifiers().await?.is_static())
    }

    /// Value tag implied by the signature's first character
    pub async fn tag(&self) -> JdwpResult<u8> {
        let jni = self.signature().await?;
        Ok(jni.as_bytes().first().copied().unwrap_or(crate::types::tags::OBJECT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{answer, test_session};
    use crate::types::IdSizes;
    use crate::writer::PacketWriter;

    fn methods_reply(sizes: IdSizes) -> Vec<u8> {
        let mut w = PacketWriter::new(sizes);
        w.put_i32(3);
        for (id, name, jni, flags) in [
            (0x1, "<init>", "()V", Modifiers::PUBLIC),
            (0x2, "run", "()V", Modifiers::PUBLIC),
            (0x3, "run", "(I)V", Modifiers::PRIVATE | Modifiers::NATIVE),
        ] {
            w.put_method_id(id)
                .put_string(name)
                .put_string(jni)
                .put_string("")
                .put_i32(flags);
        }
        w.into_vec()
    }

    #[tokio::test]
    async fn test_methods_group_loaded_once_and_indexed() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let class = session.class(0x10);

        let lookup = tokio::spawn({
            let class = class.clone();
            async move { class.methods(Some("run"), None).await }
        });
        let (code, body) = answer(&mut vm, &methods_reply(sizes)).await;
        assert_eq!(code, 0x020F);
        assert_eq!(body, 0x10u64.to_be_bytes().to_vec());

        let runs = lookup.await.unwrap().unwrap();
        assert_eq!(runs.len(), 2);

        // Served from the cached group, no further traffic
        let all = class.methods(None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        let exact = class.methods(Some("run"), Some("(I)V")).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert!(Arc::ptr_eq(&exact[0], &runs[1]));

        // Declarations were filled by the same reply
        assert_eq!(exact[0].name().await.unwrap(), "run");
        assert!(exact[0].modifiers().await.unwrap().is_native());
        assert!(Arc::ptr_eq(&exact[0], &session.inner().method(0x10, 0x3)));
    }

    #[tokio::test]
    async fn test_name_from_signature() {
        let (session, mut vm) = test_session(8).await;
        let class = session.class(0x20);

        let name = tokio::spawn({
            let class = class.clone();
            async move { class.name().await }
        });
        let mut w = PacketWriter::new(session.id_sizes());
        w.put_string("Lcom/example/Foo;").put_string("");
        let (code, _) = answer(&mut vm, &w.into_vec()).await;

        assert_eq!(code, 0x020D);
        assert_eq!(name.await.unwrap().unwrap(), "com.example.Foo");
        assert_eq!(class.generic_signature().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_statics_skip_instance_fields() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let class = session.class(0x30);

        let statics = tokio::spawn({
            let class = class.clone();
            async move { class.statics().await }
        });

        let mut fields = PacketWriter::new(sizes);
        fields
            .put_i32(2)
            .put_field_id(0xA)
            .put_string("count")
            .put_string("I")
            .put_string("")
            .put_i32(Modifiers::STATIC)
            .put_field_id(0xB)
            .put_string("name")
            .put_string("Ljava/lang/String;")
            .put_string("")
            .put_i32(Modifiers::PRIVATE);
        answer(&mut vm, &fields.into_vec()).await;

        let mut values = PacketWriter::new(sizes);
        values.put_i32(1).put_u8(b'I').put_i32(41);
        let (code, body) = answer(&mut vm, &values.into_vec()).await;

        assert_eq!(code, 0x0206);
        let mut expected = PacketWriter::new(sizes);
        expected.put_reference_type_id(0x30).put_i32(1).put_field_id(0xA);
        assert_eq!(body, expected.into_vec());

        let statics = statics.await.unwrap().unwrap();
        assert_eq!(statics, vec![("count".to_string(), Value::Int(41))]);
    }
}
