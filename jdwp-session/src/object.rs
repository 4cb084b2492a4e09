// Object references
//
// Instance field reads pack every non-static field of the object's type into
// one ObjectReference.GetValues request. Arrays and strings build on this.

use crate::commands::{command, command_sets, object_reference_commands};
use crate::deferred::Deferred;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reftype::{Class, Field};
use crate::session::{upgrade, SessionInner};
use crate::types::ObjectId;
use crate::value::{decode_tagged, encode_value, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Debug, Default, Clone)]
struct ObjectType {
    class: Option<Arc<Class>>,
}

pub struct Object {
    pub(crate) session: Weak<SessionInner>,
    id: ObjectId,
    ref_type: Deferred<ObjectType>,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &format_args!("{:#x}", self.id))
            .finish()
    }
}

impl Object {
    pub(crate) fn new(session: Weak<SessionInner>, id: ObjectId) -> Self {
        Self {
            session,
            id,
            ref_type: Deferred::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Runtime type of the object (ObjectReference.ReferenceType)
    pub async fn ref_type(&self) -> JdwpResult<Arc<Class>> {
        let session = upgrade(&self.session)?;
        self.ref_type
            .read("ref_type", |g| g.class.clone(), || async {
                let mut w = session.writer();
                w.put_object_id(self.id);

                let reply = session
                    .request(
                        command(command_sets::OBJECT_REFERENCE, object_reference_commands::REFERENCE_TYPE),
                        w.into_vec(),
                    )
                    .await?;

                let mut r = session.reader(reply.data());
                let type_tag = r.read_u8()?;
                let class = session.class(r.read_reference_type_id()?);
                class.set_type_tag(type_tag);
                Ok::<_, JdwpError>(ObjectType { class: Some(class) })
            })
            .await
    }

    pub async fn signature(&self) -> JdwpResult<String> {
        self.ref_type().await?.signature().await
    }

    async fn instance_fields(&self) -> JdwpResult<Vec<Arc<Field>>> {
        let mut fields = Vec::new();
        for field in self.ref_type().await?.fields().await? {
            if !field.is_static().await? {
                fields.push(field);
            }
        }
        Ok(fields)
    }

    /// Values of every instance field declared by the object's type
    pub async fn fields(&self) -> JdwpResult<Vec<(String, Value)>> {
        let session = upgrade(&self.session)?;
        let fields = self.instance_fields().await?;
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut w = session.writer();
        w.put_object_id(self.id).put_i32(fields.len() as i32);
        for field in &fields {
            w.put_field_id(field.id());
        }

        let reply = session
            .request(
                command(command_sets::OBJECT_REFERENCE, object_reference_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut values = Vec::with_capacity(count);
        for field in fields.iter().take(count) {
            values.push((field.name().await?, decode_tagged(&mut r, &session)?));
        }
        Ok(values)
    }

    async fn field_named(&self, name: &str) -> JdwpResult<Arc<Field>> {
        for field in self.instance_fields().await? {
            if field.name().await? == name {
                return Ok(field);
            }
        }
        Err(JdwpError::NotFound(format!("no instance field named {name}")))
    }

    /// Value of one instance field
    pub async fn field(&self, name: &str) -> JdwpResult<Value> {
        let session = upgrade(&self.session)?;
        let field = self.field_named(name).await?;

        let mut w = session.writer();
        w.put_object_id(self.id).put_i32(1).put_field_id(field.id());

        let reply = session
            .request(
                command(command_sets::OBJECT_REFERENCE, object_reference_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        if r.read_count()? != 1 {
            return Err(JdwpError::Protocol("expected one field value".into()));
        }
        decode_tagged(&mut r, &session)
    }

    /// Overwrite one primitive instance field
    pub async fn set_field(&self, name: &str, value: &Value) -> JdwpResult<()> {
        let session = upgrade(&self.session)?;
        let field = self.field_named(name).await?;
        let tag = field.tag().await?;

        let mut w = session.writer();
        w.put_object_id(self.id).put_i32(1).put_field_id(field.id());
        // ObjectReference.SetValues takes untagged values
        encode_value(&mut w, tag, value, false)?;

        session
            .request(
                command(command_sets::OBJECT_REFERENCE, object_reference_commands::SET_VALUES),
                w.into_vec(),
            )
            .await?;
        debug!("Set field {} of object {:#x} to {}", name, self.id, value);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::tests::FakeVm;
    use crate::session::tests::{answer, test_session};
    use crate::types::{IdSizes, Modifiers};
    use crate::writer::PacketWriter;

    /// Answer the ReferenceType then FieldsWithGeneric requests for class 0x10
    pub(crate) async fn answer_type_and_fields(sizes: IdSizes, vm: &mut FakeVm) {
        let mut w = PacketWriter::new(sizes);
        w.put_u8(1).put_reference_type_id(0x10);
        let (code, _) = answer(vm, &w.into_vec()).await;
        assert_eq!(code, 0x0901);

        let mut w = PacketWriter::new(sizes);
        w.put_i32(3);
        for (id, name, jni, flags) in [
            (0x1, "count", "I", Modifiers::PRIVATE),
            (0x2, "INSTANCES", "J", Modifiers::STATIC),
            (0x3, "label", "Ljava/lang/String;", Modifiers::PRIVATE),
        ] {
            w.put_field_id(id)
                .put_string(name)
                .put_string(jni)
                .put_string("")
                .put_i32(flags);
        }
        let (code, _) = answer(vm, &w.into_vec()).await;
        assert_eq!(code, 0x020E);
    }

    #[tokio::test]
    async fn test_fields_skip_statics_and_use_object_id() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let object = session.object(0x55);

        let pending = tokio::spawn({
            let object = object.clone();
            async move { object.fields().await }
        });
        answer_type_and_fields(sizes, &mut vm).await;

        let mut w = PacketWriter::new(sizes);
        w.put_i32(2).put_u8(b'I').put_i32(9).put_u8(b's').put_object_id(0);
        let (code, sent) = answer(&mut vm, &w.into_vec()).await;
        assert_eq!(code, 0x0902);
        assert_eq!(&sent[..8], &0x55u64.to_be_bytes());
        assert_eq!(&sent[8..12], &[0, 0, 0, 2]);

        let fields = pending.await.unwrap().unwrap();
        assert_eq!(fields[0], ("count".to_string(), Value::Int(9)));
        assert_eq!(fields[1], ("label".to_string(), Value::Null(b's')));
    }

    #[tokio::test]
    async fn test_set_field_sends_untagged_value() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let object = session.object(0x55);

        let pending = tokio::spawn({
            let object = object.clone();
            async move { object.set_field("count", &Value::Int(-1)).await }
        });
        answer_type_and_fields(sizes, &mut vm).await;

        let (code, sent) = answer(&mut vm, &[]).await;
        assert_eq!(code, 0x0903);
        // object, count, field id (4 bytes), raw int
        assert_eq!(&sent[8..], &[0, 0, 0, 1, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]);
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_static_or_missing_field_is_not_fatal() {
        let (session, mut vm) = test_session(8).await;
        let object = session.object(0x55);

        let pending = tokio::spawn({
            let object = object.clone();
            async move {
                let statics = object.field("INSTANCES").await;
                let missing = object.field("nosuch").await;
                (statics, missing)
            }
        });
        answer_type_and_fields(session.id_sizes(), &mut vm).await;

        let (statics, missing) = pending.await.unwrap();
        for err in [statics.unwrap_err(), missing.unwrap_err()] {
            assert!(matches!(err, JdwpError::NotFound(_)));
            assert!(!err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_set_field_rejects_reference_values() {
        let (session, mut vm) = test_session(8).await;
        let object = session.object(0x55);

        let pending = tokio::spawn({
            let object = object.clone();
            async move { object.set_field("label", &Value::Int(1)).await }
        });
        answer_type_and_fields(session.id_sizes(), &mut vm).await;

        assert!(matches!(
            pending.await.unwrap(),
            Err(JdwpError::UnsupportedType(b'L'))
        ));
    }
}
