// Stack frames
//
// A frame is only meaningful while its thread stays suspended. Value reads
// pack every live slot into one StackFrame.GetValues request; writes touch a
// single slot.

use crate::commands::{command, command_sets, stack_frame_commands};
use crate::location::Location;
use crate::method::Slot;
use crate::poison::lock;
use crate::protocol::{JdwpError, JdwpResult};
use crate::session::{upgrade, SessionInner};
use crate::thread::Thread;
use crate::types::{FrameId, ObjectId};
use crate::value::{decode_tagged, encode_value, Value};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

pub struct Frame {
    session: Weak<SessionInner>,
    thread: ObjectId,
    id: FrameId,
    location: Mutex<Option<Arc<Location>>>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("thread", &format_args!("{:#x}", self.thread))
            .field("id", &format_args!("{:#x}", self.id))
            .field("location", &self.location())
            .finish()
    }
}

impl Frame {
    pub(crate) fn new(session: Weak<SessionInner>, thread: ObjectId, id: FrameId) -> Self {
        Self {
            session,
            thread,
            id,
            location: Mutex::new(None),
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn thread(&self) -> JdwpResult<Arc<Thread>> {
        Ok(upgrade(&self.session)?.thread(self.thread))
    }

    /// Location the frame was executing when the stack was last listed
    pub fn location(&self) -> Option<Arc<Location>> {
        lock(&self.location, "frame location").clone()
    }

    pub(crate) fn set_location(&self, location: Arc<Location>) {
        *lock(&self.location, "frame location") = Some(location);
    }

    pub fn is_native(&self) -> bool {
        self.location().is_some_and(|l| l.is_native())
    }

    async fn live_slots(&self) -> JdwpResult<Vec<Arc<Slot>>> {
        match self.location() {
            Some(location) if !location.is_native() => location.slots().await,
            _ => Ok(Vec::new()),
        }
    }

    /// Current values of every live local variable, by name
    pub async fn values(&self) -> JdwpResult<Vec<(String, Value)>> {
        let session = upgrade(&self.session)?;
        let slots = self.live_slots().await?;
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let mut w = session.writer();
        w.put_object_id(self.thread)
            .put_frame_id(self.id)
            .put_i32(slots.len() as i32);
        for slot in &slots {
            w.put_i32(slot.index()).put_u8(slot.tag().await?);
        }

        let reply = session
            .request(
                command(command_sets::STACK_FRAME, stack_frame_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut values = Vec::with_capacity(count);
        for slot in slots.iter().take(count) {
            values.push((slot.name().await?, decode_tagged(&mut r, &session)?));
        }
        Ok(values)
    }

    async fn slot_named(&self, name: &str) -> JdwpResult<Arc<Slot>> {
        for slot in self.live_slots().await? {
            if slot.name().await? == name {
                return Ok(slot);
            }
        }
        Err(JdwpError::NotFound(format!("no live variable named {name}")))
    }

    /// Value of one live local variable
    pub async fn value(&self, name: &str) -> JdwpResult<Value> {
        let session = upgrade(&self.session)?;
        let slot = self.slot_named(name).await?;

        let mut w = session.writer();
        w.put_object_id(self.thread)
            .put_frame_id(self.id)
            .put_i32(1)
            .put_i32(slot.index())
            .put_u8(slot.tag().await?);

        let reply = session
            .request(
                command(command_sets::STACK_FRAME, stack_frame_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        if r.read_count()? != 1 {
            return Err(JdwpError::Protocol("expected one frame value".into()));
        }
        decode_tagged(&mut r, &session)
    }

    /// Overwrite one primitive local variable
    pub async fn set_value(&self, name: &str, value: &Value) -> JdwpResult<()> {
        let session = upgrade(&self.session)?;
        let slot = self.slot_named(name).await?;
        let tag = slot.tag().await?;

        let mut w = session.writer();
        w.put_object_id(self.thread)
            .put_frame_id(self.id)
            .put_i32(1)
            .put_i32(slot.index());
        encode_value(&mut w, tag, value, true)?;

        session
            .request(
                command(command_sets::STACK_FRAME, stack_frame_commands::SET_VALUES),
                w.into_vec(),
            )
            .await?;
        debug!("Set {} in frame {:#x} to {}", name, self.id, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::FakeVm;
    use crate::session::tests::{answer, test_session};
    use crate::writer::PacketWriter;
    use crate::Session;

    /// Frame 0x100 of thread 0x42 stopped at index 6 of method 0x20
    fn stopped_frame(session: &Session) -> Arc<Frame> {
        let inner = session.inner();
        let frame = inner.frame(0x42, 0x100);
        frame.set_location(inner.location(0x10, 0x20, 6));
        frame
    }

    async fn answer_slots(session: &Session, vm: &mut FakeVm) {
        let mut w = PacketWriter::new(session.id_sizes());
        w.put_i32(1).put_i32(3);
        w.put_i64(0).put_string("n").put_string("I").put_string("").put_i32(20).put_i32(0);
        w.put_i64(4).put_string("total").put_string("J").put_string("").put_i32(16).put_i32(1);
        // Not yet live at index 6
        w.put_i64(10).put_string("tmp").put_string("I").put_string("").put_i32(4).put_i32(3);
        let (code, _) = answer(vm, &w.into_vec()).await;
        assert_eq!(code, 0x0605);
    }

    #[tokio::test]
    async fn test_values_pack_live_slots_in_one_request() {
        let (session, mut vm) = test_session(8).await;
        let frame = stopped_frame(&session);

        let pending = tokio::spawn({
            let frame = frame.clone();
            async move { frame.values().await }
        });
        answer_slots(&session, &mut vm).await;

        let mut w = PacketWriter::new(session.id_sizes());
        w.put_i32(2).put_u8(b'I').put_i32(3).put_u8(b'J').put_i64(40);
        let (code, sent) = answer(&mut vm, &w.into_vec()).await;
        assert_eq!(code, 0x1001);
        // thread, frame, count 2, (slot 0, 'I'), (slot 1, 'J')
        assert_eq!(sent.len(), 8 + 8 + 4 + 2 * 5);
        assert_eq!(&sent[16..20], &[0, 0, 0, 2]);

        let values = pending.await.unwrap().unwrap();
        assert_eq!(values[0], ("n".to_string(), Value::Int(3)));
        assert_eq!(values[1], ("total".to_string(), Value::Long(40)));
    }

    #[tokio::test]
    async fn test_set_value_sends_tagged_value() {
        let (session, mut vm) = test_session(8).await;
        let frame = stopped_frame(&session);

        let pending = tokio::spawn({
            let frame = frame.clone();
            async move { frame.set_value("total", &Value::Int(7)).await }
        });
        answer_slots(&session, &mut vm).await;

        let (code, sent) = answer(&mut vm, &[]).await;
        assert_eq!(code, 0x1002);
        assert_eq!(&sent[20..], &[0, 0, 0, 1, b'J', 0, 0, 0, 0, 0, 0, 0, 7]);
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_variable_is_not_fatal() {
        let (session, mut vm) = test_session(8).await;
        let frame = stopped_frame(&session);

        let pending = tokio::spawn({
            let frame = frame.clone();
            async move { frame.value("tmp").await }
        });
        answer_slots(&session, &mut vm).await;

        // "tmp" exists but is not live at index 6
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, JdwpError::NotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_frame_without_location_has_no_values() {
        let (session, _vm) = test_session(8).await;
        let frame = session.inner().frame(0x42, 0x200);
        assert!(frame.values().await.unwrap().is_empty());
    }
}
