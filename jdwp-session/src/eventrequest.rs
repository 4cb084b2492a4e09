// EventRequest command implementations
//
// Build and install event requests (breakpoints, method entry/exit, steps)
// and clear them again.

use crate::commands::{command, command_sets, event_commands, modifier_kinds};
use crate::hook::{Hook, HookOrigin, HookTarget};
use crate::protocol::JdwpResult;
use crate::session::SessionInner;
use crate::types::{MethodId, ObjectId, ReferenceTypeId, SuspendPolicy, ThreadId};
use crate::writer::PacketWriter;
use std::sync::Arc;
use tracing::debug;

/// Event filter attached to a request
#[derive(Debug, Clone)]
pub(crate) enum Modifier {
    Count(i32),
    ThreadOnly(ThreadId),
    ClassOnly(ReferenceTypeId),
    LocationOnly {
        type_tag: u8,
        class_id: ReferenceTypeId,
        method_id: MethodId,
        index: i64,
    },
    Step {
        thread: ObjectId,
        size: i32,
        depth: i32,
    },
}

impl Modifier {
    fn encode(&self, w: &mut PacketWriter) {
        match *self {
            Modifier::Count(count) => {
                w.put_u8(modifier_kinds::COUNT).put_i32(count);
            }
            Modifier::ThreadOnly(thread) => {
                w.put_u8(modifier_kinds::THREAD_ONLY).put_object_id(thread);
            }
            Modifier::ClassOnly(class) => {
                w.put_u8(modifier_kinds::CLASS_ONLY)
                    .put_reference_type_id(class);
            }
            Modifier::LocationOnly {
                type_tag,
                class_id,
                method_id,
                index,
            } => {
                w.put_u8(modifier_kinds::LOCATION_ONLY)
                    .put_u8(type_tag)
                    .put_reference_type_id(class_id)
                    .put_method_id(method_id)
                    .put_i64(index);
            }
            Modifier::Step {
                thread,
                size,
                depth,
            } => {
                w.put_u8(modifier_kinds::STEP)
                    .put_object_id(thread)
                    .put_i32(size)
                    .put_i32(depth);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EventRequest {
    kind: u8,
    policy: SuspendPolicy,
    modifiers: Vec<Modifier>,
}

impl EventRequest {
    /// Requests suspend only the event thread unless told otherwise
    pub(crate) fn new(kind: u8) -> Self {
        Self {
            kind,
            policy: SuspendPolicy::EventThread,
            modifiers: Vec::new(),
        }
    }

    pub(crate) fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub(crate) fn encode(&self, w: &mut PacketWriter) {
        w.put_u8(self.kind)
            .put_u8(self.policy as u8)
            .put_i32(self.modifiers.len() as i32);
        for modifier in &self.modifiers {
            modifier.encode(w);
        }
    }

    /// Send EventRequest.Set and register a hook under the returned id
    pub(crate) async fn install(
        self,
        session: &Arc<SessionInner>,
        target: Option<HookTarget>,
        origin: HookOrigin,
    ) -> JdwpResult<Hook> {
        let mut w = session.writer();
        self.encode(&mut w);

        let reply = session
            .request(
                command(command_sets::EVENT_REQUEST, event_commands::SET),
                w.into_vec(),
            )
            .await?;
        let request_id = session.reader(reply.data()).read_i32()?;
        debug!("Installed event request kind={} id={}", self.kind, request_id);

        Ok(session.register_hook(request_id, self.kind, target, origin))
    }
}

/// EventRequest.Clear for the given kind and request id
pub(crate) async fn clear(
    session: &Arc<SessionInner>,
    kind: u8,
    request_id: i32,
) -> JdwpResult<()> {
    let mut w = session.writer();
    w.put_u8(kind).put_i32(request_id);

    session
        .request(
            command(command_sets::EVENT_REQUEST, event_commands::CLEAR),
            w.into_vec(),
        )
        .await?;

    debug!("Cleared event request kind={} id={}", kind, request_id);
    Ok(())
}
