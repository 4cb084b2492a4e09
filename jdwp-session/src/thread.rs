// Thread references
//
// Suspend state lives in the VM and is never cached here: every status,
// suspend and frame query is a fresh request.

use crate::commands::{command, command_sets, event_kinds, step_sizes, thread_commands};
use crate::eventrequest::{EventRequest, Modifier};
use crate::hook::{Hook, HookOrigin, HookTarget};
use crate::location::Location;
use crate::protocol::JdwpResult;
use crate::session::{upgrade, SessionInner};
use crate::stackframe::Frame;
use crate::types::{ObjectId, SuspendStatus, ThreadStatus};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

pub struct Thread {
    session: Weak<SessionInner>,
    id: ObjectId,
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &format_args!("{:#x}", self.id))
            .finish()
    }
}

impl Thread {
    pub(crate) fn new(session: Weak<SessionInner>, id: ObjectId) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    fn body(&self, session: &SessionInner) -> Vec<u8> {
        let mut w = session.writer();
        w.put_object_id(self.id);
        w.into_vec()
    }

    /// Thread name as reported by ThreadReference.Name
    pub async fn name(&self) -> JdwpResult<String> {
        let session = upgrade(&self.session)?;
        let reply = session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::NAME),
                self.body(&session),
            )
            .await?;
        session.reader(reply.data()).read_string()
    }

    pub async fn status(&self) -> JdwpResult<(ThreadStatus, SuspendStatus)> {
        let session = upgrade(&self.session)?;
        let reply = session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::STATUS),
                self.body(&session),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let thread = ThreadStatus::from_raw(r.read_i32()?);
        let suspend = SuspendStatus::from_raw(r.read_i32()?);
        Ok((thread, suspend))
    }

    pub async fn suspend(&self) -> JdwpResult<()> {
        let session = upgrade(&self.session)?;
        session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::SUSPEND),
                self.body(&session),
            )
            .await?;
        debug!("Suspended thread {:#x}", self.id);
        Ok(())
    }

    pub async fn resume(&self) -> JdwpResult<()> {
        let session = upgrade(&self.session)?;
        session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::RESUME),
                self.body(&session),
            )
            .await?;
        debug!("Resumed thread {:#x}", self.id);
        Ok(())
    }

    /// Current call stack, innermost frame first. The thread must be suspended.
    pub async fn frames(&self) -> JdwpResult<Vec<Arc<Frame>>> {
        let session = upgrade(&self.session)?;
        let mut w = session.writer();
        // Start at the top frame, return all of them
        w.put_object_id(self.id).put_i32(0).put_i32(-1);

        let reply = session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::FRAMES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let count = r.read_count()?;
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            let frame = session.frame(self.id, r.read_frame_id()?);
            frame.set_location(Location::decode(&mut r, &session)?);
            frames.push(frame);
        }
        Ok(frames)
    }

    pub async fn frame_count(&self) -> JdwpResult<i32> {
        let session = upgrade(&self.session)?;
        let reply = session
            .request(
                command(command_sets::THREAD_REFERENCE, thread_commands::FRAME_COUNT),
                self.body(&session),
            )
            .await?;
        session.reader(reply.data()).read_i32()
    }

    /// Hook every method entry executed by this thread
    pub async fn hook(self: &Arc<Self>, target: Option<HookTarget>) -> JdwpResult<Hook> {
        let session = upgrade(&self.session)?;
        EventRequest::new(event_kinds::METHOD_ENTRY)
            .modifier(Modifier::ThreadOnly(self.id))
            .install(&session, target, HookOrigin::Thread(self.clone()))
            .await
    }

    /// Request a single step; `depth` is one of `step_depths`.
    ///
    /// The request expires after one event. Resume the thread afterwards to
    /// let it run to the step.
    pub async fn step(self: &Arc<Self>, size: i32, depth: i32, target: Option<HookTarget>) -> JdwpResult<Hook> {
        let session = upgrade(&self.session)?;
        debug!("Stepping thread {:#x} size={} depth={}", self.id, size, depth);
        EventRequest::new(event_kinds::SINGLE_STEP)
            .modifier(Modifier::Step {
                thread: self.id,
                size,
                depth,
            })
            .modifier(Modifier::Count(1))
            .install(&session, target, HookOrigin::Thread(self.clone()))
            .await
    }

    /// Line-granular step
    pub async fn step_line(self: &Arc<Self>, depth: i32, target: Option<HookTarget>) -> JdwpResult<Hook> {
        self.step(step_sizes::LINE, depth, target).await
    }
}
