// JDWP event decoding
//
// The VM bundles one or more events into a composite notification (0x4064).
// Each event starts with a kind byte that selects its decoder from a
// 256-entry table.

use crate::commands::event_kinds;
use crate::location::Location;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::PacketReader;
use crate::reftype::Class;
use crate::session::SessionInner;
use crate::thread::Thread;
use std::sync::Arc;
use tracing::debug;

/// One decoded event, carrying the id of the request that produced it
#[derive(Debug, Clone)]
pub enum Event {
    SingleStep {
        request_id: i32,
        thread: Arc<Thread>,
        location: Arc<Location>,
    },
    Breakpoint {
        request_id: i32,
        thread: Arc<Thread>,
        location: Arc<Location>,
    },
    MethodEntry {
        request_id: i32,
        thread: Arc<Thread>,
        location: Arc<Location>,
    },
    MethodExit {
        request_id: i32,
        thread: Arc<Thread>,
        location: Arc<Location>,
    },
    ThreadStart {
        request_id: i32,
        thread: Arc<Thread>,
    },
    ThreadDeath {
        request_id: i32,
        thread: Arc<Thread>,
    },
    ClassPrepare {
        request_id: i32,
        thread: Arc<Thread>,
        class: Arc<Class>,
        signature: String,
        status: i32,
    },
    VmStart {
        request_id: i32,
        thread: Arc<Thread>,
    },
    VmDeath {
        request_id: i32,
    },
}

impl Event {
    pub fn request_id(&self) -> i32 {
        match self {
            Event::SingleStep { request_id, .. }
            | Event::Breakpoint { request_id, .. }
            | Event::MethodEntry { request_id, .. }
            | Event::MethodExit { request_id, .. }
            | Event::ThreadStart { request_id, .. }
            | Event::ThreadDeath { request_id, .. }
            | Event::ClassPrepare { request_id, .. }
            | Event::VmStart { request_id, .. }
            | Event::VmDeath { request_id } => *request_id,
        }
    }

    pub fn kind(&self) -> u8 {
        match self {
            Event::SingleStep { .. } => event_kinds::SINGLE_STEP,
            Event::Breakpoint { .. } => event_kinds::BREAKPOINT,
            Event::MethodEntry { .. } => event_kinds::METHOD_ENTRY,
            Event::MethodExit { .. } => event_kinds::METHOD_EXIT,
            Event::ThreadStart { .. } => event_kinds::THREAD_START,
            Event::ThreadDeath { .. } => event_kinds::THREAD_DEATH,
            Event::ClassPrepare { .. } => event_kinds::CLASS_PREPARE,
            Event::VmStart { .. } => event_kinds::VM_START,
            Event::VmDeath { .. } => event_kinds::VM_DEATH,
        }
    }

    pub fn thread(&self) -> Option<&Arc<Thread>> {
        match self {
            Event::SingleStep { thread, .. }
            | Event::Breakpoint { thread, .. }
            | Event::MethodEntry { thread, .. }
            | Event::MethodExit { thread, .. }
            | Event::ThreadStart { thread, .. }
            | Event::ThreadDeath { thread, .. }
            | Event::ClassPrepare { thread, .. }
            | Event::VmStart { thread, .. } => Some(thread),
            Event::VmDeath { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&Arc<Location>> {
        match self {
            Event::SingleStep { location, .. }
            | Event::Breakpoint { location, .. }
            | Event::MethodEntry { location, .. }
            | Event::MethodExit { location, .. } => Some(location),
            _ => None,
        }
    }
}

type EventDecodeFn = fn(u8, &mut PacketReader<'_>, &Arc<SessionInner>) -> JdwpResult<Event>;

static EVENT_DECODERS: [Option<EventDecodeFn>; 256] = event_decoders();

const fn event_decoders() -> [Option<EventDecodeFn>; 256] {
    let mut table: [Option<EventDecodeFn>; 256] = [None; 256];
    table[event_kinds::SINGLE_STEP as usize] = Some(decode_located);
    table[event_kinds::BREAKPOINT as usize] = Some(decode_located);
    table[event_kinds::METHOD_ENTRY as usize] = Some(decode_located);
    table[event_kinds::METHOD_EXIT as usize] = Some(decode_located);
    table[event_kinds::THREAD_START as usize] = Some(decode_thread_event);
    table[event_kinds::THREAD_DEATH as usize] = Some(decode_thread_event);
    table[event_kinds::CLASS_PREPARE as usize] = Some(decode_class_prepare);
    table[event_kinds::VM_START as usize] = Some(decode_thread_event);
    table[event_kinds::VM_DEATH as usize] = Some(decode_vm_death);
    table
}

fn decode_located(kind: u8, r: &mut PacketReader<'_>, s: &Arc<SessionInner>) -> JdwpResult<Event> {
    let request_id = r.read_i32()?;
    let thread = s.thread(r.read_object_id()?);
    let location = Location::decode(r, s)?;

    Ok(match kind {
        event_kinds::SINGLE_STEP => Event::SingleStep {
            request_id,
            thread,
            location,
        },
        event_kinds::BREAKPOINT => Event::Breakpoint {
            request_id,
            thread,
            location,
        },
        event_kinds::METHOD_ENTRY => Event::MethodEntry {
            request_id,
            thread,
            location,
        },
        _ => Event::MethodExit {
            request_id,
            thread,
            location,
        },
    })
}

fn decode_thread_event(
    kind: u8,
    r: &mut PacketReader<'_>,
    s: &Arc<SessionInner>,
) -> JdwpResult<Event> {
    let request_id = r.read_i32()?;
    let thread = s.thread(r.read_object_id()?);

    Ok(match kind {
        event_kinds::THREAD_START => Event::ThreadStart { request_id, thread },
        event_kinds::THREAD_DEATH => Event::ThreadDeath { request_id, thread },
        _ => Event::VmStart { request_id, thread },
    })
}

fn decode_class_prepare(
    _: u8,
    r: &mut PacketReader<'_>,
    s: &Arc<SessionInner>,
) -> JdwpResult<Event> {
    let request_id = r.read_i32()?;
    let thread = s.thread(r.read_object_id()?);
    let type_tag = r.read_u8()?;
    let class = s.class(r.read_reference_type_id()?);
    class.set_type_tag(type_tag);
    let signature = r.read_string()?;
    let status = r.read_i32()?;

    Ok(Event::ClassPrepare {
        request_id,
        thread,
        class,
        signature,
        status,
    })
}

fn decode_vm_death(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Event> {
    Ok(Event::VmDeath {
        request_id: r.read_i32()?,
    })
}

/// Incremental reader over one composite notification.
///
/// Events are produced one at a time so the ones preceding an undecodable
/// event are still delivered.
pub(crate) struct CompositeReader<'a> {
    reader: PacketReader<'a>,
    suspend_policy: u8,
    remaining: usize,
}

impl<'a> CompositeReader<'a> {
    pub(crate) fn new(mut reader: PacketReader<'a>) -> JdwpResult<Self> {
        let suspend_policy = reader.read_u8()?;
        let remaining = reader.read_count()?;
        debug!(
            "Composite event: suspend_policy={}, events={}",
            suspend_policy, remaining
        );
        Ok(Self {
            reader,
            suspend_policy,
            remaining,
        })
    }

    pub(crate) fn suspend_policy(&self) -> u8 {
        self.suspend_policy
    }

    /// Decode the next event; after an error the rest of the set is abandoned
    pub(crate) fn next_event(&mut self, session: &Arc<SessionInner>) -> Option<JdwpResult<Event>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let result = self.reader.read_u8().and_then(|kind| {
            match EVENT_DECODERS[kind as usize] {
                Some(decode) => decode(kind, &mut self.reader, session),
                None => Err(JdwpError::UnsupportedEvent(kind)),
            }
        });
        if result.is_err() {
            self.remaining = 0;
        }
        Some(result)
    }
}
