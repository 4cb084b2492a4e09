// JDWP reader loop
//
// A single background task owns the tables routing inbound frames. Callers
// never touch those tables; they submit bindings through an unbounded queue
// which the loop drains after each frame is read and before it is routed.

use crate::connection::ConnectionState;
use crate::protocol::{JdwpError, JdwpResult, ReplyPacket};
use crate::transport::{FrameReader, RawPacket};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{debug, error, info, warn};

pub(crate) type ReplySender = oneshot::Sender<JdwpResult<ReplyPacket>>;

/// A VM-originated command frame, handed to whoever subscribed to its code
#[derive(Debug, Clone)]
pub struct EventPacket {
    pub id: u32,
    pub code: u16,
    pub data: Vec<u8>,
}

/// Routing registration submitted by request-issuing tasks
pub(crate) enum Binding {
    Reply {
        id: u32,
        tx: ReplySender,
    },
    Event {
        code: u16,
        tx: mpsc::UnboundedSender<EventPacket>,
    },
}

#[derive(Default)]
struct Routes {
    replies: HashMap<u32, ReplySender>,
    events: HashMap<u16, mpsc::UnboundedSender<EventPacket>>,
}

impl Routes {
    fn bind(&mut self, binding: Binding) {
        match binding {
            Binding::Reply { id, tx } => {
                self.replies.insert(id, tx);
            }
            Binding::Event { code, tx } => {
                debug!("Bound event channel for code {:#06x}", code);
                self.events.insert(code, tx);
            }
        }
    }

    fn drain(&mut self, bindings: &mut mpsc::UnboundedReceiver<Binding>) {
        while let Ok(binding) = bindings.try_recv() {
            self.bind(binding);
        }
    }

    fn route(&mut self, packet: RawPacket) {
        let RawPacket { header, payload } = packet;

        if header.is_reply() {
            debug!("Received reply id={} code={}", header.id, header.code);

            match self.replies.remove(&header.id) {
                Some(tx) => {
                    let reply = ReplyPacket {
                        id: header.id,
                        error_code: header.code,
                        data: payload,
                    };
                    // The requester may have timed out and gone away
                    if tx.send(Ok(reply)).is_err() {
                        debug!("Late reply id={} dropped", header.id);
                    }
                }
                None => warn!("Received reply for unknown command id={}", header.id),
            }
        } else {
            debug!(
                "Received command packet id={} code={:#06x}, len={}",
                header.id,
                header.code,
                payload.len()
            );

            let Some(tx) = self.events.get(&header.code) else {
                return;
            };

            let event = EventPacket {
                id: header.id,
                code: header.code,
                data: payload,
            };
            if tx.send(event).is_err() {
                warn!(
                    "Event receiver for code {:#06x} dropped, future events will be discarded",
                    header.code
                );
                self.events.remove(&header.code);
            }
        }
    }

    fn fail_all(&mut self) {
        for (id, tx) in self.replies.drain() {
            debug!("Releasing waiter id={} with end of stream", id);
            tx.send(Err(JdwpError::EndOfStream)).ok();
        }
        self.events.clear();
    }
}

/// Main reader task: runs until the stream ends, a frame is malformed or
/// the write side signals `shutdown`
pub(crate) async fn reader_loop<R>(
    mut frames: FrameReader<R>,
    mut bindings: mpsc::UnboundedReceiver<Binding>,
    state: watch::Sender<ConnectionState>,
    shutdown: Arc<Notify>,
) where
    R: AsyncRead + Unpin,
{
    info!("Reader loop started");

    let mut routes = Routes::default();

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.notified() => {
                warn!("Write side failed, closing connection");
                break;
            }
            read = frames.read_packet() => read,
        };

        let packet = match read {
            Ok(packet) => packet,
            Err(JdwpError::EndOfStream) => {
                info!("JDWP stream ended");
                break;
            }
            Err(e) => {
                error!("Failed to read packet: {}", e);
                break;
            }
        };

        // Apply bindings first so a reply can never outrun its registration
        routes.drain(&mut bindings);
        routes.route(packet);
    }

    // Refuse new bindings, then release everyone still waiting
    bindings.close();
    routes.drain(&mut bindings);
    routes.fail_all();
    state.send_replace(ConnectionState::Closed);

    info!("Reader loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketHeader, REPLY_FLAG};

    fn packet(id: u32, flags: u8, code: u16, payload: &[u8]) -> RawPacket {
        RawPacket {
            header: PacketHeader {
                length: payload.len() as u32,
                id,
                flags,
                code,
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_reply_goes_only_to_its_requester() {
        let mut routes = Routes::default();
        let (tx3, mut rx3) = oneshot::channel();
        let (tx5, mut rx5) = oneshot::channel();
        routes.bind(Binding::Reply { id: 3, tx: tx3 });
        routes.bind(Binding::Reply { id: 5, tx: tx5 });

        routes.route(packet(5, REPLY_FLAG, 0, &[9]));

        let reply = rx5.try_recv().unwrap().unwrap();
        assert_eq!(reply.id, 5);
        assert_eq!(reply.data, vec![9]);
        assert!(rx3.try_recv().is_err());
        assert!(routes.replies.contains_key(&3));
    }

    #[test]
    fn test_events_without_channel_are_dropped() {
        let mut routes = Routes::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        routes.bind(Binding::Event { code: 0x4064, tx });

        routes.route(packet(77, 0, 0x1234, &[1]));
        assert!(rx.try_recv().is_err());

        routes.route(packet(78, 0, 0x4064, &[2]));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.id, 78);
        assert_eq!(event.data, vec![2]);
    }

    #[test]
    fn test_fail_all_releases_waiters() {
        let mut routes = Routes::default();
        let (tx, mut rx) = oneshot::channel();
        routes.bind(Binding::Reply { id: 7, tx });

        routes.fail_all();
        assert!(matches!(rx.try_recv(), Ok(Err(JdwpError::EndOfStream))));
    }
}
