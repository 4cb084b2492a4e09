// JDWP connection management
//
// Handles the transport, handshake, identifier negotiation and the
// request/reply correlation on top of the background reader loop.

use crate::config::SessionConfig;
use crate::eventloop::{reader_loop, Binding, EventPacket};
use crate::protocol::{CommandPacket, JdwpError, JdwpResult, ReplyPacket};
use crate::reader::PacketReader;
use crate::transport::{handshake, negotiate_id_sizes, FrameReader, FrameWriter};
use crate::types::IdSizes;
use crate::writer::PacketWriter;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex, Notify};
use tracing::{debug, error, info};

/// First id handed out after the ids used during setup
pub const FIRST_REQUEST_ID: u32 = 3;
pub const REQUEST_ID_STRIDE: u32 = 2;

/// Lifecycle of a connection.
///
/// The handshake and identifier negotiation run inside [`Connection::open`],
/// so a constructed connection starts out `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready,
    Closed,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State guarded by the write-serialization lock
struct Transmit {
    writer: FrameWriter<BoxedWriter>,
    next_id: u32,
}

impl Transmit {
    fn acquire_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(REQUEST_ID_STRIDE);
        id
    }
}

struct Inner {
    transmit: Mutex<Transmit>,
    bindings: mpsc::UnboundedSender<Binding>,
    id_sizes: IdSizes,
    state: watch::Receiver<ConnectionState>,
    shutdown: Arc<Notify>,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id_sizes", &self.inner.id_sizes)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Connect to a JDWP endpoint over TCP
    pub async fn connect_tcp(host: &str, port: u16, config: &SessionConfig) -> JdwpResult<Self> {
        info!("Connecting to JDWP at {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Self::open(stream, config).await
    }

    /// Connect to a forwarded JDWP endpoint exposed as a Unix socket
    #[cfg(unix)]
    pub async fn connect_unix(
        path: impl AsRef<std::path::Path>,
        config: &SessionConfig,
    ) -> JdwpResult<Self> {
        info!("Connecting to JDWP at {}", path.as_ref().display());
        let stream = tokio::net::UnixStream::connect(path).await?;
        Self::open(stream, config).await
    }

    /// Handshake over an established byte stream and start the reader loop
    pub async fn open<S>(stream: S, config: &SessionConfig) -> JdwpResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut frames = FrameReader::new(read_half, config.max_packet_size);
        let mut writer = FrameWriter::new(Box::new(write_half) as BoxedWriter);

        let setup = async {
            handshake(&mut frames, &mut writer).await?;
            negotiate_id_sizes(&mut frames, &mut writer).await
        };
        let id_sizes = tokio::time::timeout(config.handshake_timeout, setup)
            .await
            .map_err(|_| {
                JdwpError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    "JDWP handshake timed out",
                ))
            })??;

        let (bindings_tx, bindings_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let shutdown = Arc::new(Notify::new());
        tokio::spawn(reader_loop(frames, bindings_rx, state_tx, shutdown.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                transmit: Mutex::new(Transmit {
                    writer,
                    next_id: FIRST_REQUEST_ID,
                }),
                bindings: bindings_tx,
                id_sizes,
                state: state_rx,
                shutdown,
            }),
        })
    }

    pub fn id_sizes(&self) -> IdSizes {
        self.inner.id_sizes
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Resolves once the reader loop has exited
    pub async fn closed(&self) {
        let mut state = self.inner.state.clone();
        // An error means the loop dropped its sender, which only happens on exit
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Body builder configured with this connection's identifier widths
    pub fn writer(&self) -> PacketWriter {
        PacketWriter::new(self.inner.id_sizes)
    }

    /// Payload reader configured with this connection's identifier widths
    pub fn reader<'a>(&self, data: &'a [u8]) -> PacketReader<'a> {
        PacketReader::new(data, self.inner.id_sizes)
    }

    /// Send a command and wait for its reply.
    ///
    /// Returns `Ok(None)` when `timeout` elapses first. The registration is
    /// left in place; a late reply is discarded by the reader loop.
    pub async fn request(
        &self,
        code: u16,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> JdwpResult<Option<ReplyPacket>> {
        let (tx, rx) = oneshot::channel();

        {
            let mut transmit = self.inner.transmit.lock().await;
            let id = transmit.acquire_id();
            self.inner
                .bindings
                .send(Binding::Reply { id, tx })
                .map_err(|_| JdwpError::EndOfStream)?;

            debug!("Sending command id={} code={:#06x}", id, code);
            let written = transmit
                .writer
                .write_packet(&CommandPacket::new(id, code, body))
                .await;
            if let Err(e) = written {
                error!("Failed to send command id={}: {}", id, e);
                // A broken write side ends the session for every waiter
                self.inner.shutdown.notify_one();
                return Err(e);
            }
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!("No response to code {:#06x} within {:?}", code, limit);
                    return Ok(None);
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(reply) => reply.map(Some),
            // Sender dropped without an answer: the loop is gone
            Err(_) => Err(JdwpError::EndOfStream),
        }
    }

    /// Route every VM-originated frame carrying `code` to the returned channel
    pub async fn subscribe(&self, code: u16) -> JdwpResult<mpsc::UnboundedReceiver<EventPacket>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let _transmit = self.inner.transmit.lock().await;
        self.inner
            .bindings
            .send(Binding::Event { code, tx })
            .map_err(|_| JdwpError::EndOfStream)?;

        Ok(rx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::{PacketHeader, HEADER_SIZE, JDWP_HANDSHAKE, REPLY_FLAG};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};

    /// Scripted VM side of a duplex pipe
    pub(crate) struct FakeVm {
        pub stream: DuplexStream,
    }

    impl FakeVm {
        /// Answer the handshake and id-sizes exchange
        pub(crate) async fn accept(mut stream: DuplexStream, object_id_size: i32) -> Self {
            let mut magic = [0u8; 14];
            stream.read_exact(&mut magic).await.unwrap();
            assert_eq!(&magic, JDWP_HANDSHAKE);
            stream.write_all(JDWP_HANDSHAKE).await.unwrap();

            let mut vm = Self { stream };
            let (id, code, _) = vm.read_command().await;
            assert_eq!((id, code), (1, 0x0107));

            let mut body = Vec::new();
            for w in [4, 4, object_id_size, 8, 8] {
                body.extend_from_slice(&i32::to_be_bytes(w));
            }
            vm.reply(1, 0, &body).await;
            vm
        }

        pub(crate) async fn read_command(&mut self) -> (u32, u16, Vec<u8>) {
            let mut raw = [0u8; HEADER_SIZE];
            self.stream.read_exact(&mut raw).await.unwrap();
            let header = PacketHeader::decode(&raw).unwrap();
            let mut body = vec![0u8; header.length as usize];
            self.stream.read_exact(&mut body).await.unwrap();
            (header.id, header.code, body)
        }

        pub(crate) async fn reply(&mut self, id: u32, error_code: u16, body: &[u8]) {
            let header = PacketHeader {
                length: body.len() as u32,
                id,
                flags: REPLY_FLAG,
                code: error_code,
            };
            self.stream.write_all(&header.encode()).await.unwrap();
            self.stream.write_all(body).await.unwrap();
        }

        pub(crate) async fn event(&mut self, id: u32, code: u16, body: &[u8]) {
            let header = PacketHeader {
                length: body.len() as u32,
                id,
                flags: 0,
                code,
            };
            self.stream.write_all(&header.encode()).await.unwrap();
            self.stream.write_all(body).await.unwrap();
        }
    }

    pub(crate) async fn connected(object_id_size: i32) -> (Connection, FakeVm) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let vm = tokio::spawn(FakeVm::accept(server, object_id_size));
        let conn = Connection::open(client, &SessionConfig::default())
            .await
            .unwrap();
        (conn, vm.await.unwrap())
    }

    #[tokio::test]
    async fn test_request_ids_start_at_three_with_stride_two() {
        let (conn, mut vm) = connected(8).await;

        let first = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        let (id, code, _) = vm.read_command().await;
        assert_eq!((id, code), (3, 0x0101));
        vm.reply(id, 0, &[1]).await;
        assert_eq!(first.await.unwrap().unwrap().unwrap().data, vec![1]);

        let second = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        let (id, _, _) = vm.read_command().await;
        assert_eq!(id, 5);
        vm.reply(id, 0, &[]).await;
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_replies_reach_the_matching_requester() {
        let (conn, mut vm) = connected(8).await;

        let a = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0B01, vec![0xA], None).await }
        });
        let (id_a, _, body_a) = vm.read_command().await;
        let b = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0B01, vec![0xB], None).await }
        });
        let (id_b, _, body_b) = vm.read_command().await;
        assert_eq!((body_a, body_b), (vec![0xA], vec![0xB]));

        // Answer in reverse order
        vm.reply(id_b, 0, b"b").await;
        vm.reply(id_a, 0, b"a").await;

        let ra = a.await.unwrap().unwrap().unwrap();
        let rb = b.await.unwrap().unwrap().unwrap();
        assert_eq!((ra.id, ra.data), (id_a, b"a".to_vec()));
        assert_eq!((rb.id, rb.data), (id_b, b"b".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_no_response() {
        let (conn, mut vm) = connected(8).await;

        let started = tokio::time::Instant::now();
        let pending = tokio::spawn({
            let conn = conn.clone();
            async move {
                conn.request(0x0101, Vec::new(), Some(Duration::from_secs(1)))
                    .await
            }
        });
        let (silent_id, _, _) = vm.read_command().await;

        let outcome = pending.await.unwrap().unwrap();
        assert!(outcome.is_none());
        assert!(started.elapsed() >= Duration::from_secs(1));

        // The reader loop is still serving, and the late reply is dropped
        vm.reply(silent_id, 0, &[]).await;
        let next = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        let (id, _, _) = vm.read_command().await;
        vm.reply(id, 0, &[42]).await;
        assert_eq!(next.await.unwrap().unwrap().unwrap().data, vec![42]);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_end_of_stream_releases_waiters() {
        let (conn, mut vm) = connected(8).await;

        let pending = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        vm.read_command().await;
        drop(vm);

        assert!(matches!(
            pending.await.unwrap(),
            Err(JdwpError::EndOfStream)
        ));
        conn.closed().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    /// Client stream whose read and write directions are separate pipes
    struct TwoPipes {
        inbound: DuplexStream,
        outbound: DuplexStream,
    }

    impl AsyncRead for TwoPipes {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inbound).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for TwoPipes {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.outbound).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.outbound).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.outbound).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn test_write_failure_closes_connection() {
        let (client_in, mut vm_out) = tokio::io::duplex(64 * 1024);
        let (client_out, vm_in) = tokio::io::duplex(64 * 1024);
        let stream = TwoPipes {
            inbound: client_in,
            outbound: client_out,
        };

        let vm = tokio::spawn(async move {
            let mut vm_in = vm_in;
            let mut magic = [0u8; 14];
            vm_in.read_exact(&mut magic).await.unwrap();
            vm_out.write_all(JDWP_HANDSHAKE).await.unwrap();

            let mut raw = [0u8; HEADER_SIZE];
            vm_in.read_exact(&mut raw).await.unwrap();
            let header = PacketHeader::decode(&raw).unwrap();
            assert_eq!((header.id, header.code, header.length), (1, 0x0107, 0));

            let mut body = Vec::new();
            for w in [4i32, 4, 8, 8, 8] {
                body.extend_from_slice(&w.to_be_bytes());
            }
            let reply = PacketHeader {
                length: body.len() as u32,
                id: 1,
                flags: REPLY_FLAG,
                code: 0,
            };
            vm_out.write_all(&reply.encode()).await.unwrap();
            vm_out.write_all(&body).await.unwrap();
            (vm_in, vm_out)
        });
        let conn = Connection::open(stream, &SessionConfig::default())
            .await
            .unwrap();
        let (mut vm_in, vm_out) = vm.await.unwrap();

        let waiting = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        let mut raw = [0u8; HEADER_SIZE];
        vm_in.read_exact(&mut raw).await.unwrap();

        // The VM stops reading but keeps its sending end open
        drop(vm_in);
        let failed = conn.request(0x0101, Vec::new(), None).await;
        assert!(matches!(failed, Err(JdwpError::Io(_))));

        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            waiting.await.unwrap(),
            Err(JdwpError::EndOfStream)
        ));
        drop(vm_out);
    }

    #[tokio::test]
    async fn test_subscribed_events_are_forwarded() {
        let (conn, mut vm) = connected(8).await;
        let mut events = conn.subscribe(0x4064).await.unwrap();

        // A reply flushes the binding queue ahead of the events below
        let flush = tokio::spawn({
            let conn = conn.clone();
            async move { conn.request(0x0101, Vec::new(), None).await }
        });
        let (id, _, _) = vm.read_command().await;
        vm.reply(id, 0, &[]).await;
        flush.await.unwrap().unwrap();

        vm.event(100, 0x4064, &[1, 2]).await;
        vm.event(101, 0x0F0F, &[3]).await;
        vm.event(102, 0x4064, &[4]).await;

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!((first.id, first.data), (100, vec![1, 2]));
        assert_eq!((second.id, second.data), (102, vec![4]));
    }
}
