// Wire transport
//
// Byte-exact framing over any async byte stream. No retries: every failure
// here is treated by the connection as the end of the session.

use crate::commands::{command, command_sets, vm_commands};
use crate::protocol::{
    CommandPacket, JdwpError, JdwpResult, PacketHeader, HEADER_SIZE, JDWP_HANDSHAKE,
};
use crate::reader::PacketReader;
use crate::types::IdSizes;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Request id used for the setup-time IDSizes exchange
pub const ID_SIZES_REQUEST_ID: u32 = 1;

/// Payload length of a well-formed IDSizes reply (five 4-byte widths)
const ID_SIZES_REPLY_LEN: u32 = 20;

/// One inbound frame: decoded preamble plus raw payload
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

pub struct FrameReader<R> {
    reader: R,
    max_packet_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_packet_size: usize) -> Self {
        Self {
            reader,
            max_packet_size,
        }
    }

    /// Read exactly `n` bytes; a short read is `EndOfStream`
    pub async fn read_exact(&mut self, n: usize) -> JdwpResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        if n == 0 {
            return Ok(buf);
        }

        match self.reader.read_exact(&mut buf).await {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(JdwpError::EndOfStream),
            Err(e) => Err(JdwpError::Io(e)),
        }
    }

    pub async fn read_header(&mut self) -> JdwpResult<PacketHeader> {
        let raw = self.read_exact(HEADER_SIZE).await?;
        let header = PacketHeader::decode(&raw)?;

        if header.length as usize > self.max_packet_size {
            return Err(JdwpError::Protocol(format!(
                "Packet too large: {} bytes (max: {} bytes)",
                header.length, self.max_packet_size
            )));
        }

        Ok(header)
    }

    /// Read one header and the payload it declares
    pub async fn read_packet(&mut self) -> JdwpResult<RawPacket> {
        let header = self.read_header().await?;
        let payload = self.read_exact(header.length as usize).await?;
        Ok(RawPacket { header, payload })
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write every byte or fail with a transport error
    pub async fn write_all(&mut self, bytes: &[u8]) -> JdwpResult<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_packet(&mut self, packet: &CommandPacket) -> JdwpResult<()> {
        self.write_all(&packet.encode()).await
    }
}

/// Exchange the handshake magic in both directions
pub async fn handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> JdwpResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    debug!("Performing JDWP handshake");

    writer.write_all(JDWP_HANDSHAKE).await?;

    let buf = reader.read_exact(JDWP_HANDSHAKE.len()).await?;
    if buf != JDWP_HANDSHAKE {
        warn!("Invalid handshake response: {:?}", String::from_utf8_lossy(&buf));
        return Err(JdwpError::InvalidHandshake);
    }

    info!("JDWP handshake successful");
    Ok(())
}

/// Ask the VM for its identifier widths; must precede any other request
pub async fn negotiate_id_sizes<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> JdwpResult<IdSizes>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = CommandPacket::new(
        ID_SIZES_REQUEST_ID,
        command(command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES),
        Vec::new(),
    );
    writer.write_packet(&request).await?;

    let header = reader.read_header().await?;
    if !header.is_reply() {
        return Err(JdwpError::Protocol(
            "Expected first server message to be a response".to_string(),
        ));
    }
    if header.id != ID_SIZES_REQUEST_ID {
        return Err(JdwpError::Protocol(format!(
            "Expected first server message to be {}, got {}",
            ID_SIZES_REQUEST_ID, header.id
        )));
    }
    if header.code != 0 {
        return Err(JdwpError::request(header.code));
    }
    if header.length != ID_SIZES_REPLY_LEN {
        return Err(JdwpError::Protocol(format!(
            "Expected size of an id-sizes response, got {} bytes",
            header.length
        )));
    }

    let payload = reader.read_exact(header.length as usize).await?;
    let mut data = PacketReader::new(&payload, IdSizes::default());
    let sizes = IdSizes::new(
        data.read_i32()?,
        data.read_i32()?,
        data.read_i32()?,
        data.read_i32()?,
        data.read_i32()?,
    )?;

    info!("Negotiated identifier sizes: {:?}", sizes);
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REPLY_FLAG;

    fn id_sizes_reply(id: u32, widths: [i32; 5]) -> Vec<u8> {
        let header = PacketHeader {
            length: ID_SIZES_REPLY_LEN,
            id,
            flags: REPLY_FLAG,
            code: 0,
        };
        let mut out = header.encode().to_vec();
        for w in widths {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    #[tokio::test]
    async fn test_short_read_is_end_of_stream() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(&[0, 0, 0]).await.unwrap();
        drop(server);

        let mut reader = FrameReader::new(client, 1024);
        assert!(matches!(
            reader.read_exact(4).await,
            Err(JdwpError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_handshake_mismatch() {
        let (client, mut server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(client);
        let mut reader = FrameReader::new(r, 1024);
        let mut writer = FrameWriter::new(w);

        server.write_all(b"JDWP-Handshakf").await.unwrap();
        let result = handshake(&mut reader, &mut writer).await;
        assert!(matches!(result, Err(JdwpError::InvalidHandshake)));
    }

    #[tokio::test]
    async fn test_id_size_negotiation() {
        let (client, mut server) = tokio::io::duplex(256);
        let (r, w) = tokio::io::split(client);
        let mut reader = FrameReader::new(r, 1024);
        let mut writer = FrameWriter::new(w);

        server
            .write_all(&id_sizes_reply(1, [4, 4, 8, 8, 8]))
            .await
            .unwrap();
        let sizes = negotiate_id_sizes(&mut reader, &mut writer).await.unwrap();
        assert_eq!(sizes.field_id, 4);
        assert_eq!(sizes.object_id, 8);

        let mut request = [0u8; HEADER_SIZE];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0, 0, 0, 11, 0, 0, 0, 1, 0, 1, 7]);
    }

    #[tokio::test]
    async fn test_id_size_reply_with_wrong_id() {
        let (client, mut server) = tokio::io::duplex(256);
        let (r, w) = tokio::io::split(client);
        let mut reader = FrameReader::new(r, 1024);
        let mut writer = FrameWriter::new(w);

        server
            .write_all(&id_sizes_reply(9, [4, 4, 8, 8, 8]))
            .await
            .unwrap();
        assert!(matches!(
            negotiate_id_sizes(&mut reader, &mut writer).await,
            Err(JdwpError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_packet_rejected() {
        let (client, mut server) = tokio::io::duplex(64);
        let header = PacketHeader {
            length: 4096,
            id: 3,
            flags: REPLY_FLAG,
            code: 0,
        };
        server.write_all(&header.encode()).await.unwrap();

        let mut reader = FrameReader::new(client, 1024);
        assert!(matches!(
            reader.read_packet().await,
            Err(JdwpError::Protocol(_))
        ));
    }
}
