// JDWP protocol definitions and packet handling
//
// Reference: https://docs.oracle.com/javase/8/docs/platform/jpda/jdwp/jdwp-protocol.html

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

// JDWP uses big-endian (network byte order) for all multi-byte values

pub type JdwpResult<T> = Result<T, JdwpError>;

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("End of stream")]
    EndOfStream,

    #[error("Invalid handshake, received message did not match")]
    InvalidHandshake,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request failed, JDWP error code {code}: {name}")]
    Request { code: u16, name: &'static str },

    #[error("No response within the request timeout")]
    NoResponse,

    #[error("Unsupported value type tag: {0:#04x}")]
    UnsupportedType(u8),

    #[error("Value cannot be encoded with type tag {0:#04x}")]
    ValueMismatch(u8),

    #[error("Unsupported event kind: {0}")]
    UnsupportedEvent(u8),

    #[error("Location is abstract or native and cannot be hooked")]
    NotHookable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index {index} out of bounds for array of length {length}")]
    IndexOutOfBounds { index: i64, length: i32 },

    #[error("Session closed")]
    SessionClosed,

    #[error("Attribute '{0}' is still being loaded")]
    Loading(&'static str),
}

impl JdwpError {
    /// Build a request error from a non-zero reply code
    pub fn request(code: u16) -> Self {
        JdwpError::Request {
            code,
            name: error_name(code),
        }
    }

    /// Whether this error ends the session (transport/protocol failures)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JdwpError::Io(_)
                | JdwpError::EndOfStream
                | JdwpError::InvalidHandshake
                | JdwpError::Protocol(_)
        )
    }
}

// JDWP handshake string
pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

// Packet structure:
// length (4 bytes) - includes header
// id (4 bytes)
// flags (1 byte) - 0x00 = command, 0x80 = reply
// [Command packet: command set (1 byte) + command (1 byte)]
// [Reply packet: error code (2 bytes)]
// data (variable)

pub const HEADER_SIZE: usize = 11;
pub const REPLY_FLAG: u8 = 0x80;

/// Decoded frame preamble. `length` is the payload length, header excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u32,
    pub id: u32,
    pub flags: u8,
    /// command set + command for requests, error code for replies
    pub code: u16,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut out = &mut buf[..];
        out.put_u32(self.length + HEADER_SIZE as u32);
        out.put_u32(self.id);
        out.put_u8(self.flags);
        out.put_u16(self.code);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> JdwpResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(JdwpError::Protocol("Packet header too short".to_string()));
        }

        let length = buf.get_u32();
        let id = buf.get_u32();
        let flags = buf.get_u8();
        let code = buf.get_u16();

        if (length as usize) < HEADER_SIZE {
            return Err(JdwpError::Protocol(format!(
                "Invalid packet length: {}",
                length
            )));
        }

        Ok(Self {
            length: length - HEADER_SIZE as u32,
            id,
            flags,
            code,
        })
    }

    pub fn is_reply(&self) -> bool {
        self.flags & REPLY_FLAG != 0
    }
}

#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub id: u32,
    pub code: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReplyPacket {
    pub id: u32,
    pub error_code: u16,
    pub data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(id: u32, code: u16, data: Vec<u8>) -> Self {
        Self { id, code, data }
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            length: self.data.len() as u32,
            id: self.id,
            flags: 0x00,
            code: self.code,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.data);
        buf.to_vec()
    }
}

impl ReplyPacket {
    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }

    pub fn check_error(&self) -> JdwpResult<()> {
        if self.is_error() {
            Err(JdwpError::request(self.error_code))
        } else {
            Ok(())
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Symbolic name of a JDWP error code
pub fn error_name(code: u16) -> &'static str {
    match code {
        0 => "NONE",
        10 => "INVALID_THREAD",
        11 => "INVALID_THREAD_GROUP",
        12 => "INVALID_PRIORITY",
        13 => "THREAD_NOT_SUSPENDED",
        14 => "THREAD_SUSPENDED",
        20 => "INVALID_OBJECT",
        21 => "INVALID_CLASS",
        22 => "CLASS_NOT_PREPARED",
        23 => "INVALID_METHODID",
        24 => "INVALID_LOCATION",
        25 => "INVALID_FIELDID",
        30 => "INVALID_FRAMEID",
        31 => "NO_MORE_FRAMES",
        32 => "OPAQUE_FRAME",
        33 => "NOT_CURRENT_FRAME",
        34 => "TYPE_MISMATCH",
        35 => "INVALID_SLOT",
        40 => "DUPLICATE",
        41 => "NOT_FOUND",
        50 => "INVALID_MONITOR",
        51 => "NOT_MONITOR_OWNER",
        52 => "INTERRUPT",
        60 => "INVALID_CLASS_FORMAT",
        61 => "CIRCULAR_CLASS_DEFINITION",
        62 => "FAILS_VERIFICATION",
        63 => "ADD_METHOD_NOT_IMPLEMENTED",
        64 => "SCHEMA_CHANGE_NOT_IMPLEMENTED",
        65 => "INVALID_TYPESTATE",
        66 => "HIERARCHY_CHANGE_NOT_IMPLEMENTED",
        67 => "DELETE_METHOD_NOT_IMPLEMENTED",
        68 => "UNSUPPORTED_VERSION",
        69 => "NAMES_DONT_MATCH",
        70 => "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        71 => "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        99 => "NOT_IMPLEMENTED",
        100 => "NULL_POINTER",
        101 => "ABSENT_INFORMATION",
        102 => "INVALID_EVENT_TYPE",
        103 => "ILLEGAL_ARGUMENT",
        110 => "OUT_OF_MEMORY",
        111 => "ACCESS_DENIED",
        112 => "VM_DEAD",
        113 => "INTERNAL",
        115 => "UNATTACHED_THREAD",
        500 => "INVALID_TAG",
        502 => "ALREADY_INVOKING",
        503 => "INVALID_INDEX",
        504 => "INVALID_LENGTH",
        506 => "INVALID_STRING",
        507 => "INVALID_CLASS_LOADER",
        508 => "INVALID_ARRAY",
        509 => "TRANSPORT_LOAD",
        510 => "TRANSPORT_INIT",
        511 => "NATIVE_METHOD",
        512 => "INVALID_COUNT",
        _ => "UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_packet_encode() {
        let packet = CommandPacket::new(3, 0x0104, Vec::new());
        let encoded = packet.encode();

        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(&encoded[0..4], &[0, 0, 0, 11]); // length includes header
        assert_eq!(&encoded[4..8], &[0, 0, 0, 3]);
        assert_eq!(encoded[8], 0x00);
        assert_eq!(&encoded[9..11], &[0x01, 0x04]);
    }

    #[test]
    fn test_big_endian_encoding() {
        let packet = CommandPacket::new(0x12345678, 0x0101, vec![1, 2, 3]);
        let encoded = packet.encode();

        assert_eq!(&encoded[0..4], &[0, 0, 0, 14]);
        assert_eq!(&encoded[4..8], &[0x12, 0x34, 0x56, 0x78]);
        assert_ne!(&encoded[4..8], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(&encoded[11..], &[1, 2, 3]);
    }

    #[test]
    fn test_header_decode_strips_preamble_length() {
        let raw = [
            0, 0, 0, 20, // length = 20 on the wire
            0, 0, 0, 1, // id = 1
            0x80, // reply flag
            0, 0, // error code
        ];

        let header = PacketHeader::decode(&raw).unwrap();
        assert_eq!(header.length, 9);
        assert_eq!(header.id, 1);
        assert!(header.is_reply());
        assert_eq!(header.code, 0);
    }

    #[test]
    fn test_header_decode_rejects_short_length() {
        let raw = [0, 0, 0, 5, 0, 0, 0, 1, 0, 0x40, 0x64];
        assert!(matches!(
            PacketHeader::decode(&raw),
            Err(JdwpError::Protocol(_))
        ));
    }

    #[test]
    fn test_reply_error_maps_to_request_error() {
        let reply = ReplyPacket {
            id: 5,
            error_code: 10,
            data: Vec::new(),
        };

        match reply.check_error() {
            Err(JdwpError::Request { code, name }) => {
                assert_eq!(code, 10);
                assert_eq!(name, "INVALID_THREAD");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!JdwpError::request(10).is_fatal());
        assert!(JdwpError::EndOfStream.is_fatal());
    }
}
