// Tagged value codec
//
// Values travel as a one-byte type tag followed by a fixed-width payload.
// Decoding dispatches through a 256-entry table keyed by tag; reference tags
// resolve their object id through the session's identity pool. Encoding is
// only defined for primitive tags.

use crate::array::Array;
use crate::object::Object;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::PacketReader;
use crate::session::SessionInner;
use crate::string::StringRef;
use crate::thread::Thread;
use crate::types::tags;
use crate::writer::PacketWriter;
use std::fmt;
use std::sync::Arc;

/// A value read from or written to the target VM
#[derive(Debug, Clone)]
pub enum Value {
    Byte(i8),
    Char(u16),
    Float(f32),
    Double(f64),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Void,
    /// A zero object id, kept with the tag it arrived under
    Null(u8),
    Object(Arc<Object>),
    Array(Arc<Array>),
    String(Arc<StringRef>),
    Thread(Arc<Thread>),
}

impl Value {
    /// Wire tag this value is encoded or was decoded with
    pub fn tag(&self) -> u8 {
        match self {
            Value::Byte(_) => tags::BYTE,
            Value::Char(_) => tags::CHAR,
            Value::Float(_) => tags::FLOAT,
            Value::Double(_) => tags::DOUBLE,
            Value::Int(_) => tags::INT,
            Value::Long(_) => tags::LONG,
            Value::Short(_) => tags::SHORT,
            Value::Boolean(_) => tags::BOOLEAN,
            Value::Void => tags::VOID,
            Value::Null(tag) => *tag,
            Value::Object(_) => tags::OBJECT,
            Value::Array(_) => tags::ARRAY,
            Value::String(_) => tags::STRING,
            Value::Thread(_) => tags::THREAD,
        }
    }

    pub fn is_primitive(&self) -> bool {
        tags::is_primitive(self.tag())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Object id for reference values, `0` for null
    pub fn object_id(&self) -> Option<u64> {
        match self {
            Value::Null(_) => Some(0),
            Value::Object(o) => Some(o.id()),
            Value::Array(a) => Some(a.id()),
            Value::String(s) => Some(s.id()),
            Value::Thread(t) => Some(t.id()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::Null(a), Value::Null(b)) => a == b,
            // References compare by pooled identity
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Arc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{}'", c),
                None => write!(f, "'\\u{:04x}'", v),
            },
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Void => write!(f, "void"),
            Value::Null(_) => write!(f, "null"),
            Value::Object(o) => write!(f, "<obj {:#x}>", o.id()),
            Value::Array(a) => write!(f, "<array {:#x}>", a.id()),
            Value::String(s) => write!(f, "<string {:#x}>", s.id()),
            Value::Thread(t) => write!(f, "<thread {:#x}>", t.id()),
        }
    }
}

type DecodeFn = fn(u8, &mut PacketReader<'_>, &Arc<SessionInner>) -> JdwpResult<Value>;
type EncodeFn = fn(u8, &Value, &mut PacketWriter) -> JdwpResult<()>;

static DECODERS: [Option<DecodeFn>; 256] = decoders();
static ENCODERS: [Option<EncodeFn>; 256] = encoders();

const fn decoders() -> [Option<DecodeFn>; 256] {
    let mut table: [Option<DecodeFn>; 256] = [None; 256];
    table[tags::BYTE as usize] = Some(decode_byte);
    table[tags::CHAR as usize] = Some(decode_char);
    table[tags::FLOAT as usize] = Some(decode_float);
    table[tags::DOUBLE as usize] = Some(decode_double);
    table[tags::INT as usize] = Some(decode_int);
    table[tags::LONG as usize] = Some(decode_long);
    table[tags::SHORT as usize] = Some(decode_short);
    table[tags::BOOLEAN as usize] = Some(decode_boolean);
    table[tags::VOID as usize] = Some(decode_void);
    table[tags::OBJECT as usize] = Some(decode_object);
    table[tags::THREAD_GROUP as usize] = Some(decode_object);
    table[tags::CLASS_LOADER as usize] = Some(decode_object);
    table[tags::CLASS_OBJECT as usize] = Some(decode_object);
    table[tags::THREAD as usize] = Some(decode_thread);
    table[tags::STRING as usize] = Some(decode_string);
    table[tags::ARRAY as usize] = Some(decode_array);
    table
}

const fn encoders() -> [Option<EncodeFn>; 256] {
    let mut table: [Option<EncodeFn>; 256] = [None; 256];
    table[tags::BYTE as usize] = Some(encode_byte);
    table[tags::CHAR as usize] = Some(encode_char);
    table[tags::FLOAT as usize] = Some(encode_float);
    table[tags::DOUBLE as usize] = Some(encode_double);
    table[tags::INT as usize] = Some(encode_int);
    table[tags::LONG as usize] = Some(encode_long);
    table[tags::SHORT as usize] = Some(encode_short);
    table[tags::BOOLEAN as usize] = Some(encode_boolean);
    table[tags::VOID as usize] = Some(encode_void);
    table
}

/// Read a tag byte, then the value it announces
pub(crate) fn decode_tagged(
    reader: &mut PacketReader<'_>,
    session: &Arc<SessionInner>,
) -> JdwpResult<Value> {
    let tag = reader.read_u8()?;
    decode_untagged(tag, reader, session)
}

/// Read a value whose tag is known from context (primitive array elements)
pub(crate) fn decode_untagged(
    tag: u8,
    reader: &mut PacketReader<'_>,
    session: &Arc<SessionInner>,
) -> JdwpResult<Value> {
    match DECODERS[tag as usize] {
        Some(decode) => decode(tag, reader, session),
        None => Err(JdwpError::UnsupportedType(tag)),
    }
}

/// Encode a primitive `value` under `tag`, optionally preceded by the tag
pub fn encode_value(
    writer: &mut PacketWriter,
    tag: u8,
    value: &Value,
    tagged: bool,
) -> JdwpResult<()> {
    let encode = ENCODERS[tag as usize].ok_or(JdwpError::UnsupportedType(tag))?;
    if tagged {
        writer.put_u8(tag);
    }
    encode(tag, value, writer)
}

fn decode_byte(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Byte(r.read_i8()?))
}

fn decode_char(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Char(r.read_u16()?))
}

fn decode_float(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Float(r.read_f32()?))
}

fn decode_double(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Double(r.read_f64()?))
}

fn decode_int(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Int(r.read_i32()?))
}

fn decode_long(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Long(r.read_i64()?))
}

fn decode_short(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Short(r.read_i16()?))
}

fn decode_boolean(_: u8, r: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Boolean(r.read_bool()?))
}

fn decode_void(_: u8, _: &mut PacketReader<'_>, _: &Arc<SessionInner>) -> JdwpResult<Value> {
    Ok(Value::Void)
}

fn decode_object(tag: u8, r: &mut PacketReader<'_>, s: &Arc<SessionInner>) -> JdwpResult<Value> {
    match r.read_object_id()? {
        0 => Ok(Value::Null(tag)),
        id => Ok(Value::Object(s.object(id))),
    }
}

fn decode_thread(tag: u8, r: &mut PacketReader<'_>, s: &Arc<SessionInner>) -> JdwpResult<Value> {
    match r.read_object_id()? {
        0 => Ok(Value::Null(tag)),
        id => Ok(Value::Thread(s.thread(id))),
    }
}

fn decode_string(tag: u8, r: &mut PacketReader<'_>, s: &Arc<SessionInner>) -> JdwpResult<Value> {
    match r.read_object_id()? {
        0 => Ok(Value::Null(tag)),
        id => Ok(Value::String(s.string(id))),
    }
}

fn decode_array(tag: u8, r: &mut PacketReader<'_>, s: &Arc<SessionInner>) -> JdwpResult<Value> {
    match r.read_object_id()? {
        0 => Ok(Value::Null(tag)),
        id => Ok(Value::Array(s.array(id))),
    }
}

fn encode_byte(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Byte(b) => {
            w.put_i8(*b);
            Ok(())
        }
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

fn encode_char(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Char(c) => {
            w.put_u16(*c);
            Ok(())
        }
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

fn encode_float(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Float(x) => {
            w.put_f32(*x);
            Ok(())
        }
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

fn encode_double(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Double(x) => {
            w.put_f64(*x);
            Ok(())
        }
        Value::Float(x) => {
            w.put_f64(f64::from(*x));
            Ok(())
        }
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

fn encode_int(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    let n = match v {
        Value::Int(n) => *n,
        Value::Short(n) => i32::from(*n),
        Value::Byte(n) => i32::from(*n),
        Value::Char(n) => i32::from(*n),
        _ => return Err(JdwpError::ValueMismatch(tag)),
    };
    w.put_i32(n);
    Ok(())
}

fn encode_long(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    let n = match v {
        Value::Long(n) => *n,
        Value::Int(n) => i64::from(*n),
        Value::Short(n) => i64::from(*n),
        Value::Byte(n) => i64::from(*n),
        _ => return Err(JdwpError::ValueMismatch(tag)),
    };
    w.put_i64(n);
    Ok(())
}

fn encode_short(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    let n = match v {
        Value::Short(n) => *n,
        Value::Byte(n) => i16::from(*n),
        _ => return Err(JdwpError::ValueMismatch(tag)),
    };
    w.put_i16(n);
    Ok(())
}

fn encode_boolean(tag: u8, v: &Value, w: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Boolean(b) => {
            w.put_u8(u8::from(*b));
            Ok(())
        }
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

fn encode_void(tag: u8, v: &Value, _: &mut PacketWriter) -> JdwpResult<()> {
    match v {
        Value::Void => Ok(()),
        _ => Err(JdwpError::ValueMismatch(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::test_session;
    use crate::types::IdSizes;

    #[tokio::test]
    async fn test_primitive_round_trip() {
        let (session, _vm) = test_session(8).await;
        let inner = session.inner();

        let samples = [
            Value::Byte(-7),
            Value::Char(0x263A),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::Int(i32::MIN),
            Value::Long(0x0123_4567_89AB_CDEF),
            Value::Short(-300),
            Value::Boolean(true),
            Value::Void,
        ];

        for value in samples {
            let mut writer = PacketWriter::new(IdSizes::default());
            encode_value(&mut writer, value.tag(), &value, true).unwrap();
            let bytes = writer.into_vec();

            let mut reader = PacketReader::new(&bytes, IdSizes::default());
            let decoded = decode_tagged(&mut reader, inner).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[tokio::test]
    async fn test_unknown_tag_is_unsupported() {
        let (session, _vm) = test_session(8).await;
        let data = [b'Q', 0, 0, 0, 0];
        let mut reader = PacketReader::new(&data, IdSizes::default());

        assert!(matches!(
            decode_tagged(&mut reader, session.inner()),
            Err(JdwpError::UnsupportedType(b'Q'))
        ));
    }

    #[tokio::test]
    async fn test_references_resolve_through_pool() {
        let (session, _vm) = test_session(4).await;
        let sizes = session.id_sizes();
        let data = [
            b's', 0, 0, 0, 0x2A, //
            b's', 0, 0, 0, 0x2A, //
            b'[', 0, 0, 0, 0, //
            b't', 0, 0, 0, 0x07,
        ];
        let mut reader = PacketReader::new(&data, sizes);
        let inner = session.inner();

        let first = decode_tagged(&mut reader, inner).unwrap();
        let second = decode_tagged(&mut reader, inner).unwrap();
        let null = decode_tagged(&mut reader, inner).unwrap();
        let thread = decode_tagged(&mut reader, inner).unwrap();

        assert!(matches!(&first, Value::String(s) if s.id() == 0x2A));
        assert_eq!(first, second);
        assert_eq!(null, Value::Null(tags::ARRAY));
        assert!(matches!(thread, Value::Thread(t) if t.id() == 7));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_encoding_rejects_reference_tags() {
        let mut writer = PacketWriter::new(IdSizes::default());
        assert!(matches!(
            encode_value(&mut writer, tags::OBJECT, &Value::Null(tags::OBJECT), true),
            Err(JdwpError::UnsupportedType(tags::OBJECT))
        ));
        assert!(matches!(
            encode_value(&mut writer, tags::BOOLEAN, &Value::Int(1), false),
            Err(JdwpError::ValueMismatch(tags::BOOLEAN))
        ));
    }
}
