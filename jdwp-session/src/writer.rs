// Helpers for packing JDWP request bodies

use crate::types::IdSizes;
use bytes::{BufMut, BytesMut};

/// Request body builder using the negotiated identifier widths
pub struct PacketWriter {
    buf: BytesMut,
    sizes: IdSizes,
}

impl PacketWriter {
    pub fn new(sizes: IdSizes) -> Self {
        Self {
            buf: BytesMut::new(),
            sizes,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_i8(&mut self, v: i8) -> &mut Self {
        self.buf.put_i8(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16(v);
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64(v);
        self
    }

    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32(v);
        self
    }

    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.buf.put_f64(v);
        self
    }

    /// Write a JDWP string (4-byte length prefix + UTF-8 bytes)
    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.buf.put_u32(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
        self
    }

    /// Write the low `width` bytes of an identifier
    pub fn put_id(&mut self, id: u64, width: usize) -> &mut Self {
        self.buf.put_uint(id, width);
        self
    }

    pub fn put_object_id(&mut self, id: u64) -> &mut Self {
        self.put_id(id, self.sizes.object_id)
    }

    pub fn put_reference_type_id(&mut self, id: u64) -> &mut Self {
        self.put_id(id, self.sizes.reference_type_id)
    }

    pub fn put_method_id(&mut self, id: u64) -> &mut Self {
        self.put_id(id, self.sizes.method_id)
    }

    pub fn put_field_id(&mut self, id: u64) -> &mut Self {
        self.put_id(id, self.sizes.field_id)
    }

    pub fn put_frame_id(&mut self, id: u64) -> &mut Self {
        self.put_id(id, self.sizes.frame_id)
    }
}
