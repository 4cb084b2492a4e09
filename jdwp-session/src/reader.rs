// Helpers for reading JDWP data types from reply and event payloads

use crate::protocol::{JdwpError, JdwpResult};
use crate::types::IdSizes;
use bytes::Buf;

/// Cursor over a payload, aware of the negotiated identifier widths
pub struct PacketReader<'a> {
    buf: &'a [u8],
    sizes: IdSizes,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8], sizes: IdSizes) -> Self {
        Self { buf, sizes }
    }

    pub fn sizes(&self) -> IdSizes {
        self.sizes
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn require(&self, n: usize, what: &str) -> JdwpResult<()> {
        if self.buf.remaining() < n {
            return Err(JdwpError::Protocol(format!(
                "Not enough data for {}: expected {}, got {}",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> JdwpResult<u8> {
        self.require(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> JdwpResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i8(&mut self) -> JdwpResult<i8> {
        self.require(1, "i8")?;
        Ok(self.buf.get_i8())
    }

    pub fn read_u16(&mut self) -> JdwpResult<u16> {
        self.require(2, "u16")?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i16(&mut self) -> JdwpResult<i16> {
        self.require(2, "i16")?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> JdwpResult<i32> {
        self.require(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u32(&mut self) -> JdwpResult<u32> {
        self.require(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i64(&mut self) -> JdwpResult<i64> {
        self.require(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_u64(&mut self) -> JdwpResult<u64> {
        self.require(8, "u64")?;
        Ok(self.buf.get_u64())
    }

    pub fn read_f32(&mut self) -> JdwpResult<f32> {
        self.require(4, "f32")?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> JdwpResult<f64> {
        self.require(8, "f64")?;
        Ok(self.buf.get_f64())
    }

    /// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
    pub fn read_string(&mut self) -> JdwpResult<String> {
        let len = self.read_u32()? as usize;
        self.require(len, "string")?;

        let bytes = &self.buf[..len];
        self.buf.advance(len);

        String::from_utf8(bytes.to_vec())
            .map_err(|e| JdwpError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
    }

    /// Read a count prefix, rejecting negative values
    pub fn read_count(&mut self) -> JdwpResult<usize> {
        let count = self.read_i32()?;
        usize::try_from(count)
            .map_err(|_| JdwpError::Protocol(format!("Negative element count: {}", count)))
    }

    /// Read an identifier of the given width
    pub fn read_id(&mut self, width: usize) -> JdwpResult<u64> {
        self.require(width, "identifier")?;
        Ok(self.buf.get_uint(width))
    }

    pub fn read_object_id(&mut self) -> JdwpResult<u64> {
        self.read_id(self.sizes.object_id)
    }

    pub fn read_reference_type_id(&mut self) -> JdwpResult<u64> {
        self.read_id(self.sizes.reference_type_id)
    }

    pub fn read_method_id(&mut self) -> JdwpResult<u64> {
        self.read_id(self.sizes.method_id)
    }

    pub fn read_field_id(&mut self) -> JdwpResult<u64> {
        self.read_id(self.sizes.field_id)
    }

    pub fn read_frame_id(&mut self) -> JdwpResult<u64> {
        self.read_id(self.sizes.frame_id)
    }
}
