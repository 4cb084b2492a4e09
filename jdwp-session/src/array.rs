// Array references
//
// Ranges use the same conventions as list slicing: negative offsets count
// from the end, `-1` meaning "the end of the array", and reversed bounds
// are swapped. Offsets are resolved once against the current length before
// the request goes out.

use crate::commands::{array_reference_commands, command, command_sets};
use crate::object::Object;
use crate::protocol::{JdwpError, JdwpResult};
use crate::session::{upgrade, SessionInner};
use crate::types::{tags, ObjectId};
use crate::value::{decode_tagged, decode_untagged, Value};
use std::fmt;
use std::ops::Deref;
use std::sync::Weak;

pub struct Array {
    object: Object,
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &format_args!("{:#x}", self.object.id()))
            .finish()
    }
}

impl Deref for Array {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

/// Turn `(first, last)` into a `(start, count)` request range
fn resolve_range(first: i64, last: i64, length: i32) -> JdwpResult<(i32, i32)> {
    let len = i64::from(length);
    let absolute = |index: i64| -> JdwpResult<i64> {
        if index > len {
            return Err(JdwpError::IndexOutOfBounds { index, length });
        }
        if index < 0 {
            let resolved = len + index + 1;
            if resolved < 0 {
                return Err(JdwpError::IndexOutOfBounds { index, length });
            }
            return Ok(resolved);
        }
        Ok(index)
    };

    let mut first = absolute(first)?;
    let mut last = absolute(last)?;
    if first > last {
        std::mem::swap(&mut first, &mut last);
    }
    // Both are within [0, length] here
    Ok((first as i32, (last - first) as i32))
}

impl Array {
    pub(crate) fn new(session: Weak<SessionInner>, id: ObjectId) -> Self {
        Self {
            object: Object::new(session, id),
        }
    }

    pub async fn length(&self) -> JdwpResult<i32> {
        let session = upgrade(&self.object.session)?;
        let mut w = session.writer();
        w.put_object_id(self.id());

        let reply = session
            .request(
                command(command_sets::ARRAY_REFERENCE, array_reference_commands::LENGTH),
                w.into_vec(),
            )
            .await?;
        session.reader(reply.data()).read_i32()
    }

    /// Elements in `[first, last)` after resolving negative offsets
    pub async fn slice(&self, first: i64, last: i64) -> JdwpResult<Vec<Value>> {
        let length = self.length().await?;
        let (start, count) = resolve_range(first, last, length)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let session = upgrade(&self.object.session)?;
        let mut w = session.writer();
        w.put_object_id(self.id()).put_i32(start).put_i32(count);

        let reply = session
            .request(
                command(command_sets::ARRAY_REFERENCE, array_reference_commands::GET_VALUES),
                w.into_vec(),
            )
            .await?;

        let mut r = session.reader(reply.data());
        let tag = r.read_u8()?;
        let count = r.read_count()?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            // Object regions carry a tag per element, primitive regions don't
            let value = if tags::is_object(tag) {
                decode_tagged(&mut r, &session)?
            } else {
                decode_untagged(tag, &mut r, &session)?
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Every element of the array
    pub async fn values(&self) -> JdwpResult<Vec<Value>> {
        self.slice(0, -1).await
    }

    /// Single element; negative indices count from the end
    pub async fn get(&self, index: i64) -> JdwpResult<Option<Value>> {
        let values = if index < 0 {
            let Some(before) = index.checked_sub(1) else {
                return Err(JdwpError::IndexOutOfBounds {
                    index,
                    length: self.length().await?,
                });
            };
            self.slice(before, index).await?
        } else {
            let Some(after) = index.checked_add(1) else {
                return Err(JdwpError::IndexOutOfBounds {
                    index,
                    length: self.length().await?,
                });
            };
            self.slice(index, after).await?
        };
        Ok(values.into_iter().next())
    }
}
