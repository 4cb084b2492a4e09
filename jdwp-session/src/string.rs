// String references

use crate::commands::{command, command_sets, string_reference_commands};
use crate::object::Object;
use crate::protocol::JdwpResult;
use crate::session::{upgrade, SessionInner};
use crate::types::ObjectId;
use std::fmt;
use std::ops::Deref;
use std::sync::Weak;

pub struct StringRef {
    object: Object,
}

impl fmt::Debug for StringRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringRef")
            .field("id", &format_args!("{:#x}", self.object.id()))
            .finish()
    }
}

impl Deref for StringRef {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl StringRef {
    pub(crate) fn new(session: Weak<SessionInner>, id: ObjectId) -> Self {
        Self {
            object: Object::new(session, id),
        }
    }

    /// Contents of the string (StringReference.Value)
    pub async fn data(&self) -> JdwpResult<String> {
        let session = upgrade(&self.object.session)?;
        let mut w = session.writer();
        w.put_object_id(self.id());

        let reply = session
            .request(
                command(command_sets::STRING_REFERENCE, string_reference_commands::VALUE),
                w.into_vec(),
            )
            .await?;
        session.reader(reply.data()).read_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{answer, test_session};
    use crate::writer::PacketWriter;

    #[tokio::test]
    async fn test_data_reads_value() {
        let (session, mut vm) = test_session(4).await;
        let string = session.inner().string(0x70);

        let pending = tokio::spawn({
            let string = string.clone();
            async move { string.data().await }
        });

        let mut w = PacketWriter::new(session.id_sizes());
        w.put_string("héllo");
        let (code, sent) = answer(&mut vm, &w.into_vec()).await;
        assert_eq!(code, 0x0A01);
        assert_eq!(sent, vec![0, 0, 0, 0x70]);

        assert_eq!(pending.await.unwrap().unwrap(), "héllo");
    }
}
