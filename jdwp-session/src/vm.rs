// VirtualMachine command set
//
// Whole-VM operations live on `Session`. The loaded-class list and its
// signature index are one deferred group fetched with AllClassesWithGeneric.

use crate::commands::{command, command_sets, vm_commands};
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::PacketReader;
use crate::reftype::Class;
use crate::session::{Session, SessionInner};
use crate::thread::Thread;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// JVM version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

/// Optional features the VM supports.
///
/// The first seven flags come from both the legacy and the new capability
/// commands and are OR'd together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmCapabilities {
    pub can_watch_field_modification: bool,
    pub can_watch_field_access: bool,
    pub can_get_bytecodes: bool,
    pub can_get_synthetic_attribute: bool,
    pub can_get_owned_monitor_info: bool,
    pub can_get_current_contended_monitor: bool,
    pub can_get_monitor_info: bool,
    pub can_redefine_classes: bool,
    pub can_add_method: bool,
    pub can_unrestrictedly_redefine_classes: bool,
    pub can_pop_frames: bool,
    pub can_use_instance_filters: bool,
    pub can_get_source_debug_extension: bool,
    pub can_request_vm_death_event: bool,
    pub can_set_default_stratum: bool,
}

impl VmCapabilities {
    fn read_legacy(&mut self, r: &mut PacketReader<'_>) -> JdwpResult<()> {
        for flag in [
            &mut self.can_watch_field_modification,
            &mut self.can_watch_field_access,
            &mut self.can_get_bytecodes,
            &mut self.can_get_synthetic_attribute,
            &mut self.can_get_owned_monitor_info,
            &mut self.can_get_current_contended_monitor,
            &mut self.can_get_monitor_info,
        ] {
            *flag |= r.read_bool()?;
        }
        Ok(())
    }

    fn read_extended(&mut self, r: &mut PacketReader<'_>) -> JdwpResult<()> {
        self.read_legacy(r)?;
        for flag in [
            &mut self.can_redefine_classes,
            &mut self.can_add_method,
            &mut self.can_unrestrictedly_redefine_classes,
            &mut self.can_pop_frames,
            &mut self.can_use_instance_filters,
            &mut self.can_get_source_debug_extension,
            &mut self.can_request_vm_death_event,
            &mut self.can_set_default_stratum,
        ] {
            *flag = r.read_bool()?;
        }
        Ok(())
    }
}

/// Loaded classes and their index by JNI signature
#[derive(Debug, Default, Clone)]
pub(crate) struct ClassIndex {
    list: Option<Vec<Arc<Class>>>,
    by_signature: Option<HashMap<String, Vec<Arc<Class>>>>,
}

/// Dalvik names threads `<tid> name`; such a filter matches the full name
fn is_dalvik_thread_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('<') else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && rest[digits..].starts_with("> ")
}

fn thread_name_matches(thread_name: &str, filter: &str) -> bool {
    if is_dalvik_thread_name(filter) {
        thread_name == filter
    } else {
        thread_name
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or(thread_name)
            == filter
    }
}

/// Read a count-prefixed list of thread ids into pooled threads
pub(crate) fn read_threads(session: &Arc<SessionInner>, r: &mut PacketReader<'_>) -> JdwpResult<Vec<Arc<Thread>>> {
    let count = r.read_count()?;
    let mut threads = Vec::with_capacity(count);
    for _ in 0..count {
        threads.push(session.thread(r.read_object_id()?));
    }
    Ok(threads)
}

async fn load_classes(session: &Arc<SessionInner>) -> JdwpResult<ClassIndex> {
    let reply = session
        .request(
            command(command_sets::VIRTUAL_MACHINE, vm_commands::ALL_CLASSES_WITH_GENERIC),
            Vec::new(),
        )
        .await?;

    let mut r = session.reader(reply.data());
    let count = r.read_count()?;
    let mut list = Vec::with_capacity(count);
    let mut by_signature: HashMap<String, Vec<Arc<Class>>> = HashMap::new();

    for _ in 0..count {
        let type_tag = r.read_u8()?;
        let class = session.class(r.read_reference_type_id()?);
        let jni = r.read_string()?;
        let generic = r.read_string()?;
        let _status = r.read_i32()?;

        class.set_type_tag(type_tag);
        class.set_signature(jni.clone(), generic);
        by_signature.entry(jni).or_default().push(class.clone());
        list.push(class);
    }

    info!("Loaded {} classes", list.len());
    Ok(ClassIndex {
        list: Some(list),
        by_signature: Some(by_signature),
    })
}

impl Session {
    /// VirtualMachine.Version
    pub async fn version(&self) -> JdwpResult<VmVersion> {
        let session = self.inner();
        let reply = session
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::VERSION), Vec::new())
            .await?;

        let mut r = session.reader(reply.data());
        Ok(VmVersion {
            description: r.read_string()?,
            jdwp_major: r.read_i32()?,
            jdwp_minor: r.read_i32()?,
            vm_version: r.read_string()?,
            vm_name: r.read_string()?,
        })
    }

    /// Merged result of Capabilities (1/12) and CapabilitiesNew (1/17)
    pub async fn capabilities(&self) -> JdwpResult<VmCapabilities> {
        let session = self.inner();
        let legacy = session
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::CAPABILITIES), Vec::new())
            .await?;
        let extended = session
            .request(
                command(command_sets::VIRTUAL_MACHINE, vm_commands::CAPABILITIES_NEW),
                Vec::new(),
            )
            .await?;

        let mut caps = VmCapabilities::default();
        caps.read_legacy(&mut session.reader(legacy.data()))?;
        caps.read_extended(&mut session.reader(extended.data()))?;
        Ok(caps)
    }

    /// Suspend every thread in the VM
    pub async fn suspend(&self) -> JdwpResult<()> {
        self.inner()
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::SUSPEND), Vec::new())
            .await?;
        debug!("VM suspended");
        Ok(())
    }

    pub async fn resume(&self) -> JdwpResult<()> {
        self.inner()
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::RESUME), Vec::new())
            .await?;
        debug!("VM resumed");
        Ok(())
    }

    /// Terminate the target VM with `code`
    pub async fn exit(&self, code: i32) -> JdwpResult<()> {
        let session = self.inner();
        let mut w = session.writer();
        w.put_i32(code);

        session
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::EXIT), w.into_vec())
            .await?;
        info!("Asked VM to exit with code {}", code);
        Ok(())
    }

    /// Loaded classes, optionally only those with the given JNI signature
    pub async fn classes(&self, jni: Option<&str>) -> JdwpResult<Vec<Arc<Class>>> {
        let session = self.inner();
        match jni {
            None => {
                session
                    .classes
                    .read("classes", |g| g.list.clone(), || load_classes(session))
                    .await
            }
            Some(jni) => {
                session
                    .classes
                    .read(
                        "classes_by_signature",
                        |g| {
                            g.by_signature
                                .as_ref()
                                .map(|index| index.get(jni).cloned().unwrap_or_default())
                        },
                        || load_classes(session),
                    )
                    .await
            }
        }
    }

    /// Live threads, optionally filtered by name.
    ///
    /// A filter shaped like `<12> main` is compared with the full thread
    /// name; any other filter ignores the leading `<N> ` token.
    pub async fn threads(&self, name: Option<&str>) -> JdwpResult<Vec<Arc<Thread>>> {
        let session = self.inner();
        let reply = session
            .request(command(command_sets::VIRTUAL_MACHINE, vm_commands::ALL_THREADS), Vec::new())
            .await?;
        let threads = read_threads(session, &mut session.reader(reply.data()))?;

        let Some(filter) = name else {
            return Ok(threads);
        };

        let mut matching = Vec::new();
        for thread in threads {
            match thread.name().await {
                Ok(thread_name) if thread_name_matches(&thread_name, filter) => matching.push(thread),
                Ok(_) => {}
                // Threads can die between the listing and the name query
                Err(JdwpError::Request { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{answer, test_session};
    use crate::types::type_tags;
    use crate::writer::PacketWriter;

    #[test]
    fn test_thread_name_filter() {
        assert!(is_dalvik_thread_name("<1> main"));
        assert!(!is_dalvik_thread_name("<> main"));
        assert!(!is_dalvik_thread_name("<1>main"));
        assert!(!is_dalvik_thread_name("main"));

        assert!(thread_name_matches("<1> main", "main"));
        assert!(thread_name_matches("<1> main", "<1> main"));
        assert!(!thread_name_matches("<2> main", "<1> main"));
        assert!(thread_name_matches("main", "main"));
        assert!(thread_name_matches("Signal Catcher", "Catcher"));
    }

    #[tokio::test]
    async fn test_read_threads_uses_object_id_width() {
        let (session, _vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let mut w = PacketWriter::new(sizes);
        w.put_i32(2).put_object_id(0x0102030405060708).put_object_id(0x11);
        let body = w.into_vec();
        assert_eq!(body.len(), 4 + 2 * 8);

        let mut r = PacketReader::new(&body, sizes);
        let threads = read_threads(session.inner(), &mut r).unwrap();
        assert_eq!(threads[0].id(), 0x0102030405060708);
        assert_eq!(threads[1].id(), 0x11);
        assert!(!Arc::ptr_eq(&threads[0], &threads[1]));
        assert_eq!(r.remaining(), 0);
    }

    #[tokio::test]
    async fn test_all_threads_over_the_wire() {
        let (session, mut vm) = test_session(8).await;

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.threads(None).await }
        });

        let mut w = PacketWriter::new(session.id_sizes());
        w.put_i32(2).put_object_id(0x0102030405060708).put_object_id(0x11);
        let body = w.into_vec();
        assert_eq!(body.len(), 4 + 2 * 8);
        let (code, sent) = answer(&mut vm, &body).await;
        assert_eq!(code, 0x0104);
        assert!(sent.is_empty());

        let threads = pending.await.unwrap().unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id(), 0x0102030405060708);
        assert_eq!(threads[1].id(), 0x11);
        assert!(!Arc::ptr_eq(&threads[0], &threads[1]));
        assert!(Arc::ptr_eq(&threads[1], &session.thread(0x11)));
    }

    #[tokio::test]
    async fn test_threads_filtered_by_name() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.threads(Some("main")).await }
        });

        let mut w = PacketWriter::new(sizes);
        w.put_i32(3).put_object_id(0x21).put_object_id(0x22).put_object_id(0x23);
        answer(&mut vm, &w.into_vec()).await;

        let mut w = PacketWriter::new(sizes);
        w.put_string("<1> main");
        let (code, sent) = answer(&mut vm, &w.into_vec()).await;
        assert_eq!(code, 0x0B01);
        assert_eq!(sent, 0x21u64.to_be_bytes());

        // Died after the listing
        let (id, _, _) = vm.read_command().await;
        vm.reply(id, 10, &[]).await;

        let mut w = PacketWriter::new(sizes);
        w.put_string("<3> Signal Catcher");
        answer(&mut vm, &w.into_vec()).await;

        let threads = pending.await.unwrap().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id(), 0x21);
    }

    #[tokio::test]
    async fn test_exit_sends_code() {
        let (session, mut vm) = test_session(8).await;
        let pending = tokio::spawn(async move { session.exit(3).await });

        let (code, sent) = answer(&mut vm, &[]).await;
        assert_eq!(code, 0x010A);
        assert_eq!(sent, vec![0, 0, 0, 3]);
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_classes_loaded_once_and_indexed() {
        let (session, mut vm) = test_session(8).await;
        let sizes = session.id_sizes();
        let session = Arc::new(session);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.classes(Some("Lcom/example/Foo;")).await }
        });

        let mut w = PacketWriter::new(sizes);
        w.put_i32(2);
        w.put_u8(type_tags::CLASS)
            .put_reference_type_id(0x10)
            .put_string("Lcom/example/Foo;")
            .put_string("")
            .put_i32(7);
        w.put_u8(type_tags::INTERFACE)
            .put_reference_type_id(0x11)
            .put_string("Ljava/lang/Runnable;")
            .put_string("")
            .put_i32(7);
        let (code, _) = answer(&mut vm, &w.into_vec()).await;
        assert_eq!(code, 0x0114);

        let found = pending.await.unwrap().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), 0x10);

        // Served from the group, no second request
        let all = session.classes(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].type_tag(), type_tags::INTERFACE);
        assert_eq!(all[1].name().await.unwrap(), "java.lang.Runnable");
        assert!(session.classes(Some("Lmissing;")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capabilities_merge_legacy_flags() {
        let (session, mut vm) = test_session(8).await;
        let pending = tokio::spawn(async move { session.capabilities().await });

        let (code, _) = answer(&mut vm, &[1, 0, 0, 0, 0, 0, 0]).await;
        assert_eq!(code, 0x010C);
        let mut extended = vec![0, 1, 1, 0, 0, 0, 0];
        extended.extend_from_slice(&[0, 0, 0, 1, 0, 0, 1, 0]);
        extended.extend_from_slice(&[0; 17]);
        let (code, _) = answer(&mut vm, &extended).await;
        assert_eq!(code, 0x0111);

        let caps = pending.await.unwrap().unwrap();
        assert!(caps.can_watch_field_modification);
        assert!(caps.can_watch_field_access);
        assert!(caps.can_get_bytecodes);
        assert!(!caps.can_get_monitor_info);
        assert!(caps.can_pop_frames);
        assert!(caps.can_request_vm_death_event);
        assert!(!caps.can_set_default_stratum);
    }
}
