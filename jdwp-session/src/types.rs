// JDWP type definitions
//
// Common types used across the JDWP protocol

use crate::protocol::{JdwpError, JdwpResult};
use serde::{Deserialize, Serialize};

// Identifiers travel with negotiated widths but are held widened to 64 bits
pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

/// Identifier widths negotiated with VirtualMachine.IDSizes right after the
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSizes {
    pub field_id: usize,
    pub method_id: usize,
    pub object_id: usize,
    pub reference_type_id: usize,
    pub frame_id: usize,
}

impl IdSizes {
    /// Validate the widths announced by the VM
    pub fn new(
        field_id: i32,
        method_id: i32,
        object_id: i32,
        reference_type_id: i32,
        frame_id: i32,
    ) -> JdwpResult<Self> {
        let check = |width: i32| -> JdwpResult<usize> {
            match width {
                1 | 2 | 4 | 8 => Ok(width as usize),
                other => Err(JdwpError::Protocol(format!(
                    "Identifier size not supported: {}",
                    other
                ))),
            }
        };

        Ok(Self {
            field_id: check(field_id)?,
            method_id: check(method_id)?,
            object_id: check(object_id)?,
            reference_type_id: check(reference_type_id)?,
            frame_id: check(frame_id)?,
        })
    }
}

impl Default for IdSizes {
    fn default() -> Self {
        Self {
            field_id: 8,
            method_id: 8,
            object_id: 8,
            reference_type_id: 8,
            frame_id: 8,
        }
    }
}

// Type tags for values
pub mod tags {
    pub const ARRAY: u8 = b'[';
    pub const BYTE: u8 = b'B';
    pub const CHAR: u8 = b'C';
    pub const OBJECT: u8 = b'L';
    pub const FLOAT: u8 = b'F';
    pub const DOUBLE: u8 = b'D';
    pub const INT: u8 = b'I';
    pub const LONG: u8 = b'J';
    pub const SHORT: u8 = b'S';
    pub const VOID: u8 = b'V';
    pub const BOOLEAN: u8 = b'Z';
    pub const STRING: u8 = b's';
    pub const THREAD: u8 = b't';
    pub const THREAD_GROUP: u8 = b'g';
    pub const CLASS_LOADER: u8 = b'l';
    pub const CLASS_OBJECT: u8 = b'c';

    pub fn is_primitive(tag: u8) -> bool {
        b"BCFDIJSVZ".contains(&tag)
    }

    pub fn is_object(tag: u8) -> bool {
        b"stglcL[".contains(&tag)
    }
}

// Reference type tags
pub mod type_tags {
    pub const CLASS: u8 = 1;
    pub const INTERFACE: u8 = 2;
    pub const ARRAY: u8 = 3;
}

// Thread status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    Zombie,
    Running,
    Sleeping,
    Monitor,
    Wait,
    Initializing,
    Starting,
    Native,
    VmWait,
    Unknown(i32),
}

impl ThreadStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ThreadStatus::Zombie,
            1 => ThreadStatus::Running,
            2 => ThreadStatus::Sleeping,
            3 => ThreadStatus::Monitor,
            4 => ThreadStatus::Wait,
            5 => ThreadStatus::Initializing,
            6 => ThreadStatus::Starting,
            7 => ThreadStatus::Native,
            8 => ThreadStatus::VmWait,
            other => ThreadStatus::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThreadStatus::Zombie => "zombie",
            ThreadStatus::Running => "running",
            ThreadStatus::Sleeping => "sleeping",
            ThreadStatus::Monitor => "monitor",
            ThreadStatus::Wait => "waiting",
            ThreadStatus::Initializing => "initializing",
            ThreadStatus::Starting => "starting",
            ThreadStatus::Native => "native",
            ThreadStatus::VmWait => "vmwait",
            ThreadStatus::Unknown(_) => "UNKNOWN",
        }
    }
}

// Suspend status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendStatus {
    Running,
    Suspended,
    Unknown(i32),
}

impl SuspendStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => SuspendStatus::Running,
            1 => SuspendStatus::Suspended,
            other => SuspendStatus::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SuspendStatus::Running => "running",
            SuspendStatus::Suspended => "suspended",
            SuspendStatus::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Suspend policy for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    All = 2,
}

/// Access flags of a method or field, as reported by the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers(pub i32);

impl Modifiers {
    pub const PUBLIC: i32 = 0x0001;
    pub const PRIVATE: i32 = 0x0002;
    pub const PROTECTED: i32 = 0x0004;
    pub const STATIC: i32 = 0x0008;
    pub const FINAL: i32 = 0x0010;
    pub const SYNCHRONIZED: i32 = 0x0020;
    pub const VOLATILE: i32 = 0x0040;
    pub const BRIDGE: i32 = 0x0040;
    pub const TRANSIENT: i32 = 0x0080;
    pub const VARARGS: i32 = 0x0080;
    pub const NATIVE: i32 = 0x0100;
    pub const ABSTRACT: i32 = 0x0400;
    pub const STRICT: i32 = 0x0800;
    pub const SYNTHETIC: i32 = 0x1000;

    pub fn has(&self, flag: i32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_static(&self) -> bool {
        self.has(Self::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.has(Self::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.has(Self::ABSTRACT)
    }

    /// Render field modifiers, e.g. "private static final "
    pub fn field_keywords(&self) -> String {
        self.render(&[
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::VOLATILE, "volatile"),
            (Self::TRANSIENT, "transient"),
        ])
    }

    /// Render method modifiers, e.g. "public static native "
    pub fn method_keywords(&self) -> String {
        self.render(&[
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::SYNCHRONIZED, "synchronized"),
            (Self::BRIDGE, "bridge"),
            (Self::VARARGS, "varargs"),
            (Self::NATIVE, "native"),
            (Self::ABSTRACT, "abstract"),
            (Self::STRICT, "strict"),
            (Self::SYNTHETIC, "synthetic"),
        ])
    }

    fn render(&self, table: &[(i32, &str)]) -> String {
        let mut out = String::new();
        for (flag, word) in table {
            if self.has(*flag) {
                out.push_str(word);
                out.push(' ');
            }
        }
        out
    }
}

/// Turn a JNI class signature into a dotted class name
pub fn signature_to_name(jni: &str) -> String {
    let name = jni.strip_prefix('L').unwrap_or(jni);
    let name = name.strip_suffix(';').unwrap_or(name);
    name.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_sizes_reject_odd_widths() {
        assert!(IdSizes::new(4, 4, 8, 8, 8).is_ok());
        assert!(matches!(
            IdSizes::new(4, 3, 8, 8, 8),
            Err(JdwpError::Protocol(_))
        ));
    }

    #[test]
    fn test_modifier_rendering() {
        let field = Modifiers(Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL);
        assert_eq!(field.field_keywords(), "private static final ");

        let method = Modifiers(Modifiers::PUBLIC | Modifiers::NATIVE);
        assert_eq!(method.method_keywords(), "public native ");
        assert!(method.is_native());
        assert!(!method.is_abstract());
    }

    #[test]
    fn test_signature_to_name() {
        assert_eq!(signature_to_name("Ljava/lang/String;"), "java.lang.String");
        assert_eq!(signature_to_name("[I"), "[I");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(ThreadStatus::from_raw(4).name(), "waiting");
        assert_eq!(ThreadStatus::from_raw(42), ThreadStatus::Unknown(42));
        assert_eq!(SuspendStatus::from_raw(1).name(), "suspended");
    }
}
