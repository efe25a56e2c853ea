//! Access flags from the Dalvik executable format.

use crate::error::{Error, Result};

bitflags::bitflags! {
    /// Class and method access flags.
    ///
    /// Several bits are shared between class, field and method meanings
    /// (`VOLATILE`/`BRIDGE`, `TRANSIENT`/`VARARGS`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x1_0000;
        const DECLARED_SYNCHRONIZED = 0x2_0000;
    }
}

impl AccessFlags {
    /// Parse lowercase flag names as written in smali (`public`, `final`,
    /// `declared-synchronized`).
    pub fn parse_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Self::empty(), |acc, name| {
            let name = name.as_ref();
            let key = name.trim().to_ascii_uppercase().replace('-', "_");
            Self::from_name(&key)
                .map(|f| acc | f)
                .ok_or_else(|| Error::UnknownAccessFlag(name.to_string()))
        })
    }

    /// Lowercase smali names, one per set bit.
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase().replace('_', "-"))
            .collect()
    }
}
