//! Declarative method signatures.
//!
//! A [`Fingerprint`] is plain data plus an optional predicate. Matching is
//! done by [`crate::matcher`]; a fingerprint never holds scan state.

use std::fmt;
use std::sync::Arc;

use dexpatch_isa::{Opcode, OpcodeFlags};
use dexpatch_pool::{AccessFlags, ClassDef, Method};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A type descriptor constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypePattern {
    /// The descriptor must equal this string.
    Exact(String),
    /// The descriptor must start with this string (`"L"` accepts any
    /// class type).
    Prefix(String),
}

impl TypePattern {
    pub fn matches(&self, descriptor: &str) -> bool {
        match self {
            TypePattern::Exact(t) => descriptor == t,
            TypePattern::Prefix(p) => descriptor.starts_with(p.as_str()),
        }
    }

    /// `"L*"` is a prefix pattern, anything else is exact.
    pub fn parse(s: &str) -> Self {
        match s.strip_suffix('*') {
            Some(prefix) => TypePattern::Prefix(prefix.to_string()),
            None => TypePattern::Exact(s.to_string()),
        }
    }
}

impl From<&str> for TypePattern {
    fn from(s: &str) -> Self {
        TypePattern::Exact(s.to_string())
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePattern::Exact(t) => f.write_str(t),
            TypePattern::Prefix(p) => write!(f, "{p}*"),
        }
    }
}

/// One position of an opcode pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternElement {
    /// Matches any opcode.
    Any,
    Op(Opcode),
    /// Matches any opcode carrying all of these flags.
    Kind(OpcodeFlags),
}

impl PatternElement {
    pub fn matches(&self, opcode: Opcode) -> bool {
        match self {
            PatternElement::Any => true,
            PatternElement::Op(op) => *op == opcode,
            PatternElement::Kind(flags) => opcode.flags().contains(*flags),
        }
    }

    /// `"*"`, a mnemonic such as `"invoke-static"`, or an opcode class
    /// such as `"@invoke"` or `"@move-result"`.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "*" {
            return Some(PatternElement::Any);
        }
        if let Some(kind) = s.strip_prefix('@') {
            let name = kind.to_ascii_uppercase().replace('-', "_");
            return OpcodeFlags::from_name(&name).map(PatternElement::Kind);
        }
        Opcode::from_mnemonic(s).map(PatternElement::Op)
    }
}

impl From<Opcode> for PatternElement {
    fn from(op: Opcode) -> Self {
        PatternElement::Op(op)
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternElement::Any => f.write_str("*"),
            PatternElement::Op(op) => write!(f, "{op}"),
            PatternElement::Kind(flags) => {
                let names: Vec<String> = flags
                    .iter_names()
                    .map(|(n, _)| format!("@{}", n.to_ascii_lowercase().replace('_', "-")))
                    .collect();
                f.write_str(&names.join("+"))
            }
        }
    }
}

/// Escape hatch evaluated after every declarative check passed.
pub type Predicate = Arc<dyn Fn(&Method, &ClassDef) -> bool + Send + Sync>;

/// A method signature. The name identifies the fingerprint in logs and
/// error messages; scan caches key on the whole definition.
#[derive(Clone, Default)]
pub struct Fingerprint {
    name: String,
    pub(crate) return_type: Option<TypePattern>,
    pub(crate) access_flags: Option<AccessFlags>,
    pub(crate) parameters: Option<Vec<TypePattern>>,
    pub(crate) strings: Vec<String>,
    pub(crate) literals: Vec<i64>,
    pub(crate) opcodes: Vec<PatternElement>,
    pub(crate) custom: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FingerprintKey {
    pub(crate) name: String,
    return_type: Option<TypePattern>,
    access_flags: Option<AccessFlags>,
    parameters: Option<Vec<TypePattern>>,
    strings: Vec<String>,
    literals: Vec<i64>,
    opcodes: Vec<PatternElement>,
    custom: Option<usize>,
}

impl Fingerprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Equal keys resolve alike. A predicate counts by identity, so clones
    /// share a key and two separately built closures never do.
    pub(crate) fn key(&self) -> FingerprintKey {
        FingerprintKey {
            name: self.name.clone(),
            return_type: self.return_type.clone(),
            access_flags: self.access_flags,
            parameters: self.parameters.clone(),
            strings: self.strings.clone(),
            literals: self.literals.clone(),
            opcodes: self.opcodes.clone(),
            custom: self.custom.as_ref().map(|p| Arc::as_ptr(p).cast::<()>() as usize),
        }
    }

    pub fn returns(mut self, descriptor: &str) -> Self {
        self.return_type = Some(TypePattern::Exact(descriptor.to_string()));
        self
    }

    pub fn returns_matching(mut self, pattern: TypePattern) -> Self {
        self.return_type = Some(pattern);
        self
    }

    /// The candidate's flags must contain every bit of `flags`.
    pub fn access(mut self, flags: AccessFlags) -> Self {
        self.access_flags = Some(flags);
        self
    }

    pub fn parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.parameters = Some(
            parameters
                .into_iter()
                .map(|p| TypePattern::Exact(p.as_ref().to_string()))
                .collect(),
        );
        self
    }

    pub fn parameter_patterns(mut self, parameters: Vec<TypePattern>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Every string must appear as a `const-string` operand.
    pub fn strings<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strings.extend(strings.into_iter().map(Into::into));
        self
    }

    /// The literal must appear as a constant operand, as resource ids do.
    pub fn literal(mut self, value: i64) -> Self {
        self.literals.push(value);
        self
    }

    pub fn opcodes<I, E>(mut self, pattern: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<PatternElement>,
    {
        self.opcodes = pattern.into_iter().map(Into::into).collect();
        self
    }

    pub fn custom<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method, &ClassDef) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(predicate));
        self
    }

    pub fn return_type(&self) -> Option<&TypePattern> {
        self.return_type.as_ref()
    }

    pub fn access_flags(&self) -> Option<AccessFlags> {
        self.access_flags
    }

    pub fn parameter_list(&self) -> Option<&[TypePattern]> {
        self.parameters.as_deref()
    }

    pub fn string_list(&self) -> &[String] {
        &self.strings
    }

    pub fn literal_list(&self) -> &[i64] {
        &self.literals
    }

    pub fn opcode_pattern(&self) -> &[PatternElement] {
        &self.opcodes
    }

    pub fn has_custom(&self) -> bool {
        self.custom.is_some()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("access_flags", &self.access_flags)
            .field("parameters", &self.parameters)
            .field("strings", &self.strings)
            .field("literals", &self.literals)
            .field("opcodes", &self.opcodes)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Serialized form of a [`Fingerprint`], as written in manifests.
///
/// ```yaml
/// name: codec-selector
/// returns: "L*"
/// access: [public, static]
/// parameters: []
/// strings: [audio/opus]
/// opcodes: [invoke-interface, "*", "@move-result"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opcodes: Vec<String>,
}

impl TryFrom<&FingerprintDef> for Fingerprint {
    type Error = Error;

    fn try_from(def: &FingerprintDef) -> Result<Self> {
        let invalid = |reason: String| Error::Config(format!("fingerprint {}: {reason}", def.name));
        if def.name.is_empty() {
            return Err(Error::Config("fingerprint without a name".into()));
        }
        let mut fp = Fingerprint::new(def.name.as_str());
        if let Some(r) = &def.returns {
            fp = fp.returns_matching(TypePattern::parse(r));
        }
        if let Some(access) = &def.access {
            let flags = AccessFlags::parse_names(access).map_err(|e| invalid(e.to_string()))?;
            fp = fp.access(flags);
        }
        if let Some(params) = &def.parameters {
            fp = fp.parameter_patterns(params.iter().map(|p| TypePattern::parse(p)).collect());
        }
        fp = fp.strings(def.strings.iter().cloned());
        for &literal in &def.literals {
            fp = fp.literal(literal);
        }
        let pattern = def
            .opcodes
            .iter()
            .map(|s| PatternElement::parse(s).ok_or_else(|| invalid(format!("unknown opcode {s:?}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(fp.opcodes(pattern))
    }
}
