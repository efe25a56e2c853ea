//! Patch options: declared per patch, supplied before a run, validated
//! when the session starts and read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Bool,
    String,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Bool => f.write_str("bool"),
            OptionKind::String => f.write_str("string"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    String(String),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::String(_) => OptionKind::String,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::String(v.to_string())
    }
}

/// An option a patch declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub key: String,
    pub kind: OptionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<OptionValue>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OptionSpec {
    pub fn bool(key: impl Into<String>, default: bool) -> Self {
        Self {
            key: key.into(),
            kind: OptionKind::Bool,
            default: Some(OptionValue::Bool(default)),
            required: false,
            description: None,
        }
    }

    pub fn string(key: impl Into<String>, default: Option<&str>) -> Self {
        Self {
            key: key.into(),
            kind: OptionKind::String,
            default: default.map(OptionValue::from),
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Supplied values, keyed by patch name then option key.
///
/// ```yaml
/// gms-support:
///   vendor-group-id: app.revanced
/// opus-codec:
///   enabled: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValues(BTreeMap<String, BTreeMap<String, OptionValue>>);

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn set(&mut self, patch: &str, key: &str, value: impl Into<OptionValue>) {
        self.0
            .entry(patch.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn get(&self, patch: &str, key: &str) -> Option<&OptionValue> {
        self.0.get(patch)?.get(key)
    }

    pub fn patches(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: OptionValues) {
        for (patch, values) in other.0 {
            self.0.entry(patch).or_default().extend(values);
        }
    }

    fn for_patch(&self, patch: &str) -> Option<&BTreeMap<String, OptionValue>> {
        self.0.get(patch)
    }
}

/// The validated options of one patch with defaults filled in.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOptions {
    patch: String,
    declared: BTreeMap<String, OptionKind>,
    values: BTreeMap<String, OptionValue>,
}

impl ResolvedOptions {
    /// Check `supplied` against `specs`. Unknown keys are logged and
    /// ignored.
    pub fn resolve(patch: &str, specs: &[OptionSpec], supplied: &OptionValues) -> Result<Self> {
        let given = supplied.for_patch(patch);
        if let Some(given) = given {
            for key in given.keys() {
                if !specs.iter().any(|s| &s.key == key) {
                    log::warn!("{patch}: ignoring unknown option {key}");
                }
            }
        }

        let mut resolved = Self {
            patch: patch.to_string(),
            ..Self::default()
        };
        for spec in specs {
            resolved.declared.insert(spec.key.clone(), spec.kind);
            let value = given.and_then(|g| g.get(&spec.key)).or(spec.default.as_ref());
            match value {
                Some(v) if v.kind() != spec.kind => {
                    return Err(Error::OptionTypeMismatch {
                        patch: patch.to_string(),
                        key: spec.key.clone(),
                        expected: spec.kind,
                    });
                }
                Some(v) => {
                    resolved.values.insert(spec.key.clone(), v.clone());
                }
                None if spec.required => {
                    return Err(Error::MissingOption {
                        patch: patch.to_string(),
                        key: spec.key.clone(),
                    });
                }
                None => {}
            }
        }
        Ok(resolved)
    }

    pub fn get(&self, key: &str) -> Result<Option<&OptionValue>> {
        if !self.declared.contains_key(key) {
            return Err(Error::OptionNotFound {
                patch: self.patch.clone(),
                key: key.to_string(),
            });
        }
        Ok(self.values.get(key))
    }

    /// An unset bool option reads as `false`.
    pub fn bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Some(OptionValue::Bool(b)) => Ok(*b),
            None => Ok(false),
            Some(_) => Err(self.mismatch(key, OptionKind::Bool)),
        }
    }

    pub fn string(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key)? {
            Some(OptionValue::String(s)) => Ok(Some(s)),
            None => Ok(None),
            Some(_) => Err(self.mismatch(key, OptionKind::String)),
        }
    }

    pub fn kind_of(&self, key: &str) -> Option<OptionKind> {
        self.declared.get(key).copied()
    }

    fn mismatch(&self, key: &str, expected: OptionKind) -> Error {
        Error::OptionTypeMismatch {
            patch: self.patch.clone(),
            key: key.to_string(),
            expected,
        }
    }
}
