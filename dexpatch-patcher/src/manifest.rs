//! Declarative patches loaded from YAML.
//!
//! ```yaml
//! app:
//!   package: com.google.android.youtube
//!   version: 19.16.39
//! options:
//!   disable-informer:
//!     enabled: true
//! patches:
//!   - name: disable-informer
//!     options:
//!       - { key: enabled, kind: bool, default: true }
//!     fingerprints:
//!       - name: start-video-informer
//!         returns: V
//!         access: [public, final]
//!         strings: [pc]
//!         opcodes: [invoke-interface, return-void]
//!     actions:
//!       - action: return-early
//!         fingerprint: start-video-informer
//!         when: enabled
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use dexpatch_pool::{ExternalLabel, Method};
use serde::{Deserialize, Serialize};

use crate::context::{AppContext, PatchContext};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, FingerprintDef};
use crate::options::{OptionKind, OptionSpec, OptionValues};
use crate::patch::{FingerprintRequirement, PatchDescriptor};
use crate::scanner::{ScanResult, Uniqueness};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppDef>,
    #[serde(default)]
    pub options: OptionValues,
    #[serde(default)]
    pub patches: Vec<PatchDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDef {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Packages the patch applies to; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatible: Vec<String>,
    #[serde(default)]
    pub fingerprints: Vec<FingerprintEntry>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    #[serde(flatten)]
    pub def: FingerprintDef,
    #[serde(default = "yes")]
    pub unique: bool,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Insert,
    Replace,
    Remove,
    ReturnEarly,
    RewriteStrings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedAnchor {
    PatternStart,
    PatternEnd,
    First,
    Last,
}

/// Where an action applies, relative to a resolved fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnchorDef {
    Named(NamedAnchor),
    String { string: String },
    Literal { literal: i64 },
    Index { index: usize },
}

impl Default for AnchorDef {
    fn default() -> Self {
        AnchorDef::Named(NamedAnchor::First)
    }
}

/// An existing instruction a snippet may branch to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDef {
    pub at: AnchorDef,
    #[serde(default)]
    pub offset: i64,
}

/// One edit. Which fields matter depends on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionDef {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<AnchorDef>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "one")]
    pub count: usize,
    /// Assembly lines. `{reg}` is register A of the anchor instruction,
    /// `{free}` a scratch register below the parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, LabelDef>,
    /// Registers reserved below the parameters when picking `{free}`.
    #[serde(default = "one_register")]
    pub reserved: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strings: BTreeMap<String, String>,
    /// A bool option of the patch that gates this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

fn yes() -> bool {
    true
}

fn one() -> usize {
    1
}

fn one_register() -> u16 {
    1
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// The app section, or an unnamed app when absent.
    pub fn app_context(&self) -> Result<AppContext> {
        let Some(app) = &self.app else {
            return Ok(AppContext::default());
        };
        let mut context = AppContext::new(app.package.as_str());
        if let Some(version) = &app.version {
            context = context.with_version(version)?;
        }
        for flag in &app.flags {
            context = context.with_flag(flag.as_str());
        }
        Ok(context)
    }

    /// Compile every patch. References between actions, fingerprints and
    /// options are checked here, before anything runs.
    pub fn into_descriptors(self) -> Result<Vec<PatchDescriptor>> {
        self.patches.into_iter().map(compile).collect()
    }
}

fn compile(def: PatchDef) -> Result<PatchDescriptor> {
    let config = |reason: String| Error::Config(format!("patch {}: {reason}", def.name));

    let mut patch = PatchDescriptor::new(def.name.as_str());
    if let Some(text) = &def.description {
        patch = patch.description(text.as_str());
    }
    for dependency in &def.dependencies {
        patch = patch.depends_on(dependency.as_str());
    }
    for package in &def.compatible {
        patch = patch.compatible_with(package.as_str());
    }

    let mut declared = BTreeSet::new();
    for entry in &def.fingerprints {
        let fingerprint = Fingerprint::try_from(&entry.def)?;
        if !declared.insert(fingerprint.name().to_string()) {
            return Err(config(format!("fingerprint {} declared twice", fingerprint.name())));
        }
        patch = patch.require(FingerprintRequirement {
            fingerprint,
            uniqueness: if entry.unique {
                Uniqueness::Required
            } else {
                Uniqueness::First
            },
            optional: entry.optional,
        });
    }
    for spec in &def.options {
        patch = patch.option(spec.clone());
    }

    for (i, action) in def.actions.iter().enumerate() {
        if action.action != ActionKind::RewriteStrings {
            match &action.fingerprint {
                None => return Err(config(format!("action {i} names no fingerprint"))),
                Some(name) if !declared.contains(name) => {
                    return Err(config(format!("action {i} uses undeclared fingerprint {name}")));
                }
                Some(_) => {}
            }
        }
        if let Some(option) = &action.when {
            let is_bool = def
                .options
                .iter()
                .any(|o| &o.key == option && o.kind == OptionKind::Bool);
            if !is_bool {
                return Err(config(format!("action {i} is gated on {option}, not a bool option")));
            }
        }
    }

    let actions = def.actions;
    Ok(patch.execute(move |cx| actions.iter().try_for_each(|action| run_action(cx, action))))
}

fn run_action(cx: &mut PatchContext<'_>, action: &ActionDef) -> Result<()> {
    if let Some(option) = &action.when {
        if !cx.option_bool(option)? {
            log::debug!("{}: {:?} skipped, {option} is off", cx.patch_name(), action.action);
            return Ok(());
        }
    }

    if action.action == ActionKind::RewriteStrings {
        let strings = action.strings.clone();
        cx.transform_strings(move |s| strings.get(s).cloned())?;
        return Ok(());
    }

    let Some(fingerprint) = action.fingerprint.as_deref() else {
        return Err(Error::Config(format!(
            "{}: {:?} names no fingerprint",
            cx.patch_name(),
            action.action
        )));
    };
    // only an optional fingerprint comes back empty
    let Some(result) = cx.optional_result(fingerprint)? else {
        log::warn!("{}: {fingerprint} absent, {:?} skipped", cx.patch_name(), action.action);
        return Ok(());
    };

    let method = cx.method(&result)?;
    let anchor = resolve_anchor(&result, method, action.at.as_ref().unwrap_or(&AnchorDef::default()))?;
    let index = offset(&result, anchor, action.offset)?;
    let code = expand(&result, method, anchor, action)?;
    let labels = action
        .labels
        .iter()
        .map(|(name, label)| {
            let at = resolve_anchor(&result, method, &label.at)?;
            Ok(ExternalLabel::new(name.as_str(), offset(&result, at, label.offset)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut splicer = cx.splicer(&result)?;
    match action.action {
        ActionKind::Insert => splicer.insert_asm_with_labels(index, &code, &labels)?,
        ActionKind::Replace => {
            let end = index.saturating_add(action.count);
            splicer.remove_range(index..end)?;
            let labels: Vec<ExternalLabel> = labels
                .into_iter()
                .map(|l| match l.index {
                    i if i >= end => ExternalLabel::new(l.name, i - action.count),
                    i if i >= index => ExternalLabel::new(l.name, index),
                    _ => l,
                })
                .collect();
            splicer.insert_asm_with_labels(index, &code, &labels)?;
        }
        ActionKind::Remove => {
            splicer.remove_range(index..index.saturating_add(action.count))?;
        }
        ActionKind::ReturnEarly => splicer.return_early(action.value)?,
        ActionKind::RewriteStrings => {}
    }
    Ok(())
}

fn anchor_error(result: &ScanResult, reason: String) -> Error {
    Error::Anchor {
        fingerprint: result.fingerprint.clone(),
        reason,
    }
}

fn resolve_anchor(result: &ScanResult, method: &Method, anchor: &AnchorDef) -> Result<usize> {
    let body = method.body();
    let found = match anchor {
        AnchorDef::Named(NamedAnchor::PatternStart) => result.pattern_start(),
        AnchorDef::Named(NamedAnchor::PatternEnd) => result.pattern_end(),
        AnchorDef::Named(NamedAnchor::First) => Some(0),
        AnchorDef::Named(NamedAnchor::Last) => body.len().checked_sub(1),
        AnchorDef::String { string } => result
            .string_index(string)
            .or_else(|| body.index_of_string(string)),
        AnchorDef::Literal { literal } => result
            .literal_index(*literal)
            .or_else(|| body.index_of_literal(*literal)),
        AnchorDef::Index { index } => Some(*index),
    };
    found.ok_or_else(|| anchor_error(result, format!("{anchor:?} not present in {}", result.signature)))
}

fn offset(result: &ScanResult, index: usize, offset: i64) -> Result<usize> {
    i64::try_from(index)
        .ok()
        .and_then(|i| i.checked_add(offset))
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| anchor_error(result, format!("offset {offset} from {index} is out of range")))
}

fn expand(result: &ScanResult, method: &Method, anchor: usize, action: &ActionDef) -> Result<String> {
    let mut code = action.code.join("\n");
    if code.contains("{reg}") {
        let register = method
            .body()
            .get(anchor)
            .and_then(|insn| insn.register_a())
            .ok_or_else(|| anchor_error(result, format!("instruction {anchor} has no register")))?;
        code = code.replace("{reg}", &format!("v{register}"));
    }
    if code.contains("{free}") {
        let register = method.free_register(action.reserved)?;
        code = code.replace("{free}", &format!("v{register}"));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_parse_in_every_form() {
        let anchors: Vec<AnchorDef> =
            serde_yaml::from_str("- pattern-end\n- last\n- { string: pc }\n- { literal: 2131361792 }\n- { index: 4 }\n")
                .unwrap();
        assert_eq!(
            anchors,
            [
                AnchorDef::Named(NamedAnchor::PatternEnd),
                AnchorDef::Named(NamedAnchor::Last),
                AnchorDef::String { string: "pc".into() },
                AnchorDef::Literal { literal: 2131361792 },
                AnchorDef::Index { index: 4 },
            ]
        );
    }

    #[test]
    fn action_defaults() {
        let action: ActionDef = serde_yaml::from_str("action: remove\nfingerprint: f\n").unwrap();
        assert_eq!(action.count, 1);
        assert_eq!(action.reserved, 1);
        assert_eq!(action.offset, 0);
        assert!(action.at.is_none());
    }

    #[test]
    fn undeclared_fingerprint_is_rejected() {
        let manifest = Manifest::from_yaml(
            "patches:\n  - name: p\n    actions:\n      - action: remove\n        fingerprint: ghost\n",
        )
        .unwrap();
        assert!(matches!(manifest.into_descriptors(), Err(Error::Config(_))));
    }

    #[test]
    fn edit_without_a_fingerprint_is_rejected() {
        let manifest = Manifest::from_yaml(
            "patches:\n  - name: p\n    actions:\n      - { action: insert, code: [nop] }\n",
        )
        .unwrap();
        match manifest.into_descriptors() {
            Err(Error::Config(reason)) => assert!(reason.contains("names no fingerprint"), "{reason}"),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn gate_must_be_a_bool_option() {
        let manifest = Manifest::from_yaml(
            "patches:
  - name: p
    options:
      - { key: label, kind: string }
    actions:
      - { action: rewrite-strings, when: label, strings: { a: b } }
",
        )
        .unwrap();
        assert!(matches!(manifest.into_descriptors(), Err(Error::Config(_))));
    }

    #[test]
    fn unique_false_means_first_candidate() {
        let manifest = Manifest::from_yaml(
            "patches:
  - name: p
    fingerprints:
      - { name: f, returns: V, unique: false, optional: true }
",
        )
        .unwrap();
        let patches = manifest.into_descriptors().unwrap();
        let requirement = &patches[0].fingerprints()[0];
        assert_eq!(requirement.uniqueness, Uniqueness::First);
        assert!(requirement.optional);
    }
}
