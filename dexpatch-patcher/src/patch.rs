//! Patch descriptors.

use std::fmt;
use std::sync::Arc;

use crate::context::PatchContext;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::options::OptionSpec;
use crate::scanner::Uniqueness;

/// The body of a patch.
pub type Execute = Arc<dyn Fn(&mut PatchContext<'_>) -> Result<()> + Send + Sync>;

/// A fingerprint a patch needs resolved before it runs.
#[derive(Debug, Clone)]
pub struct FingerprintRequirement {
    pub fingerprint: Fingerprint,
    pub uniqueness: Uniqueness,
    /// Absence is tolerated; the patch sees `None`.
    pub optional: bool,
}

/// A named unit of modification.
#[derive(Clone, Default)]
pub struct PatchDescriptor {
    name: String,
    description: Option<String>,
    dependencies: Vec<String>,
    fingerprints: Vec<FingerprintRequirement>,
    options: Vec<OptionSpec>,
    compatible_packages: Vec<String>,
    execute: Option<Execute>,
}

impl PatchDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn depends_on(mut self, patch: impl Into<String>) -> Self {
        self.dependencies.push(patch.into());
        self
    }

    pub fn fingerprint(self, fingerprint: Fingerprint, uniqueness: Uniqueness) -> Self {
        self.require(FingerprintRequirement {
            fingerprint,
            uniqueness,
            optional: false,
        })
    }

    /// A fingerprint whose absence does not fail the patch.
    pub fn optional_fingerprint(self, fingerprint: Fingerprint) -> Self {
        self.require(FingerprintRequirement {
            fingerprint,
            uniqueness: Uniqueness::Required,
            optional: true,
        })
    }

    pub(crate) fn require(mut self, requirement: FingerprintRequirement) -> Self {
        self.fingerprints.push(requirement);
        self
    }

    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    /// Restrict the patch to a package. With no restriction it applies
    /// to any app.
    pub fn compatible_with(mut self, package: impl Into<String>) -> Self {
        self.compatible_packages.push(package.into());
        self
    }

    pub fn execute<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut PatchContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.execute = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn fingerprints(&self) -> &[FingerprintRequirement] {
        &self.fingerprints
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn compatible_packages(&self) -> &[String] {
        &self.compatible_packages
    }

    pub fn is_compatible_with(&self, package: &str) -> bool {
        self.compatible_packages.is_empty() || self.compatible_packages.iter().any(|p| p == package)
    }

    pub(crate) fn executor(&self) -> Option<&Execute> {
        self.execute.as_ref()
    }
}

impl fmt::Debug for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field(
                "fingerprints",
                &self
                    .fingerprints
                    .iter()
                    .map(|r| r.fingerprint.name())
                    .collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .field("compatible_packages", &self.compatible_packages)
            .field("execute", &self.execute.is_some())
            .finish()
    }
}
