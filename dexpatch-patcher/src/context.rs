//! What a patch sees while it runs.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use dexpatch_isa::MethodRef;
use dexpatch_pool::{ClassDef, Method, MethodKey, MethodPool, Splicer};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::options::ResolvedOptions;
use crate::patch::FingerprintRequirement;
use crate::scanner::{ScanResult, Scanner, Scope, Uniqueness};

/// A dotted numeric version such as `19.16.39`. Missing trailing
/// components compare as zero.
#[derive(Debug, Clone, Eq)]
pub struct AppVersion(Vec<u32>);

impl AppVersion {
    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    pub fn is_at_least(&self, other: &AppVersion) -> bool {
        self >= other
    }
}

impl FromStr for AppVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Config(format!("bad version {s:?}")))?;
        Ok(Self(parts))
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0);
                let b = other.0.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// The application being patched. Replaces process-wide version gates:
/// patches ask this value instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppContext {
    pub package: String,
    pub version: Option<AppVersion>,
    pub flags: BTreeSet<String>,
}

impl AppContext {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Result<Self> {
        self.version = Some(version.parse()?);
        Ok(self)
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// `false` when the app version is unknown.
    pub fn is_at_least(&self, version: &str) -> Result<bool> {
        let wanted: AppVersion = version.parse()?;
        Ok(self.version.as_ref().is_some_and(|v| v.is_at_least(&wanted)))
    }
}

/// Handed to a patch's execute closure.
///
/// Declared fingerprints were resolved before the closure runs; asking for
/// one again returns the cached result unless an edit made it stale, in
/// which case it is rescanned.
pub struct PatchContext<'s> {
    patch: &'s str,
    pool: &'s mut MethodPool,
    scanner: &'s mut Scanner,
    app: &'s AppContext,
    options: &'s ResolvedOptions,
    requirements: &'s [FingerprintRequirement],
}

impl<'s> PatchContext<'s> {
    pub(crate) fn new(
        patch: &'s str,
        pool: &'s mut MethodPool,
        scanner: &'s mut Scanner,
        app: &'s AppContext,
        options: &'s ResolvedOptions,
        requirements: &'s [FingerprintRequirement],
    ) -> Self {
        Self {
            patch,
            pool,
            scanner,
            app,
            options,
            requirements,
        }
    }

    pub fn patch_name(&self) -> &str {
        self.patch
    }

    pub fn app(&self) -> &AppContext {
        self.app
    }

    pub fn pool(&self) -> &MethodPool {
        &*self.pool
    }

    /// Shape changes (new classes or methods) go through here.
    pub fn pool_mut(&mut self) -> &mut MethodPool {
        &mut *self.pool
    }

    /// The result of a fingerprint this patch declared.
    pub fn result(&mut self, fingerprint: &str) -> Result<ScanResult> {
        self.optional_result(fingerprint)?.ok_or_else(|| Error::NotFound {
            fingerprint: fingerprint.to_string(),
        })
    }

    /// Like [`result`](Self::result), `None` when an optional fingerprint
    /// matched nothing. A required fingerprint that no longer matches,
    /// say after an earlier edit, is still [`Error::NotFound`].
    pub fn optional_result(&mut self, fingerprint: &str) -> Result<Option<ScanResult>> {
        let requirement = self
            .requirements
            .iter()
            .find(|r| r.fingerprint.name() == fingerprint)
            .ok_or_else(|| Error::UnknownFingerprint(fingerprint.to_string()))?;
        let pool = &*self.pool;
        let (fingerprint, uniqueness) = (&requirement.fingerprint, requirement.uniqueness);
        if requirement.optional {
            self.scanner.try_resolve(pool, fingerprint, &Scope::Pool, uniqueness)
        } else {
            self.scanner
                .resolve(pool, fingerprint, &Scope::Pool, uniqueness)
                .map(Some)
        }
    }

    /// Resolve a fingerprint the patch did not declare, typically within
    /// the scope of an earlier result.
    pub fn resolve_in(
        &mut self,
        fingerprint: &Fingerprint,
        scope: &Scope,
        uniqueness: Uniqueness,
    ) -> Result<ScanResult> {
        self.scanner.resolve(&*self.pool, fingerprint, scope, uniqueness)
    }

    pub fn try_resolve_in(
        &mut self,
        fingerprint: &Fingerprint,
        scope: &Scope,
        uniqueness: Uniqueness,
    ) -> Result<Option<ScanResult>> {
        self.scanner.try_resolve(&*self.pool, fingerprint, scope, uniqueness)
    }

    pub fn neighborhood(&self, result: &ScanResult) -> Result<Scope> {
        Scope::neighborhood(&*self.pool, result)
    }

    pub fn method(&self, result: &ScanResult) -> Result<&Method> {
        Ok(self.pool.method(result.method)?)
    }

    pub fn class(&self, result: &ScanResult) -> Result<&ClassDef> {
        Ok(self.pool.class_of(result.method)?)
    }

    /// Resolve an invoke target to a method defined in the pool.
    pub fn find_method(&self, target: &MethodRef) -> Option<MethodKey> {
        self.pool.find_method(target)
    }

    pub fn splicer(&mut self, result: &ScanResult) -> Result<Splicer<'_>> {
        self.splicer_for(result.method)
    }

    pub fn splicer_for(&mut self, key: MethodKey) -> Result<Splicer<'_>> {
        Ok(self.pool.splicer(key)?)
    }

    pub fn option_bool(&self, key: &str) -> Result<bool> {
        self.options.bool(key)
    }

    pub fn option_str(&self, key: &str) -> Result<Option<&str>> {
        self.options.string(key)
    }

    pub fn options(&self) -> &ResolvedOptions {
        self.options
    }

    /// See [`crate::transform::transform_strings`].
    pub fn transform_strings<F>(&mut self, f: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String> + Send + Sync,
    {
        crate::transform::transform_strings(&mut *self.pool, f)
    }
}
