//! Fingerprint resolution with memoized results.

use std::collections::{BTreeSet, HashMap};

use dexpatch_pool::{MethodKey, MethodPool};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, FingerprintKey};
use crate::matcher::{MatchDetails, PatternMatch, match_method};

/// Whether a resolve call insists on exactly one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Uniqueness {
    /// Zero candidates is `NotFound`, more than one is `Ambiguous`.
    #[default]
    Required,
    /// The first candidate in pool order wins.
    First,
}

/// The part of the pool a resolve call looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    #[default]
    Pool,
    Class(String),
    Classes(BTreeSet<String>),
}

impl Scope {
    pub fn class(descriptor: impl Into<String>) -> Self {
        Scope::Class(descriptor.into())
    }

    /// The class that defines `result`'s method.
    pub fn class_of(result: &ScanResult) -> Self {
        Scope::Class(result.class.clone())
    }

    /// The resolved method's class plus every class its instructions
    /// reference (invoke owners, field owners, type operands).
    pub fn neighborhood(pool: &MethodPool, result: &ScanResult) -> Result<Self> {
        let method = pool.method(result.method)?;
        let mut classes = BTreeSet::from([result.class.clone()]);
        for insn in method.body() {
            if let Some(class) = insn.referenced_class() {
                let element = class.trim_start_matches('[');
                if element.starts_with('L') {
                    classes.insert(element.to_string());
                }
            }
        }
        Ok(Scope::Classes(classes))
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        match self {
            Scope::Pool => true,
            Scope::Class(c) => c == descriptor,
            Scope::Classes(set) => set.contains(descriptor),
        }
    }
}

/// A fingerprint bound to the method it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanResult {
    pub fingerprint: String,
    pub method: MethodKey,
    /// Descriptor of the defining class.
    pub class: String,
    /// `Lcls;->name(params)ret` of the resolved method.
    pub signature: String,
    pub details: MatchDetails,
    generation: u64,
    revision: u64,
}

impl ScanResult {
    pub fn pattern(&self) -> Option<PatternMatch> {
        self.details.pattern
    }

    pub fn pattern_start(&self) -> Option<usize> {
        self.details.pattern.map(|p| p.start)
    }

    pub fn pattern_end(&self) -> Option<usize> {
        self.details.pattern.map(|p| p.end)
    }

    /// Index of the first `const-string` loading `s`, if `s` was part of
    /// the fingerprint.
    pub fn string_index(&self, s: &str) -> Option<usize> {
        self.details
            .strings
            .iter()
            .find(|m| m.string == s)
            .map(|m| m.index)
    }

    pub fn literal_index(&self, value: i64) -> Option<usize> {
        self.details
            .literals
            .iter()
            .find(|m| m.value == value)
            .map(|m| m.index)
    }

    /// Whether this result still describes `pool`: the pool has the same
    /// shape and no edit since the scan touched the matched window or
    /// anything before it.
    pub fn is_current(&self, pool: &MethodPool) -> bool {
        if pool.generation() != self.generation {
            return false;
        }
        let Ok(method) = pool.method(self.method) else {
            return false;
        };
        let anchor = self.details.anchor_end().unwrap_or(usize::MAX);
        !method.edited_up_to(self.revision, anchor)
    }
}

/// Scan `scope` of `pool` for `fingerprint` without caching.
pub fn scan(
    pool: &MethodPool,
    fingerprint: &Fingerprint,
    scope: &Scope,
    uniqueness: Uniqueness,
) -> Result<ScanResult> {
    let mut candidates = pool
        .methods()
        .filter(|(_, class, _)| scope.contains(class.descriptor()))
        .filter_map(|(key, class, method)| {
            match_method(fingerprint, method, class).map(|details| (key, class, method, details))
        });

    let (key, class, method, details) = candidates.next().ok_or_else(|| Error::NotFound {
        fingerprint: fingerprint.name().to_string(),
    })?;
    if uniqueness == Uniqueness::Required {
        let others: Vec<String> = candidates.map(|(_, _, m, _)| m.signature()).collect();
        if !others.is_empty() {
            let mut all = vec![method.signature()];
            all.extend(others);
            return Err(Error::Ambiguous {
                fingerprint: fingerprint.name().to_string(),
                candidates: all,
            });
        }
    }
    Ok(ScanResult {
        fingerprint: fingerprint.name().to_string(),
        method: key,
        class: class.descriptor().to_string(),
        signature: method.signature(),
        details,
        generation: pool.generation(),
        revision: method.revision(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: FingerprintKey,
    scope: Scope,
    uniqueness: Uniqueness,
}

/// One request for [`Scanner::resolve_many`].
#[derive(Debug, Clone)]
pub struct Request<'f> {
    pub fingerprint: &'f Fingerprint,
    pub scope: Scope,
    pub uniqueness: Uniqueness,
}

impl<'f> Request<'f> {
    pub fn new(fingerprint: &'f Fingerprint, uniqueness: Uniqueness) -> Self {
        Self {
            fingerprint,
            scope: Scope::Pool,
            uniqueness,
        }
    }

    fn key(&self) -> CacheKey {
        CacheKey {
            fingerprint: self.fingerprint.key(),
            scope: self.scope.clone(),
            uniqueness: self.uniqueness,
        }
    }
}

/// Memoizes scan results for one session.
///
/// A cached result is returned as long as it is
/// [current](ScanResult::is_current); otherwise the fingerprint is
/// rescanned.
#[derive(Debug, Default)]
pub struct Scanner {
    cache: HashMap<CacheKey, ScanResult>,
    scans: usize,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of real pool scans performed, cache hits excluded.
    pub fn scans(&self) -> usize {
        self.scans
    }

    pub fn resolve(
        &mut self,
        pool: &MethodPool,
        fingerprint: &Fingerprint,
        scope: &Scope,
        uniqueness: Uniqueness,
    ) -> Result<ScanResult> {
        let request = Request {
            fingerprint,
            scope: scope.clone(),
            uniqueness,
        };
        if let Some(hit) = self.current(pool, &request) {
            return Ok(hit.clone());
        }
        self.scans += 1;
        let result = scan(pool, fingerprint, scope, uniqueness)?;
        log::debug!(
            "{} resolved to {} {:?}",
            fingerprint.name(),
            result.signature,
            result.details.pattern
        );
        self.cache.insert(request.key(), result.clone());
        Ok(result)
    }

    /// Like [`resolve`](Self::resolve), but a fingerprint that matches
    /// nothing is `Ok(None)`. Ambiguity is still an error.
    pub fn try_resolve(
        &mut self,
        pool: &MethodPool,
        fingerprint: &Fingerprint,
        scope: &Scope,
        uniqueness: Uniqueness,
    ) -> Result<Option<ScanResult>> {
        match self.resolve(pool, fingerprint, scope, uniqueness) {
            Ok(result) => Ok(Some(result)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve independent requests, scanning the uncached ones in
    /// parallel. Results come back in request order.
    pub fn resolve_many(&mut self, pool: &MethodPool, requests: &[Request<'_>]) -> Vec<Result<ScanResult>> {
        let pending: Vec<usize> = requests
            .iter()
            .enumerate()
            .filter(|(_, r)| self.current(pool, r).is_none())
            .map(|(i, _)| i)
            .collect();

        let scanned: Vec<(usize, Result<ScanResult>)> = pending
            .par_iter()
            .map(|&i| {
                let r = &requests[i];
                (i, scan(pool, r.fingerprint, &r.scope, r.uniqueness))
            })
            .collect();
        self.scans += scanned.len();

        let mut fresh: HashMap<usize, Result<ScanResult>> = HashMap::new();
        for (i, result) in scanned {
            if let Ok(found) = &result {
                self.cache.insert(requests[i].key(), found.clone());
            }
            fresh.insert(i, result);
        }

        requests
            .iter()
            .enumerate()
            .map(|(i, r)| match fresh.remove(&i) {
                Some(result) => result,
                None => self.current(pool, r).cloned().ok_or_else(|| Error::NotFound {
                    fingerprint: r.fingerprint.name().to_string(),
                }),
            })
            .collect()
    }

    /// Drop every cached result for the named fingerprint.
    pub fn invalidate(&mut self, fingerprint: &str) {
        self.cache.retain(|k, _| k.fingerprint.name != fingerprint);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn current(&self, pool: &MethodPool, request: &Request<'_>) -> Option<&ScanResult> {
        self.cache
            .get(&request.key())
            .filter(|result| result.is_current(pool))
    }
}
