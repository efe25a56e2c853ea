//! Locates methods by fingerprint and applies ordered patches to them.
//!
//! A [`PatchSession`] owns the [`MethodPool`](dexpatch_pool::MethodPool).
//! Each registered [`PatchDescriptor`] declares the fingerprints it needs;
//! the session resolves those through a memoizing [`Scanner`] and then
//! hands the patch a [`PatchContext`] to splice with.

pub mod context;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod manifest;
pub mod matcher;
pub mod options;
pub mod patch;
pub mod scanner;
pub mod session;
pub mod transform;

pub use context::{AppContext, AppVersion, PatchContext};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintDef, PatternElement, TypePattern};
pub use graph::DependencyGraph;
pub use manifest::Manifest;
pub use matcher::{MatchDetails, PatternMatch, match_method, matches};
pub use options::{OptionKind, OptionSpec, OptionValue, OptionValues, ResolvedOptions};
pub use patch::{Execute, FingerprintRequirement, PatchDescriptor};
pub use scanner::{Request, ScanResult, Scanner, Scope, Uniqueness, scan};
pub use session::{PatchSession, RunReport};
pub use transform::transform_strings;
