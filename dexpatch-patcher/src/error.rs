use thiserror::Error;

use crate::options::OptionKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Fingerprint {fingerprint} matched no method")]
    NotFound { fingerprint: String },

    #[error("Fingerprint {fingerprint} matched {} methods: {}", candidates.len(), candidates.join(", "))]
    Ambiguous {
        fingerprint: String,
        candidates: Vec<String>,
    },

    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Patch {patch} depends on unknown patch {dependency}")]
    UnknownDependency { patch: String, dependency: String },

    #[error("Duplicate patch: {0}")]
    DuplicatePatch(String),

    #[error("Unknown patch: {0}")]
    UnknownPatch(String),

    #[error("Patch {patch} is not compatible with {package}")]
    Incompatible { patch: String, package: String },

    #[error("Patch {patch}: missing required option {key}")]
    MissingOption { patch: String, key: String },

    #[error("Patch {patch}: option {key} expects a {expected} value")]
    OptionTypeMismatch {
        patch: String,
        key: String,
        expected: OptionKind,
    },

    #[error("Patch {patch}: no option named {key}")]
    OptionNotFound { patch: String, key: String },

    #[error("Fingerprint {0} is not declared by this patch")]
    UnknownFingerprint(String),

    #[error("Fingerprint {fingerprint}: {reason}")]
    Anchor { fingerprint: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Pool(#[from] dexpatch_pool::Error),

    #[error("Patch {patch} failed: {source}")]
    Patch {
        patch: String,
        #[source]
        source: Box<Error>,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// The innermost error, looking through [`Error::Patch`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Patch { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
