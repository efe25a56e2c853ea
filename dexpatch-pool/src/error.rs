use dexpatch_isa::{AsmError, OperandError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{method}: register v{register} is outside the {registers}-register window")]
    RegisterOverflow {
        method: String,
        register: u16,
        registers: u16,
    },

    #[error("{method}: no free register with {reserved} reserved slots")]
    NoFreeRegister { method: String, reserved: u16 },

    #[error("{method}: invalid operand: {reason}")]
    InvalidOperand { method: String, reason: String },

    #[error("{method}: index {index} out of bounds ({len} instructions)")]
    IndexOutOfBounds {
        method: String,
        index: usize,
        len: usize,
    },

    #[error("{method}: label :{label} would point past the end of the body")]
    DanglingLabel { method: String, label: String },

    #[error("{method}: label :{label} is already bound")]
    LabelConflict { method: String, label: String },

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Duplicate class: {0}")]
    DuplicateClass(String),

    #[error("Method key from generation {key} used against pool generation {pool}")]
    StaleKey { key: u64, pool: u64 },

    #[error("Unknown access flag: {0:?}")]
    UnknownAccessFlag(String),

    #[error(transparent)]
    Asm(#[from] AsmError),

    #[error(transparent)]
    Operand(#[from] OperandError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
