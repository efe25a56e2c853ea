//! Dalvik ISA definitions used by the patching engine.
//!
//! This crate provides the opcode table, operand formats, immutable
//! [`Instruction`] values, method/field references, and a text assembler
//! for the subset of smali syntax that patches splice into method bodies.

pub use bitflags;

pub mod assembler;
pub mod instruction;
pub mod opcode;
pub mod reference;

pub use assembler::{AsmError, AsmErrorKind, AsmItem, RegisterMap, assemble, assemble_one};
pub use instruction::{Instruction, Label, Operand, OperandError};
pub use opcode::{Format, Opcode, OpcodeFlags, OperandKind, Registers};
pub use reference::{
    FieldRef, MethodRef, is_field_type, is_reference_type, is_return_type, is_wide_type,
    parse_type_list,
};
