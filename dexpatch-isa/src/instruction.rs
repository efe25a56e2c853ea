use std::fmt;

use crate::opcode::{Format, MAX_INVOKE_LIST, MAX_INVOKE_RANGE, Opcode, OperandKind, Registers};
use crate::reference::{FieldRef, MethodRef, is_field_type, is_reference_type};

/// A named branch target. Labels are bound to instruction indices by the
/// owning method body, so inserting code never rewrites branch operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

/// The non-register operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    None,
    Literal(i64),
    String(String),
    /// Type descriptor.
    Type(String),
    Field(FieldRef),
    Method(MethodRef),
    Label(Label),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Literal(_) => OperandKind::Literal,
            Operand::String(_) => OperandKind::String,
            Operand::Type(_) => OperandKind::Type,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
            Operand::Label(_) => OperandKind::Label,
        }
    }
}

/// Errors from [`Instruction::new`] and reference parsing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OperandError {
    #[error("{opcode} takes {expected} registers, got {found}")]
    RegisterCount {
        opcode: Opcode,
        expected: String,
        found: usize,
    },
    #[error("{opcode}: register v{register} does not fit in {bits} bits")]
    RegisterTooWide {
        opcode: Opcode,
        register: u16,
        bits: u32,
    },
    #[error("{opcode}: register range is not contiguous")]
    NonContiguousRange { opcode: Opcode },
    #[error("{opcode} expects {expected}, got {found}")]
    WrongOperand {
        opcode: Opcode,
        expected: OperandKind,
        found: OperandKind,
    },
    #[error("{opcode}: literal {value:#x} out of range")]
    LiteralOutOfRange { opcode: Opcode, value: i64 },
    #[error("invalid type descriptor {0:?}")]
    InvalidDescriptor(String),
    #[error("invalid reference {0:?}")]
    InvalidReference(String),
    #[error("empty label name")]
    EmptyLabel,
}

/// A decoded instruction. Immutable once built: edits produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    opcode: Opcode,
    registers: Vec<u16>,
    operand: Operand,
}

impl Instruction {
    /// Build an instruction, validating registers and operand against the
    /// opcode's [`Format`].
    ///
    /// Range invokes take the expanded register list (`{v2 .. v4}` is
    /// `[2, 3, 4]`).
    pub fn new(
        opcode: Opcode,
        registers: Vec<u16>,
        operand: Operand,
    ) -> Result<Self, OperandError> {
        let format = opcode.format();
        check_registers(opcode, format, &registers)?;
        check_operand(opcode, format, &operand)?;
        Ok(Self {
            opcode,
            registers,
            operand,
        })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn registers(&self) -> &[u16] {
        &self.registers
    }

    /// First register operand (`vA`/`vAA`, or `vC` of an invoke).
    pub fn register_a(&self) -> Option<u16> {
        self.registers.first().copied()
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn literal(&self) -> Option<i64> {
        match self.operand {
            Operand::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match &self.operand {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_descriptor(&self) -> Option<&str> {
        match &self.operand {
            Operand::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(r) => Some(r),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(r) => Some(r),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match &self.operand {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }

    /// A copy of this branch with its target replaced.
    pub fn with_label(&self, label: Label) -> Result<Self, OperandError> {
        Self::new(self.opcode, self.registers.clone(), Operand::Label(label))
    }

    /// A copy of this instruction with a different string constant.
    pub fn with_string(&self, s: impl Into<String>) -> Result<Self, OperandError> {
        Self::new(self.opcode, self.registers.clone(), Operand::String(s.into()))
    }

    /// The type this instruction references, if any: the owner class of a
    /// method or field reference, or a type operand.
    pub fn referenced_class(&self) -> Option<&str> {
        match &self.operand {
            Operand::Method(m) => Some(&m.class),
            Operand::Field(f) => Some(&f.class),
            Operand::Type(t) => Some(t),
            _ => None,
        }
    }
}

fn check_registers(opcode: Opcode, format: Format, regs: &[u16]) -> Result<(), OperandError> {
    match format.registers() {
        Registers::Fixed(n) if regs.len() != n => {
            return Err(OperandError::RegisterCount {
                opcode,
                expected: n.to_string(),
                found: regs.len(),
            });
        }
        Registers::List if regs.len() > MAX_INVOKE_LIST => {
            return Err(OperandError::RegisterCount {
                opcode,
                expected: format!("at most {MAX_INVOKE_LIST}"),
                found: regs.len(),
            });
        }
        Registers::Range => {
            if regs.len() > MAX_INVOKE_RANGE {
                return Err(OperandError::RegisterCount {
                    opcode,
                    expected: format!("at most {MAX_INVOKE_RANGE}"),
                    found: regs.len(),
                });
            }
            if regs.windows(2).any(|w| w[0].checked_add(1) != Some(w[1])) {
                return Err(OperandError::NonContiguousRange { opcode });
            }
        }
        _ => {}
    }
    for (i, &r) in regs.iter().enumerate() {
        let bits = format.register_bits(i);
        if bits < 16 && u32::from(r) >= (1u32 << bits) {
            return Err(OperandError::RegisterTooWide {
                opcode,
                register: r,
                bits,
            });
        }
    }
    Ok(())
}

fn check_operand(opcode: Opcode, format: Format, operand: &Operand) -> Result<(), OperandError> {
    let expected = format.operand();
    if operand.kind() != expected {
        return Err(OperandError::WrongOperand {
            opcode,
            expected,
            found: operand.kind(),
        });
    }
    match operand {
        Operand::Literal(v) if !format.accepts_literal(*v) => {
            Err(OperandError::LiteralOutOfRange { opcode, value: *v })
        }
        Operand::Type(t) => {
            let ok = match opcode {
                Opcode::NewArray => t.starts_with('[') && is_field_type(t),
                Opcode::NewInstance => t.starts_with('L') && is_field_type(t),
                _ => is_reference_type(t),
            };
            if ok {
                Ok(())
            } else {
                Err(OperandError::InvalidDescriptor(t.clone()))
            }
        }
        Operand::Label(l) if l.0.is_empty() => Err(OperandError::EmptyLabel),
        _ => Ok(()),
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn write_literal(f: &mut fmt::Formatter<'_>, v: i64) -> fmt::Result {
    if v < 0 {
        write!(f, "-{:#x}", v.unsigned_abs())
    } else {
        write!(f, "{v:#x}")
    }
}

/// Disassembles to the syntax accepted by [`crate::assemble`].
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let mut sep = " ";
        match self.opcode.format().registers() {
            Registers::List => {
                let regs: Vec<String> = self.registers.iter().map(|r| format!("v{r}")).collect();
                write!(f, " {{{}}}", regs.join(", "))?;
                sep = ", ";
            }
            Registers::Range => {
                match (self.registers.first(), self.registers.last()) {
                    (Some(a), Some(b)) => write!(f, " {{v{a} .. v{b}}}")?,
                    _ => write!(f, " {{}}")?,
                }
                sep = ", ";
            }
            Registers::Fixed(_) => {
                for r in &self.registers {
                    write!(f, "{sep}v{r}")?;
                    sep = ", ";
                }
            }
        }
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Literal(v) => {
                f.write_str(sep)?;
                write_literal(f, *v)
            }
            Operand::String(s) => write!(f, "{sep}\"{}\"", escape_string(s)),
            Operand::Type(t) => write!(f, "{sep}{t}"),
            Operand::Field(r) => write!(f, "{sep}{r}"),
            Operand::Method(r) => write!(f, "{sep}{r}"),
            Operand::Label(l) => write!(f, "{sep}{l}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const4_literal_bounds() {
        assert!(Instruction::new(Opcode::Const4, vec![0], Operand::Literal(7)).is_ok());
        assert!(Instruction::new(Opcode::Const4, vec![0], Operand::Literal(-8)).is_ok());
        let err = Instruction::new(Opcode::Const4, vec![0], Operand::Literal(8)).unwrap_err();
        assert!(matches!(err, OperandError::LiteralOutOfRange { value: 8, .. }));
    }

    #[test]
    fn high16_requires_clear_low_bits() {
        assert!(Instruction::new(Opcode::ConstHigh16, vec![1], Operand::Literal(0x7f0b_0000)).is_ok());
        assert!(Instruction::new(Opcode::ConstHigh16, vec![1], Operand::Literal(0x7f0b_0001)).is_err());
    }

    #[test]
    fn four_bit_register_slots() {
        let f = FieldRef::parse("La;->b:I").unwrap();
        let err = Instruction::new(Opcode::Iget, vec![16, 0], Operand::Field(f)).unwrap_err();
        assert!(matches!(err, OperandError::RegisterTooWide { register: 16, bits: 4, .. }));
    }

    #[test]
    fn range_must_be_contiguous() {
        let m = MethodRef::parse("La;->b(III)V").unwrap();
        let ok = Instruction::new(Opcode::InvokeStaticRange, vec![3, 4, 5], Operand::Method(m.clone()));
        assert!(ok.is_ok());
        let err = Instruction::new(Opcode::InvokeStaticRange, vec![3, 5], Operand::Method(m));
        assert!(matches!(err, Err(OperandError::NonContiguousRange { .. })));
    }

    #[test]
    fn display_negative_literal() {
        let insn = Instruction::new(Opcode::Const16, vec![2], Operand::Literal(-300)).unwrap();
        assert_eq!(insn.to_string(), "const/16 v2, -0x12c");
    }
}
