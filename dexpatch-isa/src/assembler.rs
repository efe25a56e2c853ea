//! Assembler for the smali subset that patches splice into methods.
//!
//! ```
//! use dexpatch_isa::{assemble, AsmItem, RegisterMap};
//!
//! let items = assemble(
//!     r#"
//!     invoke-static {}, Lapp/Codec;->useOpus()Z
//!     move-result v0
//!     if-eqz v0, :mp4a
//!     "#,
//!     &RegisterMap::new(),
//! )?;
//! assert_eq!(items.len(), 3);
//! # Ok::<(), dexpatch_isa::AsmError>(())
//! ```

use crate::instruction::{Instruction, Label, Operand, OperandError};
use crate::opcode::Opcode;
use crate::reference::{FieldRef, MethodRef, is_field_type};

/// Maps parameter registers (`pN`) onto the method's register window.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterMap {
    param_base: Option<u16>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pN` becomes `v(base + N)`. For a method with `registers` total and
    /// `ins` parameter registers, `base = registers - ins`.
    pub fn with_param_base(base: u16) -> Self {
        Self {
            param_base: Some(base),
        }
    }

    fn resolve(&self, line: usize, text: &str) -> Result<u16, AsmError> {
        let (param, digits) = match text.as_bytes().first() {
            Some(b'v') => (false, &text[1..]),
            Some(b'p') => (true, &text[1..]),
            _ => return Err(AsmError::syntax(line, format!("expected register, got {text:?}"))),
        };
        let n: u16 = digits
            .parse()
            .map_err(|_| AsmError::syntax(line, format!("bad register {text:?}")))?;
        if !param {
            return Ok(n);
        }
        let base = self.param_base.ok_or(AsmError {
            line,
            kind: AsmErrorKind::ParamWithoutBase(n),
        })?;
        base.checked_add(n)
            .ok_or_else(|| AsmError::syntax(line, format!("register {text} overflows")))
    }
}

/// One assembled line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmItem {
    /// `:name` binds a label to the next instruction.
    Label(Label),
    Instruction(Instruction),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsmErrorKind {
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),
    #[error("{0}")]
    Syntax(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("p{0} used without a parameter base")]
    ParamWithoutBase(u16),
    #[error(transparent)]
    Operand(#[from] OperandError),
}

/// Errors from [`assemble`], tagged with the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct AsmError {
    pub line: usize,
    pub kind: AsmErrorKind,
}

impl AsmError {
    fn syntax(line: usize, msg: impl Into<String>) -> Self {
        Self {
            line,
            kind: AsmErrorKind::Syntax(msg.into()),
        }
    }
}

/// Assemble a multi-line snippet. Blank lines and `#` comments are skipped.
pub fn assemble(src: &str, regs: &RegisterMap) -> Result<Vec<AsmItem>, AsmError> {
    let mut items = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let line = i + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        if let Some(name) = text.strip_prefix(':') {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(AsmError::syntax(line, format!("bad label {text:?}")));
            }
            items.push(AsmItem::Label(Label::new(name)));
            continue;
        }
        items.push(AsmItem::Instruction(parse_instruction(line, text, regs)?));
    }
    Ok(items)
}

/// Assemble exactly one instruction.
pub fn assemble_one(src: &str, regs: &RegisterMap) -> Result<Instruction, AsmError> {
    let mut items = assemble(src, regs)?;
    match (items.pop(), items.is_empty()) {
        (Some(AsmItem::Instruction(insn)), true) => Ok(insn),
        _ => Err(AsmError::syntax(1, "expected exactly one instruction")),
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            '#' if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split on top-level commas, keeping quoted strings and `{...}` intact.
fn split_fields(line: usize, s: &str) -> Result<Vec<&str>, AsmError> {
    let mut fields = Vec::new();
    let (mut depth, mut in_str, mut escaped, mut start) = (0u32, false, false, 0usize);
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            '{' if !in_str => depth += 1,
            '}' if !in_str => depth = depth.saturating_sub(1),
            ',' if !in_str && depth == 0 => {
                fields.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_str {
        return Err(AsmError {
            line,
            kind: AsmErrorKind::UnterminatedString,
        });
    }
    let last = s[start..].trim();
    if !last.is_empty() || !fields.is_empty() {
        fields.push(last);
    }
    Ok(fields)
}

fn parse_instruction(line: usize, text: &str, regs: &RegisterMap) -> Result<Instruction, AsmError> {
    let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
        Some((m, r)) => (m, r.trim()),
        None => (text, ""),
    };
    let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AsmError {
        line,
        kind: AsmErrorKind::UnknownMnemonic(mnemonic.to_string()),
    })?;

    let mut registers = Vec::new();
    let mut operand = Operand::None;
    for field in split_fields(line, rest)? {
        if field.is_empty() {
            return Err(AsmError::syntax(line, "empty operand"));
        }
        if let Some(list) = field.strip_prefix('{') {
            let list = list
                .strip_suffix('}')
                .ok_or_else(|| AsmError::syntax(line, "unterminated register list"))?;
            registers.extend(parse_register_list(line, list, regs)?);
            continue;
        }
        if is_register(field) {
            registers.push(regs.resolve(line, field)?);
            continue;
        }
        if !matches!(operand, Operand::None) {
            return Err(AsmError::syntax(line, format!("unexpected operand {field:?}")));
        }
        operand = parse_operand(line, field)?;
    }

    Instruction::new(opcode, registers, operand).map_err(|e| AsmError {
        line,
        kind: e.into(),
    })
}

fn is_register(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some('v' | 'p'))
        && field.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

fn parse_register_list(line: usize, list: &str, regs: &RegisterMap) -> Result<Vec<u16>, AsmError> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    if let Some((a, b)) = list.split_once("..") {
        let start = regs.resolve(line, a.trim())?;
        let end = regs.resolve(line, b.trim())?;
        if end < start {
            return Err(AsmError::syntax(line, "register range runs backwards"));
        }
        return Ok((start..=end).collect());
    }
    list.split(',')
        .map(|r| regs.resolve(line, r.trim()))
        .collect()
}

fn parse_operand(line: usize, field: &str) -> Result<Operand, AsmError> {
    let op_err = |e: OperandError| AsmError {
        line,
        kind: e.into(),
    };
    if let Some(body) = field.strip_prefix('"') {
        let body = body.strip_suffix('"').ok_or(AsmError {
            line,
            kind: AsmErrorKind::UnterminatedString,
        })?;
        return Ok(Operand::String(unescape(line, body)?));
    }
    if let Some(name) = field.strip_prefix(':') {
        return Ok(Operand::Label(Label::new(name)));
    }
    if field.contains("->") {
        return if field.contains('(') {
            MethodRef::parse(field).map(Operand::Method).map_err(op_err)
        } else {
            FieldRef::parse(field).map(Operand::Field).map_err(op_err)
        };
    }
    if field.starts_with('L') || field.starts_with('[') {
        if !is_field_type(field) {
            return Err(op_err(OperandError::InvalidDescriptor(field.to_string())));
        }
        return Ok(Operand::Type(field.to_string()));
    }
    parse_literal(field)
        .map(Operand::Literal)
        .ok_or_else(|| AsmError::syntax(line, format!("bad literal {field:?}")))
}

fn parse_literal(s: &str) -> Option<i64> {
    // smali width suffixes: 1t (byte), 1s (short), 1L (long)
    let s = s
        .strip_suffix(['L', 'l', 't', 's'])
        .filter(|rest| !rest.is_empty())
        .unwrap_or(s);
    let (neg, digits) = match s.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, s),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u64>().ok()?,
    };
    if neg {
        if magnitude == 1u64 << 63 {
            Some(i64::MIN)
        } else {
            i64::try_from(magnitude).ok().map(|m| -m)
        }
    } else {
        // hex literals may spell a negative 64-bit value bit-for-bit
        Some(magnitude as i64)
    }
}

fn unescape(line: usize, s: &str) -> Result<String, AsmError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let ch = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| AsmError::syntax(line, format!("bad escape \\u{hex}")))?;
                out.push(ch);
            }
            other => {
                return Err(AsmError::syntax(line, format!("bad escape {other:?}")));
            }
        }
    }
    Ok(out)
}
