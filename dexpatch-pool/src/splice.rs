//! The only mutation path for method bodies.
//!
//! Every edit is validated in full before the body is touched, so a
//! rejected edit leaves the method unchanged. There is no rollback across
//! edits: a patch that fails halfway leaves its earlier edits in place.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use dexpatch_isa::{
    AsmItem, Instruction, Label, Opcode, Operand, assemble, assemble_one, is_wide_type,
};

use crate::error::{Error, Result};
use crate::method::Method;
use crate::stream::InstructionStream;

/// An existing label a snippet may branch to: `name` is bound to the
/// instruction at `index` in the body before the snippet is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLabel {
    pub name: String,
    pub index: usize,
}

impl ExternalLabel {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// Exclusive edit access to one method body.
pub struct Splicer<'m> {
    method: &'m mut Method,
}

impl<'m> Splicer<'m> {
    pub fn new(method: &'m mut Method) -> Self {
        Self { method }
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn len(&self) -> usize {
        self.method.body().len()
    }

    pub fn is_empty(&self) -> bool {
        self.method.body().is_empty()
    }

    /// Insert `insns` before `index` (`index == len` appends). Labels bound
    /// at or after `index` shift with the instructions they name.
    pub fn insert(&mut self, index: usize, insns: Vec<Instruction>) -> Result<()> {
        self.check_position(index)?;
        for insn in &insns {
            self.check_registers(insn)?;
            self.check_label(insn, &HashSet::new())?;
        }
        self.apply_insert(index, insns, Vec::new());
        Ok(())
    }

    /// Assemble `src` against this method's register window and insert it.
    pub fn insert_asm(&mut self, index: usize, src: &str) -> Result<()> {
        self.insert_asm_with_labels(index, src, &[])
    }

    /// Like [`insert_asm`](Self::insert_asm), with labels the snippet
    /// defines made unique in the method and `external` labels bound to
    /// existing instructions.
    pub fn insert_asm_with_labels(
        &mut self,
        index: usize,
        src: &str,
        external: &[ExternalLabel],
    ) -> Result<()> {
        self.check_position(index)?;
        let items = self.assemble(src)?;

        let mut taken: HashSet<String> = self
            .method
            .body()
            .labels()
            .map(|(name, _)| name.to_string())
            .collect();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        let mut bindings: Vec<(String, usize)> = Vec::new();

        for ext in external {
            if ext.index >= self.len() {
                return Err(self.out_of_bounds(ext.index));
            }
            let target = if ext.index >= index {
                ext.index + count_instructions(&items)
            } else {
                ext.index
            };
            let name = match self.method.body().label_index(&ext.name) {
                Some(bound) if bound == ext.index => ext.name.clone(),
                _ => unique_name(&ext.name, &mut taken),
            };
            renames.insert(ext.name.clone(), name.clone());
            if self.method.body().label_index(&name).is_none() {
                bindings.push((name, target));
            }
        }

        let mut insns = Vec::new();
        let mut defined = HashSet::new();
        for item in &items {
            match item {
                AsmItem::Label(label) => {
                    let clash = external.iter().any(|e| e.name == label.name());
                    if clash || !defined.insert(label.name()) {
                        return Err(Error::LabelConflict {
                            method: self.method.signature(),
                            label: label.name().to_string(),
                        });
                    }
                    let name = unique_name(label.name(), &mut taken);
                    renames.insert(label.name().to_string(), name.clone());
                    bindings.push((name, index + insns.len()));
                }
                AsmItem::Instruction(insn) => insns.push(insn.clone()),
            }
        }

        let local: HashSet<String> = renames.values().cloned().collect();
        let mut rewritten = Vec::with_capacity(insns.len());
        for insn in insns {
            let insn = match insn.label().and_then(|l| renames.get(l.name())) {
                Some(name) => insn.with_label(Label::new(name.as_str()))?,
                None => insn,
            };
            self.check_registers(&insn)?;
            self.check_label(&insn, &local)?;
            rewritten.push(insn);
        }

        self.apply_insert(index, rewritten, bindings);
        Ok(())
    }

    /// Replace the instruction at `index`, returning the old one.
    pub fn replace(&mut self, index: usize, insn: Instruction) -> Result<Instruction> {
        self.check_index(index)?;
        self.check_registers(&insn)?;
        self.check_label(&insn, &HashSet::new())?;
        log::debug!("{}: replace @{index} with {insn}", self.method.signature());
        let old = self.method.body_mut().replace(index, insn);
        self.method.record(index, 1, 1);
        Ok(old)
    }

    pub fn replace_asm(&mut self, index: usize, src: &str) -> Result<Instruction> {
        let insn = assemble_one(src, &self.method.register_map())
            .map_err(|e| self.invalid_operand(e.to_string()))?;
        self.replace(index, insn)
    }

    /// Remove `[range.start, range.end)`. Labels inside the range move to
    /// `range.start`; the edit is refused if a label still referenced by a
    /// surviving branch would end up past the last instruction.
    pub fn remove_range(&mut self, range: Range<usize>) -> Result<Vec<Instruction>> {
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(self.out_of_bounds(range.end.max(range.start)));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let new_len = len - range.len();
        let body = self.method.body();
        for (name, bound) in body.labels() {
            let moved = InstructionStream::index_after_removal(bound, &range);
            if moved >= new_len && body.is_referenced(name, range.clone()) {
                return Err(Error::DanglingLabel {
                    method: self.method.signature(),
                    label: name.to_string(),
                });
            }
        }
        log::debug!("{}: remove {range:?}", self.method.signature());
        let start = range.start;
        let removed = self.method.body_mut().remove_range(range);
        self.method.record(start, removed.len(), 0);
        Ok(removed)
    }

    pub fn remove(&mut self, index: usize) -> Result<Instruction> {
        self.check_index(index)?;
        let mut removed = self.remove_range(index..index + 1)?;
        removed
            .pop()
            .ok_or_else(|| self.out_of_bounds(index))
    }

    /// Bind `name` to the instruction at `index`. Rebinding a name to the
    /// index it already names is a no-op.
    pub fn bind_label(&mut self, name: &str, index: usize) -> Result<()> {
        self.check_index(index)?;
        match self.method.body().label_index(name) {
            Some(bound) if bound == index => Ok(()),
            Some(_) => Err(Error::LabelConflict {
                method: self.method.signature(),
                label: name.to_string(),
            }),
            None => {
                self.method.body_mut().bind_label(name.to_string(), index);
                Ok(())
            }
        }
    }

    /// Make the method return immediately. `value` is the boolean result
    /// for `Z`-returning methods; other non-void methods return zero or
    /// null.
    pub fn return_early(&mut self, value: Option<bool>) -> Result<()> {
        let return_type = self.method.return_type().to_string();
        let literal = i64::from(value.unwrap_or(false));
        let insns = match return_type.as_str() {
            "V" => vec![Instruction::new(Opcode::ReturnVoid, vec![], Operand::None)?],
            t if is_wide_type(t) => vec![
                Instruction::new(Opcode::ConstWide16, vec![0], Operand::Literal(0))?,
                Instruction::new(Opcode::ReturnWide, vec![0], Operand::None)?,
            ],
            t if t.starts_with('L') || t.starts_with('[') => vec![
                Instruction::new(Opcode::Const4, vec![0], Operand::Literal(0))?,
                Instruction::new(Opcode::ReturnObject, vec![0], Operand::None)?,
            ],
            _ => vec![
                Instruction::new(Opcode::Const4, vec![0], Operand::Literal(literal))?,
                Instruction::new(Opcode::Return, vec![0], Operand::None)?,
            ],
        };
        self.insert(0, insns)
    }

    fn apply_insert(&mut self, index: usize, insns: Vec<Instruction>, bindings: Vec<(String, usize)>) {
        let n = insns.len();
        log::debug!("{}: insert {n} at @{index}", self.method.signature());
        let body = self.method.body_mut();
        body.insert(index, insns);
        for (name, at) in bindings {
            body.bind_label(name, at);
        }
        self.method.record(index, 0, n);
    }

    fn assemble(&self, src: &str) -> Result<Vec<AsmItem>> {
        assemble(src, &self.method.register_map()).map_err(|e| self.invalid_operand(e.to_string()))
    }

    fn check_position(&self, index: usize) -> Result<()> {
        if index > self.len() {
            return Err(self.out_of_bounds(index));
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(self.out_of_bounds(index));
        }
        Ok(())
    }

    fn check_registers(&self, insn: &Instruction) -> Result<()> {
        let registers = self.method.registers();
        let pairs = insn.opcode().pair_operands();
        for (i, &r) in insn.registers().iter().enumerate() {
            let pair = i < 8 && pairs & (1 << i) != 0;
            let top = if pair { r.checked_add(1) } else { Some(r) };
            if top.is_none_or(|top| top >= registers) {
                return Err(Error::RegisterOverflow {
                    method: self.method.signature(),
                    register: r,
                    registers,
                });
            }
        }
        Ok(())
    }

    fn check_label(&self, insn: &Instruction, local: &HashSet<String>) -> Result<()> {
        match insn.label() {
            Some(label)
                if !local.contains(label.name())
                    && self.method.body().label_index(label.name()).is_none() =>
            {
                Err(self.invalid_operand(format!("branch to unknown label {label}")))
            }
            _ => Ok(()),
        }
    }

    fn out_of_bounds(&self, index: usize) -> Error {
        Error::IndexOutOfBounds {
            method: self.method.signature(),
            index,
            len: self.len(),
        }
    }

    fn invalid_operand(&self, reason: String) -> Error {
        Error::InvalidOperand {
            method: self.method.signature(),
            reason,
        }
    }
}

fn count_instructions(items: &[AsmItem]) -> usize {
    items
        .iter()
        .filter(|i| matches!(i, AsmItem::Instruction(_)))
        .count()
}

/// `name`, or `name_N` for the smallest N not yet taken. Reserves the result.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{name}_{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_skip_taken() {
        let mut taken: HashSet<String> = ["skip".to_string(), "skip_1".to_string()].into();
        assert_eq!(unique_name("skip", &mut taken), "skip_2");
        assert_eq!(unique_name("skip", &mut taken), "skip_3");
        assert_eq!(unique_name("done", &mut taken), "done");
    }
}
