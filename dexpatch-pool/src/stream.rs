//! Method bodies: an ordered instruction list plus a named-label table.
//!
//! Branch instructions name their targets (`:loop`), and the table maps
//! each name to an instruction index. Splicing shifts the table, never the
//! branch operands, so a label keeps pointing at the same logical
//! instruction across insertions.

use std::collections::BTreeMap;

use dexpatch_isa::{AsmItem, Instruction, Opcode};

/// The decoded body of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionStream {
    insns: Vec<Instruction>,
    labels: BTreeMap<String, usize>,
}

/// Why a list of assembled items does not form a valid body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamError {
    DuplicateLabel(String),
    TrailingLabel(String),
    UnboundLabel(String),
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a body from assembler output. A label binds to the
    /// instruction that follows it; every branch must name a bound label.
    pub(crate) fn from_items(items: Vec<AsmItem>) -> Result<Self, StreamError> {
        let mut stream = Self::new();
        let mut pending = Vec::new();
        for item in items {
            match item {
                AsmItem::Label(label) => pending.push(label.0),
                AsmItem::Instruction(insn) => {
                    let index = stream.insns.len();
                    for name in pending.drain(..) {
                        if stream.labels.insert(name.clone(), index).is_some() {
                            return Err(StreamError::DuplicateLabel(name));
                        }
                    }
                    stream.insns.push(insn);
                }
            }
        }
        if let Some(name) = pending.pop() {
            return Err(StreamError::TrailingLabel(name));
        }
        if let Some(name) = stream.unbound_labels().next() {
            return Err(StreamError::UnboundLabel(name.to_string()));
        }
        Ok(stream)
    }

    /// Assembler items for this body: labels precede the instruction they
    /// are bound to.
    pub fn to_items(&self) -> Vec<AsmItem> {
        let mut by_index: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (name, &index) in &self.labels {
            by_index.entry(index).or_default().push(name);
        }
        let mut items = Vec::with_capacity(self.insns.len() + self.labels.len());
        for (i, insn) in self.insns.iter().enumerate() {
            for name in by_index.get(&i).into_iter().flatten() {
                items.push(AsmItem::Label(dexpatch_isa::Label::new(*name)));
            }
            items.push(AsmItem::Instruction(insn.clone()));
        }
        items
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.insns.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.insns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.insns.iter()
    }

    pub fn opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.insns.iter().map(Instruction::opcode)
    }

    /// All bound labels, ordered by name.
    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.labels.iter().map(|(n, &i)| (n.as_str(), i))
    }

    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Labels bound to `index`.
    pub fn labels_at(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.labels
            .iter()
            .filter(move |&(_, &i)| i == index)
            .map(|(n, _)| n.as_str())
    }

    /// Index the branch at `index` jumps to.
    pub fn branch_target(&self, index: usize) -> Option<usize> {
        let label = self.insns.get(index)?.label()?;
        self.label_index(label.name())
    }

    /// First index `>= from` whose instruction satisfies `pred`.
    pub fn index_of_first(&self, from: usize, pred: impl Fn(&Instruction) -> bool) -> Option<usize> {
        self.insns
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, insn)| pred(insn))
            .map(|(i, _)| i)
    }

    /// Last index `<= from` whose instruction satisfies `pred`, searching
    /// backwards.
    pub fn index_of_first_reversed(
        &self,
        from: usize,
        pred: impl Fn(&Instruction) -> bool,
    ) -> Option<usize> {
        let end = from.checked_add(1)?.min(self.insns.len());
        self.insns[..end].iter().rposition(pred)
    }

    pub fn index_of_opcode(&self, from: usize, opcode: Opcode) -> Option<usize> {
        self.index_of_first(from, |insn| insn.opcode() == opcode)
    }

    /// First instruction carrying `literal` as its constant operand.
    pub fn index_of_literal(&self, literal: i64) -> Option<usize> {
        self.index_of_first(0, |insn| insn.literal() == Some(literal))
    }

    /// First `const-string` loading exactly `s`.
    pub fn index_of_string(&self, s: &str) -> Option<usize> {
        self.index_of_first(0, |insn| insn.string() == Some(s))
    }

    /// Every string constant with its index.
    pub fn strings(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| insn.string().map(|s| (i, s)))
    }

    /// Whether any instruction outside `skip` branches to `name`.
    pub(crate) fn is_referenced(&self, name: &str, skip: std::ops::Range<usize>) -> bool {
        self.insns
            .iter()
            .enumerate()
            .filter(|(i, _)| !skip.contains(i))
            .any(|(_, insn)| insn.label().is_some_and(|l| l.name() == name))
    }

    /// Branch label names with no binding in the table.
    pub(crate) fn unbound_labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.insns
            .iter()
            .filter_map(|insn| insn.label())
            .map(|l| l.name())
            .filter(|name| !self.labels.contains_key(*name))
    }

    pub(crate) fn insert(&mut self, index: usize, insns: Vec<Instruction>) {
        let n = insns.len();
        for bound in self.labels.values_mut() {
            if *bound >= index {
                *bound += n;
            }
        }
        self.insns.splice(index..index, insns);
    }

    pub(crate) fn replace(&mut self, index: usize, insn: Instruction) -> Instruction {
        std::mem::replace(&mut self.insns[index], insn)
    }

    /// Remove `[start, end)`. Labels inside the range move to `start`,
    /// later labels shift down. Labels left at the end of the body are
    /// dropped; callers check references first.
    pub(crate) fn remove_range(&mut self, range: std::ops::Range<usize>) -> Vec<Instruction> {
        let n = range.len();
        let removed: Vec<Instruction> = self.insns.drain(range.clone()).collect();
        let len = self.insns.len();
        self.labels.retain(|_, bound| {
            if *bound >= range.end {
                *bound -= n;
            } else if *bound >= range.start {
                *bound = range.start;
            }
            *bound < len
        });
        removed
    }

    /// Where a label bound at `bound` ends up after removing `range`.
    pub(crate) fn index_after_removal(bound: usize, range: &std::ops::Range<usize>) -> usize {
        if bound >= range.end {
            bound - range.len()
        } else if bound >= range.start {
            range.start
        } else {
            bound
        }
    }

    pub(crate) fn bind_label(&mut self, name: String, index: usize) {
        self.labels.insert(name, index);
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
