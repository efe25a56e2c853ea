//! Evaluates one fingerprint against one method.
//!
//! Checks run cheapest first: return type, access flags, parameters,
//! string and literal constants, the opcode pattern, then the custom
//! predicate.

use dexpatch_isa::Opcode;
use dexpatch_pool::{ClassDef, Method};

use crate::fingerprint::{Fingerprint, PatternElement};

/// Where the opcode pattern matched. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternMatch {
    pub start: usize,
    pub end: usize,
}

/// First occurrence of a required string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringMatch {
    pub string: String,
    pub index: usize,
}

/// First occurrence of a required literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiteralMatch {
    pub value: i64,
    pub index: usize,
}

/// What a successful match found inside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MatchDetails {
    pub pattern: Option<PatternMatch>,
    pub strings: Vec<StringMatch>,
    pub literals: Vec<LiteralMatch>,
}

impl MatchDetails {
    /// The last instruction index any part of the match depends on.
    pub fn anchor_end(&self) -> Option<usize> {
        let pattern = self.pattern.map(|p| p.end);
        let strings = self.strings.iter().map(|s| s.index).max();
        let literals = self.literals.iter().map(|l| l.index).max();
        [pattern, strings, literals].into_iter().flatten().max()
    }
}

/// `true` if `method` satisfies every constraint of `fingerprint`.
pub fn matches(fingerprint: &Fingerprint, method: &Method, class: &ClassDef) -> bool {
    match_method(fingerprint, method, class).is_some()
}

/// Match `method` against `fingerprint`, reporting where the body
/// constraints were satisfied.
pub fn match_method(fingerprint: &Fingerprint, method: &Method, class: &ClassDef) -> Option<MatchDetails> {
    if let Some(pattern) = &fingerprint.return_type {
        if !pattern.matches(method.return_type()) {
            return None;
        }
    }
    if let Some(flags) = fingerprint.access_flags {
        if !method.access_flags().contains(flags) {
            return None;
        }
    }
    if let Some(params) = &fingerprint.parameters {
        let actual = method.parameters();
        if params.len() != actual.len() || !params.iter().zip(actual).all(|(p, a)| p.matches(a)) {
            return None;
        }
    }

    let body = method.body();
    let strings = fingerprint
        .strings
        .iter()
        .map(|s| {
            body.index_of_string(s).map(|index| StringMatch {
                string: s.clone(),
                index,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    let literals = fingerprint
        .literals
        .iter()
        .map(|&value| body.index_of_literal(value).map(|index| LiteralMatch { value, index }))
        .collect::<Option<Vec<_>>>()?;

    let pattern = if fingerprint.opcodes.is_empty() {
        None
    } else {
        let opcodes: Vec<Opcode> = body.opcodes().collect();
        Some(find_pattern(&opcodes, &fingerprint.opcodes)?)
    };

    if let Some(custom) = &fingerprint.custom {
        if !custom(method, class) {
            return None;
        }
    }

    Some(MatchDetails {
        pattern,
        strings,
        literals,
    })
}

/// First contiguous window of `opcodes` matched element-wise by `pattern`.
pub fn find_pattern(opcodes: &[Opcode], pattern: &[PatternElement]) -> Option<PatternMatch> {
    if pattern.is_empty() || pattern.len() > opcodes.len() {
        return None;
    }
    opcodes
        .windows(pattern.len())
        .position(|window| pattern.iter().zip(window).all(|(p, &op)| p.matches(op)))
        .map(|start| PatternMatch {
            start,
            end: start + pattern.len() - 1,
        })
}
