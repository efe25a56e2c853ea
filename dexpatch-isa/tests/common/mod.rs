use dexpatch_isa::*;

/// Assemble a snippet that contains no label definitions.
pub fn insns(src: &str) -> Vec<Instruction> {
    assemble(src, &RegisterMap::new())
        .unwrap()
        .into_iter()
        .map(|item| match item {
            AsmItem::Instruction(insn) => insn,
            AsmItem::Label(l) => panic!("unexpected label {l}"),
        })
        .collect()
}

/// Disassemble, reassemble and compare.
pub fn assert_reassembles(insn: &Instruction) {
    let text = insn.to_string();
    let again = assemble_one(&text, &RegisterMap::new())
        .unwrap_or_else(|e| panic!("reassembling {text:?}: {e}"));
    assert_eq!(&again, insn, "mismatch for {text}");
}
