//! Whole-pool rewrites that touch many methods at once.

use std::sync::atomic::{AtomicUsize, Ordering};

use dexpatch_isa::Instruction;
use dexpatch_pool::MethodPool;

use crate::error::Result;

/// Rewrite every string constant `f` returns a replacement for. Methods
/// are visited in parallel, one class per task. Returns how many
/// instructions changed.
pub fn transform_strings<F>(pool: &mut MethodPool, f: F) -> Result<usize>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    let changed = AtomicUsize::new(0);
    pool.par_for_each_method_mut(|_, mut splicer| -> dexpatch_pool::Result<()> {
        let mut edits: Vec<(usize, Instruction)> = Vec::new();
        for (i, insn) in splicer.method().body().iter().enumerate() {
            let Some(s) = insn.string() else {
                continue;
            };
            match f(s) {
                Some(replacement) if replacement != s => edits.push((i, insn.with_string(replacement)?)),
                _ => {}
            }
        }
        for (i, insn) in edits {
            splicer.replace(i, insn)?;
            changed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    })?;
    let changed = changed.into_inner();
    log::info!("rewrote {changed} string constants");
    Ok(changed)
}
