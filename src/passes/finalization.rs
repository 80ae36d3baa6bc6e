//! Last tidy-up before lowering: refresh block ordinals and drop branches
//! that only jump to the lexically next block, which the backend gets for
//! free as fallthrough.

use crate::{
    context::OptimizationContext,
    hir::{HirFunction, Opcode},
    passes::{Pass, PassError},
};

pub struct Finalization;

impl Pass for Finalization {
    fn name(&self) -> &'static str {
        "finalization"
    }

    fn run(
        &mut self,
        function: &mut HirFunction,
        _context: &OptimizationContext<'_>,
    ) -> Result<(), PassError> {
        function.renumber_blocks();
        for (position, &block) in function.block_order.clone().iter().enumerate() {
            let Some(tail) = function.blocks[block].tail else {
                continue;
            };
            if function.instrs[tail].opcode != Opcode::Branch {
                continue;
            }
            let Some(target) = function.instrs[tail].operands[0].as_label() else {
                continue;
            };
            if function.block_order.get(position + 1) == Some(&target) {
                // The CFG edge stays; only the jump is redundant.
                function.remove_instr(tail);
            }
        }
        Ok(())
    }
}
