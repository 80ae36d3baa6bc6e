//! Gives every value that crosses a block boundary an explicit local slot.
//!
//! Backends allocate registers one block at a time, so a value may only be
//! consumed in the block that defines it. This pass computes, per block, the
//! set of values that flow in from elsewhere, then routes every such value
//! through a stack local: a `store_local` right after the definition and a
//! `load_local` at the head of each block that consumes it, with the in-block
//! reads rewritten to the loaded copy.
//!
//! Blocks are processed in reverse program order. A block's incoming set is
//! the union of its forward successors' incoming sets plus its own reads of
//! values defined elsewhere; reads reached through a back edge still get
//! slotted because the spill store is placed at the definition
//! unconditionally.

use hashbrown::{HashMap, HashSet};

use crate::{
    bitset::BitSet,
    context::OptimizationContext,
    hir::{HirFunction, Opcode, Operand, ValueId},
    index::Index,
    passes::{Pass, PassError},
};

pub struct DataFlowAnalysis;

impl Pass for DataFlowAnalysis {
    fn name(&self) -> &'static str {
        "data_flow_analysis"
    }

    fn run(
        &mut self,
        function: &mut HirFunction,
        _context: &OptimizationContext<'_>,
    ) -> Result<(), PassError> {
        function.renumber_blocks();
        compute_incoming_sets(function);
        let slotted = assign_local_slots(function);
        insert_block_loads(function);
        insert_spill_stores(function, &slotted)
    }
}

/// Live-in sets, one reverse sweep. Constants are never tracked; they can be
/// materialized anywhere.
fn compute_incoming_sets(f: &mut HirFunction) {
    let capacity = f.values.len();
    for &block_id in f.block_order.clone().iter().rev() {
        let mut live = BitSet::new(capacity);
        let ordinal = f.blocks[block_id].ordinal;
        for &succ in f.blocks[block_id].successors.clone().iter() {
            // Back edges point at blocks whose sets are not computed yet;
            // their reads are picked up by the operand rule when that block
            // is visited.
            if f.blocks[succ].ordinal > ordinal {
                live.union_with(&f.blocks[succ].incoming_values);
            }
        }
        for id in f.block_instrs(block_id).into_iter().rev() {
            if let Some(dest) = f.instrs[id].dest {
                live.remove(dest.index());
            }
            for (_, value) in f.instrs[id].value_operands() {
                if !f.values[value].is_constant() {
                    live.insert(value.index());
                }
            }
        }
        f.blocks[block_id].incoming_values = live;
    }
}

/// Allocates one local per value that appears in any block's incoming set.
/// A value with no definition counts as born at the top of the entry block,
/// so its presence in the entry set alone does not warrant a slot.
fn assign_local_slots(f: &mut HirFunction) -> Vec<ValueId> {
    let entry = f.block_order.first().copied();
    let mut seen = BitSet::new(f.values.len());
    let mut slotted = Vec::new();
    for &block_id in &f.block_order {
        let is_entry = Some(block_id) == entry;
        for index in f.blocks[block_id].incoming_values.iter() {
            let value = ValueId::new(index);
            if is_entry && f.values[value].def.is_none() {
                continue;
            }
            if !seen.contains(index) {
                seen.insert(index);
                slotted.push(value);
            }
        }
    }
    for &value in &slotted {
        if f.values[value].local_slot.is_none() {
            let slot = f.alloc_local(f.values[value].ty);
            f.values[value].local_slot = Some(slot);
        }
    }
    slotted
}

fn insert_block_loads(f: &mut HirFunction) {
    for &block_id in f.block_order.clone().iter() {
        let incoming: Vec<ValueId> = f.blocks[block_id]
            .incoming_values
            .iter()
            .map(ValueId::new)
            .collect();
        if incoming.is_empty() {
            continue;
        }

        let is_entry = f.block_order.first() == Some(&block_id);
        let mut remap: HashMap<ValueId, ValueId> = HashMap::new();
        for value in incoming {
            // Entry-block reads of an undefined value see the original
            // register; its slot is only written there for later blocks.
            if is_entry && f.values[value].def.is_none() {
                continue;
            }
            let Some(slot) = f.values[value].local_slot else {
                continue;
            };
            let loaded = f.alloc_value(f.values[value].ty);
            f.insert_at_head(block_id, Opcode::LoadLocal, Some(loaded), [
                Operand::Offset(slot.index() as u64),
                Operand::None,
                Operand::None,
            ]);
            remap.insert(value, loaded);
        }

        // Rewrite reads to the loaded copy, but only up to the point where
        // the block redefines the value itself (a loop header can read the
        // previous iteration's copy and then produce this iteration's).
        let mut shadowed: HashSet<ValueId> = HashSet::new();
        for id in f.block_instrs(block_id) {
            let reads: Vec<(u8, ValueId)> = f.instrs[id].value_operands().collect();
            for (slot, value) in reads {
                if shadowed.contains(&value) {
                    continue;
                }
                if let Some(&loaded) = remap.get(&value) {
                    f.set_operand(id, slot, Operand::Value(loaded));
                }
            }
            if let Some(dest) = f.instrs[id].dest
                && remap.contains_key(&dest)
            {
                shadowed.insert(dest);
            }
        }
    }
}

/// Stores every slotted value to its local right where it is defined. A
/// slotted value with no definition is stored once in the entry block,
/// before the first control transfer.
fn insert_spill_stores(f: &mut HirFunction, slotted: &[ValueId]) -> Result<(), PassError> {
    for &value in slotted {
        let Some(slot) = f.values[value].local_slot else {
            continue;
        };
        let operands = [
            Operand::Offset(slot.index() as u64),
            Operand::Value(value),
            Operand::None,
        ];
        match f.values[value].def {
            Some(def) => {
                f.insert_after(def, Opcode::StoreLocal, None, operands);
            }
            None => {
                let Some(&entry) = f.block_order.first() else {
                    return Err(PassError::MalformedIr {
                        pass: "data_flow_analysis",
                        detail: "function has no blocks".into(),
                    });
                };
                match f.first_branch(entry) {
                    Some(branch) => f.insert_before(branch, Opcode::StoreLocal, None, operands),
                    None => f.append_instr(entry, Opcode::StoreLocal, None, operands),
                };
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{ConstantValue, TypeKind};

    fn run(f: &mut HirFunction) {
        DataFlowAnalysis
            .run(f, &OptimizationContext::disabled())
            .unwrap();
    }

    #[test]
    fn cross_block_value_is_routed_through_a_local() {
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);

        let x = f.alloc_value(TypeKind::I32);
        let v = f.alloc_value(TypeKind::I32);
        let def = f.append_instr(b0, Opcode::Not, Some(v), [
            Operand::Value(x),
            Operand::None,
            Operand::None,
        ]);
        f.append_instr(b0, Opcode::Branch, None, [
            Operand::Label(b1),
            Operand::None,
            Operand::None,
        ]);
        let use_instr = f.append_instr(b1, Opcode::StoreContext, None, [
            Operand::Offset(8),
            Operand::Value(v),
            Operand::None,
        ]);

        run(&mut f);

        let slot = f.values[v].local_slot.expect("crossing value gets a slot");
        // Store placed right after the definition.
        let store = f.instrs[def].next.expect("store follows the def");
        assert_eq!(f.instrs[store].opcode, Opcode::StoreLocal);
        assert_eq!(
            f.instrs[store].operands[0],
            Operand::Offset(slot.index() as u64)
        );
        // Load placed at the consumer block's head, and the read rewritten.
        let head = f.blocks[b1].head.unwrap();
        assert_eq!(f.instrs[head].opcode, Opcode::LoadLocal);
        let loaded = f.instrs[head].dest.unwrap();
        assert_eq!(f.instrs[use_instr].operands[1], Operand::Value(loaded));
    }

    #[test]
    fn value_used_only_in_its_own_block_is_untouched() {
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);

        let x = f.alloc_value(TypeKind::I32);
        let v = f.alloc_value(TypeKind::I32);
        f.append_instr(b0, Opcode::Not, Some(v), [
            Operand::Value(x),
            Operand::None,
            Operand::None,
        ]);
        f.append_instr(b0, Opcode::StoreContext, None, [
            Operand::Offset(8),
            Operand::Value(v),
            Operand::None,
        ]);

        run(&mut f);
        assert_eq!(f.values[v].local_slot, None);
        // The undefined input is only read where it is born, so it does not
        // need a slot either.
        assert_eq!(f.values[x].local_slot, None);
        assert_eq!(f.locals.len(), 0);
    }

    #[test]
    fn constants_never_get_slots() {
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);

        let c = f.constant_value(ConstantValue::I32(7));
        f.append_instr(b0, Opcode::Branch, None, [
            Operand::Label(b1),
            Operand::None,
            Operand::None,
        ]);
        f.append_instr(b1, Opcode::StoreContext, None, [
            Operand::Offset(8),
            Operand::Value(c),
            Operand::None,
        ]);

        run(&mut f);
        assert_eq!(f.values[c].local_slot, None);
        assert_eq!(f.locals.len(), 0);
    }

    #[test]
    fn back_edge_consumer_still_sees_the_value() {
        // b0 defines v; b1 loops on itself and reads v each iteration.
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);
        f.add_edge(b1, b1);

        let x = f.alloc_value(TypeKind::I32);
        let v = f.alloc_value(TypeKind::I32);
        let def = f.append_instr(b0, Opcode::Not, Some(v), [
            Operand::Value(x),
            Operand::None,
            Operand::None,
        ]);
        let cond = f.alloc_value(TypeKind::I8);
        let read = f.append_instr(b1, Opcode::StoreContext, None, [
            Operand::Offset(8),
            Operand::Value(v),
            Operand::None,
        ]);
        f.append_instr(b1, Opcode::BranchTrue, None, [
            Operand::Value(cond),
            Operand::Label(b1),
            Operand::None,
        ]);

        run(&mut f);

        assert!(f.values[v].local_slot.is_some());
        let store = f.instrs[def].next.unwrap();
        assert_eq!(f.instrs[store].opcode, Opcode::StoreLocal);
        // b1 loads v at its head even though its only predecessor in program
        // order is itself plus the fallthrough.
        let head = f.blocks[b1].head.unwrap();
        assert_eq!(f.instrs[head].opcode, Opcode::LoadLocal);
        let loaded_values: Vec<_> = f
            .block_instrs(b1)
            .into_iter()
            .take_while(|&i| f.instrs[i].opcode == Opcode::LoadLocal)
            .map(|i| f.instrs[i].dest.unwrap())
            .collect();
        let rewritten = f.instrs[read].operands[1].as_value().unwrap();
        assert!(loaded_values.contains(&rewritten));
    }

    #[test]
    fn loop_carried_read_before_the_def_uses_the_loaded_copy() {
        // b1 reads the previous iteration's v, then defines this iteration's.
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);
        f.add_edge(b1, b1);

        f.append_instr(b0, Opcode::Branch, None, [
            Operand::Label(b1),
            Operand::None,
            Operand::None,
        ]);
        let x = f.alloc_value(TypeKind::I32);
        let v = f.alloc_value(TypeKind::I32);
        let early_read = f.append_instr(b1, Opcode::StoreContext, None, [
            Operand::Offset(8),
            Operand::Value(v),
            Operand::None,
        ]);
        let def = f.append_instr(b1, Opcode::Not, Some(v), [
            Operand::Value(x),
            Operand::None,
            Operand::None,
        ]);
        let late_read = f.append_instr(b1, Opcode::StoreContext, None, [
            Operand::Offset(12),
            Operand::Value(v),
            Operand::None,
        ]);
        let cond = f.alloc_value(TypeKind::I8);
        f.append_instr(b1, Opcode::BranchTrue, None, [
            Operand::Value(cond),
            Operand::Label(b1),
            Operand::None,
        ]);

        run(&mut f);

        // The read before the definition uses the loaded copy; the read
        // after it uses the fresh value, which is then stored back.
        let early = f.instrs[early_read].operands[1].as_value().unwrap();
        assert_ne!(early, v);
        assert_eq!(f.instrs[late_read].operands[1], Operand::Value(v));
        let store = f.instrs[def].next.unwrap();
        assert_eq!(f.instrs[store].opcode, Opcode::StoreLocal);
        assert_eq!(f.instrs[store].operands[1], Operand::Value(v));
    }
}
