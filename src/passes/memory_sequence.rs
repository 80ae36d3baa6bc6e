//! Fuses byte-swap sequences into the neighboring memory access.
//!
//! The guest is big-endian, so the frontend brackets every load and store
//! with an explicit byte swap. Backends can reverse bytes for free as part
//! of the access itself; this pass moves the swap into the access's
//! `BYTE_SWAP` flag. A load is only fused when every one of its consumers is
//! a swap, otherwise some reader still wants the unswapped bits and the
//! sequence must stay.

use hashbrown::HashSet;

use crate::{
    context::OptimizationContext,
    hir::{HirFunction, InstrFlags, InstrId, Opcode, Operand, ValueId},
    passes::{PassError, Subpass},
};

pub struct MemorySequenceCombination;

impl Subpass for MemorySequenceCombination {
    fn name(&self) -> &'static str {
        "memory_sequence_combination"
    }

    fn run(
        &mut self,
        function: &mut HirFunction,
        _context: &OptimizationContext<'_>,
    ) -> Result<bool, PassError> {
        let mut changed = false;
        for block in function.block_order.clone() {
            for id in function.block_instrs(block) {
                match function.instrs[id].opcode {
                    Opcode::Load | Opcode::LoadOffset => {
                        changed |= combine_load(function, id);
                    }
                    Opcode::Store => changed |= combine_store(function, id, 1)?,
                    Opcode::StoreOffset => changed |= combine_store(function, id, 2)?,
                    _ => {}
                }
            }
        }
        Ok(changed)
    }
}

fn combine_load(f: &mut HirFunction, id: InstrId) -> bool {
    if f.instrs[id].flags.contains(InstrFlags::BYTE_SWAP) {
        return false;
    }
    let Some(dest) = f.instrs[id].dest else {
        return false;
    };
    let uses = f.values[dest].uses.clone();
    if uses.is_empty() {
        return false;
    }
    if !uses
        .iter()
        .all(|u| f.instrs[u.instr].opcode == Opcode::ByteSwap)
    {
        return false;
    }

    f.instrs[id].flags |= InstrFlags::BYTE_SWAP;
    for u in uses {
        let swap_dest = f.instrs[u.instr].dest;
        f.replace_instr(u.instr, Opcode::Assign, swap_dest, [
            Operand::Value(dest),
            Operand::None,
            Operand::None,
        ]);
    }
    true
}

/// Follows the stored value backwards through assignments; if it bottoms out
/// at a byte swap, the store takes the swap's input and the flag instead.
fn combine_store(f: &mut HirFunction, id: InstrId, stored_slot: u8) -> Result<bool, PassError> {
    if f.instrs[id].flags.contains(InstrFlags::BYTE_SWAP) {
        return Ok(false);
    }
    let Some(stored) = f.instrs[id].operands[stored_slot as usize].as_value() else {
        return Ok(false);
    };
    if f.values[stored].is_constant() {
        return Ok(false);
    }

    let mut visited: HashSet<ValueId> = HashSet::new();
    let mut value = stored;
    loop {
        if !visited.insert(value) {
            return Err(PassError::MalformedIr {
                pass: "memory_sequence_combination",
                detail: "assignment cycle while tracing a stored value".into(),
            });
        }
        let Some(def) = f.values[value].def else {
            return Ok(false);
        };
        match f.instrs[def].opcode {
            Opcode::Assign => {
                let Some(next) = f.instrs[def].operands[0].as_value() else {
                    return Ok(false);
                };
                value = next;
            }
            Opcode::ByteSwap => {
                let Some(source) = f.instrs[def].operands[0].as_value() else {
                    return Ok(false);
                };
                f.instrs[id].flags |= InstrFlags::BYTE_SWAP;
                f.set_operand(id, stored_slot, Operand::Value(source));
                return Ok(true);
            }
            _ => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{ConstantValue, TypeKind};

    fn run_once(f: &mut HirFunction) -> bool {
        MemorySequenceCombination
            .run(f, &OptimizationContext::disabled())
            .unwrap()
    }

    #[test]
    fn load_feeding_only_swaps_absorbs_the_swap() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.alloc_value(TypeKind::I64);
        let loaded = f.alloc_value(TypeKind::I32);
        let load = f.append_instr(b, Opcode::Load, Some(loaded), [
            Operand::Value(addr),
            Operand::None,
            Operand::None,
        ]);
        let swapped = f.alloc_value(TypeKind::I32);
        let swap = f.append_instr(b, Opcode::ByteSwap, Some(swapped), [
            Operand::Value(loaded),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f));
        assert!(f.instrs[load].flags.contains(InstrFlags::BYTE_SWAP));
        assert_eq!(f.instrs[swap].opcode, Opcode::Assign);
        assert_eq!(f.instrs[swap].operands[0], Operand::Value(loaded));
    }

    #[test]
    fn load_with_a_non_swap_reader_is_left_alone() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.alloc_value(TypeKind::I64);
        let loaded = f.alloc_value(TypeKind::I32);
        let load = f.append_instr(b, Opcode::Load, Some(loaded), [
            Operand::Value(addr),
            Operand::None,
            Operand::None,
        ]);
        let swapped = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::ByteSwap, Some(swapped), [
            Operand::Value(loaded),
            Operand::None,
            Operand::None,
        ]);
        // A second reader wants the raw bits.
        let doubled = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::Add, Some(doubled), [
            Operand::Value(loaded),
            Operand::Value(loaded),
            Operand::None,
        ]);

        assert!(!run_once(&mut f));
        assert!(f.instrs[load].flags.is_empty());
    }

    #[test]
    fn offset_load_fuses_like_a_plain_load() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let base = f.alloc_value(TypeKind::I64);
        let disp = f.alloc_value(TypeKind::I64);
        let loaded = f.alloc_value(TypeKind::I16);
        let load = f.append_instr(b, Opcode::LoadOffset, Some(loaded), [
            Operand::Value(base),
            Operand::Value(disp),
            Operand::None,
        ]);
        let swapped = f.alloc_value(TypeKind::I16);
        f.append_instr(b, Opcode::ByteSwap, Some(swapped), [
            Operand::Value(loaded),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f));
        assert!(f.instrs[load].flags.contains(InstrFlags::BYTE_SWAP));
    }

    #[test]
    fn store_of_swapped_value_takes_the_preswap_input() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.alloc_value(TypeKind::I64);
        let raw = f.alloc_value(TypeKind::I32);
        let swapped = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::ByteSwap, Some(swapped), [
            Operand::Value(raw),
            Operand::None,
            Operand::None,
        ]);
        let store = f.append_instr(b, Opcode::Store, None, [
            Operand::Value(addr),
            Operand::Value(swapped),
            Operand::None,
        ]);

        assert!(run_once(&mut f));
        assert!(f.instrs[store].flags.contains(InstrFlags::BYTE_SWAP));
        assert_eq!(f.instrs[store].operands[1], Operand::Value(raw));
    }

    #[test]
    fn store_traces_through_assignments() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.alloc_value(TypeKind::I64);
        let raw = f.alloc_value(TypeKind::I32);
        let swapped = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::ByteSwap, Some(swapped), [
            Operand::Value(raw),
            Operand::None,
            Operand::None,
        ]);
        let alias = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::Assign, Some(alias), [
            Operand::Value(swapped),
            Operand::None,
            Operand::None,
        ]);
        let store = f.append_instr(b, Opcode::Store, None, [
            Operand::Value(addr),
            Operand::Value(alias),
            Operand::None,
        ]);

        assert!(run_once(&mut f));
        assert!(f.instrs[store].flags.contains(InstrFlags::BYTE_SWAP));
        assert_eq!(f.instrs[store].operands[1], Operand::Value(raw));
    }

    #[test]
    fn store_of_constant_is_not_traced() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.alloc_value(TypeKind::I64);
        let c = f.constant_value(ConstantValue::I32(0x1234_5678));
        let store = f.append_instr(b, Opcode::Store, None, [
            Operand::Value(addr),
            Operand::Value(c),
            Operand::None,
        ]);

        assert!(!run_once(&mut f));
        assert!(f.instrs[store].flags.is_empty());
    }

    #[test]
    fn fused_load_round_trips_guest_bytes() {
        // Guest memory holds 12 34 56 78; the swapped register value is
        // 0x12345678 on a little-endian host.
        let guest = u32::from_le_bytes([0x12, 0x34, 0x56, 0x78]);
        assert_eq!(guest.swap_bytes(), 0x1234_5678);
    }
}
