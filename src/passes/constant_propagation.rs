//! Folds operations whose inputs are known at compile time.
//!
//! One sweep walks every instruction in program order. An instruction whose
//! operands are all constant is evaluated and deleted, and its destination
//! becomes a constant; conditional control flow with a constant condition
//! degrades to its unconditional form or disappears. Each rewrite can expose
//! more constants upstream, so the sweep reports whether anything changed
//! and the group driver reruns it until nothing does.

use crate::{
    context::OptimizationContext,
    hir::{CompareKind, ConstantValue, HirFunction, InstrFlags, InstrId, Opcode, Operand, TypeKind},
    passes::{PassError, Subpass},
};

pub struct ConstantPropagation;

impl Subpass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant_propagation"
    }

    fn run(
        &mut self,
        function: &mut HirFunction,
        context: &OptimizationContext<'_>,
    ) -> Result<bool, PassError> {
        let mut changed = false;
        for block in function.block_order.clone() {
            for id in function.block_instrs(block) {
                changed |= visit(function, context, id);
            }
        }
        Ok(changed)
    }
}

/// The constant operand in `slot`, if there is one.
fn constant(function: &HirFunction, id: InstrId, slot: usize) -> Option<ConstantValue> {
    let value = function.instrs[id].operands[slot].as_value()?;
    function.values[value].constant
}

fn visit(f: &mut HirFunction, ctx: &OptimizationContext<'_>, id: InstrId) -> bool {
    use Opcode::*;

    let opcode = f.instrs[id].opcode;
    let operands = f.instrs[id].operands;
    let dest = f.instrs[id].dest;
    let c0 = constant(f, id, 0);
    let c1 = constant(f, id, 1);
    let c2 = constant(f, id, 2);

    match opcode {
        DebugBreakTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, DebugBreak, None, [Operand::None; 3]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        TrapTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, Trap, None, [Operand::None; 3]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        CallTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, Call, None, [operands[1], Operand::None, Operand::None]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        CallIndirect => {
            let Some(target) = c0.and_then(ConstantValue::as_u32) else {
                return false;
            };
            match ctx.resolve_function(target) {
                Some(handle) => {
                    f.replace_instr(id, Call, None, [
                        Operand::Symbol(handle),
                        Operand::None,
                        Operand::None,
                    ]);
                    true
                }
                None => false,
            }
        }
        CallIndirectTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, CallIndirect, None, [
                    operands[1],
                    Operand::None,
                    Operand::None,
                ]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        ReturnTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, Return, None, [Operand::None; 3]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        BranchTrue => match c0 {
            Some(cond) if cond.is_true() => {
                f.replace_instr(id, Branch, None, [operands[1], Operand::None, Operand::None]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },
        BranchFalse => match c0 {
            Some(cond) if cond.is_false() => {
                f.replace_instr(id, Branch, None, [operands[1], Operand::None, Operand::None]);
                true
            }
            Some(_) => {
                f.remove_instr(id);
                true
            }
            None => false,
        },

        Assign => fold1(f, id, c0, Some),
        Cast => {
            let target = dest.map(|d| f.values[d].ty);
            fold1(f, id, c0, |c| c.cast(target?))
        }
        ZeroExtend => {
            let target = dest.map(|d| f.values[d].ty);
            fold1(f, id, c0, |c| c.zero_extend(target?))
        }
        SignExtend => {
            let target = dest.map(|d| f.values[d].ty);
            fold1(f, id, c0, |c| c.sign_extend(target?))
        }
        Truncate => {
            let target = dest.map(|d| f.values[d].ty);
            fold1(f, id, c0, |c| c.truncate(target?))
        }
        Convert(mode) => {
            let target = dest.map(|d| f.values[d].ty);
            fold1(f, id, c0, |c| c.convert(target?, mode))
        }
        Round(mode) => fold1(f, id, c0, |c| c.round(mode)),

        Load => visit_load(f, ctx, id, address_of(c0, None)),
        Store => visit_store(f, ctx, id, address_of(c0, None), 1),
        LoadOffset => visit_load(f, ctx, id, address_of(c0, c1)),
        StoreOffset => visit_store(f, ctx, id, address_of(c0, c1), 2),

        Select => match c0 {
            // A vector condition is a per-lane blend; only a scalar
            // condition picks a whole arm.
            Some(cond) if cond.ty() != TypeKind::V128 => {
                let chosen = if cond.is_true() { operands[1] } else { operands[2] };
                f.replace_instr(id, Assign, dest, [chosen, Operand::None, Operand::None]);
                true
            }
            _ => false,
        },
        IsTrue => fold1(f, id, c0, |c| Some(ConstantValue::I8(c.is_true() as u8))),
        IsFalse => fold1(f, id, c0, |c| Some(ConstantValue::I8(c.is_false() as u8))),
        IsNan => fold1(f, id, c0, |c| c.is_nan().map(|b| ConstantValue::I8(b as u8))),
        Max => fold2(f, id, c0, c1, |a, b| a.max(b)),
        CompareEq => fold_compare(f, id, c0, c1, CompareKind::Eq),
        CompareNe => fold_compare(f, id, c0, c1, CompareKind::Ne),
        CompareSlt => fold_compare(f, id, c0, c1, CompareKind::Slt),
        CompareSle => fold_compare(f, id, c0, c1, CompareKind::Sle),
        CompareSgt => fold_compare(f, id, c0, c1, CompareKind::Sgt),
        CompareSge => fold_compare(f, id, c0, c1, CompareKind::Sge),
        CompareUlt => fold_compare(f, id, c0, c1, CompareKind::Ult),
        CompareUle => fold_compare(f, id, c0, c1, CompareKind::Ule),
        CompareUgt => fold_compare(f, id, c0, c1, CompareKind::Ugt),
        CompareUge => fold_compare(f, id, c0, c1, CompareKind::Uge),
        // The paired saturation flag reader is left for the backend.
        DidSaturate => false,
        VectorCompareEq(part) => {
            fold2(f, id, c0, c1, |a, b| a.vector_compare(CompareKind::Eq, part, b))
        }
        VectorCompareSgt(part) => {
            fold2(f, id, c0, c1, |a, b| a.vector_compare(CompareKind::Sgt, part, b))
        }
        VectorCompareSge(part) => {
            fold2(f, id, c0, c1, |a, b| a.vector_compare(CompareKind::Sge, part, b))
        }
        VectorCompareUgt(part) => {
            fold2(f, id, c0, c1, |a, b| a.vector_compare(CompareKind::Ugt, part, b))
        }
        VectorCompareUge(part) => {
            fold2(f, id, c0, c1, |a, b| a.vector_compare(CompareKind::Uge, part, b))
        }

        Add => fold2(f, id, c0, c1, |a, b| a.add(b)),
        AddCarry => visit_add_carry(f, id, c0, c1),
        Sub => fold2(f, id, c0, c1, |a, b| a.sub(b)),
        Mul { .. } => {
            if fold2(f, id, c0, c1, |a, b| a.mul(b)) {
                return true;
            }
            // Multiplying by one is an assignment, whichever side the one
            // is on.
            if c1.is_some_and(is_multiplicative_identity) {
                f.replace_instr(id, Assign, dest, [operands[0], Operand::None, Operand::None]);
                true
            } else if c0.is_some_and(is_multiplicative_identity) {
                f.replace_instr(id, Assign, dest, [operands[1], Operand::None, Operand::None]);
                true
            } else {
                false
            }
        }
        MulHi { unsigned } => fold2(f, id, c0, c1, |a, b| a.mul_hi(b, unsigned)),
        Div { unsigned } => {
            if fold2(f, id, c0, c1, |a, b| a.div(b, unsigned)) {
                return true;
            }
            if c1.is_some_and(is_multiplicative_identity) {
                f.replace_instr(id, Assign, dest, [operands[0], Operand::None, Operand::None]);
                return true;
            }
            // Integer division by zero is zero whatever the dividend.
            if c1.is_some_and(|c| c.ty().is_scalar_int() && c.is_zero())
                && let Some(ty) = dest.map(|d| f.values[d].ty)
            {
                f.fold_to_constant(id, ConstantValue::zero(ty));
                return true;
            }
            false
        }
        MulAdd => fold3(f, id, c0, c1, c2, |a, b, c| a.mul_add(b, c)),
        MulSub => fold3(f, id, c0, c1, c2, |a, b, c| a.mul_sub(b, c)),
        Neg => fold1(f, id, c0, ConstantValue::neg),
        Abs => fold1(f, id, c0, ConstantValue::abs),
        Sqrt => fold1(f, id, c0, ConstantValue::sqrt),
        RSqrt => fold1(f, id, c0, ConstantValue::rsqrt),
        Recip => fold1(f, id, c0, ConstantValue::recip),
        DotProduct3 => fold2(f, id, c0, c1, |a, b| a.dot_product(b, 3)),
        DotProduct4 => fold2(f, id, c0, c1, |a, b| a.dot_product(b, 4)),

        And => fold2(f, id, c0, c1, |a, b| a.and(b)),
        Or => fold2(f, id, c0, c1, |a, b| a.or(b)),
        Xor => {
            if fold2(f, id, c0, c1, |a, b| a.xor(b)) {
                return true;
            }
            // A value xored with itself is zero even when it is unknown.
            match (operands[0], operands[1]) {
                (Operand::Value(a), Operand::Value(b)) if a == b => {
                    let ty = dest.map(|d| f.values[d].ty);
                    match ty {
                        Some(ty) => {
                            f.fold_to_constant(id, ConstantValue::zero(ty));
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            }
        }
        Not => fold1(f, id, c0, ConstantValue::not),
        Shl => fold_shift(f, id, c0, c1, ConstantValue::shl),
        Shr => fold_shift(f, id, c0, c1, ConstantValue::shr),
        Sha => fold_shift(f, id, c0, c1, ConstantValue::sha),
        RotateLeft => fold2(f, id, c0, c1, |a, b| a.rotate_left(b)),
        ByteSwap => fold1(f, id, c0, ConstantValue::byte_swap),
        CountLeadingZeros => fold1(f, id, c0, ConstantValue::count_leading_zeros),

        VectorAdd { part, saturate, .. } => {
            fold2(f, id, c0, c1, |a, b| a.vector_add(b, part, saturate))
        }
        VectorSub { part, saturate, .. } => {
            fold2(f, id, c0, c1, |a, b| a.vector_sub(b, part, saturate))
        }
        VectorAverage { part, unsigned } => {
            fold2(f, id, c0, c1, |a, b| a.vector_average(b, part, unsigned))
        }
        VectorShl(part) => fold2(f, id, c0, c1, |a, b| a.vector_shl(b, part)),
        VectorShr(part) => fold2(f, id, c0, c1, |a, b| a.vector_shr(b, part)),
        VectorRotateLeft(part) => fold2(f, id, c0, c1, |a, b| a.vector_rotate_left(b, part)),
        VectorConvertI2F { unsigned } => fold1(f, id, c0, |c| c.vector_convert_i2f(unsigned)),
        VectorConvertF2I { unsigned } => fold1(f, id, c0, |c| c.vector_convert_f2i(unsigned)),

        Nop | DebugBreak | Trap | Call | Return | Branch | LoadLocal | StoreLocal
        | LoadContext | StoreContext | LoadMmio | StoreMmio => false,
    }
}

fn is_multiplicative_identity(c: ConstantValue) -> bool {
    c.is_one() || c.is_all_lanes_one_f32()
}

fn fold1(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    eval: impl FnOnce(ConstantValue) -> Option<ConstantValue>,
) -> bool {
    match c0.and_then(eval) {
        Some(result) => {
            f.fold_to_constant(id, result);
            true
        }
        None => false,
    }
}

fn fold2(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    c1: Option<ConstantValue>,
    eval: impl FnOnce(ConstantValue, ConstantValue) -> Option<ConstantValue>,
) -> bool {
    match (c0, c1) {
        (Some(a), Some(b)) => match eval(a, b) {
            Some(result) => {
                f.fold_to_constant(id, result);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn fold3(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    c1: Option<ConstantValue>,
    c2: Option<ConstantValue>,
    eval: impl FnOnce(ConstantValue, ConstantValue, ConstantValue) -> Option<ConstantValue>,
) -> bool {
    match (c0, c1, c2) {
        (Some(a), Some(b), Some(c)) => match eval(a, b, c) {
            Some(result) => {
                f.fold_to_constant(id, result);
                true
            }
            None => false,
        },
        _ => false,
    }
}

fn fold_compare(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    c1: Option<ConstantValue>,
    kind: CompareKind,
) -> bool {
    fold2(f, id, c0, c1, |a, b| {
        a.compare(kind, b).map(|hit| ConstantValue::I8(hit as u8))
    })
}

fn fold_shift(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    c1: Option<ConstantValue>,
    eval: impl FnOnce(ConstantValue, ConstantValue) -> Option<ConstantValue>,
) -> bool {
    if fold2(f, id, c0, c1, eval) {
        return true;
    }
    // Shifting by a constant zero is an assignment.
    if c1.is_some_and(ConstantValue::is_zero) {
        let dest = f.instrs[id].dest;
        let src = f.instrs[id].operands[0];
        f.replace_instr(id, Opcode::Assign, dest, [src, Operand::None, Operand::None]);
        return true;
    }
    false
}

/// A carry-in add whose value operands are both known zero is just the
/// carry bit widened to the destination type.
fn visit_add_carry(
    f: &mut HirFunction,
    id: InstrId,
    c0: Option<ConstantValue>,
    c1: Option<ConstantValue>,
) -> bool {
    let both_zero = c0.is_some_and(ConstantValue::is_zero) && c1.is_some_and(ConstantValue::is_zero);
    if !both_zero {
        return false;
    }
    let dest = f.instrs[id].dest;
    let carry = f.instrs[id].operands[2];
    let same_type = match (dest, carry.as_value()) {
        (Some(d), Some(c)) => f.values[d].ty == f.values[c].ty,
        _ => false,
    };
    let opcode = if same_type { Opcode::Assign } else { Opcode::ZeroExtend };
    f.replace_instr(id, opcode, dest, [carry, Operand::None, Operand::None]);
    true
}

/// The guest address an access reads, when every address operand is
/// constant. Offset forms add the base and displacement.
fn address_of(base: Option<ConstantValue>, offset: Option<ConstantValue>) -> Option<u32> {
    let base = base?.as_u64()?;
    match offset {
        Some(offset) => Some(base.wrapping_add(offset.as_u64()?) as u32),
        None => Some(base as u32),
    }
}

/// Loads from a constant address can hit an MMIO range (fuse into a
/// dedicated MMIO access) or provably immutable memory (fold outright).
fn visit_load(
    f: &mut HirFunction,
    ctx: &OptimizationContext<'_>,
    id: InstrId,
    address: Option<u32>,
) -> bool {
    let Some(address) = address else {
        return false;
    };
    let dest = f.instrs[id].dest;
    let flags = f.instrs[id].flags;

    if flags.is_empty()
        && let Some(range) = ctx.mmio_range(address)
    {
        f.replace_instr(id, Opcode::LoadMmio, dest, [
            Operand::Offset(range.0 as u64),
            Operand::Offset(address as u64),
            Operand::None,
        ]);
        return true;
    }

    let Some(dest) = dest else { return false };
    let ty = f.values[dest].ty;
    let Some(loaded) = ctx.read_only_constant(address, ty) else {
        return false;
    };
    let loaded = if flags.contains(InstrFlags::BYTE_SWAP) {
        match loaded.byte_swap() {
            Some(swapped) => swapped,
            None => return false,
        }
    } else {
        loaded
    };
    f.fold_to_constant(id, loaded);
    true
}

fn visit_store(
    f: &mut HirFunction,
    ctx: &OptimizationContext<'_>,
    id: InstrId,
    address: Option<u32>,
    stored_slot: usize,
) -> bool {
    let Some(address) = address else {
        return false;
    };
    if !f.instrs[id].flags.is_empty() {
        return false;
    }
    let Some(range) = ctx.mmio_range(address) else {
        return false;
    };
    let stored = f.instrs[id].operands[stored_slot];
    f.replace_instr(id, Opcode::StoreMmio, None, [
        Operand::Offset(range.0 as u64),
        Operand::Offset(address as u64),
        stored,
    ]);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FunctionHandle, FunctionResolver, MemoryOracle, MmioRangeId};
    use crate::hir::Vec128;

    fn run_once(f: &mut HirFunction, ctx: &OptimizationContext<'_>) -> bool {
        ConstantPropagation.run(f, ctx).unwrap()
    }

    fn binary(
        f: &mut HirFunction,
        block: crate::hir::BlockId,
        opcode: Opcode,
        ty: TypeKind,
        a: crate::hir::ValueId,
        b: crate::hir::ValueId,
    ) -> (InstrId, crate::hir::ValueId) {
        let dest = f.alloc_value(ty);
        let id = f.append_instr(block, opcode, Some(dest), [
            Operand::Value(a),
            Operand::Value(b),
            Operand::None,
        ]);
        (id, dest)
    }

    #[test]
    fn add_of_constants_folds_and_wraps() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let a = f.constant_value(ConstantValue::I32(0x7FFF_FFFF));
        let one = f.constant_value(ConstantValue::I32(1));
        let (_, dest) = binary(&mut f, b, Opcode::Add, TypeKind::I32, a, one);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.values[dest].constant, Some(ConstantValue::I32(0x8000_0000)));
        assert!(f.block_instrs(b).is_empty());
    }

    #[test]
    fn multiply_by_one_becomes_assign() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I64);
        let one = f.constant_value(ConstantValue::I64(1));
        let (id, _) = binary(&mut f, b, Opcode::Mul { unsigned: false }, TypeKind::I64, x, one);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Assign);
        assert_eq!(f.instrs[id].operands[0], Operand::Value(x));
    }

    #[test]
    fn divide_by_one_becomes_assign() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I64);
        let one = f.constant_value(ConstantValue::I64(1));
        let (id, _) = binary(&mut f, b, Opcode::Div { unsigned: true }, TypeKind::I64, x, one);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Assign);
        assert_eq!(f.instrs[id].operands[0], Operand::Value(x));
    }

    #[test]
    fn integer_division_by_constant_zero_folds_to_zero() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I32);
        let zero = f.constant_value(ConstantValue::I32(0));
        let (_, dest) = binary(&mut f, b, Opcode::Div { unsigned: false }, TypeKind::I32, x, zero);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.values[dest].constant, Some(ConstantValue::I32(0)));
        assert!(f.block_instrs(b).is_empty());
    }

    #[test]
    fn float_division_by_constant_zero_is_left_alone() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::F64);
        let zero = f.constant_value(ConstantValue::F64(0.0));
        let (id, _) = binary(&mut f, b, Opcode::Div { unsigned: false }, TypeKind::F64, x, zero);

        assert!(!run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Div { unsigned: false });
    }

    #[test]
    fn shift_by_zero_becomes_assign() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I32);
        let zero = f.constant_value(ConstantValue::I8(0));
        let (id, _) = binary(&mut f, b, Opcode::Shl, TypeKind::I32, x, zero);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Assign);
    }

    #[test]
    fn shift_right_by_zero_becomes_assign() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I32);
        let zero = f.constant_value(ConstantValue::I8(0));
        let (id, _) = binary(&mut f, b, Opcode::Shr, TypeKind::I32, x, zero);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Assign);
        assert_eq!(f.instrs[id].operands[0], Operand::Value(x));
    }

    #[test]
    fn xor_with_self_is_zero_even_when_unknown() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let x = f.alloc_value(TypeKind::I32);
        let (_, dest) = binary(&mut f, b, Opcode::Xor, TypeKind::I32, x, x);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.values[dest].constant, Some(ConstantValue::I32(0)));
    }

    #[test]
    fn select_with_constant_condition_degrades_to_assign() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let cond = f.constant_value(ConstantValue::I8(0));
        let then_v = f.alloc_value(TypeKind::I32);
        let else_v = f.alloc_value(TypeKind::I32);
        let dest = f.alloc_value(TypeKind::I32);
        let id = f.append_instr(b, Opcode::Select, Some(dest), [
            Operand::Value(cond),
            Operand::Value(then_v),
            Operand::Value(else_v),
        ]);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Assign);
        assert_eq!(f.instrs[id].operands[0], Operand::Value(else_v));
        assert_eq!(f.values[then_v].uses.len(), 0);
    }

    #[test]
    fn select_with_vector_condition_is_not_degraded() {
        // A V128 condition blends per lane; neither arm alone is the result.
        let mut f = HirFunction::new();
        let b = f.append_block();
        let mask = f.constant_value(ConstantValue::V128(Vec128::from_u32x4([!0, 0, 0, 0])));
        let then_v = f.alloc_value(TypeKind::V128);
        let else_v = f.alloc_value(TypeKind::V128);
        let dest = f.alloc_value(TypeKind::V128);
        let id = f.append_instr(b, Opcode::Select, Some(dest), [
            Operand::Value(mask),
            Operand::Value(then_v),
            Operand::Value(else_v),
        ]);

        assert!(!run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Select);
        assert_eq!(f.instrs[id].operands[2], Operand::Value(else_v));
    }

    #[test]
    fn branch_true_with_false_condition_is_removed() {
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);
        let cond = f.constant_value(ConstantValue::I8(0));
        f.append_instr(b0, Opcode::BranchTrue, None, [
            Operand::Value(cond),
            Operand::Label(b1),
            Operand::None,
        ]);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert!(f.block_instrs(b0).is_empty());
    }

    #[test]
    fn branch_true_with_true_condition_becomes_branch() {
        let mut f = HirFunction::new();
        let b0 = f.append_block();
        let b1 = f.append_block();
        f.add_edge(b0, b1);
        let cond = f.constant_value(ConstantValue::I8(1));
        let id = f.append_instr(b0, Opcode::BranchTrue, None, [
            Operand::Value(cond),
            Operand::Label(b1),
            Operand::None,
        ]);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::Branch);
        assert_eq!(f.instrs[id].operands[0], Operand::Label(b1));
    }

    #[test]
    fn add_carry_of_known_zeros_widens_the_carry() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let zero_a = f.constant_value(ConstantValue::I64(0));
        let zero_b = f.constant_value(ConstantValue::I64(0));
        let carry = f.alloc_value(TypeKind::I8);
        let dest = f.alloc_value(TypeKind::I64);
        let id = f.append_instr(b, Opcode::AddCarry, Some(dest), [
            Operand::Value(zero_a),
            Operand::Value(zero_b),
            Operand::Value(carry),
        ]);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.instrs[id].opcode, Opcode::ZeroExtend);
        assert_eq!(f.instrs[id].operands[0], Operand::Value(carry));
    }

    struct OneFunction;
    impl FunctionResolver for OneFunction {
        fn resolve(&self, address: u32) -> Option<FunctionHandle> {
            (address == 0x8200_0000).then_some(FunctionHandle(7))
        }
    }

    struct NoMemory;
    impl MemoryOracle for NoMemory {
        fn mmio_range(&self, _address: u32) -> Option<MmioRangeId> {
            None
        }
        fn read_only_constant(&self, _address: u32, _ty: TypeKind) -> Option<ConstantValue> {
            None
        }
    }

    #[test]
    fn constant_indirect_call_resolves_to_direct_call() {
        let resolver = OneFunction;
        let memory = NoMemory;
        let ctx = OptimizationContext::new(&resolver, &memory);

        let mut f = HirFunction::new();
        let b = f.append_block();
        let target = f.constant_value(ConstantValue::I32(0x8200_0000));
        let id = f.append_instr(b, Opcode::CallIndirect, None, [
            Operand::Value(target),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f, &ctx));
        assert_eq!(f.instrs[id].opcode, Opcode::Call);
        assert_eq!(f.instrs[id].operands[0], Operand::Symbol(FunctionHandle(7)));
    }

    struct FixedMemory;
    impl MemoryOracle for FixedMemory {
        fn mmio_range(&self, address: u32) -> Option<MmioRangeId> {
            (0x7FC8_0000..0x7FD0_0000)
                .contains(&address)
                .then_some(MmioRangeId(3))
        }
        fn read_only_constant(&self, address: u32, ty: TypeKind) -> Option<ConstantValue> {
            (address == 0x8100_0000 && ty == TypeKind::I32).then_some(ConstantValue::I32(0xCAFE))
        }
    }

    struct NoFunctions;
    impl FunctionResolver for NoFunctions {
        fn resolve(&self, _address: u32) -> Option<FunctionHandle> {
            None
        }
    }

    #[test]
    fn constant_address_load_in_mmio_range_fuses() {
        let resolver = NoFunctions;
        let memory = FixedMemory;
        let ctx = OptimizationContext::new(&resolver, &memory);

        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.constant_value(ConstantValue::I32(0x7FC8_1000));
        let dest = f.alloc_value(TypeKind::I32);
        let id = f.append_instr(b, Opcode::Load, Some(dest), [
            Operand::Value(addr),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f, &ctx));
        assert_eq!(f.instrs[id].opcode, Opcode::LoadMmio);
        assert_eq!(f.instrs[id].operands[0], Operand::Offset(3));
        assert_eq!(f.instrs[id].operands[1], Operand::Offset(0x7FC8_1000));
    }

    #[test]
    fn load_from_read_only_memory_folds() {
        let resolver = NoFunctions;
        let memory = FixedMemory;
        let ctx = OptimizationContext::new(&resolver, &memory);

        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.constant_value(ConstantValue::I32(0x8100_0000));
        let dest = f.alloc_value(TypeKind::I32);
        f.append_instr(b, Opcode::Load, Some(dest), [
            Operand::Value(addr),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f, &ctx));
        assert_eq!(f.values[dest].constant, Some(ConstantValue::I32(0xCAFE)));
    }

    #[test]
    fn constant_address_store_in_mmio_range_fuses() {
        let resolver = NoFunctions;
        let memory = FixedMemory;
        let ctx = OptimizationContext::new(&resolver, &memory);

        let mut f = HirFunction::new();
        let b = f.append_block();
        let addr = f.constant_value(ConstantValue::I32(0x7FC8_1000));
        let stored = f.alloc_value(TypeKind::I32);
        let id = f.append_instr(b, Opcode::Store, None, [
            Operand::Value(addr),
            Operand::Value(stored),
            Operand::None,
        ]);

        assert!(run_once(&mut f, &ctx));
        assert_eq!(f.instrs[id].opcode, Opcode::StoreMmio);
        assert_eq!(f.instrs[id].operands[2], Operand::Value(stored));
    }

    #[test]
    fn is_true_of_a_constant_folds_to_a_flag() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let c = f.constant_value(ConstantValue::I32(42));
        let dest = f.alloc_value(TypeKind::I8);
        f.append_instr(b, Opcode::IsTrue, Some(dest), [
            Operand::Value(c),
            Operand::None,
            Operand::None,
        ]);

        assert!(run_once(&mut f, &OptimizationContext::disabled()));
        assert_eq!(f.values[dest].constant, Some(ConstantValue::I8(1)));
    }

    #[test]
    fn offset_store_with_constant_address_parts_fuses_to_mmio() {
        let resolver = NoFunctions;
        let memory = FixedMemory;
        let ctx = OptimizationContext::new(&resolver, &memory);

        let mut f = HirFunction::new();
        let b = f.append_block();
        let base = f.constant_value(ConstantValue::I64(0x7FC8_0000));
        let offset = f.constant_value(ConstantValue::I64(0x1000));
        let stored = f.alloc_value(TypeKind::I32);
        let id = f.append_instr(b, Opcode::StoreOffset, None, [
            Operand::Value(base),
            Operand::Value(offset),
            Operand::Value(stored),
        ]);

        assert!(run_once(&mut f, &ctx));
        assert_eq!(f.instrs[id].opcode, Opcode::StoreMmio);
        assert_eq!(f.instrs[id].operands[1], Operand::Offset(0x7FC8_1000));
        assert_eq!(f.instrs[id].operands[2], Operand::Value(stored));
    }

    #[test]
    fn sweep_is_idempotent() {
        let mut f = HirFunction::new();
        let b = f.append_block();
        let a = f.constant_value(ConstantValue::I32(1000));
        let c = f.constant_value(ConstantValue::I32(1000));
        let (_, sum) = binary(&mut f, b, Opcode::Add, TypeKind::I32, a, c);
        f.append_instr(b, Opcode::StoreContext, None, [
            Operand::Offset(200),
            Operand::Value(sum),
            Operand::None,
        ]);

        let ctx = OptimizationContext::disabled();
        assert!(run_once(&mut f, &ctx));
        assert!(!run_once(&mut f, &ctx));
        assert_eq!(f.values[sum].constant, Some(ConstantValue::I32(2000)));
    }
}
