//! The closed instruction set of the HIR.
//!
//! Variant payloads carry each operation's static parameters: signedness,
//! saturation, rounding mode, and the lane width of vector operations.
//! Matching on an opcode is therefore always exhaustive; there is no
//! "unknown opcode" path anywhere in the optimizer.

use strum::Display;

use crate::hir::value::{RoundMode, TypeKind};

/// What each of an instruction's three operand slots holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Value,
    Label,
    Symbol,
    Offset,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    Nop,
    DebugBreak,
    DebugBreakTrue,
    Trap,
    TrapTrue,

    Call,
    CallTrue,
    CallIndirect,
    CallIndirectTrue,
    Return,
    ReturnTrue,
    Branch,
    BranchTrue,
    BranchFalse,

    Assign,
    Cast,
    ZeroExtend,
    SignExtend,
    Truncate,
    Convert(RoundMode),
    Round(RoundMode),

    LoadLocal,
    StoreLocal,
    LoadContext,
    StoreContext,
    Load,
    Store,
    LoadOffset,
    StoreOffset,
    LoadMmio,
    StoreMmio,

    Select,
    IsTrue,
    IsFalse,
    IsNan,
    Max,
    CompareEq,
    CompareNe,
    CompareSlt,
    CompareSle,
    CompareSgt,
    CompareSge,
    CompareUlt,
    CompareUle,
    CompareUgt,
    CompareUge,
    DidSaturate,
    VectorCompareEq(TypeKind),
    VectorCompareSgt(TypeKind),
    VectorCompareSge(TypeKind),
    VectorCompareUgt(TypeKind),
    VectorCompareUge(TypeKind),

    Add,
    AddCarry,
    Sub,
    Mul { unsigned: bool },
    MulHi { unsigned: bool },
    Div { unsigned: bool },
    MulAdd,
    MulSub,
    Neg,
    Abs,
    Sqrt,
    RSqrt,
    Recip,
    DotProduct3,
    DotProduct4,

    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sha,
    RotateLeft,
    ByteSwap,
    CountLeadingZeros,

    VectorAdd { part: TypeKind, unsigned: bool, saturate: bool },
    VectorSub { part: TypeKind, unsigned: bool, saturate: bool },
    VectorAverage { part: TypeKind, unsigned: bool },
    VectorShl(TypeKind),
    VectorShr(TypeKind),
    VectorRotateLeft(TypeKind),
    VectorConvertI2F { unsigned: bool },
    VectorConvertF2I { unsigned: bool },
}

impl Opcode {
    /// The expected contents of the three operand slots.
    pub fn signature(self) -> [OperandKind; 3] {
        use Opcode::*;
        use OperandKind as K;
        match self {
            Nop | DebugBreak | Trap | Return => [K::None, K::None, K::None],
            DebugBreakTrue | TrapTrue | ReturnTrue => [K::Value, K::None, K::None],
            Call => [K::Symbol, K::None, K::None],
            CallTrue => [K::Value, K::Symbol, K::None],
            CallIndirect => [K::Value, K::None, K::None],
            CallIndirectTrue => [K::Value, K::Value, K::None],
            Branch => [K::Label, K::None, K::None],
            BranchTrue | BranchFalse => [K::Value, K::Label, K::None],

            Assign | Cast | ZeroExtend | SignExtend | Truncate | Convert(_) | Round(_) => {
                [K::Value, K::None, K::None]
            }

            LoadLocal => [K::Offset, K::None, K::None],
            StoreLocal => [K::Offset, K::Value, K::None],
            LoadContext => [K::Offset, K::None, K::None],
            StoreContext => [K::Offset, K::Value, K::None],
            Load => [K::Value, K::None, K::None],
            Store => [K::Value, K::Value, K::None],
            LoadOffset => [K::Value, K::Value, K::None],
            StoreOffset => [K::Value, K::Value, K::Value],
            LoadMmio => [K::Offset, K::Offset, K::None],
            StoreMmio => [K::Offset, K::Offset, K::Value],

            Select => [K::Value, K::Value, K::Value],
            IsTrue | IsFalse | IsNan => [K::Value, K::None, K::None],
            Max | CompareEq | CompareNe | CompareSlt | CompareSle | CompareSgt | CompareSge
            | CompareUlt | CompareUle | CompareUgt | CompareUge => [K::Value, K::Value, K::None],
            DidSaturate => [K::Value, K::None, K::None],
            VectorCompareEq(_) | VectorCompareSgt(_) | VectorCompareSge(_)
            | VectorCompareUgt(_) | VectorCompareUge(_) => [K::Value, K::Value, K::None],

            Add | Sub | Mul { .. } | MulHi { .. } | Div { .. } | DotProduct3 | DotProduct4
            | And | Or | Xor | Shl | Shr | Sha | RotateLeft => [K::Value, K::Value, K::None],
            AddCarry | MulAdd | MulSub => [K::Value, K::Value, K::Value],
            Neg | Abs | Sqrt | RSqrt | Recip | Not | ByteSwap | CountLeadingZeros => {
                [K::Value, K::None, K::None]
            }

            VectorAdd { .. } | VectorSub { .. } | VectorAverage { .. } | VectorShl(_)
            | VectorShr(_) | VectorRotateLeft(_) => [K::Value, K::Value, K::None],
            VectorConvertI2F { .. } | VectorConvertF2I { .. } => [K::Value, K::None, K::None],
        }
    }

    /// Control transfers, including calls. Cross-block stores must be placed
    /// before the first of these in a block.
    pub fn is_branch(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Call | CallTrue
                | CallIndirect
                | CallIndirectTrue
                | Return
                | ReturnTrue
                | Branch
                | BranchTrue
                | BranchFalse
        )
    }

    /// Guest memory accesses eligible for byte-swap fusion.
    pub fn is_memory_access(self) -> bool {
        matches!(
            self,
            Opcode::Load | Opcode::Store | Opcode::LoadOffset | Opcode::StoreOffset
        )
    }

    /// `true` for opcodes whose result is read back by a trailing
    /// DID_SATURATE; such pairs must not be split up.
    pub fn is_paired_with_saturate(self) -> bool {
        matches!(
            self,
            Opcode::VectorAdd { saturate: true, .. } | Opcode::VectorSub { saturate: true, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_set_includes_calls() {
        assert!(Opcode::Branch.is_branch());
        assert!(Opcode::CallIndirect.is_branch());
        assert!(!Opcode::Assign.is_branch());
        assert!(!Opcode::StoreContext.is_branch());
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(Opcode::ByteSwap.to_string(), "byte_swap");
        assert_eq!(
            Opcode::VectorAdd {
                part: TypeKind::I16,
                unsigned: true,
                saturate: true
            }
            .to_string(),
            "vector_add"
        );
    }
}
