//! Typed virtual registers and compile-time constant evaluation.
//!
//! Guest PowerPC semantics are fixed width: every fold here wraps at the
//! destination type's exact bit width and respects the signed/unsigned and
//! per-lane interpretation the opcode asks for. An evaluation returns `None`
//! for a type/shape combination the optimizer does not fold; the caller
//! leaves such instructions untouched.

use strum::Display;

use crate::{
    hir::LocalId,
    hir::instr::InstrId,
    index::simple_index,
};

simple_index! {
    /// Identifies a virtual register in the function arena
    pub struct ValueId;
}

/// The closed set of HIR value types.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum TypeKind {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl TypeKind {
    pub fn size_bytes(self) -> usize {
        match self {
            TypeKind::I8 => 1,
            TypeKind::I16 => 2,
            TypeKind::I32 => 4,
            TypeKind::I64 => 8,
            TypeKind::F32 => 4,
            TypeKind::F64 => 8,
            TypeKind::V128 => 16,
        }
    }

    pub fn is_scalar_int(self) -> bool {
        matches!(
            self,
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::I64
        )
    }

}

/// Rounding mode carried by CONVERT/ROUND opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    #[default]
    ToZero,
    ToNearest,
    ToMinusInfinity,
    ToPositiveInfinity,
}

/// A 128-bit vector constant, stored as two 64-bit words.
///
/// Lane 0 occupies the low bits of `low`; lane views reinterpret the same
/// 128 bits at different granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vec128 {
    pub low: u64,
    pub high: u64,
}

macro_rules! vec128_lanes {
    ($from:ident, $to:ident, $lane:ty, $n:expr) => {
        pub fn $from(lanes: [$lane; $n]) -> Self {
            let mut bytes = [0u8; 16];
            for (i, lane) in lanes.iter().enumerate() {
                let size = size_of::<$lane>();
                bytes[i * size..(i + 1) * size].copy_from_slice(&lane.to_le_bytes());
            }
            Self::from_bytes(bytes)
        }

        pub fn $to(self) -> [$lane; $n] {
            let bytes = self.to_bytes();
            let mut lanes = [0 as $lane; $n];
            let size = size_of::<$lane>();
            for (i, lane) in lanes.iter_mut().enumerate() {
                *lane = <$lane>::from_le_bytes(bytes[i * size..(i + 1) * size].try_into().unwrap());
            }
            lanes
        }
    };
}

impl Vec128 {
    pub const ZERO: Self = Self { low: 0, high: 0 };

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self {
            low: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
            high: u64::from_le_bytes(bytes[8..].try_into().unwrap()),
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.low.to_le_bytes());
        bytes[8..].copy_from_slice(&self.high.to_le_bytes());
        bytes
    }

    vec128_lanes!(from_u8x16, to_u8x16, u8, 16);
    vec128_lanes!(from_u16x8, to_u16x8, u16, 8);
    vec128_lanes!(from_u32x4, to_u32x4, u32, 4);
    vec128_lanes!(from_u64x2, to_u64x2, u64, 2);

    pub fn from_f32x4(lanes: [f32; 4]) -> Self {
        Self::from_u32x4(lanes.map(f32::to_bits))
    }

    pub fn to_f32x4(self) -> [f32; 4] {
        self.to_u32x4().map(f32::from_bits)
    }

    pub fn from_f64x2(lanes: [f64; 2]) -> Self {
        Self::from_u64x2(lanes.map(f64::to_bits))
    }

    pub fn to_f64x2(self) -> [f64; 2] {
        self.to_u64x2().map(f64::from_bits)
    }
}

/// A compile-time constant. Integer payloads hold the raw bit pattern;
/// signedness is applied per operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    I8(u8),
    I16(u16),
    I32(u32),
    I64(u64),
    F32(f32),
    F64(f64),
    V128(Vec128),
}

/// Scalar comparison predicates, shared by the scalar and vector compare
/// opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

macro_rules! scalar_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(self, other: ConstantValue) -> Option<ConstantValue> {
            use ConstantValue::*;
            match (self, other) {
                (I8(a), I8(b)) => Some(I8(a.$int(b))),
                (I16(a), I16(b)) => Some(I16(a.$int(b))),
                (I32(a), I32(b)) => Some(I32(a.$int(b))),
                (I64(a), I64(b)) => Some(I64(a.$int(b))),
                (F32(a), F32(b)) => Some(F32(a $float b)),
                (F64(a), F64(b)) => Some(F64(a $float b)),
                _ => None,
            }
        }
    };
}

macro_rules! scalar_bitop {
    ($name:ident, $op:tt) => {
        pub fn $name(self, other: ConstantValue) -> Option<ConstantValue> {
            use ConstantValue::*;
            match (self, other) {
                (I8(a), I8(b)) => Some(I8(a $op b)),
                (I16(a), I16(b)) => Some(I16(a $op b)),
                (I32(a), I32(b)) => Some(I32(a $op b)),
                (I64(a), I64(b)) => Some(I64(a $op b)),
                (V128(a), V128(b)) => Some(V128(Vec128 {
                    low: a.low $op b.low,
                    high: a.high $op b.high,
                })),
                _ => None,
            }
        }
    };
}

impl ConstantValue {
    pub fn ty(self) -> TypeKind {
        match self {
            ConstantValue::I8(_) => TypeKind::I8,
            ConstantValue::I16(_) => TypeKind::I16,
            ConstantValue::I32(_) => TypeKind::I32,
            ConstantValue::I64(_) => TypeKind::I64,
            ConstantValue::F32(_) => TypeKind::F32,
            ConstantValue::F64(_) => TypeKind::F64,
            ConstantValue::V128(_) => TypeKind::V128,
        }
    }

    pub fn zero(ty: TypeKind) -> Self {
        match ty {
            TypeKind::I8 => ConstantValue::I8(0),
            TypeKind::I16 => ConstantValue::I16(0),
            TypeKind::I32 => ConstantValue::I32(0),
            TypeKind::I64 => ConstantValue::I64(0),
            TypeKind::F32 => ConstantValue::F32(0.0),
            TypeKind::F64 => ConstantValue::F64(0.0),
            TypeKind::V128 => ConstantValue::V128(Vec128::ZERO),
        }
    }

    pub fn is_true(self) -> bool {
        !self.is_false()
    }

    pub fn is_false(self) -> bool {
        match self {
            ConstantValue::I8(v) => v == 0,
            ConstantValue::I16(v) => v == 0,
            ConstantValue::I32(v) => v == 0,
            ConstantValue::I64(v) => v == 0,
            ConstantValue::F32(v) => v == 0.0,
            ConstantValue::F64(v) => v == 0.0,
            ConstantValue::V128(v) => v.low == 0 && v.high == 0,
        }
    }

    pub fn is_zero(self) -> bool {
        self.is_false()
    }

    pub fn is_one(self) -> bool {
        match self {
            ConstantValue::I8(v) => v == 1,
            ConstantValue::I16(v) => v == 1,
            ConstantValue::I32(v) => v == 1,
            ConstantValue::I64(v) => v == 1,
            ConstantValue::F32(v) => v == 1.0,
            ConstantValue::F64(v) => v == 1.0,
            ConstantValue::V128(_) => false,
        }
    }

    /// `true` for a V128 constant whose four f32 lanes are all exactly 1.0,
    /// which makes a vector multiply/divide by it a no-op.
    pub fn is_all_lanes_one_f32(self) -> bool {
        match self {
            ConstantValue::V128(v) => v.to_f32x4().iter().all(|lane| *lane == 1.0),
            _ => false,
        }
    }

    /// The low 32 bits of an integer constant, used for guest addresses.
    pub fn as_u32(self) -> Option<u32> {
        self.as_u64().map(|v| v as u32)
    }

    pub fn as_u64(self) -> Option<u64> {
        match self {
            ConstantValue::I8(v) => Some(v as u64),
            ConstantValue::I16(v) => Some(v as u64),
            ConstantValue::I32(v) => Some(v as u64),
            ConstantValue::I64(v) => Some(v),
            _ => None,
        }
    }

    fn shift_amount(self) -> Option<u32> {
        self.as_u64().map(|v| v as u32)
    }

    /// Bit-for-bit reinterpretation between same-sized types.
    pub fn cast(self, target: TypeKind) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, target) {
            (I32(v), TypeKind::F32) => Some(F32(f32::from_bits(v))),
            (F32(v), TypeKind::I32) => Some(I32(v.to_bits())),
            (I64(v), TypeKind::F64) => Some(F64(f64::from_bits(v))),
            (F64(v), TypeKind::I64) => Some(I64(v.to_bits())),
            (value, target) if value.ty() == target => Some(value),
            _ => None,
        }
    }

    pub fn zero_extend(self, target: TypeKind) -> Option<ConstantValue> {
        let bits = match self {
            ConstantValue::I8(v) => v as u64,
            ConstantValue::I16(v) => v as u64,
            ConstantValue::I32(v) => v as u64,
            _ => return None,
        };
        Self::from_int_bits(bits, target)
    }

    pub fn sign_extend(self, target: TypeKind) -> Option<ConstantValue> {
        let bits = match self {
            ConstantValue::I8(v) => v as i8 as i64 as u64,
            ConstantValue::I16(v) => v as i16 as i64 as u64,
            ConstantValue::I32(v) => v as i32 as i64 as u64,
            _ => return None,
        };
        Self::from_int_bits(bits, target)
    }

    pub fn truncate(self, target: TypeKind) -> Option<ConstantValue> {
        let bits = self.as_u64()?;
        if target.size_bytes() < self.ty().size_bytes() {
            Self::from_int_bits(bits, target)
        } else {
            None
        }
    }

    fn from_int_bits(bits: u64, target: TypeKind) -> Option<ConstantValue> {
        match target {
            TypeKind::I8 => Some(ConstantValue::I8(bits as u8)),
            TypeKind::I16 => Some(ConstantValue::I16(bits as u16)),
            TypeKind::I32 => Some(ConstantValue::I32(bits as u32)),
            TypeKind::I64 => Some(ConstantValue::I64(bits)),
            _ => None,
        }
    }

    /// Numeric conversion. The conversions the frontend emits truncate toward
    /// zero, matching the guest's float-to-int behavior.
    pub fn convert(self, target: TypeKind, _round_mode: RoundMode) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, target) {
            (F32(v), TypeKind::F64) => Some(F64(v as f64)),
            (F64(v), TypeKind::F32) => Some(F32(v as f32)),
            (F64(v), TypeKind::I32) => Some(I32(v as i32 as u32)),
            (F64(v), TypeKind::I64) => Some(I64(v as i64 as u64)),
            (I64(v), TypeKind::F64) => Some(F64(v as i64 as f64)),
            _ => None,
        }
    }

    pub fn round(self, mode: RoundMode) -> Option<ConstantValue> {
        fn round_f64(v: f64, mode: RoundMode) -> f64 {
            match mode {
                RoundMode::ToZero => v.trunc(),
                RoundMode::ToNearest => v.round(),
                RoundMode::ToMinusInfinity => v.floor(),
                RoundMode::ToPositiveInfinity => v.ceil(),
            }
        }

        match self {
            ConstantValue::F32(v) => Some(ConstantValue::F32(round_f64(v as f64, mode) as f32)),
            ConstantValue::F64(v) => Some(ConstantValue::F64(round_f64(v, mode))),
            ConstantValue::V128(v) => Some(ConstantValue::V128(Vec128::from_f32x4(
                v.to_f32x4().map(|lane| round_f64(lane as f64, mode) as f32),
            ))),
            _ => None,
        }
    }

    scalar_binop!(add, wrapping_add, +);
    scalar_binop!(sub, wrapping_sub, -);

    pub fn mul(self, other: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, other) {
            (I8(a), I8(b)) => Some(I8(a.wrapping_mul(b))),
            (I16(a), I16(b)) => Some(I16(a.wrapping_mul(b))),
            (I32(a), I32(b)) => Some(I32(a.wrapping_mul(b))),
            (I64(a), I64(b)) => Some(I64(a.wrapping_mul(b))),
            (F32(a), F32(b)) => Some(F32(a * b)),
            (F64(a), F64(b)) => Some(F64(a * b)),
            (V128(a), V128(b)) => Some(V128(map2_f32(a, b, |x, y| x * y))),
            _ => None,
        }
    }

    pub fn mul_hi(self, other: ConstantValue, unsigned: bool) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, other) {
            (I32(a), I32(b)) => Some(I32(if unsigned {
                ((a as u64 * b as u64) >> 32) as u32
            } else {
                ((a as i32 as i64 * b as i32 as i64) >> 32) as u32
            })),
            (I64(a), I64(b)) => Some(I64(if unsigned {
                ((a as u128 * b as u128) >> 64) as u64
            } else {
                ((a as i64 as i128 * b as i64 as i128) >> 64) as u64
            })),
            _ => None,
        }
    }

    /// Integer division by zero yields zero, which is how the guest ISA
    /// defines it.
    pub fn div(self, other: ConstantValue, unsigned: bool) -> Option<ConstantValue> {
        use ConstantValue::*;

        fn sdiv(a: i64, b: i64) -> u64 {
            if b == 0 { 0 } else { a.wrapping_div(b) as u64 }
        }
        fn udiv(a: u64, b: u64) -> u64 {
            if b == 0 { 0 } else { a / b }
        }

        match (self, other) {
            (I8(a), I8(b)) => Some(I8(if unsigned {
                udiv(a as u64, b as u64) as u8
            } else {
                sdiv(a as i8 as i64, b as i8 as i64) as u8
            })),
            (I16(a), I16(b)) => Some(I16(if unsigned {
                udiv(a as u64, b as u64) as u16
            } else {
                sdiv(a as i16 as i64, b as i16 as i64) as u16
            })),
            (I32(a), I32(b)) => Some(I32(if unsigned {
                udiv(a as u64, b as u64) as u32
            } else {
                sdiv(a as i32 as i64, b as i32 as i64) as u32
            })),
            (I64(a), I64(b)) => Some(I64(if unsigned {
                udiv(a, b)
            } else {
                sdiv(a as i64, b as i64)
            })),
            (F32(a), F32(b)) => Some(F32(a / b)),
            (F64(a), F64(b)) => Some(F64(a / b)),
            (V128(a), V128(b)) => Some(V128(map2_f32(a, b, |x, y| x / y))),
            _ => None,
        }
    }

    pub fn max(self, other: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, other) {
            (F32(a), F32(b)) => Some(F32(a.max(b))),
            (F64(a), F64(b)) => Some(F64(a.max(b))),
            (V128(a), V128(b)) => Some(V128(map2_f32(a, b, f32::max))),
            _ => None,
        }
    }

    pub fn neg(self) -> Option<ConstantValue> {
        use ConstantValue::*;
        match self {
            I8(v) => Some(I8(v.wrapping_neg())),
            I16(v) => Some(I16(v.wrapping_neg())),
            I32(v) => Some(I32(v.wrapping_neg())),
            I64(v) => Some(I64(v.wrapping_neg())),
            F32(v) => Some(F32(-v)),
            F64(v) => Some(F64(-v)),
            V128(v) => Some(V128(map_f32(v, |lane| -lane))),
        }
    }

    pub fn abs(self) -> Option<ConstantValue> {
        use ConstantValue::*;
        match self {
            I8(v) => Some(I8((v as i8).wrapping_abs() as u8)),
            I16(v) => Some(I16((v as i16).wrapping_abs() as u16)),
            I32(v) => Some(I32((v as i32).wrapping_abs() as u32)),
            I64(v) => Some(I64((v as i64).wrapping_abs() as u64)),
            F32(v) => Some(F32(v.abs())),
            F64(v) => Some(F64(v.abs())),
            V128(v) => Some(V128(map_f32(v, f32::abs))),
        }
    }

    pub fn sqrt(self) -> Option<ConstantValue> {
        match self {
            ConstantValue::F32(v) => Some(ConstantValue::F32(v.sqrt())),
            ConstantValue::F64(v) => Some(ConstantValue::F64(v.sqrt())),
            _ => None,
        }
    }

    pub fn rsqrt(self) -> Option<ConstantValue> {
        match self {
            ConstantValue::F32(v) => Some(ConstantValue::F32(1.0 / v.sqrt())),
            ConstantValue::F64(v) => Some(ConstantValue::F64(1.0 / v.sqrt())),
            ConstantValue::V128(v) => {
                Some(ConstantValue::V128(map_f32(v, |lane| 1.0 / lane.sqrt())))
            }
            _ => None,
        }
    }

    pub fn recip(self) -> Option<ConstantValue> {
        match self {
            ConstantValue::F32(v) => Some(ConstantValue::F32(1.0 / v)),
            ConstantValue::F64(v) => Some(ConstantValue::F64(1.0 / v)),
            ConstantValue::V128(v) => Some(ConstantValue::V128(map_f32(v, |lane| 1.0 / lane))),
            _ => None,
        }
    }

    pub fn mul_add(self, b: ConstantValue, c: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, b, c) {
            (F32(a), F32(b), F32(c)) => Some(F32(a * b + c)),
            (F64(a), F64(b), F64(c)) => Some(F64(a * b + c)),
            (V128(a), V128(b), V128(c)) => {
                let product = map2_f32(a, b, |x, y| x * y);
                Some(V128(map2_f32(product, c, |x, y| x + y)))
            }
            _ => None,
        }
    }

    pub fn mul_sub(self, b: ConstantValue, c: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        match (self, b, c) {
            (F32(a), F32(b), F32(c)) => Some(F32(a * b - c)),
            (F64(a), F64(b), F64(c)) => Some(F64(a * b - c)),
            (V128(a), V128(b), V128(c)) => {
                let product = map2_f32(a, b, |x, y| x * y);
                Some(V128(map2_f32(product, c, |x, y| x - y)))
            }
            _ => None,
        }
    }

    /// Dot product over the first `n` f32 lanes; the result is scalar F32.
    pub fn dot_product(self, other: ConstantValue, n: usize) -> Option<ConstantValue> {
        match (self, other) {
            (ConstantValue::V128(a), ConstantValue::V128(b)) => {
                let (a, b) = (a.to_f32x4(), b.to_f32x4());
                Some(ConstantValue::F32(
                    (0..n).map(|i| a[i] * b[i]).sum::<f32>(),
                ))
            }
            _ => None,
        }
    }

    scalar_bitop!(and, &);
    scalar_bitop!(or, |);
    scalar_bitop!(xor, ^);

    pub fn not(self) -> Option<ConstantValue> {
        use ConstantValue::*;
        match self {
            I8(v) => Some(I8(!v)),
            I16(v) => Some(I16(!v)),
            I32(v) => Some(I32(!v)),
            I64(v) => Some(I64(!v)),
            V128(v) => Some(V128(Vec128 {
                low: !v.low,
                high: !v.high,
            })),
            _ => None,
        }
    }

    pub fn shl(self, amount: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        let amount = amount.shift_amount()?;
        match self {
            I8(v) => Some(I8(v.wrapping_shl(amount))),
            I16(v) => Some(I16(v.wrapping_shl(amount))),
            I32(v) => Some(I32(v.wrapping_shl(amount))),
            I64(v) => Some(I64(v.wrapping_shl(amount))),
            _ => None,
        }
    }

    pub fn shr(self, amount: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        let amount = amount.shift_amount()?;
        match self {
            I8(v) => Some(I8(v.wrapping_shr(amount))),
            I16(v) => Some(I16(v.wrapping_shr(amount))),
            I32(v) => Some(I32(v.wrapping_shr(amount))),
            I64(v) => Some(I64(v.wrapping_shr(amount))),
            _ => None,
        }
    }

    pub fn sha(self, amount: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        let amount = amount.shift_amount()?;
        match self {
            I8(v) => Some(I8((v as i8).wrapping_shr(amount) as u8)),
            I16(v) => Some(I16((v as i16).wrapping_shr(amount) as u16)),
            I32(v) => Some(I32((v as i32).wrapping_shr(amount) as u32)),
            I64(v) => Some(I64((v as i64).wrapping_shr(amount) as u64)),
            _ => None,
        }
    }

    pub fn rotate_left(self, amount: ConstantValue) -> Option<ConstantValue> {
        use ConstantValue::*;
        let amount = amount.shift_amount()?;
        match self {
            I8(v) => Some(I8(v.rotate_left(amount))),
            I16(v) => Some(I16(v.rotate_left(amount))),
            I32(v) => Some(I32(v.rotate_left(amount))),
            I64(v) => Some(I64(v.rotate_left(amount))),
            _ => None,
        }
    }

    /// Byte reversal. V128 swaps within each 32-bit lane, matching the guest
    /// vector load/store element ordering.
    pub fn byte_swap(self) -> Option<ConstantValue> {
        use ConstantValue::*;
        match self {
            I8(v) => Some(I8(v)),
            I16(v) => Some(I16(v.swap_bytes())),
            I32(v) => Some(I32(v.swap_bytes())),
            I64(v) => Some(I64(v.swap_bytes())),
            V128(v) => Some(V128(map_u32(v, u32::swap_bytes))),
            _ => None,
        }
    }

    /// Leading zero count; the destination is always I8.
    pub fn count_leading_zeros(self) -> Option<ConstantValue> {
        use ConstantValue::*;
        match self {
            I8(v) => Some(I8(v.leading_zeros() as u8)),
            I16(v) => Some(I8(v.leading_zeros() as u8)),
            I32(v) => Some(I8(v.leading_zeros() as u8)),
            I64(v) => Some(I8(v.leading_zeros() as u8)),
            _ => None,
        }
    }

    pub fn compare(self, kind: CompareKind, other: ConstantValue) -> Option<bool> {
        use ConstantValue::*;

        fn cmp_int(kind: CompareKind, a: u64, b: u64, sa: i64, sb: i64) -> bool {
            match kind {
                CompareKind::Eq => a == b,
                CompareKind::Ne => a != b,
                CompareKind::Slt => sa < sb,
                CompareKind::Sle => sa <= sb,
                CompareKind::Sgt => sa > sb,
                CompareKind::Sge => sa >= sb,
                CompareKind::Ult => a < b,
                CompareKind::Ule => a <= b,
                CompareKind::Ugt => a > b,
                CompareKind::Uge => a >= b,
            }
        }

        fn cmp_float(kind: CompareKind, a: f64, b: f64) -> bool {
            match kind {
                CompareKind::Eq => a == b,
                CompareKind::Ne => a != b,
                CompareKind::Slt | CompareKind::Ult => a < b,
                CompareKind::Sle | CompareKind::Ule => a <= b,
                CompareKind::Sgt | CompareKind::Ugt => a > b,
                CompareKind::Sge | CompareKind::Uge => a >= b,
            }
        }

        match (self, other) {
            (I8(a), I8(b)) => Some(cmp_int(kind, a as u64, b as u64, a as i8 as i64, b as i8 as i64)),
            (I16(a), I16(b)) => {
                Some(cmp_int(kind, a as u64, b as u64, a as i16 as i64, b as i16 as i64))
            }
            (I32(a), I32(b)) => {
                Some(cmp_int(kind, a as u64, b as u64, a as i32 as i64, b as i32 as i64))
            }
            (I64(a), I64(b)) => Some(cmp_int(kind, a, b, a as i64, b as i64)),
            (F32(a), F32(b)) => Some(cmp_float(kind, a as f64, b as f64)),
            (F64(a), F64(b)) => Some(cmp_float(kind, a, b)),
            _ => None,
        }
    }

    pub fn is_nan(self) -> Option<bool> {
        match self {
            ConstantValue::F32(v) => Some(v.is_nan()),
            ConstantValue::F64(v) => Some(v.is_nan()),
            _ => None,
        }
    }

    /// Per-lane comparison producing all-ones/all-zeros lane masks.
    pub fn vector_compare(
        self,
        kind: CompareKind,
        part: TypeKind,
        other: ConstantValue,
    ) -> Option<ConstantValue> {
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };

        let result = match (kind, part) {
            (CompareKind::Eq, TypeKind::I8) => map2_u8(a, b, |x, y| if x == y { !0 } else { 0 }),
            (CompareKind::Eq, TypeKind::I16) => map2_u16(a, b, |x, y| if x == y { !0 } else { 0 }),
            (CompareKind::Eq, TypeKind::I32 | TypeKind::F32) => {
                map2_u32(a, b, |x, y| if x == y { !0 } else { 0 })
            }
            (CompareKind::Eq, TypeKind::I64 | TypeKind::F64) => {
                map2_u64(a, b, |x, y| if x == y { !0 } else { 0 })
            }
            (CompareKind::Sgt, TypeKind::I8) => {
                map2_u8(a, b, |x, y| if (x as i8) > (y as i8) { !0 } else { 0 })
            }
            (CompareKind::Sgt, TypeKind::I16) => {
                map2_u16(a, b, |x, y| if (x as i16) > (y as i16) { !0 } else { 0 })
            }
            (CompareKind::Sgt, TypeKind::I32) => {
                map2_u32(a, b, |x, y| if (x as i32) > (y as i32) { !0 } else { 0 })
            }
            (CompareKind::Sgt, TypeKind::I64) => {
                map2_u64(a, b, |x, y| if (x as i64) > (y as i64) { !0 } else { 0 })
            }
            (CompareKind::Sgt, TypeKind::F32) => map2_u32(a, b, |x, y| {
                if f32::from_bits(x) > f32::from_bits(y) { !0 } else { 0 }
            }),
            (CompareKind::Sge, TypeKind::I8) => {
                map2_u8(a, b, |x, y| if (x as i8) >= (y as i8) { !0 } else { 0 })
            }
            (CompareKind::Sge, TypeKind::I16) => {
                map2_u16(a, b, |x, y| if (x as i16) >= (y as i16) { !0 } else { 0 })
            }
            (CompareKind::Sge, TypeKind::I32) => {
                map2_u32(a, b, |x, y| if (x as i32) >= (y as i32) { !0 } else { 0 })
            }
            (CompareKind::Sge, TypeKind::I64) => {
                map2_u64(a, b, |x, y| if (x as i64) >= (y as i64) { !0 } else { 0 })
            }
            (CompareKind::Sge, TypeKind::F32) => map2_u32(a, b, |x, y| {
                if f32::from_bits(x) >= f32::from_bits(y) { !0 } else { 0 }
            }),
            (CompareKind::Ugt, TypeKind::I8) => map2_u8(a, b, |x, y| if x > y { !0 } else { 0 }),
            (CompareKind::Ugt, TypeKind::I16) => map2_u16(a, b, |x, y| if x > y { !0 } else { 0 }),
            (CompareKind::Ugt, TypeKind::I32) => map2_u32(a, b, |x, y| if x > y { !0 } else { 0 }),
            (CompareKind::Ugt, TypeKind::I64) => map2_u64(a, b, |x, y| if x > y { !0 } else { 0 }),
            (CompareKind::Uge, TypeKind::I8) => map2_u8(a, b, |x, y| if x >= y { !0 } else { 0 }),
            (CompareKind::Uge, TypeKind::I16) => map2_u16(a, b, |x, y| if x >= y { !0 } else { 0 }),
            (CompareKind::Uge, TypeKind::I32) => map2_u32(a, b, |x, y| if x >= y { !0 } else { 0 }),
            (CompareKind::Uge, TypeKind::I64) => map2_u64(a, b, |x, y| if x >= y { !0 } else { 0 }),
            _ => return None,
        };
        Some(ConstantValue::V128(result))
    }

    /// Per-lane wrapping add. Saturating lanes are not folded.
    pub fn vector_add(
        self,
        other: ConstantValue,
        part: TypeKind,
        saturate: bool,
    ) -> Option<ConstantValue> {
        if saturate {
            return None;
        }
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        let result = match part {
            TypeKind::I8 => map2_u8(a, b, u8::wrapping_add),
            TypeKind::I16 => map2_u16(a, b, u16::wrapping_add),
            TypeKind::I32 => map2_u32(a, b, u32::wrapping_add),
            TypeKind::I64 => map2_u64(a, b, u64::wrapping_add),
            TypeKind::F32 => map2_f32(a, b, |x, y| x + y),
            TypeKind::F64 => map2_f64(a, b, |x, y| x + y),
            TypeKind::V128 => return None,
        };
        Some(ConstantValue::V128(result))
    }

    pub fn vector_sub(
        self,
        other: ConstantValue,
        part: TypeKind,
        saturate: bool,
    ) -> Option<ConstantValue> {
        if saturate {
            return None;
        }
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        let result = match part {
            TypeKind::I8 => map2_u8(a, b, u8::wrapping_sub),
            TypeKind::I16 => map2_u16(a, b, u16::wrapping_sub),
            TypeKind::I32 => map2_u32(a, b, u32::wrapping_sub),
            TypeKind::I64 => map2_u64(a, b, u64::wrapping_sub),
            TypeKind::F32 => map2_f32(a, b, |x, y| x - y),
            TypeKind::F64 => map2_f64(a, b, |x, y| x - y),
            TypeKind::V128 => return None,
        };
        Some(ConstantValue::V128(result))
    }

    /// Rounded unsigned average over 16-bit lanes, the only form the guest
    /// vector ISA produces.
    pub fn vector_average(
        self,
        other: ConstantValue,
        part: TypeKind,
        unsigned: bool,
    ) -> Option<ConstantValue> {
        if part != TypeKind::I16 || !unsigned {
            return None;
        }
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        Some(ConstantValue::V128(map2_u16(a, b, |x, y| {
            ((x as u32 + y as u32 + 1) >> 1) as u16
        })))
    }

    /// Per-lane shift left; the shift amount lane is masked to the lane width.
    pub fn vector_shl(self, other: ConstantValue, part: TypeKind) -> Option<ConstantValue> {
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        let result = match part {
            TypeKind::I8 => map2_u8(a, b, |x, s| x << (s & 0x7)),
            TypeKind::I16 => map2_u16(a, b, |x, s| x << (s & 0xF)),
            TypeKind::I32 => map2_u32(a, b, |x, s| x << (s & 0x1F)),
            _ => return None,
        };
        Some(ConstantValue::V128(result))
    }

    pub fn vector_shr(self, other: ConstantValue, part: TypeKind) -> Option<ConstantValue> {
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        let result = match part {
            TypeKind::I8 => map2_u8(a, b, |x, s| x >> (s & 0x7)),
            TypeKind::I16 => map2_u16(a, b, |x, s| x >> (s & 0xF)),
            TypeKind::I32 => map2_u32(a, b, |x, s| x >> (s & 0x1F)),
            _ => return None,
        };
        Some(ConstantValue::V128(result))
    }

    pub fn vector_rotate_left(self, other: ConstantValue, part: TypeKind) -> Option<ConstantValue> {
        let (ConstantValue::V128(a), ConstantValue::V128(b)) = (self, other) else {
            return None;
        };
        let result = match part {
            TypeKind::I8 => map2_u8(a, b, |x, s| x.rotate_left((s & 0x7) as u32)),
            TypeKind::I16 => map2_u16(a, b, |x, s| x.rotate_left((s & 0xF) as u32)),
            TypeKind::I32 => map2_u32(a, b, |x, s| x.rotate_left(s & 0x1F)),
            _ => return None,
        };
        Some(ConstantValue::V128(result))
    }

    pub fn vector_convert_i2f(self, unsigned: bool) -> Option<ConstantValue> {
        let ConstantValue::V128(v) = self else {
            return None;
        };
        Some(ConstantValue::V128(Vec128::from_f32x4(v.to_u32x4().map(
            |lane| {
                if unsigned {
                    lane as f32
                } else {
                    lane as i32 as f32
                }
            },
        ))))
    }

    pub fn vector_convert_f2i(self, unsigned: bool) -> Option<ConstantValue> {
        let ConstantValue::V128(v) = self else {
            return None;
        };
        Some(ConstantValue::V128(Vec128::from_u32x4(v.to_f32x4().map(
            |lane| {
                if unsigned {
                    lane as u32
                } else {
                    lane as i32 as u32
                }
            },
        ))))
    }
}

fn map_f32(v: Vec128, f: impl Fn(f32) -> f32) -> Vec128 {
    Vec128::from_f32x4(v.to_f32x4().map(f))
}

fn map_u32(v: Vec128, f: impl Fn(u32) -> u32) -> Vec128 {
    Vec128::from_u32x4(v.to_u32x4().map(f))
}

fn map2_u8(a: Vec128, b: Vec128, f: impl Fn(u8, u8) -> u8) -> Vec128 {
    let (a, b) = (a.to_u8x16(), b.to_u8x16());
    Vec128::from_u8x16(core::array::from_fn(|i| f(a[i], b[i])))
}

fn map2_u16(a: Vec128, b: Vec128, f: impl Fn(u16, u16) -> u16) -> Vec128 {
    let (a, b) = (a.to_u16x8(), b.to_u16x8());
    Vec128::from_u16x8(core::array::from_fn(|i| f(a[i], b[i])))
}

fn map2_u32(a: Vec128, b: Vec128, f: impl Fn(u32, u32) -> u32) -> Vec128 {
    let (a, b) = (a.to_u32x4(), b.to_u32x4());
    Vec128::from_u32x4(core::array::from_fn(|i| f(a[i], b[i])))
}

fn map2_u64(a: Vec128, b: Vec128, f: impl Fn(u64, u64) -> u64) -> Vec128 {
    let (a, b) = (a.to_u64x2(), b.to_u64x2());
    Vec128::from_u64x2(core::array::from_fn(|i| f(a[i], b[i])))
}

fn map2_f32(a: Vec128, b: Vec128, f: impl Fn(f32, f32) -> f32) -> Vec128 {
    let (a, b) = (a.to_f32x4(), b.to_f32x4());
    Vec128::from_f32x4(core::array::from_fn(|i| f(a[i], b[i])))
}

fn map2_f64(a: Vec128, b: Vec128, f: impl Fn(f64, f64) -> f64) -> Vec128 {
    let (a, b) = (a.to_f64x2(), b.to_f64x2());
    Vec128::from_f64x2(core::array::from_fn(|i| f(a[i], b[i])))
}

/// A back-reference from a value to one operand slot that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub instr: InstrId,
    pub slot: u8,
}

/// A typed virtual register: either a compile-time constant or the result of
/// exactly one defining instruction.
#[derive(Debug)]
pub struct Value {
    pub ty: TypeKind,
    pub constant: Option<ConstantValue>,
    pub def: Option<InstrId>,
    pub uses: Vec<Use>,
    /// Explicit storage assigned once the value crosses a block boundary.
    pub local_slot: Option<LocalId>,
}

impl Value {
    pub fn new(ty: TypeKind) -> Self {
        Self {
            ty,
            constant: None,
            def: None,
            uses: Vec::new(),
            local_slot: None,
        }
    }

    pub fn from_constant(constant: ConstantValue) -> Self {
        Self {
            ty: constant.ty(),
            constant: Some(constant),
            def: None,
            uses: Vec::new(),
            local_slot: None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    /// Mutates this value into a constant; it no longer has a defining
    /// instruction.
    pub fn set_constant(&mut self, constant: ConstantValue) {
        self.ty = constant.ty();
        self.constant = Some(constant);
        self.def = None;
    }
}
