//! The high-level IR: typed values, a closed opcode set, and function bodies
//! laid out as index arenas.

pub mod function;
pub mod instr;
pub mod opcode;
pub mod pretty_print;
pub mod value;

pub use function::{Block, BlockId, HirFunction, Local, LocalId};
pub use instr::{Instr, InstrFlags, InstrId, Operand};
pub use opcode::{Opcode, OperandKind};
pub use value::{CompareKind, ConstantValue, RoundMode, TypeKind, Use, Value, ValueId, Vec128};
