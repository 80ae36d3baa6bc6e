//! Instructions and their operand slots.

use bitflags::bitflags;

use crate::{
    context::FunctionHandle,
    hir::function::BlockId,
    hir::opcode::Opcode,
    hir::value::ValueId,
    index::simple_index,
};

simple_index! {
    /// Identifies an instruction in the function arena
    pub struct InstrId;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstrFlags: u8 {
        /// Memory access reverses byte order while moving data.
        const BYTE_SWAP = 1 << 0;
    }
}

/// One operand slot. The opcode's signature says which variant each slot
/// must hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    None,
    Value(ValueId),
    Label(BlockId),
    Symbol(FunctionHandle),
    Offset(u64),
}

impl Operand {
    pub fn as_value(self) -> Option<ValueId> {
        match self {
            Operand::Value(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_label(self) -> Option<BlockId> {
        match self {
            Operand::Label(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_offset(self) -> Option<u64> {
        match self {
            Operand::Offset(offset) => Some(offset),
            _ => None,
        }
    }

    pub fn as_symbol(self) -> Option<FunctionHandle> {
        match self {
            Operand::Symbol(handle) => Some(handle),
            _ => None,
        }
    }
}

/// An instruction node. Instructions live in the function arena and are
/// chained into their block through `prev`/`next`, so splicing one in or out
/// never shifts its neighbors.
#[derive(Debug)]
pub struct Instr {
    pub opcode: Opcode,
    pub flags: InstrFlags,
    pub block: BlockId,
    pub dest: Option<ValueId>,
    pub operands: [Operand; 3],
    pub prev: Option<InstrId>,
    pub next: Option<InstrId>,
}

impl Instr {
    /// The value operands actually present, with their slot index.
    pub fn value_operands(&self) -> impl Iterator<Item = (u8, ValueId)> + '_ {
        self.operands
            .iter()
            .enumerate()
            .filter_map(|(slot, operand)| operand.as_value().map(|id| (slot as u8, id)))
    }
}
