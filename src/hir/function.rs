//! Function bodies: the arenas for values, instructions, blocks and locals,
//! plus the mutation API the passes go through.
//!
//! All cross-references are typed indices into the arenas. Instructions form
//! a doubly linked list per block, so inserting or removing one is a pointer
//! splice and never invalidates another instruction's id. The builder keeps
//! value use lists and definition links consistent on every mutation;
//! passes never touch `uses`/`def` directly.

use crate::{
    bitset::BitSet,
    hir::instr::{Instr, InstrFlags, InstrId, Operand},
    hir::opcode::Opcode,
    hir::value::{ConstantValue, TypeKind, Use, Value, ValueId},
    index::{IndexVec, simple_index},
};

simple_index! {
    /// Identifies a basic block in the function arena
    pub struct BlockId;
}

simple_index! {
    /// Identifies a stack-allocated local slot
    pub struct LocalId;
}

/// A local stack slot, created when a value has to live across blocks.
#[derive(Debug)]
pub struct Local {
    pub ty: TypeKind,
}

/// A basic block. `ordinal` is the block's position in program order, kept
/// current by linearization and finalization.
#[derive(Debug)]
pub struct Block {
    pub ordinal: u32,
    pub head: Option<InstrId>,
    pub tail: Option<InstrId>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    /// Values defined elsewhere that flow into this block; filled in by
    /// dataflow analysis.
    pub incoming_values: BitSet,
}

impl Block {
    fn new(ordinal: u32) -> Self {
        Self {
            ordinal,
            head: None,
            tail: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            incoming_values: BitSet::new(0),
        }
    }
}

#[derive(Debug, Default)]
pub struct HirFunction {
    pub values: IndexVec<ValueId, Value>,
    pub instrs: IndexVec<InstrId, Instr>,
    pub blocks: IndexVec<BlockId, Block>,
    pub locals: IndexVec<LocalId, Local>,
    /// Blocks in program order. The arena itself is unordered.
    pub block_order: Vec<BlockId>,
}

impl HirFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_value(&mut self, ty: TypeKind) -> ValueId {
        self.values.push(Value::new(ty))
    }

    pub fn constant_value(&mut self, constant: ConstantValue) -> ValueId {
        self.values.push(Value::from_constant(constant))
    }

    pub fn alloc_local(&mut self, ty: TypeKind) -> LocalId {
        self.locals.push(Local { ty })
    }

    pub fn append_block(&mut self) -> BlockId {
        let id = self.blocks.push(Block::new(self.block_order.len() as u32));
        self.block_order.push(id);
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
        }
        if !self.blocks[to].predecessors.contains(&from) {
            self.blocks[to].predecessors.push(from);
        }
    }

    fn new_instr(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) -> InstrId {
        let id = self.instrs.push(Instr {
            opcode,
            flags: InstrFlags::empty(),
            block,
            dest,
            operands,
            prev: None,
            next: None,
        });
        if let Some(dest) = dest {
            self.values[dest].def = Some(id);
        }
        for (slot, value) in self.instrs[id].value_operands().collect::<Vec<_>>() {
            self.values[value].uses.push(Use { instr: id, slot });
        }
        id
    }

    pub fn append_instr(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) -> InstrId {
        let id = self.new_instr(block, opcode, dest, operands);
        match self.blocks[block].tail {
            Some(tail) => {
                self.instrs[tail].next = Some(id);
                self.instrs[id].prev = Some(tail);
            }
            None => self.blocks[block].head = Some(id),
        }
        self.blocks[block].tail = Some(id);
        id
    }

    pub fn insert_before(
        &mut self,
        anchor: InstrId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) -> InstrId {
        let block = self.instrs[anchor].block;
        let id = self.new_instr(block, opcode, dest, operands);
        let prev = self.instrs[anchor].prev;
        self.instrs[id].prev = prev;
        self.instrs[id].next = Some(anchor);
        self.instrs[anchor].prev = Some(id);
        match prev {
            Some(prev) => self.instrs[prev].next = Some(id),
            None => self.blocks[block].head = Some(id),
        }
        id
    }

    pub fn insert_after(
        &mut self,
        anchor: InstrId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) -> InstrId {
        let block = self.instrs[anchor].block;
        let id = self.new_instr(block, opcode, dest, operands);
        let next = self.instrs[anchor].next;
        self.instrs[id].prev = Some(anchor);
        self.instrs[id].next = next;
        self.instrs[anchor].next = Some(id);
        match next {
            Some(next) => self.instrs[next].prev = Some(id),
            None => self.blocks[block].tail = Some(id),
        }
        id
    }

    pub fn insert_at_head(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) -> InstrId {
        match self.blocks[block].head {
            Some(head) => self.insert_before(head, opcode, dest, operands),
            None => self.append_instr(block, opcode, dest, operands),
        }
    }

    /// Unlinks an instruction from its block and drops its operand uses.
    /// The arena slot stays behind; nothing references it afterwards.
    pub fn remove_instr(&mut self, id: InstrId) {
        let (prev, next, block) = {
            let instr = &self.instrs[id];
            (instr.prev, instr.next, instr.block)
        };
        match prev {
            Some(prev) => self.instrs[prev].next = next,
            None => self.blocks[block].head = next,
        }
        match next {
            Some(next) => self.instrs[next].prev = prev,
            None => self.blocks[block].tail = prev,
        }
        for slot in 0..3 {
            self.clear_operand_use(id, slot);
            self.instrs[id].operands[slot as usize] = Operand::None;
        }
        if let Some(dest) = self.instrs[id].dest
            && self.values[dest].def == Some(id)
        {
            self.values[dest].def = None;
        }
        self.instrs[id].prev = None;
        self.instrs[id].next = None;
    }

    fn clear_operand_use(&mut self, instr: InstrId, slot: u8) {
        if let Operand::Value(value) = self.instrs[instr].operands[slot as usize] {
            self.values[value]
                .uses
                .retain(|u| !(u.instr == instr && u.slot == slot));
        }
    }

    /// Rewrites one operand slot, keeping use lists consistent.
    pub fn set_operand(&mut self, instr: InstrId, slot: u8, operand: Operand) {
        self.clear_operand_use(instr, slot);
        self.instrs[instr].operands[slot as usize] = operand;
        if let Operand::Value(value) = operand {
            self.values[value].uses.push(Use { instr, slot });
        }
    }

    /// Replaces an instruction in place: new opcode, dest and operands, same
    /// position in the block.
    pub fn replace_instr(
        &mut self,
        id: InstrId,
        opcode: Opcode,
        dest: Option<ValueId>,
        operands: [Operand; 3],
    ) {
        for slot in 0..3 {
            self.clear_operand_use(id, slot);
        }
        let old_dest = self.instrs[id].dest;
        if let Some(old) = old_dest
            && old_dest != dest
            && self.values[old].def == Some(id)
        {
            self.values[old].def = None;
        }
        {
            let instr = &mut self.instrs[id];
            instr.opcode = opcode;
            instr.flags = InstrFlags::empty();
            instr.dest = dest;
            instr.operands = operands;
        }
        if let Some(dest) = dest {
            self.values[dest].def = Some(id);
        }
        for (slot, value) in self.instrs[id].value_operands().collect::<Vec<_>>() {
            self.values[value].uses.push(Use { instr: id, slot });
        }
    }

    /// Turns `id`'s result into a constant and deletes the defining
    /// instruction. Consumers keep referencing the same value.
    pub fn fold_to_constant(&mut self, id: InstrId, constant: ConstantValue) {
        let dest = self.instrs[id]
            .dest
            .expect("folded instruction has a destination");
        self.remove_instr(id);
        self.values[dest].set_constant(constant);
    }

    /// Points every reader of `old` at `new` instead.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.values[old].uses);
        for u in &uses {
            self.instrs[u.instr].operands[u.slot as usize] = Operand::Value(new);
        }
        self.values[new].uses.extend(uses);
    }

    /// Instruction ids of a block in order, snapshotted so the caller can
    /// mutate the block while iterating.
    pub fn block_instrs(&self, block: BlockId) -> Vec<InstrId> {
        let mut out = Vec::new();
        let mut cursor = self.blocks[block].head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.instrs[id].next;
        }
        out
    }

    /// The first control transfer in a block, if any.
    pub fn first_branch(&self, block: BlockId) -> Option<InstrId> {
        let mut cursor = self.blocks[block].head;
        while let Some(id) = cursor {
            if self.instrs[id].opcode.is_branch() {
                return Some(id);
            }
            cursor = self.instrs[id].next;
        }
        None
    }

    /// Reassigns block ordinals to match `block_order`.
    pub fn renumber_blocks(&mut self) {
        for (ordinal, block) in self.block_order.clone().into_iter().enumerate() {
            self.blocks[block].ordinal = ordinal as u32;
        }
    }

    /// The block that lexically follows `block`, if any.
    pub fn next_block(&self, block: BlockId) -> Option<BlockId> {
        let position = self.block_order.iter().position(|b| *b == block)?;
        self.block_order.get(position + 1).copied()
    }

    /// The block defining a value, or `None` for constants and undefined
    /// values.
    pub fn defining_block(&self, value: ValueId) -> Option<BlockId> {
        self.values[value].def.map(|def| self.instrs[def].block)
    }
}
