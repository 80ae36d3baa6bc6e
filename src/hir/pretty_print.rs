use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    hir::HirFunction,
    hir::instr::{InstrFlags, InstrId, Operand},
    hir::value::ConstantValue,
    index::Index,
};

/// Dumps a function to stdout, one block per label.
pub fn pretty_print_function(function: &HirFunction) {
    print!("{}", format_function(function));
}

/// Renders a function as text. Color codes follow the global `colored`
/// settings, so piped output stays plain.
pub fn format_function(function: &HirFunction) -> String {
    let mut out = String::new();
    for &block_id in &function.block_order {
        writeln!(out, "{}", format!("b{}:", block_id.index()).bright_red()).unwrap();

        for id in function.block_instrs(block_id) {
            writeln!(out, "  {}", InstrDisplay { function, id }).unwrap();
        }
    }
    out
}

struct InstrDisplay<'a> {
    function: &'a HirFunction,
    id: InstrId,
}

impl core::fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let instr = &self.function.instrs[self.id];

        if let Some(dest) = instr.dest {
            write!(
                f,
                "{} {} ",
                format!("v{}.{}", dest.index(), self.function.values[dest].ty).green(),
                "=".white()
            )?;
        }

        write!(f, "{}", instr.opcode.to_string().cyan())?;
        if instr.flags.contains(InstrFlags::BYTE_SWAP) {
            write!(f, "{}", ".swap".cyan())?;
        }

        let operands = instr
            .operands
            .iter()
            .filter(|operand| !matches!(operand, Operand::None))
            .map(|operand| self.operand(operand))
            .join(", ");
        if !operands.is_empty() {
            write!(f, " {operands}")?;
        }

        Ok(())
    }
}

impl InstrDisplay<'_> {
    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::None => String::new(),
            Operand::Value(id) => {
                let value = &self.function.values[*id];
                match value.constant {
                    Some(constant) => constant.to_string().purple().to_string(),
                    None => format!("v{}.{}", id.index(), value.ty).green().to_string(),
                }
            }
            Operand::Label(id) => format!("b{}", id.index()).bright_red().to_string(),
            Operand::Symbol(handle) => format!("<{handle}>").blue().to_string(),
            Operand::Offset(offset) => format!("+{offset:#x}").purple().to_string(),
        }
    }
}

impl core::fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstantValue::I8(v) => write!(f, "{v:#x}.i8"),
            ConstantValue::I16(v) => write!(f, "{v:#x}.i16"),
            ConstantValue::I32(v) => write!(f, "{v:#x}.i32"),
            ConstantValue::I64(v) => write!(f, "{v:#x}.i64"),
            ConstantValue::F32(v) => write!(f, "{v}.f32"),
            ConstantValue::F64(v) => write!(f, "{v}.f64"),
            ConstantValue::V128(v) => write!(f, "[{:#018x}:{:#018x}].v128", v.high, v.low),
        }
    }
}
