//! Optimizer for the high-level IR of a PowerPC guest-code recompiler.
//!
//! The frontend translates guest instructions into a simple typed IR
//! ([`hir`]); the passes in [`passes`] then fold constants, fuse the
//! byte-swap sequences a big-endian guest produces around every memory
//! access, route block-crossing values through explicit stack locals, and
//! tidy the block layout for the backend. [`passes::default_pipeline`] wires
//! the passes up in their standard order.

pub mod bitset;
pub mod context;
pub mod hir;
pub mod index;
pub mod passes;

pub use context::{FunctionHandle, FunctionResolver, MemoryOracle, MmioRangeId, OptimizationContext};
pub use hir::{ConstantValue, HirFunction, Opcode, TypeKind};
pub use passes::{Pass, PassError, Subpass, default_pipeline, run_pipeline};
