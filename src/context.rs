//! What the optimizer is allowed to know about the world outside the
//! function being compiled.
//!
//! Passes never reach into the runtime directly. They go through an
//! [`OptimizationContext`], which bundles the lookups the passes may perform
//! and can be constructed with every capability switched off, in which case
//! the affected rewrites simply do not fire.

use crate::hir::{ConstantValue, TypeKind};

/// Opaque handle to a resolved guest function, usable as a direct call
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub u32);

impl core::fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn_{:08X}", self.0)
    }
}

/// Opaque handle to a registered MMIO range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmioRangeId(pub u32);

/// Maps guest addresses to compiled functions.
pub trait FunctionResolver {
    fn resolve(&self, address: u32) -> Option<FunctionHandle>;
}

/// Answers questions about the guest address space.
pub trait MemoryOracle {
    /// The MMIO range covering `address`, if it falls inside one.
    fn mmio_range(&self, address: u32) -> Option<MmioRangeId>;

    /// The current contents of `address` if it lies in memory the runtime
    /// guarantees will never change, read as `ty`.
    fn read_only_constant(&self, address: u32, ty: TypeKind) -> Option<ConstantValue>;
}

pub struct OptimizationContext<'a> {
    resolver: Option<&'a dyn FunctionResolver>,
    memory: Option<&'a dyn MemoryOracle>,
    /// Folds constant-address loads/stores inside MMIO ranges into dedicated
    /// MMIO accesses. On by default.
    pub fuse_mmio: bool,
}

impl<'a> OptimizationContext<'a> {
    pub fn new(resolver: &'a dyn FunctionResolver, memory: &'a dyn MemoryOracle) -> Self {
        Self {
            resolver: Some(resolver),
            memory: Some(memory),
            fuse_mmio: true,
        }
    }

    /// A context with every external capability absent. Rewrites that need
    /// one do not fire.
    pub fn disabled() -> Self {
        Self {
            resolver: None,
            memory: None,
            fuse_mmio: true,
        }
    }

    pub fn resolve_function(&self, address: u32) -> Option<FunctionHandle> {
        self.resolver?.resolve(address)
    }

    pub fn mmio_range(&self, address: u32) -> Option<MmioRangeId> {
        if !self.fuse_mmio {
            return None;
        }
        self.memory?.mmio_range(address)
    }

    pub fn read_only_constant(&self, address: u32, ty: TypeKind) -> Option<ConstantValue> {
        self.memory?.read_only_constant(address, ty)
    }
}
