//! The optimization pipeline.
//!
//! Passes run once per invocation; subpasses additionally report whether they
//! changed anything, which lets [`conditional_group::ConditionalGroupPass`]
//! drive them to a fixed point.

pub mod conditional_group;
pub mod constant_propagation;
pub mod data_flow_analysis;
pub mod finalization;
pub mod memory_sequence;

use thiserror::Error;

use crate::{context::OptimizationContext, hir::HirFunction};

pub use conditional_group::{ConditionalGroupPass, GroupMember};
pub use constant_propagation::ConstantPropagation;
pub use data_flow_analysis::DataFlowAnalysis;
pub use finalization::Finalization;
pub use memory_sequence::MemorySequenceCombination;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("{pass} did not reach a fixed point after {sweeps} sweeps")]
    FixedPointDivergence { pass: &'static str, sweeps: usize },

    #[error("malformed IR in {pass}: {detail}")]
    MalformedIr { pass: &'static str, detail: String },
}

/// A transformation run exactly once per pipeline invocation.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        function: &mut HirFunction,
        context: &OptimizationContext<'_>,
    ) -> Result<(), PassError>;
}

/// A transformation that can be iterated: `run` reports whether it changed
/// the function, so a driver can sweep until nothing moves.
pub trait Subpass {
    fn name(&self) -> &'static str;

    fn run(
        &mut self,
        function: &mut HirFunction,
        context: &OptimizationContext<'_>,
    ) -> Result<bool, PassError>;
}

/// The standard pipeline: constant propagation and memory sequence
/// combination iterated together, then dataflow analysis, then finalization.
pub fn default_pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(ConditionalGroupPass::new(vec![
            GroupMember::Subpass(Box::new(ConstantPropagation)),
            GroupMember::Subpass(Box::new(MemorySequenceCombination)),
        ])),
        Box::new(DataFlowAnalysis),
        Box::new(Finalization),
    ]
}

pub fn run_pipeline(
    passes: &mut [Box<dyn Pass>],
    function: &mut HirFunction,
    context: &OptimizationContext<'_>,
) -> Result<(), PassError> {
    for pass in passes {
        pass.run(function, context)?;
    }
    Ok(())
}
