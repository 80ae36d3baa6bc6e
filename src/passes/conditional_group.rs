//! Drives a group of passes to a fixed point.
//!
//! Members run in order, repeatedly. Subpass members report whether they
//! changed the function; a sweep where no subpass reports a change is the
//! fixed point. Plain pass members run on every sweep but never extend the
//! iteration. Debug builds cap the sweep count so a rewrite pair that keeps
//! undoing each other surfaces as an error instead of a hang.

use crate::{
    context::OptimizationContext,
    hir::HirFunction,
    passes::{Pass, PassError, Subpass},
};

const MAX_SWEEPS: usize = 10_000;

pub enum GroupMember {
    Pass(Box<dyn Pass>),
    Subpass(Box<dyn Subpass>),
}

pub struct ConditionalGroupPass {
    members: Vec<GroupMember>,
    last_sweep_count: usize,
}

impl ConditionalGroupPass {
    pub fn new(members: Vec<GroupMember>) -> Self {
        Self {
            members,
            last_sweep_count: 0,
        }
    }

    /// How many sweeps the previous `run` took to settle.
    pub fn last_sweep_count(&self) -> usize {
        self.last_sweep_count
    }
}

impl Pass for ConditionalGroupPass {
    fn name(&self) -> &'static str {
        "conditional_group"
    }

    fn run(
        &mut self,
        function: &mut HirFunction,
        context: &OptimizationContext<'_>,
    ) -> Result<(), PassError> {
        let mut sweeps = 0;
        loop {
            sweeps += 1;
            if cfg!(debug_assertions) && sweeps > MAX_SWEEPS {
                return Err(PassError::FixedPointDivergence {
                    pass: self.name(),
                    sweeps,
                });
            }
            let mut dirty = false;
            for member in &mut self.members {
                match member {
                    GroupMember::Pass(pass) => pass.run(function, context)?,
                    GroupMember::Subpass(subpass) => dirty |= subpass.run(function, context)?,
                }
            }
            if !dirty {
                break;
            }
        }
        self.last_sweep_count = sweeps;
        Ok(())
    }
}
