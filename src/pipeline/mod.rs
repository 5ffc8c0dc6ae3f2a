//! Pipeline definition and execution
//!
//! A pipeline is a set of named output terms plus an optional explicit
//! domain. Terms are built through the pipeline's arena so that shared
//! subexpressions intern to single graph nodes; compiling the pipeline
//! (`ExecutionPlan`) binds everything to one concrete market and produces
//! the execution order the engine drives.

pub mod engine;
pub mod factors;
pub mod graph;
pub mod term;

pub use engine::PipelineEngine;
pub use factors::{Computation, CustomComputation, WindowKernel};
pub use graph::ExecutionPlan;
pub use term::{TermArena, TermId, TermInfo, TermKind};

use crate::dataset::Column;
use crate::domain::Domain;
use crate::error::{PipelineError, Result};

/// A named set of requested computations over one market
#[derive(Debug, Clone)]
pub struct Pipeline {
    arena: TermArena,
    outputs: Vec<(String, TermId)>,
    domain: Domain,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// A pipeline whose domain will be inferred from its terms
    pub fn new() -> Self {
        Self {
            arena: TermArena::new(),
            outputs: Vec::new(),
            domain: Domain::Generic,
        }
    }

    /// A pipeline explicitly bound to `domain`
    pub fn with_domain(domain: Domain) -> Self {
        Self {
            arena: TermArena::new(),
            outputs: Vec::new(),
            domain,
        }
    }

    /// Leaf term for a raw data column
    pub fn column(&mut self, column: &Column) -> TermId {
        self.arena.column(column)
    }

    /// Computed term over existing terms
    pub fn computed(
        &mut self,
        computation: Computation,
        inputs: &[TermId],
        window_length: usize,
    ) -> Result<TermId> {
        self.arena.computed(computation, inputs, window_length)
    }

    /// Request `term` as an output column named `name`.
    ///
    /// Output order is insertion order and drives the result table's column
    /// order.
    pub fn add_output(&mut self, name: impl Into<String>, term: TermId) -> Result<()> {
        let name = name.into();
        if self.outputs.iter().any(|(existing, _)| *existing == name) {
            return Err(PipelineError::InvalidOperation(format!(
                "pipeline already has an output named {}",
                name
            )));
        }
        self.outputs.push((name, term));
        Ok(())
    }

    pub fn outputs(&self) -> &[(String, TermId)] {
        &self.outputs
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn arena(&self) -> &TermArena {
        &self.arena
    }
}
