//! Execution plan compilation
//!
//! Compiling a pipeline resolves its concrete domain, specializes every
//! requested term to it, linearizes the resulting DAG into a deterministic
//! topological order, and computes how many extra history rows each node
//! must produce for its consumers.

use crate::domain::{infer_domain, Domain};
use crate::error::{PipelineError, Result};
use crate::pipeline::term::{TermArena, TermId, TermInfo};
use crate::pipeline::Pipeline;
use hashbrown::HashMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// A compiled, domain-bound, linearized pipeline
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    arena: TermArena,
    domain: Domain,
    outputs: Vec<(String, TermId)>,
    /// Topological order, dependencies before consumers
    order: Vec<TermId>,
    extra_rows: HashMap<TermId, usize>,
}

impl ExecutionPlan {
    pub fn compile(pipeline: &Pipeline) -> Result<Self> {
        let domain = resolve_domain(pipeline)?;

        // The plan owns its own copy of the terms: specialization interns
        // new nodes, and the pipeline itself must stay reusable.
        let mut arena = pipeline.arena().clone();
        let outputs: Vec<(String, TermId)> = pipeline
            .outputs()
            .iter()
            .map(|(name, id)| Ok((name.clone(), arena.specialize(*id, &domain)?)))
            .collect::<Result<_>>()?;

        let mut marks: HashMap<TermId, Mark> = HashMap::new();
        let mut order: Vec<TermId> = Vec::new();
        for (_, id) in &outputs {
            visit(&arena, *id, &mut marks, &mut order)?;
        }

        // Extra rows propagate transitively: walking consumers before
        // dependencies, each consumer pushes its full requirement down.
        let mut extra_rows: HashMap<TermId, usize> =
            order.iter().map(|id| (*id, 0)).collect();
        for id in order.iter().rev() {
            let info = arena.term(*id);
            let needed = info.window_length.saturating_sub(1) + extra_rows[id];
            for input in &info.inputs {
                let entry = extra_rows
                    .get_mut(input)
                    .expect("dependency precedes consumer in topological order");
                *entry = (*entry).max(needed);
            }
        }

        for id in &order {
            let info = arena.term(*id);
            if info.domain != domain {
                return Err(PipelineError::Domain(format!(
                    "term {} has domain {}, expected {}",
                    info.description(),
                    info.domain,
                    domain
                )));
            }
        }

        log::debug!(
            "compiled execution plan: {} terms, {} outputs, domain {}",
            order.len(),
            outputs.len(),
            domain
        );
        Ok(Self {
            arena,
            domain,
            outputs,
            order,
            extra_rows,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Requested outputs, in pipeline insertion order
    pub fn outputs(&self) -> &[(String, TermId)] {
        &self.outputs
    }

    /// All plan terms, dependencies before consumers
    pub fn execution_order(&self) -> &[TermId] {
        &self.order
    }

    pub fn term(&self, id: TermId) -> &TermInfo {
        self.arena.term(id)
    }

    /// Extra history rows this node must produce beyond its own window
    pub fn extra_rows(&self, id: TermId) -> usize {
        self.extra_rows.get(&id).copied().unwrap_or(0)
    }

    /// Leaf (data column) terms grouped by their extra-row requirement,
    /// which is what the loader is asked to widen date ranges by
    pub fn loadable_groups(&self) -> BTreeMap<usize, Vec<TermId>> {
        let mut groups: BTreeMap<usize, Vec<TermId>> = BTreeMap::new();
        for id in &self.order {
            if self.arena.term(*id).is_loadable() {
                groups.entry(self.extra_rows(*id)).or_default().push(*id);
            }
        }
        groups
    }

    /// Largest leaf buffer requirement; bounds how much history a run needs
    pub fn max_extra_rows(&self) -> usize {
        self.loadable_groups().keys().max().copied().unwrap_or(0)
    }

    pub fn num_terms(&self) -> usize {
        self.order.len()
    }
}

fn resolve_domain(pipeline: &Pipeline) -> Result<Domain> {
    let output_domains: Vec<Domain> = pipeline
        .outputs()
        .iter()
        .map(|(_, id)| pipeline.arena().term(*id).domain.clone())
        .collect();
    let inferred = infer_domain(&output_domains)?;
    match (pipeline.domain(), inferred) {
        (Domain::Generic, Domain::Generic) => Err(PipelineError::Domain(
            "could not infer pipeline domain: no concrete domain among terms; \
             pass one explicitly"
                .to_string(),
        )),
        (Domain::Generic, concrete) => Ok(concrete),
        (explicit, Domain::Generic) => Ok(explicit.clone()),
        (explicit, concrete) if *explicit == concrete => Ok(concrete),
        (explicit, concrete) => Err(PipelineError::Domain(format!(
            "pipeline domain {} conflicts with inferred term domain {}",
            explicit, concrete
        ))),
    }
}

fn visit(
    arena: &TermArena,
    id: TermId,
    marks: &mut HashMap<TermId, Mark>,
    order: &mut Vec<TermId>,
) -> Result<()> {
    match marks.get(&id).copied().unwrap_or(Mark::White) {
        Mark::Black => return Ok(()),
        Mark::Grey => {
            return Err(PipelineError::Cycle(arena.term(id).description()));
        }
        Mark::White => {}
    }
    marks.insert(id, Mark::Grey);
    for input in &arena.term(id).inputs {
        visit(arena, *input, marks, order)?;
    }
    marks.insert(id, Mark::Black);
    order.push(id);
    Ok(())
}
