//! Terms and the interning arena
//!
//! A term is one node of the computation graph: either a raw data column
//! (a leaf) or a computation over other terms' rolling windows. Terms live
//! in an arena and are identified by index; structurally identical requests
//! (same kind, inputs, window length, domain and dtype) intern to the same
//! index, which is what deduplicates shared subexpressions across a
//! pipeline's outputs.

use crate::dataset::Column;
use crate::domain::{infer_domain, Domain};
use crate::error::{PipelineError, Result};
use crate::pipeline::factors::{Computation, ComputationKey};
use crate::types::{DType, MissingValue};
use hashbrown::HashMap;

/// Arena index of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(usize);

impl TermId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a term computes
#[derive(Debug, Clone)]
pub enum TermKind {
    /// Raw data column served by the loader
    Column(Column),
    /// Function of the inputs' rolling windows
    Computed(Computation),
}

/// One node of the term graph
#[derive(Debug, Clone)]
pub struct TermInfo {
    pub kind: TermKind,
    pub inputs: Vec<TermId>,
    /// Rows of history each output row consumes; 0 for leaves
    pub window_length: usize,
    pub domain: Domain,
    pub dtype: DType,
    pub missing_value: MissingValue,
}

impl TermInfo {
    pub fn is_loadable(&self) -> bool {
        matches!(self.kind, TermKind::Column(_))
    }

    /// Human-readable label for errors and logs
    pub fn description(&self) -> String {
        match &self.kind {
            TermKind::Column(column) => column.qualified_name(),
            TermKind::Computed(comp) => {
                format!("{}(window={})", comp.name(), self.window_length)
            }
        }
    }
}

/// Structural interning key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KindKey {
    Column(usize, usize),
    Computed(ComputationKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TermKey {
    kind: KindKey,
    inputs: Vec<TermId>,
    window_length: usize,
    domain: Domain,
    dtype: DType,
}

/// Arena of interned terms
#[derive(Debug, Clone, Default)]
pub struct TermArena {
    terms: Vec<TermInfo>,
    index: HashMap<TermKey, TermId>,
}

impl TermArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The term at `id`. Ids are only ever produced by this arena (or a
    /// clone of it), so the index is always in bounds.
    pub fn term(&self, id: TermId) -> &TermInfo {
        &self.terms[id.0]
    }

    /// Leaf term for a data column
    pub fn column(&mut self, column: &Column) -> TermId {
        let (dataset_ptr, index) = column.identity();
        let key = TermKey {
            kind: KindKey::Column(dataset_ptr, index),
            inputs: Vec::new(),
            window_length: 0,
            domain: column.domain().clone(),
            dtype: column.dtype(),
        };
        self.intern(key, || TermInfo {
            kind: TermKind::Column(column.clone()),
            inputs: Vec::new(),
            window_length: 0,
            domain: column.domain().clone(),
            dtype: column.dtype(),
            missing_value: column.missing_value(),
        })
    }

    /// Computed term over `inputs` with a rolling window of `window_length`
    /// rows. The node's domain is inferred from its inputs; mixing two
    /// concrete domains fails here.
    pub fn computed(
        &mut self,
        computation: Computation,
        inputs: &[TermId],
        window_length: usize,
    ) -> Result<TermId> {
        if window_length == 0 {
            return Err(PipelineError::InvalidOperation(format!(
                "{} requires a window of at least 1 row",
                computation.name()
            )));
        }
        if inputs.is_empty() {
            return Err(PipelineError::InvalidOperation(format!(
                "{} requires at least one input",
                computation.name()
            )));
        }
        let input_domains: Vec<Domain> = inputs
            .iter()
            .map(|id| self.term(*id).domain.clone())
            .collect();
        let domain = infer_domain(&input_domains)?;
        let input_dtypes: Vec<DType> =
            inputs.iter().map(|id| self.term(*id).dtype).collect();
        let dtype = computation.output_dtype(&input_dtypes)?;
        let key = TermKey {
            kind: KindKey::Computed(computation.key()),
            inputs: inputs.to_vec(),
            window_length,
            domain: domain.clone(),
            dtype,
        };
        Ok(self.intern(key, || TermInfo {
            kind: TermKind::Computed(computation.clone()),
            inputs: inputs.to_vec(),
            window_length,
            domain: domain.clone(),
            dtype,
            missing_value: dtype.default_missing(),
        }))
    }

    /// The term's counterpart bound to `domain`, interning any nodes the
    /// rebinding creates. A generic term and its specialized counterpart
    /// are distinct nodes until specialization makes them structurally
    /// identical, at which point they unify.
    pub fn specialize(&mut self, id: TermId, domain: &Domain) -> Result<TermId> {
        let info = self.term(id).clone();
        if info.domain == *domain {
            return Ok(id);
        }
        if !info.domain.is_generic() {
            return Err(PipelineError::Domain(format!(
                "term {} is bound to {} and cannot be specialized to {}",
                info.description(),
                info.domain,
                domain
            )));
        }
        match info.kind {
            TermKind::Column(column) => {
                let specialized = column.specialize(domain)?;
                Ok(self.column(&specialized))
            }
            TermKind::Computed(computation) => {
                let inputs: Vec<TermId> = info
                    .inputs
                    .iter()
                    .map(|input| self.specialize(*input, domain))
                    .collect::<Result<_>>()?;
                self.computed(computation, &inputs, info.window_length)
            }
        }
    }

    /// Rewire a node's inputs, bypassing interning. Only exists so graph
    /// tests can build malformed graphs; the public constructors cannot
    /// produce a cycle.
    #[cfg(test)]
    pub(crate) fn set_inputs(&mut self, id: TermId, inputs: Vec<TermId>) {
        self.terms[id.0].inputs = inputs;
    }

    fn intern(&mut self, key: TermKey, build: impl FnOnce() -> TermInfo) -> TermId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = TermId(self.terms.len());
        self.terms.push(build());
        self.index.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing_dataset;
    use crate::domain::Domain;

    #[test]
    fn test_column_terms_intern() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let volume = dataset.column("volume").unwrap();
        let mut arena = TermArena::new();

        let a = arena.column(&close);
        let b = arena.column(&close);
        let c = arena.column(&volume);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.len(), 2);
        assert!(arena.term(a).is_loadable());
        assert_eq!(arena.term(a).window_length, 0);
    }

    #[test]
    fn test_computed_terms_intern() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let mut arena = TermArena::new();
        let leaf = arena.column(&close);

        let a = arena
            .computed(Computation::WindowSum, &[leaf], 3)
            .unwrap();
        let b = arena
            .computed(Computation::WindowSum, &[leaf], 3)
            .unwrap();
        let c = arena
            .computed(Computation::WindowSum, &[leaf], 10)
            .unwrap();
        let d = arena
            .computed(Computation::WindowMean, &[leaf], 3)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_computed_domain_inference() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let us_close = close.specialize(&Domain::us_equities()).unwrap();
        let mut arena = TermArena::new();

        let generic_leaf = arena.column(&close);
        let us_leaf = arena.column(&us_close);
        assert_ne!(generic_leaf, us_leaf);

        let generic_sum = arena
            .computed(Computation::WindowSum, &[generic_leaf], 3)
            .unwrap();
        let us_sum = arena
            .computed(Computation::WindowSum, &[us_leaf], 3)
            .unwrap();
        assert!(arena.term(generic_sum).domain.is_generic());
        assert_eq!(arena.term(us_sum).domain, Domain::us_equities());
        assert_ne!(generic_sum, us_sum);
    }

    #[test]
    fn test_conflicting_input_domains_fail() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let us_close = close.specialize(&Domain::us_equities()).unwrap();
        let uk_close = close.specialize(&Domain::uk_equities()).unwrap();
        let mut arena = TermArena::new();
        let us_leaf = arena.column(&us_close);
        let uk_leaf = arena.column(&uk_close);
        // A custom kernel would accept two inputs, but mixed markets are
        // rejected before dtype checks matter.
        let result = arena.computed(Computation::WindowSum, &[us_leaf, uk_leaf], 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_specialize_unifies_with_counterpart() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let us = Domain::us_equities();
        let us_close = close.specialize(&us).unwrap();
        let mut arena = TermArena::new();

        let generic_leaf = arena.column(&close);
        let us_leaf = arena.column(&us_close);
        let generic_sum = arena
            .computed(Computation::WindowSum, &[generic_leaf], 3)
            .unwrap();
        let us_sum = arena
            .computed(Computation::WindowSum, &[us_leaf], 3)
            .unwrap();

        // Specializing the generic nodes lands on the already-interned
        // specialized nodes.
        assert_eq!(arena.specialize(generic_leaf, &us).unwrap(), us_leaf);
        assert_eq!(arena.specialize(generic_sum, &us).unwrap(), us_sum);
        // Specializing an already-bound node to its own domain is a no-op.
        assert_eq!(arena.specialize(us_sum, &us).unwrap(), us_sum);
    }

    #[test]
    fn test_specialize_to_other_market_fails() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let us_close = close.specialize(&Domain::us_equities()).unwrap();
        let mut arena = TermArena::new();
        let us_leaf = arena.column(&us_close);
        assert!(arena
            .specialize(us_leaf, &Domain::uk_equities())
            .is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let mut arena = TermArena::new();
        let leaf = arena.column(&close);
        assert!(arena.computed(Computation::Latest, &[leaf], 0).is_err());
        assert!(arena.computed(Computation::Latest, &[], 1).is_err());
    }
}
