//! Dataset and column declarations
//!
//! A `DataSet` is a named group of typed column declarations. Datasets are
//! declared once, generically, and bound ("specialized") to concrete market
//! domains on demand. Specialization is memoized per dataset and per domain:
//! specializing the same dataset to the same domain twice yields the same
//! `Arc`, which is what lets the term graph deduplicate structurally
//! identical nodes and lets loaders share one generic-keyed lookup.

use crate::domain::Domain;
use crate::error::{PipelineError, Result};
use crate::types::{DType, MissingValue};
use hashbrown::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// A single column declaration: a named, typed slot
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub dtype: DType,
    pub missing_value: MissingValue,
}

impl ColumnDef {
    /// Column with the conventional missing value for its dtype
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            missing_value: dtype.default_missing(),
        }
    }

    pub fn with_missing_value(mut self, missing_value: MissingValue) -> Self {
        self.missing_value = missing_value;
        self
    }
}

/// A named group of column declarations with a domain attribute.
///
/// Datasets form families: one generic root plus its per-domain specialized
/// copies. All members of a family share column layout; identity (the `Arc`
/// pointer) distinguishes them. Declarations are built once and live for the
/// process lifetime, so the family's internal `Arc` links are never torn
/// down.
pub struct DataSet {
    name: String,
    domain: Domain,
    columns: Vec<ColumnDef>,
    /// Generic root of this family; `None` if self is the root.
    generic_root: Option<Arc<DataSet>>,
    /// For root-bound families: the only market this family may bind to.
    family_domain: Option<Domain>,
    /// Domain -> specialized copy, populated lazily. Lock is scoped to this
    /// dataset; concurrent specialize calls insert-if-absent atomically.
    specializations: Mutex<HashMap<Domain, Arc<DataSet>>>,
}

impl DataSet {
    /// A generic dataset, specializable to any concrete domain
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            domain: Domain::Generic,
            columns,
            generic_root: None,
            family_domain: None,
            specializations: Mutex::new(HashMap::new()),
        })
    }

    /// A dataset fixed to one market from the start.
    ///
    /// The returned dataset refuses specialization to any other market, and
    /// so does its generic counterpart (reachable via `unspecialize`), which
    /// exists so loaders can key lookups generically regardless of whether a
    /// term started root-bound or was specialized at pipeline-build time.
    pub fn new_bound(
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        domain: Domain,
    ) -> Result<Arc<Self>> {
        if domain.is_generic() {
            return Err(PipelineError::Domain(
                "bound dataset requires a concrete domain".to_string(),
            ));
        }
        let root = Arc::new(Self {
            name: name.into(),
            domain: Domain::Generic,
            columns,
            generic_root: None,
            family_domain: Some(domain.clone()),
            specializations: Mutex::new(HashMap::new()),
        });
        root.specialize(&domain)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn column_defs(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Column handle by name
    pub fn column(self: &Arc<Self>, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(Column {
            dataset: Arc::clone(self),
            index,
        })
    }

    /// All column handles, in declaration order
    pub fn all_columns(self: &Arc<Self>) -> Vec<Column> {
        (0..self.columns.len())
            .map(|index| Column {
                dataset: Arc::clone(self),
                index,
            })
            .collect()
    }

    /// Bind this dataset to a concrete domain.
    ///
    /// Returns `self` when already bound to `domain`; the memoized copy when
    /// self is generic; an error when the target is generic or when this
    /// family is fixed to a different market.
    pub fn specialize(self: &Arc<Self>, domain: &Domain) -> Result<Arc<DataSet>> {
        if domain.is_generic() {
            return Err(PipelineError::Domain(format!(
                "cannot specialize dataset {} to the generic domain",
                self.name
            )));
        }
        if self.domain == *domain {
            return Ok(Arc::clone(self));
        }
        if !self.domain.is_generic() {
            return Err(PipelineError::Domain(format!(
                "dataset {} is bound to {} and cannot be specialized to {}",
                self.name, self.domain, domain
            )));
        }
        if let Some(family) = &self.family_domain {
            if family != domain {
                return Err(PipelineError::Domain(format!(
                    "dataset family {} is bound to {} and cannot be specialized to {}",
                    self.name, family, domain
                )));
            }
        }
        let mut memo = self
            .specializations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let specialized = memo.entry(domain.clone()).or_insert_with(|| {
            Arc::new(DataSet {
                name: self.name.clone(),
                domain: domain.clone(),
                columns: self.columns.clone(),
                generic_root: Some(Arc::clone(self)),
                family_domain: self.family_domain.clone(),
                specializations: Mutex::new(HashMap::new()),
            })
        });
        Ok(Arc::clone(specialized))
    }

    /// The generic root of this dataset's family. Always succeeds, including
    /// for root-bound datasets.
    pub fn unspecialize(self: &Arc<Self>) -> Arc<DataSet> {
        match &self.generic_root {
            Some(root) => Arc::clone(root),
            None => Arc::clone(self),
        }
    }
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("columns", &self.columns.len())
            .finish()
    }
}

/// Handle to one column of a dataset.
///
/// Identity is the owning dataset's pointer plus the column index, so the
/// same declaration specialized to two domains yields two distinct columns,
/// while repeated specialization to one domain yields the same column.
#[derive(Clone)]
pub struct Column {
    dataset: Arc<DataSet>,
    index: usize,
}

impl Column {
    pub fn dataset(&self) -> &Arc<DataSet> {
        &self.dataset
    }

    fn def(&self) -> &ColumnDef {
        &self.dataset.columns[self.index]
    }

    pub fn name(&self) -> &str {
        &self.def().name
    }

    pub fn dtype(&self) -> DType {
        self.def().dtype
    }

    pub fn missing_value(&self) -> MissingValue {
        self.def().missing_value
    }

    pub fn domain(&self) -> &Domain {
        &self.dataset.domain
    }

    /// "dataset.column" label for messages and logs
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset.name, self.name())
    }

    /// The corresponding column of the dataset specialized to `domain`
    pub fn specialize(&self, domain: &Domain) -> Result<Column> {
        Ok(Column {
            dataset: self.dataset.specialize(domain)?,
            index: self.index,
        })
    }

    /// The corresponding column of the family's generic root
    pub fn unspecialize(&self) -> Column {
        Column {
            dataset: self.dataset.unspecialize(),
            index: self.index,
        }
    }

    pub(crate) fn identity(&self) -> (usize, usize) {
        (Arc::as_ptr(&self.dataset) as usize, self.index)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.dataset, &other.dataset) && self.index == other.index
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Column({}, {})", self.qualified_name(), self.domain())
    }
}

/// Daily OHLCV pricing declarations. Initialized once per process.
pub fn equity_pricing() -> Arc<DataSet> {
    static EQUITY_PRICING: OnceLock<Arc<DataSet>> = OnceLock::new();
    Arc::clone(EQUITY_PRICING.get_or_init(|| {
        DataSet::new(
            "EquityPricing",
            vec![
                ColumnDef::new("open", DType::Float64),
                ColumnDef::new("high", DType::Float64),
                ColumnDef::new("low", DType::Float64),
                ColumnDef::new("close", DType::Float64),
                ColumnDef::new("volume", DType::Float64),
            ],
        )
    }))
}

/// A small close/volume dataset for tests and demos. Each call builds a new
/// family, so tests get isolated specialization state.
pub fn testing_dataset() -> Arc<DataSet> {
    DataSet::new(
        "TestingData",
        vec![
            ColumnDef::new("close", DType::Float64),
            ColumnDef::new("volume", DType::Float64),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn my_data() -> Arc<DataSet> {
        DataSet::new(
            "MyData",
            vec![
                ColumnDef::new("col1", DType::Float64),
                ColumnDef::new("col2", DType::Int64)
                    .with_missing_value(MissingValue::Int64(100)),
                ColumnDef::new("col3", DType::Bool),
            ],
        )
    }

    #[test]
    fn test_specialize_memoized() {
        let data = my_data();
        let us = Domain::us_equities();
        let ca = Domain::canada_equities();

        let specialized = data.specialize(&us).unwrap();
        // Identity-stable across repeated calls
        assert!(Arc::ptr_eq(&specialized, &data.specialize(&us).unwrap()));
        // Distinct domains give distinct objects
        assert!(!Arc::ptr_eq(&specialized, &data.specialize(&ca).unwrap()));

        assert_eq!(specialized.name(), data.name());
        assert_eq!(specialized.domain(), &us);
    }

    #[test]
    fn test_specialized_columns() {
        let data = my_data();
        let us = Domain::us_equities();
        let specialized = data.specialize(&us).unwrap();

        for name in ["col1", "col2", "col3"] {
            let original = data.column(name).unwrap();
            let new = specialized.column(name).unwrap();

            // A new column, identical to specializing the original column
            assert_ne!(original, new);
            assert_eq!(new, original.specialize(&us).unwrap());

            // Bound to their respective datasets
            assert!(Arc::ptr_eq(original.dataset(), &data));
            assert!(Arc::ptr_eq(new.dataset(), &specialized));

            assert_eq!(new.domain(), &us);
            assert_eq!(original.name(), new.name());
            assert_eq!(original.dtype(), new.dtype());
            assert_eq!(original.missing_value(), new.missing_value());
        }
    }

    #[test]
    fn test_unspecialize_round_trip() {
        let data = my_data();
        let us = Domain::us_equities();

        let specialized = data.specialize(&us).unwrap();
        let unspecialized = specialized.unspecialize();
        assert!(Arc::ptr_eq(&unspecialized, &data));
        assert!(Arc::ptr_eq(
            &unspecialized.specialize(&us).unwrap(),
            &specialized
        ));

        let col = data.column("col1").unwrap();
        let new = specialized.column("col1").unwrap();
        assert_eq!(new.unspecialize(), col);
        assert_eq!(new.unspecialize().specialize(&us).unwrap(), new);
    }

    #[test]
    fn test_specialize_to_generic_fails() {
        let data = my_data();
        assert!(data.specialize(&Domain::Generic).is_err());
    }

    #[test]
    fn test_root_bound_rejection() {
        let us = Domain::us_equities();
        let uk = Domain::uk_equities();
        let bound = DataSet::new_bound(
            "BoundData",
            vec![ColumnDef::new("col1", DType::Float64)],
            us.clone(),
        )
        .unwrap();
        assert_eq!(bound.domain(), &us);

        // Specializing to a different concrete domain fails
        assert!(bound.specialize(&uk).is_err());
        assert!(bound.column("col1").unwrap().specialize(&uk).is_err());
        // Specializing to its own domain returns itself
        assert!(Arc::ptr_eq(&bound.specialize(&us).unwrap(), &bound));

        // Unspecializing always works, but the generic counterpart is still
        // fixed to the family's market
        let generic = bound.unspecialize();
        assert!(generic.domain().is_generic());
        assert!(Arc::ptr_eq(&generic.specialize(&us).unwrap(), &bound));
        assert!(generic.specialize(&uk).is_err());
        assert!(generic.column("col1").unwrap().specialize(&uk).is_err());
    }

    #[test]
    fn test_same_layout_datasets_do_not_collide() {
        let a = my_data();
        let b = my_data();
        let us = Domain::us_equities();
        let sa = a.specialize(&us).unwrap();
        let sb = b.specialize(&us).unwrap();
        assert!(!Arc::ptr_eq(&sa, &sb));
        assert_ne!(sa.column("col1").unwrap(), sb.column("col1").unwrap());
    }

    #[test]
    fn test_equity_pricing_is_singleton() {
        assert!(Arc::ptr_eq(&equity_pricing(), &equity_pricing()));
        assert!(equity_pricing().column("close").is_some());
    }
}
