//! The loader boundary
//!
//! The engine asks a `PipelineLoader` for the raw-plus-adjustments view of
//! each leaf column over an explicit date range. By the time the loader is
//! called, the engine has already shifted the range back by the calendar's
//! one-session lag and widened it by the term's extra rows; loaders serve
//! exactly the dates they are given.

use crate::data::adjusted_array::AdjustedArray;
use crate::data::adjustments::{lower_actions, ColumnRole, CorporateAction};
use crate::dataset::Column;
use crate::error::{PipelineError, Result};
use crate::types::{AssetId, DType, Session};
use hashbrown::HashMap;
use ndarray::Array2;

/// A dtype-tagged adjusted array, as produced by loaders and held in the
/// engine workspace
#[derive(Debug, Clone)]
pub enum ArrayData {
    Float64(AdjustedArray<f64>),
    Int64(AdjustedArray<i64>),
    Bool(AdjustedArray<bool>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Float64(_) => DType::Float64,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::Bool(_) => DType::Bool,
        }
    }

    pub fn nrows(&self) -> usize {
        match self {
            ArrayData::Float64(a) => a.nrows(),
            ArrayData::Int64(a) => a.nrows(),
            ArrayData::Bool(a) => a.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            ArrayData::Float64(a) => a.ncols(),
            ArrayData::Int64(a) => a.ncols(),
            ArrayData::Bool(a) => a.ncols(),
        }
    }

    pub fn as_float(&self) -> Result<&AdjustedArray<f64>> {
        match self {
            ArrayData::Float64(a) => Ok(a),
            other => Err(PipelineError::Data(format!(
                "expected float64 array, got {}",
                other.dtype()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<&AdjustedArray<i64>> {
        match self {
            ArrayData::Int64(a) => Ok(a),
            other => Err(PipelineError::Data(format!(
                "expected int64 array, got {}",
                other.dtype()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<&AdjustedArray<bool>> {
        match self {
            ArrayData::Bool(a) => Ok(a),
            other => Err(PipelineError::Data(format!(
                "expected bool array, got {}",
                other.dtype()
            ))),
        }
    }
}

/// Source of adjusted arrays for leaf (data column) terms
pub trait PipelineLoader: Send + Sync {
    /// Load one adjusted array per requested column, covering `dates` x
    /// `assets`. `mask` flags the (date, asset) cells the pipeline will
    /// observe; loaders may use it to skip work but must still return
    /// full-shape arrays.
    fn load_adjusted_array(
        &self,
        columns: &[Column],
        dates: &[Session],
        assets: &[AssetId],
        mask: &Array2<bool>,
    ) -> Result<HashMap<Column, ArrayData>>;
}

/// Loader over in-memory float64 bases plus corporate actions.
///
/// Storage is keyed by the generic root of each column, so root-bound and
/// pipeline-specialized columns of one family resolve to the same data.
/// Used by tests, demos and benches.
pub struct InMemoryLoader {
    sessions: Vec<Session>,
    assets: Vec<AssetId>,
    columns: HashMap<Column, Array2<f64>>,
    actions: Vec<CorporateAction>,
}

impl InMemoryLoader {
    pub fn new(sessions: Vec<Session>, assets: Vec<AssetId>) -> Self {
        Self {
            sessions,
            assets,
            columns: HashMap::new(),
            actions: Vec::new(),
        }
    }

    /// Register raw values for a column over the loader's full
    /// sessions x assets grid
    pub fn set_column(&mut self, column: &Column, values: Array2<f64>) -> Result<()> {
        if column.dtype() != DType::Float64 {
            return Err(PipelineError::Loader(format!(
                "in-memory loader only serves float64 columns, {} is {}",
                column.qualified_name(),
                column.dtype()
            )));
        }
        if values.dim() != (self.sessions.len(), self.assets.len()) {
            return Err(PipelineError::Loader(format!(
                "values for {} have shape {:?}, expected ({}, {})",
                column.qualified_name(),
                values.dim(),
                self.sessions.len(),
                self.assets.len()
            )));
        }
        self.columns.insert(column.unspecialize(), values);
        Ok(())
    }

    pub fn add_action(&mut self, action: CorporateAction) {
        self.actions.push(action);
    }

    fn date_offsets(&self, dates: &[Session]) -> Result<usize> {
        let first = dates
            .first()
            .ok_or_else(|| PipelineError::Loader("empty date range".to_string()))?;
        let start = self
            .sessions
            .binary_search(first)
            .map_err(|_| PipelineError::Loader(format!("unknown session {}", first)))?;
        for (offset, date) in dates.iter().enumerate() {
            if self.sessions.get(start + offset) != Some(date) {
                return Err(PipelineError::Loader(format!(
                    "requested dates are not contiguous sessions at {}",
                    date
                )));
            }
        }
        Ok(start)
    }
}

impl PipelineLoader for InMemoryLoader {
    fn load_adjusted_array(
        &self,
        columns: &[Column],
        dates: &[Session],
        assets: &[AssetId],
        _mask: &Array2<bool>,
    ) -> Result<HashMap<Column, ArrayData>> {
        let start = self.date_offsets(dates)?;
        let positions: Vec<usize> = assets
            .iter()
            .map(|asset| {
                self.assets
                    .iter()
                    .position(|a| a == asset)
                    .ok_or_else(|| PipelineError::Loader(format!("unknown asset {}", asset)))
            })
            .collect::<Result<_>>()?;

        let mut out = HashMap::with_capacity(columns.len());
        for column in columns {
            let stored = self
                .columns
                .get(&column.unspecialize())
                .ok_or_else(|| {
                    PipelineError::Loader(format!(
                        "no data registered for column {}",
                        column.qualified_name()
                    ))
                })?;
            let base = Array2::from_shape_fn((dates.len(), positions.len()), |(r, c)| {
                stored[[start + r, positions[c]]]
            });
            let role = if column.name() == "volume" {
                ColumnRole::Volume
            } else {
                ColumnRole::Price
            };
            let adjustments =
                lower_actions(&self.actions, dates, assets, role, base.view());
            let missing = column.missing_value().as_f64().unwrap_or(f64::NAN);
            out.insert(
                column.clone(),
                ArrayData::Float64(AdjustedArray::new(base, adjustments, missing)?),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::adjustments::ActionKind;
    use crate::dataset::testing_dataset;
    use crate::domain::Domain;
    use chrono::NaiveDate;

    fn date(d: u32) -> Session {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sessions() -> Vec<Session> {
        (2..=5).map(date).collect()
    }

    #[test]
    fn test_loads_sliced_base() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let mut loader = InMemoryLoader::new(sessions(), vec![1, 2]);
        loader
            .set_column(
                &close,
                Array2::from_shape_fn((4, 2), |(r, c)| (r * 10 + c) as f64),
            )
            .unwrap();

        let dates = [date(3), date(4)];
        let mask = Array2::from_elem((2, 2), true);
        let loaded = loader
            .load_adjusted_array(&[close.clone()], &dates, &[1, 2], &mask)
            .unwrap();
        let array = loaded[&close].as_float().unwrap();
        assert_eq!(array.base()[[0, 0]], 10.0);
        assert_eq!(array.base()[[1, 1]], 21.0);
    }

    #[test]
    fn test_specialized_column_hits_generic_storage() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let specialized = close.specialize(&Domain::us_equities()).unwrap();
        let mut loader = InMemoryLoader::new(sessions(), vec![1]);
        loader
            .set_column(&close, Array2::from_elem((4, 1), 5.0))
            .unwrap();

        let dates = [date(2)];
        let mask = Array2::from_elem((1, 1), true);
        let loaded = loader
            .load_adjusted_array(&[specialized.clone()], &dates, &[1], &mask)
            .unwrap();
        assert!(loaded.contains_key(&specialized));
    }

    #[test]
    fn test_split_becomes_adjustment() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let mut loader = InMemoryLoader::new(sessions(), vec![1]);
        // Raw prices: 10, 10 pre-split; 5, 5 post-split
        loader
            .set_column(
                &close,
                Array2::from_shape_vec((4, 1), vec![10.0, 10.0, 5.0, 5.0]).unwrap(),
            )
            .unwrap();
        loader.add_action(CorporateAction::new(
            1,
            date(4),
            ActionKind::Split { ratio: 2.0 },
        ));

        let dates = sessions();
        let mask = Array2::from_elem((4, 1), true);
        let loaded = loader
            .load_adjusted_array(&[close.clone()], &dates, &[1], &mask)
            .unwrap();
        let array = loaded[&close].as_float().unwrap();
        let adjs = &array.adjustments()[&0];
        assert_eq!(adjs.len(), 1);
        assert_eq!(adjs[0].last_row, 1);
        assert_eq!(adjs[0].value, 0.5);
    }

    #[test]
    fn test_unknown_column_errors() {
        let dataset = testing_dataset();
        let close = dataset.column("close").unwrap();
        let loader = InMemoryLoader::new(sessions(), vec![1]);
        let mask = Array2::from_elem((1, 1), true);
        assert!(loader
            .load_adjusted_array(&[close], &[date(2)], &[1], &mask)
            .is_err());
    }
}
