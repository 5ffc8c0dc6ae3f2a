//! Pipeline execution engine
//!
//! Drives a compiled plan over a date range: loads adjusted arrays for leaf
//! terms (shifted back one session and widened by each term's extra rows),
//! executes computed terms in topological order against a workspace, trims
//! the extra rows off the requested outputs, and assembles one long-format
//! table with a row per (date, asset) pair.

use crate::calendar::CalendarProvider;
use crate::data::adjusted_array::{AdjustedArray, Element, WindowIter};
use crate::data::loader::{ArrayData, PipelineLoader};
use crate::dataset::Column;
use crate::error::{PipelineError, Result};
use crate::pipeline::graph::ExecutionPlan;
use crate::pipeline::term::{TermId, TermKind};
use crate::pipeline::Pipeline;
use crate::types::{AssetId, DType, Session};
use chrono::NaiveTime;
use hashbrown::HashMap;
use ndarray::{Array2, ArrayView2};
use polars::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

/// Executes pipelines against a loader, a calendar provider and a fixed
/// asset universe
pub struct PipelineEngine {
    loader: Arc<dyn PipelineLoader>,
    calendars: Arc<dyn CalendarProvider>,
    universe: Vec<AssetId>,
}

impl PipelineEngine {
    pub fn new(
        loader: Arc<dyn PipelineLoader>,
        calendars: Arc<dyn CalendarProvider>,
        universe: Vec<AssetId>,
    ) -> Self {
        Self {
            loader,
            calendars,
            universe,
        }
    }

    /// Run `pipeline` over `[start, end]` in one chunk.
    ///
    /// The result has a `date` and an `asset` column plus one column per
    /// pipeline output, with one row per (session, asset) pair.
    pub fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        start: Session,
        end: Session,
    ) -> Result<DataFrame> {
        let plan = ExecutionPlan::compile(pipeline)?;
        let (sessions, start_idx, end_idx) = self.resolve_dates(&plan, start, end)?;
        log::info!(
            "running pipeline: {} outputs over {} sessions on {}",
            plan.outputs().len(),
            end_idx - start_idx + 1,
            plan.domain()
        );
        self.compute_chunk(&plan, &sessions, start_idx, end_idx)
    }

    /// Run `pipeline` in date chunks of at most `chunksize` sessions.
    ///
    /// Chunking bounds peak memory: each chunk re-derives its own history
    /// buffer instead of reusing trimmed rows from the previous chunk, so
    /// chunks are independent and run in parallel. Results are identical to
    /// a single-chunk run.
    pub fn run_chunked_pipeline(
        &self,
        pipeline: &Pipeline,
        start: Session,
        end: Session,
        chunksize: usize,
    ) -> Result<DataFrame> {
        if chunksize == 0 {
            return Err(PipelineError::InvalidOperation(
                "chunksize must be at least 1".to_string(),
            ));
        }
        let plan = ExecutionPlan::compile(pipeline)?;
        let (sessions, start_idx, end_idx) = self.resolve_dates(&plan, start, end)?;

        let mut ranges = Vec::new();
        let mut chunk_start = start_idx;
        while chunk_start <= end_idx {
            let chunk_end = (chunk_start + chunksize - 1).min(end_idx);
            ranges.push((chunk_start, chunk_end));
            chunk_start = chunk_end + 1;
        }
        log::info!(
            "running pipeline in {} chunks of up to {} sessions on {}",
            ranges.len(),
            chunksize,
            plan.domain()
        );

        let frames: Vec<DataFrame> = ranges
            .par_iter()
            .map(|&(s, e)| self.compute_chunk(&plan, &sessions, s, e))
            .collect::<Result<Vec<_>>>()?;

        let mut frames = frames.into_iter();
        let mut out = frames
            .next()
            .ok_or_else(|| PipelineError::Calendar("no sessions to compute".to_string()))?;
        for frame in frames {
            out.vstack_mut(&frame)
                .map_err(|e| PipelineError::Data(e.to_string()))?;
        }
        Ok(out)
    }

    fn resolve_dates(
        &self,
        plan: &ExecutionPlan,
        start: Session,
        end: Session,
    ) -> Result<(Vec<Session>, usize, usize)> {
        let sessions = plan.domain().all_sessions(self.calendars.as_ref())?;

        let start_idx = sessions.partition_point(|s| *s < start);
        let after_end = sessions.partition_point(|s| *s <= end);
        if start_idx >= after_end {
            return Err(PipelineError::Calendar(format!(
                "no {} sessions between {} and {}",
                plan.domain(),
                start,
                end
            )));
        }
        let end_idx = after_end - 1;

        // Leaves are loaded from (start - extra_rows - 1): the extra rows
        // buffer windows, the final -1 is the one-session observation lag.
        let needed = plan.max_extra_rows() + 1;
        if start_idx < needed {
            return Err(PipelineError::Calendar(format!(
                "insufficient history: pipeline needs {} sessions before {}, calendar has {}",
                needed, sessions[start_idx], start_idx
            )));
        }
        Ok((sessions, start_idx, end_idx))
    }

    fn compute_chunk(
        &self,
        plan: &ExecutionPlan,
        sessions: &[Session],
        start_idx: usize,
        end_idx: usize,
    ) -> Result<DataFrame> {
        let chunk_len = end_idx - start_idx + 1;
        let nassets = self.universe.len();
        let mut workspace: HashMap<TermId, ArrayData> = HashMap::new();

        // Leaf terms, grouped by how much extra history they must carry.
        for (extra, ids) in plan.loadable_groups() {
            let dates = &sessions[start_idx - extra - 1..=end_idx - 1];
            let mut pairs: Vec<(TermId, Column)> = Vec::new();
            for id in &ids {
                if let TermKind::Column(column) = &plan.term(*id).kind {
                    pairs.push((*id, column.clone()));
                }
            }
            let columns: Vec<Column> = pairs.iter().map(|(_, c)| c.clone()).collect();
            let mask = Array2::from_elem((dates.len(), nassets), true);
            log::debug!(
                "loading {} columns over {} dates ({} extra rows)",
                columns.len(),
                dates.len(),
                extra
            );
            let mut loaded =
                self.loader
                    .load_adjusted_array(&columns, dates, &self.universe, &mask)?;
            for (id, column) in pairs {
                let array = loaded.remove(&column).ok_or_else(|| {
                    PipelineError::Loader(format!(
                        "loader did not return column {}",
                        column.qualified_name()
                    ))
                })?;
                if array.nrows() != dates.len() || array.ncols() != nassets {
                    return Err(PipelineError::Loader(format!(
                        "loader returned shape ({}, {}) for {}, expected ({}, {})",
                        array.nrows(),
                        array.ncols(),
                        column.qualified_name(),
                        dates.len(),
                        nassets
                    )));
                }
                if array.dtype() != plan.term(id).dtype {
                    return Err(PipelineError::Loader(format!(
                        "loader returned {} array for {} column {}",
                        array.dtype(),
                        plan.term(id).dtype,
                        column.qualified_name()
                    )));
                }
                workspace.insert(id, array);
            }
        }

        // Computed terms, dependencies first.
        for id in plan.execution_order() {
            let info = plan.term(*id);
            let computation = match &info.kind {
                TermKind::Column(_) => continue,
                TermKind::Computed(computation) => computation.clone(),
            };
            let window_length = info.window_length;
            let term_extra = plan.extra_rows(*id);
            let out_rows = chunk_len + term_extra;
            log::debug!(
                "computing {} over {} rows",
                info.description(),
                out_rows
            );

            let result = {
                let needed = window_length - 1 + term_extra;
                let mut iters = Vec::with_capacity(info.inputs.len());
                for input in &info.inputs {
                    let input_extra = plan.extra_rows(*input);
                    let offset = input_extra.checked_sub(needed).ok_or_else(|| {
                        PipelineError::Data(format!(
                            "input {} retains {} extra rows, consumer {} needs {}",
                            plan.term(*input).description(),
                            input_extra,
                            info.description(),
                            needed
                        ))
                    })?;
                    let array = workspace
                        .get(input)
                        .ok_or_else(|| {
                            PipelineError::Data(format!(
                                "missing workspace entry for {}",
                                plan.term(*input).description()
                            ))
                        })?
                        .as_float()?;
                    iters.push(array.traverse_from(
                        window_length,
                        offset,
                        offset + out_rows + window_length - 1,
                    )?);
                }

                match info.dtype {
                    DType::Float64 => {
                        let missing = info.missing_value.as_f64().unwrap_or(f64::NAN);
                        let mut out = Array2::from_elem((out_rows, nassets), missing);
                        for r in 0..out_rows {
                            let views = next_windows(&mut iters)?;
                            computation.compute_float_row(&views, out.row_mut(r))?;
                        }
                        ArrayData::Float64(AdjustedArray::from_base(out, missing))
                    }
                    DType::Bool => {
                        let missing = info.missing_value.as_bool().unwrap_or(false);
                        let mut out = Array2::from_elem((out_rows, nassets), missing);
                        for r in 0..out_rows {
                            let views = next_windows(&mut iters)?;
                            computation.compute_bool_row(&views, out.row_mut(r))?;
                        }
                        ArrayData::Bool(AdjustedArray::from_base(out, missing))
                    }
                    DType::Int64 => {
                        let missing = info.missing_value.as_i64().unwrap_or(-1);
                        let mut out = Array2::from_elem((out_rows, nassets), missing);
                        for r in 0..out_rows {
                            let views = next_windows(&mut iters)?;
                            computation.compute_int_row(&views, out.row_mut(r))?;
                        }
                        ArrayData::Int64(AdjustedArray::from_base(out, missing))
                    }
                }
            };
            workspace.insert(*id, result);
        }

        // Trim extra rows and assemble the (date, asset) table.
        let chunk_sessions = &sessions[start_idx..=end_idx];
        let mut date_values = Vec::with_capacity(chunk_len * nassets);
        let mut asset_values = Vec::with_capacity(chunk_len * nassets);
        for session in chunk_sessions {
            let timestamp = session.and_time(NaiveTime::MIN);
            for asset in &self.universe {
                date_values.push(timestamp);
                asset_values.push(*asset);
            }
        }
        let mut series = vec![
            Series::new("date", date_values),
            Series::new("asset", asset_values),
        ];
        for (name, id) in plan.outputs() {
            let array = workspace.get(id).ok_or_else(|| {
                PipelineError::Data(format!("missing workspace entry for output {}", name))
            })?;
            let trim = plan.extra_rows(*id);
            series.push(match array {
                ArrayData::Float64(a) => Series::new(name, materialize(a, trim, chunk_len)?),
                ArrayData::Int64(a) => Series::new(name, materialize(a, trim, chunk_len)?),
                ArrayData::Bool(a) => Series::new(name, materialize(a, trim, chunk_len)?),
            });
        }
        DataFrame::new(series).map_err(|e| PipelineError::Data(e.to_string()))
    }
}

/// Advance every input cursor by one date and collect the aligned windows
fn next_windows<'i, 'a>(
    iters: &'i mut [WindowIter<'a, f64>],
) -> Result<Vec<ArrayView2<'i, f64>>> {
    iters
        .iter_mut()
        .map(|iter| {
            iter.next_window()
                .ok_or_else(|| PipelineError::Data("input windows exhausted early".to_string()))
        })
        .collect()
}

/// Flatten `n_rows` rows starting at `start_row` into row-major values,
/// applying each row's as-of adjustments on the way out
fn materialize<T: Element>(
    array: &AdjustedArray<T>,
    start_row: usize,
    n_rows: usize,
) -> Result<Vec<T>> {
    let mut iter = array.traverse_from(1, start_row, start_row + n_rows)?;
    let mut out = Vec::with_capacity(n_rows * array.ncols());
    while let Some(window) = iter.next_window() {
        out.extend(window.iter().copied());
    }
    Ok(out)
}
