//! Point-in-time-correct rolling windows
//!
//! An `AdjustedArray` pairs a raw 2-D base array (rows = dates, columns =
//! assets) with the retroactive corrections known about it. The base is
//! recorded once, unadjusted, and never mutated; every window handed out by
//! `traverse` is a fresh overlay of the corrections whose cell ranges
//! intersect that window. This is what makes a value observed "as of" a
//! date reflect the splits, dividends and mergers known by then.

use crate::error::{PipelineError, Result};
use crate::types::DType;
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an adjustment mutates the cells it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentKind {
    Overwrite,
    Add,
    Multiply,
}

/// A retroactive correction to a rectangle of historical cells.
///
/// Row and column bounds are inclusive. An adjustment with `last_row == k`
/// is a correction visible to any window whose row range reaches rows
/// `<= k`; it is applied to the intersection of its rectangle with the
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustment<T> {
    pub first_row: usize,
    pub last_row: usize,
    pub first_col: usize,
    pub last_col: usize,
    pub value: T,
    pub kind: AdjustmentKind,
}

/// Cell types an `AdjustedArray` can hold
pub trait Element: Copy + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DType;

    /// Whether this element type supports the given adjustment kind
    fn supports(kind: AdjustmentKind) -> bool;

    /// Apply one adjustment to one cell
    fn apply(kind: AdjustmentKind, current: Self, value: Self) -> Self;
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;

    fn supports(_kind: AdjustmentKind) -> bool {
        true
    }

    fn apply(kind: AdjustmentKind, current: Self, value: Self) -> Self {
        match kind {
            AdjustmentKind::Overwrite => value,
            AdjustmentKind::Add => current + value,
            AdjustmentKind::Multiply => current * value,
        }
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;

    fn supports(_kind: AdjustmentKind) -> bool {
        true
    }

    fn apply(kind: AdjustmentKind, current: Self, value: Self) -> Self {
        match kind {
            AdjustmentKind::Overwrite => value,
            AdjustmentKind::Add => current + value,
            AdjustmentKind::Multiply => current * value,
        }
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn supports(kind: AdjustmentKind) -> bool {
        matches!(kind, AdjustmentKind::Overwrite)
    }

    fn apply(kind: AdjustmentKind, current: Self, value: Self) -> Self {
        match kind {
            AdjustmentKind::Overwrite => value,
            // Rejected at construction; leave the cell untouched.
            _ => current,
        }
    }
}

/// A raw base array plus its known corrections
#[derive(Debug, Clone)]
pub struct AdjustedArray<T: Element> {
    base: Array2<T>,
    /// column index -> corrections ordered by `last_row`
    adjustments: BTreeMap<usize, Vec<Adjustment<T>>>,
    /// All adjustments in global `last_row` order, for window application
    flattened: Vec<Adjustment<T>>,
    missing_value: T,
}

impl<T: Element> AdjustedArray<T> {
    pub fn new(
        base: Array2<T>,
        adjustments: BTreeMap<usize, Vec<Adjustment<T>>>,
        missing_value: T,
    ) -> Result<Self> {
        let (nrows, ncols) = base.dim();
        for (col, seq) in &adjustments {
            let mut prev_last_row = 0usize;
            for (i, adj) in seq.iter().enumerate() {
                if !T::supports(adj.kind) {
                    return Err(PipelineError::Adjustment(format!(
                        "{:?} adjustment is not supported for dtype {}",
                        adj.kind,
                        T::DTYPE
                    )));
                }
                if adj.first_row > adj.last_row || adj.first_col > adj.last_col {
                    return Err(PipelineError::Adjustment(format!(
                        "adjustment has inverted bounds: {:?}",
                        adj
                    )));
                }
                if adj.last_row >= nrows || adj.last_col >= ncols {
                    return Err(PipelineError::Adjustment(format!(
                        "adjustment exceeds base of shape ({}, {}): {:?}",
                        nrows, ncols, adj
                    )));
                }
                if i > 0 && adj.last_row < prev_last_row {
                    return Err(PipelineError::Adjustment(format!(
                        "adjustments for column {} are not ordered by last_row",
                        col
                    )));
                }
                prev_last_row = adj.last_row;
            }
        }
        let mut flattened: Vec<Adjustment<T>> =
            adjustments.values().flatten().copied().collect();
        flattened.sort_by_key(|adj| adj.last_row);
        Ok(Self {
            base,
            adjustments,
            flattened,
            missing_value,
        })
    }

    /// An array with no corrections (e.g. a computed term's output)
    pub fn from_base(base: Array2<T>, missing_value: T) -> Self {
        Self {
            base,
            adjustments: BTreeMap::new(),
            flattened: Vec::new(),
            missing_value,
        }
    }

    pub fn nrows(&self) -> usize {
        self.base.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.base.ncols()
    }

    pub fn missing_value(&self) -> T {
        self.missing_value
    }

    /// The raw, never-adjusted base
    pub fn base(&self) -> ArrayView2<'_, T> {
        self.base.view()
    }

    pub fn adjustments(&self) -> &BTreeMap<usize, Vec<Adjustment<T>>> {
        &self.adjustments
    }

    /// Rolling windows of `window_length` rows over the whole array
    pub fn traverse(&self, window_length: usize) -> Result<WindowIter<'_, T>> {
        self.traverse_from(window_length, 0, self.nrows())
    }

    /// Rolling windows over rows `[start_row, end_row)`.
    ///
    /// One window per position: the first covers
    /// `[start_row, start_row + window_length)`, the last ends at
    /// `end_row - 1`. Each call returns an independent cursor; within one
    /// cursor, windows share a reused buffer, so callers that retain a
    /// window past the next advance must copy it.
    pub fn traverse_from(
        &self,
        window_length: usize,
        start_row: usize,
        end_row: usize,
    ) -> Result<WindowIter<'_, T>> {
        self.make_iter(window_length, start_row, end_row, None)
    }

    /// Rolling windows restricted to `columns`, in the given order.
    ///
    /// Column indices at or beyond `ncols` select assets not known to this
    /// array (e.g. listed after it was recorded); those columns are filled
    /// with the missing value instead of failing.
    pub fn traverse_columns(
        &self,
        window_length: usize,
        columns: &[usize],
    ) -> Result<WindowIter<'_, T>> {
        self.make_iter(window_length, 0, self.nrows(), Some(columns.to_vec()))
    }

    fn make_iter(
        &self,
        window_length: usize,
        start_row: usize,
        end_row: usize,
        columns: Option<Vec<usize>>,
    ) -> Result<WindowIter<'_, T>> {
        if window_length == 0 {
            return Err(PipelineError::InvalidOperation(
                "window_length must be at least 1".to_string(),
            ));
        }
        if end_row > self.nrows() || start_row > end_row {
            return Err(PipelineError::InvalidOperation(format!(
                "window range [{}, {}) exceeds array of {} rows",
                start_row,
                end_row,
                self.nrows()
            )));
        }
        if start_row + window_length > end_row {
            return Err(PipelineError::InvalidOperation(format!(
                "window of {} rows does not fit in range [{}, {})",
                window_length, start_row, end_row
            )));
        }
        let out_cols = columns.as_ref().map_or(self.ncols(), Vec::len);
        Ok(WindowIter {
            array: self,
            window_length,
            end_row,
            columns,
            next_start: start_row,
            buffer: Array2::from_elem((window_length, out_cols), self.missing_value),
        })
    }

    /// Fill `buffer` with the adjusted window starting at `start`
    fn fill_window(&self, start: usize, columns: Option<&[usize]>, buffer: &mut Array2<T>) {
        let window_length = buffer.nrows();
        let window_last = start + window_length - 1;
        match columns {
            None => {
                buffer.assign(&self.base.slice(s![start..start + window_length, ..]));
                for adj in &self.flattened {
                    if adj.first_row > window_last || adj.last_row < start {
                        continue;
                    }
                    let r0 = adj.first_row.max(start);
                    let r1 = adj.last_row.min(window_last);
                    for r in r0..=r1 {
                        for c in adj.first_col..=adj.last_col {
                            let cell = buffer[[r - start, c]];
                            buffer[[r - start, c]] = T::apply(adj.kind, cell, adj.value);
                        }
                    }
                }
            }
            Some(cols) => {
                for (out_c, &src) in cols.iter().enumerate() {
                    if src >= self.ncols() {
                        for r in 0..window_length {
                            buffer[[r, out_c]] = self.missing_value;
                        }
                        continue;
                    }
                    for r in 0..window_length {
                        buffer[[r, out_c]] = self.base[[start + r, src]];
                    }
                    for adj in &self.flattened {
                        if adj.first_col > src
                            || adj.last_col < src
                            || adj.first_row > window_last
                            || adj.last_row < start
                        {
                            continue;
                        }
                        let r0 = adj.first_row.max(start);
                        let r1 = adj.last_row.min(window_last);
                        for r in r0..=r1 {
                            let cell = buffer[[r - start, out_c]];
                            buffer[[r - start, out_c]] = T::apply(adj.kind, cell, adj.value);
                        }
                    }
                }
            }
        }
    }
}

/// Cursor over the rolling windows of one traversal.
///
/// Not a `std::iter::Iterator`: each window borrows the cursor's internal
/// buffer, which the next advance overwrites.
pub struct WindowIter<'a, T: Element> {
    array: &'a AdjustedArray<T>,
    window_length: usize,
    end_row: usize,
    columns: Option<Vec<usize>>,
    next_start: usize,
    buffer: Array2<T>,
}

impl<'a, T: Element> WindowIter<'a, T> {
    /// The next window, or `None` when the traversal is exhausted
    pub fn next_window(&mut self) -> Option<ArrayView2<'_, T>> {
        if self.next_start + self.window_length > self.end_row {
            return None;
        }
        let start = self.next_start;
        self.next_start += 1;
        self.array
            .fill_window(start, self.columns.as_deref(), &mut self.buffer);
        Some(self.buffer.view())
    }

    /// Windows remaining in this traversal
    pub fn remaining(&self) -> usize {
        (self.end_row - self.next_start + 1).saturating_sub(self.window_length)
    }
}
