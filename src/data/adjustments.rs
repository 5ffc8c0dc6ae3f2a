//! Corporate actions and their lowering to cell-level adjustments
//!
//! Raw data is recorded unadjusted. A corporate action effective on session
//! `k` means every row before `k` must be corrected when viewed from `k` or
//! later. Lowering turns each action into a `Multiply` adjustment over the
//! rows of the requested date range that precede its effective session.

use crate::data::adjusted_array::{Adjustment, AdjustmentKind};
use crate::types::{AssetId, Session};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type of corporate action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Stock split (a 2-for-1 split has ratio 2.0)
    Split { ratio: f64 },
    /// Cash dividend per share
    CashDividend { amount: f64 },
    /// Merger exchange at the given share ratio
    Merger { ratio: f64 },
}

/// A corporate action on one asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub asset: AssetId,
    pub effective_date: Session,
    pub kind: ActionKind,
}

impl CorporateAction {
    pub fn new(asset: AssetId, effective_date: Session, kind: ActionKind) -> Self {
        Self {
            asset,
            effective_date,
            kind,
        }
    }

    /// Multiplicative price correction for rows before the effective date.
    ///
    /// `prev_close` is the raw close on the session before the effective
    /// date, needed to express a cash dividend as a ratio.
    pub fn price_ratio(&self, prev_close: f64) -> f64 {
        match self.kind {
            ActionKind::Split { ratio } => 1.0 / ratio,
            ActionKind::CashDividend { amount } => {
                if prev_close > 0.0 && prev_close.is_finite() {
                    (prev_close - amount) / prev_close
                } else {
                    1.0
                }
            }
            ActionKind::Merger { ratio } => 1.0 / ratio,
        }
    }

    /// Multiplicative volume correction for rows before the effective date
    pub fn volume_ratio(&self) -> f64 {
        match self.kind {
            ActionKind::Split { ratio } => ratio,
            ActionKind::CashDividend { .. } => 1.0,
            ActionKind::Merger { .. } => 1.0,
        }
    }
}

/// Which correction a column takes when actions are lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Price,
    Volume,
}

/// Lower `actions` into per-column adjustments for a base array covering
/// `dates` x `assets`.
///
/// An action effective at position `k` of `dates` yields a `Multiply`
/// adjustment over rows `[0, k - 1]` of its asset's column. Actions
/// effective at or before `dates[0]` touch no in-range rows and are
/// dropped; actions effective after the range are not yet known to any
/// vantage point in it.
pub fn lower_actions(
    actions: &[CorporateAction],
    dates: &[Session],
    assets: &[AssetId],
    role: ColumnRole,
    base: ArrayView2<'_, f64>,
) -> BTreeMap<usize, Vec<Adjustment<f64>>> {
    let mut out: BTreeMap<usize, Vec<Adjustment<f64>>> = BTreeMap::new();
    if dates.is_empty() {
        return out;
    }
    for action in actions {
        let col = match assets.iter().position(|a| *a == action.asset) {
            Some(col) => col,
            None => continue,
        };
        let k = dates.partition_point(|d| *d < action.effective_date);
        if k == 0 || k >= dates.len() {
            continue;
        }
        let value = match role {
            ColumnRole::Price => action.price_ratio(base[[k - 1, col]]),
            ColumnRole::Volume => action.volume_ratio(),
        };
        out.entry(col).or_default().push(Adjustment {
            first_row: 0,
            last_row: k - 1,
            first_col: col,
            last_col: col,
            value,
            kind: AdjustmentKind::Multiply,
        });
    }
    for seq in out.values_mut() {
        seq.sort_by_key(|adj| adj.last_row);
    }
    out
}
