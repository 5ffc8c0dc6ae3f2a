//! Property tests for adjusted-array window traversal

use factor_pipeline::prelude::*;
use ndarray::{s, Array2};
use proptest::prelude::*;
use std::collections::BTreeMap;

type RawAdjustment = (usize, usize, usize, usize, u8, f64);

fn apply_kind(kind: AdjustmentKind, current: f64, value: f64) -> f64 {
    match kind {
        AdjustmentKind::Overwrite => value,
        AdjustmentKind::Add => current + value,
        AdjustmentKind::Multiply => current * value,
    }
}

fn kind_of(tag: u8) -> AdjustmentKind {
    match tag % 3 {
        0 => AdjustmentKind::Overwrite,
        1 => AdjustmentKind::Add,
        _ => AdjustmentKind::Multiply,
    }
}

/// Straight-line reference: copy the slice, then walk each adjustment
/// cell by cell in last_row order.
fn reference_window(
    base: &Array2<f64>,
    adjustments: &[Adjustment<f64>],
    start: usize,
    window_length: usize,
) -> Array2<f64> {
    let mut out = base.slice(s![start..start + window_length, ..]).to_owned();
    for adj in adjustments {
        for r in adj.first_row..=adj.last_row {
            if r < start || r >= start + window_length {
                continue;
            }
            for c in adj.first_col..=adj.last_col {
                out[[r - start, c]] = apply_kind(adj.kind, out[[r - start, c]], adj.value);
            }
        }
    }
    out
}

fn arb_case() -> impl Strategy<
    Value = (usize, usize, Vec<f64>, Vec<RawAdjustment>, usize),
> {
    (2usize..8, 1usize..4).prop_flat_map(|(rows, cols)| {
        (
            Just(rows),
            Just(cols),
            proptest::collection::vec(-10.0..10.0f64, rows * cols),
            proptest::collection::vec(
                (0..rows, 0..rows, 0..cols, 0..cols, 0u8..3, -3.0..3.0f64),
                0..4,
            ),
            1..=rows,
        )
    })
}

proptest! {
    #[test]
    fn prop_windows_match_reference(
        (rows, cols, values, raw_adjustments, window_length) in arb_case()
    ) {
        let base = Array2::from_shape_vec((rows, cols), values).unwrap();

        // Normalize the raw tuples into valid, per-column-ordered
        // adjustments.
        let mut by_column: BTreeMap<usize, Vec<Adjustment<f64>>> = BTreeMap::new();
        for (r0, r1, c0, c1, tag, value) in raw_adjustments {
            by_column.entry(c0.min(c1)).or_default().push(Adjustment {
                first_row: r0.min(r1),
                last_row: r0.max(r1),
                first_col: c0.min(c1),
                last_col: c0.max(c1),
                value,
                kind: kind_of(tag),
            });
        }
        for seq in by_column.values_mut() {
            seq.sort_by_key(|adj| adj.last_row);
        }
        let mut ordered: Vec<Adjustment<f64>> =
            by_column.values().flatten().copied().collect();
        ordered.sort_by_key(|adj| adj.last_row);

        let adjusted = AdjustedArray::new(base.clone(), by_column, f64::NAN).unwrap();

        let mut iter = adjusted.traverse(window_length).unwrap();
        let mut start = 0;
        while let Some(window) = iter.next_window() {
            let expected = reference_window(&base, &ordered, start, window_length);
            prop_assert_eq!(window.to_owned(), expected);
            start += 1;
        }
        prop_assert_eq!(start, rows - window_length + 1);

        // Traversal never mutates the base.
        prop_assert_eq!(adjusted.base().to_owned(), base);
    }

    #[test]
    fn prop_traverse_is_restartable(
        (rows, cols, values, _raw, window_length) in arb_case()
    ) {
        let base = Array2::from_shape_vec((rows, cols), values).unwrap();
        let adjusted = AdjustedArray::from_base(base, f64::NAN);

        let collect = || {
            let mut iter = adjusted.traverse(window_length).unwrap();
            let mut out = Vec::new();
            while let Some(window) = iter.next_window() {
                out.push(window.to_owned());
            }
            out
        };
        prop_assert_eq!(collect(), collect());
    }
}
