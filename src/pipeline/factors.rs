//! Computation kinds and their window kernels
//!
//! Each computed term carries a `Computation` describing the function it
//! applies to its inputs' rolling windows. Kernels consume float64 windows;
//! filters and classifiers differ only in output dtype (bool and int64
//! label arrays respectively).

use crate::error::{PipelineError, Result};
use crate::types::DType;
use ndarray::{ArrayView2, ArrayViewMut1};
use statrs::statistics::{Data, Distribution};
use std::fmt;
use std::sync::Arc;

/// User-supplied window kernel for custom factors.
///
/// `windows` holds one `(window_length, n_assets)` view per input for the
/// date being computed; `out` is the per-asset output row.
pub trait WindowKernel: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, windows: &[ArrayView2<'_, f64>], out: ArrayViewMut1<'_, f64>);
}

/// A shared custom kernel.
///
/// Graph interning keys custom computations by the kernel's pointer:
/// clones of one `Arc` unify into a single graph node, distinct kernels
/// never do.
#[derive(Clone)]
pub struct CustomComputation(pub Arc<dyn WindowKernel>);

impl CustomComputation {
    pub fn new(kernel: Arc<dyn WindowKernel>) -> Self {
        Self(kernel)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for CustomComputation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Custom({})", self.0.name())
    }
}

/// The computation applied by a non-leaf term
#[derive(Debug, Clone)]
pub enum Computation {
    /// Most recent value in the window
    Latest,
    /// Sum of non-missing values in the window
    WindowSum,
    /// Mean of non-missing values in the window
    WindowMean,
    /// Minimum of non-missing values in the window
    WindowMin,
    /// Maximum of non-missing values in the window
    WindowMax,
    /// Sample standard deviation of non-missing values in the window
    WindowStdDev,
    /// (last - first) / first over the window
    PercentChange,
    /// Filter: latest value strictly above the threshold
    GreaterThan(f64),
    /// Filter: latest value strictly below the threshold
    LessThan(f64),
    /// Classifier: cross-sectional quantile label of the latest row,
    /// in `[0, bins)`; missing inputs label as -1
    Quantiles(usize),
    /// User kernel
    Custom(CustomComputation),
}

/// Structural identity of a computation, used as part of the term
/// interning key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ComputationKey {
    Latest,
    WindowSum,
    WindowMean,
    WindowMin,
    WindowMax,
    WindowStdDev,
    PercentChange,
    GreaterThan(u64),
    LessThan(u64),
    Quantiles(usize),
    Custom(usize),
}

impl Computation {
    pub fn name(&self) -> &str {
        match self {
            Computation::Latest => "Latest",
            Computation::WindowSum => "WindowSum",
            Computation::WindowMean => "WindowMean",
            Computation::WindowMin => "WindowMin",
            Computation::WindowMax => "WindowMax",
            Computation::WindowStdDev => "WindowStdDev",
            Computation::PercentChange => "PercentChange",
            Computation::GreaterThan(_) => "GreaterThan",
            Computation::LessThan(_) => "LessThan",
            Computation::Quantiles(_) => "Quantiles",
            Computation::Custom(custom) => custom.0.name(),
        }
    }

    pub(crate) fn key(&self) -> ComputationKey {
        match self {
            Computation::Latest => ComputationKey::Latest,
            Computation::WindowSum => ComputationKey::WindowSum,
            Computation::WindowMean => ComputationKey::WindowMean,
            Computation::WindowMin => ComputationKey::WindowMin,
            Computation::WindowMax => ComputationKey::WindowMax,
            Computation::WindowStdDev => ComputationKey::WindowStdDev,
            Computation::PercentChange => ComputationKey::PercentChange,
            Computation::GreaterThan(t) => ComputationKey::GreaterThan(t.to_bits()),
            Computation::LessThan(t) => ComputationKey::LessThan(t.to_bits()),
            Computation::Quantiles(bins) => ComputationKey::Quantiles(*bins),
            Computation::Custom(custom) => ComputationKey::Custom(custom.identity()),
        }
    }

    /// Output dtype given the input dtypes; validates arity and input types
    pub fn output_dtype(&self, inputs: &[DType]) -> Result<DType> {
        for dtype in inputs {
            if *dtype != DType::Float64 {
                return Err(PipelineError::InvalidOperation(format!(
                    "{} requires float64 inputs, got {}",
                    self.name(),
                    dtype
                )));
            }
        }
        let unary = !matches!(self, Computation::Custom(_));
        if unary && inputs.len() != 1 {
            return Err(PipelineError::InvalidOperation(format!(
                "{} takes exactly one input, got {}",
                self.name(),
                inputs.len()
            )));
        }
        match self {
            Computation::GreaterThan(_) | Computation::LessThan(_) => Ok(DType::Bool),
            Computation::Quantiles(bins) => {
                if *bins == 0 {
                    return Err(PipelineError::InvalidOperation(
                        "Quantiles requires at least one bin".to_string(),
                    ));
                }
                Ok(DType::Int64)
            }
            _ => Ok(DType::Float64),
        }
    }

    /// Fill one float64 output row from this date's input windows
    pub(crate) fn compute_float_row(
        &self,
        windows: &[ArrayView2<'_, f64>],
        mut out: ArrayViewMut1<'_, f64>,
    ) -> Result<()> {
        let window = match self {
            Computation::Custom(custom) => {
                custom.0.compute(windows, out);
                return Ok(());
            }
            _ => self.single_window(windows)?,
        };
        let last = window.nrows() - 1;
        for asset in 0..window.ncols() {
            out[asset] = match self {
                Computation::Latest => window[[last, asset]],
                Computation::WindowSum => {
                    let mut sum = 0.0;
                    let mut seen = false;
                    for r in 0..window.nrows() {
                        let v = window[[r, asset]];
                        if !v.is_nan() {
                            sum += v;
                            seen = true;
                        }
                    }
                    if seen {
                        sum
                    } else {
                        f64::NAN
                    }
                }
                Computation::WindowMean => {
                    let values = column_values(&window, asset);
                    if values.is_empty() {
                        f64::NAN
                    } else {
                        Data::new(values).mean().unwrap_or(f64::NAN)
                    }
                }
                Computation::WindowStdDev => {
                    let values = column_values(&window, asset);
                    if values.len() < 2 {
                        f64::NAN
                    } else {
                        Data::new(values).std_dev().unwrap_or(f64::NAN)
                    }
                }
                Computation::WindowMin => column_values(&window, asset)
                    .into_iter()
                    .fold(f64::NAN, f64::min),
                Computation::WindowMax => column_values(&window, asset)
                    .into_iter()
                    .fold(f64::NAN, f64::max),
                Computation::PercentChange => {
                    let first = window[[0, asset]];
                    let latest = window[[last, asset]];
                    if first.is_nan() || latest.is_nan() || first == 0.0 {
                        f64::NAN
                    } else {
                        (latest - first) / first
                    }
                }
                Computation::GreaterThan(_)
                | Computation::LessThan(_)
                | Computation::Quantiles(_)
                | Computation::Custom(_) => {
                    return Err(PipelineError::InvalidOperation(format!(
                        "{} does not produce float64 output",
                        self.name()
                    )))
                }
            };
        }
        Ok(())
    }

    /// Fill one bool output row (filters)
    pub(crate) fn compute_bool_row(
        &self,
        windows: &[ArrayView2<'_, f64>],
        mut out: ArrayViewMut1<'_, bool>,
    ) -> Result<()> {
        let window = self.single_window(windows)?;
        let last = window.nrows() - 1;
        for asset in 0..window.ncols() {
            let latest = window[[last, asset]];
            out[asset] = match self {
                Computation::GreaterThan(threshold) => {
                    !latest.is_nan() && latest > *threshold
                }
                Computation::LessThan(threshold) => !latest.is_nan() && latest < *threshold,
                _ => {
                    return Err(PipelineError::InvalidOperation(format!(
                        "{} does not produce bool output",
                        self.name()
                    )))
                }
            };
        }
        Ok(())
    }

    /// Fill one int64 output row (classifiers)
    pub(crate) fn compute_int_row(
        &self,
        windows: &[ArrayView2<'_, f64>],
        mut out: ArrayViewMut1<'_, i64>,
    ) -> Result<()> {
        let bins = match self {
            Computation::Quantiles(bins) => *bins,
            _ => {
                return Err(PipelineError::InvalidOperation(format!(
                    "{} does not produce int64 output",
                    self.name()
                )))
            }
        };
        let window = self.single_window(windows)?;
        let last = window.nrows() - 1;
        let mut ranked: Vec<(usize, f64)> = (0..window.ncols())
            .filter_map(|asset| {
                let v = window[[last, asset]];
                (!v.is_nan()).then_some((asset, v))
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        out.fill(-1);
        let count = ranked.len();
        for (rank, (asset, _)) in ranked.into_iter().enumerate() {
            out[asset] = ((rank * bins / count) as i64).min(bins as i64 - 1);
        }
        Ok(())
    }

    fn single_window<'v, 'a>(
        &self,
        windows: &'v [ArrayView2<'a, f64>],
    ) -> Result<ArrayView2<'a, f64>> {
        match windows {
            [window] => Ok(window.clone()),
            _ => Err(PipelineError::InvalidOperation(format!(
                "{} takes exactly one input, got {}",
                self.name(),
                windows.len()
            ))),
        }
    }
}

fn column_values(window: &ArrayView2<'_, f64>, asset: usize) -> Vec<f64> {
    (0..window.nrows())
        .map(|r| window[[r, asset]])
        .filter(|v| !v.is_nan())
        .collect()
}
