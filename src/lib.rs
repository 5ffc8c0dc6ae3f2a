//! # factor-pipeline
//!
//! A cross-sectional factor computation engine: declare datasets once,
//! generically; bind them to concrete markets ("specialization"); compile
//! dependency graphs of windowed computations into execution plans with
//! correct history buffering; and serve historical data through
//! point-in-time-correct adjusted arrays.
//!
//! ## Example
//!
//! ```rust,no_run
//! use factor_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! # fn run(loader: Arc<dyn PipelineLoader>, calendars: Arc<dyn CalendarProvider>) -> Result<()> {
//! let dataset = testing_dataset();
//! let close = dataset.column("close").expect("declared column");
//!
//! let mut pipeline = Pipeline::with_domain(Domain::us_equities());
//! let leaf = pipeline.column(&close);
//! let momentum = pipeline.computed(Computation::PercentChange, &[leaf], 20)?;
//! pipeline.add_output("momentum", momentum)?;
//!
//! let engine = PipelineEngine::new(loader, calendars, vec![1, 2, 3]);
//! let frame = engine.run_pipeline(
//!     &pipeline,
//!     chrono::NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date"),
//!     chrono::NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"),
//! )?;
//! println!("{}", frame);
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::calendar::{
        CalendarProvider, SessionCalendar, StaticCalendarProvider, WeekdayCalendar,
    };
    pub use crate::data::{
        ActionKind, AdjustedArray, Adjustment, AdjustmentKind, ArrayData, CorporateAction,
        InMemoryLoader, PipelineLoader,
    };
    pub use crate::dataset::{equity_pricing, testing_dataset, Column, ColumnDef, DataSet};
    pub use crate::domain::{infer_domain, Domain};
    pub use crate::error::{PipelineError, Result};
    pub use crate::pipeline::{
        Computation, CustomComputation, ExecutionPlan, Pipeline, PipelineEngine, TermId,
        WindowKernel,
    };
    pub use crate::types::{AssetId, DType, MissingValue, Session, Timestamp};
}
