//! Build and run a small factor pipeline end to end.
//!
//! Declares a generic pricing dataset, registers raw data plus a split with
//! an in-memory loader, and runs a momentum/mean pipeline over US sessions.
//!
//! Run with: cargo run --example pipeline_demo

use anyhow::Result;
use chrono::NaiveDate;
use factor_pipeline::prelude::*;
use ndarray::Array2;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let first = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let last = NaiveDate::from_ymd_opt(2024, 6, 28).expect("valid date");
    let calendars = StaticCalendarProvider::with_default_calendars(first, last);
    let sessions = calendars.get_calendar("NYSE")?.sessions().to_vec();
    let assets: Vec<AssetId> = vec![1, 2, 3];

    // Raw close prices, recorded unadjusted; asset 1 splits 2:1 mid-March.
    let dataset = equity_pricing();
    let close = dataset.column("close").expect("declared column");
    let split_date = NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date");
    let mut loader = InMemoryLoader::new(sessions.clone(), assets.clone());
    loader.set_column(
        &close,
        Array2::from_shape_fn((sessions.len(), assets.len()), |(r, c)| {
            let drift = 100.0 + r as f64 * 0.25 + c as f64 * 10.0;
            if c == 0 && sessions[r] >= split_date {
                drift / 2.0
            } else {
                drift
            }
        }),
    )?;
    loader.add_action(CorporateAction::new(
        1,
        split_date,
        ActionKind::Split { ratio: 2.0 },
    ));

    let engine = PipelineEngine::new(Arc::new(loader), Arc::new(calendars), assets);

    // The dataset is generic; binding the pipeline to US equities
    // specializes every term at compile time.
    let mut pipeline = Pipeline::with_domain(Domain::us_equities());
    let leaf = pipeline.column(&close);
    let mean = pipeline.computed(Computation::WindowMean, &[leaf], 20)?;
    let momentum = pipeline.computed(Computation::PercentChange, &[leaf], 10)?;
    let rising = pipeline.computed(Computation::GreaterThan(0.0), &[momentum], 1)?;
    pipeline.add_output("mean20", mean)?;
    pipeline.add_output("momentum10", momentum)?;
    pipeline.add_output("rising", rising)?;

    let frame = engine.run_chunked_pipeline(
        &pipeline,
        NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date"),
        NaiveDate::from_ymd_opt(2024, 5, 31).expect("valid date"),
        21,
    )?;

    println!("{}", frame.head(Some(12)));
    println!("{} rows total", frame.height());
    Ok(())
}
