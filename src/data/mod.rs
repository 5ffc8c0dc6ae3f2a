//! Data layer: adjusted arrays, corporate actions, and the loader boundary

pub mod adjusted_array;
pub mod adjustments;
pub mod loader;

pub use adjusted_array::{AdjustedArray, Adjustment, AdjustmentKind, Element, WindowIter};
pub use adjustments::{ActionKind, ColumnRole, CorporateAction};
pub use loader::{ArrayData, InMemoryLoader, PipelineLoader};
