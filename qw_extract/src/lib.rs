pub mod assemble;
pub mod backend;
pub mod batch;
pub mod catalog;
pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod pivot;
pub mod stations;
pub mod timezone;

pub use compose::{DataTable, PlotRow, PlotTable};
pub use config::ExtractionConfig;
pub use error::{EmptyResultWarning, ExtractError, Result, Stage};
pub use pipeline::{Extraction, ExtractionRequest, extract};
