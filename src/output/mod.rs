//! Output formatting module
//!
//! Reporters that render run summaries.

mod formatter;

pub use formatter::{write_report_to_file, OutputFormat, Reporter, SummaryFormatter};
