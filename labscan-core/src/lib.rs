pub mod classify;
pub mod entities;
pub mod highlight;
pub mod narrative;
pub mod parse;
pub mod render;

mod utils;

pub use classify::{classify, classify_results};
pub use parse::document::{analyze_lines, AnalyzeConfig, LabAnalyzer};
pub use parse::{parse_line, parse_lines};
pub use utils::{create_results_dir, sanitize_doc_name, save_analysis, SaveOptions};
