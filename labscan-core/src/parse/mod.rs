pub mod document;
pub mod grammar;
pub mod line;
pub mod native;

pub use line::{parse_line, parse_lines, preprocess_line};
