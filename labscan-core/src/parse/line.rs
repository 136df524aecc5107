use crate::entities::TestResult;

use super::grammar::GrammarRule;

/// Lines starting with these are page headers/footers.
const PAGINATION_PREFIXES: [&str; 2] = ["Page", "Página"];

/// Lines longer than this are not result rows.
pub const MAX_LINE_CHARS: usize = 1024;

/// Cleans a raw extracted line, or returns `None` when it can't hold a result:
/// empty, pagination, no digit at all, or over [`MAX_LINE_CHARS`].
///
/// Decimal commas become periods and `[`, `]`, `*` markers are dropped.
pub fn preprocess_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty()
        || PAGINATION_PREFIXES.iter().any(|p| line.starts_with(p))
        || !line.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    if line.chars().count() > MAX_LINE_CHARS {
        tracing::debug!("skipping line of {} chars", line.chars().count());
        return None;
    }

    Some(
        line.chars()
            .filter_map(|c| match c {
                ',' => Some('.'),
                '[' | ']' | '*' => None,
                c => Some(c),
            })
            .collect(),
    )
}

/// Every record found on one raw line: range-form matches first, then
/// threshold-form matches, each left to right. The same measurement can come
/// out of both rules.
pub fn parse_line(raw: &str) -> Vec<TestResult> {
    match preprocess_line(raw) {
        Some(line) => GrammarRule::ALL
            .iter()
            .flat_map(|rule| rule.matches(&line).collect::<Vec<_>>())
            .collect(),
        None => Vec::new(),
    }
}

/// Parses extracted lines into records, keeping line order.
#[tracing::instrument(skip_all)]
pub fn parse_lines<I, S>(lines: I) -> Vec<TestResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line_count = 0usize;
    let results: Vec<TestResult> = lines
        .into_iter()
        .inspect(|_| line_count += 1)
        .flat_map(|line| parse_line(line.as_ref()))
        .collect();
    tracing::debug!("parsed {} records from {} lines", results.len(), line_count);
    results
}
