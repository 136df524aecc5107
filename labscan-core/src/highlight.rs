//! Locating classified results in the page text, for a PDF annotator to
//! highlight. Names are looked up literally, then accent-stripped, then with
//! decimal separators swapped, since the parsed name went through
//! normalization the page text did not.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::entities::{ClassifiedResult, PageID, PageText, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Green,
    Orange,
    Red,
}

impl HighlightColor {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            HighlightColor::Green => (0, 200, 83),
            HighlightColor::Orange => (255, 152, 0),
            HighlightColor::Red => (229, 57, 53),
        }
    }
}

impl From<Status> for HighlightColor {
    fn from(status: Status) -> Self {
        match status {
            Status::Normal => HighlightColor::Green,
            Status::Near => HighlightColor::Orange,
            Status::Low | Status::High => HighlightColor::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HighlightTarget {
    pub name: String,
    /// The variant of the name found on the page.
    pub matched_text: String,
    pub page_id: PageID,
    pub color: HighlightColor,
}

pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Spellings of `name` to try on a page, most faithful first.
pub fn search_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let bases = [name.to_owned(), strip_accents(name)];
    let swapped: Vec<String> = bases
        .iter()
        .flat_map(|base| [base.replace('.', ","), base.replace(',', ".")])
        .collect();
    bases.into_iter().chain(swapped).unique().collect()
}

fn find_on_page(variants: &[String], page: &PageText) -> Option<String> {
    let text = page.text();
    variants.iter().find(|v| text.contains(v.as_str())).cloned()
}

/// First page each result's name appears on. Results that can't be found are
/// left out.
#[tracing::instrument(skip_all)]
pub fn locate(results: &[ClassifiedResult], pages: &[PageText]) -> Vec<HighlightTarget> {
    results
        .iter()
        .filter(|r| !r.name().trim().is_empty())
        .filter_map(|r| {
            let variants = search_variants(r.name());
            let target = pages.iter().find_map(|page| {
                find_on_page(&variants, page).map(|matched_text| HighlightTarget {
                    name: r.name().to_owned(),
                    matched_text,
                    page_id: page.page_id,
                    color: r.status.into(),
                })
            });
            if target.is_none() {
                tracing::debug!("can't locate {:?} on any page", r.name());
            }
            target
        })
        .collect()
}
