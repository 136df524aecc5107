use std::{ops::Range, time::Instant};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;

use super::line::parse_lines;
use super::native::{ExtractTextQueue, ExtractTextRequest, ExtractTextResponse};
use crate::{
    classify::classify_results,
    entities::{AnalysisMetadata, AnalysisSummary, LabAnalysis, PageID, PageText},
};

/// Configuration options for analyzing a lab report with [`LabAnalyzer`]
#[derive(Debug, Clone, Default)]
pub struct AnalyzeConfig<'a> {
    /// Optional password for encrypted PDF documents
    pub password: Option<&'a str>,

    /// Optional range of pages to read. When None, reads all pages
    /// The range uses 0-based indexing (e.g., 0..5 reads the first 5 pages)
    pub page_range: Option<Range<usize>>,

    /// Date the report is filed under. Defaults to today (UTC)
    pub report_date: Option<NaiveDate>,
}

/// Runs parse and classify over lines already pulled out of a report.
#[tracing::instrument(skip(lines))]
pub fn analyze_lines<I, S>(lines: I, doc_name: String, report_date: Option<NaiveDate>) -> LabAnalysis
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let start_time = Instant::now();
    let lines: Vec<S> = lines.into_iter().collect();
    let line_count = lines.len();
    let page = PageText {
        page_id: 0,
        lines: lines.iter().map(|l| l.as_ref().to_owned()).collect(),
    };
    build_analysis(vec![page], doc_name, report_date, start_time, line_count)
}

fn build_analysis(
    pages: Vec<PageText>,
    doc_name: String,
    report_date: Option<NaiveDate>,
    start_time: Instant,
    line_count: usize,
) -> LabAnalysis {
    let parsed = parse_lines(pages.iter().flat_map(|p| p.lines.iter()));
    let results = classify_results(parsed);
    let summary = AnalysisSummary::from_results(&results);
    if results.is_empty() {
        tracing::warn!("no lab results found in {doc_name}");
    }

    LabAnalysis {
        doc_name,
        report_date: report_date.unwrap_or_else(|| Utc::now().date_naive()),
        summary,
        metadata: AnalysisMetadata::new(pages.len(), line_count, start_time.elapsed()),
        results,
        pages,
    }
}

/// Lab report analyzer: extracts text lines from a PDF, parses them into
/// test results and classifies each one against its reference range.
#[derive(Clone)]
pub struct LabAnalyzer {
    native_queue: ExtractTextQueue,
}

impl LabAnalyzer {
    /// Creates a new analyzer. Spawns the pdfium worker, so it must be called
    /// from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            native_queue: ExtractTextQueue::new(),
        }
    }

    /// Gets the total number of pages in a PDF document without reading text
    pub async fn page_count(&self, doc: &[u8], password: Option<&str>) -> anyhow::Result<usize> {
        let (result_tx, mut result_rx) = mpsc::channel(1);
        let request = ExtractTextRequest::new_count_only(doc, password, result_tx);

        self.native_queue
            .push(request)
            .await
            .context("Failed to send page count request to native queue")?;

        let result = result_rx
            .recv()
            .await
            .context("Failed to receive page count result")?
            .context("Native extraction error")?;

        match result {
            ExtractTextResponse::PageCount(count) => Ok(count),
            ExtractTextResponse::Page { .. } => {
                anyhow::bail!("Received page text for page count request")
            }
        }
    }

    /// Analyzes a PDF lab report, calling `page_callback` after each page's
    /// text has been read.
    ///
    /// # Examples
    /// ```no_run
    /// use labscan_core::{AnalyzeConfig, LabAnalyzer};
    ///
    /// async fn analyze() {
    ///     let analyzer = LabAnalyzer::new();
    ///     let doc_bytes = std::fs::read("report.pdf").unwrap();
    ///     let analysis = analyzer
    ///         .analyze_document(
    ///             &doc_bytes,
    ///             "report".to_string(),
    ///             AnalyzeConfig::default(),
    ///             Some(|page_id| println!("Read page {}", page_id)),
    ///         )
    ///         .await
    ///         .unwrap();
    ///     println!("{} results", analysis.summary.total);
    /// }
    /// ```
    #[tracing::instrument(skip_all, fields(doc_name = %doc_name))]
    pub async fn analyze_document<F>(
        &self,
        doc: &[u8],
        doc_name: String,
        config: AnalyzeConfig<'_>,
        page_callback: Option<F>,
    ) -> anyhow::Result<LabAnalysis>
    where
        F: Fn(PageID) + Send + Sync,
    {
        let AnalyzeConfig {
            password,
            page_range,
            report_date,
        } = config;
        let start_time = Instant::now();
        let pages = self
            .extract_pages(doc, password, page_range, page_callback)
            .await?;
        let line_count = pages.iter().map(|p| p.lines.len()).sum();

        Ok(build_analysis(
            pages,
            doc_name,
            report_date,
            start_time,
            line_count,
        ))
    }

    async fn extract_pages<F>(
        &self,
        doc: &[u8],
        password: Option<&str>,
        page_range: Option<Range<usize>>,
        page_callback: Option<F>,
    ) -> anyhow::Result<Vec<PageText>>
    where
        F: Fn(PageID) + Send + Sync,
    {
        let (native_tx, mut native_rx) = mpsc::channel(32);
        let req = ExtractTextRequest::new(doc, password, page_range, native_tx);
        self.native_queue.push(req).await?;

        let mut pages = Vec::new();
        while let Some(response) = native_rx.recv().await {
            match response.context("can't extract document text")? {
                ExtractTextResponse::Page { page, metadata } => {
                    tracing::debug!(
                        "page {} gave {} lines in {}ms",
                        page.page_id,
                        page.lines.len(),
                        metadata.extract_duration_ms
                    );
                    if let Some(callback) = &page_callback {
                        callback(page.page_id);
                    }
                    pages.push(page);
                }
                ExtractTextResponse::PageCount(_) => {
                    tracing::warn!("unexpected page count response")
                }
            }
        }
        pages.sort_by_key(|p| p.page_id);
        Ok(pages)
    }
}

impl Default for LabAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
