use chrono::NaiveDate;

use crate::{
    entities::{AnalysisSummary, ClassifiedResult, Status},
    narrative::{format_number, format_reference_range, format_summary, ReportAudience},
};

use super::{html::TABLE_HEADER, Render, Renderer};

#[derive(Debug)]
pub struct MarkdownRender {
    header: String,
    summary: String,
    rows: Vec<String>,
    audience: ReportAudience,
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
}

fn table_row<S: AsRef<str>>(cells: &[S]) -> String {
    let cells: Vec<String> = cells.iter().map(|c| escape_cell(c.as_ref())).collect();
    format!("| {} |", cells.join(" | "))
}

impl MarkdownRender {
    pub(crate) fn new(audience: ReportAudience, report_date: Option<NaiveDate>) -> Self {
        let mut header = format!("# {}\n", audience.title());
        if let Some(date) = report_date {
            header.push_str(&format!("\n**Report date:** {}\n", date.format("%Y-%m-%d")));
        }
        Self {
            header,
            summary: String::new(),
            rows: Vec::new(),
            audience,
        }
    }

    pub fn finalize(self) -> String {
        let mut out = self.header;
        if !self.summary.is_empty() {
            out.push_str(&format!("\n{}\n", self.summary));
        }
        out.push('\n');
        out.push_str(&table_row(&TABLE_HEADER));
        out.push('\n');
        out.push_str(&table_row(&["---"; 5]));
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out.push_str(&format!("\n> {}\n", self.audience.disclaimer()));
        out
    }
}

impl Renderer for MarkdownRender {
    type Ok = ();

    fn render_summary(&mut self, summary: &AnalysisSummary) -> anyhow::Result<Self::Ok> {
        self.summary = format_summary(summary);
        Ok(())
    }

    fn render_result(&mut self, result: &ClassifiedResult) -> anyhow::Result<Self::Ok> {
        let r = &result.result;
        let status = match result.status {
            Status::Normal => result.status.to_string(),
            _ => format!("**{}**", result.status),
        };
        self.rows.push(table_row(&[
            r.name.clone(),
            format_number(r.value),
            r.unit.clone(),
            format_reference_range(r),
            status,
        ]));
        Ok(())
    }
}

#[tracing::instrument(skip_all)]
pub fn to_markdown<R: Render>(
    results: R,
    audience: ReportAudience,
    report_date: Option<NaiveDate>,
) -> anyhow::Result<String> {
    let mut md_renderer = MarkdownRender::new(audience, report_date);
    results.render(&mut md_renderer)?;
    Ok(md_renderer.finalize())
}
