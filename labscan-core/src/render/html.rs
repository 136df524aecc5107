use build_html::{Html, HtmlContainer, HtmlElement, HtmlPage, HtmlTag, Table};
use chrono::NaiveDate;

use crate::{
    entities::{AnalysisSummary, ClassifiedResult},
    narrative::{format_number, format_reference_range, format_summary, ReportAudience},
};

use super::{Render, Renderer};

pub(crate) const TABLE_HEADER: [&str; 5] = ["Test", "Value", "Unit", "Reference range", "Status"];

pub struct HTMLRenderer {
    page: HtmlPage,
    table: Table,
    audience: ReportAudience,
}

impl HTMLRenderer {
    pub fn new(page_title: &str, audience: ReportAudience, report_date: Option<NaiveDate>) -> Self {
        let mut page = HtmlPage::new()
            .with_title(page_title)
            .with_header(1, audience.title());
        if let Some(date) = report_date {
            page.add_paragraph(format!("Report date: {}", date.format("%Y-%m-%d")));
        }
        let mut table = Table::new();
        table.add_header_row(TABLE_HEADER);
        Self {
            page,
            table,
            audience,
        }
    }

    pub fn finalize(mut self) -> String {
        self.page.add_table(self.table);
        let disclaimer = HtmlElement::new(HtmlTag::Footer)
            .with_child(self.audience.disclaimer().into());
        self.page.add_html(disclaimer);
        self.page.to_html_string()
    }
}

impl Renderer for HTMLRenderer {
    type Ok = ();

    fn render_summary(&mut self, summary: &AnalysisSummary) -> anyhow::Result<Self::Ok> {
        self.page.add_paragraph(format_summary(summary));
        Ok(())
    }

    fn render_result(&mut self, result: &ClassifiedResult) -> anyhow::Result<Self::Ok> {
        let r = &result.result;
        self.table.add_body_row([
            r.name.clone(),
            format_number(r.value),
            r.unit.clone(),
            format_reference_range(r),
            result.status.to_string(),
        ]);
        Ok(())
    }
}

#[tracing::instrument(skip_all)]
pub fn to_html<R: Render>(
    results: R,
    page_title: &str,
    audience: ReportAudience,
    report_date: Option<NaiveDate>,
) -> anyhow::Result<String> {
    let mut html_renderer = HTMLRenderer::new(page_title, audience, report_date);
    results.render(&mut html_renderer)?;
    Ok(html_renderer.finalize())
}
