use crate::{
    entities::LabAnalysis,
    highlight::locate,
    narrative::ReportAudience,
    render::{html::to_html, markdown::to_markdown},
};

use anyhow::Context;
use colored::*;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub fn sanitize_doc_name(doc_name: &str) -> String {
    doc_name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
}

fn recreate_result_dir(result_dir_name: &Path) -> anyhow::Result<PathBuf> {
    if std::fs::create_dir(result_dir_name).is_err() {
        std::fs::remove_dir_all(result_dir_name)?;
        std::fs::create_dir(result_dir_name)?;
    };
    Ok(result_dir_name.to_owned())
}

/// Creates (or empties) `<output_dir>/<doc>-results`, defaulting to the
/// current directory.
pub fn create_results_dir<P: AsRef<Path>>(
    output_dir: Option<P>,
    doc_name: &str,
) -> anyhow::Result<PathBuf> {
    let result_dir_name = format!("{}-results", sanitize_doc_name(doc_name));
    let res_dir_path = match output_dir {
        Some(p) => p.as_ref().join(&result_dir_name),
        None => PathBuf::from(format!("./{}", &result_dir_name)),
    };
    recreate_result_dir(&res_dir_path)
        .with_context(|| format!("can't create results dir {}", res_dir_path.display()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub audience: ReportAudience,
    pub save_html: bool,
    pub save_markdown: bool,
}

fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("can't create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content)?;
    writer.flush()?;
    Ok(())
}

pub fn save_analysis(
    analysis: &LabAnalysis,
    res_dir_path: &Path,
    options: SaveOptions,
) -> anyhow::Result<()> {
    let sanitized_doc_name = sanitize_doc_name(&analysis.doc_name);
    // Save json
    let file_out = res_dir_path.join(format!("{}.json", &sanitized_doc_name));
    let analysis_json = serde_json::to_string(analysis).context("can't encode analysis")?;
    write_file(&file_out, analysis_json.as_bytes())?;

    if !analysis.pages.is_empty() {
        let targets = locate(&analysis.results, &analysis.pages);
        let highlights_out = res_dir_path.join(format!("{}.highlights.json", &sanitized_doc_name));
        write_file(&highlights_out, serde_json::to_string(&targets)?.as_bytes())?;
    }

    if options.save_html {
        let html_content = to_html(
            analysis,
            &analysis.doc_name,
            options.audience,
            Some(analysis.report_date),
        )
        .context("can't render html report")?;
        let html_file_out = res_dir_path.join(format!("{}.html", sanitized_doc_name));
        write_file(&html_file_out, html_content.as_bytes())?;
    }

    if options.save_markdown {
        let md_content = to_markdown(analysis, options.audience, Some(analysis.report_date))
            .context("can't render markdown report")?;
        let md_file_out = res_dir_path.join(format!("{}.md", sanitized_doc_name));
        write_file(&md_file_out, md_content.as_bytes())?;
    }
    println!(
        "{} Results saved in: {}",
        "✓".green().bold(),
        res_dir_path.display().to_string().cyan().underline()
    );

    Ok(())
}
