use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use colored::*;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use labscan_core::{
    analyze_lines, create_results_dir,
    entities::{ClassifiedResult, LabAnalysis, Status},
    narrative::{format_number, format_reference_range, format_summary, ReportAudience},
    save_analysis, AnalyzeConfig, LabAnalyzer, SaveOptions,
};
use memmap2::Mmap;
use std::{
    fmt::Write,
    ops::Range,
    path::{Path, PathBuf},
};
use tokio::fs::File;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Labscan - Lab report parser and classifier",
    long_about = "Labscan reads lab report PDFs, extracts test results with their reference ranges and flags each one as normal, near, low or high."
)]
struct Args {
    /// Path to the lab report (PDF, or plain text with --text)
    file_path: PathBuf,

    /// Treat the input as plain text, one report line per line
    #[arg(long, default_value_t = false)]
    text: bool,

    #[arg(
        long,
        short('r'),
        help = "Specify pages to read (e.g., '1-5' or '1' for single page)"
    )]
    page_range: Option<String>,

    /// Password for encrypted PDF documents
    #[arg(long)]
    password: Option<String>,

    /// Specifies the target directory where analysis results will be saved
    ///
    /// If not specified, defaults to the current working directory.
    #[arg(
        long,
        env = "LABSCAN_OUTPUT_DIR",
        help = "Specify the directory to store analysis results"
    )]
    output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Also save an HTML report")]
    html: bool,

    #[arg(long, default_value_t = false, help = "Also save a Markdown report")]
    markdown: bool,

    /// Audience of the saved reports: 'patient' or 'doctor'
    #[arg(long, default_value = "patient")]
    audience: ReportAudience,

    /// Date the report is filed under (YYYY-MM-DD). Defaults to today
    #[arg(long)]
    report_date: Option<NaiveDate>,

    /// Enable debug mode to output additional information
    #[arg(
        long,
        default_value_t = false,
        env = "LABSCAN_DEBUG",
        help = "Activate debug mode for detailed processing information"
    )]
    debug: bool,
}

fn parse_page_range(range_str: &str) -> anyhow::Result<Range<usize>> {
    if let Some((start, end)) = range_str.split_once('-') {
        let start: usize = start.trim().parse()?;
        let end: usize = end.trim().parse()?;
        if start > 0 && end >= start {
            Ok(Range {
                start: start - 1,
                end,
            })
        } else {
            anyhow::bail!("Invalid page range: start must be > 0 and end must be >= start")
        }
    } else {
        // Single page
        let page: usize = range_str.trim().parse()?;
        if page > 0 {
            Ok(Range {
                start: page - 1,
                end: page,
            })
        } else {
            anyhow::bail!("Page number must be greater than 0")
        }
    }
}

fn setup_progress_bar(length_pages: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(length_pages as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}",
        )?
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("#>-"),
    );
    Ok(pb)
}

fn init_tracing(debug: bool) {
    let default_level = if debug {
        "labscan=debug,labscan_core=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn doc_name_from_path(file_path: &Path) -> String {
    file_path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next().map(|s| s.to_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn colored_status(status: Status) -> ColoredString {
    match status {
        Status::Normal => status.as_str().green(),
        Status::Near => status.as_str().yellow(),
        Status::Low | Status::High => status.as_str().red().bold(),
    }
}

fn print_result(result: &ClassifiedResult) {
    let r = &result.result;
    println!(
        "  {:<32} {:>10} {:<12} {:<16} {}",
        r.name,
        format_number(r.value),
        r.unit,
        format_reference_range(r),
        colored_status(result.status)
    );
}

fn print_analysis(analysis: &LabAnalysis) {
    println!(
        "{} {} ({})",
        "Lab results for".bold(),
        analysis.doc_name.cyan(),
        analysis.report_date
    );
    println!(
        "  {:<32} {:>10} {:<12} {:<16} {}",
        "Test".bold(),
        "Value".bold(),
        "Unit".bold(),
        "Reference".bold(),
        "Status".bold()
    );
    analysis.results.iter().for_each(print_result);
    println!("{}", format_summary(&analysis.summary).dimmed());
}

async fn analyze_pdf(args: &Args, doc_name: String) -> anyhow::Result<LabAnalysis> {
    let analyzer = LabAnalyzer::new();
    let page_range = args
        .page_range
        .as_deref()
        .map(parse_page_range)
        .transpose()
        .context("invalid --page-range")?;

    let file = File::open(&args.file_path)
        .await
        .with_context(|| format!("can't open {}", args.file_path.display()))?;
    // Safety: the file is only read for the duration of the analysis.
    let mmap = unsafe { Mmap::map(&file)? };

    let length_pages = match &page_range {
        Some(range) => range.len(),
        None => analyzer.page_count(&mmap, args.password.as_deref()).await?,
    };
    let pb = setup_progress_bar(length_pages)?;
    let pbc = pb.clone();

    let config = AnalyzeConfig {
        password: args.password.as_deref(),
        page_range,
        report_date: args.report_date,
    };
    let analysis = analyzer
        .analyze_document(
            &mmap,
            doc_name,
            config,
            Some(move |page_id| {
                pbc.set_message(format!("Page #{}", page_id + 1));
                pbc.inc(1u64);
            }),
        )
        .await?;

    pb.finish_with_message(format!(
        "Analyzed document in {}ms",
        analysis.metadata.analysis_duration.as_millis()
    ));
    Ok(analysis)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let doc_name = doc_name_from_path(&args.file_path);

    let analysis = if args.text {
        tracing::debug!("reading {} as plain text", args.file_path.display());
        let content = tokio::fs::read_to_string(&args.file_path)
            .await
            .with_context(|| format!("can't read {}", args.file_path.display()))?;
        analyze_lines(content.lines(), doc_name, args.report_date)
    } else {
        analyze_pdf(&args, doc_name).await?
    };

    tracing::debug!(
        "{} results from {} lines on {} pages",
        analysis.summary.total,
        analysis.metadata.line_count,
        analysis.metadata.page_count
    );
    if analysis.is_empty() {
        anyhow::bail!("No data could be extracted from {}", args.file_path.display());
    }
    print_analysis(&analysis);

    let res_dir_path = create_results_dir(args.output_dir.as_ref(), &analysis.doc_name)?;
    let options = SaveOptions {
        audience: args.audience,
        save_html: args.html,
        save_markdown: args.markdown,
    };
    save_analysis(&analysis, &res_dir_path, options)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
