use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entities::{AnalysisSummary, ClassifiedResult, TestResult};

const RESULTS_HEADER: &str = "Here are the patient's laboratory results:\n\n";

/// Who a generated report is written for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAudience {
    #[default]
    Patient,
    Doctor,
}

impl ReportAudience {
    pub fn title(&self) -> &'static str {
        match self {
            ReportAudience::Patient => "Your Lab Results",
            ReportAudience::Doctor => "Laboratory Results Report",
        }
    }

    pub fn disclaimer(&self) -> &'static str {
        match self {
            ReportAudience::Patient => {
                "Remember, this is an interpretation to help you understand your results. \
                 It does not replace a consultation with your doctor, who knows your history \
                 and will give you the best recommendations. Always talk to your doctor!"
            }
            ReportAudience::Doctor => {
                "This report is for informational purposes only and does not replace \
                 professional medical evaluation."
            }
        }
    }
}

impl FromStr for ReportAudience {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "patient" | "paciente" => Ok(ReportAudience::Patient),
            "doctor" => Ok(ReportAudience::Doctor),
            other => anyhow::bail!("Invalid report type {other:?}: must be 'doctor' or 'patient'"),
        }
    }
}

/// Formats a number for reports: whole numbers keep one decimal (`95.0`),
/// infinities read `inf` / `-inf`.
pub fn format_number(v: f64) -> String {
    if v == f64::INFINITY {
        "inf".to_owned()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Human form of a reference range: `70.0–100.0`, `> 60.0`, `< 10.0`.
pub fn format_reference_range(result: &TestResult) -> String {
    match (result.is_open_low(), result.is_open_high()) {
        (false, false) => format!(
            "{}–{}",
            format_number(result.ref_low),
            format_number(result.ref_high)
        ),
        (false, true) => format!("> {}", format_number(result.ref_low)),
        (true, false) => format!("< {}", format_number(result.ref_high)),
        (true, true) => "—".to_owned(),
    }
}

pub fn format_summary(summary: &AnalysisSummary) -> String {
    format!(
        "{} results: {} normal, {} near, {} low, {} high",
        summary.total, summary.normal, summary.near, summary.low, summary.high
    )
}

/// One descriptive line for a classified result.
pub fn result_line(result: &ClassifiedResult) -> String {
    let r = &result.result;
    format!(
        "{}: {} {} (reference range {}–{}). Status: {}.",
        r.name,
        format_number(r.value),
        r.unit,
        format_number(r.ref_low),
        format_number(r.ref_high),
        result.status
    )
}

/// Results as the plain text block handed to the narrative generator.
pub fn results_to_text(results: &[ClassifiedResult]) -> String {
    let lines: Vec<String> = results.iter().map(result_line).collect();
    format!("{RESULTS_HEADER}{}", lines.join("\n"))
}
