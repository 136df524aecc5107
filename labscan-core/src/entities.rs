use std::{fmt, str::FromStr, time::Duration};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type PageID = usize;

const LABSCAN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Clinical status of a result against its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Status {
    Normal,
    Near,
    Low,
    High,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "Normal",
            Status::Near => "Near",
            Status::Low => "Low",
            Status::High => "High",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Status::Normal),
            "near" => Ok(Status::Near),
            "low" => Ok(Status::Low),
            "high" => Ok(Status::High),
            other => anyhow::bail!("unknown status: {other:?}"),
        }
    }
}

// Open bounds are carried as infinities in memory and as `null` in JSON.
fn serialize_bound<S: Serializer>(bound: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if bound.is_finite() {
        serializer.serialize_some(bound)
    } else {
        serializer.serialize_none()
    }
}

fn deserialize_low<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
}

fn deserialize_high<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

fn open_low() -> f64 {
    f64::NEG_INFINITY
}

fn open_high() -> f64 {
    f64::INFINITY
}

/// One test line lifted out of the report, before classification.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestResult {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(
        serialize_with = "serialize_bound",
        deserialize_with = "deserialize_low",
        default = "open_low"
    )]
    pub ref_low: f64,
    #[serde(
        serialize_with = "serialize_bound",
        deserialize_with = "deserialize_high",
        default = "open_high"
    )]
    pub ref_high: f64,
}

impl TestResult {
    /// Builds a record, rejecting a non-finite value or a closed range with
    /// `ref_low > ref_high`.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        ref_low: f64,
        ref_high: f64,
    ) -> Option<Self> {
        if !value.is_finite() || ref_low.is_nan() || ref_high.is_nan() {
            return None;
        }
        if ref_low > ref_high {
            return None;
        }
        Some(Self {
            name: name.into(),
            value,
            unit: unit.into(),
            ref_low,
            ref_high,
        })
    }

    #[inline(always)]
    pub fn is_open_high(&self) -> bool {
        self.ref_high == f64::INFINITY
    }

    #[inline(always)]
    pub fn is_open_low(&self) -> bool {
        self.ref_low == f64::NEG_INFINITY
    }
}

/// A [`TestResult`] with the status the classifier assigned to it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassifiedResult {
    #[serde(flatten)]
    pub result: TestResult,
    pub status: Status,
}

impl ClassifiedResult {
    pub fn name(&self) -> &str {
        &self.result.name
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub normal: usize,
    pub near: usize,
    pub low: usize,
    pub high: usize,
}

impl AnalysisSummary {
    pub fn from_results(results: &[ClassifiedResult]) -> Self {
        let counts = results.iter().map(|r| r.status).counts();
        let count = |status| counts.get(&status).copied().unwrap_or_default();
        Self {
            total: results.len(),
            normal: count(Status::Normal),
            near: count(Status::Near),
            low: count(Status::Low),
            high: count(Status::High),
        }
    }

    pub fn out_of_range(&self) -> usize {
        self.low + self.high
    }
}

/// Text lines pulled out of one PDF page.
#[derive(Debug, Default, Clone)]
pub struct PageText {
    pub page_id: PageID,
    pub lines: Vec<String>,
}

impl PageText {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisMetadata {
    pub page_count: usize,
    pub line_count: usize,
    #[serde(with = "serde_millis")]
    pub analysis_duration: Duration,
    pub labscan_version: String,
}

impl AnalysisMetadata {
    pub fn new(page_count: usize, line_count: usize, analysis_duration: Duration) -> Self {
        Self {
            page_count,
            line_count,
            analysis_duration,
            labscan_version: LABSCAN_VERSION.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabAnalysis {
    pub doc_name: String,
    pub report_date: NaiveDate,
    pub results: Vec<ClassifiedResult>,
    pub summary: AnalysisSummary,
    pub metadata: AnalysisMetadata,
    /// Extracted page text, kept for highlight lookup and never serialized.
    #[serde(skip)]
    pub pages: Vec<PageText>,
}

impl LabAnalysis {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(name: &str, status: Status) -> ClassifiedResult {
        ClassifiedResult {
            result: TestResult::new(name, 1.0, "", 0.0, 2.0).unwrap(),
            status,
        }
    }

    #[test]
    fn test_new_rejects_invalid_records() {
        assert!(TestResult::new("Glucose", f64::NAN, "mg/dL", 70.0, 100.0).is_none());
        assert!(TestResult::new("Glucose", f64::INFINITY, "mg/dL", 70.0, 100.0).is_none());
        assert!(TestResult::new("Glucose", 95.0, "mg/dL", 100.0, 70.0).is_none());
        assert!(TestResult::new("Glucose", 95.0, "mg/dL", 70.0, 70.0).is_some());
        assert!(TestResult::new("eGFR", 95.0, "", 60.0, f64::INFINITY).is_some());
    }

    #[test]
    fn test_open_bounds_serialize_as_null() -> anyhow::Result<()> {
        let result = TestResult::new("eGFR", 95.0, "mL/min", 60.0, f64::INFINITY).unwrap();
        let json = serde_json::to_value(&result)?;
        assert_eq!(json["ref_low"], 60.0);
        assert!(json["ref_high"].is_null());

        let back: TestResult = serde_json::from_value(json)?;
        assert_eq!(back, result);
        Ok(())
    }

    #[test]
    fn test_missing_bounds_deserialize_open() -> anyhow::Result<()> {
        let result: TestResult = serde_json::from_str(r#"{"name":"PSA","value":1.2}"#)?;
        assert!(result.is_open_low());
        assert!(result.is_open_high());
        assert_eq!(result.unit, "");
        Ok(())
    }

    #[test]
    fn test_classified_result_is_flat() -> anyhow::Result<()> {
        let json = serde_json::to_value(classified("Sodio", Status::Near))?;
        assert_eq!(json["name"], "Sodio");
        assert_eq!(json["status"], "Near");

        let back: ClassifiedResult = serde_json::from_value(json)?;
        assert_eq!(back.status, Status::Near);
        assert_eq!(back.name(), "Sodio");
        Ok(())
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("normal".parse::<Status>().unwrap(), Status::Normal);
        assert_eq!(" HIGH ".parse::<Status>().unwrap(), Status::High);
        assert!("borderline".parse::<Status>().is_err());
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            classified("a", Status::Normal),
            classified("b", Status::Normal),
            classified("c", Status::Near),
            classified("d", Status::High),
        ];
        let summary = AnalysisSummary::from_results(&results);
        assert_eq!(
            summary,
            AnalysisSummary {
                total: 4,
                normal: 2,
                near: 1,
                low: 0,
                high: 1,
            }
        );
        assert_eq!(summary.out_of_range(), 1);
        assert_eq!(AnalysisSummary::from_results(&[]), AnalysisSummary::default());
    }
}
