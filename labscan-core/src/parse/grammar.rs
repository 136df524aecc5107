//! The two line shapes a lab report result can take.
//!
//! Both rules are built from shared fragments and compiled once with the
//! `regex` crate, whose finite-automata engine runs in linear time on the
//! input, so adversarial lines cannot trigger catastrophic backtracking.
//! Whitespace fragments never match a line break: a rule only ever matches
//! within a single physical line.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::entities::TestResult;

/// Horizontal whitespace.
const HS: &str = r"[^\S\r\n]";
/// First character of a name: never whitespace, so a name can't trim to empty.
const NAME_START: &str = r"[\p{Latin}0-9()/.\-]";
/// Latin letters (accented included), digits, qualifiers and separators.
const NAME_CHAR: &str = r"(?:[\p{Latin}0-9()/.\-]|[^\S\r\n])";
const NUMBER: &str = r"[0-9.,]+";
/// Number with an optional `E<digits>` exponent.
const VALUE: &str = r"[0-9.,]+(?:E[0-9]+)?";
const UNIT_CHAR: &str = r"[\p{Latin}0-9/%µμ.]";
const THRESHOLD_UNIT_CHAR: &str = r"[\p{Latin}0-9/%µμ.,^]";

lazy_static! {
    static ref RANGE_RE: Regex = Regex::new(&format!(
        r"(?P<name>{NAME_START}{NAME_CHAR}*?){HS}+H?(?P<value>{VALUE}){HS}*(?P<unit>{UNIT_CHAR}*)?{HS}+(?P<low>{NUMBER}){HS}*(?:-|{HS}){HS}*(?P<high>{NUMBER})"
    ))
    .expect("range rule is a valid pattern");
    static ref THRESHOLD_RE: Regex = Regex::new(&format!(
        r"(?P<name>{NAME_START}{NAME_CHAR}*?){HS}*(?P<sign>[<>])?{HS}*(?P<value>{VALUE}){HS}*(?P<unit>{THRESHOLD_UNIT_CHAR}*{HS}*m2|{THRESHOLD_UNIT_CHAR}*)?{HS}*(?P<bound>[<>]){HS}*(?P<limit>{NUMBER})"
    ))
    .expect("threshold rule is a valid pattern");
}

/// Direction of a single-sided reference (`<X` or `>X`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Below,
    Above,
}

impl Threshold {
    fn from_sign(sign: &str) -> Self {
        if sign == "<" {
            Threshold::Below
        } else {
            Threshold::Above
        }
    }

    /// `<X` reads as `[0, X]`, `>X` as `[X, +inf)`.
    pub fn bounds(&self, limit: f64) -> (f64, f64) {
        match self {
            Threshold::Below => (0.0, limit),
            Threshold::Above => (limit, f64::INFINITY),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarRule {
    /// `<name> [H]<value>[unit] <low>-<high>` (bounds split by `-` or spaces)
    Range,
    /// `<name> [<|>]<value>[unit] <|> <limit>`
    Threshold,
}

impl GrammarRule {
    pub const ALL: [GrammarRule; 2] = [GrammarRule::Range, GrammarRule::Threshold];

    fn regex(&self) -> &'static Regex {
        match self {
            GrammarRule::Range => &RANGE_RE,
            GrammarRule::Threshold => &THRESHOLD_RE,
        }
    }

    /// All records this rule yields on a preprocessed line, left to right.
    /// Matches whose numbers don't parse, or whose bounds are inconsistent,
    /// are dropped.
    pub fn matches<'a>(&self, line: &'a str) -> impl Iterator<Item = TestResult> + 'a {
        let rule = *self;
        self.regex()
            .captures_iter(line)
            .filter_map(move |caps| rule.build(&caps))
    }

    fn build(&self, caps: &Captures) -> Option<TestResult> {
        let name = caps.name("name")?.as_str().trim();
        let value = parse_number(caps.name("value")?.as_str())?;
        let unit = caps.name("unit").map_or("", |m| m.as_str());

        let (ref_low, ref_high) = match self {
            GrammarRule::Range => (
                parse_number(caps.name("low")?.as_str())?,
                parse_number(caps.name("high")?.as_str())?,
            ),
            GrammarRule::Threshold => {
                let limit = parse_number(caps.name("limit")?.as_str())?;
                Threshold::from_sign(caps.name("bound")?.as_str()).bounds(limit)
            }
        };

        let result = TestResult::new(name, value, unit, ref_low, ref_high);
        if result.is_none() {
            tracing::debug!(
                "dropping {:?} match {:?}: inconsistent bounds",
                self,
                caps.get(0).map(|m| m.as_str())
            );
        }
        result
    }
}

/// Parses a captured number, rejecting anything that isn't finite.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    match raw.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::debug!("unparseable number {raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(line: &str) -> Vec<TestResult> {
        GrammarRule::Range.matches(line).collect()
    }

    fn threshold(line: &str) -> Vec<TestResult> {
        GrammarRule::Threshold.matches(line).collect()
    }

    #[test]
    fn test_range_hyphen() {
        let results = range("Glucose 95 mg/dL 70-100");
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.name, "Glucose");
        assert_eq!(r.value, 95.0);
        assert_eq!(r.unit, "mg/dL");
        assert_eq!(r.ref_low, 70.0);
        assert_eq!(r.ref_high, 100.0);
    }

    #[test]
    fn test_range_whitespace_separator() {
        let results = range("Hemoglobina 14.5 g/dL 13.5 17.5");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Hemoglobina");
        assert_eq!(results[0].ref_low, 13.5);
        assert_eq!(results[0].ref_high, 17.5);
    }

    #[test]
    fn test_range_spaced_hyphen() {
        let results = range("Potasio 4.1 mmol/L 3.5 - 5.1");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 4.1);
        assert_eq!(results[0].ref_low, 3.5);
        assert_eq!(results[0].ref_high, 5.1);
    }

    #[test]
    fn test_range_multiword_accented_name() {
        let results = range("Hemoglobina glicosilada (HbA1c) 5.4 % 4.0-5.6");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Hemoglobina glicosilada (HbA1c)");
        assert_eq!(results[0].unit, "%");

        let results = range("Ácido úrico 6.1 mg/dL 3.4-7.0");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ácido úrico");
    }

    #[test]
    fn test_range_flag_and_exponent() {
        let results = range("Leucocitos H12.3 10^3/µL 4.5-11.0");
        assert!(results.is_empty(), "'^' is not a range unit character");

        let results = range("Leucocitos H12.3 x10/µL 4.5-11.0");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 12.3);
        assert_eq!(results[0].unit, "x10/µL");

        let results = range("Plaquetas 2.5E5 /uL 150000-450000");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 250000.0);
    }

    #[test]
    fn test_range_without_unit() {
        let results = range("INR 1.1 0.8-1.2");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].unit, "");
        assert_eq!(results[0].value, 1.1);
    }

    #[test]
    fn test_range_unparseable_value_is_dropped() {
        assert!(range("Glucose 9.5.1 mg/dL 70-100").is_empty());
        assert!(range("Glucose . mg/dL 70-100").is_empty());
    }

    #[test]
    fn test_range_inverted_bounds_dropped() {
        assert!(range("Glucose 95 mg/dL 100-70").is_empty());
    }

    #[test]
    fn test_threshold_below() {
        let results = threshold("Colesterol LDL 130 mg/dL <100");
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.name, "Colesterol LDL");
        assert_eq!(r.value, 130.0);
        assert_eq!(r.unit, "mg/dL");
        assert_eq!(r.ref_low, 0.0);
        assert_eq!(r.ref_high, 100.0);
    }

    #[test]
    fn test_threshold_above() {
        let results = threshold("HDL 45 mg/dL >40");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ref_low, 40.0);
        assert_eq!(results[0].ref_high, f64::INFINITY);
    }

    #[test]
    fn test_threshold_leading_sign() {
        let results = threshold("PSA <0.5 ng/mL <4.0");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "PSA");
        assert_eq!(results[0].value, 0.5);
        assert_eq!(results[0].ref_high, 4.0);
    }

    #[test]
    fn test_threshold_body_surface_unit() {
        let results = threshold("eGFR 95 mL/min/1.73 m2 >60");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "eGFR");
        assert_eq!(results[0].value, 95.0);
        assert_eq!(results[0].unit, "mL/min/1.73 m2");
        assert_eq!(results[0].ref_low, 60.0);
    }

    #[test]
    fn test_threshold_needs_trailing_sign() {
        assert!(threshold("Creatinina >1.5 mg/dL").is_empty());
        assert!(threshold("Glucose 95 mg/dL 70-100").is_empty());
    }

    #[test]
    fn test_no_match_across_newline() {
        assert!(range("Glucose\n95 mg/dL 70-100")
            .iter()
            .all(|r| !r.name.contains('\n')));
        assert!(threshold("HDL\n45 mg/dL\n>40").is_empty());
    }

    #[test]
    fn test_name_never_blank() {
        let results = range("Glucose 95 mg/dL 70-100  80 60-90");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Glucose");

        let results = threshold("HDL 45 mg/dL >40   50 >40");
        assert!(results.iter().all(|r| !r.name.is_empty()));
    }

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(Threshold::Below.bounds(5.0), (0.0, 5.0));
        assert_eq!(Threshold::Above.bounds(5.0), (5.0, f64::INFINITY));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("1E3"), Some(1000.0));
        assert_eq!(parse_number("1E999"), None);
        assert_eq!(parse_number("1..2"), None);
    }
}
