use crate::entities::{ClassifiedResult, Status, TestResult};

/// Width of the borderline band, as a fraction of the range width (or of the
/// single bound for open ranges).
pub const NEAR_TOLERANCE: f64 = 0.25;

/// Classifies a value against its reference bounds.
///
/// Order: inside `[ref_low, ref_high]` (inclusive) is `Normal`; otherwise
/// within the tolerance band of the range is `Near`; otherwise `Low` when
/// below `ref_low`, else `High`. Open-ended bands only apply to a strictly
/// positive bound, and a zero-width range has no band.
pub fn classify(value: f64, ref_low: f64, ref_high: f64) -> Status {
    if ref_low <= value && value <= ref_high {
        return Status::Normal;
    }
    if is_near(value, ref_low, ref_high) {
        return Status::Near;
    }
    if value < ref_low {
        Status::Low
    } else {
        Status::High
    }
}

fn is_near(value: f64, ref_low: f64, ref_high: f64) -> bool {
    let open_low = ref_low == f64::NEG_INFINITY;
    let open_high = ref_high == f64::INFINITY;

    match (open_low, open_high) {
        (false, true) => ref_low > 0.0 && (value - ref_low).abs() <= NEAR_TOLERANCE * ref_low,
        (true, false) => ref_high > 0.0 && (value - ref_high).abs() <= NEAR_TOLERANCE * ref_high,
        (false, false) if ref_high > ref_low => {
            let nearest = value.max(ref_low).min(ref_high);
            (value - nearest).abs() <= NEAR_TOLERANCE * (ref_high - ref_low)
        }
        _ => false,
    }
}

impl TestResult {
    pub fn classify(&self) -> Status {
        classify(self.value, self.ref_low, self.ref_high)
    }
}

/// Attaches a status to every record, preserving order.
pub fn classify_results(results: Vec<TestResult>) -> Vec<ClassifiedResult> {
    results
        .into_iter()
        .map(|result| {
            let status = result.classify();
            ClassifiedResult { result, status }
        })
        .collect()
}
