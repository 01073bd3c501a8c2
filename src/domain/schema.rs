use std::collections::BTreeSet;

/// Lookup of the dimension keys each shape family and subtype accepts.
pub trait ShapeSchema: Send + Sync {
    fn dimension_keys(&self, family: &str, subtype: &str) -> Option<&BTreeSet<String>>;
}

/// Subtype assumed when a shape omits `familySubtype`.
pub const DEFAULT_SUBTYPE: &str = "1";

/// Largest integer below which every `f64` integer is exact.
const MAX_EXACT_SUBTYPE: f64 = 9_007_199_254_740_992.0;

/// Normal form of a textual subtype: trimmed, empty means the default, and
/// integral numbers drop their fraction so `"1"`, `"1.0"` and `" 1 "` agree.
pub fn normalize_subtype_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_SUBTYPE.to_string();
    }
    match integral_subtype(trimmed.parse::<f64>().ok()) {
        Some(number) => number,
        None => trimmed.to_string(),
    }
}

/// Decimal form of a non-negative integral, exactly representable number.
pub fn integral_subtype(number: Option<f64>) -> Option<String> {
    match number {
        Some(number)
            if number.fract() == 0.0 && (0.0..=MAX_EXACT_SUBTYPE).contains(&number) =>
        {
            Some(format!("{}", number as u64))
        }
        _ => None,
    }
}
