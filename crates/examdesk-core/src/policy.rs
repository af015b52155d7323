//! Fixed grading thresholds and the banding rules derived from them.
//!
//! Every threshold the pipeline classifies against lives here. Handlers and
//! aggregators call the functions below rather than comparing literals.

use serde::{Deserialize, Serialize};

use crate::taxonomy::Difficulty;

/// Accuracy strictly below this is a `high` severity weakness.
pub const HIGH_SEVERITY_BELOW: f64 = 0.50;

/// Accuracy at or above this is `low` severity.
pub const LOW_SEVERITY_FROM: f64 = 0.80;

/// A student is flagged for remediation on a type at this many wrong answers.
pub const REMEDIATION_WRONG_COUNT: u32 = 2;

/// Length of the ranked weak-type list in a cohort rollup.
pub const TOP_WEAK_TYPES: usize = 5;

/// Trailing window, in days, for [`crate::cohort::Window::Last30Days`].
pub const TRAILING_WINDOW_DAYS: i64 = 30;

/// Upper bound on the size of one assembled diagnostic test.
pub const MAX_DIAGNOSTIC_QUESTIONS: usize = 100;

// ─── Bands ───────────────────────────────────────────────────────────────────

/// A three-level band used both for severity and remediation priority.
///
/// Ordering is `Low < Medium < High`, so sorting descending puts the most
/// urgent rows first.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Band {
  Low,
  Medium,
  High,
}

/// Classify an accuracy fraction (`0.0..=1.0`) into a severity band.
pub fn severity(accuracy: f64) -> Band {
  if accuracy < HIGH_SEVERITY_BELOW {
    Band::High
  } else if accuracy < LOW_SEVERITY_FROM {
    Band::Medium
  } else {
    Band::Low
  }
}

/// True when an accuracy fraction counts as a weakness for "weak count".
pub fn is_weak(accuracy: f64) -> bool { accuracy < HIGH_SEVERITY_BELOW }

/// Remediation priority and the difficulty to practise next, from the number
/// of wrong answers on a type and whether any missed item was `hard`.
pub fn remediation(wrong: u32, missed_hard: bool) -> (Band, Difficulty) {
  if wrong >= REMEDIATION_WRONG_COUNT {
    (Band::High, Difficulty::Easy)
  } else if missed_hard || wrong == 1 {
    (Band::Medium, Difficulty::Medium)
  } else {
    (Band::Low, Difficulty::Hard)
  }
}

/// True when `wrong` reaches the remediation flag threshold.
pub fn needs_remediation(wrong: u32) -> bool { wrong >= REMEDIATION_WRONG_COUNT }

// ─── Ratios ──────────────────────────────────────────────────────────────────

/// `correct / total`, with an empty denominator yielding `0.0`.
pub fn ratio(correct: u32, total: u32) -> f64 {
  if total == 0 {
    0.0
  } else {
    f64::from(correct) / f64::from(total)
  }
}

/// Render a fraction as a percentage rounded to one decimal place.
pub fn percent(fraction: f64) -> f64 { round1(fraction * 100.0) }

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 { (value * 10.0).round() / 10.0 }

/// Integer score out of 100.
pub fn score(fraction: f64) -> u32 { (fraction * 100.0).round() as u32 }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn severity_boundaries_are_inclusive_on_the_upper_band() {
    assert_eq!(severity(0.0), Band::High);
    assert_eq!(severity(0.4999), Band::High);
    assert_eq!(severity(0.50), Band::Medium);
    assert_eq!(severity(0.7999), Band::Medium);
    assert_eq!(severity(0.80), Band::Low);
    assert_eq!(severity(1.0), Band::Low);
  }

  #[test]
  fn remediation_rules() {
    assert_eq!(remediation(3, true), (Band::High, Difficulty::Easy));
    assert_eq!(remediation(2, false), (Band::High, Difficulty::Easy));
    assert_eq!(remediation(1, true), (Band::Medium, Difficulty::Medium));
    assert_eq!(remediation(1, false), (Band::Medium, Difficulty::Medium));
    assert_eq!(remediation(0, false), (Band::Low, Difficulty::Hard));
  }

  #[test]
  fn empty_ratio_is_zero() {
    assert_eq!(ratio(0, 0), 0.0);
    assert_eq!(ratio(1, 4), 0.25);
  }

  #[test]
  fn percent_rounds_to_one_decimal() {
    assert_eq!(percent(0.625), 62.5);
    assert_eq!(percent(2.0 / 3.0), 66.7);
    assert_eq!(score(0.625), 63);
  }

  #[test]
  fn bands_order_by_urgency() {
    let mut bands = vec![Band::Low, Band::High, Band::Medium];
    bands.sort_by(|a, b| b.cmp(a));
    assert_eq!(bands, vec![Band::High, Band::Medium, Band::Low]);
  }
}
