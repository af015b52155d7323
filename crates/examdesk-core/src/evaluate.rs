//! Answer evaluation.
//!
//! Multiple-choice answers compare choice indices exactly. Free-form answers
//! compare numerically when both sides contain a number, otherwise as
//! whitespace-normalised text. Every function here is total: no input makes
//! it panic or fail.

use crate::{question::AnswerKey, session::SubmittedAnswer};

/// Grade one submitted answer against a stored key.
///
/// A JSON number given for a `free` question is graded by its decimal text.
/// Anything other than an index for an `mcq` is simply incorrect.
pub fn is_correct(submitted: &SubmittedAnswer, key: &AnswerKey) -> bool {
  match (key, submitted) {
    (AnswerKey::Mcq { correct_choice_index, .. }, SubmittedAnswer::Choice(i)) => {
      i == correct_choice_index
    }
    (AnswerKey::Mcq { .. }, _) => false,
    (AnswerKey::Free { answer }, SubmittedAnswer::Text(text)) => {
      free_answer_matches(text, answer)
    }
    (AnswerKey::Free { answer }, SubmittedAnswer::Choice(i)) => {
      free_answer_matches(&i.to_string(), answer)
    }
    (AnswerKey::Free { answer }, SubmittedAnswer::Number(n)) => {
      free_answer_matches(&n.to_string(), answer)
    }
  }
}

/// Compare two free-form answers.
///
/// `"3.0"` matches `"3"` and `"1,000"` matches `"1000"`. A `/` anywhere in a
/// string disables its numeric reading, so `"1/2"` never matches `"0.5"`.
pub fn free_answer_matches(submitted: &str, expected: &str) -> bool {
  if let (Some(a), Some(b)) = (extract_number(submitted), extract_number(expected)) {
    return a == b;
  }
  normalize_text(submitted) == normalize_text(expected)
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_text(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first signed decimal number in `s`, after dropping thousands commas.
///
/// Returns `None` for strings containing `/`, for strings with no digits, and
/// for numbers too large for an `f64`.
pub fn extract_number(s: &str) -> Option<f64> {
  if s.contains('/') {
    return None;
  }
  let cleaned: Vec<char> = s.chars().filter(|c| *c != ',').collect();

  let mut i = 0;
  while i < cleaned.len() {
    if let Some(end) = number_end(&cleaned, i) {
      let text: String = cleaned[i..end].iter().collect();
      return text.parse::<f64>().ok().filter(|n| n.is_finite());
    }
    i += 1;
  }
  None
}

/// If a number starts at `start`, the index one past its last char.
///
/// Accepts `[+-]?\d+(\.\d+)?` and `[+-]?\.\d+`.
fn number_end(chars: &[char], start: usize) -> Option<usize> {
  let mut i = start;
  if matches!(chars.get(i), Some('+' | '-')) {
    i += 1;
  }
  let int_start = i;
  while chars.get(i).is_some_and(char::is_ascii_digit) {
    i += 1;
  }
  let has_int = i > int_start;

  if chars.get(i) == Some(&'.') {
    let frac_start = i + 1;
    let mut j = frac_start;
    while chars.get(j).is_some_and(char::is_ascii_digit) {
      j += 1;
    }
    if j > frac_start {
      return Some(j);
    }
  }
  has_int.then_some(i)
}
