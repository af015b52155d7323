//! Remediation rosters: which class members need re-teaching on which types.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, WriterBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  analysis::group_by,
  cohort::{StudentWindow, TypeCatalog, Window},
  policy,
};

/// Separator for multi-valued CSV cells.
pub const LIST_SEPARATOR: &str = " / ";

const CSV_HEADER: [&str; 5] =
  ["student_id", "name", "flagged_types", "accuracy", "latest_session"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedType {
  pub type_id: Uuid,
  pub code:    String,
  pub name:    String,
  pub wrong:   u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemedialStudent {
  pub student_id:        Uuid,
  pub name:              String,
  pub flagged_types:     Vec<FlaggedType>,
  /// Percentage over the selected types, one decimal.
  pub accuracy:          f64,
  pub latest_session_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationExport {
  pub class_id:          Uuid,
  pub window:            Window,
  pub remedial_students: Vec<RemedialStudent>,
  pub csv_text:          String,
}

/// Reject an empty type selection.
pub fn validate_types(type_ids: &[Uuid]) -> Result<HashSet<Uuid>> {
  if type_ids.is_empty() {
    return Err(Error::validation("typeIds", "select at least one type"));
  }
  Ok(type_ids.iter().copied().collect())
}

/// Flag `member` on every selected type with enough wrong answers in the
/// window. `None` when nothing is flagged.
pub fn flag_student(
  member: &StudentWindow,
  selected: &HashSet<Uuid>,
  catalog: &TypeCatalog,
) -> Option<RemedialStudent> {
  let restricted: Vec<_> = member
    .sessions
    .iter()
    .flat_map(|s| s.attempts.iter())
    .filter(|a| selected.contains(&a.type_id))
    .cloned()
    .collect();

  let mut flagged_types: Vec<FlaggedType> = group_by(&restricted, |a| a.type_id)
    .into_iter()
    .filter(|(_, tally)| policy::needs_remediation(tally.wrong()))
    .map(|(type_id, tally)| {
      let (code, name) = catalog.label(type_id);
      FlaggedType { type_id, code, name, wrong: tally.wrong() }
    })
    .collect();

  if flagged_types.is_empty() {
    return None;
  }

  flagged_types.sort_by(|a, b| catalog.compare(a.type_id, b.type_id));

  let correct = restricted.iter().filter(|a| a.is_correct).count() as u32;
  Some(RemedialStudent {
    student_id: member.student.student_id,
    name: member.student.name.clone(),
    flagged_types,
    accuracy: policy::percent(policy::ratio(correct, restricted.len() as u32)),
    latest_session_at: member.latest_session_at(),
  })
}

/// Render flagged students as CSV with every field quoted.
pub fn to_csv(students: &[RemedialStudent]) -> Result<String> {
  let mut writer = WriterBuilder::new()
    .quote_style(QuoteStyle::Always)
    .from_writer(Vec::new());

  writer.write_record(CSV_HEADER)?;
  for student in students {
    let types = student
      .flagged_types
      .iter()
      .map(|t| {
        if t.name.is_empty() {
          t.code.clone()
        } else {
          format!("{} {}", t.code, t.name)
        }
      })
      .collect::<Vec<_>>()
      .join(LIST_SEPARATOR);
    let latest = student
      .latest_session_at
      .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
      .unwrap_or_default();

    writer.write_record([
      student.student_id.to_string(),
      student.name.clone(),
      types,
      format!("{:.1}", student.accuracy),
      latest,
    ])?;
  }

  let bytes = writer
    .into_inner()
    .map_err(|e| Error::Export(e.into_error().into()))?;
  Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Flag every member, in roster order, and render the export.
pub fn build_export(
  class_id: Uuid,
  window: Window,
  members: &[StudentWindow],
  selected: &HashSet<Uuid>,
  catalog: &TypeCatalog,
) -> Result<RemediationExport> {
  let remedial_students: Vec<RemedialStudent> = members
    .iter()
    .filter_map(|m| flag_student(m, selected, catalog))
    .collect();
  let csv_text = to_csv(&remedial_students)?;
  Ok(RemediationExport { class_id, window, remedial_students, csv_text })
}
