//! Chapters and skill types: the taxonomy questions hang off.
//!
//! A chapter belongs to one book (a grade/subject pair) and one term, and
//! owns an ordered list of skill types. Both carry an active flag; inactive
//! nodes are never offered to the assembler.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

/// Item difficulty.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

/// Half of a school year.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Term {
  Upper,
  Lower,
}

/// A chapter of one book.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
  pub chapter_id: Uuid,
  /// Lowercase subject key, e.g. `math`.
  pub subject:    String,
  /// Stable code referenced by exam allowlists.
  pub code:       String,
  pub name:       String,
  /// Canonical `"{grade}-{subject}"` key, see [`crate::scope::book_key`].
  pub book_key:   String,
  pub term:       Term,
  pub sort_order: i64,
  pub active:     bool,
}

/// Input to [`crate::store::ExamStore::add_chapter`].
#[derive(Debug, Clone)]
pub struct NewChapter {
  pub subject:    String,
  pub code:       String,
  pub name:       String,
  pub book_key:   String,
  pub term:       Term,
  pub sort_order: i64,
  pub active:     bool,
}

/// A skill type; belongs to exactly one chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillType {
  pub type_id:    Uuid,
  pub chapter_id: Uuid,
  pub code:       String,
  pub name:       String,
  pub sort_order: i64,
  pub active:     bool,
}

/// Input to [`crate::store::ExamStore::add_skill_type`].
#[derive(Debug, Clone)]
pub struct NewSkillType {
  pub chapter_id: Uuid,
  pub code:       String,
  pub name:       String,
  pub sort_order: i64,
  pub active:     bool,
}
