//! Exam items.
//!
//! A question is immutable once an attempt references it; attempts keep their
//! own snapshot of the prompt so later edits can never rewrite history.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::taxonomy::Difficulty;

/// How a question is answered.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QuestionKind {
  Mcq,
  Free,
}

/// The stored answer key. The variant doubles as the question kind, so a
/// free-form question can never carry choices and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "qtype", rename_all = "lowercase")]
pub enum AnswerKey {
  #[serde(rename_all = "camelCase")]
  Mcq {
    choices:              Vec<String>,
    correct_choice_index: i64,
  },
  Free {
    answer: String,
  },
}

impl AnswerKey {
  pub fn kind(&self) -> QuestionKind {
    match self {
      Self::Mcq { .. } => QuestionKind::Mcq,
      Self::Free { .. } => QuestionKind::Free,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question_id: Uuid,
  pub chapter_id:  Uuid,
  pub type_id:     Uuid,
  pub difficulty:  Difficulty,
  pub prompt:      String,
  pub key:         AnswerKey,
  pub active:      bool,
}

impl Question {
  pub fn kind(&self) -> QuestionKind { self.key.kind() }

  /// The learner-facing rendering: everything except the answer.
  pub fn view(&self) -> QuestionView {
    let choices = match &self.key {
      AnswerKey::Mcq { choices, .. } => Some(choices.clone()),
      AnswerKey::Free { .. } => None,
    };
    QuestionView {
      question_id: self.question_id,
      chapter_id:  self.chapter_id,
      type_id:     self.type_id,
      difficulty:  self.difficulty,
      qtype:       self.kind(),
      prompt:      self.prompt.clone(),
      choices,
    }
  }
}

/// A question with its answer key stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub question_id: Uuid,
  pub chapter_id:  Uuid,
  pub type_id:     Uuid,
  pub difficulty:  Difficulty,
  pub qtype:       QuestionKind,
  pub prompt:      String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub choices:     Option<Vec<String>>,
}

/// Input to [`crate::store::ExamStore::add_question`].
#[derive(Debug, Clone)]
pub struct NewQuestion {
  pub chapter_id: Uuid,
  pub type_id:    Uuid,
  pub difficulty: Difficulty,
  pub prompt:     String,
  pub key:        AnswerKey,
  pub active:     bool,
}
