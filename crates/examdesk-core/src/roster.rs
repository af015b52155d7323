//! Students, classes, and class membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub student_id: Uuid,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
  pub class_id:   Uuid,
  pub name:       String,
  pub teacher_id: Uuid,
  pub created_at: DateTime<Utc>,
}

/// A student's place in a class. Disabled memberships stay in storage but are
/// excluded from every aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
  pub class_id:   Uuid,
  pub student_id: Uuid,
  pub active:     bool,
  pub updated_at: DateTime<Utc>,
}
