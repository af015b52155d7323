//! Verified caller identities.
//!
//! Tokens and cookies are parsed elsewhere; this crate only sees the result
//! of verification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roster::Class;

/// Who is making a request, once verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "camelCase")]
pub enum Identity {
  Admin,
  Teacher(Uuid),
  Student(Uuid),
  /// Bearer of a report token; may read one student's report and nothing
  /// else.
  ReportViewer(Uuid),
}

impl Identity {
  pub fn is_admin(&self) -> bool { matches!(self, Self::Admin) }

  /// Admins and the class's own teacher.
  pub fn can_view_class(&self, class: &Class) -> bool {
    match self {
      Self::Admin => true,
      Self::Teacher(id) => *id == class.teacher_id,
      Self::Student(_) | Self::ReportViewer(_) => false,
    }
  }

  /// Whether this identity may read `student_id`'s data. `teaches` lists the
  /// classes the student is an active member of.
  pub fn can_view_student(&self, student_id: Uuid, teaches: &[Class]) -> bool {
    match self {
      Self::Admin => true,
      Self::Student(id) | Self::ReportViewer(id) => *id == student_id,
      Self::Teacher(_) => teaches.iter().any(|c| self.can_view_class(c)),
    }
  }

  /// Sessions belong to a student or to nobody. Report viewers never see
  /// raw sessions.
  pub fn can_view_session(&self, owner: Option<Uuid>) -> bool {
    match (self, owner) {
      (Self::ReportViewer(_), _) => false,
      (_, None) | (Self::Admin, _) => true,
      (Self::Student(id), Some(owner)) => *id == owner,
      (Self::Teacher(_), Some(_)) => false,
    }
  }
}

/// Outcome of checking a token or session cookie.
///
/// `expired` is only set when the credential was otherwise valid; callers at
/// the HTTP boundary must not reveal it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
  pub authenticated: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub identity:      Option<Identity>,
  #[serde(default, skip_serializing)]
  pub expired:       bool,
}

impl Verification {
  pub fn verified(identity: Identity) -> Self {
    Self { authenticated: true, identity: Some(identity), expired: false }
  }

  pub fn rejected() -> Self { Self { authenticated: false, identity: None, expired: false } }

  pub fn expired() -> Self { Self { authenticated: false, identity: None, expired: true } }

  pub fn identity(&self) -> Option<Identity> {
    if self.authenticated { self.identity } else { None }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;

  fn class(teacher_id: Uuid) -> Class {
    Class { class_id: Uuid::new_v4(), name: "7A".into(), teacher_id, created_at: Utc::now() }
  }

  #[test]
  fn class_visibility() {
    let teacher = Uuid::new_v4();
    let c = class(teacher);
    assert!(Identity::Admin.can_view_class(&c));
    assert!(Identity::Teacher(teacher).can_view_class(&c));
    assert!(!Identity::Teacher(Uuid::new_v4()).can_view_class(&c));
    assert!(!Identity::Student(teacher).can_view_class(&c));
  }

  #[test]
  fn student_visibility() {
    let teacher = Uuid::new_v4();
    let student = Uuid::new_v4();
    let classes = vec![class(teacher)];
    assert!(Identity::Student(student).can_view_student(student, &[]));
    assert!(Identity::ReportViewer(student).can_view_student(student, &[]));
    assert!(!Identity::ReportViewer(student).can_view_student(Uuid::new_v4(), &[]));
    assert!(Identity::Teacher(teacher).can_view_student(student, &classes));
    assert!(!Identity::Teacher(teacher).can_view_student(student, &[]));
  }

  #[test]
  fn session_visibility() {
    let me = Uuid::new_v4();
    assert!(Identity::Student(me).can_view_session(Some(me)));
    assert!(!Identity::Student(me).can_view_session(Some(Uuid::new_v4())));
    assert!(Identity::Teacher(me).can_view_session(None));
    assert!(Identity::Admin.can_view_session(Some(me)));
    assert!(!Identity::ReportViewer(me).can_view_session(Some(me)));
  }

  #[test]
  fn identity_wire_shape() {
    let id = Uuid::nil();
    assert_eq!(
      serde_json::to_value(Identity::Teacher(id)).unwrap(),
      serde_json::json!({"role": "teacher", "id": id})
    );
    assert_eq!(serde_json::to_value(Identity::Admin).unwrap(), serde_json::json!({"role": "admin"}));
  }

  #[test]
  fn expired_verification_has_no_identity() {
    let v = Verification::expired();
    assert!(!v.authenticated);
    assert!(v.expired);
    assert_eq!(v.identity(), None);
    assert_eq!(Verification::verified(Identity::Admin).identity(), Some(Identity::Admin));
  }
}
