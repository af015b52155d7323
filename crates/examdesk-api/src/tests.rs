//! Router tests against an in-memory SQLite store.

use std::{collections::HashMap, sync::Arc};

use axum::{
  Extension, Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use examdesk_core::{
  identity::Identity,
  question::{AnswerKey, NewQuestion},
  roster::Student,
  scope::ExamAllowlist,
  store::ExamStore,
  taxonomy::{Chapter, Difficulty, NewChapter, NewSkillType, SkillType, Term},
};
use examdesk_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{ApiState, api_router};

struct Fixture {
  store:     Arc<SqliteStore>,
  chapter:   Chapter,
  skill:     SkillType,
  /// question id → correct free-text answer
  answers:   HashMap<Uuid, String>,
  teacher:   Uuid,
  class_id:  Uuid,
  students:  Vec<Student>,
}

async fn fixture() -> Fixture {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let chapter = store
    .add_chapter(NewChapter {
      subject:    "math".into(),
      code:       "M1-1".into(),
      name:       "Integers".into(),
      book_key:   "1-math".into(),
      term:       Term::Upper,
      sort_order: 1,
      active:     true,
    })
    .await
    .unwrap();
  let skill = store
    .add_skill_type(NewSkillType {
      chapter_id: chapter.chapter_id,
      code:       "T".into(),
      name:       "Signed addition".into(),
      sort_order: 1,
      active:     true,
    })
    .await
    .unwrap();

  let mut answers = HashMap::new();
  for (i, difficulty) in
    [Difficulty::Easy, Difficulty::Easy, Difficulty::Medium, Difficulty::Hard].into_iter().enumerate()
  {
    let answer = format!("{}", i + 1);
    let q = store
      .add_question(NewQuestion {
        chapter_id: chapter.chapter_id,
        type_id: skill.type_id,
        difficulty,
        prompt: format!("{i} + 1 = ?"),
        key: AnswerKey::Free { answer: answer.clone() },
        active: true,
      })
      .await
      .unwrap();
    answers.insert(q.question_id, answer);
  }

  let teacher = Uuid::new_v4();
  let class = store.add_class("7A".into(), teacher).await.unwrap();
  let mut students = Vec::new();
  for name in ["Ana", "Ben", "Cai"] {
    let s = store.add_student(name.into()).await.unwrap();
    store.set_membership(class.class_id, s.student_id, true).await.unwrap();
    students.push(s);
  }

  Fixture { store, chapter, skill, answers, teacher, class_id: class.class_id, students }
}

fn app(store: &Arc<SqliteStore>, who: Option<Identity>) -> Router {
  let router = api_router(Arc::new(ApiState::new(store.clone(), ExamAllowlist::default())));
  match who {
    Some(identity) => router.layer(Extension(identity)),
    None => router,
  }
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

/// Start a diagnostic for `student` over the fixture chapter and answer it,
/// getting exactly `correct` questions right (hard one last to go wrong).
async fn take_diagnostic(f: &Fixture, student: Uuid, correct: usize) -> Value {
  let who = Some(Identity::Student(student));
  let (status, created) = call(
    app(&f.store, who),
    "POST",
    "/diagnostics",
    Some(json!({
      "subject": "math",
      "scopeType": "chapter",
      "scopeRef": {"chapterId": f.chapter.chapter_id},
      "count": 4,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{created}");
  assert_eq!(created["missing"], json!(false));
  let session_id = created["session"]["sessionId"].as_str().unwrap().to_owned();

  let mut ids: Vec<Uuid> = f.answers.keys().copied().collect();
  ids.sort();
  let answers: Vec<Value> = ids
    .iter()
    .enumerate()
    .map(|(i, id)| {
      let answer = if i < correct { f.answers[id].clone() } else { "wrong".to_owned() };
      json!({"questionId": id, "answer": answer, "timeSpentMs": 900})
    })
    .collect();

  let (status, submitted) = call(
    app(&f.store, who),
    "POST",
    &format!("/sessions/{session_id}/submit"),
    Some(json!({ "answers": answers })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{submitted}");
  submitted
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_identity_is_rejected() {
  let f = fixture().await;
  let (status, body) =
    call(app(&f.store, None), "GET", &format!("/classes/{}/cohort", f.class_id), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body, json!({"error": "unauthorized"}));
}

#[tokio::test]
async fn report_viewers_cannot_start_sessions() {
  let f = fixture().await;
  let viewer = Some(Identity::ReportViewer(f.students[0].student_id));
  let (status, _) = call(
    app(&f.store, viewer),
    "POST",
    "/practice",
    Some(json!({"subject": "math", "chapterId": f.chapter.chapter_id})),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn sample_rejects_zero_count() {
  let f = fixture().await;
  let (status, body) = call(
    app(&f.store, Some(Identity::Admin)),
    "POST",
    "/diagnostics/sample",
    Some(json!({"subject": "math", "scopeType": "chapter", "scopeRef": {}, "count": 0})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["field"], json!("count"));
}

#[tokio::test]
async fn session_questions_replay_the_snapshot() {
  let f = fixture().await;
  let who = Some(Identity::Student(f.students[0].student_id));
  let (_, created) = call(
    app(&f.store, who),
    "POST",
    "/diagnostics",
    Some(json!({
      "subject": "math",
      "scopeType": "chapter",
      "scopeRef": {"chapterId": f.chapter.chapter_id},
      "count": 3,
    })),
  )
  .await;
  let session_id = created["session"]["sessionId"].as_str().unwrap();
  let snapshot = created["session"]["questionIds"].clone();
  assert_eq!(snapshot.as_array().unwrap().len(), 3);

  for _ in 0..2 {
    let (status, views) =
      call(app(&f.store, who), "GET", &format!("/sessions/{session_id}/questions"), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<Value> = views.as_array().unwrap().iter().map(|v| v["questionId"].clone()).collect();
    assert_eq!(Value::Array(ids), snapshot);
    assert!(views[0].get("answer").is_none());
  }

  // Someone else's session is invisible.
  let other = Some(Identity::Student(f.students[1].student_id));
  let (status, _) = call(app(&f.store, other), "GET", &format!("/sessions/{session_id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_skips_unknown_questions_and_stores_one_result() {
  let f = fixture().await;
  let who = Some(Identity::Student(f.students[0].student_id));
  let (_, created) = call(
    app(&f.store, who),
    "POST",
    "/diagnostics",
    Some(json!({
      "subject": "math",
      "scopeType": "chapter",
      "scopeRef": {"chapterId": f.chapter.chapter_id},
      "count": 4,
    })),
  )
  .await;
  let session_id = created["session"]["sessionId"].as_str().unwrap().to_owned();
  let (first, answer) = f.answers.iter().next().unwrap();

  let (status, submitted) = call(
    app(&f.store, who),
    "POST",
    &format!("/sessions/{session_id}/submit"),
    Some(json!({"answers": [
      {"questionId": first, "answer": answer},
      {"questionId": Uuid::new_v4(), "answer": "1"},
    ]})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(submitted["skipped"], json!(1));
  assert_eq!(submitted["results"], json!([{"questionId": first, "isCorrect": true}]));
  assert_eq!(submitted["analysis"]["overallSummary"]["score"], json!(100));
  assert_eq!(submitted["analysis"]["chapterSummary"][0]["severity"], json!("low"));

  // A second submit is refused; re-analysis overwrites the one stored result.
  let (status, body) = call(
    app(&f.store, who),
    "POST",
    &format!("/sessions/{session_id}/submit"),
    Some(json!({"answers": [{"questionId": first, "answer": answer}]})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["field"], json!("sessionId"));

  let (status, _) =
    call(app(&f.store, who), "POST", &format!("/sessions/{session_id}/analyze"), None).await;
  assert_eq!(status, StatusCode::OK);
  let (status, result) =
    call(app(&f.store, who), "GET", &format!("/sessions/{session_id}/result"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(result["overallSummary"]["total"], json!(1));
}

#[tokio::test]
async fn concurrent_submits_record_attempts_once() {
  let f = fixture().await;
  let who = Some(Identity::Student(f.students[0].student_id));
  let (_, created) = call(
    app(&f.store, who),
    "POST",
    "/diagnostics",
    Some(json!({
      "subject": "math",
      "scopeType": "chapter",
      "scopeRef": {"chapterId": f.chapter.chapter_id},
      "count": 4,
    })),
  )
  .await;
  let session_id: Uuid = created["session"]["sessionId"].as_str().unwrap().parse().unwrap();
  let uri = format!("/sessions/{session_id}/submit");
  let answers: Vec<Value> =
    f.answers.iter().map(|(id, a)| json!({"questionId": id, "answer": a})).collect();
  let body = json!({ "answers": answers });

  let (first, second) = tokio::join!(
    call(app(&f.store, who), "POST", &uri, Some(body.clone())),
    call(app(&f.store, who), "POST", &uri, Some(body.clone())),
  );
  let mut outcomes = [first, second];
  outcomes.sort_by_key(|(status, _)| status.as_u16());
  assert_eq!(outcomes[0].0, StatusCode::OK);
  assert_eq!(outcomes[1].0, StatusCode::BAD_REQUEST);
  assert_eq!(outcomes[1].1["field"], json!("sessionId"));

  assert_eq!(f.store.list_attempts(session_id).await.unwrap().len(), 4);
  let (_, result) =
    call(app(&f.store, who), "GET", &format!("/sessions/{session_id}/result"), None).await;
  assert_eq!(result["overallSummary"]["total"], json!(4));
}

#[tokio::test]
async fn oversized_submissions_are_rejected() {
  let f = fixture().await;
  let who = Some(Identity::Student(f.students[1].student_id));
  let (_, created) = call(
    app(&f.store, who),
    "POST",
    "/diagnostics",
    Some(json!({
      "subject": "math",
      "scopeType": "chapter",
      "scopeRef": {"chapterId": f.chapter.chapter_id},
      "count": 4,
    })),
  )
  .await;
  let session_id: Uuid = created["session"]["sessionId"].as_str().unwrap().parse().unwrap();
  let uri = format!("/sessions/{session_id}/submit");
  let mut answers: Vec<Value> =
    f.answers.iter().map(|(id, a)| json!({"questionId": id, "answer": a})).collect();
  answers.push(answers[0].clone());

  let (status, body) = call(app(&f.store, who), "POST", &uri, Some(json!({ "answers": answers }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["field"], json!("answers"));
  assert!(f.store.list_attempts(session_id).await.unwrap().is_empty());

  answers.pop();
  let (status, _) = call(app(&f.store, who), "POST", &uri, Some(json!({ "answers": answers }))).await;
  assert_eq!(status, StatusCode::OK);

  let (_, practice) = call(
    app(&f.store, who),
    "POST",
    "/practice",
    Some(json!({"subject": "math", "chapterId": f.chapter.chapter_id})),
  )
  .await;
  let flood: Vec<Value> =
    (0..=100).map(|_| json!({"questionId": Uuid::new_v4(), "answer": "1"})).collect();
  let (status, body) = call(
    app(&f.store, who),
    "POST",
    &format!("/sessions/{}/submit", practice["sessionId"].as_str().unwrap()),
    Some(json!({ "answers": flood })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["field"], json!("answers"));
}

// ─── Practice ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn practice_session_breaks_down_by_type() {
  let f = fixture().await;
  let who = Some(Identity::Student(f.students[2].student_id));
  let (status, session) = call(
    app(&f.store, who),
    "POST",
    "/practice",
    Some(json!({"subject": "math", "chapterId": f.chapter.chapter_id, "typeId": f.skill.type_id})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let session_id = session["sessionId"].as_str().unwrap().to_owned();

  let (status, views) = call(
    app(&f.store, who),
    "GET",
    &format!(
      "/practice/questions?chapterId={}&typeId={}&difficulty=hard",
      f.chapter.chapter_id, f.skill.type_id
    ),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(views.as_array().unwrap().len(), 1);
  let hard = views[0]["questionId"].clone();

  let (_, submitted) = call(
    app(&f.store, who),
    "POST",
    &format!("/sessions/{session_id}/submit"),
    Some(json!({"answers": [{"questionId": hard, "answer": "nope"}]})),
  )
  .await;
  let row = &submitted["analysis"]["typeSummary"][0];
  assert_eq!(row["priority"], json!("medium"));
  assert_eq!(row["recommendedDifficulty"], json!("medium"));
  assert!(submitted["analysis"].get("chapterSummary").is_none());
}

#[tokio::test]
async fn single_answer_grading() {
  let f = fixture().await;
  let (id, answer) = f.answers.iter().next().unwrap();
  let who = Some(Identity::Teacher(f.teacher));

  let (status, body) = call(
    app(&f.store, who),
    "POST",
    "/grade",
    Some(json!({"questionId": id, "answer": format!(" {answer}.0 ")})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({"isCorrect": true}));

  // JSON numbers for a free-form key grade by value.
  let n: i64 = answer.parse().unwrap();
  for (sent, expected) in [(json!(n), true), (json!(n as f64), true), (json!(n + 10), false)] {
    let (status, body) = call(
      app(&f.store, who),
      "POST",
      "/grade",
      Some(json!({"questionId": id, "answer": sent})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{sent}");
    assert_eq!(body, json!({"isCorrect": expected}), "{sent}");
  }

  let (status, _) = call(
    app(&f.store, who),
    "POST",
    "/grade",
    Some(json!({"questionId": Uuid::new_v4(), "answer": "1"})),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Analytics ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cohort_rollup_end_to_end() {
  let f = fixture().await;
  take_diagnostic(&f, f.students[0].student_id, 1).await;
  take_diagnostic(&f, f.students[1].student_id, 4).await;

  let (status, report) = call(
    app(&f.store, Some(Identity::Teacher(f.teacher))),
    "GET",
    &format!("/classes/{}/cohort?window=latest", f.class_id),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{report}");

  let row = &report["classSummaryByType"][0];
  assert_eq!(row["typeId"], json!(f.skill.type_id));
  assert_eq!(row["code"], json!("T"));
  assert_eq!(row["meanAccuracy"], json!(62.5));
  assert_eq!(row["severity"], json!("medium"));
  assert_eq!(row["weakCount"], json!(1));
  assert_eq!(report["topWeakTypes"][0]["typeId"], json!(f.skill.type_id));

  let students = report["students"].as_array().unwrap();
  assert_eq!(students.len(), 3);
  assert_eq!(students[0]["name"], json!("Ana"));
  assert_eq!(students[0]["hasReport"], json!(true));
  assert_eq!(students[0]["accuracy"], json!(25.0));
  assert_eq!(students[1]["hasReport"], json!(true));
  assert_eq!(students[2]["hasReport"], json!(false));
  assert_eq!(students[2]["accuracy"], Value::Null);
}

#[tokio::test]
async fn other_teachers_do_not_see_the_class() {
  let f = fixture().await;
  let (status, _) = call(
    app(&f.store, Some(Identity::Teacher(Uuid::new_v4()))),
    "GET",
    &format!("/classes/{}/cohort", f.class_id),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn remediation_roster_and_csv() {
  let f = fixture().await;
  take_diagnostic(&f, f.students[0].student_id, 1).await;
  take_diagnostic(&f, f.students[1].student_id, 3).await;
  let teacher = Some(Identity::Teacher(f.teacher));
  let uri = format!("/classes/{}/remediation", f.class_id);

  let (status, body) =
    call(app(&f.store, teacher), "POST", &uri, Some(json!({"window": "30d", "typeIds": []}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["field"], json!("typeIds"));

  let (status, export) = call(
    app(&f.store, teacher),
    "POST",
    &uri,
    Some(json!({"window": "30d", "typeIds": [f.skill.type_id]})),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{export}");

  let flagged = export["remedialStudents"].as_array().unwrap();
  assert_eq!(flagged.len(), 1);
  assert_eq!(flagged[0]["name"], json!("Ana"));
  assert_eq!(flagged[0]["flaggedTypes"][0]["wrong"], json!(3));
  assert_eq!(flagged[0]["accuracy"], json!(25.0));

  let csv = export["csvText"].as_str().unwrap();
  let mut lines = csv.lines();
  assert_eq!(
    lines.next(),
    Some(r#""student_id","name","flagged_types","accuracy","latest_session""#)
  );
  let row = lines.next().unwrap();
  assert!(row.contains(r#""Ana","T Signed addition","25.0""#), "{row}");
  assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn student_report_visibility() {
  let f = fixture().await;
  let ana = f.students[0].student_id;
  take_diagnostic(&f, ana, 2).await;
  let uri = format!("/students/{ana}/report?window=30d");

  for who in [Identity::Student(ana), Identity::ReportViewer(ana), Identity::Teacher(f.teacher)] {
    let (status, report) = call(app(&f.store, Some(who)), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{who:?}");
    assert_eq!(report["hasReport"], json!(true));
    assert_eq!(report["types"][0]["wrong"], json!(2));
    assert_eq!(report["types"][0]["priority"], json!("high"));
  }

  for who in [Identity::ReportViewer(f.students[1].student_id), Identity::Teacher(Uuid::new_v4())] {
    let (status, _) = call(app(&f.store, Some(who)), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{who:?}");
  }
}
