//! SQL schema for the examdesk SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS chapters (
    chapter_id  TEXT PRIMARY KEY,
    subject     TEXT NOT NULL,
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    book_key    TEXT NOT NULL,     -- '{grade}-{subject}'
    term        TEXT NOT NULL,     -- 'upper' | 'lower'
    sort_order  INTEGER NOT NULL DEFAULT 0,
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS skill_types (
    type_id     TEXT PRIMARY KEY,
    chapter_id  TEXT NOT NULL REFERENCES chapters(chapter_id),
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS questions (
    question_id TEXT PRIMARY KEY,
    chapter_id  TEXT NOT NULL REFERENCES chapters(chapter_id),
    type_id     TEXT NOT NULL REFERENCES skill_types(type_id),
    difficulty  TEXT NOT NULL,     -- 'easy' | 'medium' | 'hard'
    qtype       TEXT NOT NULL,     -- 'mcq' | 'free'
    prompt      TEXT NOT NULL,
    key_json    TEXT NOT NULL,     -- JSON AnswerKey
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS students (
    student_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS classes (
    class_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    teacher_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    class_id    TEXT NOT NULL REFERENCES classes(class_id),
    student_id  TEXT NOT NULL REFERENCES students(student_id),
    active      INTEGER NOT NULL DEFAULT 1,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (class_id, student_id)
);

-- Created once; only ended_at is ever updated.
CREATE TABLE IF NOT EXISTS sessions (
    session_id   TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,    -- 'practice' | 'diagnostic'
    student_id   TEXT,
    subject      TEXT NOT NULL,
    scope_type   TEXT NOT NULL,    -- 'chapter' | 'book' | 'exam'
    scope_ref    TEXT NOT NULL DEFAULT '{}',
    question_ids TEXT NOT NULL DEFAULT '[]',
    started_at   TEXT NOT NULL,
    ended_at     TEXT
);

-- Attempts are append-only.
CREATE TABLE IF NOT EXISTS attempts (
    attempt_id    TEXT PRIMARY KEY,
    seq           INTEGER NOT NULL,
    session_id    TEXT NOT NULL REFERENCES sessions(session_id),
    question_id   TEXT NOT NULL,
    chapter_id    TEXT NOT NULL,
    type_id       TEXT NOT NULL,
    difficulty    TEXT NOT NULL,
    qtype         TEXT NOT NULL,
    prompt        TEXT NOT NULL,
    answer_json   TEXT NOT NULL,
    is_correct    INTEGER NOT NULL,
    time_spent_ms INTEGER NOT NULL DEFAULT 0,
    recorded_at   TEXT NOT NULL
);

-- One row per analysed diagnostic session; re-analysis overwrites.
CREATE TABLE IF NOT EXISTS session_results (
    session_id      TEXT PRIMARY KEY REFERENCES sessions(session_id),
    overall_json    TEXT NOT NULL,
    chapters_json   TEXT NOT NULL,
    analyzed_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS chapters_book_idx      ON chapters(book_key, term);
CREATE INDEX IF NOT EXISTS chapters_subject_idx   ON chapters(subject);
CREATE INDEX IF NOT EXISTS questions_chapter_idx  ON questions(chapter_id, type_id);
CREATE INDEX IF NOT EXISTS memberships_student_idx ON memberships(student_id);
CREATE INDEX IF NOT EXISTS sessions_student_idx   ON sessions(student_id, kind, started_at);
CREATE INDEX IF NOT EXISTS attempts_session_idx   ON attempts(session_id, seq);

PRAGMA user_version = 1;
";
