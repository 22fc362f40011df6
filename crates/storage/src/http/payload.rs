//! Boundary parsing of backend responses.
//!
//! The backend is not consistent about envelopes: lists arrive as
//! `{questions: [...]}`, `{data: {documents: [...]}}`, `{data: [...]}` or a bare
//! array, and single objects may be wrapped in `{data: ...}`. Everything is
//! normalized here so the engine only ever sees the domain types.

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, MarkingScheme, Question, QuestionId, QuestionKind, TestId, TestMeta,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope {
    Questions { questions: Vec<Value> },
    Documents { data: Documents },
    Data { data: Vec<Value> },
    Bare(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct Documents {
    documents: Vec<Value>,
}

impl ListEnvelope {
    fn into_items(self) -> Vec<Value> {
        match self {
            Self::Questions { questions } => questions,
            Self::Documents { data } => data.documents,
            Self::Data { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> ItemEnvelope<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

fn parse_item<T: DeserializeOwned>(body: Value) -> Result<T, StorageError> {
    serde_json::from_value::<ItemEnvelope<T>>(body)
        .map(ItemEnvelope::into_inner)
        .map_err(ser)
}

fn list_items(body: Value) -> Result<Vec<Value>, StorageError> {
    serde_json::from_value::<ListEnvelope>(body)
        .map(ListEnvelope::into_items)
        .map_err(ser)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    fn into_datetime(self) -> Result<DateTime<Utc>, StorageError> {
        match self {
            Self::Millis(ms) => exam_core::time::from_millis(ms)
                .ok_or_else(|| StorageError::Serialization(format!("timestamp out of range: {ms}"))),
            Self::Text(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(ser),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestDto {
    #[serde(alias = "$id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(alias = "scheduledStart", alias = "start")]
    start_time: Timestamp,
    #[serde(alias = "durationMinutes")]
    duration: u32,
    #[serde(default)]
    marking_scheme: Option<MarkingScheme>,
    #[serde(default, alias = "type")]
    test_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionDto {
    #[serde(alias = "$id")]
    id: String,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, alias = "question")]
    question_text: String,
    #[serde(default)]
    options: Vec<String>,
}

impl QuestionDto {
    fn into_question(self) -> Question {
        let mut subjects = self.subjects;
        if subjects.is_empty() {
            subjects.extend(self.subject);
        }
        let id = QuestionId::new(self.id);
        let kind = match self.kind.as_deref() {
            Some(raw) => QuestionKind::parse(raw),
            None if self.options.is_empty() => Ok(QuestionKind::Input),
            None => Ok(QuestionKind::SingleChoice),
        };
        match kind {
            Ok(kind) => Question::new(id, subjects, kind, self.question_text, self.options),
            Err(err) => Question::unavailable(id, subjects, err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerTimeDto {
    time: Timestamp,
}

pub(crate) fn parse_test(body: Value) -> Result<TestMeta, StorageError> {
    let dto: TestDto = parse_item(body)?;
    Ok(TestMeta {
        id: TestId::new(dto.id),
        title: dto.title,
        scheduled_start: dto.start_time.into_datetime()?,
        duration_minutes: dto.duration,
        marking_scheme: dto.marking_scheme.unwrap_or_default(),
        test_type: dto.test_type.unwrap_or_else(|| "mock".to_string()),
    })
}

/// Questions in backend order. Entries without an id are dropped; anything
/// else that cannot be understood becomes an unavailable question.
pub(crate) fn parse_questions(body: Value) -> Result<Vec<Question>, StorageError> {
    let items = list_items(body)?;
    let mut questions = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<QuestionDto>(item) {
            Ok(dto) => questions.push(dto.into_question()),
            Err(err) => tracing::warn!(error = %err, "dropping malformed question entry"),
        }
    }
    Ok(questions)
}

pub(crate) fn parse_records(body: Value) -> Result<Vec<AnswerRecord>, StorageError> {
    let items = list_items(body)?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<AnswerRecord>(item) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(error = %err, "dropping malformed answer record"),
        }
    }
    Ok(records)
}

pub(crate) fn parse_server_time(body: Value) -> Result<DateTime<Utc>, StorageError> {
    let dto: ServerTimeDto = parse_item(body)?;
    dto.time.into_datetime()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_now;
    use serde_json::json;

    fn question(id: &str) -> Value {
        json!({"id": id, "subjects": ["Physics"], "type": "mcq", "questionText": "?", "options": ["a", "b"]})
    }

    #[test]
    fn question_lists_parse_from_every_envelope() {
        let shapes = [
            json!({"questions": [question("q1"), question("q2")]}),
            json!({"data": {"documents": [question("q1"), question("q2")], "total": 2}}),
            json!({"data": [question("q1"), question("q2")]}),
            json!([question("q1"), question("q2")]),
        ];
        for body in shapes {
            let parsed = parse_questions(body).unwrap();
            let ids: Vec<_> = parsed.iter().map(|q| q.id().as_str().to_string()).collect();
            assert_eq!(ids, ["q1", "q2"]);
            assert_eq!(parsed[0].kind(), QuestionKind::SingleChoice);
        }
    }

    #[test]
    fn appwrite_style_ids_and_unknown_types() {
        let body = json!({"data": {"documents": [
            {"$id": "q9", "subject": "Maths", "type": "essay", "questionText": "Prove it"},
            {"subjects": ["Maths"], "type": "input"}
        ]}});
        let parsed = parse_questions(body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id().as_str(), "q9");
        assert_eq!(parsed[0].subject(), "Maths");
        assert!(!parsed[0].is_available());
    }

    #[test]
    fn test_meta_accepts_millis_or_rfc3339() {
        let wrapped = json!({"data": {"$id": "t1", "title": "Mock", "startTime": 1_700_000_000_000_i64, "duration": 180}});
        let meta = parse_test(wrapped).unwrap();
        assert_eq!(meta.scheduled_start, fixed_now());
        assert_eq!(meta.duration_minutes, 180);
        assert_eq!(meta.marking_scheme, MarkingScheme::default());
        assert_eq!(meta.test_type, "mock");

        let bare = json!({"id": "t1", "scheduledStart": "2023-11-14T22:13:20Z", "duration": 60,
            "markingScheme": {"correct": 3, "incorrect": -1}, "type": "full"});
        let meta = parse_test(bare).unwrap();
        assert_eq!(meta.scheduled_start, fixed_now());
        assert_eq!(meta.marking_scheme.correct, 3);
        assert_eq!(meta.test_type, "full");
    }

    #[test]
    fn previous_answers_accept_type_aliases() {
        let body = json!({"data": {"documents": [{
            "$id": "r1",
            "questionId": "q1",
            "userId": "u1",
            "solvedDuringTest": {"testType": "mock", "testId": "t1", "elapsedSeconds": 90},
            "timeTaken": 20,
            "answer": {"selectedOption": 2},
            "submittedAt": 1_700_000_000_000_i64,
            "questionType": "mcq"
        }]}});
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_type, QuestionKind::SingleChoice);
        assert_eq!(records[0].answer(), exam_core::model::Answer::Single(2));
    }

    #[test]
    fn server_time_reads_epoch_millis() {
        let at = parse_server_time(json!({"time": 1_700_000_000_000_i64})).unwrap();
        assert_eq!(at, fixed_now());
        assert!(parse_server_time(json!({"now": 1})).is_err());
    }
}
