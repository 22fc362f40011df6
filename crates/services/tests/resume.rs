mod common;

use chrono::Duration;
use common::{Fixture, single, test_id, two_by_two, user};
use exam_core::model::{
    Answer, AnswerRecord, MarkedAs, QuestionId, QuestionKind, RecordId, SolvedDuringTest,
    SyncStatus, TestId, Verdict,
};
use exam_core::time::fixed_now;
use services::Notice;
use storage::repository::AnswerOutbox;

fn qid(id: &str) -> QuestionId {
    QuestionId::new(id)
}

fn legacy_record(id: &str, question: &str, answer: Answer, offset_secs: i64) -> AnswerRecord {
    AnswerRecord {
        id: RecordId::new(id),
        question_id: qid(question),
        user_id: user(),
        solved_during_test: SolvedDuringTest {
            test_type: "mock".into(),
            test_id: test_id(),
            elapsed_seconds: 100,
            marked_as: MarkedAs::None,
        },
        time_taken: 42,
        answer: answer.to_payload(),
        submitted_at: fixed_now() + Duration::seconds(offset_secs),
        question_type: QuestionKind::SingleChoice,
        verdict: Verdict::Pending,
    }
}

#[tokio::test]
async fn reload_restores_answers_markings_and_time() {
    let fx = Fixture::new(two_by_two());
    {
        let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();
        session.select_option(2).unwrap();
        fx.advance(Duration::seconds(30));
        session.next().unwrap();
        fx.advance(Duration::seconds(12));
        session.mark_for_review().unwrap();
        session.settle().await;
    }

    let mut resumed = fx.restart().start_session(&test_id(), &user()).await.unwrap();
    let a1 = resumed.state(&qid("a1")).unwrap();
    assert_eq!(a1.answer(), &Answer::Single(2));
    assert_eq!(a1.marked_as(), MarkedAs::Answered);
    assert_eq!(a1.time_spent_ms(), 30_000);
    assert_eq!(a1.sync_status(), SyncStatus::Synced);
    assert!(a1.is_visited() && !a1.is_dirty());

    let a2 = resumed.state(&qid("a2")).unwrap();
    assert_eq!(a2.marked_as(), MarkedAs::Review);
    assert_eq!(a2.time_spent_ms(), 12_000);
    assert!(!resumed.state(&qid("b1")).unwrap().is_visited());

    // Resumed sessions write to the same records.
    resumed.select_option(3).unwrap();
    resumed.next().unwrap();
    resumed.settle().await;
    assert_eq!(fx.repo.answer_count().unwrap(), 2);
}

#[tokio::test]
async fn latest_record_wins_and_strays_are_ignored() {
    let fx = Fixture::new(two_by_two());
    fx.repo
        .insert_answer(legacy_record("old", "a1", Answer::Single(0), 0))
        .unwrap();
    fx.repo
        .insert_answer(legacy_record("new", "a1", Answer::Single(3), 10))
        .unwrap();
    fx.repo
        .insert_answer(legacy_record("gone", "zz", Answer::Single(1), 5))
        .unwrap();
    fx.repo
        .insert_answer(legacy_record("blank", "b2", Answer::None, 5))
        .unwrap();

    let session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    let a1 = session.state(&qid("a1")).unwrap();
    assert_eq!(a1.answer(), &Answer::Single(3));
    assert_eq!(a1.marked_as(), MarkedAs::Answered);
    assert_eq!(a1.time_spent_ms(), 42_000);
    assert_eq!(session.state(&qid("b2")).unwrap().marked_as(), MarkedAs::Skipped);
    assert!(session.state(&qid("zz")).is_none());
    assert_eq!(session.progress().not_visited, 2);
}

#[tokio::test]
async fn resume_fetch_failure_starts_fresh() {
    let fx = Fixture::new(two_by_two());
    fx.repo
        .insert_answer(legacy_record("r1", "a1", Answer::Single(0), 0))
        .unwrap();
    fx.repo.fail_previous_answers(true);

    let session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    assert!(!session.state(&qid("a1")).unwrap().is_visited());
    assert_eq!(session.progress().not_visited, 4);
}

#[tokio::test]
async fn outbox_survives_restart_and_is_redelivered() {
    let fx = Fixture::new(two_by_two());
    fx.repo.fail_answer_writes(true);
    {
        let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();
        session.select_option(1).unwrap();
        session.next().unwrap();
        session.settle().await;
    }
    let staged = fx.outbox.pending(&user(), &test_id()).await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(fx.repo.answer_count().unwrap(), 0);

    let mut resumed = fx.restart().start_session(&test_id(), &user()).await.unwrap();
    let a1 = resumed.state(&qid("a1")).unwrap();
    assert_eq!(a1.answer(), &Answer::Single(1));
    assert_eq!(a1.sync_status(), SyncStatus::Error);
    assert_eq!(resumed.failed_syncs(), 1);

    fx.repo.fail_answer_writes(false);
    resumed.autosave();
    resumed.settle().await;
    assert_eq!(
        resumed.state(&qid("a1")).unwrap().sync_status(),
        SyncStatus::Synced
    );
    assert_eq!(resumed.failed_syncs(), 0);
    assert!(
        resumed
            .notices()
            .iter()
            .any(|n| matches!(n, Notice::SyncRecovered { .. }))
    );
    assert!(fx.outbox.pending(&user(), &test_id()).await.unwrap().is_empty());
    let stored = fx
        .repo
        .answer(&resumed.attempt().record_id(&user(), &qid("a1")))
        .unwrap();
    assert_eq!(stored.answer(), Answer::Single(1));
}

#[tokio::test]
async fn reanswering_a_failed_question_sends_only_the_new_answer() {
    let fx = Fixture::new(two_by_two());
    fx.repo.fail_answer_writes(true);
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    session.select_option(0).unwrap();
    session.next().unwrap();
    session.settle().await;
    assert_eq!(session.failed_syncs(), 1);

    fx.repo.fail_answer_writes(false);
    session.prev().unwrap();
    session.select_option(1).unwrap();
    assert!(session.autosave());
    session.settle().await;

    let a1 = session.state(&qid("a1")).unwrap();
    assert_eq!(a1.answer(), &Answer::Single(1));
    assert_eq!(a1.sync_status(), SyncStatus::Synced);
    assert_eq!(session.failed_syncs(), 0);
    let stored = fx
        .repo
        .answer(&session.attempt().record_id(&user(), &qid("a1")))
        .unwrap();
    assert_eq!(stored.answer(), Answer::Single(1));
    assert!(fx.outbox.pending(&user(), &test_id()).await.unwrap().is_empty());

    drop(session);
    let resumed = fx.restart().start_session(&test_id(), &user()).await.unwrap();
    let a1 = resumed.state(&qid("a1")).unwrap();
    assert_eq!(a1.answer(), &Answer::Single(1));
    assert_eq!(a1.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn retake_starts_from_a_clean_sheet() {
    let fx = Fixture::new(two_by_two());
    {
        let mut live = fx.service.start_session(&test_id(), &user()).await.unwrap();
        live.select_option(0).unwrap();
        live.submit().await.unwrap();
    }
    fx.advance(Duration::hours(4));

    let mut retake = fx.service.start_retake(&test_id(), &user()).await.unwrap();
    assert!(!retake.state(&qid("a1")).unwrap().has_answer());
    retake.select_option(2).unwrap();
    retake.next().unwrap();
    retake.settle().await;
    assert_eq!(fx.repo.answer_count().unwrap(), 2);
}

#[tokio::test]
async fn catalog_refresh_picks_up_new_content() {
    let fx = Fixture::new(vec![single("q1", "Physics")]);
    fx.service.start_session(&test_id(), &user()).await.unwrap();
    fx.service.start_session(&test_id(), &user()).await.unwrap();
    assert_eq!(fx.repo.question_fetch_count(), 1);

    fx.repo
        .insert_test(common::meta(180), two_by_two())
        .unwrap();
    let cached = fx.service.start_session(&test_id(), &user()).await.unwrap();
    assert_eq!(cached.progress().total, 1);

    fx.service.catalog().refresh(&test_id()).await.unwrap();
    let fresh = fx.service.start_session(&test_id(), &user()).await.unwrap();
    assert_eq!(fresh.progress().total, 4);
    assert_eq!(fx.repo.question_fetch_count(), 2);
    assert!(
        fx.service
            .catalog()
            .get(&TestId::new("other"))
            .await
            .is_err()
    );
}
