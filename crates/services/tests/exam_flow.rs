mod common;

use chrono::Duration;
use common::{Fixture, single, test_id, two_by_two, user};
use exam_core::model::{
    Answer, AnswerError, MarkedAs, Question, QuestionId, QuestionKind, SyncStatus,
};
use services::{Notice, Position, SessionError};

fn qid(id: &str) -> QuestionId {
    QuestionId::new(id)
}

#[tokio::test]
async fn answer_skip_and_change_subject() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    session.select_option(0).unwrap();
    session.next().unwrap();
    session.change_subject("Chemistry").unwrap();
    session.settle().await;

    let a1 = session.state(&qid("a1")).unwrap();
    assert_eq!(a1.marked_as(), MarkedAs::Answered);
    assert!(a1.is_visited());
    let a2 = session.state(&qid("a2")).unwrap();
    assert_eq!(a2.marked_as(), MarkedAs::Skipped);
    assert!(a2.is_visited());
    assert_eq!(session.position(), Position { subject: 1, index: 0 });
    assert_eq!(session.current_question_id(), Some(&qid("b1")));
    assert_eq!(session.current_subject(), "Chemistry");
    assert_eq!(fx.repo.answer_count().unwrap(), 2);
}

#[tokio::test]
async fn review_then_answer_keeps_one_record() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    let record_id = session.attempt().record_id(&user(), &qid("a1"));

    session.mark_for_review().unwrap();
    session.settle().await;
    assert_eq!(session.state(&qid("a1")).unwrap().marked_as(), MarkedAs::Review);
    let first = fx.repo.answer(&record_id).unwrap();
    assert_eq!(first.solved_during_test.marked_as, MarkedAs::Review);

    session.prev().unwrap();
    session.select_option(2).unwrap();
    session.mark_for_review().unwrap();
    session.settle().await;

    let second = fx.repo.answer(&record_id).unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.solved_during_test.marked_as, MarkedAs::ReviewAnswered);
    assert_eq!(second.answer(), Answer::Single(2));
    assert_eq!(
        session.state(&qid("a1")).unwrap().marked_as(),
        MarkedAs::ReviewAnswered
    );
    // a1 plus the first visit of a2
    assert_eq!(fx.repo.answer_count().unwrap(), 2);
}

#[tokio::test]
async fn unchanged_revisits_do_not_write_again() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    session.select_option(1).unwrap();
    session.next().unwrap();
    session.prev().unwrap();
    session.next().unwrap();
    session.settle().await;
    assert_eq!(fx.repo.answer_write_count(), 2);

    session.prev().unwrap();
    session.select_option(3).unwrap();
    session.next().unwrap();
    session.settle().await;
    assert_eq!(fx.repo.answer_write_count(), 3);
    assert_eq!(fx.repo.answer_count().unwrap(), 2);
    let stored = fx
        .repo
        .answer(&session.attempt().record_id(&user(), &qid("a1")))
        .unwrap();
    assert_eq!(stored.answer(), Answer::Single(3));
}

#[tokio::test]
async fn time_accumulates_across_visits() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    fx.advance(Duration::seconds(10));
    session.next().unwrap();
    fx.advance(Duration::seconds(5));
    session.prev().unwrap();
    fx.advance(Duration::seconds(7));
    session.jump(1).unwrap();
    session.settle().await;

    assert_eq!(session.state(&qid("a1")).unwrap().time_spent_ms(), 17_000);
    assert_eq!(session.state(&qid("a2")).unwrap().time_spent_ms(), 5_000);
    let stored = fx
        .repo
        .answer(&session.attempt().record_id(&user(), &qid("a2")))
        .unwrap();
    assert_eq!(stored.time_taken, 5);
    assert_eq!(stored.solved_during_test.elapsed_seconds, 15);
}

#[tokio::test]
async fn next_from_last_question_wraps_to_first() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    session.change_subject("Chemistry").unwrap();
    session.jump(1).unwrap();
    assert_eq!(session.current_question_id(), Some(&qid("b2")));
    assert_eq!(session.next().unwrap(), Position::default());
    assert_eq!(session.current_question_id(), Some(&qid("a1")));
    assert_eq!(session.prev().unwrap(), Position::default());
}

#[tokio::test]
async fn failed_sync_never_blocks_navigation() {
    let fx = Fixture::new(two_by_two());
    fx.repo.fail_answer_writes(true);
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    session.select_option(0).unwrap();
    assert_eq!(session.next().unwrap(), Position { subject: 0, index: 1 });
    assert_eq!(session.jump(0).unwrap(), Position { subject: 0, index: 0 });
    assert_eq!(session.next().unwrap(), Position { subject: 0, index: 1 });
    session.settle().await;

    let a1 = session.state(&qid("a1")).unwrap();
    assert_eq!(a1.sync_status(), SyncStatus::Error);
    assert_eq!(a1.answer(), &Answer::Single(0));
    assert_eq!(a1.marked_as(), MarkedAs::Answered);
    assert_eq!(session.failed_syncs(), 2);
    assert!(
        session
            .notices()
            .iter()
            .any(|n| matches!(n, Notice::SyncDeferred { question_id, .. } if question_id == &qid("a1")))
    );
    assert_eq!(session.progress().unsynced, 2);
}

#[tokio::test]
async fn single_choice_toggle_and_shape_checks() {
    let fx = Fixture::new(vec![
        single("s1", "Maths"),
        common::choice("m1", "Maths", QuestionKind::MultiChoice),
    ]);
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    session.select_option(1).unwrap();
    session.select_option(1).unwrap();
    assert_eq!(session.current_state().unwrap().answer(), &Answer::None);
    session.select_option(2).unwrap();
    session.select_option(3).unwrap();
    assert_eq!(session.current_state().unwrap().answer(), &Answer::Single(3));

    let err = session.toggle_option(0).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Answer(AnswerError::ShapeMismatch { kind: "single" })
    ));

    session.next().unwrap();
    session.toggle_option(0).unwrap();
    session.toggle_option(2).unwrap();
    session.toggle_option(0).unwrap();
    assert_eq!(
        session.current_state().unwrap().answer(),
        &Answer::Multi([2].into_iter().collect())
    );
    session.toggle_option(2).unwrap();
    assert!(!session.current_state().unwrap().has_answer());
}

#[tokio::test]
async fn invalid_navigation_commits_nothing() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    session.select_option(0).unwrap();

    assert!(matches!(session.jump(5), Err(SessionError::Navigation(_))));
    assert!(matches!(
        session.change_subject("Biology"),
        Err(SessionError::Navigation(_))
    ));
    session.settle().await;
    assert_eq!(fx.repo.answer_write_count(), 0);
    assert!(session.current_state().unwrap().is_dirty());
    assert_eq!(session.position(), Position::default());
}

#[tokio::test]
async fn malformed_question_is_shown_unavailable() {
    let broken = Question::new(
        qid("x1"),
        vec!["Physics".into()],
        QuestionKind::SingleChoice,
        "Options missing",
        Vec::new(),
    );
    let fx = Fixture::new(vec![broken, single("x2", "Physics")]);
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    let view = session.current_view().unwrap();
    assert!(view.unavailable_reason.is_some());
    assert!(matches!(
        session.select_option(0),
        Err(SessionError::Answer(AnswerError::Unavailable(_)))
    ));
    session.next().unwrap();
    session.select_option(0).unwrap();
    assert_eq!(session.progress().total, 2);
}

#[tokio::test]
async fn autosave_commits_without_moving() {
    let fx = Fixture::new(two_by_two());
    let mut session = fx.service.start_session(&test_id(), &user()).await.unwrap();

    assert!(!session.autosave(), "nothing to save on a fresh question");
    session.select_option(2).unwrap();
    fx.advance(Duration::seconds(60));
    assert!(session.autosave());
    session.settle().await;

    assert_eq!(session.position(), Position::default());
    let state = session.current_state().unwrap();
    assert_eq!(state.marked_as(), MarkedAs::Answered);
    assert_eq!(state.time_spent_ms(), 60_000);
    assert_eq!(state.sync_status(), SyncStatus::Synced);
    assert_eq!(fx.repo.answer_write_count(), 1);

    // Marked questions keep accumulating time on later ticks.
    fx.advance(Duration::seconds(60));
    assert!(session.autosave());
    assert_eq!(session.current_state().unwrap().time_spent_ms(), 120_000);
    assert_eq!(fx.repo.answer_write_count(), 1);
}
