mod common;

use common::{Fixture, meta, test_id, two_by_two, user};
use exam_core::model::{Answer, MarkedAs, QuestionId};
use services::{DriverExit, ExamSession, SessionCommand, SessionDriver, SessionSnapshot};
use services::session::UpdateCause;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Running = (
    mpsc::Sender<SessionCommand>,
    mpsc::UnboundedReceiver<SessionSnapshot>,
    JoinHandle<(DriverExit, ExamSession)>,
);

async fn spawn_driver(fx: &Fixture) -> Running {
    let session = fx.service.start_session(&test_id(), &user()).await.unwrap();
    let mut driver = SessionDriver::new(session, fx.service.config());
    let (commands, command_rx) = mpsc::channel(16);
    let (updates_tx, updates) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let exit = driver.run(command_rx, updates_tx).await;
        (exit, driver.into_session())
    });
    (commands, updates, handle)
}

fn drain(updates: &mut mpsc::UnboundedReceiver<SessionSnapshot>) -> Vec<SessionSnapshot> {
    let mut seen = Vec::new();
    while let Ok(snapshot) = updates.try_recv() {
        seen.push(snapshot);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn commands_drive_the_session_until_submit() {
    let fx = Fixture::new(two_by_two());
    let (commands, mut updates, handle) = spawn_driver(&fx).await;

    commands.send(SessionCommand::SelectOption(1)).await.unwrap();
    commands.send(SessionCommand::MarkForReview).await.unwrap();
    commands.send(SessionCommand::Jump(9)).await.unwrap();
    commands
        .send(SessionCommand::ChangeSubject("Chemistry".into()))
        .await
        .unwrap();
    commands.send(SessionCommand::Submit).await.unwrap();

    let (exit, session) = handle.await.unwrap();
    assert!(matches!(exit, DriverExit::Submitted(outcome) if !outcome.forced));
    assert!(session.is_submitted());
    let a1 = session.state(&QuestionId::new("a1")).unwrap();
    assert_eq!(a1.marked_as(), MarkedAs::ReviewAnswered);
    assert_eq!(a1.answer(), &Answer::Single(1));

    let snapshots = drain(&mut updates);
    assert_eq!(snapshots.first().unwrap().cause, UpdateCause::Started);
    assert!(
        snapshots
            .iter()
            .any(|s| s.cause == UpdateCause::Command && s.error.is_some())
    );
    let last = snapshots.last().unwrap();
    assert!(last.submitted);
    assert_eq!(last.subject, "Chemistry");
    assert_eq!(fx.repo.submissions().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_the_command_channel_tears_down() {
    let fx = Fixture::new(two_by_two());
    let (commands, _updates, handle) = spawn_driver(&fx).await;

    commands.send(SessionCommand::Next).await.unwrap();
    drop(commands);

    let (exit, session) = handle.await.unwrap();
    assert_eq!(exit, DriverExit::Closed);
    assert!(!session.is_submitted());
    assert!(fx.repo.submissions().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn countdown_submits_without_input() {
    let fx = Fixture::with_meta(meta(1), two_by_two());
    let (commands, mut updates, handle) = spawn_driver(&fx).await;

    let (exit, _session) = handle.await.unwrap();
    assert!(matches!(exit, DriverExit::Submitted(outcome) if outcome.forced));
    let ticks = drain(&mut updates)
        .into_iter()
        .filter(|s| s.cause == UpdateCause::Tick)
        .count();
    assert_eq!(ticks, 60);
    drop(commands);
}
