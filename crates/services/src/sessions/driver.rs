//! Event loop that owns a running session.
//!
//! Multiplexes candidate commands with the countdown tick, the autosave
//! interval, the clock resync interval and background write results. Dropping
//! the command sender tears the session down and cancels every timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::navigation::Position;
use super::notice::Notice;
use super::progress::ExamProgress;
use super::service::{ExamSession, QuestionView, TickOutcome};
use super::submission::SubmitOutcome;
use super::sync::SyncOutcome;
use crate::config::EngineConfig;
use crate::error::SessionError;

/// Candidate input, as produced by a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Next,
    Prev,
    Jump(usize),
    ChangeSubject(String),
    MarkForReview,
    SelectOption(usize),
    ToggleOption(usize),
    InputText(String),
    ClearAnswer,
    Submit,
}

/// Why a snapshot was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateCause {
    #[default]
    Started,
    Command,
    Tick,
    Autosave,
    Sync,
}

/// State pushed to the UI after every event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub cause: UpdateCause,
    pub subject: String,
    pub position: Position,
    pub question: Option<QuestionView>,
    pub remaining_secs: u64,
    pub progress: ExamProgress,
    pub submitted: bool,
    pub locked: bool,
    /// Error of the command that caused this snapshot, if any.
    pub error: Option<String>,
    /// Notices raised since the previous snapshot.
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    Submitted(SubmitOutcome),
    /// The command channel closed before submission.
    Closed,
}

enum Event {
    Command(SessionCommand),
    Closed,
    Tick,
    Autosave,
    Resync,
    Synced(SyncOutcome),
}

fn every(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub struct SessionDriver {
    session: ExamSession,
    config: EngineConfig,
    resync_task: Option<JoinHandle<()>>,
}

impl SessionDriver {
    #[must_use]
    pub fn new(session: ExamSession, config: EngineConfig) -> Self {
        Self {
            session,
            config,
            resync_task: None,
        }
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    #[must_use]
    pub fn into_session(self) -> ExamSession {
        self.session
    }

    /// Run until the session is submitted or `commands` closes.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        updates: mpsc::UnboundedSender<SessionSnapshot>,
    ) -> DriverExit {
        let mut tick = every(self.config.tick);
        let mut autosave = every(self.config.autosave_interval);
        let mut resync = every(self.config.clock_resync_interval);
        self.publish(&updates, UpdateCause::Started, None);

        let exit = loop {
            let event = tokio::select! {
                command = commands.recv() => command.map_or(Event::Closed, Event::Command),
                _ = tick.tick() => Event::Tick,
                _ = autosave.tick() => Event::Autosave,
                _ = resync.tick() => Event::Resync,
                Some(outcome) = self.session.next_sync_outcome() => Event::Synced(outcome),
            };
            match event {
                Event::Closed => {
                    info!("command channel closed, tearing down session");
                    break DriverExit::Closed;
                }
                Event::Command(command) => {
                    let result = self.apply(command).await;
                    let error = result.as_ref().err().map(ToString::to_string);
                    if let Some(err) = &error {
                        warn!(error = %err, "command rejected");
                    }
                    self.publish(&updates, UpdateCause::Command, error);
                    if let Ok(Some(outcome)) = result {
                        break DriverExit::Submitted(outcome);
                    }
                }
                Event::Tick => {
                    let outcome = self.session.tick().await;
                    self.publish(&updates, UpdateCause::Tick, None);
                    if let TickOutcome::Submitted(outcome) | TickOutcome::Finished(outcome) = outcome {
                        break DriverExit::Submitted(outcome);
                    }
                }
                Event::Autosave => {
                    if self.session.autosave() {
                        self.publish(&updates, UpdateCause::Autosave, None);
                    }
                }
                Event::Resync => self.spawn_resync(),
                Event::Synced(outcome) => {
                    self.session.apply_sync_outcome(outcome).await;
                    self.publish(&updates, UpdateCause::Sync, None);
                }
            }
        };
        if let Some(task) = self.resync_task.take() {
            task.abort();
        }
        exit
    }

    async fn apply(&mut self, command: SessionCommand) -> Result<Option<SubmitOutcome>, SessionError> {
        let session = &mut self.session;
        match command {
            SessionCommand::Next => session.next().map(|_| None),
            SessionCommand::Prev => session.prev().map(|_| None),
            SessionCommand::Jump(index) => session.jump(index).map(|_| None),
            SessionCommand::ChangeSubject(subject) => session.change_subject(&subject).map(|_| None),
            SessionCommand::MarkForReview => session.mark_for_review().map(|_| None),
            SessionCommand::SelectOption(option) => session.select_option(option).map(|()| None),
            SessionCommand::ToggleOption(option) => session.toggle_option(option).map(|()| None),
            SessionCommand::InputText(text) => session.set_input_text(text).map(|()| None),
            SessionCommand::ClearAnswer => session.clear_answer().map(|()| None),
            SessionCommand::Submit => session.submit().await.map(Some),
        }
    }

    fn spawn_resync(&mut self) {
        if self.resync_task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("previous clock resync still running");
            return;
        }
        let clock = self.session.clock().clone();
        self.resync_task = Some(tokio::spawn(async move {
            if clock.resync().await.is_err() {
                debug!("keeping previous clock offset");
            }
        }));
    }

    fn publish(
        &mut self,
        updates: &mpsc::UnboundedSender<SessionSnapshot>,
        cause: UpdateCause,
        error: Option<String>,
    ) {
        let session = &mut self.session;
        let snapshot = SessionSnapshot {
            cause,
            subject: session.current_subject().to_string(),
            position: session.position(),
            question: session.current_view(),
            remaining_secs: session.remaining_secs(),
            progress: session.progress(),
            submitted: session.is_submitted(),
            locked: session.is_locked(),
            error,
            notices: session.drain_notices(),
        };
        if updates.send(snapshot).is_err() {
            debug!("no listener for session updates");
        }
    }
}
