//! Tokio runtime for the state machines
//!
//! The orchestrator and every player run as a single task each. A task owns
//! its state machine outright and selects over its inputs (operator or local
//! commands, fired alarms, bus envelopes), so all mutation of a session goes
//! through one serialized path and no lock is needed. An answer racing the
//! round deadline is therefore either handled before the close alarm or
//! after it, never halfway.

use std::time::Duration;

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    bus::{Bus, Envelope, Inbox},
    config::StartRequest,
    controller::{Phase, RoundController},
    message::{
        FeedbackMessage, FinalResultMessage, Inbound, LeaderboardMessage, Outgoing, PlayerInbound,
        PresenceMessage, QuestionMessage, ScoreMessage, Topic,
    },
    orchestrator::{AuthoringError, Orchestrator, Report, StartError, State},
    player::Id,
    question::Question,
};

/// Errors returned by an [`OrchestratorHandle`]
#[derive(Error, Debug)]
pub enum Error {
    /// The orchestrator task is no longer running
    #[error("session task has stopped")]
    Stopped,
    /// The session refused to start
    #[error(transparent)]
    Start(#[from] StartError),
    /// The session refused the question
    #[error(transparent)]
    Authoring(#[from] AuthoringError),
}

/// Delivers one alarm at a time after a delay
///
/// Scheduling a new alarm cancels the one still pending, so a state machine
/// that re-enters a state never sees the previous state's timer fire.
#[derive(Debug)]
pub struct AlarmScheduler<T> {
    sender: mpsc::UnboundedSender<T>,
    pending: Option<CancellationToken>,
}

impl<T: Send + 'static> AlarmScheduler<T> {
    /// Creates a scheduler delivering fired alarms on `sender`
    pub fn new(sender: mpsc::UnboundedSender<T>) -> Self {
        Self {
            sender,
            pending: None,
        }
    }

    /// Schedules `alarm` after `delay`, cancelling the pending alarm
    pub fn schedule(&mut self, alarm: T, delay: Duration) {
        self.cancel();

        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        let sender = self.sender.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = sender.send(alarm);
                }
            }
        });
    }

    /// Cancels the pending alarm, if any
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl<T> Drop for AlarmScheduler<T> {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// Full topic names the orchestrator listens on
pub fn orchestrator_topics(prefix: &str) -> Vec<String> {
    vec![Topic::Presence.path(prefix), Topic::Answer.path(prefix)]
}

/// Full topic names a player listens on
pub fn player_topics(prefix: &str, id: &Id) -> Vec<String> {
    vec![
        Topic::Question.path(prefix),
        Topic::Feedback(id.clone()).path(prefix),
        Topic::Leaderboard.path(prefix),
        Topic::FinalResult.path(prefix),
        Topic::Score(id.clone()).path(prefix),
    ]
}

fn parse_topic(prefix: &str, envelope: &Envelope) -> Option<Topic> {
    let topic = Topic::parse(prefix, &envelope.topic);
    if topic.is_none() {
        tracing::warn!(topic = %envelope.topic, "message on unknown topic dropped");
    }
    topic
}

#[derive(Debug)]
enum Command {
    Start {
        request: StartRequest,
        reply: oneshot::Sender<Result<(), StartError>>,
    },
    AddQuestion {
        question: Question,
        reply: oneshot::Sender<Result<(), AuthoringError>>,
    },
    Stop,
}

/// Operator-side handle on a running orchestrator task
#[derive(Debug)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    reports: mpsc::UnboundedReceiver<Report>,
    task: JoinHandle<Orchestrator>,
}

impl OrchestratorHandle {
    /// Asks the session to start
    ///
    /// # Errors
    ///
    /// Returns [`Error::Start`] if the session refused and [`Error::Stopped`]
    /// if the task is gone.
    pub async fn start(&self, request: StartRequest) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { request, reply })
            .map_err(|_| Error::Stopped)?;
        Ok(response.await.map_err(|_| Error::Stopped)??)
    }

    /// Appends an authored question before the session starts
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authoring`] if the question was refused and
    /// [`Error::Stopped`] if the task is gone.
    pub async fn add_question(&self, question: Question) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::AddQuestion { question, reply })
            .map_err(|_| Error::Stopped)?;
        Ok(response.await.map_err(|_| Error::Stopped)??)
    }

    /// Waits for the next operator report
    ///
    /// # Returns
    ///
    /// `None` once the task has ended and every report was read
    pub async fn next_report(&mut self) -> Option<Report> {
        self.reports.recv().await
    }

    /// Stops the task (if still running) and returns the final session state
    pub async fn stop(self) -> Option<Orchestrator> {
        let _ = self.commands.send(Command::Stop);
        match self.task.await {
            Ok(orchestrator) => Some(orchestrator),
            Err(e) => {
                tracing::error!(error = %e, "orchestrator task failed");
                None
            }
        }
    }
}

/// Spawns the orchestrator task
///
/// The task ends after the final result is published, when the handle asks
/// it to stop, or when `inbox` closes. `inbox` should receive
/// [`orchestrator_topics`].
pub fn spawn_orchestrator<B, I>(orchestrator: Orchestrator, bus: B, inbox: I) -> OrchestratorHandle
where
    B: Bus + Send + Sync + 'static,
    I: Inbox + Send + 'static,
{
    let (commands, command_receiver) = mpsc::unbounded_channel();
    let (report_sender, reports) = mpsc::unbounded_channel();

    let task = tokio::spawn(run_orchestrator(
        orchestrator,
        bus,
        inbox,
        command_receiver,
        report_sender,
    ));

    OrchestratorHandle {
        commands,
        reports,
        task,
    }
}

async fn run_orchestrator<B: Bus, I: Inbox>(
    mut orchestrator: Orchestrator,
    bus: B,
    mut inbox: I,
    mut commands: mpsc::UnboundedReceiver<Command>,
    reports: mpsc::UnboundedSender<Report>,
) -> Orchestrator {
    let (alarm_sender, mut alarms) = mpsc::unbounded_channel();
    let mut scheduler = AlarmScheduler::new(alarm_sender);
    let prefix = orchestrator.config().topic_prefix.clone();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start { request, reply }) => {
                    let result = orchestrator.start(
                        request,
                        |alarm, delay| scheduler.schedule(alarm, delay),
                        &bus,
                    );
                    if let Err(e) = &result {
                        tracing::warn!(error = %e, "start refused");
                    }
                    let _ = reply.send(result);
                }
                Some(Command::AddQuestion { question, reply }) => {
                    let _ = reply.send(orchestrator.add_question(question));
                }
                Some(Command::Stop) | None => {
                    tracing::info!("orchestrator stopped");
                    break;
                }
            },
            Some(alarm) = alarms.recv() => {
                orchestrator.receive_alarm(
                    alarm,
                    |alarm, delay| scheduler.schedule(alarm, delay),
                    &bus,
                );
            }
            envelope = inbox.recv() => {
                let Some(envelope) = envelope else {
                    tracing::warn!("bus closed, orchestrator stopped");
                    break;
                };
                let Some(topic) = parse_topic(&prefix, &envelope) else {
                    continue;
                };
                match Inbound::decode(&topic, &envelope.payload) {
                    Ok(message) => orchestrator.receive_message(message, &bus),
                    Err(e) => tracing::warn!(error = %e, "inbound message dropped"),
                }
            }
        }

        for report in orchestrator.take_reports() {
            let _ = reports.send(report);
        }

        if orchestrator.state() == State::Finished {
            break;
        }
    }

    scheduler.cancel();
    orchestrator
}

/// Presentation of a player's session
pub trait Screen {
    /// A new question opened
    fn show_question(&mut self, question: &QuestionMessage);

    /// The countdown moved on
    fn show_countdown(&mut self, _seconds_left: u64) {}

    /// The countdown ran out before the player picked an option
    fn show_expired(&mut self);

    /// The verdict on the player's answer arrived
    fn show_feedback(&mut self, feedback: &FeedbackMessage);

    /// Live standings arrived
    fn show_leaderboard(&mut self, _leaderboard: &LeaderboardMessage) {}

    /// Final standings arrived
    fn show_final_result(&mut self, result: &FinalResultMessage);

    /// The player's own final score arrived
    fn show_score(&mut self, score: &ScoreMessage);
}

/// Local input of a player task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Pick an option of the current question
    Select(usize),
    /// Leave the session
    Stop,
}

/// Identity a player announces on joining
#[derive(Debug, Clone)]
pub struct PlayerSetup {
    /// Topic prefix of the session
    pub prefix: String,
    /// The player's id
    pub id: Id,
    /// The nickname to announce
    pub nickname: String,
}

/// Spawns a player task
///
/// The task announces the player's presence, then mirrors the session's
/// rounds until its personal score arrives, `commands` asks it to stop, or
/// `inbox` closes. It hands the screen back when it ends. `inbox` should
/// receive [`player_topics`].
pub fn spawn_player<B, I, S>(
    setup: PlayerSetup,
    bus: B,
    inbox: I,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    screen: S,
) -> JoinHandle<S>
where
    B: Bus + Send + Sync + 'static,
    I: Inbox + Send + 'static,
    S: Screen + Send + 'static,
{
    tokio::spawn(run_player(setup, bus, inbox, commands, screen))
}

async fn run_player<B: Bus, I: Inbox, S: Screen>(
    setup: PlayerSetup,
    bus: B,
    mut inbox: I,
    mut commands: mpsc::UnboundedReceiver<PlayerCommand>,
    mut screen: S,
) -> S {
    let PlayerSetup {
        prefix,
        id,
        nickname,
    } = setup;

    let (tick_sender, mut ticks) = mpsc::unbounded_channel();
    let mut scheduler = AlarmScheduler::new(tick_sender);
    let mut controller = RoundController::new(id.clone(), prefix.clone());

    if let Err(e) = bus.send(
        &prefix,
        &Outgoing::Presence(PresenceMessage {
            id: id.clone(),
            nickname,
        }),
    ) {
        tracing::error!(player = %id, error = %e, "failed to announce presence");
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(PlayerCommand::Select(option)) => {
                    if controller.select(option, &bus) {
                        scheduler.cancel();
                    }
                }
                Some(PlayerCommand::Stop) | None => break,
            },
            Some(tick) = ticks.recv() => {
                match controller.tick(tick, |tick, delay| scheduler.schedule(tick, delay), &bus) {
                    Some(Phase::Counting(left)) => screen.show_countdown(left),
                    Some(Phase::Expired) => screen.show_expired(),
                    _ => {}
                }
            }
            envelope = inbox.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                let Some(topic) = parse_topic(&prefix, &envelope) else {
                    continue;
                };
                match PlayerInbound::decode(&topic, &envelope.payload) {
                    Ok(PlayerInbound::Question(question)) => {
                        screen.show_question(&question);
                        controller.receive_question(question, |tick, delay| {
                            scheduler.schedule(tick, delay);
                        });
                    }
                    Ok(PlayerInbound::Feedback(feedback)) => {
                        if controller.receive_feedback(&feedback) {
                            screen.show_feedback(&feedback);
                        }
                    }
                    Ok(PlayerInbound::Leaderboard(leaderboard)) => {
                        screen.show_leaderboard(&leaderboard);
                    }
                    Ok(PlayerInbound::FinalResult(result)) => screen.show_final_result(&result),
                    Ok(PlayerInbound::Score(score)) => {
                        screen.show_score(&score);
                        break;
                    }
                    Err(e) => tracing::warn!(player = %id, error = %e, "inbound message dropped"),
                }
            }
        }
    }

    controller.stop();
    scheduler.cancel();
    screen
}
