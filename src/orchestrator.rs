//! Round orchestrator
//!
//! The [`Orchestrator`] is the session's single writer. It owns the presence
//! registry, the open round and the cumulative scores, and moves through
//! `Idle → AwaitingAnswers(i) → Scoring(i) → … → Finished`. It never sleeps
//! or spawns: like every state machine in this crate it is driven from the
//! outside by inbound messages and by alarms it asks its caller to schedule
//! through the `schedule_message` closure. Alarms carry the round index and
//! are ignored when they no longer match the current state, so a late timer
//! can never mutate a fresh round.

use std::time::Duration;

use enum_map::EnumMap;
use garde::Validate;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    answers::{Outcome, Round},
    bus::{Bus, TransportError},
    config::{Config, StartRequest},
    constants::wire,
    leaderboard::{Leaderboard, Standing},
    message::{
        AnswerMessage, FeedbackMessage, FinalResultMessage, Inbound, LeaderboardMessage, Outgoing,
        PresenceMessage, QuestionMessage, ScoreMessage,
    },
    player::Id,
    presence::{self, Presence},
    question::{self, IndexedQuestion, Question, QuestionPool},
};

/// Timed events of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMessage {
    /// The deadline of round `index` elapsed
    CloseRound {
        /// Round the deadline belongs to
        index: usize,
    },
    /// The pause after round `index` is over
    NextRound {
        /// Round that was just scored
        index: usize,
    },
}

/// Phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Players may join; the session has not started
    #[default]
    Idle,
    /// Round `i` is open and collecting answers
    AwaitingAnswers(usize),
    /// Round `i` is closed and has been scored
    Scoring(usize),
    /// The final result has been published
    Finished,
}

/// Reasons a start action is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// Nobody has announced their presence yet
    #[error("no player has joined the session")]
    NoPlayers,
    /// The start parameters are out of bounds
    #[error("invalid start parameters: {0}")]
    InvalidConfig(String),
    /// The session already left `Idle`
    #[error("session has already started")]
    AlreadyStarted,
}

/// Reasons an authored question is refused
#[derive(Error, Debug)]
pub enum AuthoringError {
    /// Questions can only be added before the session starts
    #[error("session has already started")]
    AlreadyStarted,
    /// The question itself is invalid or the pool is full
    #[error(transparent)]
    Question(#[from] question::Error),
}

/// Events surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// A new player was registered
    PlayerJoined {
        /// The player's id
        id: Id,
        /// The nickname they are displayed with
        nickname: String,
    },
    /// A player could not be registered
    PlayerRefused {
        /// The player's id
        id: Id,
        /// Why registration failed
        reason: presence::Error,
    },
    /// A round opened
    RoundOpened {
        /// Round index
        index: usize,
        /// Number of rounds in the session
        count: usize,
    },
    /// A round closed and was scored
    RoundClosed {
        /// Round index
        index: usize,
        /// Accepted answers by outcome
        stats: EnumMap<Outcome, usize>,
    },
    /// Standings were published
    Leaderboard(Vec<Standing>),
    /// The session is over
    Finished(Vec<Standing>),
    /// A publish failed; the session carries on
    TransportFailure(TransportError),
}

/// The session state machine
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    pool: QuestionPool,
    presence: Presence,
    leaderboard: Leaderboard,
    questions: Vec<IndexedQuestion>,
    round: Option<Round>,
    state: State,
    reports: Vec<Report>,
    rng: fastrand::Rng,
}

impl Orchestrator {
    /// Creates an idle session drawing from `pool`
    ///
    /// A grace shorter than the player's expiry tick is raised to it when a
    /// round's deadline is set.
    pub fn new(config: Config, pool: QuestionPool) -> Self {
        if let Err(report) = config.validate() {
            tracing::warn!(error = %report, "configuration out of bounds");
        }

        Self {
            presence: Presence::with_capacity(config.max_players),
            config,
            pool,
            leaderboard: Leaderboard::default(),
            questions: Vec::new(),
            round: None,
            state: State::Idle,
            reports: Vec::new(),
            rng: fastrand::Rng::new(),
        }
    }

    /// Replaces the random generator used to draw questions
    #[must_use]
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    /// Returns the current phase
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the session configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the presence registry
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Returns the cumulative scores
    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Returns the round currently open or last scored
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Returns the questions drawn for this session
    pub fn questions(&self) -> &[IndexedQuestion] {
        &self.questions
    }

    /// Drains the reports produced since the last call
    pub fn take_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.reports)
    }

    fn change_state(&mut self, before: State, after: State) -> bool {
        if self.state == before {
            self.state = after;

            true
        } else {
            false
        }
    }

    /// Appends an operator-authored question to the pool
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::AlreadyStarted`] once the session left
    /// `Idle`, or the pool's error if the question is invalid.
    pub fn add_question(&mut self, question: Question) -> Result<(), AuthoringError> {
        if self.state != State::Idle {
            return Err(AuthoringError::AlreadyStarted);
        }
        self.pool.push(question)?;
        Ok(())
    }

    /// Starts the session and opens the first round
    ///
    /// # Arguments
    ///
    /// * `request` - number of questions and per-question time budget
    /// * `schedule_message` - function to schedule the round deadline
    /// * `bus` - transport to publish the first question on
    ///
    /// # Errors
    ///
    /// * [`StartError::AlreadyStarted`] - the session is not `Idle`
    /// * [`StartError::NoPlayers`] - no player is registered
    /// * [`StartError::InvalidConfig`] - the time budget is out of bounds or
    ///   the pool holds fewer questions than requested
    ///
    /// The session stays `Idle` on every error.
    pub fn start<B: Bus, S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        request: StartRequest,
        schedule_message: S,
        bus: &B,
    ) -> Result<(), StartError> {
        if self.state != State::Idle {
            return Err(StartError::AlreadyStarted);
        }
        if self.presence.is_empty() {
            return Err(StartError::NoPlayers);
        }
        request
            .validate()
            .map_err(|report| StartError::InvalidConfig(report.to_string()))?;

        let questions = self
            .pool
            .draw(request.question_count, request.time_limit, &mut self.rng)
            .ok_or_else(|| {
                StartError::InvalidConfig(format!(
                    "{} questions requested but the pool holds {}",
                    request.question_count,
                    self.pool.len()
                ))
            })?;

        tracing::info!(
            rounds = questions.len(),
            players = self.presence.count(),
            time_limit = request.time_limit.as_secs(),
            "session started"
        );

        self.questions = questions;
        self.open_round(0, schedule_message, bus);

        Ok(())
    }

    /// Handles a decoded inbound message
    ///
    /// Messages that cannot be applied (unknown player, closed or stale
    /// round, duplicate answer) are logged and dropped.
    pub fn receive_message<B: Bus>(&mut self, message: Inbound, bus: &B) {
        match message {
            Inbound::Presence(presence) => self.receive_presence(presence, bus),
            Inbound::Answer(answer) => self.receive_answer(answer),
        }
    }

    /// Handles a scheduled alarm
    ///
    /// Alarms that do not match the current state are ignored.
    pub fn receive_alarm<B: Bus, S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        message: AlarmMessage,
        mut schedule_message: S,
        bus: &B,
    ) {
        match message {
            AlarmMessage::CloseRound { index } => {
                if self.change_state(State::AwaitingAnswers(index), State::Scoring(index)) {
                    self.score_round(bus);

                    if self.config.feedback_pause.is_zero() {
                        self.advance(index, schedule_message, bus);
                    } else {
                        schedule_message(
                            AlarmMessage::NextRound { index },
                            self.config.feedback_pause,
                        );
                    }
                } else {
                    tracing::debug!(round = index, state = ?self.state, "stale close alarm ignored");
                }
            }
            AlarmMessage::NextRound { index } => {
                if self.state == State::Scoring(index) {
                    self.advance(index, &mut schedule_message, bus);
                } else {
                    tracing::debug!(round = index, state = ?self.state, "stale next alarm ignored");
                }
            }
        }
    }

    fn receive_presence<B: Bus>(&mut self, message: PresenceMessage, bus: &B) {
        if self.state == State::Finished {
            tracing::debug!(player = %message.id, "presence after the session finished ignored");
            return;
        }

        match self.presence.register(message.id.clone(), &message.nickname) {
            Ok(true) => {
                let nickname = self
                    .presence
                    .nickname_of(&message.id)
                    .unwrap_or_default()
                    .to_owned();
                tracing::info!(player = %message.id, %nickname, "player joined");
                self.reports.push(Report::PlayerJoined {
                    id: message.id,
                    nickname,
                });
                self.publish_leaderboard(bus);
            }
            Ok(false) => {
                tracing::debug!(player = %message.id, "repeated presence ignored");
            }
            Err(reason) => {
                tracing::warn!(player = %message.id, error = %reason, "player refused");
                self.reports.push(Report::PlayerRefused {
                    id: message.id,
                    reason,
                });
            }
        }
    }

    fn receive_answer(&mut self, message: AnswerMessage) {
        let Some(round) = self.round.as_mut() else {
            tracing::debug!(player = %message.client_id, "answer before the first round dropped");
            return;
        };

        match round.submit(
            message.question_id,
            &message.client_id,
            message.answer_index,
            &self.presence,
        ) {
            Ok(()) => {
                tracing::debug!(
                    round = message.question_id,
                    player = %message.client_id,
                    "answer accepted"
                );
            }
            Err(rejection) => {
                tracing::debug!(player = %message.client_id, %rejection, "answer dropped");
            }
        }
    }

    fn open_round<B: Bus, S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        index: usize,
        mut schedule_message: S,
        bus: &B,
    ) {
        let Some(question) = self.questions.get(index).cloned() else {
            self.finish(bus);
            return;
        };

        self.state = State::AwaitingAnswers(index);
        let deadline = question.time_limit + self.grace();
        let announcement = QuestionMessage::from(&question);
        self.round = Some(Round::open(question));

        tracing::info!(round = index, "round opened");
        self.reports.push(Report::RoundOpened {
            index,
            count: self.questions.len(),
        });

        self.publish(bus, &Outgoing::Question(announcement));
        schedule_message(AlarmMessage::CloseRound { index }, deadline);
    }

    fn grace(&self) -> Duration {
        self.config
            .grace
            .max(Duration::from_secs(wire::MIN_GRACE_SECONDS))
    }

    fn score_round<B: Bus>(&mut self, bus: &B) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        round.close();

        let correct_answer_index = round.question().question.correct;
        let judged = round
            .judged()
            .map(|(id, choice, outcome)| (id.clone(), choice, outcome))
            .collect_vec();
        let stats = round.stats();
        let index = round.index();

        let points = judged
            .iter()
            .map(|(id, _, outcome)| (id.clone(), u64::from(*outcome == Outcome::Correct)))
            .collect_vec();
        self.leaderboard.add_scores(&points);

        for (id, choice, outcome) in judged {
            self.publish(
                bus,
                &Outgoing::Feedback {
                    to: id,
                    feedback: FeedbackMessage {
                        question_id: Some(index),
                        correct: outcome == Outcome::Correct,
                        answer_index: choice,
                        correct_answer_index,
                    },
                },
            );
        }

        tracing::info!(
            round = index,
            correct = stats[Outcome::Correct],
            incorrect = stats[Outcome::Incorrect],
            timed_out = stats[Outcome::TimedOut],
            "round closed"
        );
        self.reports.push(Report::RoundClosed { index, stats });

        self.publish_leaderboard(bus);
    }

    fn advance<B: Bus, S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        index: usize,
        schedule_message: S,
        bus: &B,
    ) {
        if index + 1 < self.questions.len() {
            self.open_round(index + 1, schedule_message, bus);
        } else {
            self.finish(bus);
        }
    }

    fn finish<B: Bus>(&mut self, bus: &B) {
        self.state = State::Finished;
        self.round = None;

        let standings = self.leaderboard.standings(&self.presence);

        self.publish(
            bus,
            &Outgoing::FinalResult(FinalResultMessage {
                classement: standings.iter().map_into().collect_vec(),
            }),
        );

        let total = self.leaderboard.rounds_played();
        let total_players = self.presence.count();
        for standing in &standings {
            self.publish(
                bus,
                &Outgoing::Score {
                    to: standing.id.clone(),
                    score: ScoreMessage {
                        score: standing.score,
                        total,
                        rank: standing.rank,
                        total_players,
                        rounds: self.leaderboard.player_summary(&standing.id),
                    },
                },
            );
        }

        tracing::info!(players = total_players, rounds = total, "session finished");
        self.reports.push(Report::Finished(standings));
    }

    fn publish_leaderboard<B: Bus>(&mut self, bus: &B) {
        let standings = self.leaderboard.standings(&self.presence);
        self.publish(
            bus,
            &Outgoing::Leaderboard(LeaderboardMessage(
                standings.iter().map_into().collect_vec(),
            )),
        );
        self.reports.push(Report::Leaderboard(standings));
    }

    fn publish<B: Bus>(&mut self, bus: &B, message: &Outgoing) {
        if let Err(e) = bus.send(&self.config.topic_prefix, message) {
            tracing::error!(topic = %message.topic(), error = %e, "publish failed");
            self.reports.push(Report::TransportFailure(e));
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;

    use serde_json::{Value, json};

    use super::*;
    use crate::answers::Choice;

    #[derive(Default)]
    struct MockBus {
        published: RefCell<Vec<(String, Value)>>,
    }

    impl MockBus {
        fn on(&self, topic: &str) -> Vec<Value> {
            self.published
                .borrow()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, v)| v.clone())
                .collect()
        }

        fn topics(&self) -> Vec<String> {
            self.published
                .borrow()
                .iter()
                .map(|(t, _)| t.clone())
                .collect()
        }

        fn clear(&self) {
            self.published.borrow_mut().clear();
        }
    }

    impl Bus for MockBus {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
            self.published
                .borrow_mut()
                .push((topic.to_owned(), serde_json::from_str(payload).unwrap()));
            Ok(())
        }
    }

    struct FailingBus;

    impl Bus for FailingBus {
        fn publish(&self, _topic: &str, _payload: &str) -> Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    /// Every question's correct option is 1, so draw order does not matter
    fn pool() -> QuestionPool {
        QuestionPool::new(
            (0..4)
                .map(|i| Question::new(format!("Question {i}"), ["wrong", "right", "wrong"], 1))
                .collect(),
        )
        .unwrap()
    }

    fn orchestrator(feedback_pause: u64) -> Orchestrator {
        Orchestrator::new(
            Config {
                feedback_pause: Duration::from_secs(feedback_pause),
                ..Config::default()
            },
            pool(),
        )
        .with_rng(fastrand::Rng::with_seed(42))
    }

    fn join(orchestrator: &mut Orchestrator, bus: &impl Bus, player: &str, nickname: &str) {
        orchestrator.receive_message(
            Inbound::Presence(PresenceMessage {
                id: id(player),
                nickname: nickname.to_string(),
            }),
            bus,
        );
    }

    fn answer(orchestrator: &mut Orchestrator, bus: &impl Bus, round: usize, player: &str, choice: Choice) {
        orchestrator.receive_message(
            Inbound::Answer(AnswerMessage {
                question_id: round,
                answer_index: choice,
                client_id: id(player),
            }),
            bus,
        );
    }

    fn no_alarm(_: AlarmMessage, _: Duration) {
        panic!("no alarm expected");
    }

    #[test]
    fn test_start_without_players_stays_idle() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);

        assert_eq!(
            orchestrator.start(StartRequest::new(2, 10), no_alarm, &bus),
            Err(StartError::NoPlayers)
        );
        assert_eq!(orchestrator.state(), State::Idle);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_start_rejects_out_of_bounds_parameters() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");

        for request in [
            StartRequest::new(2, 4),
            StartRequest::new(2, 61),
            StartRequest::new(5, 10),
        ] {
            assert!(matches!(
                orchestrator.start(request, no_alarm, &bus),
                Err(StartError::InvalidConfig(_))
            ));
            assert_eq!(orchestrator.state(), State::Idle);
        }
    }

    #[test]
    fn test_start_opens_first_round() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");
        bus.clear();

        let mut alarms = Vec::new();
        orchestrator
            .start(StartRequest::new(2, 10), |a, d| alarms.push((a, d)), &bus)
            .unwrap();

        assert_eq!(orchestrator.state(), State::AwaitingAnswers(0));
        assert_eq!(
            alarms,
            vec![(AlarmMessage::CloseRound { index: 0 }, Duration::from_secs(12))]
        );

        let questions = bus.on("quiz/question");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0]["id"], 0);
        assert_eq!(questions[0]["timer"], 10);
        assert_eq!(questions[0]["options"].as_array().map(Vec::len), Some(3));

        assert_eq!(
            orchestrator.start(StartRequest::new(2, 10), no_alarm, &bus),
            Err(StartError::AlreadyStarted)
        );
    }

    #[test]
    fn test_new_player_triggers_leaderboard() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);

        join(&mut orchestrator, &bus, "a", "Ann");
        join(&mut orchestrator, &bus, "a", "Someone else");
        join(&mut orchestrator, &bus, "b", "");

        let boards = bus.on("quiz/leaderboard");
        assert_eq!(boards.len(), 2);
        assert_eq!(
            boards[1],
            json!([
                {"rank": 1, "pseudo": "Ann", "score": 0},
                {"rank": 1, "pseudo": "Player-b", "score": 0},
            ])
        );
        assert_eq!(orchestrator.presence().count(), 2);
    }

    #[test]
    fn test_full_session() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");
        join(&mut orchestrator, &bus, "b", "Bob");
        join(&mut orchestrator, &bus, "c", "Cid");
        join(&mut orchestrator, &bus, "lurker", "Lou");

        let mut alarms = Vec::new();
        orchestrator
            .start(StartRequest::new(2, 10), |a, d| alarms.push((a, d)), &bus)
            .unwrap();

        // round 0: A and B right, C wrong, duplicate retry from A
        answer(&mut orchestrator, &bus, 0, "a", Choice::Option(1));
        answer(&mut orchestrator, &bus, 0, "a", Choice::Option(1));
        answer(&mut orchestrator, &bus, 0, "b", Choice::Option(1));
        answer(&mut orchestrator, &bus, 0, "c", Choice::Option(0));
        assert_eq!(orchestrator.round().map(Round::answer_count), Some(3));

        bus.clear();
        orchestrator.receive_alarm(
            AlarmMessage::CloseRound { index: 0 },
            |a, d| alarms.push((a, d)),
            &bus,
        );
        assert_eq!(orchestrator.state(), State::Scoring(0));
        assert_eq!(
            alarms.last(),
            Some(&(AlarmMessage::NextRound { index: 0 }, Duration::from_secs(5)))
        );
        assert_eq!(
            bus.on("quiz/feedback/a"),
            vec![json!({"question_id": 0, "correct": true, "answer_index": 1, "correct_answer_index": 1})]
        );
        assert_eq!(
            bus.on("quiz/feedback/c"),
            vec![json!({"question_id": 0, "correct": false, "answer_index": 0, "correct_answer_index": 1})]
        );
        assert!(bus.on("quiz/feedback/lurker").is_empty());

        // late answer after the deadline
        answer(&mut orchestrator, &bus, 0, "lurker", Choice::Option(1));

        orchestrator.receive_alarm(
            AlarmMessage::NextRound { index: 0 },
            |a, d| alarms.push((a, d)),
            &bus,
        );
        assert_eq!(orchestrator.state(), State::AwaitingAnswers(1));

        // round 1: A and B right, C times out
        answer(&mut orchestrator, &bus, 1, "a", Choice::Option(1));
        answer(&mut orchestrator, &bus, 1, "b", Choice::Option(1));
        answer(&mut orchestrator, &bus, 1, "c", Choice::NoAnswer);

        bus.clear();
        orchestrator.receive_alarm(
            AlarmMessage::CloseRound { index: 1 },
            |a, d| alarms.push((a, d)),
            &bus,
        );
        assert_eq!(
            bus.on("quiz/feedback/c"),
            vec![json!({"question_id": 1, "correct": false, "answer_index": -1, "correct_answer_index": 1})]
        );

        orchestrator.receive_alarm(AlarmMessage::NextRound { index: 1 }, no_alarm, &bus);
        assert_eq!(orchestrator.state(), State::Finished);

        assert_eq!(
            bus.on("quiz/final-result"),
            vec![json!({"classement": [
                {"client_id": "a", "nickname": "Ann", "score": 2, "rank": 1},
                {"client_id": "b", "nickname": "Bob", "score": 2, "rank": 1},
                {"client_id": "c", "nickname": "Cid", "score": 0, "rank": 3},
                {"client_id": "lurker", "nickname": "Lou", "score": 0, "rank": 3},
            ]})]
        );
        assert_eq!(
            bus.on("quiz/score/lurker"),
            vec![json!({"score": 0, "total": 2, "rank": 3, "total_players": 4, "rounds": [0, 0]})]
        );
        assert_eq!(
            bus.on("quiz/score/a"),
            vec![json!({"score": 2, "total": 2, "rank": 1, "total_players": 4, "rounds": [1, 1]})]
        );
    }

    #[test]
    fn test_stale_alarms_are_ignored() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");
        orchestrator
            .start(StartRequest::new(2, 10), |_, _| {}, &bus)
            .unwrap();

        orchestrator.receive_alarm(AlarmMessage::CloseRound { index: 1 }, no_alarm, &bus);
        orchestrator.receive_alarm(AlarmMessage::NextRound { index: 0 }, no_alarm, &bus);
        assert_eq!(orchestrator.state(), State::AwaitingAnswers(0));

        orchestrator.receive_alarm(AlarmMessage::CloseRound { index: 0 }, |_, _| {}, &bus);
        orchestrator.receive_alarm(AlarmMessage::CloseRound { index: 0 }, no_alarm, &bus);
        assert_eq!(orchestrator.state(), State::Scoring(0));
        assert_eq!(orchestrator.leaderboard().rounds_played(), 1);
    }

    #[test]
    fn test_zero_pause_opens_next_round_immediately() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(0);
        join(&mut orchestrator, &bus, "a", "Ann");

        let mut alarms = Vec::new();
        orchestrator
            .start(StartRequest::new(2, 5), |a, d| alarms.push((a, d)), &bus)
            .unwrap();
        orchestrator.receive_alarm(
            AlarmMessage::CloseRound { index: 0 },
            |a, d| alarms.push((a, d)),
            &bus,
        );

        assert_eq!(orchestrator.state(), State::AwaitingAnswers(1));
        assert_eq!(
            alarms,
            vec![
                (AlarmMessage::CloseRound { index: 0 }, Duration::from_secs(7)),
                (AlarmMessage::CloseRound { index: 1 }, Duration::from_secs(7)),
            ]
        );
    }

    #[test]
    fn test_short_grace_still_waits_for_expiry_tick() {
        let bus = MockBus::default();
        let mut orchestrator = Orchestrator::new(
            Config {
                grace: Duration::ZERO,
                ..Config::default()
            },
            pool(),
        );
        join(&mut orchestrator, &bus, "a", "Ann");

        let mut alarms = Vec::new();
        orchestrator
            .start(StartRequest::new(1, 5), |a, d| alarms.push((a, d)), &bus)
            .unwrap();

        assert_eq!(
            alarms,
            vec![(
                AlarmMessage::CloseRound { index: 0 },
                Duration::from_secs(5 + wire::MIN_GRACE_SECONDS)
            )]
        );
    }

    #[test]
    fn test_unknown_player_answer_is_dropped() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");
        orchestrator
            .start(StartRequest::new(1, 10), |_, _| {}, &bus)
            .unwrap();

        answer(&mut orchestrator, &bus, 0, "ghost", Choice::Option(1));
        answer(&mut orchestrator, &bus, 3, "a", Choice::Option(1));

        assert_eq!(orchestrator.round().map(Round::answer_count), Some(0));
        assert_eq!(orchestrator.state(), State::AwaitingAnswers(0));
    }

    #[test]
    fn test_transport_failure_does_not_stop_progression() {
        let mut orchestrator = orchestrator(0);
        join(&mut orchestrator, &FailingBus, "a", "Ann");
        orchestrator.take_reports();

        orchestrator
            .start(StartRequest::new(1, 10), |_, _| {}, &FailingBus)
            .unwrap();
        assert_eq!(orchestrator.state(), State::AwaitingAnswers(0));
        assert!(
            orchestrator
                .take_reports()
                .contains(&Report::TransportFailure(TransportError::Disconnected))
        );

        orchestrator.receive_alarm(AlarmMessage::CloseRound { index: 0 }, no_alarm, &FailingBus);
        assert_eq!(orchestrator.state(), State::Finished);
    }

    #[test]
    fn test_reports_track_round_stats() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);
        join(&mut orchestrator, &bus, "a", "Ann");
        join(&mut orchestrator, &bus, "b", "Bob");
        orchestrator
            .start(StartRequest::new(1, 10), |_, _| {}, &bus)
            .unwrap();
        answer(&mut orchestrator, &bus, 0, "a", Choice::Option(1));
        answer(&mut orchestrator, &bus, 0, "b", Choice::NoAnswer);
        orchestrator.take_reports();

        orchestrator.receive_alarm(AlarmMessage::CloseRound { index: 0 }, |_, _| {}, &bus);

        let stats = orchestrator
            .take_reports()
            .into_iter()
            .find_map(|report| match report {
                Report::RoundClosed { index: 0, stats } => Some(stats),
                _ => None,
            })
            .unwrap();
        assert_eq!(stats[Outcome::Correct], 1);
        assert_eq!(stats[Outcome::TimedOut], 1);
        assert_eq!(stats[Outcome::Incorrect], 0);
    }

    #[test]
    fn test_questions_can_only_be_added_before_start() {
        let bus = MockBus::default();
        let mut orchestrator = orchestrator(5);

        orchestrator
            .add_question(Question::new("Extra", ["x", "y"], 0))
            .unwrap();
        assert!(matches!(
            orchestrator.add_question(Question::new("Broken", ["x"], 0)),
            Err(AuthoringError::Question(_))
        ));

        join(&mut orchestrator, &bus, "a", "Ann");
        orchestrator
            .start(StartRequest::new(5, 10), |_, _| {}, &bus)
            .unwrap();

        assert!(matches!(
            orchestrator.add_question(Question::new("Late", ["x", "y"], 0)),
            Err(AuthoringError::AlreadyStarted)
        ));
    }
}
