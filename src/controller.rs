//! Player round controller
//!
//! Each player runs a [`RoundController`] that mirrors the orchestrator's
//! rounds: it counts down the question's time budget once per second,
//! publishes at most one answer per question, and answers with the
//! "no answer" sentinel on the player's behalf when the countdown runs out.
//!
//! Ticks are scheduled by the caller through `schedule_message` and carry a
//! generation number. Every new question and every answer bumps the
//! generation, which cancels whatever tick is still in flight.

use std::time::Duration;

use crate::{
    answers::Choice,
    bus::Bus,
    constants::wire::TICK_SECONDS,
    message::{AnswerMessage, FeedbackMessage, Outgoing, QuestionMessage},
    player::Id,
};

/// A countdown tick for the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Round index of the question being counted down
    pub question: usize,
    /// Generation the tick was scheduled in
    pub generation: u64,
}

/// Phase of the player's current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a question
    #[default]
    Idle,
    /// Counting down, with this many seconds left
    Counting(u64),
    /// The player answered
    Answered,
    /// The countdown ran out and the sentinel was sent
    Expired,
}

/// Per-player state machine for a round
#[derive(Debug, Clone)]
pub struct RoundController {
    id: Id,
    prefix: String,
    phase: Phase,
    question: Option<QuestionMessage>,
    generation: u64,
}

impl RoundController {
    /// Creates an idle controller for player `id` publishing under `prefix`
    pub fn new(id: Id, prefix: impl Into<String>) -> Self {
        Self {
            id,
            prefix: prefix.into(),
            phase: Phase::Idle,
            question: None,
            generation: 0,
        }
    }

    /// Returns the player's id
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the question currently or last shown
    pub fn question(&self) -> Option<&QuestionMessage> {
        self.question.as_ref()
    }

    /// Starts counting down a newly received question
    ///
    /// Whatever the previous question left behind is discarded, including
    /// its pending tick.
    pub fn receive_question<S: FnMut(Tick, Duration)>(
        &mut self,
        question: QuestionMessage,
        mut schedule_message: S,
    ) {
        self.generation += 1;
        self.phase = Phase::Counting(question.timer);

        schedule_message(
            Tick {
                question: question.id,
                generation: self.generation,
            },
            Duration::from_secs(TICK_SECONDS),
        );
        self.question = Some(question);
    }

    /// Applies a countdown tick
    ///
    /// # Returns
    ///
    /// The new phase, or `None` if the tick was stale and ignored
    pub fn tick<B: Bus, S: FnMut(Tick, Duration)>(
        &mut self,
        tick: Tick,
        mut schedule_message: S,
        bus: &B,
    ) -> Option<Phase> {
        if tick.generation != self.generation || self.question_id() != Some(tick.question) {
            return None;
        }

        match self.phase {
            Phase::Counting(0) => {
                self.phase = Phase::Expired;
                self.generation += 1;
                self.publish_choice(Choice::NoAnswer, bus);
                Some(self.phase)
            }
            Phase::Counting(left) => {
                self.phase = Phase::Counting(left - 1);
                schedule_message(tick, Duration::from_secs(TICK_SECONDS));
                Some(self.phase)
            }
            Phase::Idle | Phase::Answered | Phase::Expired => None,
        }
    }

    /// Submits the player's pick for the current question
    ///
    /// # Returns
    ///
    /// `true` if the answer was published; selections outside a countdown
    /// or out of the question's option range are ignored
    pub fn select<B: Bus>(&mut self, option: usize, bus: &B) -> bool {
        let Phase::Counting(_) = self.phase else {
            return false;
        };
        if self
            .question
            .as_ref()
            .is_none_or(|question| option >= question.options.len())
        {
            tracing::debug!(player = %self.id, option, "selection out of range ignored");
            return false;
        }

        self.phase = Phase::Answered;
        self.generation += 1;
        self.publish_choice(Choice::Option(option), bus);
        true
    }

    /// Handles the verdict on this player's answer
    ///
    /// # Returns
    ///
    /// `true` if the controller went back to `Idle`; feedback that arrives
    /// while still counting down, or that belongs to an earlier question, is
    /// ignored
    pub fn receive_feedback(&mut self, feedback: &FeedbackMessage) -> bool {
        if let Some(question_id) = feedback.question_id
            && self.question_id() != Some(question_id)
        {
            tracing::debug!(player = %self.id, round = question_id, "late feedback ignored");
            return false;
        }

        match self.phase {
            Phase::Answered | Phase::Expired => {
                tracing::debug!(player = %self.id, correct = feedback.correct, "feedback received");
                self.phase = Phase::Idle;
                true
            }
            Phase::Idle | Phase::Counting(_) => false,
        }
    }

    /// Cancels any pending tick
    pub fn stop(&mut self) {
        self.generation += 1;
    }

    fn question_id(&self) -> Option<usize> {
        self.question.as_ref().map(|question| question.id)
    }

    fn publish_choice<B: Bus>(&self, choice: Choice, bus: &B) {
        let Some(question) = &self.question else {
            return;
        };

        let message = Outgoing::Answer(AnswerMessage {
            question_id: question.id,
            answer_index: choice,
            client_id: self.id.clone(),
        });
        if let Err(e) = bus.send(&self.prefix, &message) {
            tracing::error!(player = %self.id, error = %e, "failed to publish answer");
        }
    }
}
