//! Two-speaker dialogue experiments.
//!
//! A [`DialogueExperiment`] alternates a left and a right [`Speaker`] for a
//! fixed number of turns. Each speaker answers the other's last message, and
//! every answer is recorded in an [`ExperimentLog`]. A failed model call never
//! stops the run: the speaker degrades to a canned line and the record is
//! marked, so a finished log always holds exactly two records per turn.

mod agent;
mod fallback;
mod log;

pub use agent::{AgentProfile, DialogueAgent, ReplyLimits, Speaker, Utterance};
pub use fallback::FallbackPicker;
pub use log::{AgentsInfo, ExperimentLog, LogError, LogSummary, TurnRecord};

use crate::prompt::default_opening;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Where an experiment is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Turn { n: usize, side: Side },
    Done,
}

pub struct DialogueExperiment {
    topic: String,
    left: Box<dyn Speaker>,
    right: Box<dyn Speaker>,
    n_turns: usize,
    turn_delay: Duration,
    initial_prompt: Option<String>,
    phase: Phase,
    current: String,
    log: ExperimentLog,
}

impl DialogueExperiment {
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        left: Box<dyn Speaker>,
        right: Box<dyn Speaker>,
        n_turns: usize,
    ) -> Self {
        let topic = topic.into();
        let agents = AgentsInfo {
            agent_l: left.profile(),
            agent_r: right.profile(),
        };
        Self {
            log: ExperimentLog::new(name, topic.clone(), agents),
            topic,
            left,
            right,
            n_turns,
            turn_delay: Duration::ZERO,
            initial_prompt: None,
            phase: Phase::Idle,
            current: String::new(),
        }
    }

    /// Pause between speakers. Only affects pacing.
    pub fn with_turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = delay;
        self
    }

    /// First message given to the left speaker; defaults to a question about
    /// the topic.
    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn n_turns(&self) -> usize {
        self.n_turns
    }

    pub fn log(&self) -> &ExperimentLog {
        &self.log
    }

    fn start(&mut self) {
        self.current = self
            .initial_prompt
            .clone()
            .unwrap_or_else(|| default_opening(&self.topic));
        self.log.start_time = Utc::now();
        self.phase = if self.n_turns == 0 {
            Phase::Done
        } else {
            Phase::Turn {
                n: 1,
                side: Side::Left,
            }
        };
        info!(
            experiment = %self.log.experiment_name,
            topic = %self.topic,
            n_turns = self.n_turns,
            "Starting dialogue"
        );
    }

    /// Runs one speaker and returns its record, or `None` once done.
    pub async fn step(&mut self) -> Option<&TurnRecord> {
        if self.phase == Phase::Idle {
            self.start();
        }
        let Phase::Turn { n, side } = self.phase else {
            return None;
        };

        let speaker = match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        };
        let profile = speaker.profile();
        let utterance = speaker.respond(&self.topic, &self.current).await;

        if let Some(error) = &utterance.error {
            warn!(turn = n, speaker = %profile.name, error = %error, "Turn degraded");
        } else {
            info!(turn = n, speaker = %profile.name, "Turn complete");
        }

        self.current = utterance.text.clone();
        self.log.dialogue.push(TurnRecord {
            turn: n,
            speaker: profile.name,
            stance: profile.stance,
            model_type: profile.model_type,
            message: utterance.text,
            timestamp: Utc::now(),
            degraded: utterance.degraded,
            error: utterance.error,
        });

        self.phase = match side {
            Side::Left => Phase::Turn {
                n,
                side: Side::Right,
            },
            Side::Right if n < self.n_turns => Phase::Turn {
                n: n + 1,
                side: Side::Left,
            },
            Side::Right => Phase::Done,
        };

        if self.phase != Phase::Done && !self.turn_delay.is_zero() {
            tokio::time::sleep(self.turn_delay).await;
        }
        self.log.dialogue.last()
    }

    /// Runs every remaining turn and returns the finished log.
    pub async fn run(mut self) -> ExperimentLog {
        while self.step().await.is_some() {}
        self.finish()
    }

    /// Stamps the end time and hands back the log, whatever the phase.
    pub fn finish(mut self) -> ExperimentLog {
        self.log.end_time = Some(Utc::now());
        info!(
            experiment = %self.log.experiment_name,
            records = self.log.dialogue.len(),
            degraded = self.log.degraded_count(),
            "Dialogue finished"
        );
        self.log
    }
}
