//! Core types shared by the classifier, driver and orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the driver should do next after a classified bot turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Action {
    /// Send this (already materialized) text back to the bot
    Reply(String),
    /// The flow finished successfully
    EndOk,
    /// The flow finished with an error
    EndErr,
    /// The entity already exists; retry once with a mutated variable
    RetryExists,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Reply(text) => write!(f, "reply {:?}", text),
            Action::EndOk => write!(f, "end-ok"),
            Action::EndErr => write!(f, "end-err"),
            Action::RetryExists => write!(f, "retry-exists"),
        }
    }
}

/// Terminal cause of one scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeReason {
    CompletedOk,
    EndedError,
    NoResponseTimeout,
    TotalTimeout,
    InfiniteLoopDetected,
    /// Too many consecutive turns matched no rule (only when bounded)
    IdleTurnLimit,
    Exception,
}

impl OutcomeReason {
    /// Stable machine-readable tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeReason::CompletedOk => "completed-ok",
            OutcomeReason::EndedError => "ended-error",
            OutcomeReason::NoResponseTimeout => "no-response-timeout",
            OutcomeReason::TotalTimeout => "total-timeout",
            OutcomeReason::InfiniteLoopDetected => "infinite-loop-detected",
            OutcomeReason::IdleTurnLimit => "idle-turn-limit",
            OutcomeReason::Exception => "exception",
        }
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of one scenario execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub reason: OutcomeReason,
}

impl RunOutcome {
    pub fn completed() -> Self {
        Self {
            success: true,
            reason: OutcomeReason::CompletedOk,
        }
    }

    pub fn failed(reason: OutcomeReason) -> Self {
        Self {
            success: false,
            reason,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "fail" };
        write!(f, "{} ({})", status, self.reason)
    }
}
