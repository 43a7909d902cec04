use super::errors::{StateMachineError, StateMachineResult};
use super::events::JobEvent;
use super::states::JobState;
use crate::models::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransition {
    pub from: JobState,
    pub to: JobState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// Tracks one delivery of a job from lease to outcome
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    job_id: JobId,
    state: JobState,
    history: Vec<JobTransition>,
}

impl JobStateMachine {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: JobState::Leased,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> JobState {
        self.state
    }

    pub fn history(&self) -> &[JobTransition] {
        &self.history
    }

    /// Apply an event, returning the new state
    pub fn transition(&mut self, event: JobEvent) -> StateMachineResult<JobState> {
        let target = Self::determine_target_state(self.state, &event)?;

        debug!(
            job_id = %self.job_id,
            from = %self.state,
            to = %target,
            event = event.event_type(),
            "🔄 Job state transition"
        );

        self.history.push(JobTransition {
            from: self.state,
            to: target,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
        self.state = target;
        Ok(target)
    }

    fn determine_target_state(current: JobState, event: &JobEvent) -> StateMachineResult<JobState> {
        if current.is_terminal() {
            return Err(StateMachineError::AlreadyTerminal {
                state: current.to_string(),
            });
        }

        let target = match (current, event) {
            (JobState::Leased, JobEvent::Start) => JobState::Processing,
            (JobState::Leased, JobEvent::Decline) => JobState::Skipped,

            (JobState::Processing, JobEvent::Succeed) => JobState::Succeeded,
            (JobState::Processing, JobEvent::FailRetryable(_)) => JobState::FailedRetryable,
            (JobState::Processing, JobEvent::FailPermanent(_)) => JobState::FailedPermanent,
            (JobState::Processing, JobEvent::LoseLease) => JobState::Abandoned,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
