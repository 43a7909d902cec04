use crate::error::BatchError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Job is already in terminal state {state}")]
    AlreadyTerminal { state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for BatchError {
    fn from(err: StateMachineError) -> Self {
        BatchError::state_transition(err.to_string())
    }
}
