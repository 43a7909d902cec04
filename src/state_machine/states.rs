use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one delivery of a job inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Lease acquired, processing not started
    #[default]
    Leased,
    /// Handler is running
    Processing,
    Succeeded,
    /// Failed; will be retried after backoff
    FailedRetryable,
    /// Failed; routed to the dead-letter store
    FailedPermanent,
    /// Batch was cancelled before processing started
    Skipped,
    /// Lease was lost while processing; another delivery owns the job now
    Abandoned,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Leased | Self::Processing)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedRetryable | Self::FailedPermanent)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leased => write!(f, "leased"),
            Self::Processing => write!(f, "processing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedRetryable => write!(f, "failed_retryable"),
            Self::FailedPermanent => write!(f, "failed_permanent"),
            Self::Skipped => write!(f, "skipped"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leased" => Ok(Self::Leased),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed_retryable" => Ok(Self::FailedRetryable),
            "failed_permanent" => Ok(Self::FailedPermanent),
            "skipped" => Ok(Self::Skipped),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Leased.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::FailedRetryable.is_terminal());
        assert!(JobState::FailedPermanent.is_terminal());
        assert!(JobState::Skipped.is_terminal());
        assert!(JobState::Abandoned.is_terminal());
    }

    #[test]
    fn test_string_conversion() {
        for state in [
            JobState::Leased,
            JobState::Processing,
            JobState::Succeeded,
            JobState::FailedRetryable,
            JobState::FailedPermanent,
            JobState::Skipped,
            JobState::Abandoned,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("done".parse::<JobState>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&JobState::FailedRetryable).unwrap();
        assert_eq!(json, "\"failed_retryable\"");
    }
}
