use serde::{Deserialize, Serialize};

/// Events that drive [`JobState`](super::JobState) transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    Start,
    Succeed,
    FailRetryable(String),
    FailPermanent(String),
    /// Batch cancelled; do not start
    Decline,
    LoseLease,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::FailRetryable(_) => "fail_retryable",
            Self::FailPermanent(_) => "fail_permanent",
            Self::Decline => "decline",
            Self::LoseLease => "lose_lease",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::FailRetryable(msg) | Self::FailPermanent(msg) => Some(msg),
            _ => None,
        }
    }
}
