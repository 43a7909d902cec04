use super::backoff::BackoffPolicy;
use super::classifier::{FailureClassifier, FailureDisposition};
use crate::error::ProcessingError;
use crate::models::Job;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Classified as poison; remaining attempts were skipped
    Poison,
    AttemptsExhausted,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poison => write!(f, "poison"),
            Self::AttemptsExhausted => write!(f, "attempts_exhausted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, next_attempt: u32 },
    DeadLetter { reason: DeadLetterReason },
}

/// Maps a failed execution to a retry or a dead-letter
#[derive(Clone)]
pub struct RetryController {
    policy: BackoffPolicy,
    classifier: Arc<dyn FailureClassifier>,
}

impl fmt::Debug for RetryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier.classifier_name())
            .finish()
    }
}

impl RetryController {
    pub fn new(policy: BackoffPolicy, classifier: Arc<dyn FailureClassifier>) -> Self {
        Self { policy, classifier }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn decide(&self, job: &Job, error: &ProcessingError) -> RetryDecision {
        if self.classifier.classify(job, error) == FailureDisposition::Poison {
            return RetryDecision::DeadLetter {
                reason: DeadLetterReason::Poison,
            };
        }
        if job.is_final_attempt() {
            return RetryDecision::DeadLetter {
                reason: DeadLetterReason::AttemptsExhausted,
            };
        }
        RetryDecision::Retry {
            delay: self.policy.delay_for_attempt(job.attempt),
            next_attempt: job.attempt + 1,
        }
    }
}
