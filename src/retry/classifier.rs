//! Caller-supplied failure classification.
//!
//! The engine does not decide on its own whether a failure is worth retrying;
//! workers are built with an explicit [`FailureClassifier`].

use crate::error::ProcessingError;
use crate::models::Job;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Retry with backoff while attempts remain
    Retryable,
    /// Route straight to the dead-letter store
    Poison,
}

pub trait FailureClassifier: Send + Sync + 'static {
    fn classify(&self, job: &Job, error: &ProcessingError) -> FailureDisposition;

    fn classifier_name(&self) -> &'static str;
}

/// Trusts the handler: `Permanent` errors are poison, `Transient` retry
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorKindClassifier;

impl FailureClassifier for ErrorKindClassifier {
    fn classify(&self, _job: &Job, error: &ProcessingError) -> FailureDisposition {
        if error.is_permanent() {
            FailureDisposition::Poison
        } else {
            FailureDisposition::Retryable
        }
    }

    fn classifier_name(&self) -> &'static str {
        "error_kind"
    }
}

/// Every failure consumes the attempt budget before dead-lettering
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAllClassifier;

impl FailureClassifier for RetryAllClassifier {
    fn classify(&self, _job: &Job, _error: &ProcessingError) -> FailureDisposition {
        FailureDisposition::Retryable
    }

    fn classifier_name(&self) -> &'static str {
        "retry_all"
    }
}

/// Wraps a closure that returns `true` for poison failures
pub struct PredicateClassifier<F> {
    is_poison: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&Job, &ProcessingError) -> bool + Send + Sync + 'static,
{
    pub fn new(is_poison: F) -> Self {
        Self { is_poison }
    }
}

impl<F> fmt::Debug for PredicateClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateClassifier").finish_non_exhaustive()
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&Job, &ProcessingError) -> bool + Send + Sync + 'static,
{
    fn classify(&self, job: &Job, error: &ProcessingError) -> FailureDisposition {
        if (self.is_poison)(job, error) {
            FailureDisposition::Poison
        } else {
            FailureDisposition::Retryable
        }
    }

    fn classifier_name(&self) -> &'static str {
        "predicate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchId, ChunkSpec};

    fn job() -> Job {
        Job::new(BatchId::new(), 0, ChunkSpec::Range { start: 0, end: 1 }, 3)
    }

    #[test]
    fn test_error_kind_classifier() {
        let classifier = ErrorKindClassifier;
        assert_eq!(
            classifier.classify(&job(), &ProcessingError::permanent("bad row")),
            FailureDisposition::Poison
        );
        assert_eq!(
            classifier.classify(&job(), &ProcessingError::transient("timeout")),
            FailureDisposition::Retryable
        );
    }

    #[test]
    fn test_retry_all_classifier_ignores_kind() {
        assert_eq!(
            RetryAllClassifier.classify(&job(), &ProcessingError::permanent("bad row")),
            FailureDisposition::Retryable
        );
    }

    #[test]
    fn test_predicate_classifier() {
        let classifier =
            PredicateClassifier::new(|_job: &Job, error: &ProcessingError| error.message().contains("schema"));
        assert_eq!(
            classifier.classify(&job(), &ProcessingError::transient("schema mismatch")),
            FailureDisposition::Poison
        );
        assert_eq!(classifier.classifier_name(), "predicate");
    }
}
