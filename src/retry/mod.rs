//! # Retry and Backoff
//!
//! Decides what happens to a failed job: another attempt after a capped
//! exponential delay, or the dead-letter store.
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │ ProcessingError │────▶│ FailureClassifier │────▶│ RetryController │──▶ Retry { delay }
//! │ + Job           │     │ (caller supplied) │     │ + BackoffPolicy │──▶ DeadLetter
//! └─────────────────┘     └───────────────────┘     └─────────────────┘
//! ```

pub mod backoff;
pub mod classifier;
pub mod controller;

pub use backoff::BackoffPolicy;
pub use classifier::{
    ErrorKindClassifier, FailureClassifier, FailureDisposition, PredicateClassifier,
    RetryAllClassifier,
};
pub use controller::{DeadLetterReason, RetryController, RetryDecision};
