// Per-delivery job state machine.
//
// Every transition a worker drives for one leased job is enumerated here, so
// retry and dead-letter routing are explicit instead of living in ad hoc
// error-handling branches.

pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::JobEvent;
pub use job_state_machine::{JobStateMachine, JobTransition};
pub use states::JobState;
