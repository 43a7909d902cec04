use crate::error::ProcessingError;
use crate::models::Job;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Business logic executed for one chunk.
///
/// Implementations must be idempotent with respect to `job.job_id`: the same
/// job may be delivered more than once after a lease expiry or a crash.
#[async_trait]
pub trait ChunkHandler: Send + Sync + 'static {
    async fn process(&self, job: &Job) -> Result<(), ProcessingError>;

    fn handler_name(&self) -> &str {
        "chunk_handler"
    }
}

/// Adapts an async closure into a [`ChunkHandler`]
pub struct FnChunkHandler<F> {
    name: String,
    func: F,
}

impl<F> fmt::Debug for FnChunkHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnChunkHandler")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> ChunkHandler for FnChunkHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
        (self.func)(job.clone()).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> FnChunkHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    FnChunkHandler {
        name: name.into(),
        func,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchId, ChunkSpec};

    #[tokio::test]
    async fn test_closure_handler() {
        let handler = handler_fn("even_only", |job: Job| async move {
            if job.sequence % 2 == 0 {
                Ok(())
            } else {
                Err(ProcessingError::permanent("odd chunk"))
            }
        });
        assert_eq!(handler.handler_name(), "even_only");

        let batch_id = BatchId::new();
        let even = Job::new(batch_id, 0, ChunkSpec::Range { start: 0, end: 10 }, 3);
        let odd = Job::new(batch_id, 1, ChunkSpec::Range { start: 10, end: 20 }, 3);
        assert!(handler.process(&even).await.is_ok());
        assert!(handler.process(&odd).await.unwrap_err().is_permanent());
    }
}
