//! # Partitioner
//!
//! Splits a record set of size N into `ceil(N / C)` jobs of at most C records.
//! Ranges are half-open, disjoint and contiguous; only the last chunk may be
//! short.
//!
//! Partitioning has no side effects. Enqueueing is a separate step so callers
//! can inspect or validate a [`PartitionPlan`] first (dry run).

use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::models::{BatchManifest, BatchSource, ChunkSpec, Job};
use tracing::debug;

/// Partition `[0, total_records)` using the default attempt budget. Any
/// positive chunk size is accepted.
pub fn partition(total_records: u64, chunk_size: u64) -> Result<(BatchManifest, Vec<Job>)> {
    Partitioner::default()
        .plan(&BatchSource::count(total_records), chunk_size)
        .map(PartitionPlan::into_parts)
}

/// Partition an explicit list of record identifiers
pub fn partition_records(ids: Vec<String>, chunk_size: u64) -> Result<(BatchManifest, Vec<Job>)> {
    Partitioner::default()
        .plan(&BatchSource::Records { ids }, chunk_size)
        .map(PartitionPlan::into_parts)
}

/// Partitioning policy. Unbounded by default; [`BatchService`] applies the
/// configured `partition.max_chunk_size`.
///
/// [`BatchService`]: crate::service::BatchService
#[derive(Debug, Clone)]
pub struct Partitioner {
    max_attempts: u32,
    max_chunk_size: Option<u64>,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(defaults::MAX_ATTEMPTS)
    }
}

impl Partitioner {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            max_chunk_size: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Reject chunk sizes above `max_chunk_size`
    pub fn with_max_chunk_size(mut self, max_chunk_size: u64) -> Self {
        self.max_chunk_size = Some(max_chunk_size);
        self
    }

    /// Build the manifest and jobs for `source` without touching any backend
    pub fn plan(&self, source: &BatchSource, chunk_size: u64) -> Result<PartitionPlan> {
        if chunk_size == 0 {
            return Err(BatchError::invalid_config(
                "chunk_size",
                "must be greater than 0",
            ));
        }
        if let Some(max_chunk_size) = self.max_chunk_size.filter(|max| chunk_size > *max) {
            return Err(BatchError::invalid_config(
                "chunk_size",
                format!("{chunk_size} exceeds maximum of {max_chunk_size}"),
            ));
        }
        if self.max_attempts == 0 {
            return Err(BatchError::invalid_config(
                "max_attempts",
                "must be greater than 0",
            ));
        }

        let manifest = BatchManifest::new(source.total_records(), chunk_size, self.max_attempts);
        let jobs = match source {
            BatchSource::Count { total } => range_chunks(*total, chunk_size)
                .map(|(sequence, start, end)| {
                    Job::new(
                        manifest.batch_id,
                        sequence,
                        ChunkSpec::Range { start, end },
                        self.max_attempts,
                    )
                })
                .collect(),
            BatchSource::Records { ids } => ids
                .chunks(chunk_size as usize)
                .enumerate()
                .map(|(index, ids)| {
                    let sequence = index as u64;
                    Job::new(
                        manifest.batch_id,
                        sequence,
                        ChunkSpec::Records {
                            offset: sequence.saturating_mul(chunk_size),
                            ids: ids.to_vec(),
                        },
                        self.max_attempts,
                    )
                })
                .collect(),
        };

        debug!(
            batch_id = %manifest.batch_id,
            total_records = manifest.total_records,
            chunk_size = chunk_size,
            job_count = manifest.job_count,
            "🔪 Partitioned batch"
        );

        Ok(PartitionPlan { manifest, jobs })
    }
}

/// `(sequence, start, end)` for each chunk of `[0, total)`
fn range_chunks(total: u64, chunk_size: u64) -> impl Iterator<Item = (u64, u64, u64)> {
    (0..total.div_ceil(chunk_size)).map(move |sequence| {
        let start = sequence * chunk_size;
        (sequence, start, start.saturating_add(chunk_size).min(total))
    })
}

/// Result of partitioning, not yet committed to a queue
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub manifest: BatchManifest,
    pub jobs: Vec<Job>,
}

impl PartitionPlan {
    pub fn into_parts(self) -> (BatchManifest, Vec<Job>) {
        (self.manifest, self.jobs)
    }

    pub fn chunk_sizes(&self) -> Vec<u64> {
        self.jobs.iter().map(|job| job.chunk.len()).collect()
    }

    /// Re-check that the jobs cover `[0, total_records)` exactly
    pub fn validate(&self) -> Result<()> {
        if self.jobs.len() as u64 != self.manifest.job_count {
            return Err(BatchError::invalid_config(
                "job_count",
                format!(
                    "manifest expects {} jobs, plan has {}",
                    self.manifest.job_count,
                    self.jobs.len()
                ),
            ));
        }

        let mut expected_start = 0u64;
        for job in &self.jobs {
            if job.batch_id != self.manifest.batch_id {
                return Err(BatchError::invalid_config(
                    "batch_id",
                    format!("job {} belongs to another batch", job.job_id),
                ));
            }
            let range = job.chunk.range();
            if range.start != expected_start || range.is_empty() {
                return Err(BatchError::invalid_config(
                    "chunk",
                    format!(
                        "job {} covers {range:?}, expected start {expected_start}",
                        job.sequence
                    ),
                ));
            }
            if range.end - range.start > self.manifest.chunk_size {
                return Err(BatchError::invalid_config(
                    "chunk",
                    format!("job {} exceeds chunk size", job.sequence),
                ));
            }
            expected_start = range.end;
        }

        if expected_start != self.manifest.total_records {
            return Err(BatchError::invalid_config(
                "chunk",
                format!(
                    "chunks end at {expected_start}, expected {}",
                    self.manifest.total_records
                ),
            ));
        }
        Ok(())
    }
}
