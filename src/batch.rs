//! Parallel per-item extraction over independent blobs.
//!
//! Decodes are pure and independent across indices and shards, so batches
//! fan out on rayon's work-stealing pool. Failure is per-item, never
//! global: a bad blob is recorded and the batch continues, aggregating
//! failures for final reporting. Result order follows input order.

use rayon::prelude::*;

use crate::error::{ReliquaryError, Result};
use crate::metadata::{IndexMetadata, IndexMetadataFactory, ShardMetadata, ShardMetadataFactory};

/// One failed item in a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Identifier of the item that failed (index name, `index/shard`, ...).
    pub item: String,
    /// The per-item error, unmodified.
    pub error: ReliquaryError,
}

/// Aggregated outcome of a batch operation.
#[derive(Debug, Default)]
pub struct BatchOutcome<T> {
    /// Successfully extracted entities, in input order.
    pub successes: Vec<T>,
    /// Per-item failures, in input order.
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn collect<T: Send>(results: Vec<(String, Result<T>)>) -> BatchOutcome<T> {
    let mut outcome = BatchOutcome {
        successes: Vec::new(),
        failures: Vec::new(),
    };
    for (item, result) in results {
        match result {
            Ok(value) => outcome.successes.push(value),
            Err(error) => {
                tracing::warn!(item = %item, error = %error, "batch item failed");
                outcome.failures.push(BatchFailure { item, error });
            }
        }
    }
    outcome
}

/// Extract index metadata for every named index of one snapshot.
pub fn extract_index_metadata(
    factory: &dyn IndexMetadataFactory,
    snapshot_name: &str,
    index_names: &[String],
) -> BatchOutcome<Box<dyn IndexMetadata>> {
    let results: Vec<_> = index_names
        .par_iter()
        .map(|name| (name.clone(), factory.from_repo(snapshot_name, name)))
        .collect();
    collect(results)
}

/// Extract shard metadata for every (index, shard) pair of one snapshot.
pub fn extract_shard_metadata(
    factory: &dyn ShardMetadataFactory,
    snapshot_name: &str,
    shards: &[(String, u32)],
) -> BatchOutcome<ShardMetadata> {
    let results: Vec<_> = shards
        .par_iter()
        .map(|(index_name, shard_id)| {
            (
                format!("{index_name}/{shard_id}"),
                factory.from_repo(snapshot_name, index_name, *shard_id),
            )
        })
        .collect();
    collect(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_partitions_and_preserves_order() {
        let results: Vec<(String, Result<u32>)> = vec![
            ("a".to_string(), Ok(1)),
            ("b".to_string(), Err(ReliquaryError::malformed("boom"))),
            ("c".to_string(), Ok(3)),
        ];
        let outcome = collect(results);
        assert_eq!(outcome.successes, vec![1, 3]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].item, "b");
        assert!(!outcome.is_complete());
    }
}
