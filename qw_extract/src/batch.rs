//! Batched IN-list queries.
//!
//! Backends cap the number of literals in one IN list, so a lookup over an
//! arbitrary key list is split into consecutive batches of at most
//! `limit` keys. Batches run strictly one after another and their rows are
//! concatenated in batch order. Splitting is a pure function of the keys and
//! the limit.

use crate::backend::{BackendError, Connection, Record};
use crate::error::{ExtractError, Result};
use crate::logging;

/// Maximum IN-list cardinality assumed when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Target of one batched lookup.
#[derive(Debug, Clone, Copy)]
pub struct BatchQuery<'a> {
    /// Fully qualified table name.
    pub table: &'a str,
    pub key_column: &'a str,
    /// Partition the table belongs to, reported on failure.
    pub partition: &'a str,
}

/// Splits `keys` into consecutive batches of at most `limit` keys.
/// A zero limit is treated as one.
pub fn partition_keys(keys: &[String], limit: usize) -> std::slice::Chunks<'_, String> {
    keys.chunks(limit.max(1))
}

/// Number of queries a lookup over `n_keys` keys issues: ⌈n/limit⌉.
pub fn batch_count(n_keys: usize, limit: usize) -> usize {
    n_keys.div_ceil(limit.max(1))
}

/// Runs one query per batch and concatenates the rows in batch order.
/// An empty key list returns no rows without touching the backend.
pub fn execute_batched<C: Connection + ?Sized>(
    conn: &mut C,
    query: &BatchQuery<'_>,
    keys: &[String],
    limit: usize,
) -> Result<Vec<Record>> {
    let mut rows = Vec::new();
    if keys.is_empty() {
        return Ok(rows);
    }

    for batch in partition_keys(keys, limit) {
        let batch_rows = conn
            .select_in(query.table, query.key_column, batch)
            .map_err(|e| {
                logging::log_query_failure(query.partition, query.table, &e);
                backend_error(query, e)
            })?;
        rows.extend(batch_rows);
    }

    logging::log_batch_summary(
        query.partition,
        query.table,
        keys.len(),
        batch_count(keys.len(), limit),
        rows.len(),
    );
    Ok(rows)
}

fn backend_error(query: &BatchQuery<'_>, err: BackendError) -> ExtractError {
    match err {
        // Lost after connecting: report the partition being read.
        BackendError::Connect(message) => ExtractError::Query {
            partition: query.partition.to_string(),
            table: query.table.to_string(),
            message: format!("connection lost: {}", message),
            missing_table: false,
        },
        BackendError::MissingTable(message) => ExtractError::Query {
            partition: query.partition.to_string(),
            table: query.table.to_string(),
            message,
            missing_table: true,
        },
        other => ExtractError::Query {
            partition: query.partition.to_string(),
            table: query.table.to_string(),
            message: other.to_string(),
            missing_table: false,
        },
    }
}
