//! Database connector capability consumed by the extraction pipeline.
//!
//! The pipeline only ever issues `SELECT * FROM <table> WHERE <key> IN (...)`
//! queries, so that is the whole surface a backend has to provide. Table
//! and column names come from configuration and are validated as plain
//! identifiers; key values are always bound, never interpolated.
//!
//! Submodules:
//! - `record`: the flat row type shared by all backends.
//! - `pg`: PostgreSQL via the blocking `postgres` client.
//! - `memory`: in-memory tables for tests and offline replay.

pub mod memory;
pub mod pg;
pub mod record;

pub use record::Record;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connect(String),

    /// The table or view does not exist. Usually a wrong partition id.
    #[error("table or view does not exist: {0}")]
    MissingTable(String),

    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("{0}")]
    Query(String),
}

/// Opens connections to a named data source.
pub trait Connector {
    type Connection: Connection;

    fn connect(&self, data_source: &str) -> Result<Self::Connection, BackendError>;
}

/// An open connection. Dropping it releases the underlying resource.
pub trait Connection {
    /// Returns every row of `table` whose `key_column` is one of `keys`.
    fn select_in(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, BackendError>;
}

/// Accepts `name` or `schema.name` where each part is `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<(), BackendError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_qualified_identifiers_are_accepted() {
        assert!(validate_identifier("qw_sample_01").is_ok());
        assert!(validate_identifier("nwis.QW_SAMPLE_01").is_ok());
        assert!(validate_identifier("_parm").is_ok());
    }

    #[test]
    fn test_injection_shaped_identifiers_are_rejected() {
        for bad in ["", "qw sample", "a;drop table x", "1abc", "a..b", "x.", "t'--"] {
            assert!(
                matches!(validate_identifier(bad), Err(BackendError::InvalidIdentifier(_))),
                "'{bad}' should be rejected"
            );
        }
    }
}
