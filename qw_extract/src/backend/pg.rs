/// PostgreSQL connector built on the blocking `postgres` client.
///
/// Each `select_in` call becomes one statement with one bound parameter per
/// key. Key columns are expected to be character typed (`record_no`,
/// `site_no`, `parm_cd`); `char(n)` comparison semantics make the
/// space-padded site numbers match their storage width.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::error::SqlState;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use super::{BackendError, Connection, Connector, Record, validate_identifier};

/// Connects with a libpq-style connection string or URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl Connector for PgConnector {
    type Connection = PgConnection;

    fn connect(&self, data_source: &str) -> Result<PgConnection, BackendError> {
        let client =
            Client::connect(data_source, NoTls).map_err(|e| BackendError::Connect(e.to_string()))?;
        Ok(PgConnection { client })
    }
}

pub struct PgConnection {
    client: Client,
}

impl Connection for PgConnection {
    fn select_in(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> Result<Vec<Record>, BackendError> {
        validate_identifier(table)?;
        validate_identifier(key_column)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let sql = select_in_sql(table, key_column, keys.len());
        let params: Vec<&(dyn ToSql + Sync)> =
            keys.iter().map(|k| k as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql.as_str(), &params)
            .map_err(classify_error)?;

        rows.iter().map(row_to_record).collect()
    }
}

/// `SELECT * FROM t WHERE k IN ($1, ..., $n)`. Identifiers must already be validated.
pub fn select_in_sql(table: &str, key_column: &str, n_keys: usize) -> String {
    let placeholders: Vec<String> = (1..=n_keys).map(|i| format!("${}", i)).collect();
    format!(
        "SELECT * FROM {} WHERE {} IN ({})",
        table,
        key_column,
        placeholders.join(", ")
    )
}

fn classify_error(err: postgres::Error) -> BackendError {
    if err.code() == Some(&SqlState::UNDEFINED_TABLE) {
        BackendError::MissingTable(err.to_string())
    } else if err.is_closed() {
        BackendError::Connect(err.to_string())
    } else {
        BackendError::Query(err.to_string())
    }
}

fn row_to_record(row: &Row) -> Result<Record, BackendError> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_())
            .map_err(|e| BackendError::Query(format!("column {}: {}", column.name(), e)))?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::from(i64::from(v)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::from(i64::from(v)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::from(f64::from(v)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::from)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(idx)?
            .and_then(|d| d.to_f64())
            .map(Value::from)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|t| Value::from(t.format("%Y-%m-%dT%H:%M:%S").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|t| Value::from(t.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(idx)?.map(Value::from)
    } else {
        tracing::debug!(column_type = %ty, "unsupported column type read as null");
        None
    };
    Ok(value.unwrap_or(Value::Null))
}
