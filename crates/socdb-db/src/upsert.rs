//! Idempotent merge of typed records into a keyed table.
//!
//! Each call runs in one transaction:
//!
//! 1. `TRUNCATE` the table's `_diff` companion and load the incoming key tuples into it.
//! 2. `DELETE` every row of the target whose key appears in the diff table.
//! 3. Bulk-insert the incoming rows.
//!
//! Rows whose keys are absent from the batch are left untouched, so repeated or
//! overlapping batches converge on the latest version of each record. The
//! `TRUNCATE` takes an `ACCESS EXCLUSIVE` lock on the diff table that is held
//! until commit, which serialises concurrent upserts into the same table.

use std::collections::HashSet;

use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;

/// Postgres caps a single statement at 65 535 bind parameters.
const PG_BIND_LIMIT: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Begin,
    ClearDiff,
    LoadDiff,
    DeleteStale,
    InsertBatch,
    Commit,
    /// Appending to a history table outside the merge.
    Append,
}

impl std::fmt::Display for WritePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WritePhase::Begin => "opening transaction",
            WritePhase::ClearDiff => "clearing diff table",
            WritePhase::LoadDiff => "loading diff keys",
            WritePhase::DeleteStale => "deleting stale rows",
            WritePhase::InsertBatch => "inserting batch",
            WritePhase::Commit => "committing",
            WritePhase::Append => "appending rows",
        };
        f.write_str(s)
    }
}

/// An upsert failed; nothing from the batch is durable.
#[derive(Debug, Error)]
#[error("upsert into {table} failed while {phase}: {source}")]
pub struct StorageWriteError {
    pub table: &'static str,
    pub phase: WritePhase,
    #[source]
    pub source: sqlx::Error,
}

/// Static description of a target table and its diff companion.
///
/// Identifiers are compile-time constants and are interpolated into SQL
/// directly; only values are bound.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub table: &'static str,
    pub diff_table: &'static str,
    pub key_columns: &'static [&'static str],
    /// Every column written on insert, key columns included.
    pub columns: &'static [&'static str],
}

impl TableSpec {
    #[must_use]
    pub fn clear_diff_sql(&self) -> String {
        format!("TRUNCATE TABLE {}", self.diff_table)
    }

    #[must_use]
    pub fn load_diff_prefix(&self) -> String {
        format!(
            "INSERT INTO {} ({}) ",
            self.diff_table,
            self.key_columns.join(", ")
        )
    }

    #[must_use]
    pub fn delete_stale_sql(&self) -> String {
        let predicate = self
            .key_columns
            .iter()
            .map(|k| format!("t.{k} = d.{k}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "DELETE FROM {} AS t USING {} AS d WHERE {predicate}",
            self.table, self.diff_table
        )
    }

    #[must_use]
    pub fn insert_prefix(&self) -> String {
        format!("INSERT INTO {} ({}) ", self.table, self.columns.join(", "))
    }
}

/// Rows that fit in one statement given `width` bind parameters per row.
fn rows_per_statement(width: usize) -> usize {
    (PG_BIND_LIMIT / width.max(1)).max(1)
}

/// A record that can be merged into its table by natural key.
pub trait UpsertRecord {
    const TABLE: TableSpec;

    /// Values of [`TableSpec::key_columns`], in the same order.
    fn natural_key(&self) -> Vec<&str>;

    /// Push one bind per key column.
    fn bind_key<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>);

    /// Push one bind per entry in [`TableSpec::columns`].
    fn bind_row<'args>(&'args self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// Keep only the last occurrence of each natural key, preserving the relative
/// order of the survivors.
pub fn dedupe_keep_last<R: UpsertRecord>(records: &[R]) -> Vec<&R> {
    let mut seen: HashSet<Vec<&str>> = HashSet::with_capacity(records.len());
    let mut kept: Vec<&R> = records
        .iter()
        .rev()
        .filter(|r| seen.insert(r.natural_key()))
        .collect();
    kept.reverse();
    kept
}

/// Merge `records` into `R::TABLE`, replacing any rows that share a key.
///
/// Duplicate keys inside `records` are resolved last-write-wins before any SQL
/// runs. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`StorageWriteError`] naming the phase that failed. The transaction
/// is rolled back, so the table is unchanged.
pub async fn upsert<R: UpsertRecord>(
    pool: &PgPool,
    records: &[R],
) -> Result<usize, StorageWriteError> {
    let spec = R::TABLE;
    let rows = dedupe_keep_last(records);
    if rows.is_empty() {
        return Ok(0);
    }
    if rows.len() < records.len() {
        tracing::debug!(
            table = spec.table,
            dropped = records.len() - rows.len(),
            "dropped duplicate keys before upsert"
        );
    }

    let fail = |phase: WritePhase| {
        move |source: sqlx::Error| StorageWriteError {
            table: spec.table,
            phase,
            source,
        }
    };

    let mut tx = pool.begin().await.map_err(fail(WritePhase::Begin))?;

    sqlx::query(&spec.clear_diff_sql())
        .execute(&mut *tx)
        .await
        .map_err(fail(WritePhase::ClearDiff))?;

    for chunk in rows.chunks(rows_per_statement(spec.key_columns.len())) {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(spec.load_diff_prefix());
        qb.push_values(chunk.iter().copied(), |mut row, record| {
            record.bind_key(&mut row);
        });
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(fail(WritePhase::LoadDiff))?;
    }

    let deleted = sqlx::query(&spec.delete_stale_sql())
        .execute(&mut *tx)
        .await
        .map_err(fail(WritePhase::DeleteStale))?
        .rows_affected();

    for chunk in rows.chunks(rows_per_statement(spec.columns.len())) {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(spec.insert_prefix());
        qb.push_values(chunk.iter().copied(), |mut row, record| {
            record.bind_row(&mut row);
        });
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(fail(WritePhase::InsertBatch))?;
    }

    tx.commit().await.map_err(fail(WritePhase::Commit))?;

    tracing::info!(
        table = spec.table,
        written = rows.len(),
        replaced = deleted,
        "upsert complete"
    );
    Ok(rows.len())
}
