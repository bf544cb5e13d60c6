//! Policy row repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide transactional row CRUD over the flat policy table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every mutating call is one transaction; any failure rolls it back before
//!   the error is returned.
//! - Inserts skip rows whose `(ptype, v0..v5)` tuple already exists.
//! - The policy table is synced once, lazily, by the first call.
//!
//! # See also
//! - src/db/schema.rs
//! - src/model/rule.rs

use crate::db::{ensure_rule_table, StoreError, StoreResult, TableName};
use crate::model::filter::RuleFilter;
use crate::model::rule::{PolicyRow, FIELD_COLUMNS, FIELD_COUNT};
use log::{debug, warn};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};

/// Repository interface for policy rows.
///
/// Implementations are shared across threads and called from blocking tasks.
pub trait RuleRepository: Send + Sync + 'static {
    /// Returns stored rows in id order, optionally restricted by `filter`.
    fn load_rows(&self, filter: Option<&RuleFilter>) -> StoreResult<Vec<PolicyRow>>;
    /// Replaces the whole table content with `rows`.
    fn replace_all(&self, rows: &[PolicyRow]) -> StoreResult<()>;
    /// Inserts rows that are not stored yet. Returns the number inserted.
    fn insert_rows(&self, rows: &[PolicyRow]) -> StoreResult<usize>;
    /// Deletes rows matching each given rule exactly. Returns the number deleted.
    fn delete_rows(&self, rows: &[PolicyRow]) -> StoreResult<usize>;
    /// Deletes rows of `ptype` whose fields match `field_values` from `field_index` on.
    fn delete_filtered(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> StoreResult<usize>;
    /// Deletes `old` rows and inserts `new` rows in one transaction.
    fn replace_rows(&self, old: &[PolicyRow], new: &[PolicyRow]) -> StoreResult<()>;
}

/// SQLite-backed policy row repository.
///
/// Cloning shares the underlying connection.
#[derive(Debug, Clone)]
pub struct SqliteRuleRepository {
    conn: Arc<Mutex<Connection>>,
    table: TableName,
    schema_ready: Arc<OnceCell<()>>,
}

impl SqliteRuleRepository {
    pub fn new(conn: Connection, table: TableName) -> Self {
        Self::from_shared(Arc::new(Mutex::new(conn)), table)
    }

    /// Wraps a connection that the caller also keeps using.
    pub fn from_shared(conn: Arc<Mutex<Connection>>, table: TableName) -> Self {
        Self {
            conn,
            table,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        // Transactions roll back on unwind, so a poisoned connection is consistent.
        let conn = self.conn.lock().unwrap_or_else(|poisoned| {
            warn!(
                "event=store_lock module=repo status=recovered table={}",
                self.table
            );
            poisoned.into_inner()
        });
        self.schema_ready.get_or_try_init(|| {
            debug!(
                "event=schema_sync module=repo status=start table={}",
                self.table
            );
            ensure_rule_table(&conn, &self.table)
        })?;
        Ok(conn)
    }

    fn insert_missing(&self, tx: &Transaction<'_>, rows: &[PolicyRow]) -> StoreResult<usize> {
        let mut inserted = 0;
        for row in rows {
            if row_exists_in_tx(tx, &self.table, row)? {
                continue;
            }
            tx.execute(
                &format!(
                    "INSERT INTO {} (ptype, v0, v1, v2, v3, v4, v5)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                    self.table
                ),
                params![
                    row.ptype,
                    row.fields[0],
                    row.fields[1],
                    row.fields[2],
                    row.fields[3],
                    row.fields[4],
                    row.fields[5],
                ],
            )?;
            inserted += 1;
        }
        Ok(inserted)
    }

    fn delete_exact(&self, tx: &Transaction<'_>, rows: &[PolicyRow]) -> StoreResult<usize> {
        let mut deleted = 0;
        for row in rows {
            deleted += tx.execute(
                &format!(
                    "DELETE FROM {}
                     WHERE ptype = ?1
                       AND v0 = ?2 AND v1 = ?3 AND v2 = ?4
                       AND v3 = ?5 AND v4 = ?6 AND v5 = ?7;",
                    self.table
                ),
                params![
                    row.ptype,
                    row.fields[0],
                    row.fields[1],
                    row.fields[2],
                    row.fields[3],
                    row.fields[4],
                    row.fields[5],
                ],
            )?;
        }
        Ok(deleted)
    }
}

impl RuleRepository for SqliteRuleRepository {
    fn load_rows(&self, filter: Option<&RuleFilter>) -> StoreResult<Vec<PolicyRow>> {
        let mut sql = format!(
            "SELECT id, ptype, v0, v1, v2, v3, v4, v5 FROM {} WHERE 1 = 1",
            self.table
        );
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(filter) = filter {
            push_in_clause(&mut sql, &mut bind_values, "ptype", &filter.ptype);
            for (column, values) in FIELD_COLUMNS.iter().zip(filter.fields.iter()) {
                push_in_clause(&mut sql, &mut bind_values, column, values);
            }
        }
        sql.push_str(" ORDER BY id ASC;");

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let rows = {
            let mut stmt = tx.prepare(&sql)?;
            let mut cursor = stmt.query(params_from_iter(bind_values))?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.next()? {
                rows.push(parse_rule_row(row)?);
            }
            rows
        };
        tx.commit()?;
        Ok(rows)
    }

    fn replace_all(&self, rows: &[PolicyRow]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(&format!("DELETE FROM {};", self.table), [])?;
        self.insert_missing(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_rows(&self, rows: &[PolicyRow]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = self.insert_missing(&tx, rows)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn delete_rows(&self, rows: &[PolicyRow]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = self.delete_exact(&tx, rows)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_filtered(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> StoreResult<usize> {
        let mut sql = format!("DELETE FROM {} WHERE ptype = ?", self.table);
        let mut bind_values = vec![Value::Text(ptype.to_string())];

        for (offset, value) in field_values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let Some(column) = FIELD_COLUMNS.get(field_index + offset) else {
                return Err(StoreError::InvalidData(format!(
                    "field index {} is outside v0..v{}",
                    field_index + offset,
                    FIELD_COUNT - 1
                )));
            };
            sql.push_str(&format!(" AND {column} = ?"));
            bind_values.push(Value::Text(value.clone()));
        }
        sql.push(';');

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute(&sql, params_from_iter(bind_values))?;
        tx.commit()?;
        Ok(deleted)
    }

    fn replace_rows(&self, old: &[PolicyRow], new: &[PolicyRow]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        self.delete_exact(&tx, old)?;
        self.insert_missing(&tx, new)?;
        tx.commit()?;
        Ok(())
    }
}

fn push_in_clause(sql: &mut String, bind_values: &mut Vec<Value>, column: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    bind_values.extend(values.iter().cloned().map(Value::Text));
}

fn row_exists_in_tx(tx: &Transaction<'_>, table: &TableName, row: &PolicyRow) -> StoreResult<bool> {
    let exists: i64 = tx.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1
                FROM {table}
                WHERE ptype = ?1
                  AND v0 = ?2 AND v1 = ?3 AND v2 = ?4
                  AND v3 = ?5 AND v4 = ?6 AND v5 = ?7
            );"
        ),
        params![
            row.ptype,
            row.fields[0],
            row.fields[1],
            row.fields[2],
            row.fields[3],
            row.fields[4],
            row.fields[5],
        ],
        |result| result.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_rule_row(row: &Row<'_>) -> StoreResult<PolicyRow> {
    let ptype: String = row.get("ptype")?;
    if ptype.is_empty() {
        let id: i64 = row.get("id")?;
        return Err(StoreError::InvalidData(format!(
            "empty ptype in row id {id}"
        )));
    }

    let mut fields: [String; FIELD_COUNT] = Default::default();
    for (slot, column) in fields.iter_mut().zip(FIELD_COLUMNS) {
        *slot = row.get(column)?;
    }

    Ok(PolicyRow {
        id: Some(row.get("id")?),
        ptype,
        fields,
    })
}
