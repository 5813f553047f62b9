//! [`DataStore`] implementation backed by the SQLite [`Database`].
//!
//! rusqlite is synchronous, so every call runs on tokio's blocking pool. A
//! caller that stops waiting (a timeout) gets control back at once while the
//! statement finishes in the background.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

use super::{format_datetime, project_from_row, task_from_row, Database, PROJECT_COLUMNS, TASK_COLUMNS};
use crate::store::*;

#[async_trait]
impl DataStore for Database {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        query.validate()?;
        let query = query.clone();
        self.blocking(move |db| db.run_query(&query)).await
    }

    async fn insert(&self, record: NewRecord) -> Result<Uuid, StoreError> {
        self.blocking(move |db| db.run_insert(record)).await
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: &Patch,
    ) -> Result<usize, StoreError> {
        if patch.table() != table {
            return Err(StoreError::InvalidQuery(format!(
                "patch for '{}' applied to '{}'",
                patch.table().as_str(),
                table.as_str()
            )));
        }
        validate_filters(table, filters)?;

        let filters = filters.to_vec();
        let patch = patch.clone();
        self.blocking(move |db| db.run_update(table, &filters, &patch))
            .await
    }
}

impl Database {
    /// Run `f` against a clone of this handle on the blocking pool.
    async fn blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Other(format!("database task failed: {}", e)))?
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut params = Vec::new();
        let columns = match query.table {
            Table::Projects => PROJECT_COLUMNS,
            Table::Tasks => TASK_COLUMNS,
        };
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            columns,
            query.table.as_str(),
            where_clause(&query.filters, &mut params)
        );
        if let Some(order) = &query.order {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY {} {}", order.column.as_str(), direction));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        tracing::trace!(%sql, "query");

        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let rows = match query.table {
            Table::Projects => stmt
                .query_map(params_from_iter(params.iter()), project_from_row)?
                .map(|r| r.map(Row::Project))
                .collect::<Result<Vec<_>, _>>()?,
            Table::Tasks => stmt
                .query_map(params_from_iter(params.iter()), task_from_row)?
                .map(|r| r.map(Row::Task))
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(rows)
    }

    fn run_insert(&self, record: NewRecord) -> Result<Uuid, StoreError> {
        let id = match record {
            NewRecord::Project(input) => self.create_project(input)?.id,
            NewRecord::Task { project_id, input } => self.create_task(project_id, input)?.id,
        };
        Ok(id)
    }

    fn run_update(&self, table: Table, filters: &[Filter], patch: &Patch) -> Result<usize, StoreError> {
        let mut params = Vec::new();
        let mut assignments = Vec::new();
        let mut set = |column: &str, value: SqlValue| {
            assignments.push(format!("{} = ?", column));
            params.push(value);
        };

        match patch {
            Patch::Project(p) => {
                if let Some(title) = &p.title {
                    set("title", SqlValue::Text(title.clone()));
                }
                if let Some(description) = &p.description {
                    set("description", SqlValue::Text(description.clone()));
                }
                if let Some(status) = p.status {
                    set("status", SqlValue::Text(status.as_str().to_string()));
                }
                if let Some(progress) = p.progress {
                    set("progress", SqlValue::Integer(i64::from(progress.min(100))));
                }
                if let Some(deadline) = p.deadline {
                    set("deadline", SqlValue::Text(format_datetime(deadline)));
                }
            }
            Patch::Task(t) => {
                if let Some(title) = &t.title {
                    set("title", SqlValue::Text(title.clone()));
                }
                if let Some(description) = &t.description {
                    set("description", SqlValue::Text(description.clone()));
                }
                if let Some(status) = t.status {
                    set("status", SqlValue::Text(status.as_str().to_string()));
                }
                if let Some(priority) = t.priority {
                    set("priority", SqlValue::Text(priority.as_str().to_string()));
                }
                if let Some(due_date) = t.due_date {
                    set("due_date", SqlValue::Text(format_datetime(due_date)));
                }
                if let Some(assigned_to) = t.assigned_to {
                    set("assigned_to", SqlValue::Text(assigned_to.to_string()));
                }
            }
        }

        if assignments.is_empty() {
            return Err(StoreError::InvalidQuery("empty patch".to_string()));
        }
        assignments.push("updated_at = ?".to_string());
        params.push(SqlValue::Text(format_datetime(Utc::now())));

        let sql = format!(
            "UPDATE {} SET {}{}",
            table.as_str(),
            assignments.join(", "),
            where_clause(filters, &mut params)
        );

        tracing::trace!(%sql, "update");

        let conn = self.conn.lock().expect("database lock poisoned");
        let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
        Ok(changed)
    }
}

/// Build a `WHERE` clause, appending one bound parameter per filter.
fn where_clause(filters: &[Filter], params: &mut Vec<SqlValue>) -> String {
    if filters.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = filters
        .iter()
        .map(|f| {
            params.push(sql_value(&f.value));
            let column = f.column.as_str();
            match f.op {
                FilterOp::Eq => format!("{} = ?", column),
                FilterOp::Neq => format!("{} != ?", column),
                FilterOp::Lt => format!("{} < ?", column),
                FilterOp::ILike => format!("fold({}) LIKE fold(?) ESCAPE '\\'", column),
            }
        })
        .collect();

    format!(" WHERE {}", clauses.join(" AND "))
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(t) => SqlValue::Text(format_datetime(*t)),
    }
}
