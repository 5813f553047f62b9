//! The data-store seam used by the assistant.
//!
//! The assistant never talks SQL. It describes reads and writes with
//! [`Query`], [`Filter`], [`NewRecord`] and [`Patch`] values and hands them to
//! a [`DataStore`]. [`crate::db::Database`] is the SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

/// Errors raised by a [`DataStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<rusqlite::Error>() {
            Ok(sqlite) => StoreError::Sqlite(sqlite),
            Err(other) => StoreError::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Projects,
    Tasks,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Tasks => "tasks",
        }
    }
}

/// A column that may appear in a filter or an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Title,
    Status,
    Progress,
    Deadline,
    ProjectId,
    Priority,
    DueDate,
    AssignedTo,
    CreatedAt,
    UpdatedAt,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Deadline => "deadline",
            Self::ProjectId => "project_id",
            Self::Priority => "priority",
            Self::DueDate => "due_date",
            Self::AssignedTo => "assigned_to",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Whether the column exists on `table`.
    pub fn belongs_to(&self, table: Table) -> bool {
        match self {
            Self::Id | Self::Title | Self::Status | Self::CreatedAt | Self::UpdatedAt => true,
            Self::Progress | Self::Deadline => table == Table::Projects,
            Self::ProjectId | Self::Priority | Self::DueDate | Self::AssignedTo => {
                table == Table::Tasks
            }
        }
    }
}

/// A filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Text(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    /// Case-insensitive `LIKE` where `\` escapes `%`, `_` and itself.
    ILike,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: Column,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn neq(column: Column, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Neq,
            value: value.into(),
        }
    }

    pub fn lt(column: Column, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: FilterOp::Lt,
            value: value.into(),
        }
    }

    /// `pattern` is passed through as-is; callers escape user text with
    /// [`escape_like`] first.
    pub fn ilike(column: Column, pattern: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::ILike,
            value: Value::Text(pattern.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: Column,
    pub ascending: bool,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: Column, ascending: bool) -> Self {
        self.order = Some(Order { column, ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject columns that do not exist on the queried table.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_filters(self.table, &self.filters)?;
        if let Some(order) = &self.order {
            if !order.column.belongs_to(self.table) {
                return Err(unknown_column(self.table, order.column));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_filters(table: Table, filters: &[Filter]) -> Result<(), StoreError> {
    match filters.iter().find(|f| !f.column.belongs_to(table)) {
        Some(f) => Err(unknown_column(table, f.column)),
        None => Ok(()),
    }
}

fn unknown_column(table: Table, column: Column) -> StoreError {
    StoreError::InvalidQuery(format!(
        "column '{}' does not exist on '{}'",
        column.as_str(),
        table.as_str()
    ))
}

/// A row returned by [`DataStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Project(Project),
    Task(Task),
}

impl Row {
    pub fn into_project(self) -> Option<Project> {
        match self {
            Row::Project(p) => Some(p),
            Row::Task(_) => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Row::Task(t) => Some(t),
            Row::Project(_) => None,
        }
    }
}

/// A record to insert. The variant decides the table.
#[derive(Debug, Clone)]
pub enum NewRecord {
    Project(CreateProjectInput),
    Task { project_id: Uuid, input: CreateTaskInput },
}

impl NewRecord {
    pub fn table(&self) -> Table {
        match self {
            Self::Project(_) => Table::Projects,
            Self::Task { .. } => Table::Tasks,
        }
    }
}

/// A partial update. The variant decides which columns may be written.
#[derive(Debug, Clone)]
pub enum Patch {
    Project(UpdateProjectInput),
    Task(UpdateTaskInput),
}

impl Patch {
    pub fn table(&self) -> Table {
        match self {
            Self::Project(_) => Table::Projects,
            Self::Task(_) => Table::Tasks,
        }
    }
}

/// Read/write access to the project and task tables.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch rows matching every filter, in the requested order.
    async fn query(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert a record and return its generated id.
    async fn insert(&self, record: NewRecord) -> Result<Uuid, StoreError>;

    /// Apply `patch` to every row of `table` matching all filters and return
    /// the number of rows changed.
    async fn update(&self, table: Table, filters: &[Filter], patch: &Patch)
        -> Result<usize, StoreError>;
}

/// Escape `LIKE` metacharacters so `input` only ever matches literally.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("Foo%"), "Foo\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\tmp"), "c:\\\\tmp");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn query_rejects_columns_from_other_table() {
        let query = Query::new(Table::Projects).filter(Filter::lt(Column::DueDate, Utc::now()));
        assert!(matches!(query.validate(), Err(StoreError::InvalidQuery(_))));

        let query = Query::new(Table::Tasks).order_by(Column::Progress, true);
        assert!(query.validate().is_err());
    }

    #[test]
    fn query_accepts_shared_columns() {
        let query = Query::new(Table::Tasks)
            .filter(Filter::neq(Column::Status, "done"))
            .order_by(Column::UpdatedAt, false)
            .limit(5);
        assert!(query.validate().is_ok());
        assert_eq!(query.limit, Some(5));
    }
}
