//! Record store abstraction the export reads from.

use crate::error::Result;
use crate::types::ExportRow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Queryable source of the records exported for an app
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Query every record for `package_name`
    ///
    /// `Ok(None)` means the store has no queryable result for the package at all,
    /// which is different from a result with zero rows.
    async fn query_records(&self, package_name: &str) -> Result<Option<RecordCursor>>;
}

/// Column names plus the rows of one query, consumed front to back
///
/// Dropping the cursor releases whatever the store held for the query.
pub struct RecordCursor {
    columns: Vec<String>,
    rows: Box<dyn Iterator<Item = Result<ExportRow>> + Send>,
}

impl RecordCursor {
    /// Cursor over rows that may individually fail to load
    pub fn new<I>(columns: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Result<ExportRow>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            columns,
            rows: Box::new(rows.into_iter()),
        }
    }

    /// Cursor over rows that are already in memory
    pub fn from_rows(columns: Vec<String>, rows: Vec<ExportRow>) -> Self {
        Self::new(columns, rows.into_iter().map(Ok))
    }

    /// Column names in the order the store returned them
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for RecordCursor {
    type Item = Result<ExportRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl std::fmt::Debug for RecordCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCursor")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// In-memory record store keyed by package name
///
/// Packages that were never inserted have no queryable result.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, (Vec<String>, Vec<ExportRow>)>>,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records held for `package_name`
    pub fn insert(
        &self,
        package_name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<ExportRow>,
    ) {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables.insert(package_name.into(), (columns, rows));
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query_records(&self, package_name: &str) -> Result<Option<RecordCursor>> {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(tables
            .get(package_name)
            .map(|(columns, rows)| RecordCursor::from_rows(columns.clone(), rows.clone())))
    }
}
