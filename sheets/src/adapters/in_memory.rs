use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{SheetsError, SheetsResult};
use crate::store::{CellValue, LogColumn, RowStore};

/// In-memory implementation of RowStore
#[derive(Debug, Default, Clone)]
pub struct InMemoryRowStore {
    /// Thread-safe storage of rows
    rows: Arc<RwLock<Vec<Vec<CellValue>>>>,
}

impl InMemoryRowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose first row is the given header
    pub fn with_header(header: &[&str]) -> Self {
        let store = Self::new();
        if let Ok(mut rows) = store.rows.write() {
            rows.push(header.iter().map(|h| CellValue::from(*h)).collect());
        }
        store
    }

    /// Copy of every row, header included
    pub fn rows(&self) -> Vec<Vec<CellValue>> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Number of rows, header included
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn read_column(&self, column: LogColumn) -> SheetsResult<Vec<String>> {
        let rows = self.rows.read().map_err(|e| {
            SheetsError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut values: Vec<String> = rows
            .iter()
            .map(|row| {
                row.get(column.index())
                    .map(|cell| cell.to_string())
                    .unwrap_or_default()
            })
            .collect();

        while values.last().is_some_and(|v| v.is_empty()) {
            values.pop();
        }

        Ok(values)
    }

    async fn append_row(&self, row: Vec<CellValue>) -> SheetsResult<()> {
        let mut rows = self.rows.write().map_err(|e| {
            SheetsError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        rows.push(row);
        debug!(row_number = rows.len(), "Appended row");
        Ok(())
    }

    async fn overwrite_row(&self, row_number: usize, row: Vec<CellValue>) -> SheetsResult<()> {
        let mut rows = self.rows.write().map_err(|e| {
            SheetsError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        let slot = row_number
            .checked_sub(1)
            .and_then(|i| rows.get_mut(i))
            .ok_or_else(|| {
                SheetsError::Storage(format!("Row {} does not exist", row_number))
            })?;

        *slot = row;
        debug!(row_number, "Overwrote row");
        Ok(())
    }
}
