use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::SheetsResult;

/// The fixed six-column schema of the session log sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColumn {
    LoginTimestamp,
    LastUpdateTimestamp,
    UserId,
    DurationMinutes,
    SessionOrdinal,
    TranscriptText,
}

impl LogColumn {
    pub const COUNT: usize = 6;

    /// Zero-based column index
    pub fn index(self) -> usize {
        match self {
            LogColumn::LoginTimestamp => 0,
            LogColumn::LastUpdateTimestamp => 1,
            LogColumn::UserId => 2,
            LogColumn::DurationMinutes => 3,
            LogColumn::SessionOrdinal => 4,
            LogColumn::TranscriptText => 5,
        }
    }

    /// Column letter in A1 notation
    pub fn letter(self) -> char {
        (b'A' + self.index() as u8) as char
    }
}

/// A single cell written to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// Tabular store shared by every user of the simulator.
///
/// There is no transaction across calls: a read followed by a write can
/// interleave with another writer. Row numbers are one-based, header
/// included, as in A1 notation.
#[async_trait]
pub trait RowStore: Send + Sync + Debug {
    /// Every value of one column, top to bottom, header rows included.
    /// Trailing empty cells may be omitted.
    async fn read_column(&self, column: LogColumn) -> SheetsResult<Vec<String>>;

    /// Appends a row after the last non-empty row
    async fn append_row(&self, row: Vec<CellValue>) -> SheetsResult<()>;

    /// Overwrites the cells of an existing row in place
    async fn overwrite_row(&self, row_number: usize, row: Vec<CellValue>) -> SheetsResult<()>;
}

/// Type alias for Arc-wrapped RowStore trait objects
pub type RowStoreRef = Arc<dyn RowStore>;
