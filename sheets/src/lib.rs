//! Remote session log for the simulator.
//!
//! A shared spreadsheet holds one row per rehearsal session. This crate
//! defines the `RowStore` seam over that sheet, the adapters that implement
//! it, and `RemoteLogSync`, which keeps a session's row current by upserting
//! it after every turn.

pub mod adapters;
pub mod errors;
pub mod store;
pub mod sync;

pub use adapters::{GoogleSheetsStore, InMemoryRowStore, ServiceAccountKey};
pub use errors::{SheetsError, SheetsResult};
pub use store::{CellValue, LogColumn, RowStore, RowStoreRef};
pub use sync::{RemoteLogRow, RemoteLogSync, UpsertOutcome};
