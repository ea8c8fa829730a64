mod google;
mod in_memory;

pub use google::{GoogleSheetsStore, ServiceAccountKey};
pub use in_memory::InMemoryRowStore;
