//! Row-oriented access to the shared spreadsheet

mod auth;
mod cache;
pub mod layout;
mod memory;
mod repository;
mod sheets;

use std::sync::Arc;

use async_trait::async_trait;

pub use auth::{ServiceAccountAuth, ServiceAccountKey};
pub use cache::TtlCache;
pub use memory::MemoryStore;
pub use repository::{CheckRecord, Repository};
pub use sheets::SheetsStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// A write of consecutive cells in one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    /// 0-based row, as returned by [`RowStore::read_all`]
    pub row: usize,
    /// 0-based first column
    pub column: usize,
    /// Values written left to right starting at `column`
    pub values: Vec<String>,
}

impl CellUpdate {
    /// Write a single cell
    pub fn single(row: usize, column: usize, value: impl Into<String>) -> Self {
        Self {
            row,
            column,
            values: vec![value.into()],
        }
    }

    /// Write a whole row starting at column A
    pub fn whole_row(row: usize, values: Vec<String>) -> Self {
        Self {
            row,
            column: 0,
            values,
        }
    }
}

/// A spreadsheet treated as named sheets of string rows.
///
/// Row 0 of every sheet is the header. Trailing empty cells may be missing
/// from returned rows.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows of a sheet, header included; empty when the sheet is empty.
    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>>;

    /// Append a row after the last non-empty row.
    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<()>;

    /// Overwrite cells in place.
    async fn update_cells(&self, sheet: &str, updates: Vec<CellUpdate>) -> Result<()>;

    /// Replace the whole content of a sheet.
    ///
    /// `rows` are written from the top before anything below them is
    /// cleared, so a failure part way leaves stale rows rather than an
    /// empty sheet.
    async fn replace_all(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()>;

    /// Name of the backend, for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn RowStore>> {
    match config.backend {
        StorageBackend::Sheets => Ok(Arc::new(SheetsStore::from_config(config).await?)),
        StorageBackend::Memory => {
            let store = match &config.seed_file {
                Some(path) => MemoryStore::from_seed_file(path)?,
                None => MemoryStore::with_default_sheets(),
            };
            Ok(Arc::new(store))
        }
    }
}
