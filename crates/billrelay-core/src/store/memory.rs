//! In-process row store

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::layout::{self, ALL_SHEETS};
use super::{CellUpdate, RowStore};
use crate::error::{Error, Result};

/// Row store kept in memory, used for local runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: RwLock<HashMap<String, Vec<Vec<String>>>>,
}

impl MemoryStore {
    /// Create a store without any sheet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with every known sheet holding only its header row
    pub fn with_default_sheets() -> Self {
        let store = Self::new();
        {
            let mut sheets = store.sheets.write();
            for sheet in ALL_SHEETS {
                sheets.insert(sheet.to_string(), vec![layout::headers(sheet)]);
            }
        }
        store
    }

    /// Load data rows from a JSON file shaped as `{"sheet": [[cell, ...], ...]}`.
    ///
    /// Rows are placed below the header row of their sheet.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let seed: HashMap<String, Vec<Vec<String>>> = serde_json::from_str(&content)?;

        let store = Self::with_default_sheets();
        for (sheet, rows) in seed {
            store.insert_rows(&sheet, rows);
        }
        debug!(path = %path.display(), "Loaded memory store seed");
        Ok(store)
    }

    /// Append data rows below the header of `sheet`, creating it if needed
    pub fn insert_rows(&self, sheet: &str, rows: Vec<Vec<String>>) {
        let mut sheets = self.sheets.write();
        let target = sheets
            .entry(sheet.to_string())
            .or_insert_with(|| vec![layout::headers(sheet)]);
        target.extend(rows);
    }

    /// Copy of the rows of `sheet`, header included
    pub fn snapshot(&self, sheet: &str) -> Vec<Vec<String>> {
        self.sheets.read().get(sheet).cloned().unwrap_or_default()
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        self.sheets
            .read()
            .get(sheet)
            .cloned()
            .ok_or_else(|| Error::store(format!("sheet '{sheet}' does not exist")))
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<()> {
        let mut sheets = self.sheets.write();
        let rows = sheets
            .get_mut(sheet)
            .ok_or_else(|| Error::store(format!("sheet '{sheet}' does not exist")))?;

        let last_used = rows.iter().rposition(|r| !is_blank(r)).map_or(0, |i| i + 1);
        if last_used < rows.len() {
            rows[last_used] = row;
        } else {
            rows.push(row);
        }
        Ok(())
    }

    async fn update_cells(&self, sheet: &str, updates: Vec<CellUpdate>) -> Result<()> {
        let mut sheets = self.sheets.write();
        let rows = sheets
            .get_mut(sheet)
            .ok_or_else(|| Error::store(format!("sheet '{sheet}' does not exist")))?;

        for update in updates {
            if rows.len() <= update.row {
                rows.resize_with(update.row + 1, Vec::new);
            }
            let row = &mut rows[update.row];
            let end = update.column + update.values.len();
            if row.len() < end {
                row.resize(end, String::new());
            }
            for (offset, value) in update.values.into_iter().enumerate() {
                row[update.column + offset] = value;
            }
        }
        Ok(())
    }

    async fn replace_all(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        self.sheets.write().insert(sheet.to_string(), rows);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_append_fills_after_last_used_row() {
        let store = MemoryStore::new();
        store
            .replace_all("s", vec![row(&["h"]), row(&["a"]), row(&["", ""])])
            .await
            .unwrap();

        store.append_row("s", row(&["b"])).await.unwrap();
        store.append_row("s", row(&["c"])).await.unwrap();

        assert_eq!(
            store.read_all("s").await.unwrap(),
            vec![row(&["h"]), row(&["a"]), row(&["b"]), row(&["c"])]
        );
    }

    #[tokio::test]
    async fn test_update_cells_extends_ragged_rows() {
        let store = MemoryStore::new();
        store.replace_all("s", vec![row(&["h"])]).await.unwrap();

        store
            .update_cells(
                "s",
                vec![
                    CellUpdate::single(0, 2, "x"),
                    CellUpdate {
                        row: 2,
                        column: 1,
                        values: row(&["y", "z"]),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            store.snapshot("s"),
            vec![row(&["h", "", "x"]), row(&[]), row(&["", "y", "z"])]
        );
    }

    #[tokio::test]
    async fn test_unknown_sheet_is_a_store_error() {
        let store = MemoryStore::new();
        assert!(matches!(store.read_all("missing").await, Err(Error::Store(_))));
        assert!(store.append_row("missing", row(&["a"])).await.is_err());
    }

    #[test]
    fn test_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, r#"{"Данные": [["", "acme", "ACME LLC"]]}"#).unwrap();

        let store = MemoryStore::from_seed_file(&path).unwrap();
        let rows = store.snapshot(layout::SHEET_BALANCES);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "acme");
        assert_eq!(store.snapshot(layout::SHEET_LOGS).len(), 1);
    }
}
