//! Google Sheets v4 values API backend

use std::time::Duration;

use async_trait::async_trait;
use exponential_backoff::Backoff;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::auth::{ServiceAccountAuth, ServiceAccountKey};
use super::layout::{column_letter, quote_sheet};
use super::{CellUpdate, RowStore};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Row store over a Google spreadsheet
#[derive(Debug)]
pub struct SheetsStore {
    client: Client,
    auth: ServiceAccountAuth,
    spreadsheet_url: Url,
    backoff: Backoff,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct RangeData {
    range: String,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

impl SheetsStore {
    /// Create a store for `spreadsheet_id` below the API base URL
    pub fn new(
        api_url: &str,
        spreadsheet_id: &str,
        auth: ServiceAccountAuth,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let mut spreadsheet_url = Url::parse(api_url)
            .map_err(|e| Error::config(format!("invalid Sheets API URL '{api_url}': {e}")))?;
        spreadsheet_url
            .path_segments_mut()
            .map_err(|()| Error::config(format!("Sheets API URL cannot be a base: {api_url}")))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(spreadsheet_id);

        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::store(format!("cannot build Sheets client: {e}")))?,
            auth,
            spreadsheet_url,
            backoff: Backoff::new(
                max_retries,
                Duration::from_millis(100),
                Some(Duration::from_secs(10)),
            ),
        })
    }

    /// Create a store from the storage configuration, reading the key file
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let key = ServiceAccountKey::from_file(&config.credentials_file)?;
        let auth = ServiceAccountAuth::new(key, &config.token_url, config.timeout)?;
        let store = Self::new(
            &config.api_url,
            &config.spreadsheet_id,
            auth,
            config.timeout,
            config.max_retries,
        )?;
        debug!(spreadsheet_id = %config.spreadsheet_id, "Opened Google Sheets store");
        Ok(store)
    }

    /// URL of `spreadsheets/{id}/{segments...}`, with the last segment
    /// carrying an optional `:method` suffix
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.spreadsheet_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn send<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let token = self.auth.access_token().await.map_err(|e| {
                Error::store(format!("{operation} failed, no Sheets access token: {e}"))
            })?;

            let outcome = build(&self.client, &token).send().await;
            let retryable = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if status == StatusCode::UNAUTHORIZED {
                        self.auth.invalidate().await;
                    }
                    if !is_retryable(status) {
                        return Err(Error::store(format!(
                            "{operation} failed with {status}: {body}"
                        )));
                    }
                    format!("{status}: {body}")
                }
                Err(e) => e.to_string(),
            };

            match self.backoff.next(attempt) {
                Some(delay) => {
                    warn!(operation, attempt, error = %retryable, ?delay, "Sheets request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(Error::store(format!(
                        "{operation} failed after {attempt} attempts: {retryable}"
                    )))
                }
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn update_range(sheet: &str, update: &CellUpdate) -> String {
    let row = update.row + 1;
    let first = column_letter(update.column);
    let last = column_letter(update.column + update.values.len().saturating_sub(1));
    format!("{}!{first}{row}:{last}{row}", quote_sheet(sheet))
}

/// Range below the first `rows` rows: the whole sheet when nothing is kept,
/// otherwise columns `A` to the last written one from row `rows + 1` down.
fn trailing_range(sheet: &str, rows: usize, width: usize) -> String {
    let sheet = quote_sheet(sheet);
    if rows == 0 || width == 0 {
        return sheet;
    }
    format!("{sheet}!A{}:{}", rows + 1, column_letter(width - 1))
}

#[async_trait]
impl RowStore for SheetsStore {
    async fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["values", &quote_sheet(sheet)]);
        let response = self
            .send("read", |client, token| client.get(url.clone()).bearer_auth(token))
            .await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| Error::store(format!("invalid values response for '{sheet}': {e}")))?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<()> {
        let url = self.url(&["values", &format!("{}:append", quote_sheet(sheet))]);
        let body = json!({ "values": [row] });
        self.send("append", |client, token| {
            client
                .post(url.clone())
                .query(&[
                    ("valueInputOption", "RAW"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .bearer_auth(token)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn update_cells(&self, sheet: &str, updates: Vec<CellUpdate>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let data: Vec<RangeData> = updates
            .into_iter()
            .filter(|update| !update.values.is_empty())
            .map(|update| RangeData {
                range: update_range(sheet, &update),
                major_dimension: "ROWS",
                values: vec![update.values],
            })
            .collect();

        let url = self.url(&["values:batchUpdate"]);
        let body = json!({ "valueInputOption": "RAW", "data": data });
        self.send("batch update", |client, token| {
            client.post(url.clone()).bearer_auth(token).json(&body)
        })
        .await?;
        Ok(())
    }

    async fn replace_all(&self, sheet: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let range = quote_sheet(sheet);
        let count = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        if width > 0 {
            // pad so a short row overwrites every cell of the row it lands on
            let values: Vec<Vec<String>> = rows
                .into_iter()
                .map(|mut row| {
                    row.resize(width, String::new());
                    row
                })
                .collect();
            let start = format!("{range}!A1");
            let url = self.url(&["values", &start]);
            let body = RangeData {
                range: start.clone(),
                major_dimension: "ROWS",
                values,
            };
            self.send("write", |client, token| {
                client
                    .put(url.clone())
                    .query(&[("valueInputOption", "RAW")])
                    .bearer_auth(token)
                    .json(&body)
            })
            .await?;
        }

        let trailing = trailing_range(sheet, count, width);
        let clear_url = self.url(&["values", &format!("{trailing}:clear")]);
        self.send("clear", |client, token| {
            client.post(clear_url.clone()).bearer_auth(token).json(&json!({}))
        })
        .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store(api_url: &str) -> SheetsStore {
        SheetsStore::new(
            api_url,
            "sheet-id",
            ServiceAccountAuth::with_static_token("token"),
            Duration::from_secs(5),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let store = create_test_store("https://sheets.googleapis.com/v4/");
        assert_eq!(
            store.url(&["values:batchUpdate"]).as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values:batchUpdate"
        );
        assert!(store
            .url(&["values", "'Logs':append"])
            .as_str()
            .ends_with("/spreadsheets/sheet-id/values/'Logs':append"));
    }

    #[test]
    fn test_update_range() {
        let update = CellUpdate {
            row: 4,
            column: 7,
            values: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(update_range("Уведомления", &update), "'Уведомления'!H5:J5");
        assert_eq!(
            update_range("Logs", &CellUpdate::single(0, 0, "x")),
            "'Logs'!A1:A1"
        );
    }

    #[test]
    fn test_trailing_range() {
        assert_eq!(trailing_range("Logs", 0, 0), "'Logs'");
        assert_eq!(trailing_range("Logs", 3, 5), "'Logs'!A4:E");
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(json!("x")), "x");
        assert_eq!(cell_to_string(json!(12.5)), "12.5");
        assert_eq!(cell_to_string(Value::Null), "");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }
}
