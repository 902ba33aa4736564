//! Analytics warehouse client (Dune table uploads).

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_DUNE_URL: &str = "https://api.dune.com";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Failed to render rows as CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {0} is not a JSON object")]
    NotAnObject(usize),

    #[error("Warehouse request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Warehouse rejected upload to {table} (HTTP {status}): {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },
}

/// Destination for published rows. Uploads are all-or-nothing.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn publish(&self, table_name: &str, rows: &[Value], description: &str) -> Result<(), WarehouseError>;
}

#[derive(Serialize)]
struct CsvUpload<'a> {
    table_name: &'a str,
    description: &'a str,
    data: String,
    is_private: bool,
}

pub struct DuneWarehouse {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for DuneWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuneWarehouse")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl DuneWarehouse {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Warehouse for DuneWarehouse {
    async fn publish(&self, table_name: &str, rows: &[Value], description: &str) -> Result<(), WarehouseError> {
        let body = CsvUpload {
            table_name,
            description,
            data: rows_to_csv(rows)?,
            is_private: false,
        };
        let resp = self
            .client
            .post(format!("{}/api/v1/table/upload/csv", self.base_url))
            .header("X-DUNE-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WarehouseError::Rejected {
                table: table_name.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(table = table_name, rows = rows.len(), "Uploaded rows to warehouse");
        Ok(())
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Render JSON objects as CSV.
///
/// The header is the sorted union of all keys. Missing and null values become
/// empty cells; nested values are JSON encoded.
pub fn rows_to_csv(rows: &[Value]) -> Result<String, WarehouseError> {
    let mut keys: BTreeSet<&str> = BTreeSet::new();
    for (idx, row) in rows.iter().enumerate() {
        let obj = row.as_object().ok_or(WarehouseError::NotAnObject(idx))?;
        keys.extend(obj.keys().map(String::as_str));
    }
    let header: Vec<&str> = keys.into_iter().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !header.is_empty() {
        writer.write_record(&header)?;
    }
    for row in rows {
        writer.write_record(header.iter().map(|key| cell(row.get(*key))))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| WarehouseError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
