//! Persisted history document.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::qr::{ErrorCorrectionLevel, FormData, QrDataType, RenderOptions};

pub const DEFAULT_MAX_ITEMS: usize = 20;

/// Format version written into exports
pub const EXPORT_VERSION: &str = "1.0";

/// Render settings a code was generated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrOptions {
  pub error_correction_level: ErrorCorrectionLevel,
  pub margin: u32,
  pub width: u32,
}

impl From<&RenderOptions> for QrOptions {
  fn from(options: &RenderOptions) -> Self {
    Self {
      error_correction_level: options.error_correction_level,
      margin: options.margin,
      width: options.width,
    }
  }
}

/// One generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
  /// `<unix millis>-<9 hex chars>`
  pub id: String,
  #[serde(rename = "type")]
  pub kind: QrDataType,
  pub data: FormData,
  /// Encoded payload string
  pub qr_data: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qr_options: Option<QrOptions>,
  /// Creation or last re-use time, unix millis
  pub timestamp: i64,
  pub preview: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
  /// Most recent first
  pub items: Vec<HistoryItem>,
  pub max_items: usize,
}

impl HistoryState {
  pub fn empty(max_items: usize) -> Self {
    Self {
      items: Vec::new(),
      max_items,
    }
  }

  /// Decode a stored document, dropping items that no longer decode.
  pub fn parse(raw: &str, default_max_items: usize) -> Result<Self> {
    let value: Value =
      serde_json::from_str(raw).map_err(|e| eyre!("Failed to parse stored history: {}", e))?;

    let max_items = value
      .get("maxItems")
      .and_then(Value::as_u64)
      .filter(|n| *n > 0)
      .map_or(default_max_items, |n| n as usize);

    let items = match value.get("items") {
      Some(Value::Array(items)) => items
        .iter()
        .filter_map(|item| serde_json::from_value::<HistoryItem>(item.clone()).ok())
        .collect(),
      _ => Vec::new(),
    };

    Ok(Self { items, max_items })
  }

  pub fn to_json(&self) -> Result<String> {
    serde_json::to_string(self).map_err(|e| eyre!("Failed to serialize history: {}", e))
  }

  pub fn get(&self, id: &str) -> Option<&HistoryItem> {
    self.items.iter().find(|item| item.id == id)
  }
}

/// Downloadable copy of the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
  pub export_date: DateTime<Utc>,
  pub version: String,
  pub items: Vec<HistoryItem>,
}

impl ExportDocument {
  pub fn new(items: Vec<HistoryItem>) -> Self {
    Self {
      export_date: Utc::now(),
      version: EXPORT_VERSION.to_string(),
      items,
    }
  }

  pub fn to_json_pretty(&self) -> Result<String> {
    serde_json::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize export: {}", e))
  }
}

/// `qretro-history-YYYY-MM-DD.json`
pub fn export_file_name(date: NaiveDate) -> String {
  format!("qretro-history-{}.json", date.format("%Y-%m-%d"))
}
