//! Messages exchanged between pages and the worker.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::qr::QrDataType;

/// Page to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  /// Activate a waiting version without waiting for pages to close
  SkipWaiting,
  /// Keep a rendered code available offline
  CacheQrCode {
    #[serde(rename = "qrData")]
    qr_data: QrCacheEntry,
  },
}

impl WorkerMessage {
  pub fn parse(json: &str) -> Result<Self> {
    serde_json::from_str(json).map_err(|e| eyre!("Invalid worker message: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCacheEntry {
  pub id: String,
  pub data_url: String,
  #[serde(rename = "type")]
  pub kind: QrDataType,
  /// Encoded payload the image was rendered from
  #[serde(default)]
  pub data: String,
}

impl QrCacheEntry {
  /// MIME type declared by the data URL, PNG when absent
  pub fn mime(&self) -> &str {
    self
      .data_url
      .strip_prefix("data:")
      .and_then(|rest| rest.split([';', ',']).next())
      .filter(|mime| !mime.is_empty())
      .unwrap_or("image/png")
  }
}

/// Worker to page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// A new version finished pre-caching
  CacheUpdated,
  /// A new version took control; open pages should reload
  ControllerChanged,
}
