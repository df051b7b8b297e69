//! QR payload types, field definitions and the encoder seam.
//!
//! Encoding the QR symbol itself is delegated to an external program; this
//! module only produces the payload strings that get encoded.

mod encoder;
mod payload;
mod types;

pub use encoder::{ErrorCorrectionLevel, ImageFormat, QrEncoder, QrencodeCli, RenderOptions, Theme};
pub use payload::{encode_component, generate_qr_data, parse_share_url, share_url};
pub use types::{missing_required, FieldKind, QR_TYPES};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Structured form values keyed by field name
pub type FormData = BTreeMap<String, String>;

/// The kinds of data a QR code can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QrDataType {
  Text,
  Url,
  Wifi,
  Email,
  Sms,
  Phone,
  Vcard,
  Crypto,
}

impl QrDataType {
  pub const ALL: [QrDataType; 8] = [
    QrDataType::Text,
    QrDataType::Url,
    QrDataType::Wifi,
    QrDataType::Email,
    QrDataType::Sms,
    QrDataType::Phone,
    QrDataType::Vcard,
    QrDataType::Crypto,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      QrDataType::Text => "text",
      QrDataType::Url => "url",
      QrDataType::Wifi => "wifi",
      QrDataType::Email => "email",
      QrDataType::Sms => "sms",
      QrDataType::Phone => "phone",
      QrDataType::Vcard => "vcard",
      QrDataType::Crypto => "crypto",
    }
  }
}

impl fmt::Display for QrDataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for QrDataType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    QrDataType::ALL
      .into_iter()
      .find(|t| t.as_str() == lower)
      .ok_or_else(|| format!("Unknown QR data type: {}", s))
  }
}

/// Build form data from `name=value` pairs
#[cfg(test)]
pub fn form_data<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> FormData {
  pairs
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
