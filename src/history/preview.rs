//! Display text summarizing a history entry.

use crate::qr::{FormData, QrDataType};

const MAX_PREVIEW: usize = 40;

fn field<'a>(data: &'a FormData, name: &str) -> &'a str {
  data.get(name).map_or("", String::as_str)
}

fn truncate(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

/// Short display text for a history entry
pub fn create_preview(kind: QrDataType, data: &FormData) -> String {
  match kind {
    QrDataType::Text => truncate(field(data, "text"), MAX_PREVIEW),
    QrDataType::Url => truncate(field(data, "url"), MAX_PREVIEW),
    QrDataType::Wifi => {
      let security = Some(field(data, "security"))
        .filter(|s| !s.is_empty())
        .unwrap_or("No security");
      format!("{} ({})", field(data, "ssid"), security)
    }
    QrDataType::Email => field(data, "email").to_string(),
    QrDataType::Sms => {
      let message = field(data, "message");
      if message.is_empty() {
        field(data, "phone").to_string()
      } else {
        format!("{} -> {}...", field(data, "phone"), truncate(message, 20))
      }
    }
    QrDataType::Phone => field(data, "phone").to_string(),
    QrDataType::Vcard => ["name", "email", "phone"]
      .iter()
      .map(|name| field(data, name))
      .find(|v| !v.is_empty())
      .unwrap_or("Contact")
      .to_string(),
    QrDataType::Crypto => {
      let currency = Some(field(data, "currency"))
        .filter(|c| !c.is_empty())
        .unwrap_or("Crypto");
      let address = field(data, "address");
      let ellipsis = if address.chars().count() > 15 { "..." } else { "" };
      format!(
        "{}: {}{}",
        currency.to_uppercase(),
        truncate(address, 15),
        ellipsis
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::qr::form_data;

  #[test]
  fn test_text_truncated_to_forty_chars() {
    let long = "x".repeat(60);
    let preview = create_preview(QrDataType::Text, &form_data([("text", long.as_str())]));
    assert_eq!(preview.chars().count(), 40);
  }

  #[test]
  fn test_truncation_counts_characters() {
    let emoji = "😀".repeat(50);
    let preview = create_preview(QrDataType::Url, &form_data([("url", emoji.as_str())]));
    assert_eq!(preview.chars().count(), 40);
  }

  #[test]
  fn test_wifi() {
    assert_eq!(
      create_preview(QrDataType::Wifi, &form_data([("ssid", "Home"), ("security", "WPA")])),
      "Home (WPA)"
    );
    assert_eq!(
      create_preview(QrDataType::Wifi, &form_data([("ssid", "Cafe")])),
      "Cafe (No security)"
    );
  }

  #[test]
  fn test_sms() {
    assert_eq!(
      create_preview(
        QrDataType::Sms,
        &form_data([("phone", "+1555"), ("message", "Meet me at the station at noon")])
      ),
      "+1555 -> Meet me at the stati..."
    );
    assert_eq!(create_preview(QrDataType::Sms, &form_data([("phone", "+1555")])), "+1555");
  }

  #[test]
  fn test_vcard_fallbacks() {
    assert_eq!(
      create_preview(QrDataType::Vcard, &form_data([("email", "a@b.c"), ("phone", "1")])),
      "a@b.c"
    );
    assert_eq!(create_preview(QrDataType::Vcard, &FormData::new()), "Contact");
  }

  #[test]
  fn test_crypto() {
    assert_eq!(
      create_preview(
        QrDataType::Crypto,
        &form_data([("currency", "bitcoin"), ("address", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")])
      ),
      "BITCOIN: 1A1zP1eP5QGefi2..."
    );
    assert_eq!(
      create_preview(QrDataType::Crypto, &form_data([("address", "short")])),
      "CRYPTO: short"
    );
  }
}
