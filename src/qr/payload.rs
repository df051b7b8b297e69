//! Payload strings handed to the QR encoder.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use super::{FormData, QrDataType};

/// Characters left alone by `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'_')
  .remove(b'.')
  .remove(b'!')
  .remove(b'~')
  .remove(b'*')
  .remove(b'\'')
  .remove(b'(')
  .remove(b')');

/// Percent-encode a URI component
pub fn encode_component(value: &str) -> String {
  utf8_percent_encode(value, URI_COMPONENT).to_string()
}

fn field<'a>(data: &'a FormData, name: &str) -> &'a str {
  data.get(name).map(String::as_str).unwrap_or("")
}

fn with_query(mut base: String, params: &[String]) -> String {
  if !params.is_empty() {
    base.push('?');
    base.push_str(&params.join("&"));
  }
  base
}

/// Build the string encoded into the QR symbol for a data type.
pub fn generate_qr_data(kind: QrDataType, data: &FormData) -> String {
  match kind {
    QrDataType::Text => field(data, "text").to_string(),
    QrDataType::Url => field(data, "url").to_string(),
    QrDataType::Wifi => {
      let security = match field(data, "security") {
        "nopass" => "",
        other => other,
      };
      let password = match field(data, "password") {
        "" => String::new(),
        pw => format!("P:{};", pw),
      };
      format!("WIFI:T:{};S:{};{};", security, field(data, "ssid"), password)
    }
    QrDataType::Email => {
      let mut params = Vec::new();
      if let Some(subject) = data.get("subject").filter(|s| !s.is_empty()) {
        params.push(format!("subject={}", encode_component(subject)));
      }
      if let Some(body) = data.get("body").filter(|s| !s.is_empty()) {
        params.push(format!("body={}", encode_component(body)));
      }
      with_query(format!("mailto:{}", field(data, "email")), &params)
    }
    QrDataType::Sms => {
      let phone = field(data, "phone");
      match field(data, "message") {
        "" => format!("sms:{}", phone),
        message => format!("sms:{}?body={}", phone, encode_component(message)),
      }
    }
    QrDataType::Phone => format!("tel:{}", field(data, "phone")),
    QrDataType::Vcard => vcard(data),
    QrDataType::Crypto => crypto_uri(data),
  }
}

fn vcard(data: &FormData) -> String {
  let name = field(data, "name");
  let optional = |prefix: &str, key: &str, suffix: &str| match field(data, key) {
    "" => String::new(),
    v => format!("{}{}{}", prefix, v, suffix),
  };

  let reversed_name = if name.is_empty() {
    String::new()
  } else {
    let parts: Vec<&str> = name.split(' ').rev().collect();
    format!("N:{}", parts.join(";"))
  };

  let lines = [
    "BEGIN:VCARD".to_string(),
    "VERSION:3.0".to_string(),
    optional("FN:", "name", ""),
    reversed_name,
    optional("TEL:", "phone", ""),
    optional("EMAIL:", "email", ""),
    optional("ORG:", "organization", ""),
    optional("TITLE:", "title", ""),
    optional("URL:", "website", ""),
    optional("ADR:;;", "address", ";;;"),
    optional("NOTE:", "notes", ""),
    "END:VCARD".to_string(),
  ];

  lines
    .into_iter()
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

fn crypto_uri(data: &FormData) -> String {
  let currency = match field(data, "currency") {
    "" => "bitcoin",
    c => c,
  };
  let address = field(data, "address");
  let amount = field(data, "amount");
  let label = field(data, "label");

  // bitcoin uses BIP-21 `amount`, ethereum uses `value`
  let amount_param = match currency {
    "bitcoin" => "amount",
    "ethereum" => "value",
    _ => {
      return if amount.is_empty() {
        format!("{}:{}", currency, address)
      } else {
        format!("{}:{}?amount={}", currency, address, amount)
      };
    }
  };

  let mut params = Vec::new();
  if !amount.is_empty() {
    params.push(format!("{}={}", amount_param, amount));
  }
  if !label.is_empty() {
    params.push(format!("label={}", encode_component(label)));
  }
  with_query(format!("{}:{}", currency, address), &params)
}

/// Link to the share page that re-renders a payload.
pub fn share_url(origin: &Url, base_path: &str, kind: QrDataType, payload: &str) -> String {
  format!(
    "{}{}share?type={}&data={}",
    origin.origin().ascii_serialization(),
    base_path,
    kind,
    encode_component(payload)
  )
}

/// Extract the type and payload from a share link.
pub fn parse_share_url(link: &str) -> Option<(QrDataType, String)> {
  let url = Url::parse(link).ok()?;
  let mut kind = None;
  let mut data = None;
  for (key, value) in url.query_pairs() {
    match key.as_ref() {
      "type" => kind = value.parse::<QrDataType>().ok(),
      "data" => data = Some(value.into_owned()),
      _ => {}
    }
  }
  Some((kind?, data?))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::qr::form_data;

  #[test]
  fn test_phone() {
    let data = form_data([("phone", "+1234567890")]);
    assert_eq!(generate_qr_data(QrDataType::Phone, &data), "tel:+1234567890");
  }

  #[test]
  fn test_wifi_with_password() {
    let data = form_data([("ssid", "Net"), ("security", "WPA"), ("password", "pw")]);
    assert_eq!(
      generate_qr_data(QrDataType::Wifi, &data),
      "WIFI:T:WPA;S:Net;P:pw;;"
    );
  }

  #[test]
  fn test_wifi_open_network() {
    let data = form_data([("ssid", "Cafe"), ("security", "nopass")]);
    assert_eq!(generate_qr_data(QrDataType::Wifi, &data), "WIFI:T:;S:Cafe;;");
  }

  #[test]
  fn test_email_encodes_components() {
    let data = form_data([
      ("email", "a@b.c"),
      ("subject", "Hi there"),
      ("body", "x&y=z"),
    ]);
    assert_eq!(
      generate_qr_data(QrDataType::Email, &data),
      "mailto:a@b.c?subject=Hi%20there&body=x%26y%3Dz"
    );
  }

  #[test]
  fn test_email_without_params() {
    let data = form_data([("email", "a@b.c")]);
    assert_eq!(generate_qr_data(QrDataType::Email, &data), "mailto:a@b.c");
  }

  #[test]
  fn test_sms_with_message() {
    let data = form_data([("phone", "123"), ("message", "see you!")]);
    assert_eq!(
      generate_qr_data(QrDataType::Sms, &data),
      "sms:123?body=see%20you!"
    );
  }

  #[test]
  fn test_text_and_url_pass_through() {
    let data = form_data([("text", "hello"), ("url", "https://x.y")]);
    assert_eq!(generate_qr_data(QrDataType::Text, &data), "hello");
    assert_eq!(generate_qr_data(QrDataType::Url, &data), "https://x.y");
    assert_eq!(generate_qr_data(QrDataType::Text, &FormData::new()), "");
  }

  #[test]
  fn test_vcard_skips_empty_lines() {
    let data = form_data([("name", "Ada King Lovelace"), ("email", "ada@x.org")]);
    assert_eq!(
      generate_qr_data(QrDataType::Vcard, &data),
      "BEGIN:VCARD\nVERSION:3.0\nFN:Ada King Lovelace\nN:Lovelace;King;Ada\nEMAIL:ada@x.org\nEND:VCARD"
    );
  }

  #[test]
  fn test_vcard_address_wrapping() {
    let data = form_data([("name", "Bo"), ("address", "1 Main St")]);
    let card = generate_qr_data(QrDataType::Vcard, &data);
    assert!(card.contains("\nADR:;;1 Main St;;;\n"));
  }

  #[test]
  fn test_bitcoin_uri() {
    let data = form_data([
      ("currency", "bitcoin"),
      ("address", "1abc"),
      ("amount", "0.5"),
      ("label", "Tip jar"),
    ]);
    assert_eq!(
      generate_qr_data(QrDataType::Crypto, &data),
      "bitcoin:1abc?amount=0.5&label=Tip%20jar"
    );
  }

  #[test]
  fn test_ethereum_uses_value() {
    let data = form_data([("currency", "ethereum"), ("address", "0xabc"), ("amount", "1")]);
    assert_eq!(
      generate_qr_data(QrDataType::Crypto, &data),
      "ethereum:0xabc?value=1"
    );
  }

  #[test]
  fn test_other_currency_ignores_label() {
    let data = form_data([
      ("currency", "litecoin"),
      ("address", "Labc"),
      ("amount", "2"),
      ("label", "ignored"),
    ]);
    assert_eq!(
      generate_qr_data(QrDataType::Crypto, &data),
      "litecoin:Labc?amount=2"
    );
  }

  #[test]
  fn test_crypto_defaults_to_bitcoin() {
    let data = form_data([("address", "1abc")]);
    assert_eq!(generate_qr_data(QrDataType::Crypto, &data), "bitcoin:1abc");
  }

  #[test]
  fn test_share_link_round_trip() {
    let origin = Url::parse("https://qretro.example/QRetro/").unwrap();
    let link = share_url(&origin, "/QRetro/", QrDataType::Wifi, "WIFI:T:WPA;S:a b;;");
    assert_eq!(
      link,
      "https://qretro.example/QRetro/share?type=wifi&data=WIFI%3AT%3AWPA%3BS%3Aa%20b%3B%3B"
    );
    assert_eq!(
      parse_share_url(&link),
      Some((QrDataType::Wifi, "WIFI:T:WPA;S:a b;;".to_string()))
    );
  }

  #[test]
  fn test_parse_share_url_rejects_incomplete() {
    assert_eq!(parse_share_url("https://x.y/share?type=text"), None);
    assert_eq!(parse_share_url("not a url"), None);
  }
}
