//! QR type definitions and required-field validation

use super::{FormData, QrDataType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  Text,
  Select,
  Email,
  Tel,
  Password,
}

#[derive(Debug, Clone)]
pub struct QrField {
  pub name: &'static str,
  pub label: &'static str,
  pub kind: FieldKind,
  pub placeholder: Option<&'static str>,
  pub required: bool,
  /// (value, label) pairs for select fields
  pub options: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone)]
pub struct QrTypeConfig {
  pub kind: QrDataType,
  pub label: &'static str,
  pub icon: &'static str,
  pub description: &'static str,
  pub fields: &'static [QrField],
}

const fn field(
  name: &'static str,
  label: &'static str,
  kind: FieldKind,
  placeholder: &'static str,
  required: bool,
) -> QrField {
  QrField {
    name,
    label,
    kind,
    placeholder: Some(placeholder),
    required,
    options: &[],
  }
}

/// All available QR types
pub const QR_TYPES: &[QrTypeConfig] = &[
  QrTypeConfig {
    kind: QrDataType::Text,
    label: "TEXT",
    icon: "[-]",
    description: "Plain text or message",
    fields: &[field("text", "Text", FieldKind::Text, "Enter your text here...", true)],
  },
  QrTypeConfig {
    kind: QrDataType::Url,
    label: "URL",
    icon: "[◊]",
    description: "Website or link",
    fields: &[field("url", "URL", FieldKind::Text, "https://example.com", true)],
  },
  QrTypeConfig {
    kind: QrDataType::Wifi,
    label: "WIFI",
    icon: "[≈]",
    description: "WiFi network credentials",
    fields: &[
      field("ssid", "Network Name (SSID)", FieldKind::Text, "MyWiFiNetwork", true),
      field("password", "Password", FieldKind::Password, "••••••••", false),
      QrField {
        name: "security",
        label: "Security",
        kind: FieldKind::Select,
        placeholder: None,
        required: true,
        options: &[("WPA", "WPA/WPA2"), ("WEP", "WEP"), ("nopass", "None")],
      },
    ],
  },
  QrTypeConfig {
    kind: QrDataType::Email,
    label: "EMAIL",
    icon: "[@]",
    description: "Email address",
    fields: &[
      field("email", "Email Address", FieldKind::Email, "user@example.com", true),
      field("subject", "Subject", FieldKind::Text, "Optional subject", false),
      field("body", "Message", FieldKind::Text, "Optional message", false),
    ],
  },
  QrTypeConfig {
    kind: QrDataType::Sms,
    label: "SMS",
    icon: "[»]",
    description: "Text message",
    fields: &[
      field("phone", "Phone Number", FieldKind::Tel, "+1234567890", true),
      field("message", "Message", FieldKind::Text, "Your message here", false),
    ],
  },
  QrTypeConfig {
    kind: QrDataType::Phone,
    label: "PHONE",
    icon: "[#]",
    description: "Phone number",
    fields: &[field("phone", "Phone Number", FieldKind::Tel, "+1234567890", true)],
  },
  QrTypeConfig {
    kind: QrDataType::Vcard,
    label: "VCARD",
    icon: "[◄]",
    description: "Contact card",
    fields: &[
      field("name", "Full Name", FieldKind::Text, "John Doe", true),
      field("phone", "Phone Number", FieldKind::Tel, "+1234567890", false),
      field("email", "Email Address", FieldKind::Email, "john@example.com", false),
      field("organization", "Organization", FieldKind::Text, "Company Name", false),
      field("title", "Job Title", FieldKind::Text, "Software Engineer", false),
      field("website", "Website", FieldKind::Text, "https://example.com", false),
      field("address", "Address", FieldKind::Text, "123 Main St, City, State", false),
      field("notes", "Notes", FieldKind::Text, "Additional information", false),
    ],
  },
  QrTypeConfig {
    kind: QrDataType::Crypto,
    label: "CRYPTO",
    icon: "[₿]",
    description: "Cryptocurrency address",
    fields: &[
      QrField {
        name: "currency",
        label: "Currency",
        kind: FieldKind::Select,
        placeholder: None,
        required: true,
        options: &[
          ("bitcoin", "Bitcoin (BTC)"),
          ("ethereum", "Ethereum (ETH)"),
          ("litecoin", "Litecoin (LTC)"),
          ("other", "Other"),
        ],
      },
      field(
        "address",
        "Wallet Address",
        FieldKind::Text,
        "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
        true,
      ),
      field("amount", "Amount (optional)", FieldKind::Text, "0.001", false),
      field("label", "Label (optional)", FieldKind::Text, "Payment for service", false),
    ],
  },
];

/// Look up the definition for a type
pub fn type_config(kind: QrDataType) -> &'static QrTypeConfig {
  QR_TYPES
    .iter()
    .find(|c| c.kind == kind)
    .unwrap_or(&QR_TYPES[0])
}

/// Labels of required fields that are absent or empty
pub fn missing_required(kind: QrDataType, data: &FormData) -> Vec<&'static str> {
  type_config(kind)
    .fields
    .iter()
    .filter(|f| f.required && data.get(f.name).map_or(true, |v| v.is_empty()))
    .map(|f| f.label)
    .collect()
}
