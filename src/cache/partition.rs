//! Versioned cache partition names.

use chrono::Utc;
use std::fmt;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRole {
  /// Pre-cached application shell and build assets
  Static,
  /// Responses cached opportunistically while serving fetches
  Dynamic,
}

impl PartitionRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      PartitionRole::Static => "static",
      PartitionRole::Dynamic => "dynamic",
    }
  }
}

/// `<app>-<role>-v<version>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName {
  pub app: String,
  pub role: PartitionRole,
  pub version: String,
}

impl PartitionName {
  pub fn new(app: &str, role: PartitionRole, version: &str) -> Self {
    Self {
      app: app.to_string(),
      role,
      version: version.to_string(),
    }
  }

  /// Parse a partition name belonging to `app`
  pub fn parse(app: &str, name: &str) -> Option<Self> {
    let rest = name.strip_prefix(app)?.strip_prefix('-')?;
    let (role, version) = if let Some(v) = rest.strip_prefix("static-v") {
      (PartitionRole::Static, v)
    } else if let Some(v) = rest.strip_prefix("dynamic-v") {
      (PartitionRole::Dynamic, v)
    } else {
      return None;
    };

    if version.is_empty() {
      return None;
    }
    Some(Self::new(app, role, version))
  }

  /// Whether a partition name follows this application's naming convention
  pub fn belongs_to(app: &str, name: &str) -> bool {
    name
      .strip_prefix(app)
      .map_or(false, |rest| rest.starts_with('-'))
  }
}

impl fmt::Display for PartitionName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-v{}", self.app, self.role.as_str(), self.version)
  }
}

/// The current static and dynamic partitions for one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
  pub static_name: String,
  pub dynamic_name: String,
}

impl Partitions {
  pub fn new(app: &str, version: &str) -> Self {
    Self {
      static_name: PartitionName::new(app, PartitionRole::Static, version).to_string(),
      dynamic_name: PartitionName::new(app, PartitionRole::Dynamic, version).to_string(),
    }
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Deployment version token.
pub struct BuildVersion;

impl BuildVersion {
  /// Environment override for the version token
  pub const ENV: &'static str = "QRETRO_BUILD_VERSION";

  /// Pick the first available token: explicit, environment, configured, generated
  pub fn resolve(explicit: Option<&str>, configured: Option<&str>) -> String {
    explicit
      .map(String::from)
      .or_else(|| std::env::var(Self::ENV).ok().filter(|v| !v.is_empty()))
      .or_else(|| configured.map(String::from))
      .unwrap_or_else(Self::generate)
  }

  /// `<git short hash>-<base36 seconds>`, or `build-<base36 seconds>` outside a repository
  pub fn generate() -> String {
    let timestamp = to_base36(Utc::now().timestamp().max(0) as u64);

    let hash = Command::new("git")
      .args(["rev-parse", "--short", "HEAD"])
      .output()
      .ok()
      .filter(|out| out.status.success())
      .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
      .filter(|h| !h.is_empty());

    match hash {
      Some(hash) => format!("{}-{}", hash, timestamp),
      None => format!("build-{}", timestamp),
    }
  }
}

pub(crate) fn to_base36(mut n: u64) -> String {
  const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
  if n == 0 {
    return "0".to_string();
  }
  let mut out = Vec::new();
  while n > 0 {
    out.push(DIGITS[(n % 36) as usize]);
    n /= 36;
  }
  out.reverse();
  String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_name_format() {
    let name = PartitionName::new("qretro", PartitionRole::Static, "abc123-t045if");
    assert_eq!(name.to_string(), "qretro-static-vabc123-t045if");
  }

  #[test]
  fn test_parse() {
    let parsed = PartitionName::parse("qretro", "qretro-dynamic-v2307642-t045if").unwrap();
    assert_eq!(parsed.role, PartitionRole::Dynamic);
    assert_eq!(parsed.version, "2307642-t045if");

    assert!(PartitionName::parse("qretro", "qretro-v123").is_none());
    assert!(PartitionName::parse("qretro", "qretro-static-v").is_none());
    assert!(PartitionName::parse("qretro", "other-static-v1").is_none());
  }

  #[test]
  fn test_belongs_to() {
    assert!(PartitionName::belongs_to("qretro", "qretro-v123"));
    assert!(PartitionName::belongs_to("qretro", "qretro-static-vOLD"));
    assert!(!PartitionName::belongs_to("qretro", "qretroish-static-v1"));
    assert!(!PartitionName::belongs_to("qretro", "workbox-precache"));
  }

  #[test]
  fn test_base36() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "z");
    assert_eq!(to_base36(36), "10");
    assert_eq!(to_base36(1_700_000_000), "s44we8");
  }

  #[test]
  fn test_explicit_version_wins() {
    assert_eq!(BuildVersion::resolve(Some("v9"), Some("cfg")), "v9");
  }

  #[test]
  fn test_generated_version_has_timestamp_suffix() {
    let version = BuildVersion::generate();
    let (_, suffix) = version.rsplit_once('-').unwrap();
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
  }
}
