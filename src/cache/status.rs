//! Summary of what the cache currently holds.

use color_eyre::Result;

use super::partition::{PartitionName, PartitionRole};
use super::route::Scope;
use super::traits::{CacheStorage, PartitionUsage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatus {
  pub name: String,
  pub role: Option<PartitionRole>,
  pub version: Option<String>,
  pub usage: PartitionUsage,
  /// Belongs to the version controlling the scope
  pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
  pub active_version: Option<String>,
  pub partitions: Vec<PartitionStatus>,
}

impl CacheStatus {
  pub fn total_entries(&self) -> usize {
    self.partitions.iter().map(|p| p.usage.entries).sum()
  }

  pub fn total_bytes(&self) -> u64 {
    self.partitions.iter().map(|p| p.usage.bytes).sum()
  }
}

/// Partitions of `app` with their usage, in creation order.
pub fn status<S: CacheStorage>(storage: &S, app: &str, scope: &Scope) -> Result<CacheStatus> {
  let active_version = storage.active_version(scope.base_path())?;

  let mut partitions = Vec::new();
  for name in storage.partitions()? {
    if !PartitionName::belongs_to(app, &name) {
      continue;
    }

    let parsed = PartitionName::parse(app, &name);
    let version = parsed.as_ref().map(|p| p.version.clone());
    partitions.push(PartitionStatus {
      usage: storage.usage(&name)?,
      role: parsed.map(|p| p.role),
      active: version.is_some() && version == active_version,
      version,
      name,
    });
  }

  Ok(CacheStatus {
    active_version,
    partitions,
  })
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }

  if unit == 0 {
    format!("{} B", bytes)
  } else {
    format!("{:.1} {}", value, UNITS[unit])
  }
}
