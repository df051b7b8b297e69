//! Seams between the worker logic and its platform: partition storage and network.

use color_eyre::Result;
use std::future::Future;

use super::request::{Request, Response};

/// Entry count and stored body size of one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionUsage {
  pub entries: usize,
  pub bytes: u64,
}

/// Trait for named cache partition backends.
///
/// Keys are listed in insertion order; writing an existing key moves it to
/// the end. Partitions are listed in creation order.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist.
  fn open(&self, partition: &str) -> Result<()>;

  /// Names of all partitions.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Delete a partition and its entries. Returns false if it did not exist.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Look up a key in one partition.
  fn get(&self, partition: &str, key: &str) -> Result<Option<Response>>;

  /// Look up a key across every partition.
  fn match_any(&self, key: &str) -> Result<Option<Response>>;

  /// Store a response, creating the partition if needed.
  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()>;

  /// Keys of a partition, oldest first.
  fn keys(&self, partition: &str) -> Result<Vec<String>>;

  /// Remove one key. Returns false if it was absent.
  fn delete(&self, partition: &str, key: &str) -> Result<bool>;

  fn usage(&self, partition: &str) -> Result<PartitionUsage>;

  /// Version currently controlling a scope.
  fn active_version(&self, scope: &str) -> Result<Option<String>>;

  fn set_active_version(&self, scope: &str, version: &str) -> Result<()>;
}

/// Trait for the network the worker fetches through.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
