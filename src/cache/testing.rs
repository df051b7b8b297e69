//! Test doubles: an in-memory network and a storage backend that always fails.

use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::request::{Request, Response};
use super::traits::{CacheStorage, Network, PartitionUsage};
use crate::history::storage::{LocalStorage, StorageEvent, TabId};

#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  log: Mutex<Vec<String>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self.routes.lock().unwrap().insert(url.to_string(), response);
  }

  pub fn serve(&self, url: &str, body: &str) {
    self.route(url, Response::new(200, "OK").with_body(body));
  }

  /// Make a single URL fail at the transport level
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// URLs requested so far
  pub fn requests(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }

  fn respond(&self, url: &str) -> Result<Response> {
    self.log.lock().unwrap().push(url.to_string());

    if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(url) {
      return Err(eyre!("Network unreachable: {}", url));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(url)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "Not Found")),
    )
  }
}

impl Network for FakeNetwork {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let result = self.respond(request.url.as_str());
    async move { result }
  }
}

/// Every call errs, as when the database is locked or the disk is full.
pub struct FailingStorage {
  events: broadcast::Sender<StorageEvent>,
}

impl FailingStorage {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(1);
    Self { events }
  }
}

impl Default for FailingStorage {
  fn default() -> Self {
    Self::new()
  }
}

fn unavailable<T>() -> Result<T> {
  Err(eyre!("Storage unavailable"))
}

impl CacheStorage for FailingStorage {
  fn open(&self, _partition: &str) -> Result<()> {
    unavailable()
  }

  fn partitions(&self) -> Result<Vec<String>> {
    unavailable()
  }

  fn delete_partition(&self, _partition: &str) -> Result<bool> {
    unavailable()
  }

  fn get(&self, _partition: &str, _key: &str) -> Result<Option<Response>> {
    unavailable()
  }

  fn match_any(&self, _key: &str) -> Result<Option<Response>> {
    unavailable()
  }

  fn put(&self, _partition: &str, _key: &str, _response: &Response) -> Result<()> {
    unavailable()
  }

  fn keys(&self, _partition: &str) -> Result<Vec<String>> {
    unavailable()
  }

  fn delete(&self, _partition: &str, _key: &str) -> Result<bool> {
    unavailable()
  }

  fn usage(&self, _partition: &str) -> Result<PartitionUsage> {
    unavailable()
  }

  fn active_version(&self, _scope: &str) -> Result<Option<String>> {
    unavailable()
  }

  fn set_active_version(&self, _scope: &str, _version: &str) -> Result<()> {
    unavailable()
  }
}

impl LocalStorage for FailingStorage {
  fn get_item(&self, _key: &str) -> Result<Option<String>> {
    unavailable()
  }

  fn set_item(&self, _key: &str, _value: &str, _source: TabId) -> Result<()> {
    unavailable()
  }

  fn revision(&self, _key: &str) -> Result<u64> {
    unavailable()
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.events.subscribe()
  }
}
