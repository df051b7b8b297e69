//! Fetch strategies that sit between page requests and the network.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::partition::Partitions;
use super::request::{Method, Request, Response};
use super::route::{RequestCategory, Router};
use super::traits::{CacheStorage, Network};

/// Entry ceilings for the two partitions of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
  pub max_static: usize,
  pub max_dynamic: usize,
}

impl Default for CacheLimits {
  fn default() -> Self {
    Self {
      max_static: 50,
      max_dynamic: 100,
    }
  }
}

/// Cache layer that picks a strategy per request.
///
/// Storage failures never reject a fetch: they are logged and the request
/// falls through to the network or the offline fallback.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  router: Router,
  partitions: Partitions,
  limits: CacheLimits,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    router: Router,
    partitions: Partitions,
    limits: CacheLimits,
  ) -> Self {
    Self {
      storage,
      network,
      router,
      partitions,
      limits,
    }
  }

  pub fn partitions(&self) -> &Partitions {
    &self.partitions
  }

  /// Answer an intercepted request. Non-GET requests are not handled.
  pub async fn respond(&self, request: &Request) -> Option<Response> {
    if request.method != Method::Get {
      debug!(method = request.method.as_str(), url = %request.url, "passing through");
      return None;
    }

    let category = self.router.classify(request);
    debug!(url = %request.url, ?category, "intercepted fetch");

    let response = match category {
      RequestCategory::StaticAsset | RequestCategory::Other => self.cache_first(request).await,
      RequestCategory::Navigation => self.network_first(request).await,
      RequestCategory::External => self.network_only(request).await,
    };

    Some(response)
  }

  /// Serve from any partition, else fetch and remember successful responses.
  pub async fn cache_first(&self, request: &Request) -> Response {
    let key = request.cache_key();

    if let Some(cached) = self.lookup(&key) {
      debug!(key = %key, "cache hit");
      return cached;
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.store_dynamic(&key, &response);
        }
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "fetch failed, serving offline fallback");
        self.offline_fallback(request)
      }
    }
  }

  /// Prefer a fresh response; fall back to the cache, then the app shell.
  pub async fn network_first(&self, request: &Request) -> Response {
    let key = request.cache_key();

    match self.network.fetch(request).await {
      Ok(response) if response.ok() => {
        self.store_dynamic(&key, &response);
        return response;
      }
      Ok(response) => {
        warn!(url = %request.url, status = response.status, "unsuccessful response, trying cache")
      }
      Err(e) => warn!(url = %request.url, error = %e, "fetch failed, trying cache"),
    }

    if let Some(cached) = self.lookup(&key) {
      return cached;
    }

    self.offline_fallback(request)
  }

  /// Never cached. Transport failures become a JSON error body.
  pub async fn network_only(&self, request: &Request) -> Response {
    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(url = %request.url, error = %e, "external request failed");
        Response::offline_json()
      }
    }
  }

  /// Page loads get the cached app shell; everything else a 503.
  pub fn offline_fallback(&self, request: &Request) -> Response {
    if request.is_navigation() {
      for url in self.router.scope().shell_urls() {
        match self.storage.get(&self.partitions.static_name, url.as_str()) {
          Ok(Some(shell)) => return shell,
          Ok(None) => {}
          Err(e) => warn!(key = %url, error = %e, "failed to read app shell"),
        }
      }
    }

    Response::offline_text()
  }

  /// Store into the dynamic partition and enforce its ceiling.
  pub fn store_dynamic(&self, key: &str, response: &Response) {
    if let Err(e) = self.storage.put(&self.partitions.dynamic_name, key, response) {
      warn!(key = %key, error = %e, "failed to cache response");
      return;
    }

    self.trim(&self.partitions.dynamic_name, self.limits.max_dynamic);
  }

  /// Evict oldest entries until the partition holds at most `max`.
  fn trim(&self, partition: &str, max: usize) -> usize {
    let keys = match self.storage.keys(partition) {
      Ok(keys) => keys,
      Err(e) => {
        warn!(partition, error = %e, "failed to list cache keys");
        return 0;
      }
    };

    if keys.len() <= max {
      return 0;
    }

    let excess = keys.len() - max;
    let mut removed = 0;
    for key in keys.iter().take(excess) {
      match self.storage.delete(partition, key) {
        Ok(true) => removed += 1,
        Ok(false) => {}
        Err(e) => warn!(partition, key = %key, error = %e, "failed to evict entry"),
      }
    }

    info!(partition, removed, "trimmed partition");
    removed
  }

  fn lookup(&self, key: &str) -> Option<Response> {
    match self.storage.match_any(key) {
      Ok(found) => found,
      Err(e) => {
        warn!(key = %key, error = %e, "cache lookup failed");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::route::Scope;
  use crate::cache::storage::SqliteCacheStorage;
  use crate::cache::testing::{FailingStorage, FakeNetwork};
  use crate::config::CacheConfig;
  use crate::db::Database;
  use url::Url;

  const ORIGIN: &str = "https://qretro.example";

  type TestLayer = CacheLayer<SqliteCacheStorage, FakeNetwork>;

  fn router() -> Router {
    let rules = CacheConfig::default();
    Router::new(
      Scope::new(ORIGIN, "/QRetro/").unwrap(),
      rules.static_extensions,
      rules.static_directories,
    )
  }

  fn layer(limits: CacheLimits) -> (TestLayer, Arc<SqliteCacheStorage>, Arc<FakeNetwork>) {
    let storage = Arc::new(SqliteCacheStorage::new(Database::open_in_memory().unwrap()));
    let network = Arc::new(FakeNetwork::new());
    let layer = CacheLayer::new(
      storage.clone(),
      network.clone(),
      router(),
      Partitions::new("qretro", "1"),
      limits,
    );
    (layer, storage, network)
  }

  fn failing_layer() -> (CacheLayer<FailingStorage, FakeNetwork>, Arc<FakeNetwork>) {
    let network = Arc::new(FakeNetwork::new());
    let layer = CacheLayer::new(
      Arc::new(FailingStorage::new()),
      network.clone(),
      router(),
      Partitions::new("qretro", "1"),
      CacheLimits::default(),
    );
    (layer, network)
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  #[tokio::test]
  async fn test_cache_first_stores_then_serves_offline() {
    let (layer, storage, network) = layer(CacheLimits::default());
    network.serve(url("/QRetro/app.css").as_str(), "body{}");

    let request = Request::get(url("/QRetro/app.css"));
    let first = layer.respond(&request).await.unwrap();
    assert_eq!(first.body, b"body{}");
    assert_eq!(storage.keys("qretro-dynamic-v1").unwrap().len(), 1);

    network.set_offline(true);
    let second = layer.respond(&request).await.unwrap();
    assert_eq!(second.body, b"body{}");
    assert_eq!(network.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_errors() {
    let (layer, storage, _network) = layer(CacheLimits::default());

    let response = layer
      .respond(&Request::get(url("/QRetro/missing.js")))
      .await
      .unwrap();
    assert_eq!(response.status, 404);
    assert!(storage.keys("qretro-dynamic-v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cache_first_offline_without_entry_is_503() {
    let (layer, _storage, network) = layer(CacheLimits::default());
    network.set_offline(true);

    let response = layer
      .respond(&Request::get(url("/QRetro/logo.png")))
      .await
      .unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"Offline - Resource not available");
  }

  #[tokio::test]
  async fn test_network_first_prefers_fresh_response() {
    let (layer, storage, network) = layer(CacheLimits::default());
    let page = url("/QRetro/share");
    storage
      .put("qretro-dynamic-v1", page.as_str(), &Response::new(200, "OK").with_body("old"))
      .unwrap();
    network.serve(page.as_str(), "new");

    let response = layer.respond(&Request::navigate(page.clone())).await.unwrap();
    assert_eq!(response.body, b"new");
    assert_eq!(
      storage.get("qretro-dynamic-v1", page.as_str()).unwrap().unwrap().body,
      b"new"
    );
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_shell() {
    let (layer, storage, network) = layer(CacheLimits::default());
    storage
      .put(
        "qretro-static-v1",
        url("/QRetro/").as_str(),
        &Response::new(200, "OK").with_body("<html>shell</html>"),
      )
      .unwrap();
    network.set_offline(true);

    let response = layer
      .respond(&Request::navigate(url("/QRetro/never-visited")))
      .await
      .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"<html>shell</html>");
  }

  #[tokio::test]
  async fn test_navigation_server_error_falls_back_to_cache() {
    let (layer, storage, network) = layer(CacheLimits::default());
    let page = url("/QRetro/share");
    storage
      .put("qretro-dynamic-v1", page.as_str(), &Response::new(200, "OK").with_body("cached"))
      .unwrap();
    network.route(page.as_str(), Response::new(500, "Internal Server Error"));

    let response = layer.respond(&Request::navigate(page)).await.unwrap();
    assert_eq!(response.body, b"cached");
  }

  #[tokio::test]
  async fn test_external_is_never_cached() {
    let (layer, storage, network) = layer(CacheLimits::default());
    let api = "https://api.other.example/v1/price";
    network.serve(api, "{}");

    let response = layer.respond(&Request::get(Url::parse(api).unwrap())).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(storage.keys("qretro-dynamic-v1").unwrap().is_empty());

    network.set_offline(true);
    let offline = layer.respond(&Request::get(Url::parse(api).unwrap())).await.unwrap();
    assert_eq!(offline.status, 503);
    assert_eq!(offline.header("content-type"), Some("application/json"));
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let (layer, _storage, network) = layer(CacheLimits::default());
    let request = Request::get(url("/QRetro/app.css")).with_method(Method::Post);

    assert!(layer.respond(&request).await.is_none());
    assert!(network.requests().is_empty());
  }

  #[tokio::test]
  async fn test_dynamic_partition_trimmed_oldest_first() {
    let (layer, storage, network) = layer(CacheLimits {
      max_static: 50,
      max_dynamic: 3,
    });

    for i in 0..5 {
      let asset = url(&format!("/QRetro/chunk-{}.js", i));
      network.serve(asset.as_str(), "x");
      layer.respond(&Request::get(asset)).await.unwrap();
    }

    let keys = storage.keys("qretro-dynamic-v1").unwrap();
    assert_eq!(
      keys,
      vec![
        url("/QRetro/chunk-2.js").to_string(),
        url("/QRetro/chunk-3.js").to_string(),
        url("/QRetro/chunk-4.js").to_string(),
      ]
    );
  }

  #[tokio::test]
  async fn test_storage_failure_falls_through_to_network() {
    let (layer, network) = failing_layer();
    network.serve(url("/QRetro/app.css").as_str(), "body{}");
    network.serve(url("/QRetro/share").as_str(), "<html>page</html>");

    let asset = layer.respond(&Request::get(url("/QRetro/app.css"))).await.unwrap();
    assert_eq!(asset.status, 200);
    assert_eq!(asset.body, b"body{}");

    let page = layer
      .respond(&Request::navigate(url("/QRetro/share")))
      .await
      .unwrap();
    assert_eq!(page.body, b"<html>page</html>");
  }

  #[tokio::test]
  async fn test_storage_failure_offline_is_503() {
    let (layer, network) = failing_layer();
    network.set_offline(true);

    let asset = layer
      .respond(&Request::get(url("/QRetro/logo.png")))
      .await
      .unwrap();
    assert_eq!(asset.status, 503);

    // The shell cannot be read either, so navigations get the text 503
    let page = layer
      .respond(&Request::navigate(url("/QRetro/share")))
      .await
      .unwrap();
    assert_eq!(page.status, 503);
    assert_eq!(page.body, b"Offline - Resource not available");

    let api = layer
      .respond(&Request::get(Url::parse("https://api.other.example/v1").unwrap()))
      .await
      .unwrap();
    assert_eq!(api.status, 503);
  }
}
