//! The worker lifecycle: install, activate, fetch interception and messages.

use color_eyre::Result;
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

use super::discovery::discover_assets;
use super::layer::{CacheLayer, CacheLimits};
use super::messages::{ClientMessage, QrCacheEntry, WorkerMessage};
use super::partition::{PartitionName, Partitions};
use super::request::{Request, Response};
use super::route::{Router, Scope};
use super::traits::{CacheStorage, Network};
use crate::config::Config;
use crate::qr::encode_component;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
  /// Created, nothing done yet
  #[default]
  Parsed,
  Installing,
  /// Installed, waiting to activate
  Installed,
  Activating,
  /// Controlling pages in scope
  Activated,
  /// Failed or replaced
  Redundant,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
  use WorkerState::*;

  matches!(
    (from, to),
    (Parsed, Installing)
      | (Installing, Installed)
      | (Installing, Redundant)
      | (Installed, Activating)
      | (Activating, Activated)
      | (Activating, Redundant)
      | (Activated, Redundant)
  )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
  InvalidStateTransition { from: WorkerState, to: WorkerState },
  InstallFailed(String),
  ActivateFailed(String),
}

impl fmt::Display for WorkerError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WorkerError::InvalidStateTransition { from, to } => {
        write!(f, "Invalid worker state transition: {} -> {}", from, to)
      }
      WorkerError::InstallFailed(e) => write!(f, "Install failed: {}", e),
      WorkerError::ActivateFailed(e) => write!(f, "Activate failed: {}", e),
    }
  }
}

impl std::error::Error for WorkerError {}

/// Everything a worker version needs to know about its deployment
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub app: String,
  pub version: String,
  pub router: Router,
  /// Pre-cached on install, relative to the base path unless absolute
  pub essential_files: Vec<String>,
  pub discover_assets: bool,
  pub limits: CacheLimits,
}

impl WorkerSettings {
  pub fn from_config(config: &Config, version: impl Into<String>) -> Result<Self> {
    let scope = Scope::new(&config.app.origin, &config.app.base_path)?;

    Ok(Self {
      app: config.app.name.clone(),
      version: version.into(),
      router: Router::new(
        scope,
        config.cache.static_extensions.clone(),
        config.cache.static_directories.clone(),
      ),
      essential_files: config.cache.essential_files.clone(),
      discover_assets: config.cache.discover_assets,
      limits: CacheLimits {
        max_static: config.cache.max_static_entries,
        max_dynamic: config.cache.max_dynamic_entries,
      },
    })
  }

  pub fn scope(&self) -> &Scope {
    self.router.scope()
  }
}

/// One version of the offline cache manager.
pub struct ServiceWorker<S: CacheStorage, N: Network> {
  state: WorkerState,
  settings: WorkerSettings,
  storage: Arc<S>,
  network: Arc<N>,
  layer: CacheLayer<S, N>,
  skip_waiting: bool,
  clients: broadcast::Sender<ClientMessage>,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>, settings: WorkerSettings) -> Self {
    let layer = CacheLayer::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      settings.router.clone(),
      Partitions::new(&settings.app, &settings.version),
      settings.limits,
    );
    let (clients, _) = broadcast::channel(16);

    Self {
      state: WorkerState::Parsed,
      settings,
      storage,
      network,
      layer,
      skip_waiting: false,
      clients,
    }
  }

  /// The version that last took control of the scope, if any.
  pub fn restore(
    storage: Arc<S>,
    network: Arc<N>,
    mut settings: WorkerSettings,
  ) -> Result<Option<Self>> {
    let Some(version) = storage.active_version(settings.scope().base_path())? else {
      return Ok(None);
    };

    debug!(version = %version, "restoring active worker");
    settings.version = version;
    let mut worker = Self::new(storage, network, settings);
    worker.state = WorkerState::Activated;
    Ok(Some(worker))
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  pub fn scope(&self) -> &Scope {
    self.settings.scope()
  }

  /// Messages sent to open pages
  pub fn subscribe_clients(&self) -> broadcast::Receiver<ClientMessage> {
    self.clients.subscribe()
  }

  fn transition(&mut self, to: WorkerState) -> Result<(), WorkerError> {
    let from = self.state;
    if !is_valid_transition(from, to) {
      return Err(WorkerError::InvalidStateTransition { from, to });
    }

    info!(version = %self.settings.version, %from, %to, "worker state change");
    self.state = to;
    Ok(())
  }

  fn notify(&self, message: ClientMessage) {
    // No open pages is fine
    let _ = self.clients.send(message);
  }

  /// Pre-cache the application shell into the static partition.
  pub async fn install(&mut self) -> Result<(), WorkerError> {
    self.transition(WorkerState::Installing)?;

    match self.populate_static().await {
      Ok(stored) => {
        info!(version = %self.settings.version, stored, "static partition populated");
        self.notify(ClientMessage::CacheUpdated);
        self.skip_waiting = true;
        self.transition(WorkerState::Installed)
      }
      Err(e) => {
        error!(version = %self.settings.version, error = %e, "install failed");
        self.transition(WorkerState::Redundant)?;
        Err(WorkerError::InstallFailed(e.to_string()))
      }
    }
  }

  async fn populate_static(&self) -> Result<usize> {
    let partition = self.layer.partitions().static_name.clone();
    self.storage.open(&partition)?;

    let max = self.settings.limits.max_static;
    let scope = self.settings.scope();

    let mut manifest: Vec<Url> = Vec::new();
    for file in &self.settings.essential_files {
      match scope.asset_url(file) {
        Ok(url) if !manifest.contains(&url) => manifest.push(url),
        Ok(_) => {}
        Err(e) => warn!(file = %file, error = %e, "skipping manifest entry"),
      }
    }
    if manifest.len() > max {
      warn!(skipped = manifest.len() - max, "manifest exceeds static ceiling");
      manifest.truncate(max);
    }

    let mut stored = self.precache(&partition, &manifest).await;

    if self.settings.discover_assets {
      let discovered: Vec<Url> = self
        .discover()
        .await
        .into_iter()
        .filter(|url| !manifest.contains(url))
        .collect();

      let remaining = max.saturating_sub(stored);
      if discovered.len() > remaining {
        warn!(
          skipped = discovered.len() - remaining,
          "discovered assets exceed static ceiling"
        );
      }
      let take = discovered.len().min(remaining);
      stored += self.precache(&partition, &discovered[..take]).await;
    }

    Ok(stored)
  }

  /// Fetch all URLs concurrently and store the successful responses.
  async fn precache(&self, partition: &str, urls: &[Url]) -> usize {
    let fetches = urls.iter().map(|url| {
      let request = Request::get(url.clone());
      let network = &self.network;
      async move {
        let result = network.fetch(&request).await;
        (request, result)
      }
    });

    let mut stored = 0;
    for (request, result) in join_all(fetches).await {
      match result {
        Ok(response) if response.ok() => {
          match self.storage.put(partition, &request.cache_key(), &response) {
            Ok(()) => stored += 1,
            Err(e) => warn!(url = %request.url, error = %e, "failed to store asset"),
          }
        }
        Ok(response) => {
          warn!(url = %request.url, status = response.status, "asset not cached")
        }
        Err(e) => warn!(url = %request.url, error = %e, "failed to fetch asset"),
      }
    }

    stored
  }

  /// Stylesheets and scripts referenced by the root document. Never fails.
  async fn discover(&self) -> Vec<Url> {
    let scope = self.settings.scope();
    let root = match scope.resolve(scope.base_path()) {
      Ok(url) => url,
      Err(e) => {
        warn!(error = %e, "cannot resolve root document");
        return Vec::new();
      }
    };

    let html = match self.network.fetch(&Request::get(root.clone())).await {
      Ok(response) if response.ok() => String::from_utf8_lossy(&response.body).into_owned(),
      Ok(response) => {
        warn!(url = %root, status = response.status, "asset discovery skipped");
        return Vec::new();
      }
      Err(e) => {
        warn!(url = %root, error = %e, "asset discovery skipped");
        return Vec::new();
      }
    };

    let paths = match discover_assets(&html, scope.base_path()) {
      Ok(paths) => paths,
      Err(e) => {
        warn!(error = %e, "asset discovery failed");
        return Vec::new();
      }
    };

    debug!(count = paths.len(), "discovered assets");
    paths.iter().filter_map(|p| scope.resolve(p).ok()).collect()
  }

  /// Drop stale partitions of this application and take control.
  pub async fn activate(&mut self) -> Result<(), WorkerError> {
    self.transition(WorkerState::Activating)?;

    let names = match self.storage.partitions() {
      Ok(names) => names,
      Err(e) => {
        error!(error = %e, "failed to enumerate partitions");
        self.transition(WorkerState::Redundant)?;
        return Err(WorkerError::ActivateFailed(e.to_string()));
      }
    };

    let partitions = self.layer.partitions();
    for name in names
      .iter()
      .filter(|n| PartitionName::belongs_to(&self.settings.app, n) && !partitions.is_current(n))
    {
      match self.storage.delete_partition(name) {
        Ok(_) => info!(partition = %name, "deleted stale partition"),
        Err(e) => warn!(partition = %name, error = %e, "failed to delete stale partition"),
      }
    }

    self.transition(WorkerState::Activated)?;
    self.claim();
    Ok(())
  }

  fn claim(&self) {
    let scope = self.settings.scope().base_path();

    let previous = match self.storage.active_version(scope) {
      Ok(previous) => previous,
      Err(e) => {
        warn!(error = %e, "failed to read registration");
        None
      }
    };

    if let Err(e) = self.storage.set_active_version(scope, &self.settings.version) {
      warn!(error = %e, "failed to persist registration");
    }

    if previous.is_some_and(|v| v != self.settings.version) {
      self.notify(ClientMessage::ControllerChanged);
    }
  }

  /// Install, then activate immediately when skip-waiting was requested.
  pub async fn update(&mut self) -> Result<(), WorkerError> {
    self.install().await?;
    if self.skip_waiting {
      self.activate().await?;
    }
    Ok(())
  }

  /// Only an activated worker controls its scope; otherwise `None`.
  pub async fn handle_fetch(&self, request: &Request) -> Option<Response> {
    if self.state != WorkerState::Activated {
      return None;
    }
    self.layer.respond(request).await
  }

  pub async fn handle_message(&mut self, message: WorkerMessage) -> Result<(), WorkerError> {
    match message {
      WorkerMessage::SkipWaiting => {
        self.skip_waiting = true;
        if self.state == WorkerState::Installed {
          self.activate().await?;
        }
      }
      WorkerMessage::CacheQrCode { qr_data } => self.cache_qr_code(&qr_data),
    }
    Ok(())
  }

  /// Key a rendered code is stored under
  pub fn qr_cache_key(&self, id: &str) -> Result<Url> {
    let scope = self.settings.scope();
    scope.resolve(&format!("{}qr-cache/{}", scope.base_path(), encode_component(id)))
  }

  fn cache_qr_code(&self, entry: &QrCacheEntry) {
    let key = match self.qr_cache_key(&entry.id) {
      Ok(key) => key,
      Err(e) => {
        warn!(id = %entry.id, error = %e, "cannot cache QR code");
        return;
      }
    };

    let response = Response::new(200, "OK")
      .with_header("content-type", entry.mime())
      .with_body(entry.data_url.as_bytes());

    debug!(id = %entry.id, kind = %entry.kind, "caching QR code");
    self.layer.store_dynamic(key.as_str(), &response);
  }
}
