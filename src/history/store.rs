//! Per-tab view of the shared history document.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::preview::create_preview;
use super::storage::{LocalStorage, StorageEvent, TabId};
use super::types::{ExportDocument, HistoryItem, HistoryState, QrOptions};
use crate::qr::{FormData, QrDataType};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct CachedSnapshot {
  revision: u64,
  state: Arc<HistoryState>,
}

struct Inner<S> {
  storage: Arc<S>,
  tab: TabId,
  key: String,
  default_max_items: usize,
  cache: Mutex<Option<CachedSnapshot>>,
  listeners: Mutex<Vec<(ListenerId, Listener)>>,
  next_listener: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// History as seen from one tab.
///
/// Reads are served from a cached snapshot until the stored document
/// changes. Every successful write notifies this tab's listeners; other tabs
/// sharing the storage learn about it through storage events.
pub struct HistoryStore<S: LocalStorage> {
  inner: Arc<Inner<S>>,
}

impl<S: LocalStorage> Clone for HistoryStore<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: LocalStorage> HistoryStore<S> {
  pub fn new(storage: Arc<S>, key: impl Into<String>, default_max_items: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        storage,
        tab: TabId::new(),
        key: key.into(),
        default_max_items,
        cache: Mutex::new(None),
        listeners: Mutex::new(Vec::new()),
        next_listener: AtomicU64::new(1),
      }),
    }
  }

  /// Current state; the same `Arc` is returned until the data changes.
  pub fn snapshot(&self) -> Arc<HistoryState> {
    let revision = match self.inner.storage.revision(&self.inner.key) {
      Ok(revision) => Some(revision),
      Err(e) => {
        warn!(error = %e, "failed to read history revision");
        None
      }
    };

    if let (Some(cached), Some(revision)) = (lock(&self.inner.cache).as_ref(), revision) {
      if cached.revision == revision {
        return Arc::clone(&cached.state);
      }
    }

    let state = Arc::new(self.load());
    if let Some(revision) = revision {
      *lock(&self.inner.cache) = Some(CachedSnapshot {
        revision,
        state: Arc::clone(&state),
      });
    }
    state
  }

  fn load(&self) -> HistoryState {
    let empty = HistoryState::empty(self.inner.default_max_items);

    let raw = match self.inner.storage.get_item(&self.inner.key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return empty,
      Err(e) => {
        warn!(error = %e, "failed to load history");
        return empty;
      }
    };

    match HistoryState::parse(&raw, self.inner.default_max_items) {
      Ok(state) => state,
      Err(e) => {
        warn!(error = %e, "stored history is corrupt, starting empty");
        empty
      }
    }
  }

  fn invalidate(&self) {
    *lock(&self.inner.cache) = None;
  }

  pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
    let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
    lock(&self.inner.listeners).push((id, Arc::new(listener)));
    id
  }

  pub fn unsubscribe(&self, id: ListenerId) -> bool {
    let mut listeners = lock(&self.inner.listeners);
    let before = listeners.len();
    listeners.retain(|(listener_id, _)| *listener_id != id);
    listeners.len() != before
  }

  fn notify(&self) {
    // Listeners may call back into the store
    let listeners: Vec<Listener> = lock(&self.inner.listeners)
      .iter()
      .map(|(_, listener)| Arc::clone(listener))
      .collect();

    for listener in listeners {
      listener();
    }
  }

  /// Persist a new state. Skipped when nothing changed.
  fn set_state(&self, state: &HistoryState) -> bool {
    let serialized = match state.to_json() {
      Ok(json) => json,
      Err(e) => {
        warn!(error = %e, "failed to save history");
        return false;
      }
    };

    match self.inner.storage.get_item(&self.inner.key) {
      Ok(Some(current)) if current == serialized => return false,
      Ok(_) => {}
      Err(e) => warn!(error = %e, "failed to read history before save"),
    }

    if let Err(e) = self
      .inner
      .storage
      .set_item(&self.inner.key, &serialized, self.inner.tab)
    {
      warn!(error = %e, "failed to save history");
      return false;
    }

    self.invalidate();
    self.notify();
    true
  }

  /// Record a generated code and return its id.
  ///
  /// Re-adding the same payload of the same type moves the existing entry to
  /// the front with a fresh timestamp instead of duplicating it.
  pub fn add(
    &self,
    kind: QrDataType,
    data: &FormData,
    qr_data: &str,
    qr_options: Option<QrOptions>,
    title: Option<&str>,
  ) -> String {
    let current = self.snapshot();
    let now = Utc::now().timestamp_millis();
    let mut items = current.items.clone();

    let existing = items
      .iter()
      .position(|item| item.kind == kind && item.qr_data == qr_data);

    let id = match existing {
      Some(pos) => {
        let mut item = items.remove(pos);
        item.timestamp = now;
        let id = item.id.clone();
        items.insert(0, item);
        debug!(id = %id, "history entry moved to front");
        id
      }
      None => {
        let item = HistoryItem {
          id: new_id(now),
          kind,
          data: data.clone(),
          qr_data: qr_data.to_string(),
          qr_options,
          timestamp: now,
          preview: create_preview(kind, data),
          title: title.map(String::from),
        };
        let id = item.id.clone();
        items.insert(0, item);
        items.truncate(current.max_items);
        debug!(id = %id, "history entry added");
        id
      }
    };

    self.set_state(&HistoryState {
      items,
      max_items: current.max_items,
    });
    id
  }

  pub fn remove(&self, id: &str) {
    let current = self.snapshot();
    let items = current
      .items
      .iter()
      .filter(|item| item.id != id)
      .cloned()
      .collect();

    self.set_state(&HistoryState {
      items,
      max_items: current.max_items,
    });
  }

  pub fn clear(&self) {
    let current = self.snapshot();
    self.set_state(&HistoryState::empty(current.max_items));
  }

  pub fn get(&self, id: &str) -> Option<HistoryItem> {
    self.snapshot().get(id).cloned()
  }

  pub fn export(&self) -> ExportDocument {
    ExportDocument::new(self.snapshot().items.clone())
  }

  /// Apply a change made elsewhere. Returns true if listeners were notified.
  pub fn handle_storage_event(&self, event: &StorageEvent) -> bool {
    if event.source == self.inner.tab
      || event.key != self.inner.key
      || event.new_value == event.old_value
    {
      return false;
    }

    debug!(key = %event.key, "history changed in another tab");
    self.invalidate();
    self.notify();
    true
  }

  /// Detect writes from other processes sharing the storage.
  pub fn poll_external(&self) -> bool {
    let revision = match self.inner.storage.revision(&self.inner.key) {
      Ok(revision) => revision,
      Err(e) => {
        warn!(error = %e, "failed to read history revision");
        return false;
      }
    };

    let stale = lock(&self.inner.cache)
      .as_ref()
      .is_some_and(|cached| cached.revision != revision);

    if stale {
      self.invalidate();
      self.notify();
    }
    stale
  }
}

impl<S: LocalStorage + 'static> HistoryStore<S> {
  /// Apply storage events in the background until the store is dropped.
  pub fn spawn_sync(&self) -> JoinHandle<()> {
    let mut events = self.inner.storage.subscribe();
    let weak: Weak<Inner<S>> = Arc::downgrade(&self.inner);

    tokio::spawn(async move {
      loop {
        let event = events.recv().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        let store = HistoryStore { inner };

        match event {
          Ok(event) => {
            store.handle_storage_event(&event);
          }
          Err(RecvError::Lagged(missed)) => {
            warn!(missed, "missed storage events, reloading history");
            store.invalidate();
            store.notify();
          }
          Err(RecvError::Closed) => break,
        }
      }
    })
  }
}

/// `<unix millis>-<9 hex chars>`
fn new_id(now_millis: i64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(now_millis.to_le_bytes());
  hasher.update(Utc::now().timestamp_subsec_nanos().to_le_bytes());
  hasher.update(std::process::id().to_le_bytes());
  hasher.update(ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{}-{}", now_millis, &digest[..9])
}
