//! Request classification and the scope the worker controls.

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::request::Request;

/// Origin plus base path served by the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
  origin: Url,
  base_path: String,
}

impl Scope {
  /// Create a scope; the base path always starts and ends with `/`
  pub fn new(origin: &str, base_path: &str) -> Result<Self> {
    let parsed =
      Url::parse(origin).map_err(|e| eyre!("Invalid application origin '{}': {}", origin, e))?;
    let origin = Url::parse(&parsed.origin().ascii_serialization())
      .map_err(|e| eyre!("Application origin '{}' is opaque: {}", origin, e))?;

    let mut base_path = base_path.trim().to_string();
    if !base_path.starts_with('/') {
      base_path.insert(0, '/');
    }
    if !base_path.ends_with('/') {
      base_path.push('/');
    }

    Ok(Self { origin, base_path })
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  /// Resolve a path or absolute URL against the origin
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Cannot resolve '{}' against {}: {}", path, self.origin, e))
  }

  /// Resolve an asset path; relative paths sit under the base path
  pub fn asset_url(&self, file: &str) -> Result<Url> {
    if file.starts_with('/') || file.contains("://") {
      self.resolve(file)
    } else {
      self.resolve(&format!("{}{}", self.base_path, file))
    }
  }

  /// Candidate keys for the application shell document
  pub fn shell_urls(&self) -> Vec<Url> {
    [self.base_path.clone(), format!("{}index.html", self.base_path)]
      .iter()
      .filter_map(|p| self.origin.join(p).ok())
      .collect()
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCategory {
  /// Stylesheets, scripts, images, fonts
  StaticAsset,
  /// Page loads
  Navigation,
  /// Cross-origin API calls
  External,
  Other,
}

/// Decides which caching strategy applies to a request.
#[derive(Debug, Clone)]
pub struct Router {
  scope: Scope,
  extensions: Vec<String>,
  directories: Vec<String>,
}

impl Router {
  pub fn new(scope: Scope, extensions: Vec<String>, directories: Vec<String>) -> Self {
    Self {
      scope,
      extensions,
      directories,
    }
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn classify(&self, request: &Request) -> RequestCategory {
    let path = request.url.path();

    if self.is_static_asset(path) {
      RequestCategory::StaticAsset
    } else if request.is_navigation() {
      RequestCategory::Navigation
    } else if !path.starts_with(self.scope.base_path()) && !self.scope.is_same_origin(&request.url)
    {
      RequestCategory::External
    } else {
      RequestCategory::Other
    }
  }

  fn is_static_asset(&self, path: &str) -> bool {
    self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
      || self.directories.iter().any(|dir| path.contains(dir.as_str()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CacheConfig;

  fn router() -> Router {
    let rules = CacheConfig::default();
    Router::new(
      Scope::new("https://qretro.example", "QRetro").unwrap(),
      rules.static_extensions,
      rules.static_directories,
    )
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_scope_normalizes_base_path() {
    let scope = Scope::new("https://qretro.example/some/page", "QRetro").unwrap();
    assert_eq!(scope.base_path(), "/QRetro/");
    assert_eq!(scope.origin().as_str(), "https://qretro.example/");
    assert_eq!(
      scope.shell_urls()[1].as_str(),
      "https://qretro.example/QRetro/index.html"
    );
  }

  #[test]
  fn test_asset_url_relative_to_base() {
    let scope = Scope::new("https://qretro.example", "/QRetro/").unwrap();
    assert_eq!(
      scope.asset_url("fonts/a.ttf").unwrap().as_str(),
      "https://qretro.example/QRetro/fonts/a.ttf"
    );
    assert_eq!(
      scope.asset_url("").unwrap().as_str(),
      "https://qretro.example/QRetro/"
    );
    assert_eq!(
      scope.asset_url("/favicon.ico").unwrap().as_str(),
      "https://qretro.example/favicon.ico"
    );
  }

  #[test]
  fn test_static_by_extension_and_directory() {
    let router = router();
    assert_eq!(
      router.classify(&get("https://qretro.example/QRetro/app.css")),
      RequestCategory::StaticAsset
    );
    assert_eq!(
      router.classify(&get("https://qretro.example/QRetro/_next/static/chunk")),
      RequestCategory::StaticAsset
    );
    assert_eq!(
      router.classify(&get("https://qretro.example/QRetro/fonts/pixel")),
      RequestCategory::StaticAsset
    );
  }

  #[test]
  fn test_static_wins_over_navigation() {
    let request = Request::navigate(Url::parse("https://qretro.example/QRetro/logo.svg").unwrap());
    assert_eq!(router().classify(&request), RequestCategory::StaticAsset);
  }

  #[test]
  fn test_navigation() {
    let request = Request::navigate(Url::parse("https://qretro.example/QRetro/share").unwrap());
    assert_eq!(router().classify(&request), RequestCategory::Navigation);
  }

  #[test]
  fn test_external_requires_foreign_origin_and_path() {
    let router = router();
    assert_eq!(
      router.classify(&get("https://api.other.example/v1/rates")),
      RequestCategory::External
    );
    // Same origin, outside base path
    assert_eq!(
      router.classify(&get("https://qretro.example/api/rates")),
      RequestCategory::Other
    );
    // Foreign origin, but path under base path
    assert_eq!(
      router.classify(&get("https://cdn.example/QRetro/data")),
      RequestCategory::Other
    );
  }
}
